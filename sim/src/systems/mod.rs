//! ECS systems for the simulation.
//!
//! Systems run as one chain per fixed tick:
//!
//! - `flight_control_system` - evaluates flight-control graphs
//! - `physics_system` - integrates deaggregated vehicles
//! - `battlefield_motion_system` - reports new positions to the battlefield
//! - `battlefield_update_system` - completes removals, applies events as
//!   `Aggregated`/`Visible` markers
//! - `cell_motion_system` - reports the same positions to the cell grid
//! - `cell_update_system` - advances active cells within the tick budget

pub mod battlefield;
pub mod cells;
pub mod flight;

pub use battlefield::*;
pub use cells::*;
pub use flight::*;
