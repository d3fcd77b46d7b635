//! Combat Simulator Project - Simulation Core
//!
//! Flight dynamics and battlefield management for a real-time combat flight
//! simulator:
//!
//! - [`ode`]: adaptive Runge-Kutta solvers
//! - [`physics`]: rigid-body vehicle model and force contributors
//! - [`bus`] and [`fcs`]: named data channels and the flight-control graph
//! - [`battlefield`]: quad-tree index with aggregation and visibility bubbles
//! - [`cells`]: the array-grid battlefield with amortized bubble processing
//!
//! Uses `bevy_ecs` for the fixed-timestep world in [`api::SimWorld`].

pub mod api;
pub mod battlefield;
pub mod bus;
pub mod cells;
pub mod components;
pub mod config;
pub mod error;
pub mod fcs;
pub mod ode;
pub mod physics;
pub mod profiler;
pub mod systems;
pub mod terrain;
pub mod world;

pub use api::SimWorld;
pub use battlefield::{Battlefield, BattlefieldConfig, BattlefieldEvent, ControlMode, ObjectId, UnitKind};
pub use components::*;
pub use config::SimConfig;
pub use error::{BattlefieldError, ConfigError, SimError, SimResult};
pub use systems::*;
pub use terrain::{FlatTerrain, HeightField, Terrain, TerrainResource};
pub use world::{Snapshot, VehicleSnapshot};
