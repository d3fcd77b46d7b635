//! Cell grid systems - mirror vehicle motion into the coarse cell grid and
//! advance its active cells within the configured time budget.

use crate::cells::{CellEvent, UpdateBudget, VirtualBattlefield};
use crate::components::*;
use crate::config::SimConfig;
use bevy_ecs::prelude::*;
use log::{debug, error};

/// The coarse cell grid, advanced incrementally each tick.
#[derive(Resource, Default)]
pub struct CellGridResource(pub VirtualBattlefield);

/// Cell grid events produced since the log was last drained.
#[derive(Resource, Debug, Default)]
pub struct CellLog(pub Vec<CellEvent>);

/// Reports every moving vehicle's position to the cell grid.
pub fn cell_motion_system(mut grid: ResMut<CellGridResource>, query: Query<(&CellUnitId, &Vehicle), Without<Aggregated>>) {
    for (id, vehicle) in query.iter() {
        if let Err(err) = grid.0.move_unit(id.0, vehicle.body.position) {
            error!("cell motion for {}: {err}", id.0);
        }
    }
}

/// Advances active cells for at most `active_cell_budget_ms` and collects
/// the resulting events.
pub fn cell_update_system(mut grid: ResMut<CellGridResource>, config: Res<SimConfig>, mut log: ResMut<CellLog>) {
    let report = grid.0.update(UpdateBudget::from_millis(config.active_cell_budget_ms));
    if report.pending > 0 {
        debug!("{} of {} active cells still walking", report.pending, grid.0.active_cell_count());
    }
    log.0.extend(grid.0.drain_events());
}
