//! Flight systems - control laws and rigid-body integration.
//!
//! ## Parallel Feature
//!
//! When compiled with `--features parallel`, `physics_system` integrates
//! vehicles across rayon's thread pool. Each vehicle owns its model, body and
//! bus, and terrain is only read, so the integration is independent per
//! vehicle.

use crate::components::*;
use crate::terrain::TerrainResource;
use bevy_ecs::prelude::*;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Resource containing the delta time for the current tick.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct DeltaTime(pub f64);

/// Evaluates every live vehicle's flight-control graph.
///
/// Aggregated vehicles are frozen, so their control laws are not run either.
pub fn flight_control_system(dt: Res<DeltaTime>, mut query: Query<&mut Vehicle, Without<Aggregated>>) {
    for mut vehicle in query.iter_mut() {
        if let Some(fcs) = vehicle.fcs.as_mut() {
            fcs.update(dt.0);
        }
    }
}

/// Integrates each deaggregated vehicle over one tick.
pub fn physics_system(
    dt: Res<DeltaTime>,
    terrain: Res<TerrainResource>,
    mut query: Query<&mut Vehicle, Without<Aggregated>>,
) {
    let delta = dt.0;
    let terrain: &TerrainResource = &terrain;

    #[cfg(feature = "parallel")]
    {
        let mut vehicles: Vec<Mut<Vehicle>> = query.iter_mut().collect();
        vehicles.par_iter_mut().for_each(|vehicle| step_vehicle(vehicle, delta, terrain));
    }

    #[cfg(not(feature = "parallel"))]
    {
        for mut vehicle in query.iter_mut() {
            step_vehicle(&mut vehicle, delta, terrain);
        }
    }
}

/// Advance one vehicle's body by `dt`, then renormalize its attitude.
pub fn step_vehicle(vehicle: &mut Vehicle, dt: f64, terrain: &TerrainResource) {
    let Vehicle { model, body, .. } = vehicle;
    model.do_sim_step(body, dt, terrain);
    body.normalize_attitude();
}
