//! Serializable snapshots of the simulation state.
//!
//! A `Snapshot` is what a renderer or network layer consumes: plain data,
//! no handles into the ECS world.

use crate::battlefield::{BattlefieldEvent, ControlMode, UnitKind};
use crate::cells::CellEvent;
use crate::bus::channels;
use crate::components::*;
use bevy_ecs::prelude::*;
use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

/// Snapshot of a single vehicle's state for serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    pub id: u64,
    pub name: String,
    pub kind: UnitKind,
    pub control: ControlMode,
    pub position: DVec3,
    pub velocity: DVec3,
    pub attitude: DQuat,
    pub airspeed: f64,
    pub alpha: f64,
    pub g_load: f64,
    pub aggregated: bool,
    pub visible: bool,
    pub near_ground: bool,
    /// The adaptive solver gave up during the last step and a fixed step
    /// was used instead.
    pub degraded: bool,
}

/// Complete simulation state snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u64,
    /// Elapsed simulation time in seconds.
    pub time: f64,
    /// All vehicles, ordered by id.
    pub vehicles: Vec<VehicleSnapshot>,
    /// Battlefield events applied since the previous snapshot.
    pub events: Vec<BattlefieldEvent>,
    /// Cell grid events produced since the previous snapshot.
    #[serde(default)]
    pub cell_events: Vec<CellEvent>,
}

impl Snapshot {
    pub fn from_world(world: &mut World, tick: u64, time: f64) -> Self {
        let mut query = world.query::<(&UnitId, &Vehicle, &Control, Has<Aggregated>, Has<Visible>)>();
        let mut vehicles: Vec<VehicleSnapshot> = query
            .iter(world)
            .map(|(id, vehicle, control, aggregated, visible)| VehicleSnapshot {
                id: id.0 .0,
                name: vehicle.name.clone(),
                kind: vehicle.kind,
                control: control.0,
                position: vehicle.body.position,
                velocity: vehicle.body.velocity,
                attitude: vehicle.body.attitude,
                airspeed: vehicle.read(channels::AIRSPEED).unwrap_or(0.0),
                alpha: vehicle.read(channels::ANGLE_OF_ATTACK).unwrap_or(0.0),
                g_load: vehicle.read(channels::G_LOAD).unwrap_or(0.0),
                aggregated,
                visible,
                near_ground: vehicle.body.near_ground,
                degraded: vehicle.body.degraded,
            })
            .collect();
        vehicles.sort_by_key(|v| v.id);

        Self { tick, time, vehicles, events: Vec::new(), cell_events: Vec::new() }
    }

    pub fn vehicle(&self, id: u64) -> Option<&VehicleSnapshot> {
        self.vehicles.iter().find(|v| v.id == id)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
