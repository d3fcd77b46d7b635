//! Battlefield systems - feed vehicle motion into the spatial index and turn
//! its events into marker components.

use crate::battlefield::{Battlefield, BattlefieldEvent, ObjectId};
use crate::components::*;
use bevy_ecs::prelude::*;
use log::{debug, error};
use std::collections::HashMap;

/// The authoritative battlefield index.
#[derive(Resource)]
pub struct BattlefieldResource(pub Battlefield);

/// Maps battlefield ids to entities.
#[derive(Resource, Debug, Default)]
pub struct UnitIndex(pub HashMap<ObjectId, Entity>);

/// Events applied since the log was last drained.
#[derive(Resource, Debug, Default)]
pub struct BattlefieldLog(pub Vec<BattlefieldEvent>);

/// Reports every moving vehicle's position to the battlefield.
///
/// Aggregated vehicles are not integrated and therefore do not move.
pub fn battlefield_motion_system(
    mut battlefield: ResMut<BattlefieldResource>,
    query: Query<(&UnitId, &Vehicle), Without<Aggregated>>,
) {
    for (id, vehicle) in query.iter() {
        if let Err(err) = battlefield.0.set_unit_position(id.0, vehicle.body.position) {
            error!("battlefield motion for {}: {err}", id.0);
        }
    }
}

/// Completes pending removals and applies queued battlefield events.
pub fn battlefield_update_system(
    mut commands: Commands,
    mut battlefield: ResMut<BattlefieldResource>,
    mut index: ResMut<UnitIndex>,
    mut log: ResMut<BattlefieldLog>,
) {
    if let Err(err) = battlefield.0.update() {
        error!("battlefield update failed: {err}");
    }
    for event in battlefield.0.drain_events() {
        match event {
            BattlefieldEvent::Aggregate(id) => {
                if let Some(&entity) = index.0.get(&id) {
                    commands.entity(entity).insert(Aggregated);
                }
            }
            BattlefieldEvent::Deaggregate(id) => {
                if let Some(&entity) = index.0.get(&id) {
                    commands.entity(entity).remove::<Aggregated>();
                }
            }
            BattlefieldEvent::ScheduleShow(id) => {
                if let Some(&entity) = index.0.get(&id) {
                    commands.entity(entity).insert(Visible);
                }
            }
            BattlefieldEvent::ScheduleHide(id) => {
                if let Some(&entity) = index.0.get(&id) {
                    commands.entity(entity).remove::<Visible>();
                }
            }
            BattlefieldEvent::Removed(id) => {
                if let Some(entity) = index.0.remove(&id) {
                    commands.entity(entity).despawn();
                }
            }
            BattlefieldEvent::BubbleEntered { human, unit } => debug!("{unit} entered the bubble of {human}"),
            BattlefieldEvent::BubbleLeft { human, unit } => debug!("{unit} left the bubble of {human}"),
        }
        log.0.push(event);
    }
}
