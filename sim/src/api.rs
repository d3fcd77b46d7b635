//! Public API for the simulation.
//!
//! [`SimWorld`] owns the ECS world and its schedules and is the one entry
//! point a client (renderer, network host, test) needs.
//!
//! ## Fixed Timestep
//!
//! The simulation uses a fixed timestep internally (default 30 Hz). When
//! `step(dt)` is called, the simulation accumulates time and runs fixed
//! updates as needed, so results do not depend on the caller's frame rate.
//!
//! ## Tick order
//!
//! 1. flight: `flight_control_system` then `physics_system`
//! 2. battlefield: `battlefield_motion_system`, `battlefield_update_system`,
//!    then `cell_motion_system` and `cell_update_system`, which advance the
//!    cell grid within `SimConfig::active_cell_budget_ms`

use crate::battlefield::{Battlefield, ControlMode, ObjectId};
use crate::cells::{CellUnit, VirtualBattlefield};
use crate::components::*;
use crate::config::SimConfig;
use crate::error::{BattlefieldError, SimResult};
use crate::profiler::Profiler;
use crate::physics::RigidBodyState;
use crate::systems::*;
use crate::terrain::TerrainResource;
use crate::world::Snapshot;
use bevy_ecs::prelude::*;
use glam::{DQuat, DVec3};
use log::{error, info};
use std::collections::HashMap;
use std::time::Duration;

/// The main simulation world container.
pub struct SimWorld {
    world: World,
    flight: Schedule,
    battlefield: Schedule,
    tick: u64,
    time: f64,
    /// Accumulated time for fixed timestep.
    time_accumulator: f64,
    /// Battlefield static id to cell grid feature group id.
    feature_groups: HashMap<ObjectId, ObjectId>,
    profiler: Profiler,
}

impl SimWorld {
    /// Create a simulation world with the default configuration.
    pub fn new() -> Self {
        Self::build(SimConfig::default())
    }

    /// Create a simulation world with a custom configuration.
    pub fn with_config(config: SimConfig) -> SimResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: SimConfig) -> Self {
        let mut world = World::new();
        let extent = config.battlefield.world_size + 2.0 * config.battlefield.margin;
        let budget = Duration::try_from_secs_f64(config.fixed_timestep).unwrap_or_default();

        world.insert_resource(DeltaTime(config.fixed_timestep));
        world.insert_resource(TerrainResource::flat(extent));
        world.insert_resource(BattlefieldResource(Battlefield::new(&config.battlefield)));
        world.insert_resource(UnitIndex::default());
        world.insert_resource(BattlefieldLog::default());
        let grid = VirtualBattlefield::new(&config.cells).unwrap_or_else(|err| {
            error!("cell grid config rejected ({err}), using defaults");
            VirtualBattlefield::default()
        });
        world.insert_resource(CellGridResource(grid));
        world.insert_resource(CellLog::default());
        world.insert_resource(config);

        let mut flight = Schedule::default();
        flight.add_systems((flight_control_system, physics_system).chain());

        let mut battlefield = Schedule::default();
        battlefield.add_systems(
            (battlefield_motion_system, battlefield_update_system, cell_motion_system, cell_update_system).chain(),
        );

        Self {
            world,
            flight,
            battlefield,
            tick: 0,
            time: 0.0,
            time_accumulator: 0.0,
            feature_groups: HashMap::new(),
            profiler: Profiler::new(budget),
        }
    }

    /// Replace the terrain vehicles collide with.
    pub fn with_terrain(mut self, terrain: TerrainResource) -> Self {
        self.world.insert_resource(terrain);
        self
    }

    pub fn config(&self) -> &SimConfig {
        self.world.resource::<SimConfig>()
    }

    /// Step the simulation forward by `dt` seconds.
    ///
    /// Uses fixed timestep internally - accumulates time and runs fixed
    /// updates as needed.
    pub fn step(&mut self, dt: f64) {
        let fixed_dt = self.config().fixed_timestep;
        self.time_accumulator += dt;
        while self.time_accumulator >= fixed_dt {
            self.fixed_update(fixed_dt);
            self.time_accumulator -= fixed_dt;
        }
    }

    /// Run a single fixed timestep update.
    fn fixed_update(&mut self, dt: f64) {
        self.world.resource_mut::<DeltaTime>().0 = dt;

        #[cfg(feature = "profile")]
        {
            self.profiler.time_section("flight", || self.flight.run(&mut self.world));
            self.profiler.time_section("battlefield", || self.battlefield.run(&mut self.world));
            self.profiler.tick();
        }

        #[cfg(not(feature = "profile"))]
        {
            self.flight.run(&mut self.world);
            self.battlefield.run(&mut self.world);
        }

        self.tick += 1;
        self.time += dt;
    }

    /// Build a vehicle from `desc` and place it on the battlefield.
    ///
    /// The vehicle starts with whatever aggregation and visibility the
    /// battlefield assigns at `position`.
    pub fn spawn_vehicle(
        &mut self,
        desc: &VehicleDesc,
        control: ControlMode,
        position: DVec3,
        velocity: DVec3,
        attitude: DQuat,
    ) -> SimResult<ObjectId> {
        let config = self.config();
        let mut vehicle = desc.build(config.solver, config.max_substep)?;
        vehicle.body = RigidBodyState::new(position, velocity, attitude);

        let mut battlefield = self.world.resource_mut::<BattlefieldResource>();
        let id = battlefield.0.add_unit(desc.kind, control);
        battlefield.0.set_unit_position(id, position)?;
        let (aggregated, visible) = battlefield
            .0
            .unit(id)
            .map(|u| (u.aggregated, u.visible))
            .ok_or(BattlefieldError::NotFound(id))?;

        let cell_id = self.world.resource_mut::<CellGridResource>().0.add_unit(desc.kind, control, position)?;

        let mut entity = self.world.spawn((vehicle, UnitId(id), CellUnitId(cell_id), Control(control)));
        if aggregated {
            entity.insert(Aggregated);
        }
        if visible {
            entity.insert(Visible);
        }
        let entity = entity.id();
        self.world.resource_mut::<UnitIndex>().0.insert(id, entity);
        info!("spawned vehicle '{}' as {id} ({control:?})", desc.name);
        Ok(id)
    }

    /// Queue a vehicle for removal; it disappears during the next tick.
    pub fn remove_vehicle(&mut self, id: ObjectId) -> SimResult<()> {
        let entity = self.entity(id)?;
        self.world.resource_mut::<BattlefieldResource>().0.remove_unit(id)?;
        if let Some(cell_id) = self.world.get::<CellUnitId>(entity).copied() {
            self.world.resource_mut::<CellGridResource>().0.remove_unit(cell_id.0)?;
            self.world.entity_mut(entity).remove::<CellUnitId>();
        }
        info!("removing vehicle {id}");
        Ok(())
    }

    /// Hand a vehicle over between a human pilot and an agent.
    pub fn set_control(&mut self, id: ObjectId, control: ControlMode) -> SimResult<()> {
        let entity = self.entity(id)?;
        self.world.resource_mut::<BattlefieldResource>().0.set_control_mode(id, control)?;
        if let Some(cell_id) = self.world.get::<CellUnitId>(entity).copied() {
            self.world.resource_mut::<CellGridResource>().0.set_control_mode(cell_id.0, control)?;
        }
        if let Some(mut current) = self.world.get_mut::<Control>(entity) {
            current.0 = control;
        }
        Ok(())
    }

    /// Move the camera bubble. The cell grid's visual range is fixed by its
    /// configuration, so `radius` only applies to the battlefield.
    pub fn set_camera(&mut self, position: DVec3, radius: f64) {
        self.world.resource_mut::<BattlefieldResource>().0.set_camera(position, radius);
        if let Err(err) = self.world.resource_mut::<CellGridResource>().0.set_camera(Some(position)) {
            error!("cell grid camera: {err}");
        }
    }

    pub fn clear_camera(&mut self) {
        self.world.resource_mut::<BattlefieldResource>().0.clear_camera();
        if let Err(err) = self.world.resource_mut::<CellGridResource>().0.set_camera(None) {
            error!("cell grid camera: {err}");
        }
    }

    /// Write a bus channel on a vehicle (pilot stick, throttle, ...).
    pub fn set_input(&mut self, id: ObjectId, channel: &str, value: f64) -> SimResult<bool> {
        let entity = self.entity(id)?;
        Ok(self.world.get::<Vehicle>(entity).is_some_and(|v| v.set_input(channel, value)))
    }

    /// Add a static feature to both the battlefield and the cell grid.
    pub fn add_static(&mut self, position: DVec3) -> ObjectId {
        let id = self.world.resource_mut::<BattlefieldResource>().0.add_static(position);
        let group = self.world.resource_mut::<CellGridResource>().0.add_feature_group(position);
        self.feature_groups.insert(id, group);
        id
    }

    pub fn remove_static(&mut self, id: ObjectId) -> SimResult<()> {
        self.world.resource_mut::<BattlefieldResource>().0.remove_static(id)?;
        if let Some(group) = self.feature_groups.remove(&id) {
            self.world.resource_mut::<CellGridResource>().0.remove_feature_group(group)?;
        }
        Ok(())
    }

    fn entity(&self, id: ObjectId) -> SimResult<Entity> {
        Ok(*self.world.resource::<UnitIndex>().0.get(&id).ok_or(BattlefieldError::NotFound(id))?)
    }

    pub fn vehicle(&self, id: ObjectId) -> Option<&Vehicle> {
        let entity = self.entity(id).ok()?;
        self.world.get::<Vehicle>(entity)
    }

    pub fn is_aggregated(&self, id: ObjectId) -> Option<bool> {
        let entity = self.entity(id).ok()?;
        Some(self.world.get::<Aggregated>(entity).is_some())
    }

    pub fn vehicle_count(&self) -> usize {
        self.world.resource::<UnitIndex>().0.len()
    }

    pub fn battlefield(&self) -> &Battlefield {
        &self.world.resource::<BattlefieldResource>().0
    }

    pub fn cell_grid(&self) -> &VirtualBattlefield {
        &self.world.resource::<CellGridResource>().0
    }

    /// The vehicle's unit as the cell grid sees it.
    pub fn cell_unit(&self, id: ObjectId) -> Option<&CellUnit> {
        let entity = self.entity(id).ok()?;
        let cell_id = self.world.get::<CellUnitId>(entity)?;
        self.cell_grid().unit(cell_id.0)
    }

    /// Get a snapshot of the current simulation state. Battlefield and
    /// cell grid events are handed out once.
    pub fn snapshot(&mut self) -> Snapshot {
        let mut snapshot = Snapshot::from_world(&mut self.world, self.tick, self.time);
        snapshot.events = std::mem::take(&mut self.world.resource_mut::<BattlefieldLog>().0);
        snapshot.cell_events = std::mem::take(&mut self.world.resource_mut::<CellLog>().0);
        snapshot
    }

    /// Get the snapshot as a JSON string.
    pub fn snapshot_json(&mut self) -> String {
        self.snapshot().to_json().unwrap_or_else(|_| "{}".to_string())
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn current_time(&self) -> f64 {
        self.time
    }

    /// Section timings; only populated with the `profile` feature.
    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    /// Get direct access to the ECS world (for advanced usage).
    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battlefield::BattlefieldEvent;
    use crate::cells::CellEvent;
    use crate::error::SimError;

    fn cruise(sim: &mut SimWorld, control: ControlMode, position: DVec3) -> ObjectId {
        sim.spawn_vehicle(&VehicleDesc::default(), control, position, DVec3::new(0.0, 60.0, 0.0), DQuat::IDENTITY)
            .unwrap()
    }

    #[test]
    fn test_new_world() {
        let sim = SimWorld::new();
        assert_eq!(sim.current_tick(), 0);
        assert_eq!(sim.vehicle_count(), 0);
    }

    #[test]
    fn test_step_advances_tick() {
        let mut sim = SimWorld::new();
        sim.step(0.05);
        assert_eq!(sim.current_tick(), 1);
        sim.step(0.05);
        assert!((2..=3).contains(&sim.current_tick()));
    }

    #[test]
    fn test_human_flies_agent_far_away_frozen() {
        let mut sim = SimWorld::new();
        let human = cruise(&mut sim, ControlMode::Human, DVec3::new(0.0, 0.0, 1000.0));
        let far = cruise(&mut sim, ControlMode::Agent, DVec3::new(80_000.0, 0.0, 1000.0));
        assert_eq!(sim.is_aggregated(human), Some(false));
        assert_eq!(sim.is_aggregated(far), Some(true));

        sim.step(1.0);
        let flown = sim.vehicle(human).unwrap().body.position;
        assert!(flown.y > 50.0, "human vehicle only reached {flown}");
        assert_eq!(sim.vehicle(far).unwrap().body.position, DVec3::new(80_000.0, 0.0, 1000.0));
    }

    #[test]
    fn test_agent_near_human_is_simulated() {
        let mut sim = SimWorld::new();
        cruise(&mut sim, ControlMode::Human, DVec3::new(0.0, 0.0, 1000.0));
        let wingman = cruise(&mut sim, ControlMode::Agent, DVec3::new(200.0, 0.0, 1000.0));
        assert_eq!(sim.is_aggregated(wingman), Some(false));
        sim.step(0.5);
        assert!(sim.vehicle(wingman).unwrap().body.position.y > 20.0);
    }

    #[test]
    fn test_remove_vehicle() {
        let mut sim = SimWorld::new();
        let id = cruise(&mut sim, ControlMode::Agent, DVec3::new(0.0, 0.0, 1000.0));
        sim.remove_vehicle(id).unwrap();
        assert_eq!(sim.vehicle_count(), 1);
        sim.step(1.0 / 30.0);
        assert_eq!(sim.vehicle_count(), 0);
        assert!(sim.vehicle(id).is_none());
        let snapshot = sim.snapshot();
        assert!(snapshot.events.contains(&BattlefieldEvent::Removed(id)));
        assert!(matches!(
            sim.set_control(id, ControlMode::Human),
            Err(SimError::Battlefield(BattlefieldError::NotFound(_)))
        ));
    }

    #[test]
    fn test_control_handover() {
        let mut sim = SimWorld::new();
        let id = cruise(&mut sim, ControlMode::Agent, DVec3::new(50_000.0, 0.0, 1000.0));
        assert_eq!(sim.is_aggregated(id), Some(true));
        sim.set_control(id, ControlMode::Human).unwrap();
        sim.step(1.0 / 30.0);
        assert_eq!(sim.is_aggregated(id), Some(false));
        let snapshot = sim.snapshot();
        assert_eq!(snapshot.vehicles[0].control, ControlMode::Human);
    }

    #[test]
    fn test_camera_marks_visible() {
        let mut sim = SimWorld::new();
        let id = cruise(&mut sim, ControlMode::Agent, DVec3::new(1000.0, 0.0, 500.0));
        sim.set_camera(DVec3::ZERO, 5000.0);
        sim.step(1.0 / 30.0);
        assert!(sim.snapshot().vehicle(id.0).unwrap().visible);
        sim.clear_camera();
        sim.step(1.0 / 30.0);
        assert!(!sim.snapshot().vehicle(id.0).unwrap().visible);
    }

    #[test]
    fn test_cell_grid_follows_budget() {
        let config = SimConfig { active_cell_budget_ms: 0.0, ..Default::default() };
        let mut sim = SimWorld::with_config(config).unwrap();
        let fixed = sim.config().fixed_timestep;
        cruise(&mut sim, ControlMode::Human, DVec3::new(0.0, 0.0, 1000.0));
        let wingman = cruise(&mut sim, ControlMode::Agent, DVec3::new(2500.0, 0.0, 1000.0));
        let active = sim.cell_grid().active_cell_count();
        assert!(active > 1);

        // A zero budget still advances one active cell per tick.
        sim.step(fixed);
        assert!(sim.cell_grid().needs_update());
        for _ in 1..active {
            sim.step(fixed);
        }
        assert!(!sim.cell_grid().needs_update());
        assert!(!sim.cell_unit(wingman).unwrap().aggregated);
        let snapshot = sim.snapshot();
        assert!(snapshot.cell_events.iter().any(|e| matches!(e, CellEvent::Deaggregate(_))));
    }

    #[test]
    fn test_cell_grid_tracks_vehicles_and_camera() {
        let mut sim = SimWorld::new();
        let id = cruise(&mut sim, ControlMode::Agent, DVec3::new(0.0, 0.0, 1000.0));
        assert!(sim.cell_unit(id).unwrap().aggregated);

        sim.set_control(id, ControlMode::Human).unwrap();
        assert!(!sim.cell_unit(id).unwrap().aggregated);

        sim.set_camera(DVec3::ZERO, 5000.0);
        let feature = sim.add_static(DVec3::new(100.0, 100.0, 0.0));
        sim.step(sim.config().fixed_timestep);
        let events = sim.snapshot().cell_events;
        assert!(events.iter().any(|e| matches!(e, CellEvent::AddFeatureCell(_))));
        assert!(events.iter().any(|e| matches!(e, CellEvent::EnterScene(_))));

        sim.remove_static(feature).unwrap();
        assert!(sim.feature_groups.is_empty());
        sim.remove_vehicle(id).unwrap();
        assert!(sim.cell_unit(id).is_none());
        assert_eq!(sim.cell_grid().unit_count(), 0);
    }

    #[test]
    fn test_snapshot_json() {
        let mut sim = SimWorld::new();
        cruise(&mut sim, ControlMode::Human, DVec3::new(0.0, 0.0, 1000.0));
        sim.step(0.1);
        let json = sim.snapshot_json();
        assert!(json.contains("vehicles"));
        assert!(json.contains("trainer"));
        assert!(json.contains("airspeed"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SimConfig { fixed_timestep: -1.0, ..Default::default() };
        assert!(matches!(SimWorld::with_config(config), Err(SimError::Config(_))));
    }

    #[test]
    fn test_set_input_reaches_bus() {
        let mut sim = SimWorld::new();
        let id = cruise(&mut sim, ControlMode::Human, DVec3::new(0.0, 0.0, 1000.0));
        assert!(sim.set_input(id, crate::bus::channels::THROTTLE, 1.0).unwrap());
        assert!(!sim.set_input(id, "No.Such.Channel", 1.0).unwrap());
        assert!(sim.set_input(ObjectId(999), crate::bus::channels::THROTTLE, 1.0).is_err());
    }
}
