//! Invariants checked over longer randomized runs.

use csp_sim::battlefield::{GridPoint, GridTransform};
use csp_sim::cells::{CellEvent, CellGridConfig, UpdateBudget, VirtualBattlefield};
use csp_sim::ode::{NumericalMethod, RungeKutta2, RungeKuttaCK, VectorField};
use csp_sim::physics::{MassProperties, PhysicsModel, RigidBodyState};
use csp_sim::{Battlefield, BattlefieldConfig, BattlefieldEvent, ControlMode, FlatTerrain, ObjectId, UnitKind};
use glam::{DQuat, DVec3};
use std::collections::HashMap;

/// Deterministic xorshift so failures reproduce.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn range(&mut self, lo: f64, hi: f64) -> f64 {
        let unit = (self.next() >> 11) as f64 / (1u64 << 53) as f64;
        lo + unit * (hi - lo)
    }
}

/// Tracks aggregation as seen through events and fails on repeated
/// transitions.
fn apply_events(state: &mut HashMap<ObjectId, bool>, events: &[BattlefieldEvent]) {
    for event in events {
        match *event {
            BattlefieldEvent::Aggregate(id) => {
                let was = state.insert(id, true).unwrap_or(true);
                assert!(!was, "{id} aggregated twice");
            }
            BattlefieldEvent::Deaggregate(id) => {
                let was = state.insert(id, false).unwrap_or(true);
                assert!(was, "{id} deaggregated twice");
            }
            _ => {}
        }
    }
}

#[test]
fn test_aggregation_counts_survive_random_motion() {
    let config = BattlefieldConfig {
        world_size: 20_000.0,
        margin: 1_000.0,
        air_bubble: 3_000.0,
        ground_bubble: 1_500.0,
        hysteresis: 25.0,
        ..Default::default()
    };
    let mut bf = Battlefield::new(&config);
    let mut rng = Rng(0x9E37_79B9_7F4A_7C15);
    let mut state = HashMap::new();

    let mut ids = Vec::new();
    for i in 0..24 {
        let kind = if i % 3 == 0 { UnitKind::Ground } else { UnitKind::Air };
        let control = if i % 4 == 0 { ControlMode::Human } else { ControlMode::Agent };
        let position = DVec3::new(rng.range(-10_000.0, 10_000.0), rng.range(-10_000.0, 10_000.0), 0.0);
        ids.push(bf.spawn_unit(kind, control, position).unwrap());
    }
    apply_events(&mut state, &bf.drain_events());
    bf.check_consistency().unwrap();

    for step in 0..400 {
        let id = ids[(rng.next() % ids.len() as u64) as usize];
        let current = bf.unit(id).unwrap().position;
        let delta = DVec3::new(rng.range(-2_500.0, 2_500.0), rng.range(-2_500.0, 2_500.0), 0.0);
        let target = (current + delta).clamp(DVec3::splat(-10_000.0), DVec3::splat(10_000.0));
        bf.set_unit_position(id, target).unwrap();

        if step % 50 == 49 {
            // Exercise handover while the bubbles are in flux.
            let control = match bf.unit(id).unwrap().control {
                ControlMode::Human => ControlMode::Agent,
                ControlMode::Agent => ControlMode::Human,
            };
            bf.set_control_mode(id, control).unwrap();
        }

        apply_events(&mut state, &bf.drain_events());
        bf.check_consistency().unwrap_or_else(|e| panic!("step {step}: {e}"));
    }

    for unit in bf.units() {
        assert_eq!(state.get(&unit.id).copied().unwrap_or(true), unit.aggregated, "{} out of sync", unit.id);
    }
}

#[test]
fn test_overlapping_humans_do_not_flicker() {
    let config = BattlefieldConfig { air_bubble: 2_000.0, hysteresis: 0.0, ..Default::default() };
    let mut bf = Battlefield::new(&config);
    let agent = bf.spawn_unit(UnitKind::Air, ControlMode::Agent, DVec3::ZERO).unwrap();
    let humans: Vec<ObjectId> = (0..4)
        .map(|i| {
            let p = DVec3::new(300.0 * i as f64, 0.0, 0.0);
            bf.spawn_unit(UnitKind::Air, ControlMode::Human, p).unwrap()
        })
        .collect();
    assert_eq!(bf.unit(agent).unwrap().aggregation_count, 4);
    bf.drain_events();

    for (n, &human) in humans.iter().enumerate() {
        bf.set_unit_position(human, DVec3::new(50_000.0, 0.0, 0.0)).unwrap();
        let events = bf.drain_events();
        let last = n == humans.len() - 1;
        assert_eq!(events.contains(&BattlefieldEvent::Aggregate(agent)), last);
        assert!(!events.contains(&BattlefieldEvent::Deaggregate(agent)));
        assert_eq!(bf.unit(agent).unwrap().aggregation_count, (humans.len() - n - 1) as u32);
    }
    bf.check_consistency().unwrap();
}

fn cell_events(events: &[CellEvent], id: ObjectId) -> Vec<CellEvent> {
    events
        .iter()
        .copied()
        .filter(|e| matches!(*e, CellEvent::Aggregate(u) | CellEvent::Deaggregate(u) if u == id))
        .collect()
}

fn drain_with_single_cells(grid: &mut VirtualBattlefield) -> Vec<CellEvent> {
    let mut events = grid.drain_events();
    let mut rounds = 0;
    while grid.needs_update() {
        grid.update(UpdateBudget::Cells(1));
        events.extend(grid.drain_events());
        rounds += 1;
        assert!(rounds < 100_000, "active cells never settled");
    }
    events
}

#[test]
fn test_single_cell_budget_completes_every_transition() {
    let config = CellGridConfig::default();
    let cell = config.cell_size;
    let mut grid = VirtualBattlefield::new(&config).unwrap();
    let center = DVec3::new(cell / 2.0, cell / 2.0, 0.0);
    let at = |dx: i32, dy: i32| center + DVec3::new(dx as f64 * cell, dy as f64 * cell, 0.0);

    let offsets = [(0, 0), (1, 0), (-3, 0), (0, 3), (2, 2), (-2, -2), (3, 1), (4, 0), (-5, 2), (1, 1), (1, 1)];
    let agents: Vec<(ObjectId, bool)> = offsets
        .iter()
        .map(|&(dx, dy)| {
            let id = grid.add_unit(UnitKind::Air, ControlMode::Agent, at(dx, dy)).unwrap();
            let inside = dx * dx + dy * dy <= (config.air_range * config.air_range) as i32;
            (id, inside)
        })
        .collect();

    let human = grid.add_unit(UnitKind::Air, ControlMode::Human, at(0, 0)).unwrap();
    let events = drain_with_single_cells(&mut grid);
    for &(id, inside) in &agents {
        let expected = if inside { vec![CellEvent::Deaggregate(id)] } else { Vec::new() };
        assert_eq!(cell_events(&events, id), expected, "entering, unit {id}");
        assert_eq!(grid.unit(id).unwrap().aggregated, !inside);
    }

    grid.move_unit(human, at(20, 0)).unwrap();
    let events = drain_with_single_cells(&mut grid);
    for &(id, inside) in &agents {
        let expected = if inside { vec![CellEvent::Aggregate(id)] } else { Vec::new() };
        assert_eq!(cell_events(&events, id), expected, "leaving, unit {id}");
        assert!(grid.unit(id).unwrap().aggregated);
    }

    // One more pass retires the uncovered cells; the r=3 disc is 29 cells.
    grid.update(UpdateBudget::Cells(usize::MAX));
    assert_eq!(grid.active_cell_count(), 29);
}

#[test]
fn test_grid_round_trip_within_resolution() {
    let transform = GridTransform::default();
    let mut rng = Rng(42);
    for _ in 0..1_000 {
        let p = DVec3::new(rng.range(-100_000.0, 100_000.0), rng.range(-100_000.0, 100_000.0), 0.0);
        let g = transform.global_to_grid(p);
        assert!(!g.is_null());
        assert_ne!(g, GridPoint::NULL);
        let back = transform.grid_to_global(g);
        assert!((back.x - p.x).abs() <= transform.resolution(), "{p} -> {g} -> {back}");
        assert!((back.y - p.y).abs() <= transform.resolution(), "{p} -> {g} -> {back}");
    }
}

#[test]
fn test_angular_velocity_never_grows() {
    let mut model = PhysicsModel::new(MassProperties::sphere(50.0, 1.0).unwrap());
    model.set_gravity(0.0);
    let terrain = FlatTerrain::new(0.0);
    let mut body = RigidBodyState::new(DVec3::new(0.0, 0.0, 5_000.0), DVec3::ZERO, DQuat::IDENTITY);
    body.angular_velocity_body = DVec3::new(0.3, -1.2, 2.0);
    body.angular_velocity = body.angular_velocity_body;

    let mut last = body.angular_velocity_body.length();
    for _ in 0..100 {
        model.do_sim_step(&mut body, 0.05, &terrain);
        let now = body.angular_velocity_body.length();
        assert!(now <= last + 1e-12, "spin grew from {last} to {now}");
        last = now;
    }
    assert!(last < DVec3::new(0.3, -1.2, 2.0).length());
}

struct Oscillator;

impl VectorField for Oscillator {
    fn dimension(&self) -> usize {
        2
    }

    fn derivative(&self, _t: f64, y: &[f64], dydt: &mut [f64]) {
        dydt[0] = y[1];
        dydt[1] = -y[0];
    }
}

#[test]
fn test_zero_interval_is_identity() {
    let y0 = [0.7, -0.2];
    assert_eq!(RungeKuttaCK::default().quick_solve(&Oscillator, &y0, 3.0, 0.0), y0.to_vec());
    assert_eq!(RungeKuttaCK::default().enhanced_solve(&Oscillator, &y0, 3.0, 0.0), y0.to_vec());
    assert_eq!(RungeKutta2::default().enhanced_solve(&Oscillator, &y0, 3.0, 0.0), y0.to_vec());

    let mut model = PhysicsModel::new(MassProperties::sphere(1.0, 0.5).unwrap());
    let mut body = RigidBodyState::new(DVec3::new(10.0, 20.0, 300.0), DVec3::new(50.0, 0.0, 0.0), DQuat::IDENTITY);
    let before = body;
    model.do_sim_step(&mut body, 0.0, &FlatTerrain::new(0.0));
    assert_eq!(body, before);
}
