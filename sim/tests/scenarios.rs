//! End-to-end scenarios through the public API.

use csp_sim::battlefield::{GlobalBattlefield, NetMessage, PeerId};
use csp_sim::ode::{NumericalMethod, RungeKutta2, RungeKuttaCK, VectorField};
use csp_sim::{Battlefield, BattlefieldConfig, BattlefieldEvent, ControlMode, ObjectId, UnitKind};
use glam::DVec3;

fn bubble_config() -> BattlefieldConfig {
    BattlefieldConfig { air_bubble: 1_000.0, ground_bubble: 500.0, ..Default::default() }
}

fn count(events: &[BattlefieldEvent], wanted: BattlefieldEvent) -> usize {
    events.iter().filter(|&&e| e == wanted).count()
}

struct FreeFall;

impl VectorField for FreeFall {
    fn dimension(&self) -> usize {
        2
    }

    fn derivative(&self, _t: f64, y: &[f64], dydt: &mut [f64]) {
        dydt[0] = y[1];
        dydt[1] = -9.8;
    }
}

#[test]
fn test_human_deaggregates_then_aggregates_agent() {
    let mut bf = Battlefield::new(&bubble_config());
    let human = bf.add_unit(UnitKind::Air, ControlMode::Human);
    let agent = bf.spawn_unit(UnitKind::Air, ControlMode::Agent, DVec3::new(500.0, 0.0, 0.0)).unwrap();
    bf.drain_events();
    assert_eq!(bf.unit(agent).unwrap().aggregation_count, 0);

    bf.set_unit_position(human, DVec3::ZERO).unwrap();
    let events = bf.drain_events();
    assert_eq!(count(&events, BattlefieldEvent::Deaggregate(agent)), 1);
    assert_eq!(count(&events, BattlefieldEvent::Aggregate(agent)), 0);
    assert_eq!(bf.unit(agent).unwrap().aggregation_count, 1);
    assert!(!bf.unit(agent).unwrap().aggregated);

    bf.set_unit_position(human, DVec3::new(5_000.0, 0.0, 0.0)).unwrap();
    let events = bf.drain_events();
    assert_eq!(count(&events, BattlefieldEvent::Aggregate(agent)), 1);
    assert_eq!(count(&events, BattlefieldEvent::Deaggregate(agent)), 0);
    assert_eq!(bf.unit(agent).unwrap().aggregation_count, 0);
    assert!(bf.unit(agent).unwrap().aggregated);

    bf.check_consistency().unwrap();
}

#[test]
fn test_free_fall_one_second() {
    let y0 = [0.0, 0.0];

    let quick = RungeKuttaCK::default().quick_solve(&FreeFall, &y0, 0.0, 1.0);
    assert!((quick[0] + 4.9).abs() < 1e-9, "{quick:?}");
    assert!((quick[1] + 9.8).abs() < 1e-9, "{quick:?}");

    let mut ck = RungeKuttaCK::default();
    let adaptive = ck.enhanced_solve(&FreeFall, &y0, 0.0, 1.0);
    assert!(!ck.failed());
    assert!((adaptive[0] + 4.9).abs() < 1e-6, "{adaptive:?}");
    assert!((adaptive[1] + 9.8).abs() < 1e-6, "{adaptive:?}");

    let mut rk = RungeKutta2::default();
    let doubled = rk.enhanced_solve(&FreeFall, &y0, 0.0, 1.0);
    assert!(!rk.failed());
    assert!((doubled[0] + 4.9).abs() < 1e-6, "{doubled:?}");
    assert!((doubled[1] + 9.8).abs() < 1e-6, "{doubled:?}");
}

#[test]
fn test_peers_see_each_other_through_bubbles() {
    let alice = PeerId(1);
    let bob = PeerId(2);
    let config = BattlefieldConfig { air_bubble: 2_000.0, hysteresis: 0.0, ..Default::default() };
    let mut server = GlobalBattlefield::new(&config);
    let mut outbox: Vec<(PeerId, NetMessage)> = Vec::new();

    let alice_jet = ObjectId(100);
    let bob_jet = ObjectId(200);
    let register = |unit, x| NetMessage::RegisterUnit {
        unit,
        kind: UnitKind::Air,
        control: ControlMode::Human,
        position: DVec3::new(x, 0.0, 0.0),
    };

    server.handle_message(alice, register(alice_jet, 0.0), &mut outbox).unwrap();
    server.handle_message(bob, register(bob_jet, 20_000.0), &mut outbox).unwrap();
    assert!(outbox.is_empty(), "far apart peers exchanged {outbox:?}");

    let motion = NetMessage::NotifyUnitMotion { unit: bob_jet, position: DVec3::new(1_000.0, 0.0, 0.0) };
    server.handle_message(bob, motion, &mut outbox).unwrap();
    assert!(server.is_interested(alice, bob_jet));
    assert!(server.is_interested(bob, alice_jet));
    assert!(outbox.iter().any(|(peer, msg)| *peer == alice
        && matches!(msg, NetMessage::CommandAddUnit { unit, owner: Some(o), .. } if *unit == bob_jet && *o == bob)));
    assert!(outbox.contains(&(bob, NetMessage::CommandUpdatePeer { unit: bob_jet, peer: alice, add: true })));
    outbox.clear();

    server.disconnect(bob, &mut outbox).unwrap();
    assert!(outbox.contains(&(alice, NetMessage::CommandRemoveUnit { unit: bob_jet })));
    assert!(server.battlefield().unit(bob_jet).is_none());
    assert!(!server.is_interested(alice, bob_jet));
    assert_eq!(server.owner(alice_jet), Some(alice));
}

#[test]
fn test_registered_id_collision_rejected() {
    let mut server = GlobalBattlefield::new(&BattlefieldConfig::default());
    let mut outbox: Vec<(PeerId, NetMessage)> = Vec::new();
    let msg = NetMessage::RegisterUnit {
        unit: ObjectId(7),
        kind: UnitKind::Ground,
        control: ControlMode::Agent,
        position: DVec3::ZERO,
    };
    server.handle_message(PeerId(1), msg.clone(), &mut outbox).unwrap();
    assert!(server.handle_message(PeerId(2), msg, &mut outbox).is_err());
    assert_eq!(server.owner(ObjectId(7)), Some(PeerId(1)));
}
