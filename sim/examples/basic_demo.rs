//! Basic demonstration of the simulation core.
//!
//! Run with: cargo run --example basic_demo
//! Add `RUST_LOG=debug` to watch bubble events as they happen.

use csp_sim::{ControlMode, SimWorld, VehicleDesc};
use glam::{DQuat, DVec3};

fn main() {
    env_logger::init();
    println!("=== Combat Simulator - Flight & Battlefield Demo ===\n");

    let mut sim = SimWorld::new();
    let trainer = VehicleDesc::default();
    let cruise = DVec3::new(0.0, 70.0, 0.0);

    // A player, a wingman inside the player's bubble and a distant flight.
    let player = sim
        .spawn_vehicle(&trainer, ControlMode::Human, DVec3::new(0.0, 0.0, 1500.0), cruise, DQuat::IDENTITY)
        .expect("player spawn");
    sim.spawn_vehicle(&trainer, ControlMode::Agent, DVec3::new(300.0, -200.0, 1500.0), cruise, DQuat::IDENTITY)
        .expect("wingman spawn");
    for i in 0..3 {
        let position = DVec3::new(70_000.0 + 500.0 * i as f64, 0.0, 3000.0);
        sim.spawn_vehicle(&trainer, ControlMode::Agent, position, -cruise, DQuat::IDENTITY)
            .expect("bandit spawn");
    }
    sim.set_camera(DVec3::new(0.0, -50.0, 1510.0), 5_000.0);

    println!("Initial state:");
    print_snapshot(&mut sim);

    println!("\nRunning 20 seconds at 30 Hz...\n");
    for second in 0..20 {
        if second == 5 {
            println!("--- pulling up ---");
            sim.set_input(player, "ControlInputs.PitchInput", 0.3).expect("pitch input");
        }
        for _ in 0..30 {
            sim.step(1.0 / 30.0);
        }
        if (second + 1) % 5 == 0 {
            println!("--- Tick {} (t={:.1}s) ---", sim.current_tick(), sim.current_time());
            print_snapshot(&mut sim);
        }
    }

    println!("\n=== Final State (JSON) ===\n");
    println!("{}", sim.snapshot().to_json_pretty().expect("snapshot json"));

    #[cfg(feature = "profile")]
    sim.profiler().print_summary();
}

fn print_snapshot(sim: &mut SimWorld) {
    let snapshot = sim.snapshot();
    for event in &snapshot.events {
        println!("  event: {event:?}");
    }
    if !snapshot.cell_events.is_empty() {
        println!("  cell grid: {} events", snapshot.cell_events.len());
    }
    for v in &snapshot.vehicles {
        println!(
            "  {:>3} {:<8} pos=({:>9.1}, {:>9.1}, {:>7.1}) v={:>6.1} alpha={:>5.2} g={:>4.2} {}{}",
            v.id,
            format!("{:?}", v.control),
            v.position.x,
            v.position.y,
            v.position.z,
            v.airspeed,
            v.alpha,
            v.g_load,
            if v.aggregated { "[aggregated]" } else { "[live]" },
            if v.visible { " [visible]" } else { "" },
        );
    }
}
