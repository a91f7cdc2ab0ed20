//! Basic demonstration of the Horde movement core.
//!
//! Run with: cargo run --example basic_demo
//! Add `--features profile` for a per-section timing table.

use horde_sim::math::{Frustum, Mat4, Vec3};
use horde_sim::render_bridge::snapshot_to_flatbuffer;
use horde_sim::{PlayerId, SimWorld, UnitEvent, UnitState};

fn main() {
    println!("=== Horde - Movement Demo ===\n");

    let mut sim = SimWorld::new_demo_world();

    println!("Initial state:");
    print_summary(&sim);

    // Each army marches to the other side, in squads of 25.
    println!("\n--- Issuing group move orders ---\n");
    for player in [PlayerId(0), PlayerId(1)] {
        let army: Vec<_> = sim
            .store()
            .iter_alive()
            .filter(|h| sim.store().owner(*h) == Some(player))
            .collect();
        let side = if player == PlayerId(0) { 1.0 } else { -1.0 };
        for (i, squad) in army.chunks(25).enumerate() {
            let lane = -54.0 + (i % 10) as f32 * 12.0;
            sim.command_move_group(squad, Vec3::new(60.0 * side, 0.0, lane));
        }
    }

    // Camera looking down at the map center; only units inside the frustum
    // get the full avoidance update.
    let view = Mat4::look_at_rh(Vec3::new(0.0, 80.0, 40.0), Vec3::ZERO, Vec3::Y);
    let projection = Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.1, 500.0);
    let frustum = Frustum::from_view_projection(projection * view);

    println!("Running 900 ticks (30 seconds at 30 ticks/sec)...\n");
    let mut arrivals = 0;
    for tick in 0..900 {
        sim.tick(1.0 / 30.0, |p| frustum.contains_sphere(p, 1.0));
        arrivals += sim
            .drain_events()
            .iter()
            .filter(|e| matches!(e, UnitEvent::Arrived { .. }))
            .count();

        if (tick + 1) % 150 == 0 {
            println!("--- Tick {} (t={:.1}s) ---", sim.current_tick(), sim.current_time());
            print_summary(&sim);
            println!("  arrivals so far: {arrivals}");
        }
    }

    #[cfg(feature = "profile")]
    println!("\n=== Tick Profile ===\n{}", sim.profiler().summary());

    let buffer = snapshot_to_flatbuffer(&sim.snapshot());
    println!("\nRender buffer: {} floats", buffer.len());

    println!("\n=== Final Diagnostics (JSON) ===\n");
    let snapshot = sim.snapshot();
    match serde_json::to_string_pretty(&(snapshot.movement, snapshot.flow_cache)) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("failed to serialize diagnostics: {e}"),
    }
}

fn print_summary(sim: &SimWorld) {
    let snapshot = sim.snapshot();
    for player in 0..2u8 {
        let units = snapshot.units.iter().filter(|u| u.player == player);
        let (count, moving, sum_x) = units.fold((0, 0, 0.0), |(n, m, x), u| {
            (n + 1, m + usize::from(u.state == UnitState::Moving), x + u.x)
        });
        let mean_x = if count > 0 { sum_x / count as f32 } else { 0.0 };
        println!("  Player {player}: {count} units, {moving} moving, mean x={mean_x:.1}");
    }
    let m = snapshot.movement;
    println!(
        "  last tick: {} full / {} simple updates, flow fields generated={}",
        m.full_updates, m.simple_updates, snapshot.flow_cache.generated
    );
}
