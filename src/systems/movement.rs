//! Movement system - steering, local avoidance and integration.
//!
//! Only `Moving` units are integrated. Each tick a unit runs only if its
//! update bucket matches the tick (see [`SimTick::should_update`]); visible
//! units get the full steering path, off-screen units a straight-line step.

use crate::components::*;
use crate::flow_field::FlowFieldCache;
use crate::math::{flat, flat_distance, flat_distance_sq, yaw_of, Vec3};
use crate::spatial::SpatialIndex;
use crate::store::UnitStore;
use crate::systems::{RouteAdvisor, SimConfig, SimTick, SimTime, UpdateTier, VisibilityMask};
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

/// Resource containing the delta time for the current tick.
#[derive(Resource, Default)]
pub struct DeltaTime(pub f32);

/// Per-tick movement counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementStats {
    /// Visible units that ran steering and avoidance.
    pub full_updates: u32,
    /// Off-screen units that took a straight-line step.
    pub simple_updates: u32,
    /// Units that reached their own target.
    pub arrivals: u32,
    /// Units halted together with an arriving neighbor.
    pub synchronized_stops: u32,
}

/// Per-tick driver state: route shaping plus reusable scratch buffers so the
/// hot loop does not allocate.
#[derive(Resource, Debug, Default)]
pub struct MovementEngine {
    advisor: RouteAdvisor,
    neighbors: Vec<UnitHandle>,
    candidates: Vec<(f32, UnitHandle)>,
    stats: MovementStats,
}

impl MovementEngine {
    pub fn from_config(config: &SimConfig) -> Self {
        Self {
            advisor: RouteAdvisor::from_config(config),
            neighbors: Vec::with_capacity(64),
            candidates: Vec::with_capacity(16),
            stats: MovementStats::default(),
        }
    }

    /// Counters from the most recent tick.
    pub fn stats(&self) -> MovementStats {
        self.stats
    }

    pub fn advisor(&self) -> &RouteAdvisor {
        &self.advisor
    }

    // ========================================================================
    // FULL UPDATE
    // ========================================================================

    /// Steering with avoidance for a visible unit.
    #[allow(clippy::too_many_arguments)]
    fn full_update(
        &mut self,
        config: &SimConfig,
        handle: UnitHandle,
        dt: f32,
        now: f64,
        store: &mut UnitStore,
        index: &mut SpatialIndex,
        flow: &mut FlowFieldCache,
    ) {
        let (Some(pos), Some(vel), Some(target)) = (
            store.position(handle),
            store.velocity(handle),
            store.target_position(handle),
        ) else {
            return;
        };
        self.stats.full_updates += 1;

        if flat_distance(pos, target) < config.arrival_threshold {
            self.arrive(config, handle, pos, target, store, index);
            return;
        }

        let preferred = self.advisor.preferred_velocity(store, handle, flow, now);
        let avoidance = self.avoidance_force(config, handle, pos, vel, store, index);

        let steering = (preferred + avoidance - vel).clamp_length_max(config.max_steering_force);
        let new_vel = flat(vel + steering * dt).clamp_length_max(store.speed(handle));
        let new_pos = pos + new_vel * dt;

        store.set_motion(handle, new_pos, new_vel);
        if new_vel.length() > config.facing_epsilon {
            store.set_facing(handle, yaw_of(new_vel));
        }
        index.update_position(handle, pos, new_pos);
    }

    /// Stop an arriving unit and halt nearby movers that are almost there too.
    ///
    /// A mover headed for the same point from farther out is not halted. It
    /// keeps walking and arrives on its own, sidestepping the stopped unit.
    fn arrive(
        &mut self,
        config: &SimConfig,
        handle: UnitHandle,
        pos: Vec3,
        target: Vec3,
        store: &mut UnitStore,
        index: &SpatialIndex,
    ) {
        let remaining = flat_distance(pos, target);
        store.arrive(handle);
        self.stats.arrivals += 1;
        tracing::trace!(handle = handle.0, x = pos.x, z = pos.z, "unit arrived");

        let radius = config.stop_propagation_radius;
        let stop_distance = config.sync_stop_distance();
        index.query_cells_into(pos, radius, &mut self.neighbors);
        for &other in &self.neighbors {
            if other == handle || store.state(other) != UnitState::Moving {
                continue;
            }
            let (Some(other_pos), Some(other_target)) =
                (store.position(other), store.target_position(other))
            else {
                continue;
            };
            if flat_distance_sq(pos, other_pos) > radius * radius {
                continue;
            }
            let other_remaining = flat_distance(other_pos, other_target);
            if other_target == target && other_remaining > remaining {
                continue;
            }
            if other_remaining <= stop_distance {
                store.arrive(other);
                self.stats.synchronized_stops += 1;
            }
        }
    }

    /// Sum of push-away forces from the closest neighbors inside the
    /// separation distance. A neighbor ahead of the heading also adds a
    /// push along its rim, scaled by how squarely it blocks the way, so a
    /// unit backs off around a stopped one instead of pressing into it.
    fn avoidance_force(
        &mut self,
        config: &SimConfig,
        handle: UnitHandle,
        pos: Vec3,
        vel: Vec3,
        store: &UnitStore,
        index: &SpatialIndex,
    ) -> Vec3 {
        let separation_sq = config.separation_distance * config.separation_distance;
        index.query_cells_into(pos, config.avoidance_radius, &mut self.neighbors);

        self.candidates.clear();
        for &other in &self.neighbors {
            if other == handle {
                continue;
            }
            // Dead units have no position.
            let Some(other_pos) = store.position(other) else {
                continue;
            };
            let dist_sq = flat_distance_sq(pos, other_pos);
            if dist_sq < separation_sq {
                self.candidates.push((dist_sq, other));
            }
        }

        if self.candidates.len() > config.max_avoidance_neighbors {
            self.candidates
                .sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            self.candidates.truncate(config.max_avoidance_neighbors);
        }

        let horizon = config.prediction_horizon;
        let speed = vel.length();
        let heading = if speed > config.facing_epsilon {
            Some(vel / speed)
        } else {
            None
        };
        let max_speed = store.speed(handle);
        let mut force = Vec3::ZERO;
        for &(dist_sq, other) in &self.candidates {
            let other_pos = store.position(other).unwrap_or(pos);
            let other_vel = store.velocity(other).unwrap_or(Vec3::ZERO);

            let predicted = flat_distance(pos + vel * horizon, other_pos + other_vel * horizon);
            let effective = dist_sq.sqrt().min(predicted).max(config.min_avoidance_distance);

            let away = flat(pos - other_pos);
            let direction = if away.length_squared() > 1e-12 {
                away.normalize()
            } else {
                coincident_direction(handle, other)
            };
            force += direction * (config.avoidance_strength / effective);

            if let Some(heading) = heading {
                let ahead = -direction.dot(heading);
                if ahead > 0.0 {
                    force += sidestep(heading, direction) * (max_speed * ahead);
                }
            }
        }
        force
    }

    // ========================================================================
    // SIMPLE UPDATE
    // ========================================================================

    /// Straight-line step for an off-screen unit. Never overshoots.
    fn simple_update(
        &mut self,
        config: &SimConfig,
        handle: UnitHandle,
        dt: f32,
        store: &mut UnitStore,
        index: &mut SpatialIndex,
    ) {
        let (Some(pos), Some(target)) = (store.position(handle), store.target_position(handle))
        else {
            return;
        };
        self.stats.simple_updates += 1;

        let to_target = flat(target - pos);
        let distance = to_target.length();
        if distance < config.arrival_threshold {
            store.arrive(handle);
            self.stats.arrivals += 1;
            return;
        }

        let direction = to_target / distance;
        let speed = store.speed(handle);
        let step = (speed * dt).min(distance);
        let new_pos = pos + direction * step;

        store.set_motion(handle, new_pos, direction * speed);
        store.set_facing(handle, yaw_of(direction));
        index.update_position(handle, pos, new_pos);

        if distance - step < config.arrival_threshold {
            store.arrive(handle);
            self.stats.arrivals += 1;
        }
    }
}

/// Push direction for two units at the same point: deterministic from the
/// handle pair and opposite for each side.
fn coincident_direction(me: UnitHandle, other: UnitHandle) -> Vec3 {
    let (lo, hi) = if me < other { (me, other) } else { (other, me) };
    let seed = lo.0.wrapping_mul(0x9E37_79B9) ^ hi.0.wrapping_mul(0x85EB_CA6B);
    let angle = (seed % 3600) as f32 * (TAU / 3600.0);
    let direction = Vec3::new(angle.sin(), 0.0, angle.cos());
    if me < other {
        direction
    } else {
        -direction
    }
}

/// Unit vector along the blocker's rim that works against `heading`.
/// A blocker dead ahead is rounded on a fixed side, so two units meeting
/// head-on pass each other.
fn sidestep(heading: Vec3, away: Vec3) -> Vec3 {
    let tangent = Vec3::new(-away.z, 0.0, away.x);
    // Sign of heading x to-blocker in the XZ plane.
    let cross = heading.z * away.x - heading.x * away.z;
    if cross > 1e-3 {
        -tangent
    } else {
        tangent
    }
}

/// System that advances every moving unit whose bucket is due this tick.
///
/// ## Data Access
/// - Reads: SimConfig, SimTick, SimTime, DeltaTime, VisibilityMask
/// - Writes: UnitStore, SpatialIndex, FlowFieldCache, MovementEngine
#[allow(clippy::too_many_arguments)]
pub fn movement_system(
    config: Res<SimConfig>,
    tick: Res<SimTick>,
    time: Res<SimTime>,
    dt: Res<DeltaTime>,
    visibility: Res<VisibilityMask>,
    mut store: ResMut<UnitStore>,
    mut index: ResMut<SpatialIndex>,
    mut flow: ResMut<FlowFieldCache>,
    mut engine: ResMut<MovementEngine>,
) {
    let engine = &mut *engine;
    engine.stats = MovementStats::default();

    for i in 0..store.slot_count() {
        let handle = UnitHandle(i as u32);
        if store.state(handle) != UnitState::Moving {
            continue;
        }

        let tier = visibility.tier(i);
        let buckets = tier.buckets(&config);
        if !tick.should_update(i, buckets) {
            continue;
        }
        let step_dt = dt.0 * buckets as f32;

        match tier {
            UpdateTier::Visible => {
                engine.full_update(&config, handle, step_dt, time.0, &mut store, &mut index, &mut flow)
            }
            UpdateTier::Offscreen => {
                engine.simple_update(&config, handle, step_dt, &mut store, &mut index)
            }
        }
    }
}
