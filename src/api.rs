//! Public API for the simulation.
//!
//! `SimWorld` is the single entry point for a game client: it owns the ECS
//! world holding every store and cache, issues commands, advances ticks and
//! produces snapshots.
//!
//! ## Ticking
//!
//! [`SimWorld::tick`] advances exactly one step of `dt` seconds. The caller
//! passes a visibility predicate (usually built from the camera
//! [`Frustum`](crate::math::Frustum)); units it accepts get the full
//! avoidance update, the rest a cheap straight-line update at a lower rate.
//!
//! [`SimWorld::step`] wraps `tick` in a fixed-timestep accumulator for clients
//! driven by a variable frame rate.

use crate::components::*;
use crate::error::ConfigError;
use crate::flow_field::{flow_budget_system, FlowCacheStats, FlowFieldCache};
use crate::formation::{grid_offsets, FormationPlanner};
use crate::math::{flat_distance_sq, Vec3};
use crate::profiler::Profiler;
use crate::spatial::{spatial_rebuild_system, SpatialIndex};
use crate::store::UnitStore;
use crate::systems::*;
use crate::world::Snapshot;
use bevy_ecs::prelude::*;

/// The main simulation world container.
///
/// Holds the ECS world and schedule, providing a clean API for:
/// - Spawning and removing units
/// - Issuing move orders to single units or groups
/// - Stepping the simulation forward
/// - Extracting state snapshots
pub struct SimWorld {
    world: World,
    schedule: Schedule,
    /// Accumulated frame time not yet consumed by fixed ticks.
    time_accumulator: f32,
    profiler: Profiler,
    /// Reused between ticks.
    visible_buf: Vec<bool>,
}

impl SimWorld {
    /// Create an empty simulation world with the default configuration.
    pub fn new() -> Self {
        Self::build(SimConfig::default())
    }

    /// Create a simulation world with a custom configuration.
    pub fn with_config(config: SimConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: SimConfig) -> Self {
        let mut world = World::new();

        world.insert_resource(UnitStore::new(config.max_units));
        world.insert_resource(SpatialIndex::new(config.spatial_cell_size));
        world.insert_resource(FlowFieldCache::from_config(&config));
        world.insert_resource(FormationPlanner::from_config(&config));
        world.insert_resource(MovementEngine::from_config(&config));

        world.insert_resource(DeltaTime(config.fixed_timestep));
        world.insert_resource(SimTick(0));
        world.insert_resource(SimTime(0.0));
        world.insert_resource(VisibilityMask::default());
        world.insert_resource(config);

        // Budget reset and index rebuild must both precede any neighbor query.
        let mut schedule = Schedule::default();
        schedule.add_systems((flow_budget_system, spatial_rebuild_system, movement_system).chain());

        Self {
            world,
            schedule,
            time_accumulator: 0.0,
            profiler: Profiler::new(),
            visible_buf: Vec::new(),
        }
    }

    /// Two opposing armies of mixed unit types, facing each other across the
    /// map center. Used by the demo and benchmarks.
    pub fn new_demo_world() -> Self {
        let mut sim = Self::new();
        let rows = [
            (UnitType::Soldier, 0.0, 100),
            (UnitType::Archer, -24.0, 64),
            (UnitType::Knight, 24.0, 36),
            (UnitType::Worker, -48.0, 16),
        ];
        for (player, side) in [(PlayerId(0), -1.0), (PlayerId(1), 1.0)] {
            for &(unit_type, z, count) in &rows {
                sim.spawn_mass(player, unit_type, Vec3::new(60.0 * side, 0.0, z), count, 2.0);
            }
        }
        sim
    }

    // ------------------------------------------------------------------
    // Units
    // ------------------------------------------------------------------

    /// Spawn a unit and index it. `None` when the store is at capacity.
    pub fn spawn(&mut self, player: PlayerId, unit_type: UnitType, pos: Vec3) -> Option<UnitHandle> {
        let handle = self.world.resource_mut::<UnitStore>().spawn(player, unit_type, pos)?;
        self.world.resource_mut::<SpatialIndex>().insert(handle, pos);
        Some(handle)
    }

    /// Spawn up to `count` units in a square grid around `center`.
    /// Stops early when the store fills up.
    pub fn spawn_mass(
        &mut self,
        player: PlayerId,
        unit_type: UnitType,
        center: Vec3,
        count: usize,
        spacing: f32,
    ) -> Vec<UnitHandle> {
        let mut spawned = Vec::with_capacity(count);
        for offset in grid_offsets(count, spacing) {
            match self.spawn(player, unit_type, center + offset) {
                Some(handle) => spawned.push(handle),
                None => break,
            }
        }
        spawned
    }

    /// Remove a unit from the store and the spatial index. Idempotent.
    pub fn remove(&mut self, handle: UnitHandle) {
        let Some(pos) = self.store().position(handle) else {
            return;
        };
        self.world.resource_mut::<UnitStore>().remove(handle);
        self.world.resource_mut::<SpatialIndex>().remove(handle, pos);
    }

    /// Apply damage. Returns `true` if the unit died from this hit.
    pub fn damage(&mut self, handle: UnitHandle, amount: f32) -> bool {
        let Some(pos) = self.store().position(handle) else {
            return false;
        };
        let died = self.world.resource_mut::<UnitStore>().damage(handle, amount);
        if died {
            self.world.resource_mut::<SpatialIndex>().remove(handle, pos);
        }
        died
    }

    pub fn heal(&mut self, handle: UnitHandle, amount: f32) {
        self.world.resource_mut::<UnitStore>().heal(handle, amount);
    }

    pub fn is_alive(&self, handle: UnitHandle) -> bool {
        self.store().is_alive(handle)
    }

    /// Max speed of the unit's type, 0 for dead handles.
    pub fn get_speed(&self, handle: UnitHandle) -> f32 {
        self.store().speed(handle)
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Order a single unit to move to `target`.
    pub fn command_move(&mut self, handle: UnitHandle, target: Vec3) {
        self.world.resource_mut::<UnitStore>().set_move_target(handle, target);
    }

    /// Order a group to move into a formation centered on `target`.
    /// Dead handles are ignored; a single live unit goes straight to `target`.
    pub fn command_move_group(&mut self, handles: &[UnitHandle], target: Vec3) {
        let live: Vec<UnitHandle> = handles.iter().copied().filter(|h| self.is_alive(*h)).collect();
        match live.as_slice() {
            [] => {}
            [single] => self.command_move(*single, target),
            _ => {
                let now = self.world.resource::<SimTime>().0;
                let assignments = self
                    .world
                    .resource_scope(|world, mut planner: Mut<FormationPlanner>| {
                        planner.assign_positions(world.resource::<UnitStore>(), &live, target, now)
                    });
                let mut store = self.world.resource_mut::<UnitStore>();
                for (handle, slot) in assignments {
                    store.set_move_target(handle, slot);
                }
            }
        }
    }

    /// Halt a unit in place.
    pub fn command_stop(&mut self, handle: UnitHandle) {
        self.world.resource_mut::<UnitStore>().stop(handle);
    }

    /// Live units within `radius` of `center`, in handle order.
    pub fn query_area(&self, center: Vec3, radius: f32) -> Vec<UnitHandle> {
        let store = self.store();
        let mut candidates = Vec::new();
        self.spatial_index().query_cells_into(center, radius, &mut candidates);

        let radius_sq = radius * radius;
        let mut found: Vec<UnitHandle> = candidates
            .into_iter()
            .filter(|h| {
                store
                    .position(*h)
                    .is_some_and(|p| flat_distance_sq(p, center) <= radius_sq)
            })
            .collect();
        found.sort_unstable();
        found.dedup();
        found
    }

    /// Block or open the navigation cell under `pos`. Returns `true` if the
    /// cell changed, in which case every cached flow field is dropped.
    pub fn set_blocked(&mut self, pos: Vec3, blocked: bool) -> bool {
        self.world.resource_mut::<FlowFieldCache>().set_blocked(pos, blocked)
    }

    // ------------------------------------------------------------------
    // Stepping
    // ------------------------------------------------------------------

    /// Advance the simulation by exactly one tick of `dt` seconds.
    ///
    /// `visibility` decides, per live unit position, whether the unit gets
    /// the full update this tick.
    pub fn tick(&mut self, dt: f32, visibility: impl Fn(Vec3) -> bool) {
        self.world.resource_mut::<DeltaTime>().0 = dt;
        self.world.resource_mut::<SimTick>().increment();

        #[cfg(feature = "profile")]
        let tick_start = std::time::Instant::now();

        let mut mask = std::mem::take(&mut self.visible_buf);
        mask.clear();
        {
            let store = self.world.resource::<UnitStore>();
            mask.extend(
                (0..store.slot_count())
                    .map(|i| store.position(UnitHandle(i as u32)).is_some_and(&visibility)),
            );
        }
        self.visible_buf = std::mem::replace(&mut self.world.resource_mut::<VisibilityMask>().0, mask);

        #[cfg(feature = "profile")]
        {
            self.profiler.record("visibility", tick_start.elapsed());
            self.profiler.time_section("schedule", || self.schedule.run(&mut self.world));
            self.profiler.record("tick", tick_start.elapsed());
            self.profiler.tick();
        }
        #[cfg(not(feature = "profile"))]
        self.schedule.run(&mut self.world);

        self.world.resource_mut::<SimTime>().0 += f64::from(dt);
    }

    /// Step forward by a variable frame time.
    ///
    /// Accumulates `frame_dt` and runs as many fixed ticks of
    /// `SimConfig::fixed_timestep` as fit, so results do not depend on the
    /// caller's frame rate. Returns the number of ticks run.
    pub fn step(&mut self, frame_dt: f32, visibility: impl Fn(Vec3) -> bool) -> u32 {
        let fixed_dt = self.config().fixed_timestep;
        self.time_accumulator += frame_dt;

        let mut ticks = 0;
        while self.time_accumulator >= fixed_dt {
            self.tick(fixed_dt, &visibility);
            self.time_accumulator -= fixed_dt;
            ticks += 1;
        }
        ticks
    }

    // ------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------

    /// Get a snapshot of the current simulation state.
    pub fn snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot::from_store(self.store(), self.current_tick(), self.current_time());
        snapshot.movement = self.movement_stats();
        snapshot.flow_cache = self.flow_stats();
        snapshot
    }

    /// Get the snapshot as a JSON string.
    pub fn snapshot_json(&self) -> String {
        self.snapshot().to_json().unwrap_or_else(|_| "{}".to_string())
    }

    /// Lifecycle events since the last call.
    pub fn drain_events(&mut self) -> Vec<UnitEvent> {
        self.world.resource_mut::<UnitStore>().drain_events()
    }

    /// Get the current tick number.
    pub fn current_tick(&self) -> u64 {
        self.world.resource::<SimTick>().0
    }

    /// Get the elapsed simulation time in seconds.
    pub fn current_time(&self) -> f64 {
        self.world.resource::<SimTime>().0
    }

    pub fn config(&self) -> &SimConfig {
        self.world.resource::<SimConfig>()
    }

    pub fn store(&self) -> &UnitStore {
        self.world.resource::<UnitStore>()
    }

    /// Get the spatial index (for debugging/visualization).
    pub fn spatial_index(&self) -> &SpatialIndex {
        self.world.resource::<SpatialIndex>()
    }

    pub fn flow_cache(&self) -> &FlowFieldCache {
        self.world.resource::<FlowFieldCache>()
    }

    pub fn formation_planner(&self) -> &FormationPlanner {
        self.world.resource::<FormationPlanner>()
    }

    pub fn flow_stats(&self) -> FlowCacheStats {
        self.flow_cache().stats()
    }

    /// Movement counters from the last tick.
    pub fn movement_stats(&self) -> MovementStats {
        self.world.resource::<MovementEngine>().stats()
    }

    /// Section timings. Empty unless built with the `profile` feature.
    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    /// Get direct access to the ECS world (for advanced usage).
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Get mutable access to the ECS world (for advanced usage).
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}
