//! Flow-field pathfinding shared by every unit heading to the same area.
//!
//! Layer 1: [`NavigationGrid`], static walkability per cell.
//! Layer 2: [`FlowField`], a cost surface propagated out from a goal plus a
//! per-cell direction toward the cheapest neighbor.
//! Layer 3: [`FlowFieldCache`], fields keyed by a snapped target so a whole
//! group converging on roughly the same spot shares one field.
//!
//! Generation is throttled per tick. A request over budget gets `None` and the
//! caller steers in a straight line for that tick.

use crate::math::{UVec2, Vec2, Vec3};
use crate::systems::{SimConfig, SimTime};
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Snapped target coordinate `(floor(x / snap), floor(z / snap))`.
pub type FieldKey = (i32, i32);

const DIAGONAL_COST: f32 = std::f32::consts::SQRT_2;

// ============================================================================
// NAVIGATION GRID
// ============================================================================

/// Walkability per cell over `[-half_extent, half_extent]` on X and Z.
/// Units are not baked in here; they are handled by avoidance.
#[derive(Debug, Clone)]
pub struct NavigationGrid {
    walkable: Vec<bool>,
    pub width: u32,
    pub height: u32,
    pub cell_size: f32,
    pub half_extent: f32,
}

impl NavigationGrid {
    /// Fully open grid.
    pub fn new_open(half_extent: f32, cell_size: f32) -> Self {
        let cells = ((half_extent * 2.0) / cell_size).ceil().max(1.0) as u32;
        Self {
            walkable: vec![true; (cells * cells) as usize],
            width: cells,
            height: cells,
            cell_size,
            half_extent,
        }
    }

    /// Grid cell containing a world position (XZ), or `None` outside the grid.
    pub fn world_to_cell(&self, pos: Vec3) -> Option<UVec2> {
        let x = ((pos.x + self.half_extent) / self.cell_size).floor();
        let z = ((pos.z + self.half_extent) / self.cell_size).floor();
        if !(x >= 0.0 && z >= 0.0) {
            return None;
        }
        let (cx, cz) = (x as u32, z as u32);
        if cx >= self.width || cz >= self.height {
            return None;
        }
        Some(UVec2::new(cx, cz))
    }

    /// Like `world_to_cell` but clamps to grid bounds.
    pub fn world_to_cell_clamped(&self, pos: Vec3) -> UVec2 {
        let cx = ((pos.x + self.half_extent) / self.cell_size).max(0.0) as u32;
        let cz = ((pos.z + self.half_extent) / self.cell_size).max(0.0) as u32;
        UVec2::new(cx.min(self.width - 1), cz.min(self.height - 1))
    }

    /// World-space center of a cell, on the ground plane.
    pub fn cell_center(&self, cell: UVec2) -> Vec3 {
        Vec3::new(
            (cell.x as f32 + 0.5) * self.cell_size - self.half_extent,
            0.0,
            (cell.y as f32 + 0.5) * self.cell_size - self.half_extent,
        )
    }

    #[inline]
    pub fn is_in_bounds(&self, pos: Vec3) -> bool {
        self.world_to_cell(pos).is_some()
    }

    #[inline]
    fn idx(&self, cell: UVec2) -> usize {
        (cell.y * self.width + cell.x) as usize
    }

    pub fn is_walkable(&self, cell: UVec2) -> bool {
        cell.x < self.width && cell.y < self.height && self.walkable[self.idx(cell)]
    }

    /// Mark a cell blocked or open. Returns `true` if the value changed.
    pub fn set_blocked(&mut self, cell: UVec2, blocked: bool) -> bool {
        if cell.x >= self.width || cell.y >= self.height {
            return false;
        }
        let i = self.idx(cell);
        let changed = self.walkable[i] == blocked;
        self.walkable[i] = !blocked;
        changed
    }

    /// Whether a single step from `from` by `(dx, dz)` is allowed.
    /// Diagonal steps may not cut a blocked corner.
    #[inline]
    fn can_step(&self, from: UVec2, dx: i32, dz: i32) -> Option<UVec2> {
        let nx = from.x as i32 + dx;
        let nz = from.y as i32 + dz;
        if nx < 0 || nz < 0 || nx >= self.width as i32 || nz >= self.height as i32 {
            return None;
        }
        let to = UVec2::new(nx as u32, nz as u32);
        if !self.walkable[self.idx(to)] {
            return None;
        }
        if dx != 0 && dz != 0 {
            let side_a = UVec2::new(nx as u32, from.y);
            let side_b = UVec2::new(from.x, nz as u32);
            if !self.walkable[self.idx(side_a)] || !self.walkable[self.idx(side_b)] {
                return None;
            }
        }
        Some(to)
    }
}

/// Eight neighbor offsets with their step cost.
const NEIGHBORS: [(i32, i32, f32); 8] = [
    (-1, -1, DIAGONAL_COST), (0, -1, 1.0), (1, -1, DIAGONAL_COST),
    (-1,  0, 1.0),                         (1,  0, 1.0),
    (-1,  1, DIAGONAL_COST), (0,  1, 1.0), (1,  1, DIAGONAL_COST),
];

// ============================================================================
// FLOW FIELD
// ============================================================================

/// Per-cell movement directions toward one goal.
///
/// Built once per snapped target and read by every unit heading there, so the
/// per-unit query cost is O(1).
#[derive(Debug, Clone)]
pub struct FlowField {
    id: u64,
    key: FieldKey,
    goal: Vec3,
    goal_cell: UVec2,
    /// Path cost to the goal. `f32::INFINITY` = unreachable.
    costs: Vec<f32>,
    /// Unit XZ direction per cell. `Vec2::ZERO` at the goal or where no
    /// neighbor is cheaper.
    directions: Vec<Vec2>,
    width: u32,
    height: u32,
    cell_size: f32,
    half_extent: f32,
    expires_at: f64,
}

impl FlowField {
    /// Unique id. Regenerating a field for the same key yields a new id.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> FieldKey {
        self.key
    }

    /// Snapped goal position this field flows toward.
    pub fn goal(&self) -> Vec3 {
        self.goal
    }

    pub fn goal_cell(&self) -> UVec2 {
        self.goal_cell
    }

    pub fn expires_at(&self) -> f64 {
        self.expires_at
    }

    #[inline]
    pub fn is_expired(&self, now: f64) -> bool {
        now >= self.expires_at
    }

    #[inline]
    fn cell_index(&self, cell: UVec2) -> Option<usize> {
        (cell.x < self.width && cell.y < self.height)
            .then(|| (cell.y * self.width + cell.x) as usize)
    }

    /// Path cost from a cell to the goal.
    pub fn cost_at_cell(&self, cell: UVec2) -> f32 {
        self.cell_index(cell)
            .map_or(f32::INFINITY, |i| self.costs[i])
    }

    pub fn direction_at_cell(&self, cell: UVec2) -> Vec2 {
        self.cell_index(cell)
            .map_or(Vec2::ZERO, |i| self.directions[i])
    }

    /// Flow direction at a world position. Zero outside the grid.
    pub fn sample(&self, pos: Vec3) -> Vec2 {
        let x = ((pos.x + self.half_extent) / self.cell_size).floor();
        let z = ((pos.z + self.half_extent) / self.cell_size).floor();
        if !(x >= 0.0 && z >= 0.0) {
            return Vec2::ZERO;
        }
        self.direction_at_cell(UVec2::new(x as u32, z as u32))
    }
}

/// Build a field for `goal` over `grid`.
///
/// 1. Label-correcting breadth-first propagation from the goal over the
///    8-connected grid (cardinal 1.0, diagonal √2). A cell re-enters the queue
///    whenever its cost improves, so the result is exact.
/// 2. Gradient pass: each reachable cell points at its cheapest neighbor.
pub fn generate_field(
    grid: &NavigationGrid,
    key: FieldKey,
    goal: Vec3,
    id: u64,
    expires_at: f64,
) -> FlowField {
    let goal_cell = grid.world_to_cell_clamped(goal);
    let size = (grid.width * grid.height) as usize;
    let mut costs = vec![f32::INFINITY; size];
    let mut in_queue = vec![false; size];
    let mut queue = VecDeque::new();

    if grid.is_walkable(goal_cell) {
        let gi = grid.idx(goal_cell);
        costs[gi] = 0.0;
        in_queue[gi] = true;
        queue.push_back(goal_cell);
    }

    while let Some(cell) = queue.pop_front() {
        let ci = grid.idx(cell);
        in_queue[ci] = false;
        let cost = costs[ci];
        for (dx, dz, step) in NEIGHBORS {
            let Some(nb) = grid.can_step(cell, dx, dz) else {
                continue;
            };
            let ni = grid.idx(nb);
            let candidate = cost + step;
            if candidate < costs[ni] {
                costs[ni] = candidate;
                if !in_queue[ni] {
                    in_queue[ni] = true;
                    queue.push_back(nb);
                }
            }
        }
    }

    let mut directions = vec![Vec2::ZERO; size];
    let width = grid.width as usize;

    #[cfg(feature = "parallel")]
    directions
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(z, row)| gradient_row(grid, &costs, z as u32, row));

    #[cfg(not(feature = "parallel"))]
    directions
        .chunks_mut(width)
        .enumerate()
        .for_each(|(z, row)| gradient_row(grid, &costs, z as u32, row));

    FlowField {
        id,
        key,
        goal: grid.cell_center(goal_cell),
        goal_cell,
        costs,
        directions,
        width: grid.width,
        height: grid.height,
        cell_size: grid.cell_size,
        half_extent: grid.half_extent,
        expires_at,
    }
}

/// Fill one row of directions from the finished cost surface.
fn gradient_row(grid: &NavigationGrid, costs: &[f32], z: u32, row: &mut [Vec2]) {
    for (x, dir) in row.iter_mut().enumerate() {
        let cell = UVec2::new(x as u32, z);
        let cost = costs[grid.idx(cell)];
        if cost == 0.0 || !cost.is_finite() {
            continue;
        }

        let mut best_cost = cost;
        let mut best_dir = Vec2::ZERO;
        for (dx, dz, _) in NEIGHBORS {
            let Some(nb) = grid.can_step(cell, dx, dz) else {
                continue;
            };
            let nb_cost = costs[grid.idx(nb)];
            if nb_cost < best_cost {
                best_cost = nb_cost;
                best_dir = Vec2::new(dx as f32, dz as f32).normalize();
            }
        }
        *dir = best_dir;
    }
}

// ============================================================================
// CACHE
// ============================================================================

/// Counters for cache diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub generated: u64,
    /// Misses refused because the tick's generation budget was spent.
    pub throttled: u64,
    pub evicted: u64,
}

/// Flow fields keyed by snapped target, with time-based expiry and a
/// per-tick generation budget.
#[derive(Resource, Debug)]
pub struct FlowFieldCache {
    grid: NavigationGrid,
    fields: HashMap<FieldKey, FlowField>,
    snap_distance: f32,
    lifetime: f64,
    capacity: usize,
    budget_per_tick: u32,
    generated_this_tick: u32,
    next_id: u64,
    stats: FlowCacheStats,
}

impl Default for FlowFieldCache {
    fn default() -> Self {
        Self::from_config(&SimConfig::default())
    }
}

impl FlowFieldCache {
    pub fn from_config(config: &SimConfig) -> Self {
        Self {
            grid: NavigationGrid::new_open(config.world_half_extent, config.flow_cell_size),
            fields: HashMap::new(),
            snap_distance: config.snap_distance,
            lifetime: config.field_lifetime,
            capacity: config.flow_cache_capacity.max(1),
            budget_per_tick: config.flow_budget_per_tick,
            generated_this_tick: 0,
            next_id: 1,
            stats: FlowCacheStats::default(),
        }
    }

    /// Cache key for a requested target.
    #[inline]
    pub fn snap_key(&self, target: Vec3) -> FieldKey {
        (
            (target.x / self.snap_distance).floor() as i32,
            (target.z / self.snap_distance).floor() as i32,
        )
    }

    /// Center of a snap cell, clamped into the navigation grid.
    fn snapped_goal(&self, key: FieldKey) -> Vec3 {
        let center = Vec3::new(
            (key.0 as f32 + 0.5) * self.snap_distance,
            0.0,
            (key.1 as f32 + 0.5) * self.snap_distance,
        );
        self.grid.cell_center(self.grid.world_to_cell_clamped(center))
    }

    /// Reset the per-tick generation budget.
    pub fn begin_tick(&mut self) {
        self.generated_this_tick = 0;
    }

    pub fn remaining_budget(&self) -> u32 {
        self.budget_per_tick.saturating_sub(self.generated_this_tick)
    }

    /// A valid field toward `target`, or `None` when the target is outside the
    /// grid or the generation budget for this tick is spent.
    pub fn request_field(&mut self, target: Vec3, now: f64) -> Option<&FlowField> {
        if !self.grid.is_in_bounds(target) {
            return None;
        }
        let key = self.snap_key(target);

        let fresh = self.fields.get(&key).is_some_and(|f| !f.is_expired(now));
        if fresh {
            self.stats.hits += 1;
            return self.fields.get(&key);
        }

        self.stats.misses += 1;
        if self.generated_this_tick >= self.budget_per_tick {
            self.stats.throttled += 1;
            tracing::trace!(?key, "flow field generation throttled");
            return None;
        }

        self.evict_expired(now);
        if self.fields.len() >= self.capacity {
            let oldest = self
                .fields
                .iter()
                .min_by(|a, b| a.1.expires_at.total_cmp(&b.1.expires_at))
                .map(|(k, _)| *k);
            if let Some(oldest) = oldest {
                self.fields.remove(&oldest);
                self.stats.evicted += 1;
            }
        }

        let goal = self.snapped_goal(key);
        let id = self.next_id;
        self.next_id += 1;
        let field = generate_field(&self.grid, key, goal, id, now + self.lifetime);
        self.generated_this_tick += 1;
        self.stats.generated += 1;
        tracing::debug!(id, ?key, goal_x = goal.x, goal_z = goal.z, "flow field generated");

        self.fields.insert(key, field);
        self.fields.get(&key)
    }

    /// Flow direction (unit XZ vector) at `unit_pos` toward `target`.
    /// Zero when no field is available or `unit_pos` is outside the grid.
    pub fn direction_at(&mut self, unit_pos: Vec3, target: Vec3, now: f64) -> Vec3 {
        if !self.grid.is_in_bounds(unit_pos) {
            return Vec3::ZERO;
        }
        self.request_field(target, now).map_or(Vec3::ZERO, |field| {
            let d = field.sample(unit_pos);
            Vec3::new(d.x, 0.0, d.y)
        })
    }

    #[inline]
    pub fn is_in_bounds(&self, pos: Vec3) -> bool {
        self.grid.is_in_bounds(pos)
    }

    /// Drop every field whose lifetime has passed.
    pub fn evict_expired(&mut self, now: f64) {
        let before = self.fields.len();
        self.fields.retain(|_, field| !field.is_expired(now));
        self.stats.evicted += (before - self.fields.len()) as u64;
    }

    /// Block or open the cell containing `pos`. Cached fields are dropped when
    /// walkability changes.
    pub fn set_blocked(&mut self, pos: Vec3, blocked: bool) -> bool {
        let Some(cell) = self.grid.world_to_cell(pos) else {
            return false;
        };
        let changed = self.grid.set_blocked(cell, blocked);
        if changed {
            self.stats.evicted += self.fields.len() as u64;
            self.fields.clear();
        }
        changed
    }

    pub fn grid(&self) -> &NavigationGrid {
        &self.grid
    }

    pub fn stats(&self) -> FlowCacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }
}

/// System that opens a new generation budget and drops expired fields.
///
/// ## Data Access
/// - Reads: SimTime
/// - Writes: FlowFieldCache
pub fn flow_budget_system(time: Res<SimTime>, mut cache: ResMut<FlowFieldCache>) {
    cache.begin_tick();
    cache.evict_expired(time.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> SimConfig {
        SimConfig {
            world_half_extent: 16.0,
            flow_cell_size: 1.0,
            snap_distance: 4.0,
            ..Default::default()
        }
    }

    /// Walk the field from `start` until it stops, returning the visited costs.
    fn follow(field: &FlowField, start: UVec2) -> Vec<f32> {
        let mut cell = start;
        let mut costs = vec![field.cost_at_cell(cell)];
        for _ in 0..10_000 {
            let d = field.direction_at_cell(cell);
            if d == Vec2::ZERO {
                break;
            }
            cell = UVec2::new(
                (cell.x as i32 + d.x.round() as i32) as u32,
                (cell.y as i32 + d.y.round() as i32) as u32,
            );
            costs.push(field.cost_at_cell(cell));
        }
        costs
    }

    #[test]
    fn test_nearby_targets_share_a_field() {
        let mut cache = FlowFieldCache::default();

        let first = cache.request_field(Vec3::new(50.0, 0.0, 50.0), 0.0).map(|f| (f.id(), f.key()));
        let second = cache.request_field(Vec3::new(52.0, 0.0, 49.0), 0.0).map(|f| (f.id(), f.key()));

        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().generated, 1);
    }

    #[test]
    fn test_direction_outside_grid_is_zero() {
        let mut cache = FlowFieldCache::from_config(&small_config());
        let target = Vec3::new(5.0, 0.0, 5.0);

        assert_eq!(cache.direction_at(Vec3::new(100.0, 0.0, 0.0), target, 0.0), Vec3::ZERO);
        assert_eq!(cache.direction_at(Vec3::new(-17.0, 0.0, 0.0), target, 0.0), Vec3::ZERO);
        assert!(cache.request_field(Vec3::new(0.0, 0.0, 40.0), 0.0).is_none());

        let inside = cache.direction_at(Vec3::new(-10.0, 0.0, -10.0), target, 0.0);
        assert!((inside.length() - 1.0).abs() < 1e-5);
        assert_eq!(inside.y, 0.0);
    }

    #[test]
    fn test_cost_decreases_along_flow() {
        let config = small_config();
        let mut cache = FlowFieldCache::from_config(&config);
        let field = cache.request_field(Vec3::new(3.0, 0.0, -7.0), 0.0).unwrap();
        let goal_cell = field.goal_cell();

        assert_eq!(field.cost_at_cell(goal_cell), 0.0);
        assert_eq!(field.direction_at_cell(goal_cell), Vec2::ZERO);

        for start in [UVec2::new(0, 0), UVec2::new(31, 31), UVec2::new(0, 31), UVec2::new(17, 2)] {
            let costs = follow(field, start);
            assert_eq!(*costs.last().unwrap(), 0.0, "path from {:?} must reach the goal", start);
            for pair in costs.windows(2) {
                assert!(pair[1] < pair[0], "cost must strictly decrease: {:?}", costs);
            }
        }
    }

    #[test]
    fn test_costs_are_octile_distances_on_open_grid() {
        let grid = NavigationGrid::new_open(8.0, 1.0);
        let field = generate_field(&grid, (0, 0), grid.cell_center(UVec2::new(2, 2)), 1, 10.0);

        assert!((field.cost_at_cell(UVec2::new(5, 2)) - 3.0).abs() < 1e-5);
        assert!((field.cost_at_cell(UVec2::new(5, 5)) - 3.0 * DIAGONAL_COST).abs() < 1e-4);
        assert!((field.cost_at_cell(UVec2::new(6, 3)) - (3.0 + DIAGONAL_COST)).abs() < 1e-4);
    }

    #[test]
    fn test_generation_budget_throttles() {
        let mut cache = FlowFieldCache::from_config(&SimConfig {
            flow_budget_per_tick: 2,
            ..small_config()
        });

        assert!(cache.request_field(Vec3::new(-10.0, 0.0, -10.0), 0.0).is_some());
        assert!(cache.request_field(Vec3::new(10.0, 0.0, 10.0), 0.0).is_some());
        assert!(cache.request_field(Vec3::new(-10.0, 0.0, 10.0), 0.0).is_none());
        assert_eq!(cache.stats().throttled, 1);
        // Hits are not budgeted.
        assert!(cache.request_field(Vec3::new(10.0, 0.0, 10.0), 0.0).is_some());

        cache.begin_tick();
        assert!(cache.request_field(Vec3::new(-10.0, 0.0, 10.0), 0.0).is_some());
        assert_eq!(cache.stats().generated, 3);
    }

    #[test]
    fn test_expired_field_is_regenerated() {
        let config = small_config();
        let mut cache = FlowFieldCache::from_config(&config);
        let target = Vec3::new(1.0, 0.0, 1.0);

        let first = cache.request_field(target, 0.0).unwrap().id();
        let again = cache.request_field(target, config.field_lifetime - 0.1).unwrap().id();
        assert_eq!(first, again);

        cache.begin_tick();
        let later = cache.request_field(target, config.field_lifetime + 0.1).unwrap().id();
        assert_ne!(first, later);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_capacity_evicts_earliest_expiry() {
        let mut cache = FlowFieldCache::from_config(&SimConfig {
            flow_cache_capacity: 2,
            flow_budget_per_tick: 10,
            ..small_config()
        });
        let a = Vec3::new(-10.0, 0.0, -10.0);
        let b = Vec3::new(10.0, 0.0, 10.0);
        let c = Vec3::new(-10.0, 0.0, 10.0);

        cache.request_field(a, 0.0);
        cache.request_field(b, 1.0);
        cache.request_field(c, 2.0);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evicted, 1);
        let hits_before = cache.stats().hits;
        cache.request_field(b, 2.0);
        assert_eq!(cache.stats().hits, hits_before + 1, "b must still be cached");
        cache.request_field(a, 2.0);
        assert_eq!(cache.stats().generated, 4, "a was evicted and must be regenerated");
    }

    #[test]
    fn test_wall_is_routed_around() {
        let mut cache = FlowFieldCache::from_config(&small_config());
        // Vertical wall at x in [0, 1) from z = -16 up to z = 10, leaving a gap at the top.
        for z in -16..10 {
            cache.set_blocked(Vec3::new(0.5, 0.0, z as f32 + 0.5), true);
        }
        let start = cache.grid().world_to_cell(Vec3::new(-10.0, 0.0, -10.0)).unwrap();
        let field = cache.request_field(Vec3::new(10.0, 0.0, -10.0), 0.0).unwrap();

        let costs = follow(field, start);
        assert_eq!(*costs.last().unwrap(), 0.0);
        // The straight-line octile distance is 20; the detour must cost more.
        assert!(costs[0] > 30.0, "cost {} should reflect the detour", costs[0]);
    }

    #[test]
    fn test_enclosed_cell_is_unreachable() {
        let mut cache = FlowFieldCache::from_config(&small_config());
        let pocket = Vec3::new(-8.5, 0.0, -8.5);
        for (dx, dz) in [(-1, -1), (0, -1), (1, -1), (-1, 0), (1, 0), (-1, 1), (0, 1), (1, 1)] {
            cache.set_blocked(pocket + Vec3::new(dx as f32, 0.0, dz as f32), true);
        }
        let cell = cache.grid().world_to_cell(pocket).unwrap();
        let field = cache.request_field(Vec3::new(10.0, 0.0, 10.0), 0.0).unwrap();
        assert!(field.cost_at_cell(cell).is_infinite());
        assert_eq!(field.direction_at_cell(cell), Vec2::ZERO);
    }

    #[test]
    fn test_no_diagonal_corner_cutting() {
        let mut grid = NavigationGrid::new_open(4.0, 1.0);
        grid.set_blocked(UVec2::new(1, 0), true);
        let field = generate_field(&grid, (0, 0), grid.cell_center(UVec2::new(0, 0)), 1, 10.0);

        // (1,1) would reach (0,0) diagonally past the blocked (1,0); it must go via (0,1).
        assert!((field.cost_at_cell(UVec2::new(1, 1)) - 2.0).abs() < 1e-5);
        assert_eq!(field.direction_at_cell(UVec2::new(1, 1)), Vec2::new(-1.0, 0.0));
    }

    #[test]
    fn test_set_blocked_invalidates_cache() {
        let mut cache = FlowFieldCache::from_config(&small_config());
        cache.request_field(Vec3::new(5.0, 0.0, 5.0), 0.0);
        assert_eq!(cache.len(), 1);

        assert!(cache.set_blocked(Vec3::new(0.0, 0.0, 0.0), true));
        assert!(cache.is_empty());
        assert!(!cache.set_blocked(Vec3::new(0.0, 0.0, 0.0), true), "already blocked");
        assert!(!cache.set_blocked(Vec3::new(99.0, 0.0, 0.0), true), "outside the grid");
    }

    #[test]
    fn test_budget_system_resets_each_tick() {
        let mut world = World::new();
        world.insert_resource(SimTime(0.0));
        world.insert_resource(FlowFieldCache::from_config(&SimConfig {
            flow_budget_per_tick: 1,
            ..small_config()
        }));

        let mut schedule = Schedule::default();
        schedule.add_systems(flow_budget_system);

        {
            let mut cache = world.resource_mut::<FlowFieldCache>();
            assert!(cache.request_field(Vec3::new(-10.0, 0.0, -10.0), 0.0).is_some());
            assert!(cache.request_field(Vec3::new(10.0, 0.0, 10.0), 0.0).is_none());
        }

        world.resource_mut::<SimTime>().0 = 100.0;
        schedule.run(&mut world);

        let cache = world.resource::<FlowFieldCache>();
        assert_eq!(cache.remaining_budget(), 1);
        assert!(cache.is_empty(), "expired fields are dropped");
    }
}
