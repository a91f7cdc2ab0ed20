//! Spatial partitioning for neighbor queries.
//!
//! A uniform grid over the XZ ground plane. Lookups touch only the cells a
//! query radius overlaps, so cost is proportional to local density rather than
//! total population.
//!
//! The index may lag true positions: it is rebuilt from the store every
//! `rebuild_interval_ticks`, and between rebuilds the movement engine only
//! moves an entry when its cell changes.

use crate::components::UnitHandle;
use crate::math::Vec3;
use crate::store::UnitStore;
use crate::systems::{SimConfig, SimTick};
use bevy_ecs::prelude::*;
use std::collections::HashMap;

/// Integer cell coordinate `(floor(x / cell), floor(z / cell))`.
pub type CellKey = (i32, i32);

/// Grid-based spatial index keyed by [`UnitHandle`].
#[derive(Resource, Debug)]
pub struct SpatialIndex {
    /// Cell size in world units.
    pub cell_size: f32,
    /// Map from cell coordinates to the units indexed in that cell.
    cells: HashMap<CellKey, Vec<SpatialEntry>>,
    /// Reverse lookup: handle index to its current cell.
    unit_cells: Vec<Option<CellKey>>,
    len: usize,
}

/// Entry in a spatial cell. Position is the one seen at indexing time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialEntry {
    pub handle: UnitHandle,
    pub x: f32,
    pub z: f32,
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new(4.0)
    }
}

impl SpatialIndex {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            cells: HashMap::new(),
            unit_cells: Vec::new(),
            len: 0,
        }
    }

    /// Convert world coordinates to cell coordinates.
    #[inline]
    pub fn world_to_cell(&self, pos: Vec3) -> CellKey {
        (
            (pos.x / self.cell_size).floor() as i32,
            (pos.z / self.cell_size).floor() as i32,
        )
    }

    /// Drop every entry. Cell vectors keep their allocations.
    pub fn clear(&mut self) {
        for entries in self.cells.values_mut() {
            entries.clear();
        }
        self.unit_cells.clear();
        self.len = 0;
    }

    /// Index a unit at a position. Re-inserting moves the existing entry.
    pub fn insert(&mut self, handle: UnitHandle, pos: Vec3) {
        let i = handle.index();
        if self.unit_cells.len() <= i {
            self.unit_cells.resize(i + 1, None);
        }
        if let Some(old_cell) = self.unit_cells[i].take() {
            self.detach(old_cell, handle);
        } else {
            self.len += 1;
        }

        let cell = self.world_to_cell(pos);
        self.cells.entry(cell).or_default().push(SpatialEntry {
            handle,
            x: pos.x,
            z: pos.z,
        });
        self.unit_cells[i] = Some(cell);
    }

    /// Remove a unit. `pos` is only a hint; the reverse map is authoritative.
    pub fn remove(&mut self, handle: UnitHandle, pos: Vec3) {
        let cell = self
            .unit_cells
            .get_mut(handle.index())
            .and_then(Option::take);
        match cell {
            Some(cell) => {
                self.detach(cell, handle);
                self.len -= 1;
            }
            None => {
                // Not tracked; make sure no orphan entry sits at the hinted cell.
                let hint = self.world_to_cell(pos);
                self.detach(hint, handle);
            }
        }
    }

    /// Move a unit between cells. No-op when both positions map to the same cell.
    pub fn update_position(&mut self, handle: UnitHandle, old: Vec3, new: Vec3) {
        let new_cell = self.world_to_cell(new);
        let tracked = self.unit_cells.get(handle.index()).copied().flatten();
        let old_cell = tracked.unwrap_or_else(|| self.world_to_cell(old));
        if tracked.is_some() && old_cell == new_cell {
            return;
        }
        self.insert(handle, new);
    }

    /// All indexed units within `radius` of `pos` (XZ distance), deduplicated
    /// and in handle order.
    pub fn query_radius(&self, pos: Vec3, radius: f32) -> Vec<UnitHandle> {
        let mut results = Vec::new();
        self.query_radius_into(pos, radius, &mut results);
        results
    }

    /// Like [`query_radius`](Self::query_radius) but fills a caller-owned buffer.
    /// The buffer is cleared first.
    pub fn query_radius_into(&self, pos: Vec3, radius: f32, out: &mut Vec<UnitHandle>) {
        out.clear();
        if radius < 0.0 || !radius.is_finite() {
            return;
        }
        let radius_sq = radius * radius;
        self.visit_cells(pos, radius, |entries| {
            for entry in entries {
                let ex = entry.x - pos.x;
                let ez = entry.z - pos.z;
                if ex * ex + ez * ez <= radius_sq {
                    out.push(entry.handle);
                }
            }
        });

        out.sort_unstable();
        out.dedup();
    }

    /// Every unit indexed in a cell the circle around `pos` can touch,
    /// unfiltered, in handle order. Callers check true distances themselves;
    /// cell membership is kept exact by `update_position` even when stored
    /// coordinates lag.
    pub fn query_cells_into(&self, pos: Vec3, radius: f32, out: &mut Vec<UnitHandle>) {
        out.clear();
        if radius < 0.0 || !radius.is_finite() {
            return;
        }
        self.visit_cells(pos, radius, |entries| {
            out.extend(entries.iter().map(|e| e.handle));
        });
        out.sort_unstable();
    }

    /// Visit the entries of every cell inside the square of half-width
    /// `radius` around `pos`. Corner cells come from the saturating
    /// [`world_to_cell`](Self::world_to_cell), so far-off centers cannot
    /// overflow. When the square covers more cells than are occupied, the
    /// occupied cells are filtered instead of probing empty keys.
    fn visit_cells(&self, pos: Vec3, radius: f32, mut visit: impl FnMut(&[SpatialEntry])) {
        let (x0, z0) = self.world_to_cell(Vec3::new(pos.x - radius, 0.0, pos.z - radius));
        let (x1, z1) = self.world_to_cell(Vec3::new(pos.x + radius, 0.0, pos.z + radius));
        let width = (i64::from(x1) - i64::from(x0) + 1).max(0) as u64;
        let depth = (i64::from(z1) - i64::from(z0) + 1).max(0) as u64;

        if width.saturating_mul(depth) > self.cells.len() as u64 {
            for (&(x, z), entries) in &self.cells {
                if (x0..=x1).contains(&x) && (z0..=z1).contains(&z) {
                    visit(entries);
                }
            }
            return;
        }

        for x in x0..=x1 {
            for z in z0..=z1 {
                if let Some(entries) = self.cells.get(&(x, z)) {
                    visit(entries);
                }
            }
        }
    }

    /// Rebuild from scratch using every live unit's current position.
    /// Cells left empty afterwards are dropped.
    pub fn rebuild(&mut self, store: &UnitStore) {
        self.clear();
        for handle in store.iter_alive() {
            if let Some(pos) = store.position(handle) {
                self.insert(handle, pos);
            }
        }
        self.cells.retain(|_, entries| !entries.is_empty());
    }

    /// The cell a unit is currently indexed in.
    pub fn cell_of(&self, handle: UnitHandle) -> Option<CellKey> {
        self.unit_cells.get(handle.index()).copied().flatten()
    }

    /// Number of indexed units.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of units in a cell.
    pub fn cell_count(&self, cell: CellKey) -> usize {
        self.cells.get(&cell).map_or(0, Vec::len)
    }

    /// Non-empty cells, for debugging/visualization.
    pub fn occupied_cells(&self) -> impl Iterator<Item = (&CellKey, &Vec<SpatialEntry>)> {
        self.cells.iter().filter(|(_, entries)| !entries.is_empty())
    }

    fn detach(&mut self, cell: CellKey, handle: UnitHandle) {
        if let Some(entries) = self.cells.get_mut(&cell) {
            if let Some(slot) = entries.iter().position(|e| e.handle == handle) {
                entries.swap_remove(slot);
            }
        }
    }
}

/// System that rebuilds the spatial index every `rebuild_interval_ticks`.
///
/// ## Data Access
/// - Reads: UnitStore, SimConfig, SimTick
/// - Writes: SpatialIndex
pub fn spatial_rebuild_system(
    config: Res<SimConfig>,
    tick: Res<SimTick>,
    store: Res<UnitStore>,
    mut index: ResMut<SpatialIndex>,
) {
    let interval = config.rebuild_interval_ticks.max(1);
    if tick.0 % interval != 0 {
        return;
    }
    index.rebuild(&store);
    tracing::debug!(tick = tick.0, units = index.len(), "spatial index rebuilt");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{PlayerId, UnitType};

    fn v(x: f32, z: f32) -> Vec3 {
        Vec3::new(x, 0.0, z)
    }

    #[test]
    fn test_spatial_index_insert_query() {
        let mut index = SpatialIndex::new(10.0);

        index.insert(UnitHandle(1), v(5.0, 5.0));
        index.insert(UnitHandle(2), v(15.0, 5.0));
        index.insert(UnitHandle(3), v(100.0, 100.0));

        assert_eq!(index.query_radius(v(5.0, 5.0), 15.0), vec![UnitHandle(1), UnitHandle(2)]);
        assert_eq!(index.query_radius(v(5.0, 5.0), 5.0), vec![UnitHandle(1)]);
        assert_eq!(index.query_radius(v(100.0, 100.0), 10.0), vec![UnitHandle(3)]);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_query_matches_brute_force() {
        let mut index = SpatialIndex::new(4.0);
        let mut points = Vec::new();
        for i in 0..200u32 {
            // Deterministic scatter, including negative coordinates.
            let x = ((i * 37) % 61) as f32 - 30.0 + 0.25;
            let z = ((i * 53) % 47) as f32 - 23.0 + 0.5;
            index.insert(UnitHandle(i), v(x, z));
            points.push((UnitHandle(i), v(x, z)));
        }

        for (center, radius) in [(v(0.0, 0.0), 7.5), (v(-20.0, 10.0), 3.0), (v(12.0, -8.0), 13.0)] {
            let mut expected: Vec<UnitHandle> = points
                .iter()
                .filter(|(_, p)| crate::math::flat_distance_sq(*p, center) <= radius * radius)
                .map(|(h, _)| *h)
                .collect();
            expected.sort();
            assert_eq!(index.query_radius(center, radius), expected);
        }
    }

    #[test]
    fn test_reinsert_does_not_duplicate() {
        let mut index = SpatialIndex::new(10.0);
        index.insert(UnitHandle(0), v(1.0, 1.0));
        index.insert(UnitHandle(0), v(2.0, 2.0));
        index.insert(UnitHandle(0), v(25.0, 2.0));

        assert_eq!(index.len(), 1);
        assert_eq!(index.cell_count((0, 0)), 0);
        assert_eq!(index.cell_count((2, 0)), 1);
        assert_eq!(index.query_radius(v(0.0, 0.0), 100.0), vec![UnitHandle(0)]);
    }

    #[test]
    fn test_update_position_same_cell_is_noop() {
        let mut index = SpatialIndex::new(10.0);
        index.insert(UnitHandle(0), v(1.0, 1.0));

        index.update_position(UnitHandle(0), v(1.0, 1.0), v(9.0, 9.0));
        // Still indexed at the original point.
        let entry = index.occupied_cells().next().unwrap().1[0];
        assert_eq!((entry.x, entry.z), (1.0, 1.0));

        index.update_position(UnitHandle(0), v(9.0, 9.0), v(11.0, 1.0));
        assert_eq!(index.cell_of(UnitHandle(0)), Some((1, 0)));
        assert_eq!(index.cell_count((0, 0)), 0);
    }

    #[test]
    fn test_query_cells_sees_units_despite_stale_coordinates() {
        let mut index = SpatialIndex::new(4.0);
        index.insert(UnitHandle(0), v(0.1, 0.1));
        // Moves within its cell: coordinates are not refreshed.
        index.update_position(UnitHandle(0), v(0.1, 0.1), v(3.9, 3.9));

        let mut out = Vec::new();
        index.query_cells_into(v(4.5, 4.5), 1.0, &mut out);
        assert_eq!(out, vec![UnitHandle(0)]);
        assert!(index.query_radius(v(4.5, 4.5), 1.0).is_empty());
    }

    #[test]
    fn test_remove() {
        let mut index = SpatialIndex::new(10.0);
        index.insert(UnitHandle(0), v(1.0, 1.0));
        index.insert(UnitHandle(1), v(2.0, 1.0));

        index.remove(UnitHandle(0), v(1.0, 1.0));
        index.remove(UnitHandle(0), v(1.0, 1.0));
        assert_eq!(index.len(), 1);
        assert_eq!(index.query_radius(v(0.0, 0.0), 10.0), vec![UnitHandle(1)]);
        assert_eq!(index.cell_of(UnitHandle(0)), None);
    }

    #[test]
    fn test_clear_empties_index() {
        let mut index = SpatialIndex::new(10.0);
        index.insert(UnitHandle(0), v(1.0, 1.0));
        index.clear();
        assert!(index.is_empty());
        assert!(index.query_radius(v(1.0, 1.0), 5.0).is_empty());
        assert_eq!(index.occupied_cells().count(), 0);
    }

    #[test]
    fn test_far_off_center_queries_do_not_overflow() {
        let mut index = SpatialIndex::new(4.0);
        let far = v(1e10, -1e10);
        index.insert(UnitHandle(0), far);
        index.insert(UnitHandle(1), v(1.0, 1.0));

        assert_eq!(index.cell_of(UnitHandle(0)), Some((i32::MAX, i32::MIN)));
        assert_eq!(index.query_radius(far, 10.0), vec![UnitHandle(0)]);

        let mut out = Vec::new();
        index.query_cells_into(v(f32::MAX, f32::MAX), 10.0, &mut out);
        assert!(out.is_empty());
        index.query_cells_into(far, 10.0, &mut out);
        assert_eq!(out, vec![UnitHandle(0)]);
    }

    #[test]
    fn test_huge_radius_walks_occupied_cells() {
        let mut index = SpatialIndex::new(4.0);
        for i in 0..50u32 {
            index.insert(UnitHandle(i), v(i as f32 * 10.0, -(i as f32) * 3.0));
        }

        // A box of about 10^8 cells over 50 occupied ones.
        let start = std::time::Instant::now();
        let found = index.query_radius(v(0.0, 0.0), 20_000.0);
        let mut out = Vec::new();
        index.query_cells_into(v(0.0, 0.0), 1e30, &mut out);
        assert!(start.elapsed() < std::time::Duration::from_secs(2));

        let all: Vec<UnitHandle> = (0..50).map(UnitHandle).collect();
        assert_eq!(found, all);
        assert_eq!(out, all);
    }

    #[test]
    fn test_rebuild_drops_vacated_cells() {
        let mut store = UnitStore::new(16);
        let mut index = SpatialIndex::new(4.0);
        let handles: Vec<UnitHandle> = (0..8)
            .map(|i| {
                store
                    .spawn(PlayerId(0), UnitType::Soldier, v(i as f32 * 40.0, 0.0))
                    .unwrap()
            })
            .collect();
        index.rebuild(&store);
        assert_eq!(index.cells.len(), 8);

        // Everyone walks to one spot.
        for &h in &handles {
            store.set_motion(h, v(2.0, 2.0), Vec3::ZERO);
        }
        index.rebuild(&store);
        assert_eq!(index.cells.len(), 1);
        assert_eq!(index.cell_count((0, 0)), 8);
        assert_eq!(index.occupied_cells().count(), 1);
    }

    #[test]
    fn test_rebuild_system_runs_on_interval() {
        let mut world = World::new();
        world.insert_resource(SimConfig {
            rebuild_interval_ticks: 5,
            ..Default::default()
        });
        world.insert_resource(SimTick(3));
        world.insert_resource(SpatialIndex::new(4.0));

        let mut store = UnitStore::new(16);
        let a = store.spawn(PlayerId(0), UnitType::Soldier, v(1.0, 1.0)).unwrap();
        let b = store.spawn(PlayerId(1), UnitType::Soldier, v(30.0, 1.0)).unwrap();
        store.remove(b);
        world.insert_resource(store);

        let mut schedule = Schedule::default();
        schedule.add_systems(spatial_rebuild_system);

        schedule.run(&mut world);
        assert!(world.resource::<SpatialIndex>().is_empty(), "tick 3 is not a rebuild tick");

        world.resource_mut::<SimTick>().0 = 5;
        schedule.run(&mut world);
        let index = world.resource::<SpatialIndex>();
        assert_eq!(index.len(), 1);
        assert_eq!(index.query_radius(v(0.0, 0.0), 100.0), vec![a]);
    }
}
