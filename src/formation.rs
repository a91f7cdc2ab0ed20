//! Per-unit sub-targets for group move orders.
//!
//! A group order spreads its units over a square-ish grid of slots centered on
//! the requested target. Slot assignment is greedy nearest-pair: good enough
//! for groups of tens of units and far cheaper than an optimal matching.
//!
//! Results are cached as offsets from the target, keyed by the exact set of
//! units, so re-ordering the same group within the TTL only re-anchors the
//! cached shape.

use crate::components::UnitHandle;
use crate::math::{flat_distance_sq, Vec3};
use crate::store::UnitStore;
use crate::systems::SimConfig;
use bevy_ecs::prelude::*;
use serde::Serialize;
use std::collections::HashMap;

/// Canonical key for a set of units: sorted and deduplicated handles.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupSignature(Vec<UnitHandle>);

impl GroupSignature {
    pub fn new(handles: &[UnitHandle]) -> Self {
        let mut sorted = handles.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        Self(sorted)
    }

    pub fn handles(&self) -> &[UnitHandle] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone)]
struct CachedFormation {
    /// Offset from the base target per unit, in handle order.
    offsets: Vec<(UnitHandle, Vec3)>,
    created_at: f64,
}

/// Counters for cache diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FormationStats {
    pub hits: u64,
    pub misses: u64,
    pub evicted: u64,
}

/// Slot assignment with a TTL cache of formation shapes.
#[derive(Resource, Debug)]
pub struct FormationPlanner {
    pub spacing: f32,
    pub ttl: f64,
    pub capacity: usize,
    cache: HashMap<GroupSignature, CachedFormation>,
    stats: FormationStats,
}

impl Default for FormationPlanner {
    fn default() -> Self {
        Self::from_config(&SimConfig::default())
    }
}

impl FormationPlanner {
    pub fn from_config(config: &SimConfig) -> Self {
        Self {
            spacing: config.formation_spacing,
            ttl: config.formation_ttl,
            capacity: config.formation_cache_capacity,
            cache: HashMap::new(),
            stats: FormationStats::default(),
        }
    }

    /// Target position for every live unit in `handles`, sorted by handle.
    ///
    /// Dead handles and duplicates are dropped before the group is keyed.
    pub fn assign_positions(
        &mut self,
        store: &UnitStore,
        handles: &[UnitHandle],
        base_target: Vec3,
        now: f64,
    ) -> Vec<(UnitHandle, Vec3)> {
        let live: Vec<UnitHandle> = handles
            .iter()
            .copied()
            .filter(|h| store.is_alive(*h))
            .collect();
        let signature = GroupSignature::new(&live);
        if signature.is_empty() {
            return Vec::new();
        }

        if let Some(cached) = self.cache.get(&signature) {
            if now - cached.created_at < self.ttl {
                self.stats.hits += 1;
                return cached
                    .offsets
                    .iter()
                    .map(|(h, offset)| (*h, base_target + *offset))
                    .collect();
            }
        }
        self.stats.misses += 1;

        let offsets = self.plan(store, signature.handles(), base_target);
        let assigned = offsets
            .iter()
            .map(|(h, offset)| (*h, base_target + *offset))
            .collect();

        self.make_room(now);
        if self.capacity > 0 {
            self.cache.insert(
                signature,
                CachedFormation {
                    offsets,
                    created_at: now,
                },
            );
        }
        assigned
    }

    /// Greedy nearest-pair assignment of units to grid slots.
    fn plan(&self, store: &UnitStore, units: &[UnitHandle], base_target: Vec3) -> Vec<(UnitHandle, Vec3)> {
        let slots = grid_offsets(units.len(), self.spacing);

        let mut pairs: Vec<(f32, usize, usize)> = Vec::with_capacity(units.len() * slots.len());
        for (u, handle) in units.iter().enumerate() {
            let pos = store.position(*handle).unwrap_or(base_target);
            for (s, offset) in slots.iter().enumerate() {
                pairs.push((flat_distance_sq(pos, base_target + *offset), u, s));
            }
        }
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut unit_slot: Vec<Option<usize>> = vec![None; units.len()];
        let mut slot_taken = vec![false; slots.len()];
        let mut remaining = units.len();
        for (_, u, s) in pairs {
            if remaining == 0 {
                break;
            }
            if unit_slot[u].is_some() || slot_taken[s] {
                continue;
            }
            unit_slot[u] = Some(s);
            slot_taken[s] = true;
            remaining -= 1;
        }

        units
            .iter()
            .zip(unit_slot)
            .map(|(h, slot)| (*h, slot.map_or(Vec3::ZERO, |s| slots[s])))
            .collect()
    }

    /// Drop expired shapes, then the oldest one if the cache is still full.
    fn make_room(&mut self, now: f64) {
        let ttl = self.ttl;
        let before = self.cache.len();
        self.cache.retain(|_, entry| now - entry.created_at < ttl);
        self.stats.evicted += (before - self.cache.len()) as u64;

        if self.capacity > 0 && self.cache.len() >= self.capacity {
            let oldest = self
                .cache
                .iter()
                .min_by(|a, b| a.1.created_at.total_cmp(&b.1.created_at))
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                self.cache.remove(&oldest);
                self.stats.evicted += 1;
            }
        }
    }

    pub fn stats(&self) -> FormationStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

/// Slot offsets for `n` units: `cols = ceil(sqrt(n))`, `rows = ceil(n / cols)`,
/// centered on the origin, filled row by row.
pub fn grid_offsets(n: usize, spacing: f32) -> Vec<Vec3> {
    if n == 0 {
        return Vec::new();
    }
    let cols = (n as f32).sqrt().ceil() as usize;
    let rows = n.div_ceil(cols);
    let half_w = (cols - 1) as f32 * 0.5;
    let half_h = (rows - 1) as f32 * 0.5;

    (0..n)
        .map(|i| {
            let (row, col) = (i / cols, i % cols);
            Vec3::new(
                (col as f32 - half_w) * spacing,
                0.0,
                (row as f32 - half_h) * spacing,
            )
        })
        .collect()
}
