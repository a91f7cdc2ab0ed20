//! Simulation tuning, clocks and update-rate staggering.
//!
//! This module contains:
//! - `SimConfig`: every tunable constant of the movement core
//! - `SimTick` / `SimTime`: tick counter and simulation clock
//! - `UpdateTier` / `VisibilityMask`: per-unit bucket assignment
//!
//! ## Staggering
//! Units are partitioned into buckets by `handle_index % bucket_count`. Each
//! tick only the bucket equal to `tick % bucket_count` runs, with its elapsed
//! time scaled by `bucket_count`. Visible units use a small bucket count,
//! off-screen units a large one, so per-tick cost stays bounded as the
//! population grows.

use crate::error::ConfigError;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// Configuration for the movement core.
///
/// Loaded with [`SimConfig::from_json_str`] or built from `Default` and
/// checked with [`SimConfig::validate`] before a world is created.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Fixed timestep in seconds (e.g., 1/30 = 0.0333 for 30 Hz).
    pub fixed_timestep: f32,
    /// Maximum number of simultaneously live units.
    pub max_units: usize,

    // --- Spatial index ---
    /// Spatial index cell size in world units.
    pub spatial_cell_size: f32,
    /// Full index rebuild every N ticks; incremental updates in between.
    pub rebuild_interval_ticks: u64,

    // --- Arrival ---
    /// A moving unit closer than this to its target stops.
    pub arrival_threshold: f32,
    /// Radius scanned for moving neighbors when a unit arrives.
    pub stop_propagation_radius: f32,
    /// Neighbors whose own remaining distance is within
    /// `arrival_threshold * sync_stop_factor` halt together with an arriving unit.
    pub sync_stop_factor: f32,

    // --- Avoidance ---
    /// Neighbor query radius for avoidance.
    pub avoidance_radius: f32,
    /// Neighbors closer than this push each other apart.
    pub separation_distance: f32,
    /// Upper bound on neighbors considered per unit.
    pub max_avoidance_neighbors: usize,
    /// How far ahead (seconds) positions are extrapolated.
    pub prediction_horizon: f32,
    /// Push magnitude is `avoidance_strength / effective_distance`.
    pub avoidance_strength: f32,
    /// Floor applied to effective distance.
    pub min_avoidance_distance: f32,
    /// Clamp on the steering vector (world units per second squared).
    pub max_steering_force: f32,
    /// Facing only follows velocity above this speed.
    pub facing_epsilon: f32,

    // --- Route shaping ---
    /// Units slow down linearly inside this distance of their target.
    pub slowing_radius: f32,
    /// Lowest speed (fraction of max) used inside the slowing radius.
    pub min_speed_fraction: f32,
    /// Inside this distance a unit steers straight at its own target.
    pub direct_approach_distance: f32,

    // --- Staggering ---
    /// Update buckets for units that pass the visibility test.
    pub visible_buckets: u32,
    /// Update buckets for units that fail it.
    pub offscreen_buckets: u32,

    // --- Flow fields ---
    /// Pathfinding covers `[-world_half_extent, world_half_extent]` on X and Z.
    pub world_half_extent: f32,
    /// Flow-field grid cell size.
    pub flow_cell_size: f32,
    /// Targets are snapped to this grid before cache lookup.
    pub snap_distance: f32,
    /// Seconds of simulation time a generated field stays valid.
    pub field_lifetime: f64,
    /// Maximum number of cached fields.
    pub flow_cache_capacity: usize,
    /// New fields that may be generated per tick.
    pub flow_budget_per_tick: u32,

    // --- Formations ---
    /// Distance between neighboring formation slots.
    pub formation_spacing: f32,
    /// Seconds a cached formation is reused.
    pub formation_ttl: f64,
    /// Maximum number of cached formations.
    pub formation_cache_capacity: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            fixed_timestep: 1.0 / 30.0, // 30 Hz
            max_units: 2048,

            spatial_cell_size: 4.0,
            rebuild_interval_ticks: 10,

            arrival_threshold: 2.0,
            stop_propagation_radius: 4.0,
            sync_stop_factor: 1.5,

            avoidance_radius: 3.0,
            separation_distance: 0.75,
            max_avoidance_neighbors: 3,
            prediction_horizon: 0.5,
            avoidance_strength: 10.0,
            min_avoidance_distance: 0.1,
            max_steering_force: 20.0,
            facing_epsilon: 0.01,

            slowing_radius: 5.0,
            min_speed_fraction: 0.2,
            direct_approach_distance: 8.0,

            visible_buckets: 2,
            offscreen_buckets: 8,

            world_half_extent: 128.0, // 256 x 256 playable area
            flow_cell_size: 2.0,
            snap_distance: 8.0,
            field_lifetime: 10.0,
            flow_cache_capacity: 16,
            flow_budget_per_tick: 2,

            formation_spacing: 2.0,
            formation_ttl: 5.0,
            formation_cache_capacity: 64,
        }
    }
}

impl SimConfig {
    /// Parse a JSON document. Missing fields take their default value.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the core cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(v: f32) -> bool {
            v.is_finite() && v > 0.0
        }

        if !positive(self.fixed_timestep) {
            return Err(ConfigError::InvalidConfig("fixed_timestep must be positive"));
        }
        if self.max_units == 0 || self.max_units > u32::MAX as usize {
            return Err(ConfigError::InvalidConfig("max_units must be in 1..=u32::MAX"));
        }
        if !positive(self.spatial_cell_size) {
            return Err(ConfigError::InvalidConfig("spatial_cell_size must be positive"));
        }
        if self.rebuild_interval_ticks == 0 {
            return Err(ConfigError::InvalidConfig("rebuild_interval_ticks must be at least 1"));
        }
        if !positive(self.arrival_threshold) {
            return Err(ConfigError::InvalidConfig("arrival_threshold must be positive"));
        }
        if self.sync_stop_factor < 1.0 {
            return Err(ConfigError::InvalidConfig("sync_stop_factor must be at least 1"));
        }
        if self.separation_distance < 0.0 || self.avoidance_radius < self.separation_distance {
            return Err(ConfigError::InvalidConfig(
                "avoidance_radius must cover separation_distance",
            ));
        }
        if !positive(self.min_avoidance_distance) {
            return Err(ConfigError::InvalidConfig("min_avoidance_distance must be positive"));
        }
        if !positive(self.max_steering_force) {
            return Err(ConfigError::InvalidConfig("max_steering_force must be positive"));
        }
        if !positive(self.slowing_radius) {
            return Err(ConfigError::InvalidConfig("slowing_radius must be positive"));
        }
        if !(self.min_speed_fraction > 0.0 && self.min_speed_fraction <= 1.0) {
            return Err(ConfigError::InvalidConfig("min_speed_fraction must be in (0, 1]"));
        }
        if self.visible_buckets == 0 || self.offscreen_buckets == 0 {
            return Err(ConfigError::InvalidConfig("bucket counts must be at least 1"));
        }
        if !positive(self.world_half_extent) || !positive(self.flow_cell_size) {
            return Err(ConfigError::InvalidConfig("flow grid dimensions must be positive"));
        }
        if self.world_half_extent * 2.0 / self.flow_cell_size > 4096.0 {
            return Err(ConfigError::InvalidConfig("flow grid exceeds 4096 cells per axis"));
        }
        if !positive(self.snap_distance) {
            return Err(ConfigError::InvalidConfig("snap_distance must be positive"));
        }
        if !(self.field_lifetime > 0.0) || !(self.formation_ttl >= 0.0) {
            return Err(ConfigError::InvalidConfig("field_lifetime must be positive, formation_ttl non-negative"));
        }
        if self.flow_cache_capacity == 0 {
            return Err(ConfigError::InvalidConfig("flow_cache_capacity must be at least 1"));
        }
        Ok(())
    }

    /// Distance below which a trailing unit halts with an arriving neighbor.
    #[inline]
    pub fn sync_stop_distance(&self) -> f32 {
        self.arrival_threshold * self.sync_stop_factor
    }
}

/// Global simulation tick counter.
/// Increments once per `SimWorld::tick`, used for bucket scheduling.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct SimTick(pub u64);

impl SimTick {
    pub fn increment(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }

    /// Whether the unit at `index` belongs to this tick's bucket.
    #[inline]
    pub fn should_update(&self, index: usize, buckets: u32) -> bool {
        let buckets = u64::from(buckets.max(1));
        index as u64 % buckets == self.0 % buckets
    }
}

/// Simulation clock in seconds at the start of the current tick.
/// Cache expiry is measured against this, never the wall clock.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq)]
pub struct SimTime(pub f64);

/// Update-rate tier of a unit for the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateTier {
    /// Passed the visibility test: full steering with avoidance.
    Visible,
    /// Off-screen: cheap straight-line update.
    Offscreen,
}

impl UpdateTier {
    #[inline]
    pub fn buckets(self, config: &SimConfig) -> u32 {
        match self {
            UpdateTier::Visible => config.visible_buckets,
            UpdateTier::Offscreen => config.offscreen_buckets,
        }
    }
}

/// Visibility of every slot for the current tick, indexed by handle.
/// Computed once per tick before the schedule runs.
#[derive(Resource, Debug, Clone, Default)]
pub struct VisibilityMask(pub Vec<bool>);

impl VisibilityMask {
    /// Tier for a slot. Slots outside the mask count as off-screen.
    #[inline]
    pub fn tier(&self, index: usize) -> UpdateTier {
        if self.0.get(index).copied().unwrap_or(false) {
            UpdateTier::Visible
        } else {
            UpdateTier::Offscreen
        }
    }

    pub fn visible_count(&self) -> usize {
        self.0.iter().filter(|v| **v).count()
    }
}
