//! Serializable snapshot of the simulation state.
//!
//! The `Snapshot` is what renderers, replays and debugging tools consume:
//! every live unit plus the per-tick diagnostics of the movement core.

use crate::components::*;
use crate::flow_field::FlowCacheStats;
use crate::store::UnitStore;
use crate::systems::MovementStats;
use serde::{Deserialize, Serialize};

/// Snapshot of a single unit's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSnapshot {
    pub handle: u32,
    pub player: u8,
    pub unit_type: UnitType,
    pub state: UnitState,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub vx: f32,
    pub vz: f32,
    /// Yaw in radians, 0 facing +Z.
    pub facing: f32,
    pub health: f32,
    pub health_max: f32,
    pub carried: u32,
    pub selected: bool,
}

/// Complete simulation state snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Current simulation tick.
    pub tick: u64,
    /// Elapsed simulation time in seconds.
    pub time: f64,
    /// All live units, in handle order.
    pub units: Vec<UnitSnapshot>,
    /// Movement counters from the last tick.
    pub movement: MovementStats,
    /// Cumulative flow-field cache counters.
    pub flow_cache: FlowCacheStats,
}

impl Snapshot {
    /// Capture every live unit in the store.
    pub fn from_store(store: &UnitStore, tick: u64, time: f64) -> Self {
        let units = store
            .iter_alive()
            .filter_map(|handle| {
                let pos = store.position(handle)?;
                let vel = store.velocity(handle)?;
                Some(UnitSnapshot {
                    handle: handle.0,
                    player: store.owner(handle)?.0,
                    unit_type: store.unit_type(handle)?,
                    state: store.state(handle),
                    x: pos.x,
                    y: pos.y,
                    z: pos.z,
                    vx: vel.x,
                    vz: vel.z,
                    facing: store.facing(handle)?,
                    health: store.health(handle),
                    health_max: store.max_health(handle),
                    carried: store.carried(handle),
                    selected: store.flags(handle).contains(UnitFlags::SELECTED),
                })
            })
            .collect();

        Self {
            tick,
            time,
            units,
            ..Default::default()
        }
    }

    /// Serialize snapshot to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize snapshot to pretty JSON string.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
