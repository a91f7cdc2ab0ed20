//! Horde Simulation - Movement Core
//!
//! A deterministic, fixed-timestep simulation of group movement for
//! large-scale strategy games: thousands of units steering around each other
//! along shared flow fields. Uses `bevy_ecs` for resources and scheduling.

pub mod api;
pub mod components;
pub mod error;
pub mod flow_field;
pub mod formation;
pub mod math;
pub mod profiler;
pub mod render_bridge;
pub mod spatial;
pub mod store;
pub mod systems;
pub mod world;

pub use api::SimWorld;
pub use components::*;
pub use error::ConfigError;
pub use flow_field::{FlowCacheStats, FlowField, FlowFieldCache, NavigationGrid};
pub use formation::FormationPlanner;
pub use spatial::{SpatialEntry, SpatialIndex};
pub use store::UnitStore;
pub use systems::*;
pub use world::{Snapshot, UnitSnapshot};
