//! ECS systems and the per-tick resources they share.
//!
//! ## Tick Order
//!
//! The schedule chains three systems; each sees the previous one's writes:
//!
//! 1. `flow_budget_system` - Opens the flow-field generation budget and drops
//!    expired fields
//! 2. `spatial_rebuild_system` - Rebuilds the spatial index when due, so every
//!    neighbor query below sees a fresh index
//! 3. `movement_system` - Advances the moving units whose update bucket is due
//!
//! `flow_budget_system` lives in [`crate::flow_field`] and
//! `spatial_rebuild_system` in [`crate::spatial`], next to the resources
//! they maintain.

pub mod movement;
pub mod performance;
pub mod route;

pub use movement::*;
pub use performance::*;
pub use route::*;
