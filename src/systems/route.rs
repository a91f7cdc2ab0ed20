//! Preferred velocity for a single unit.
//!
//! Direction comes from the shared flow field when one is available and the
//! unit is still far from its own target; otherwise the unit steers straight
//! at the target. Speed is shaped so units ease into their destination
//! without ever stalling short of the arrival threshold.

use crate::components::UnitHandle;
use crate::flow_field::FlowFieldCache;
use crate::math::{flat, Vec3};
use crate::store::UnitStore;
use crate::systems::SimConfig;

/// Computes desired velocities from targets and flow fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteAdvisor {
    pub slowing_radius: f32,
    pub min_speed_fraction: f32,
    /// Inside this distance the unit ignores the flow field, whose snapped
    /// goal only approximates the unit's own target.
    pub direct_approach_distance: f32,
}

impl Default for RouteAdvisor {
    fn default() -> Self {
        Self::from_config(&SimConfig::default())
    }
}

impl RouteAdvisor {
    pub fn from_config(config: &SimConfig) -> Self {
        Self {
            slowing_radius: config.slowing_radius,
            min_speed_fraction: config.min_speed_fraction,
            direct_approach_distance: config.direct_approach_distance,
        }
    }

    /// Speed for a unit `distance` away from its target.
    #[inline]
    pub fn desired_speed(&self, max_speed: f32, distance: f32) -> f32 {
        let fraction = (distance / self.slowing_radius).clamp(self.min_speed_fraction, 1.0);
        max_speed * fraction
    }

    /// Desired XZ velocity for `handle`. Zero for dead units or units already
    /// on their target.
    pub fn preferred_velocity(
        &self,
        store: &UnitStore,
        handle: UnitHandle,
        flow: &mut FlowFieldCache,
        now: f64,
    ) -> Vec3 {
        let (Some(pos), Some(target)) = (store.position(handle), store.target_position(handle)) else {
            return Vec3::ZERO;
        };
        let to_target = flat(target - pos);
        let distance = to_target.length();
        if distance <= f32::EPSILON {
            return Vec3::ZERO;
        }
        let straight = to_target / distance;

        let direction = if distance <= self.direct_approach_distance {
            straight
        } else {
            let along_flow = flow.direction_at(pos, target, now);
            if along_flow == Vec3::ZERO {
                straight
            } else {
                along_flow
            }
        };

        direction * self.desired_speed(store.speed(handle), distance)
    }
}
