//! Packed unit storage.
//!
//! Every per-unit field lives in its own array, all index-aligned by
//! [`UnitHandle`]. The store is the single source of truth for whether a unit
//! exists: the spatial index, flow-field cache and formation cache only hold
//! derived views.
//!
//! Stale or out-of-range handles are treated as "not alive" by every
//! operation. Mutators become no-ops and queries return `false`/zero, so
//! collaborators holding a handle for a few frames after removal cannot crash
//! the simulation.

use crate::components::*;
use crate::math::Vec3;
use bevy_ecs::prelude::*;

/// Structure-of-arrays unit store with free-list slot recycling.
#[derive(Resource, Debug)]
pub struct UnitStore {
    capacity: usize,

    positions: Vec<Vec3>,
    velocities: Vec<Vec3>,
    facings: Vec<f32>,
    health: Vec<f32>,
    max_health: Vec<f32>,
    unit_types: Vec<UnitType>,
    owners: Vec<PlayerId>,
    states: Vec<UnitState>,
    target_positions: Vec<Vec3>,
    target_units: Vec<Option<UnitHandle>>,
    target_resources: Vec<Option<ResourceId>>,
    flags: Vec<UnitFlags>,
    carried: Vec<u32>,
    next_decision: Vec<f64>,

    /// Dead slots available for reuse. Each dead index appears exactly once.
    free_list: Vec<u32>,
    live_count: usize,
    events: Vec<UnitEvent>,
}

impl UnitStore {
    /// Create an empty store that can hold at most `capacity` live units.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            positions: Vec::with_capacity(capacity),
            velocities: Vec::with_capacity(capacity),
            facings: Vec::with_capacity(capacity),
            health: Vec::with_capacity(capacity),
            max_health: Vec::with_capacity(capacity),
            unit_types: Vec::with_capacity(capacity),
            owners: Vec::with_capacity(capacity),
            states: Vec::with_capacity(capacity),
            target_positions: Vec::with_capacity(capacity),
            target_units: Vec::with_capacity(capacity),
            target_resources: Vec::with_capacity(capacity),
            flags: Vec::with_capacity(capacity),
            carried: Vec::with_capacity(capacity),
            next_decision: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            live_count: 0,
            events: Vec::new(),
        }
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Spawn a unit at full health in the `Idle` state.
    ///
    /// Returns `None` when the store is at capacity.
    pub fn spawn(&mut self, player: PlayerId, unit_type: UnitType, pos: Vec3) -> Option<UnitHandle> {
        let stats = unit_type.stats();

        let handle = if let Some(index) = self.free_list.pop() {
            let i = index as usize;
            self.positions[i] = pos;
            self.velocities[i] = Vec3::ZERO;
            self.facings[i] = 0.0;
            self.health[i] = stats.max_health;
            self.max_health[i] = stats.max_health;
            self.unit_types[i] = unit_type;
            self.owners[i] = player;
            self.states[i] = UnitState::Idle;
            self.target_positions[i] = pos;
            self.target_units[i] = None;
            self.target_resources[i] = None;
            self.flags[i] = UnitFlags::empty();
            self.carried[i] = 0;
            self.next_decision[i] = 0.0;
            UnitHandle(index)
        } else if self.positions.len() < self.capacity {
            let index = self.positions.len() as u32;
            self.positions.push(pos);
            self.velocities.push(Vec3::ZERO);
            self.facings.push(0.0);
            self.health.push(stats.max_health);
            self.max_health.push(stats.max_health);
            self.unit_types.push(unit_type);
            self.owners.push(player);
            self.states.push(UnitState::Idle);
            self.target_positions.push(pos);
            self.target_units.push(None);
            self.target_resources.push(None);
            self.flags.push(UnitFlags::empty());
            self.carried.push(0);
            self.next_decision.push(0.0);
            UnitHandle(index)
        } else {
            tracing::debug!(capacity = self.capacity, ?unit_type, "spawn rejected: store at capacity");
            return None;
        };

        self.live_count += 1;
        self.events.push(UnitEvent::Spawned { handle, player });
        Some(handle)
    }

    /// Mark a unit dead and release its slot. Idempotent.
    pub fn remove(&mut self, handle: UnitHandle) {
        if !self.is_alive(handle) {
            return;
        }
        let i = handle.index();
        self.states[i] = UnitState::Dead;
        self.velocities[i] = Vec3::ZERO;
        self.target_units[i] = None;
        self.target_resources[i] = None;
        self.flags[i] = UnitFlags::empty();
        self.free_list.push(handle.0);
        self.live_count -= 1;
        self.events.push(UnitEvent::Removed { handle });
    }

    /// Apply damage. Returns `true` if this call killed the unit.
    pub fn damage(&mut self, handle: UnitHandle, amount: f32) -> bool {
        if !self.is_alive(handle) {
            return false;
        }
        let i = handle.index();
        self.health[i] = (self.health[i] - amount.max(0.0)).max(0.0);
        if self.health[i] <= 0.0 {
            self.events.push(UnitEvent::Died { handle });
            self.remove(handle);
            return true;
        }
        false
    }

    pub fn heal(&mut self, handle: UnitHandle, amount: f32) {
        if !self.is_alive(handle) {
            return;
        }
        let i = handle.index();
        self.health[i] = (self.health[i] + amount.max(0.0)).min(self.max_health[i]);
    }

    #[inline]
    pub fn is_alive(&self, handle: UnitHandle) -> bool {
        self.states
            .get(handle.index())
            .is_some_and(|state| *state != UnitState::Dead)
    }

    // ========================================================================
    // COMMANDS
    // ========================================================================

    /// Set a move target and switch the unit to `Moving`.
    pub fn set_move_target(&mut self, handle: UnitHandle, target: Vec3) {
        if !self.is_alive(handle) {
            return;
        }
        let i = handle.index();
        self.target_positions[i] = target;
        self.states[i] = UnitState::Moving;
    }

    /// Halt a unit: `Idle`, zero velocity.
    pub fn stop(&mut self, handle: UnitHandle) {
        if !self.is_alive(handle) {
            return;
        }
        let i = handle.index();
        self.states[i] = UnitState::Idle;
        self.velocities[i] = Vec3::ZERO;
    }

    /// Halt a moving unit that reached its goal and queue an `Arrived` event.
    pub(crate) fn arrive(&mut self, handle: UnitHandle) {
        self.stop(handle);
        self.events.push(UnitEvent::Arrived { handle });
    }

    /// Change behavior state. Use [`remove`](Self::remove) to kill a unit.
    pub fn set_state(&mut self, handle: UnitHandle, state: UnitState) {
        if !self.is_alive(handle) || state == UnitState::Dead {
            return;
        }
        let i = handle.index();
        self.states[i] = state;
        if state != UnitState::Moving {
            self.velocities[i] = Vec3::ZERO;
        }
    }

    // ========================================================================
    // STAT QUERIES
    // ========================================================================

    pub fn stats(&self, handle: UnitHandle) -> Option<&'static UnitStats> {
        self.unit_type(handle).map(UnitType::stats)
    }

    /// Max movement speed, 0 for dead handles.
    pub fn speed(&self, handle: UnitHandle) -> f32 {
        self.stats(handle).map_or(0.0, |s| s.speed)
    }

    pub fn can_attack(&self, handle: UnitHandle) -> bool {
        self.stats(handle).is_some_and(|s| s.can_attack)
    }

    pub fn can_gather(&self, handle: UnitHandle) -> bool {
        self.stats(handle).is_some_and(|s| s.can_gather)
    }

    pub fn attack_range(&self, handle: UnitHandle) -> f32 {
        self.stats(handle).map_or(0.0, |s| s.attack_range)
    }

    pub fn carry_capacity(&self, handle: UnitHandle) -> u32 {
        self.stats(handle).map_or(0, |s| s.carry_capacity)
    }

    // ========================================================================
    // FIELD ACCESS
    // ========================================================================

    pub fn position(&self, handle: UnitHandle) -> Option<Vec3> {
        self.live_index(handle).map(|i| self.positions[i])
    }

    pub fn velocity(&self, handle: UnitHandle) -> Option<Vec3> {
        self.live_index(handle).map(|i| self.velocities[i])
    }

    pub fn facing(&self, handle: UnitHandle) -> Option<f32> {
        self.live_index(handle).map(|i| self.facings[i])
    }

    pub fn health(&self, handle: UnitHandle) -> f32 {
        self.live_index(handle).map_or(0.0, |i| self.health[i])
    }

    pub fn max_health(&self, handle: UnitHandle) -> f32 {
        self.live_index(handle).map_or(0.0, |i| self.max_health[i])
    }

    pub fn unit_type(&self, handle: UnitHandle) -> Option<UnitType> {
        self.live_index(handle).map(|i| self.unit_types[i])
    }

    pub fn owner(&self, handle: UnitHandle) -> Option<PlayerId> {
        self.live_index(handle).map(|i| self.owners[i])
    }

    /// Behavior state. Stale and out-of-range handles report `Dead`.
    pub fn state(&self, handle: UnitHandle) -> UnitState {
        self.states
            .get(handle.index())
            .copied()
            .unwrap_or(UnitState::Dead)
    }

    pub fn target_position(&self, handle: UnitHandle) -> Option<Vec3> {
        self.live_index(handle).map(|i| self.target_positions[i])
    }

    pub fn target_unit(&self, handle: UnitHandle) -> Option<UnitHandle> {
        self.live_index(handle).and_then(|i| self.target_units[i])
    }

    pub fn set_target_unit(&mut self, handle: UnitHandle, target: Option<UnitHandle>) {
        if let Some(i) = self.live_index(handle) {
            self.target_units[i] = target;
        }
    }

    pub fn target_resource(&self, handle: UnitHandle) -> Option<ResourceId> {
        self.live_index(handle).and_then(|i| self.target_resources[i])
    }

    pub fn set_target_resource(&mut self, handle: UnitHandle, resource: Option<ResourceId>) {
        if let Some(i) = self.live_index(handle) {
            self.target_resources[i] = resource;
        }
    }

    pub fn flags(&self, handle: UnitHandle) -> UnitFlags {
        self.live_index(handle)
            .map_or(UnitFlags::empty(), |i| self.flags[i])
    }

    pub fn set_flags(&mut self, handle: UnitHandle, flags: UnitFlags, enabled: bool) {
        if let Some(i) = self.live_index(handle) {
            self.flags[i].set(flags, enabled);
        }
    }

    pub fn carried(&self, handle: UnitHandle) -> u32 {
        self.live_index(handle).map_or(0, |i| self.carried[i])
    }

    /// Add carried resources, clamped to the type's carry capacity.
    /// Returns the amount actually taken on.
    pub fn add_carried(&mut self, handle: UnitHandle, amount: u32) -> u32 {
        let Some(i) = self.live_index(handle) else {
            return 0;
        };
        let capacity = self.unit_types[i].stats().carry_capacity;
        let taken = amount.min(capacity.saturating_sub(self.carried[i]));
        self.carried[i] += taken;
        taken
    }

    /// Empty the unit's load, returning what it carried.
    pub fn take_carried(&mut self, handle: UnitHandle) -> u32 {
        self.live_index(handle)
            .map_or(0, |i| std::mem::take(&mut self.carried[i]))
    }

    pub fn next_decision(&self, handle: UnitHandle) -> Option<f64> {
        self.live_index(handle).map(|i| self.next_decision[i])
    }

    pub fn set_next_decision(&mut self, handle: UnitHandle, at: f64) {
        if let Some(i) = self.live_index(handle) {
            self.next_decision[i] = at;
        }
    }

    /// Write integrated motion back. Used by the movement engine.
    pub(crate) fn set_motion(&mut self, handle: UnitHandle, position: Vec3, velocity: Vec3) {
        if let Some(i) = self.live_index(handle) {
            self.positions[i] = position;
            self.velocities[i] = velocity;
        }
    }

    pub(crate) fn set_facing(&mut self, handle: UnitHandle, facing: f32) {
        if let Some(i) = self.live_index(handle) {
            self.facings[i] = facing;
        }
    }

    // ========================================================================
    // ITERATION & BOOKKEEPING
    // ========================================================================

    /// Handles of every live unit, in slot order.
    pub fn iter_alive(&self) -> impl Iterator<Item = UnitHandle> + '_ {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, state)| **state != UnitState::Dead)
            .map(|(i, _)| UnitHandle(i as u32))
    }

    pub fn live_count(&self) -> usize {
        self.live_count
    }

    /// Number of slots ever allocated (live + dead).
    pub fn slot_count(&self) -> usize {
        self.states.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of dead slots waiting for reuse.
    pub fn free_slots(&self) -> usize {
        self.free_list.len()
    }

    /// Take every event queued since the last drain.
    pub fn drain_events(&mut self) -> Vec<UnitEvent> {
        std::mem::take(&mut self.events)
    }

    #[inline]
    fn live_index(&self, handle: UnitHandle) -> Option<usize> {
        self.is_alive(handle).then_some(handle.index())
    }
}

impl Default for UnitStore {
    fn default() -> Self {
        Self::new(2048)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_at(store: &mut UnitStore, x: f32) -> UnitHandle {
        store
            .spawn(PlayerId(0), UnitType::Soldier, Vec3::new(x, 0.0, 0.0))
            .unwrap()
    }

    #[test]
    fn test_spawn_initializes_record() {
        let mut store = UnitStore::new(8);
        let h = store
            .spawn(PlayerId(3), UnitType::Archer, Vec3::new(1.0, 2.0, 3.0))
            .unwrap();

        assert!(store.is_alive(h));
        assert_eq!(store.state(h), UnitState::Idle);
        assert_eq!(store.owner(h), Some(PlayerId(3)));
        assert_eq!(store.health(h), UnitType::Archer.stats().max_health);
        assert_eq!(store.position(h), Some(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(store.target_position(h), Some(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(store.velocity(h), Some(Vec3::ZERO));
        assert_eq!(store.live_count(), 1);
    }

    #[test]
    fn test_spawn_fails_at_capacity() {
        let mut store = UnitStore::new(2);
        assert!(store.spawn(PlayerId(0), UnitType::Worker, Vec3::ZERO).is_some());
        assert!(store.spawn(PlayerId(0), UnitType::Worker, Vec3::ZERO).is_some());
        assert!(store.spawn(PlayerId(0), UnitType::Worker, Vec3::ZERO).is_none());
        assert_eq!(store.live_count(), 2);
    }

    #[test]
    fn test_remove_is_idempotent_and_recycles_slot() {
        let mut store = UnitStore::new(4);
        let a = spawn_at(&mut store, 0.0);
        let b = spawn_at(&mut store, 1.0);

        store.remove(a);
        store.remove(a);
        assert!(!store.is_alive(a));
        assert!(store.is_alive(b));
        assert_eq!(store.free_slots(), 1, "dead index must be in the free-list exactly once");
        assert_eq!(store.state(a), UnitState::Dead);

        let c = spawn_at(&mut store, 5.0);
        assert_eq!(c, a, "removed index should be reused");
        assert_eq!(store.free_slots(), 0);
        assert_eq!(store.position(c), Some(Vec3::new(5.0, 0.0, 0.0)));
    }

    #[test]
    fn test_alive_tracks_spawn_remove_sequences() {
        let mut store = UnitStore::new(16);
        let mut alive: Vec<UnitHandle> = Vec::new();
        let mut removed: Vec<UnitHandle> = Vec::new();

        for round in 0..6 {
            for i in 0..3 {
                alive.push(spawn_at(&mut store, (round * 3 + i) as f32));
            }
            let victim = alive.remove(round % alive.len());
            store.remove(victim);
            removed.retain(|h| *h != victim);
            removed.push(victim);
            removed.retain(|h| !alive.contains(h));
        }

        for h in &alive {
            assert!(store.is_alive(*h));
        }
        for h in &removed {
            assert!(!store.is_alive(*h));
        }
        assert_eq!(store.live_count(), alive.len());
        assert_eq!(store.iter_alive().count(), alive.len());
    }

    #[test]
    fn test_damage_kills_in_same_call() {
        let mut store = UnitStore::new(4);
        let h = spawn_at(&mut store, 0.0);
        let max = store.max_health(h);

        assert!(!store.damage(h, max * 0.5));
        assert_eq!(store.health(h), max * 0.5);

        assert!(store.damage(h, max * 10.0));
        assert!(!store.is_alive(h));
        assert_eq!(store.health(h), 0.0);

        // Dead handles ignore further damage.
        assert!(!store.damage(h, 1.0));

        let events = store.drain_events();
        assert!(events.contains(&UnitEvent::Died { handle: h }));
        assert!(events.contains(&UnitEvent::Removed { handle: h }));
    }

    #[test]
    fn test_heal_clamps_to_max() {
        let mut store = UnitStore::new(4);
        let h = spawn_at(&mut store, 0.0);
        let max = store.max_health(h);

        store.damage(h, 30.0);
        store.heal(h, 1000.0);
        assert_eq!(store.health(h), max);

        store.remove(h);
        store.heal(h, 10.0);
        assert_eq!(store.health(h), 0.0);
    }

    #[test]
    fn test_stale_and_out_of_range_handles_are_tolerated() {
        let mut store = UnitStore::new(4);
        let bogus = UnitHandle(999);

        assert!(!store.is_alive(bogus));
        assert_eq!(store.speed(bogus), 0.0);
        assert_eq!(store.position(bogus), None);
        assert_eq!(store.state(bogus), UnitState::Dead);
        assert!(!store.damage(bogus, 5.0));
        store.heal(bogus, 5.0);
        store.remove(bogus);
        store.set_move_target(bogus, Vec3::ONE);
        assert_eq!(store.live_count(), 0);
    }

    #[test]
    fn test_capability_queries_delegate_to_stat_table() {
        let mut store = UnitStore::new(4);
        let worker = store.spawn(PlayerId(0), UnitType::Worker, Vec3::ZERO).unwrap();
        let knight = store.spawn(PlayerId(0), UnitType::Knight, Vec3::ZERO).unwrap();

        assert!(store.can_gather(worker));
        assert!(!store.can_gather(knight));
        assert!(store.can_attack(knight));
        assert_eq!(store.speed(knight), UnitType::Knight.stats().speed);
        assert_eq!(store.attack_range(knight), UnitType::Knight.stats().attack_range);
        assert_eq!(store.carry_capacity(worker), 10);
    }

    #[test]
    fn test_carried_resources_clamp_to_capacity() {
        let mut store = UnitStore::new(4);
        let worker = store.spawn(PlayerId(0), UnitType::Worker, Vec3::ZERO).unwrap();
        let soldier = spawn_at(&mut store, 1.0);

        assert_eq!(store.add_carried(worker, 7), 7);
        assert_eq!(store.add_carried(worker, 7), 3);
        assert_eq!(store.carried(worker), 10);
        assert_eq!(store.take_carried(worker), 10);
        assert_eq!(store.carried(worker), 0);

        assert_eq!(store.add_carried(soldier, 5), 0);
    }

    #[test]
    fn test_move_and_stop_commands() {
        let mut store = UnitStore::new(4);
        let h = spawn_at(&mut store, 0.0);

        store.set_move_target(h, Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(store.state(h), UnitState::Moving);
        store.set_motion(h, Vec3::new(1.0, 0.0, 0.0), Vec3::new(5.0, 0.0, 0.0));

        store.set_state(h, UnitState::Gathering);
        assert_eq!(store.velocity(h), Some(Vec3::ZERO));

        store.set_state(h, UnitState::Dead);
        assert!(store.is_alive(h), "set_state must not kill; use remove");

        store.stop(h);
        assert_eq!(store.state(h), UnitState::Idle);
    }

    #[test]
    fn test_targets_flags_and_decision_time() {
        let mut store = UnitStore::new(4);
        let a = spawn_at(&mut store, 0.0);
        let b = spawn_at(&mut store, 1.0);

        store.set_target_unit(a, Some(b));
        store.set_target_resource(a, Some(ResourceId(7)));
        store.set_flags(a, UnitFlags::SELECTED, true);
        store.set_next_decision(a, 12.5);

        assert_eq!(store.target_unit(a), Some(b));
        assert_eq!(store.target_resource(a), Some(ResourceId(7)));
        assert!(store.flags(a).contains(UnitFlags::SELECTED));
        assert_eq!(store.next_decision(a), Some(12.5));

        store.remove(a);
        assert_eq!(store.target_unit(a), None);
        assert_eq!(store.flags(a), UnitFlags::empty());
    }
}
