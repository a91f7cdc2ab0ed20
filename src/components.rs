//! Plain data types shared by every part of the simulation.
//!
//! Unit state itself lives in the parallel arrays of [`UnitStore`](crate::store::UnitStore);
//! this module defines the identities, enums and the static stat table those
//! arrays are made of.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

// ============================================================================
// IDENTITY
// ============================================================================

/// Index into every per-unit array. Valid between spawn and removal only;
/// indices are recycled through the store's free-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitHandle(pub u32);

impl UnitHandle {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Owning player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PlayerId(pub u8);

/// Handle of a resource node owned by the economy collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub u32);

// ============================================================================
// BEHAVIOR STATE
// ============================================================================

/// High-level behavior state of a unit.
///
/// Only `Moving` units are integrated by the movement engine. `Dead` records
/// are logically absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UnitState {
    #[default]
    Idle,
    Moving,
    Attacking,
    CastingAbility,
    Gathering,
    Building,
    Dead,
}

impl UnitState {
    /// Stable numeric id used by the flat render buffer.
    pub fn id(self) -> u8 {
        match self {
            UnitState::Idle => 0,
            UnitState::Moving => 1,
            UnitState::Attacking => 2,
            UnitState::CastingAbility => 3,
            UnitState::Gathering => 4,
            UnitState::Building => 5,
            UnitState::Dead => 6,
        }
    }
}

bitflags! {
    /// Selection/hover flags written by the UI collaborator.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct UnitFlags: u8 {
        const SELECTED = 1 << 0;
        const HOVERED = 1 << 1;
    }
}

// ============================================================================
// UNIT TYPES & STAT TABLE
// ============================================================================

/// Unit archetype. Indexes the static stat table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UnitType {
    #[default]
    Worker,
    Soldier,
    Archer,
    Knight,
    Siege,
}

impl UnitType {
    pub const ALL: [UnitType; 5] = [
        UnitType::Worker,
        UnitType::Soldier,
        UnitType::Archer,
        UnitType::Knight,
        UnitType::Siege,
    ];

    /// Static stats for this type. Resolved once, never rebuilt per query.
    #[inline]
    pub fn stats(self) -> &'static UnitStats {
        &UNIT_STATS[self as usize]
    }

    pub fn id(self) -> u8 {
        self as u8
    }
}

/// Read-only per-type statistics shared by every unit of that type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UnitStats {
    pub max_health: f32,
    /// Movement speed in world units per second.
    pub speed: f32,
    pub can_attack: bool,
    pub attack_damage: f32,
    pub attack_range: f32,
    /// Seconds between attacks.
    pub attack_cooldown: f32,
    pub can_gather: bool,
    /// Resources per second while gathering.
    pub gather_rate: f32,
    pub carry_capacity: u32,
}

/// Stat table indexed by `UnitType as usize`.
static UNIT_STATS: [UnitStats; 5] = [
    // Worker
    UnitStats {
        max_health: 40.0,
        speed: 4.0,
        can_attack: true,
        attack_damage: 3.0,
        attack_range: 1.0,
        attack_cooldown: 1.5,
        can_gather: true,
        gather_rate: 1.0,
        carry_capacity: 10,
    },
    // Soldier
    UnitStats {
        max_health: 100.0,
        speed: 5.0,
        can_attack: true,
        attack_damage: 10.0,
        attack_range: 1.5,
        attack_cooldown: 1.0,
        can_gather: false,
        gather_rate: 0.0,
        carry_capacity: 0,
    },
    // Archer
    UnitStats {
        max_health: 60.0,
        speed: 5.0,
        can_attack: true,
        attack_damage: 7.0,
        attack_range: 12.0,
        attack_cooldown: 1.6,
        can_gather: false,
        gather_rate: 0.0,
        carry_capacity: 0,
    },
    // Knight
    UnitStats {
        max_health: 180.0,
        speed: 7.5,
        can_attack: true,
        attack_damage: 16.0,
        attack_range: 1.8,
        attack_cooldown: 1.2,
        can_gather: false,
        gather_rate: 0.0,
        carry_capacity: 0,
    },
    // Siege
    UnitStats {
        max_health: 250.0,
        speed: 2.5,
        can_attack: true,
        attack_damage: 60.0,
        attack_range: 20.0,
        attack_cooldown: 5.0,
        can_gather: false,
        gather_rate: 0.0,
        carry_capacity: 0,
    },
];

// ============================================================================
// LIFECYCLE EVENTS
// ============================================================================

/// Lifecycle notice queued by the store and drained by collaborators once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitEvent {
    Spawned { handle: UnitHandle, player: PlayerId },
    /// Health reached zero. Always followed by `Removed` for the same handle.
    Died { handle: UnitHandle },
    Removed { handle: UnitHandle },
    /// A moving unit reached its target (or was halted by a synchronized stop).
    Arrived { handle: UnitHandle },
}
