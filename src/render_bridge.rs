//! Flat buffer export for instanced renderers.
//!
//! Converts a [`Snapshot`] into a contiguous `f32` array with a fixed stride
//! per unit, so a rendering collaborator can upload it without parsing JSON.
//!
//! # Buffer Layout (Version 1.0)
//!
//! ```text
//! [0]                       unit_count (as f32)
//! For each unit i (offset = HEADER_SIZE + i * UNIT_STRIDE):
//!   [+0]  handle      - Unit handle (u32 as f32)
//!   [+1]  x           - World position
//!   [+2]  y
//!   [+3]  z
//!   [+4]  vx          - Ground-plane velocity
//!   [+5]  vz
//!   [+6]  facing      - Yaw in radians, 0 facing +Z
//!   [+7]  player      - Owning player id
//!   [+8]  unit_type   - See UnitType::id
//!   [+9]  state       - See UnitState::id
//!   [+10] health_frac - health / health_max (0.0-1.0)
//!   [+11] selected    - 1.0 if selected
//! ```
//!
//! Units appear in snapshot order (handle order), so the same snapshot always
//! yields the same buffer.

use crate::world::Snapshot;

/// Number of f32 values per unit. Part of the buffer contract.
pub const UNIT_STRIDE: usize = 12;

/// Number of f32 values in the buffer header (unit count).
pub const HEADER_SIZE: usize = 1;

pub const FIELD_HANDLE: usize = 0;
pub const FIELD_X: usize = 1;
pub const FIELD_Y: usize = 2;
pub const FIELD_Z: usize = 3;
pub const FIELD_VX: usize = 4;
pub const FIELD_VZ: usize = 5;
pub const FIELD_FACING: usize = 6;
pub const FIELD_PLAYER: usize = 7;
pub const FIELD_UNIT_TYPE: usize = 8;
pub const FIELD_STATE: usize = 9;
pub const FIELD_HEALTH_FRAC: usize = 10;
pub const FIELD_SELECTED: usize = 11;

/// Convert a snapshot to the flat buffer described in the module docs.
///
/// ```rust
/// use horde_sim::api::SimWorld;
/// use horde_sim::render_bridge::{snapshot_to_flatbuffer, HEADER_SIZE, UNIT_STRIDE};
///
/// let sim = SimWorld::new();
/// let buffer = snapshot_to_flatbuffer(&sim.snapshot());
/// let unit_count = buffer[0] as usize;
/// assert_eq!(buffer.len(), HEADER_SIZE + unit_count * UNIT_STRIDE);
/// ```
pub fn snapshot_to_flatbuffer(snapshot: &Snapshot) -> Vec<f32> {
    let unit_count = snapshot.units.len();
    let buffer_size = calculate_buffer_size(unit_count);
    let mut buffer = Vec::with_capacity(buffer_size);

    buffer.push(unit_count as f32);
    for unit in &snapshot.units {
        let health_frac = if unit.health_max > 0.0 {
            (unit.health / unit.health_max).clamp(0.0, 1.0)
        } else {
            0.0
        };
        buffer.extend_from_slice(&[
            unit.handle as f32,
            unit.x,
            unit.y,
            unit.z,
            unit.vx,
            unit.vz,
            unit.facing,
            unit.player as f32,
            unit.unit_type.id() as f32,
            unit.state.id() as f32,
            health_frac,
            if unit.selected { 1.0 } else { 0.0 },
        ]);
    }

    debug_assert_eq!(buffer.len(), buffer_size, "Buffer size mismatch");
    buffer
}

/// `HEADER_SIZE + unit_count * UNIT_STRIDE`
#[inline]
pub fn calculate_buffer_size(unit_count: usize) -> usize {
    HEADER_SIZE + unit_count * UNIT_STRIDE
}

/// Unit count from a flat buffer, `None` if the buffer is empty.
#[inline]
pub fn parse_unit_count(buffer: &[f32]) -> Option<usize> {
    buffer.first().map(|count| *count as usize)
}

/// Buffer offset of the unit at `unit_index`.
#[inline]
pub const fn unit_offset(unit_index: usize) -> usize {
    HEADER_SIZE + unit_index * UNIT_STRIDE
}
