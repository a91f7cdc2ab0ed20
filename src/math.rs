//! Minimal vector and plane math owned by the core.
//!
//! Units move on the XZ ground plane; Y is carried through untouched. The
//! frustum helpers let a rendering collaborator build the visibility predicate
//! passed to [`SimWorld::tick`](crate::api::SimWorld::tick) without the core
//! depending on any engine type.

pub use glam::{Mat4, UVec2, Vec2, Vec3, Vec4};

/// Project a vector onto the ground plane (drop Y).
#[inline]
pub fn flat(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

/// Squared distance between two points, ignoring height.
#[inline]
pub fn flat_distance_sq(a: Vec3, b: Vec3) -> f32 {
    let dx = a.x - b.x;
    let dz = a.z - b.z;
    dx * dx + dz * dz
}

/// Distance between two points, ignoring height.
#[inline]
pub fn flat_distance(a: Vec3, b: Vec3) -> f32 {
    flat_distance_sq(a, b).sqrt()
}

/// Yaw angle (radians about +Y) of a heading vector. 0 faces +Z.
#[inline]
pub fn yaw_of(v: Vec3) -> f32 {
    v.x.atan2(v.z)
}

/// A plane `normal · p + d = 0` with the normal pointing inward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub d: f32,
}

impl Plane {
    /// Build a plane from raw coefficients, normalizing so distances are metric.
    pub fn from_coefficients(v: Vec4) -> Self {
        let normal = v.truncate();
        let len = normal.length();
        if len <= f32::EPSILON {
            return Self { normal: Vec3::ZERO, d: 0.0 };
        }
        Self {
            normal: normal / len,
            d: v.w / len,
        }
    }

    /// Signed distance from the plane (positive on the inner side).
    #[inline]
    pub fn signed_distance(&self, p: Vec3) -> f32 {
        self.normal.dot(p) + self.d
    }
}

/// View frustum as six inward-facing planes.
#[derive(Debug, Clone, Copy)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extract the planes from a combined view-projection matrix
    /// (Gribb/Hartmann, depth range 0..1 as used by wgpu/glam RH projections).
    pub fn from_view_projection(m: Mat4) -> Self {
        let r0 = m.row(0);
        let r1 = m.row(1);
        let r2 = m.row(2);
        let r3 = m.row(3);
        Self {
            planes: [
                Plane::from_coefficients(r3 + r0), // left
                Plane::from_coefficients(r3 - r0), // right
                Plane::from_coefficients(r3 + r1), // bottom
                Plane::from_coefficients(r3 - r1), // top
                Plane::from_coefficients(r2),      // near
                Plane::from_coefficients(r3 - r2), // far
            ],
        }
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        self.contains_sphere(p, 0.0)
    }

    /// True if a sphere intersects or lies inside the frustum.
    pub fn contains_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(center) >= -radius)
    }
}
