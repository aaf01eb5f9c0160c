//! Linear algebra primitives using glam plus the few kernels the rig needs on top.

pub use glam::{Affine3A, EulerRot, Mat3, Mat4, Quat, Vec2, Vec3, Vec4};

use serde::{Deserialize, Serialize};

/// Small epsilon value for floating-point comparisons
pub const EPSILON: f32 = 1e-6;

/// Extension trait for pulling rigid parts out of affine matrices.
pub trait Mat4Extended {
    /// Upper 3x3 with each column normalized: translation and scale discarded.
    fn rotation_part(&self) -> Mat3;

    /// Rotation of the matrix as a quaternion (scale removed).
    fn rotation_quat(&self) -> Quat;

    /// Translation column.
    fn position(&self) -> Vec3;
}

impl Mat4Extended for Mat4 {
    fn rotation_part(&self) -> Mat3 {
        let m = Mat3::from_mat4(*self);
        Mat3::from_cols(
            m.x_axis.normalize_or_zero(),
            m.y_axis.normalize_or_zero(),
            m.z_axis.normalize_or_zero(),
        )
    }

    fn rotation_quat(&self) -> Quat {
        Quat::from_mat3(&self.rotation_part()).normalize()
    }

    #[inline]
    fn position(&self) -> Vec3 {
        self.w_axis.truncate()
    }
}

/// Symmetric 3x3 covariance packed as `[xx, xy, xz, yy, yz, zz]`.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Covariance(pub [f32; 6]);

impl Covariance {
    /// Covariance of a Gaussian with per-axis `scale` rotated by `rotation`: R S Sᵀ Rᵀ.
    pub fn from_scale_rotation(scale: Vec3, rotation: Quat) -> Self {
        let m = Mat3::from_quat(rotation) * Mat3::from_diagonal(scale);
        Self::from_mat3(m * m.transpose())
    }

    pub fn from_mat3(m: Mat3) -> Self {
        Self([
            m.x_axis.x, m.y_axis.x, m.z_axis.x, m.y_axis.y, m.z_axis.y, m.z_axis.z,
        ])
    }

    pub fn to_mat3(&self) -> Mat3 {
        let [xx, xy, xz, yy, yz, zz] = self.0;
        Mat3::from_cols(
            Vec3::new(xx, xy, xz),
            Vec3::new(xy, yy, yz),
            Vec3::new(xz, yz, zz),
        )
    }

    /// Re-orient the ellipsoid: M Σ Mᵀ.
    pub fn transformed(&self, m: Mat3) -> Self {
        Self::from_mat3(m * self.to_mat3() * m.transpose())
    }
}

/// Closest point to `p` on triangle `abc` (Ericson's region test).
pub fn closest_point_on_triangle(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    let ab = b - a;
    let ac = c - a;
    if ab.cross(ac).length_squared() <= 1.0e-12 {
        // Degenerate: fall back to the nearest corner
        return [b, c]
            .into_iter()
            .fold(a, |best, v| if p.distance_squared(v) < p.distance_squared(best) { v } else { best });
    }

    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        return a + ab * (d1 / (d1 - d3));
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        return a + ac * (d2 / (d2 - d6));
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    a + ab * (vb * denom) + ac * (vc * denom)
}
