//! Gaussian splat storage: an immutable bind snapshot plus a live, mutable
//! copy that tracks what the GPU still has to re-upload.

use crate::error::{Result, RigError};
use crate::math::Covariance;
use crate::ply::PlyData;
use glam::{Mat4, Quat, Vec3, Vec4};
use std::ops::Range;
use std::sync::Arc;

/// Zeroth-order spherical harmonic constant
pub const SH_C0: f32 = 0.28209479177387814;

/// Root transform of a point cloud in the scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplatScene {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: f32,
}

impl Default for SplatScene {
    /// Captures come in upside down: half a turn about Z
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::from_xyzw(0.0, 0.0, 1.0, 0.0),
            scale: 1.0,
        }
    }
}

impl SplatScene {
    pub fn with_rotation(rotation: Quat) -> Self {
        Self {
            rotation,
            ..Self::default()
        }
    }

    pub fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: 1.0,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(Vec3::splat(self.scale), self.rotation, self.position)
    }
}

/// Frozen per-splat attributes captured when the cloud was loaded.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SplatSnapshot {
    pub centers: Vec<Vec3>,
    /// rgba, 0..1
    pub colors: Vec<Vec4>,
    pub covariances: Vec<Covariance>,
}

impl SplatSnapshot {
    #[inline]
    pub fn len(&self) -> usize {
        self.centers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }

    fn permuted(&self, order: &[usize]) -> Self {
        Self {
            centers: order.iter().map(|&i| self.centers[i]).collect(),
            colors: order.iter().map(|&i| self.colors[i]).collect(),
            covariances: order.iter().map(|&i| self.covariances[i]).collect(),
        }
    }
}

/// Which colours the live buffer shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMode {
    #[default]
    Original,
    /// Capsule id colours written by bone assignment
    Assignment,
}

/// Owned, versioned splat arrays.
#[derive(Debug, Clone)]
pub struct SplatBuffer {
    bind: Arc<SplatSnapshot>,
    centers: Vec<Vec3>,
    colors: Vec<Vec4>,
    covariances: Vec<Covariance>,
    assignment_colors: Option<Vec<Vec4>>,
    color_mode: ColorMode,
    version: u64,
    dirty: Option<Range<usize>>,
}

impl SplatBuffer {
    pub fn new(snapshot: SplatSnapshot) -> Result<Self> {
        if snapshot.colors.len() != snapshot.len() || snapshot.covariances.len() != snapshot.len() {
            return Err(RigError::PlyParse(format!(
                "splat arrays disagree: {} centers, {} colors, {} covariances",
                snapshot.len(),
                snapshot.colors.len(),
                snapshot.covariances.len()
            )));
        }
        let count = snapshot.len();
        Ok(Self {
            centers: snapshot.centers.clone(),
            colors: snapshot.colors.clone(),
            covariances: snapshot.covariances.clone(),
            bind: Arc::new(snapshot),
            assignment_colors: None,
            color_mode: ColorMode::Original,
            version: 0,
            dirty: (count > 0).then_some(0..count),
        })
    }

    /// Read a Gaussian splat PLY (x/y/z, f_dc_*, opacity, scale_*, rot_*).
    pub fn from_ply(ply: &PlyData) -> Result<Self> {
        let slot = |name: &str| ply.layout.float_slot(name);
        let xyz = [slot("x"), slot("y"), slot("z")];
        let [Some(_), Some(_), Some(_)] = xyz else {
            return Err(RigError::PlyParse("point cloud needs float x, y and z".into()));
        };

        let mut snapshot = SplatSnapshot {
            centers: Vec::with_capacity(ply.vertex_count()),
            colors: Vec::with_capacity(ply.vertex_count()),
            covariances: Vec::with_capacity(ply.vertex_count()),
        };
        for r in ply.records() {
            let f = |name: &str, default: f32| r.float(name).unwrap_or(default);

            snapshot.centers.push(Vec3::new(f("x", 0.0), f("y", 0.0), f("z", 0.0)));

            let alpha = 1.0 / (1.0 + (-f("opacity", 10.0)).exp());
            snapshot.colors.push(Vec4::new(
                (0.5 + SH_C0 * f("f_dc_0", 0.0)).clamp(0.0, 1.0),
                (0.5 + SH_C0 * f("f_dc_1", 0.0)).clamp(0.0, 1.0),
                (0.5 + SH_C0 * f("f_dc_2", 0.0)).clamp(0.0, 1.0),
                alpha,
            ));

            let scale = Vec3::new(f("scale_0", -4.6), f("scale_1", -4.6), f("scale_2", -4.6)).exp();
            // rot_0 is w
            let q = Quat::from_xyzw(f("rot_1", 0.0), f("rot_2", 0.0), f("rot_3", 0.0), f("rot_0", 1.0));
            let q = if q.length_squared() > 1e-12 { q.normalize() } else { Quat::IDENTITY };
            snapshot.covariances.push(Covariance::from_scale_rotation(scale, q));
        }
        Self::new(snapshot)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.centers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }

    /// Bind-time attributes
    pub fn bind(&self) -> &SplatSnapshot {
        &self.bind
    }

    pub fn bind_snapshot(&self) -> Arc<SplatSnapshot> {
        Arc::clone(&self.bind)
    }

    pub fn centers(&self) -> &[Vec3] {
        &self.centers
    }

    pub fn colors(&self) -> &[Vec4] {
        &self.colors
    }

    pub fn covariances(&self) -> &[Covariance] {
        &self.covariances
    }

    pub fn assignment_colors(&self) -> Option<&[Vec4]> {
        self.assignment_colors.as_deref()
    }

    pub fn color_mode(&self) -> ColorMode {
        self.color_mode
    }

    /// Bind-pose center in scene world space
    pub fn world_center(&self, index: usize, scene: &Mat4) -> Vec3 {
        scene.transform_point3(self.bind.centers[index])
    }

    pub fn set_center(&mut self, index: usize, center: Vec3) {
        self.centers[index] = center;
        self.touch(index..index + 1);
    }

    pub fn set_covariance(&mut self, index: usize, covariance: Covariance) {
        self.covariances[index] = covariance;
        self.touch(index..index + 1);
    }

    pub fn set_color(&mut self, index: usize, color: Vec4) {
        self.colors[index] = color;
        self.touch(index..index + 1);
    }

    /// Overwrite rgb, keep alpha
    pub fn set_rgb(&mut self, index: usize, rgb: Vec3) {
        let alpha = self.colors[index].w;
        self.set_color(index, rgb.extend(alpha));
    }

    /// Keep the current live colours as the assignment view
    pub fn freeze_assignment_colors(&mut self) {
        self.assignment_colors = Some(self.colors.clone());
    }

    /// Switch between original and assignment colours
    pub fn set_color_mode(&mut self, mode: ColorMode) {
        let source = match mode {
            ColorMode::Original => &self.bind.colors,
            ColorMode::Assignment => match &self.assignment_colors {
                Some(colors) => colors,
                None => {
                    log::warn!("No assignment colours recorded; keeping original colours");
                    &self.bind.colors
                }
            },
        };
        self.colors.clone_from(source);
        self.color_mode = mode;
        self.touch(0..self.len());
    }

    /// Hide splats in both the bind snapshot and the live buffer.
    pub fn hide(&mut self, indices: &[usize]) {
        if indices.is_empty() {
            return;
        }
        let bind = Arc::make_mut(&mut self.bind);
        for &i in indices {
            bind.colors[i].w = 0.0;
            self.colors[i].w = 0.0;
            if let Some(colors) = self.assignment_colors.as_mut() {
                colors[i].w = 0.0;
            }
        }
        let lo = indices.iter().copied().min().unwrap_or(0);
        let hi = indices.iter().copied().max().unwrap_or(0);
        self.touch(lo..hi + 1);
    }

    /// Restore live attributes from the bind snapshot
    pub fn reset_to_bind(&mut self) {
        self.centers.clone_from(&self.bind.centers);
        self.colors.clone_from(&self.bind.colors);
        self.covariances.clone_from(&self.bind.covariances);
        self.color_mode = ColorMode::Original;
        self.touch(0..self.len());
    }

    /// Reindexed copy: element `k` of the result is element `order[k]` here.
    pub fn permuted(&self, order: &[usize]) -> Self {
        let count = order.len();
        Self {
            bind: Arc::new(self.bind.permuted(order)),
            centers: order.iter().map(|&i| self.centers[i]).collect(),
            colors: order.iter().map(|&i| self.colors[i]).collect(),
            covariances: order.iter().map(|&i| self.covariances[i]).collect(),
            assignment_colors: self
                .assignment_colors
                .as_ref()
                .map(|c| order.iter().map(|&i| c[i]).collect()),
            color_mode: self.color_mode,
            version: self.version + 1,
            dirty: (count > 0).then_some(0..count),
        }
    }

    /// Incremented on every mutation
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Range modified since the last call
    pub fn take_dirty(&mut self) -> Option<Range<usize>> {
        self.dirty.take()
    }

    fn touch(&mut self, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        self.version += 1;
        self.dirty = Some(match self.dirty.take() {
            Some(d) => d.start.min(range.start)..d.end.max(range.end),
            None => range,
        });
    }
}
