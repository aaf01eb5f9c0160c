//! Data textures the splat renderer samples.
//!
//! Every texture is RGBA32F, `TEXTURE_WIDTH` texels wide, one logical element
//! per texel unless noted. Covariances are packed as half floats into RGBA32UI.

use crate::math::Covariance;
use crate::skeleton::{BoneMatrices, SkinnedMesh};
use crate::splat::SplatBuffer;
use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};
use half::f16;
use static_assertions::const_assert_eq;
use std::ops::Range;

pub const TEXTURE_WIDTH: usize = 4096;

/// One RGBA32F texel
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct Texel(pub [f32; 4]);

/// One RGBA32UI texel holding six f16 covariance entries
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct CovarianceTexel(pub [u32; 4]);

const_assert_eq!(std::mem::size_of::<Texel>(), 16);
const_assert_eq!(std::mem::size_of::<CovarianceTexel>(), 16);

impl From<Vec4> for Texel {
    fn from(v: Vec4) -> Self {
        Self(v.to_array())
    }
}

impl From<Vec3> for Texel {
    fn from(v: Vec3) -> Self {
        Self(v.extend(0.0).to_array())
    }
}

fn pack_pair(a: f32, b: f32) -> u32 {
    u32::from(f16::from_f32(a).to_bits()) | (u32::from(f16::from_f32(b).to_bits()) << 16)
}

fn unpack_pair(v: u32) -> (f32, f32) {
    (
        f16::from_bits((v & 0xffff) as u16).to_f32(),
        f16::from_bits((v >> 16) as u16).to_f32(),
    )
}

impl From<Covariance> for CovarianceTexel {
    fn from(c: Covariance) -> Self {
        let [xx, xy, xz, yy, yz, zz] = c.0;
        Self([pack_pair(xx, xy), pack_pair(xz, yy), pack_pair(yz, zz), 0])
    }
}

impl CovarianceTexel {
    pub fn unpack(&self) -> Covariance {
        let (xx, xy) = unpack_pair(self.0[0]);
        let (xz, yy) = unpack_pair(self.0[1]);
        let (yz, zz) = unpack_pair(self.0[2]);
        Covariance([xx, xy, xz, yy, yz, zz])
    }
}

/// Row-major texel grid padded to whole rows.
#[derive(Debug, Clone, PartialEq)]
pub struct DataTexture<T> {
    pub width: usize,
    pub height: usize,
    pub texels: Vec<T>,
}

impl<T: Pod + Default> DataTexture<T> {
    pub fn new(mut texels: Vec<T>) -> Self {
        let height = texels.len().div_ceil(TEXTURE_WIDTH).max(1);
        texels.resize(height * TEXTURE_WIDTH, T::default());
        Self {
            width: TEXTURE_WIDTH,
            height,
            texels,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.texels)
    }
}

/// Rest mesh positions with w = 1
pub fn pack_positions(mesh: &SkinnedMesh) -> DataTexture<Texel> {
    DataTexture::new(mesh.positions.iter().map(|p| Texel::from(p.extend(1.0))).collect())
}

pub fn pack_skin_indices(mesh: &SkinnedMesh) -> DataTexture<Texel> {
    DataTexture::new(
        mesh.skin_indices
            .iter()
            .map(|ix| Texel(ix.map(|i| i as f32)))
            .collect(),
    )
}

pub fn pack_skin_weights(mesh: &SkinnedMesh) -> DataTexture<Texel> {
    DataTexture::new(mesh.skin_weights.iter().map(|w| Texel(*w)).collect())
}

/// Reference vertex per splat in x; unbound splats store -1
pub fn pack_vertex_indices(vertices: &[Option<usize>]) -> DataTexture<Texel> {
    DataTexture::new(
        vertices
            .iter()
            .map(|v| Texel([v.map_or(-1.0, |v| v as f32), 0.0, 0.0, 0.0]))
            .collect(),
    )
}

pub fn pack_offsets(offsets: &[Vec3]) -> DataTexture<Texel> {
    DataTexture::new(offsets.iter().map(|&o| Texel::from(o)).collect())
}

/// Four texels (columns) per bone matrix
pub fn pack_bone_matrices(bones: &BoneMatrices) -> DataTexture<Texel> {
    DataTexture::new(
        bones
            .0
            .iter()
            .flat_map(|m| [m.x_axis, m.y_axis, m.z_axis, m.w_axis])
            .map(Texel::from)
            .collect(),
    )
}

pub fn pack_covariances(covariances: &[Covariance]) -> DataTexture<CovarianceTexel> {
    DataTexture::new(covariances.iter().map(|&c| CovarianceTexel::from(c)).collect())
}

/// Live splat attributes that changed since the last upload.
#[derive(Debug, Clone, PartialEq)]
pub struct SplatUpload {
    pub range: Range<usize>,
    pub centers: Vec<Texel>,
    pub colors: Vec<Texel>,
    pub covariances: Vec<CovarianceTexel>,
}

/// Tracks which splat buffer version the GPU copy reflects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextureSync {
    uploaded: Option<u64>,
}

impl TextureSync {
    pub fn uploaded_version(&self) -> Option<u64> {
        self.uploaded
    }

    pub fn needs_refresh(&self, splats: &SplatBuffer) -> bool {
        self.uploaded != Some(splats.version())
    }

    /// Texels for the dirty range, or `None` when the GPU copy is current
    pub fn refresh(&mut self, splats: &mut SplatBuffer) -> Option<SplatUpload> {
        let dirty = splats.take_dirty();
        if !self.needs_refresh(splats) && dirty.is_none() {
            return None;
        }
        // The dirty range was consumed elsewhere; resend everything
        let range = dirty.unwrap_or(0..splats.len());
        self.uploaded = Some(splats.version());
        log::debug!("Uploading splats {}..{} (version {})", range.start, range.end, splats.version());
        Some(SplatUpload {
            centers: splats.centers()[range.clone()].iter().map(|&c| Texel::from(c)).collect(),
            colors: splats.colors()[range.clone()].iter().map(|&c| Texel::from(c)).collect(),
            covariances: splats.covariances()[range.clone()]
                .iter()
                .map(|&c| CovarianceTexel::from(c))
                .collect(),
            range,
        })
    }
}
