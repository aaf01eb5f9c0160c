//! Capture cleaning: separate the subject from floor and background splats.
//!
//! Captures arrive upside down (the subject stands along -y), so heights are
//! measured as `-y` in centimetre bins.

use crate::config::RigConfig;
use crate::error::{Result, RigError};
use crate::ply::PlyData;
use glam::{Vec2, Vec3, Vec3Swizzles};

/// Half-width of the shoe grid in cells (cells are 2 cm)
const SHOE_GRID_HALF: i32 = 26;
const SHOE_GRID_SIZE: usize = (2 * SHOE_GRID_HALF + 1) as usize;
const SHOE_CELLS_PER_METER: f32 = 50.0;
const SHOE_RADIUS: f32 = 0.5;
/// Minimum mean height above the floor for a cell to count as a shoe
const SHOE_MIN_HEIGHT: f32 = 0.01;
/// A kept cell with at least this many non-kept neighbours is dropped
const SHOE_LONELY_NEIGHBOURS: usize = 6;

/// Floor level and the first empty height above it, in metres of `-y`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Heights {
    pub floor: f32,
    pub top: f32,
}

impl Heights {
    /// Height at `fraction` of the way from floor to top
    pub fn at(&self, fraction: f32) -> f32 {
        self.floor + (self.top - self.floor) * fraction
    }
}

/// Indices of the subject ("near") and background ("far") points.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanResult {
    pub near: Vec<usize>,
    pub far: Vec<usize>,
    /// Subject centre in the xz plane
    pub centroid: Vec2,
    pub heights: Heights,
}

impl CleanResult {
    /// Encoded outputs: the near set, then the far set when it is not empty.
    /// A single output tells the caller to skip the background stage.
    pub fn encode(&self, ply: &PlyData) -> Vec<Vec<u8>> {
        let mut outputs = vec![ply.encode_subset(&self.near)];
        if !self.far.is_empty() {
            outputs.push(ply.encode_subset(&self.far));
        }
        outputs
    }
}

/// JS-style rounding (halves toward +infinity) so bins match the capture tools
fn round_half_up(v: f32) -> i32 {
    (v + 0.5).floor() as i32
}

fn positions(ply: &PlyData) -> Result<Vec<Vec3>> {
    let column = |name: &str| {
        ply.float_column(name)
            .ok_or_else(|| RigError::Unsupported(format!("point cloud has no float property {}", name)))
    };
    let (xs, ys, zs) = (column("x")?, column("y")?, column("z")?);
    Ok(xs
        .into_iter()
        .zip(ys)
        .zip(zs)
        .map(|((x, y), z)| Vec3::new(x, y, z))
        .collect())
}

/// Floor is the most populated centimetre bin, top the first empty bin above it.
fn calculate_heights(subject: &[Vec3]) -> Heights {
    let bins: Vec<i32> = subject.iter().map(|p| round_half_up(-p.y * 100.0)).collect();
    let (Some(&min), Some(&max)) = (bins.iter().min(), bins.iter().max()) else {
        return Heights { floor: 0.0, top: 0.0 };
    };

    let mut frequency = vec![0usize; (max - min + 1) as usize];
    for &b in &bins {
        frequency[(b - min) as usize] += 1;
    }

    // First maximum wins
    let mut floor = min;
    let mut best = 0;
    for (i, &count) in frequency.iter().enumerate() {
        if count > best {
            best = count;
            floor = min + i as i32;
        }
    }
    let top = (floor + 1..=max)
        .find(|&y| frequency[(y - min) as usize] == 0)
        .unwrap_or(max + 1);

    Heights {
        floor: floor as f32 / 100.0,
        top: top as f32 / 100.0,
    }
}

/// Mean xz of subject points between 10% and 40% of the body height.
fn calculate_centroid(subject: &[Vec3], heights: &Heights) -> Vec2 {
    let (low, high) = (heights.at(0.1), heights.at(0.4));
    let (sum, count) = subject
        .iter()
        .filter(|p| low < -p.y && -p.y < high)
        .fold((Vec2::ZERO, 0usize), |(sum, n), p| (sum + p.xz(), n + 1));
    if count == 0 {
        Vec2::ZERO
    } else {
        sum / count as f32
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ShoeCell {
    sum: f32,
    count: usize,
    keep: bool,
}

fn shoe_cell_key(p: Vec3) -> Option<usize> {
    let x = round_half_up(p.x * SHOE_CELLS_PER_METER) + SHOE_GRID_HALF;
    let z = round_half_up(p.z * SHOE_CELLS_PER_METER) + SHOE_GRID_HALF;
    let range = 0..SHOE_GRID_SIZE as i32;
    (range.contains(&x) && range.contains(&z)).then(|| x as usize * SHOE_GRID_SIZE + z as usize)
}

/// Keep low points that form a dense patch near the subject's feet.
/// Returns `(kept, rejected)`; both preserve the input order.
fn detect_shoes(points: &[Vec3], near: &[usize], heights: &Heights) -> (Vec<usize>, Vec<usize>) {
    let low = heights.at(0.1);
    let is_low = |p: Vec3| -p.y < low;
    let in_radius = |p: Vec3| p.xz().length() < SHOE_RADIUS;

    let mut grid = vec![ShoeCell::default(); SHOE_GRID_SIZE * SHOE_GRID_SIZE];
    for &i in near {
        let p = points[i];
        if !(is_low(p) && in_radius(p)) {
            continue;
        }
        if let Some(key) = shoe_cell_key(p) {
            grid[key].sum += -p.y - heights.floor;
            grid[key].count += 1;
        }
    }

    let mean_count = grid.iter().map(|c| c.count).sum::<usize>() as f32 / grid.len() as f32;
    for cell in &mut grid {
        let mean = if cell.count == 0 { 0.0 } else { cell.sum / cell.count as f32 };
        cell.keep = cell.count as f32 > mean_count && mean > SHOE_MIN_HEIGHT;
    }

    // Sweep in place: cells dropped earlier count against later neighbours
    let n = SHOE_GRID_SIZE as i32;
    for x in 0..n {
        for z in 0..n {
            if !grid[(x * n + z) as usize].keep {
                continue;
            }
            let mut lonely = 0;
            for dx in -1..=1 {
                for dz in -1..=1 {
                    if dx == 0 && dz == 0 {
                        continue;
                    }
                    let (nx, nz) = (x + dx, z + dz);
                    let kept = (0..n).contains(&nx) && (0..n).contains(&nz) && grid[(nx * n + nz) as usize].keep;
                    if !kept {
                        lonely += 1;
                    }
                }
            }
            if lonely >= SHOE_LONELY_NEIGHBOURS {
                grid[(x * n + z) as usize].keep = false;
            }
        }
    }

    near.iter().partition(|&&i| {
        let p = points[i];
        !is_low(p) || (in_radius(p) && shoe_cell_key(p).is_some_and(|k| grid[k].keep))
    })
}

/// Split a capture into the subject and its surroundings.
pub fn clean_point_cloud(ply: &PlyData, config: &RigConfig) -> Result<CleanResult> {
    let points = positions(ply)?;
    let near_r = config.clean_near;
    let far_r = config.clean_far;
    let in_cylinder = |p: Vec3| p.xz().length() < near_r && p.y.abs() < near_r * 2.0;

    let subject: Vec<Vec3> = points.iter().copied().filter(|&p| in_cylinder(p)).collect();
    if subject.is_empty() {
        log::warn!("No points within {} of the capture origin", near_r);
    }
    let heights = calculate_heights(&subject);
    let centroid = calculate_centroid(&subject, &heights);

    let between = |p: Vec3| heights.floor < -p.y && -p.y < heights.top;
    let mut near = Vec::new();
    let mut far = Vec::new();
    let mut dropped = 0;
    for (i, &p) in points.iter().enumerate() {
        let centred = Vec3::new(p.x - centroid.x, p.y, p.z - centroid.y);
        let inside = in_cylinder(centred);
        if inside && between(centred) {
            near.push(i);
        } else if (!inside && centred.length() < far_r) || inside {
            far.push(i);
        } else {
            dropped += 1;
        }
    }

    if !far.is_empty() {
        let (kept, rejected) = detect_shoes(&points, &near, &heights);
        log::debug!("Shoe detection moved {} low points to the background", rejected.len());
        near = kept;
        far.extend(rejected);
    }

    log::info!(
        "Cleaned {} points: {} subject, {} background, {} dropped (floor {:.2}, top {:.2})",
        points.len(),
        near.len(),
        far.len(),
        dropped,
        heights.floor,
        heights.top
    );
    Ok(CleanResult {
        near,
        far,
        centroid,
        heights,
    })
}
