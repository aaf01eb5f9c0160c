use crate::config::RigConfig;
use glam::{Vec3, Vec3Swizzles};

/// Splats that are bound to a limb but are really floor or background.
///
/// A splat is stray when its offset points below the near-ground height
/// while being longer than the offset threshold, or when its world center
/// lies outside the horizontal radius around the character root.
pub fn stray_splats(offsets: &[Vec3], world_centers: &[Vec3], root: Vec3, config: &RigConfig) -> Vec<usize> {
    offsets
        .iter()
        .zip(world_centers)
        .enumerate()
        .filter_map(|(i, (offset, center))| {
            let low_and_long = offset.y < config.cull_height && offset.length() > config.cull_offset;
            let far = (center.xz() - root.xz()).length() > config.cull_radius;
            (low_and_long || far).then_some(i)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stray_rules() {
        let config = RigConfig::default();
        let offsets = [
            Vec3::new(0.0, 0.01, 0.5), // low and long
            Vec3::new(0.0, 0.3, 0.5),  // long but high
            Vec3::new(0.1, -0.1, 0.1), // low but short
            Vec3::ZERO,                // fine offset, far away
        ];
        let centers = [Vec3::ZERO, Vec3::ZERO, Vec3::new(1.0, -5.0, 1.0), Vec3::new(1.2, 0.0, 1.2)];
        assert_eq!(stray_splats(&offsets, &centers, Vec3::ZERO, &config), vec![0, 3]);
    }

    #[test]
    fn test_radius_is_measured_from_root() {
        let config = RigConfig::default();
        let root = Vec3::new(10.0, 0.0, 0.0);
        let centers = [Vec3::new(11.0, 3.0, 0.0), Vec3::ZERO];
        let offsets = [Vec3::ZERO; 2];
        assert_eq!(stray_splats(&offsets, &centers, root, &config), vec![1]);
    }
}
