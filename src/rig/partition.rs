use crate::ply::PlyData;
use std::collections::HashMap;
use std::hash::Hash;
use std::ops::Range;

/// Stable grouping of splats by key into contiguous blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition<K> {
    /// Distinct keys in first-seen order
    pub keys: Vec<K>,
    /// Range of the reindexed array each key occupies
    pub ranges: Vec<Range<usize>>,
    /// `order[k]` is the original index of reindexed element `k`
    pub order: Vec<usize>,
}

/// Group indices by key. Keys are numbered in first-seen order and indices
/// keep their relative order within a key, so partitioning already
/// contiguous keys is the identity.
pub fn partition_by_key<K: Copy + Eq + Hash>(keys: &[K]) -> Partition<K> {
    let mut slot_of: HashMap<K, usize> = HashMap::new();
    let mut distinct = Vec::new();
    let mut members: Vec<Vec<usize>> = Vec::new();

    for (i, &key) in keys.iter().enumerate() {
        let slot = *slot_of.entry(key).or_insert_with(|| {
            distinct.push(key);
            members.push(Vec::new());
            distinct.len() - 1
        });
        members[slot].push(i);
    }

    let mut order = Vec::with_capacity(keys.len());
    let mut ranges = Vec::with_capacity(members.len());
    for block in members {
        let start = order.len();
        order.extend(block);
        ranges.push(start..order.len());
    }

    Partition {
        keys: distinct,
        ranges,
        order,
    }
}

impl<K: Copy + Eq> Partition<K> {
    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// A single bucket means no finer separation was achieved
    pub fn is_coarse(&self) -> bool {
        self.keys.len() <= 1
    }

    pub fn range_of(&self, key: K) -> Option<Range<usize>> {
        self.keys
            .iter()
            .position(|&k| k == key)
            .map(|p| self.ranges[p].clone())
    }

    /// Key of the partition containing reindexed element `index`
    pub fn key_at(&self, index: usize) -> Option<K> {
        self.ranges
            .iter()
            .position(|r| r.contains(&index))
            .map(|p| self.keys[p])
    }

    /// Reindex a per-splat array into partition order
    pub fn permute<T: Clone>(&self, values: &[T]) -> Vec<T> {
        self.order.iter().map(|&i| values[i].clone()).collect()
    }

    /// Original indices of each partition, in partition order
    pub fn blocks(&self) -> impl Iterator<Item = &[usize]> + '_ {
        self.ranges.iter().map(|r| &self.order[r.clone()])
    }

    /// One encoded point cloud per partition, cut from the source's raw records
    pub fn split_point_cloud(&self, ply: &PlyData) -> Vec<Vec<u8>> {
        self.blocks().map(|block| ply.encode_subset(block)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use glam::Vec3;

    #[test]
    fn test_first_seen_order_and_ranges() {
        let p = partition_by_key(&[7, 3, 7, 9, 3, 7]);
        assert_eq!(p.keys, vec![7, 3, 9]);
        assert_eq!(p.order, vec![0, 2, 5, 1, 4, 3]);
        assert_eq!(p.ranges, vec![0..3, 3..5, 5..6]);
        assert_eq!(p.range_of(3), Some(3..5));
        assert_eq!(p.key_at(4), Some(3));
        assert!(!p.is_coarse());
    }

    #[test]
    fn test_partition_is_a_permutation() {
        let keys: Vec<usize> = (0..1000).map(|i| (i * 7919) % 13).collect();
        let p = partition_by_key(&keys);
        let mut seen = p.order.clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..1000).collect::<Vec<_>>());

        let sizes: usize = p.ranges.iter().map(|r| r.len()).sum();
        assert_eq!(sizes, 1000);

        let permuted = p.permute(&keys);
        for (range, key) in p.ranges.iter().zip(&p.keys) {
            assert!(permuted[range.clone()].iter().all(|k| k == key));
        }
    }

    #[test]
    fn test_partition_is_stable_under_reapplication() {
        let keys = [4, 1, 4, 2, 1, 1];
        let p = partition_by_key(&keys);
        let again = partition_by_key(&p.permute(&keys));
        assert_eq!(again.order, (0..keys.len()).collect::<Vec<_>>());
        assert_eq!(again.keys, p.keys);
        assert_eq!(again.ranges, p.ranges);
    }

    #[test]
    fn test_single_bucket_is_coarse() {
        assert!(partition_by_key(&[2, 2, 2]).is_coarse());
        assert!(partition_by_key::<u32>(&[]).is_coarse());
    }

    #[test]
    fn test_split_point_cloud_is_byte_exact() {
        let centers: Vec<Vec3> = (0..6).map(|i| Vec3::new(i as f32, 0.0, 0.0)).collect();
        let ply = PlyData::from_bytes(&fixtures::gaussian_ply_bytes(&centers)).unwrap();
        let p = partition_by_key(&[1, 0, 1, 0, 2, 1]);

        let parts = p.split_point_cloud(&ply);
        assert_eq!(parts.len(), 3);

        let mut total = 0;
        for (bytes, block) in parts.iter().zip(p.blocks()) {
            let part = PlyData::from_bytes(bytes).unwrap();
            assert_eq!(part.vertex_count(), block.len());
            for (k, &i) in block.iter().enumerate() {
                assert_eq!(part.record(k).raw, ply.record(i).raw);
            }
            total += part.vertex_count();
        }
        assert_eq!(total, 6);
    }
}
