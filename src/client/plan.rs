//! Chunk arithmetic: how a file of `size` bytes splits into `chunk_size`
//! pieces and how those pieces are grouped into parallel batches.

use std::ops::Range;

/// Default split size. Many reverse proxies cap request bodies around 4-5 MB.
pub const CHUNK_SIZE: u64 = 4 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    size: u64,
    chunk_size: u64,
}

impl ChunkPlan {
    /// `None` if `chunk_size` is zero.
    pub fn new(size: u64, chunk_size: u64) -> Option<Self> {
        (chunk_size > 0).then_some(Self { size, chunk_size })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Files strictly smaller than one chunk go up in a single request.
    pub fn is_single_shot(&self) -> bool {
        self.size < self.chunk_size
    }

    pub fn total_chunks(&self) -> u64 {
        self.size.div_ceil(self.chunk_size)
    }

    /// Byte range `[i*C, min((i+1)*C, size))` of chunk `index`.
    pub fn range(&self, index: u64) -> Range<u64> {
        let start = index.saturating_mul(self.chunk_size).min(self.size);
        let end = start.saturating_add(self.chunk_size).min(self.size);
        start..end
    }

    /// Consecutive runs of at most `max_parallel` chunk indices.
    pub fn batches(&self, max_parallel: usize) -> impl Iterator<Item = Range<u64>> + use<> {
        let total = self.total_chunks();
        let step = max_parallel.max(1) as u64;
        (0..total)
            .step_by(step as usize)
            .map(move |start| start..(start + step).min(total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn ten_mib_splits_into_four_four_two() {
        let plan = ChunkPlan::new(10 * MIB, CHUNK_SIZE).unwrap();
        assert_eq!(plan.total_chunks(), 3);
        assert_eq!(plan.range(0), 0..4 * MIB);
        assert_eq!(plan.range(1), 4 * MIB..8 * MIB);
        assert_eq!(plan.range(2), 8 * MIB..10 * MIB);
        assert_eq!(plan.batches(3).collect::<Vec<_>>(), vec![0..3]);
    }

    #[test]
    fn chunk_lengths_sum_to_size() {
        for size in [1u64, 7, 8, 9, 63, 64, 65, 1000] {
            let plan = ChunkPlan::new(size, 8).unwrap();
            let total = plan.total_chunks();
            assert_eq!(total, size.div_ceil(8));
            let lens: Vec<u64> = (0..total).map(|i| plan.range(i)).map(|r| r.end - r.start).collect();
            assert!(lens[..lens.len() - 1].iter().all(|&l| l == 8));
            assert_eq!(*lens.last().unwrap(), size - (total - 1) * 8);
            assert_eq!(lens.iter().sum::<u64>(), size);
        }
    }

    #[test]
    fn threshold_is_strictly_below_chunk_size() {
        assert!(ChunkPlan::new(CHUNK_SIZE - 1, CHUNK_SIZE).unwrap().is_single_shot());
        assert!(!ChunkPlan::new(CHUNK_SIZE, CHUNK_SIZE).unwrap().is_single_shot());
        assert!(!ChunkPlan::new(CHUNK_SIZE + 1, CHUNK_SIZE).unwrap().is_single_shot());
    }

    #[test]
    fn batches_cover_every_index_once() {
        let plan = ChunkPlan::new(7 * 10, 10).unwrap();
        let batches: Vec<_> = plan.batches(3).collect();
        assert_eq!(batches, vec![0..3, 3..6, 6..7]);
        assert_eq!(plan.batches(0).count(), 7);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        assert!(ChunkPlan::new(10, 0).is_none());
    }
}
