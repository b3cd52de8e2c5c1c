use std::ops::Range;

/// 连续的脏 slot 区间，闭区间 `[first, last]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyRange {
    pub first: usize,
    pub last: usize,
}

impl DirtyRange {
    #[inline]
    pub fn new(first: usize, last: usize) -> Self {
        debug_assert!(first <= last);
        Self { first, last }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.last - self.first + 1
    }

    /// 闭区间永远至少包含一个 slot
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    #[inline]
    pub fn slots(&self) -> Range<usize> {
        self.first..self.last + 1
    }

    /// 该区间在 `T` 数组中对应的字节范围
    #[inline]
    pub fn byte_range<T>(&self) -> Range<u64> {
        let stride = size_of::<T>() as u64;
        self.first as u64 * stride..(self.last as u64 + 1) * stride
    }

    /// 按最大长度切分，用于满足单条 update 命令的大小限制
    pub fn split(self, max_len: usize) -> impl Iterator<Item = DirtyRange> {
        assert!(max_len > 0);
        (self.first..=self.last)
            .step_by(max_len)
            .map(move |first| DirtyRange::new(first, usize::min(first + max_len - 1, self.last)))
    }
}

/// 将脏标记合并为最大的连续区间，按 slot 顺序输出
///
/// 例如 10 个 slot 中 {2,3,4,7} 为脏，输出 `[2,4]` 和 `[7,7]`
pub fn coalesce_dirty_ranges(flags: &[bool]) -> Vec<DirtyRange> {
    let mut ranges = Vec::new();
    let mut run_start: Option<usize> = None;

    for (idx, &dirty) in flags.iter().enumerate() {
        match (dirty, run_start) {
            (true, None) => run_start = Some(idx),
            (false, Some(first)) => {
                ranges.push(DirtyRange::new(first, idx - 1));
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(first) = run_start {
        ranges.push(DirtyRange::new(first, flags.len() - 1));
    }

    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(len: usize, dirty: &[usize]) -> Vec<bool> {
        (0..len).map(|i| dirty.contains(&i)).collect()
    }

    #[test]
    fn test_coalesce_two_runs() {
        let ranges = coalesce_dirty_ranges(&flags(10, &[2, 3, 4, 7]));
        assert_eq!(ranges, vec![DirtyRange::new(2, 4), DirtyRange::new(7, 7)]);
    }

    #[test]
    fn test_coalesce_edges() {
        assert!(coalesce_dirty_ranges(&[]).is_empty());
        assert!(coalesce_dirty_ranges(&flags(5, &[])).is_empty());
        assert_eq!(coalesce_dirty_ranges(&flags(4, &[0, 1, 2, 3])), vec![DirtyRange::new(0, 3)]);
        assert_eq!(
            coalesce_dirty_ranges(&flags(6, &[0, 5])),
            vec![DirtyRange::new(0, 0), DirtyRange::new(5, 5)]
        );
    }

    #[test]
    fn test_ranges_cover_exactly_the_dirty_slots() {
        let dirty = [1, 2, 5, 6, 7, 9, 12];
        let ranges = coalesce_dirty_ranges(&flags(13, &dirty));
        let covered: Vec<usize> = ranges.iter().flat_map(|r| r.slots()).collect();
        assert_eq!(covered, dirty.to_vec());
    }

    #[test]
    fn test_byte_range() {
        let range = DirtyRange::new(2, 4);
        assert_eq!(range.len(), 3);
        assert_eq!(range.byte_range::<[u32; 4]>(), 32..80);
    }

    #[test]
    fn test_split() {
        let parts: Vec<_> = DirtyRange::new(3, 12).split(4).collect();
        assert_eq!(parts, vec![DirtyRange::new(3, 6), DirtyRange::new(7, 10), DirtyRange::new(11, 12)]);

        let whole: Vec<_> = DirtyRange::new(0, 2).split(100).collect();
        assert_eq!(whole, vec![DirtyRange::new(0, 2)]);
    }
}
