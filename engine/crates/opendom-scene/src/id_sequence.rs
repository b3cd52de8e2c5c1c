/// 全局唯一的实例 id，跨 entity 单调递增
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(pub u32);

/// 实例 id 生成器
///
/// 由 entity store 持有，所有 entity 共享同一个序列。
/// `u32::MAX` 发出之后序列耗尽，之后只返回 `None`
#[derive(Debug)]
pub struct InstanceIdSequence {
    next: Option<u32>,
}

impl Default for InstanceIdSequence {
    fn default() -> Self {
        Self { next: Some(0) }
    }
}

impl InstanceIdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从指定值开始发号
    pub fn starting_at(first: u32) -> Self {
        Self { next: Some(first) }
    }

    /// 下一个将要发出的 id，不消耗
    #[inline]
    pub fn peek(&self) -> Option<InstanceId> {
        self.next.map(InstanceId)
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.next.is_none()
    }
}

impl Iterator for InstanceIdSequence {
    type Item = InstanceId;

    fn next(&mut self) -> Option<InstanceId> {
        let id = self.next?;
        self.next = id.checked_add(1);
        Some(InstanceId(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_monotonic() {
        let mut seq = InstanceIdSequence::new();
        let ids: Vec<_> = seq.by_ref().take(5).collect();
        assert_eq!(ids, (0..5).map(InstanceId).collect::<Vec<_>>());
        assert_eq!(seq.peek(), Some(InstanceId(5)));
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut seq = InstanceIdSequence::starting_at(10);
        assert_eq!(seq.peek(), Some(InstanceId(10)));
        assert_eq!(seq.peek(), Some(InstanceId(10)));
        assert_eq!(seq.next(), Some(InstanceId(10)));
        assert_eq!(seq.next(), Some(InstanceId(11)));
    }

    #[test]
    fn test_last_id_is_issued_then_exhausted() {
        let mut seq = InstanceIdSequence::starting_at(u32::MAX - 1);
        assert_eq!(seq.next(), Some(InstanceId(u32::MAX - 1)));
        assert_eq!(seq.next(), Some(InstanceId(u32::MAX)));
        assert!(seq.is_exhausted());

        assert_eq!(seq.peek(), None);
        assert_eq!(seq.next(), None);
        assert_eq!(seq.next(), None);
    }
}
