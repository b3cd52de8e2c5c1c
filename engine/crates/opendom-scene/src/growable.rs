/// 一次 push 对容量的影响
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowthEvent {
    /// 容量足够，没有发生增长
    Fit,
    /// 容量不足，按固定步长增长
    Grew { old_capacity: usize, new_capacity: usize },
}

/// 按固定步长增长的数组
///
/// - 容量只增不减
/// - 增长不会改变已有元素的顺序
/// - len 与 capacity 都是显式的，调用者可以据此决定 GPU buffer 的大小
#[derive(Debug, Clone)]
pub struct GrowableArray<T> {
    items: Vec<T>,
    capacity: usize,
    growth: usize,
}

// new & init
impl<T> GrowableArray<T> {
    /// # param
    /// * initial_capacity - 初始容量
    /// * growth - 每次容量耗尽时增加的元素个数，必须大于 0
    pub fn new(initial_capacity: usize, growth: usize) -> Self {
        assert!(growth > 0, "growth increment must be positive");
        Self {
            items: Vec::with_capacity(initial_capacity),
            capacity: initial_capacity,
            growth,
        }
    }
}

// getters
impl<T> GrowableArray<T> {
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 逻辑容量，不是 Vec 的实际分配大小
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn growth(&self) -> usize {
        self.growth
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    #[inline]
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }
}

// update
impl<T> GrowableArray<T> {
    /// 追加一个元素，返回位置以及是否发生了增长
    pub fn push(&mut self, item: T) -> (usize, GrowthEvent) {
        let event = if self.items.len() == self.capacity {
            let old_capacity = self.capacity;
            self.capacity += self.growth;
            self.items.reserve_exact(self.capacity - self.items.len());
            log::debug!("growable array grew from {} to {}", old_capacity, self.capacity);
            GrowthEvent::Grew {
                old_capacity,
                new_capacity: self.capacity,
            }
        } else {
            GrowthEvent::Fit
        };

        self.items.push(item);
        (self.items.len() - 1, event)
    }
}

impl<T> std::ops::Index<usize> for GrowableArray<T> {
    type Output = T;
    fn index(&self, index: usize) -> &Self::Output {
        &self.items[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_within_capacity() {
        let mut arr = GrowableArray::new(4, 2);
        assert_eq!(arr.push(10), (0, GrowthEvent::Fit));
        assert_eq!(arr.push(11), (1, GrowthEvent::Fit));
        assert_eq!(arr.len(), 2);
        assert_eq!(arr.capacity(), 4);
    }

    #[test]
    fn test_growth_keeps_prefix() {
        let mut arr = GrowableArray::new(3, 5);
        for i in 0..3 {
            arr.push(i);
        }
        let before = arr.as_slice().to_vec();

        let (idx, event) = arr.push(3);
        assert_eq!(idx, 3);
        assert_eq!(
            event,
            GrowthEvent::Grew {
                old_capacity: 3,
                new_capacity: 8
            }
        );
        assert_eq!(&arr.as_slice()[..3], before.as_slice());
        assert_eq!(arr[3], 3);
    }

    #[test]
    fn test_zero_initial_capacity_grows_on_first_push() {
        let mut arr = GrowableArray::new(0, 4);
        let (_, event) = arr.push('a');
        assert_eq!(
            event,
            GrowthEvent::Grew {
                old_capacity: 0,
                new_capacity: 4
            }
        );
        assert_eq!(arr.capacity(), 4);
    }

    #[test]
    fn test_capacity_only_grows() {
        let mut arr = GrowableArray::new(1, 1);
        let mut last = arr.capacity();
        for i in 0..20 {
            arr.push(i);
            assert!(arr.capacity() >= last);
            assert!(arr.capacity() >= arr.len());
            last = arr.capacity();
        }
        assert_eq!(arr.capacity(), 20);
    }

    #[test]
    fn test_get_mut() {
        let mut arr = GrowableArray::new(2, 2);
        arr.push(1);
        *arr.get_mut(0).unwrap() = 7;
        assert_eq!(arr.get(0), Some(&7));
        assert_eq!(arr.get(1), None);
    }
}
