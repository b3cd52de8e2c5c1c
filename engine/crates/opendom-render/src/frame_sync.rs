use crate::{entity_store::EntityStore, sync::gpu_token::WaitOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// suboptimal 时本帧照常提交，present 之后再重建
    Acquired { image_index: usize, suboptimal: bool },
    Timeout,
    OutOfDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// suboptimal 或 out of date
    NeedRecreate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// 在超时时间内没有拿到可用的 image
    AcquireTimeout,
    /// 目标 image 的上一帧仍在 GPU 上执行
    ImageBusy,
    /// 窗口最小化，交换链尺寸为 0
    Minimized,
}

/// 一帧的结果，这些都不是错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    Skipped(SkipReason),
    /// 交换链已经重建，命令列表需要重新录制
    Recreated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramePhase {
    #[default]
    Idle,
    Acquiring,
    Submitted,
    Presented,
}

/// 帧同步需要的 GPU 操作
///
/// - `slot` 是 acquire 使用的 semaphore 下标，由帧计数对 image 数量取模得到
/// - `image_index` 是 acquire 返回的交换链 image 下标
pub trait FrameBackend {
    fn image_count(&self) -> usize;

    fn acquire(&mut self, slot: usize, timeout_ns: u64) -> anyhow::Result<AcquireOutcome>;

    /// 等待该 image 上一帧的 fence
    fn wait_image(&mut self, image_index: usize, timeout_ns: u64) -> anyhow::Result<WaitOutcome>;

    fn reset_image(&mut self, image_index: usize) -> anyhow::Result<()>;

    /// 提交 image 对应的命令列表：等待 slot 的 image ready，signal render finished 以及 image 的 fence
    fn submit(&mut self, slot: usize, image_index: usize) -> anyhow::Result<()>;

    fn present(&mut self, image_index: usize) -> anyhow::Result<PresentOutcome>;

    fn recreate(&mut self) -> anyhow::Result<()>;
}

/// acquire -> wait -> submit -> present 的状态机
#[derive(Debug)]
pub struct FrameSynchronizer {
    phase: FramePhase,
    /// 单调递增，对 image 数量取模得到 slot
    frame_counter: u64,
    /// 已经 acquire 但由于 image 忙而没有提交的 image，下一帧直接使用
    held_image: Option<usize>,
    recreate_requested: bool,
    /// 连续跳过的帧数，只在第一次跳过时输出 warn
    skip_streak: u32,

    acquire_timeout_ns: u64,
    image_timeout_ns: u64,
}

// new & init
impl FrameSynchronizer {
    pub fn new(acquire_timeout_ns: u64, image_timeout_ns: u64) -> Self {
        Self {
            phase: FramePhase::Idle,
            frame_counter: 0,
            held_image: None,
            recreate_requested: false,
            skip_streak: 0,
            acquire_timeout_ns,
            image_timeout_ns,
        }
    }
}

// getters
impl FrameSynchronizer {
    #[inline]
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    #[inline]
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    #[inline]
    pub fn held_image(&self) -> Option<usize> {
        self.held_image
    }
}

// update
impl FrameSynchronizer {
    /// 窗口尺寸变化时调用，在下一帧开始时重建交换链
    #[inline]
    pub fn request_recreate(&mut self) {
        self.recreate_requested = true;
    }

    pub fn run_frame(&mut self, backend: &mut impl FrameBackend) -> anyhow::Result<FrameOutcome> {
        // 持有 image 时 semaphore 已经被 acquire signal，此时不能销毁
        if self.recreate_requested && self.held_image.is_none() {
            return self.recreate(backend);
        }

        let image_count = backend.image_count();
        anyhow::ensure!(image_count > 0, "presentation chain has no images");
        let slot = (self.frame_counter % image_count as u64) as usize;

        let image_index = match self.held_image.take() {
            Some(image_index) => image_index,
            None => {
                self.phase = FramePhase::Acquiring;
                match backend.acquire(slot, self.acquire_timeout_ns)? {
                    AcquireOutcome::Acquired { image_index, suboptimal } => {
                        if suboptimal {
                            log::debug!("acquired suboptimal image {}, recreating after present", image_index);
                            self.recreate_requested = true;
                        }
                        image_index
                    }
                    AcquireOutcome::Timeout => {
                        self.phase = FramePhase::Idle;
                        return Ok(self.skip(SkipReason::AcquireTimeout));
                    }
                    AcquireOutcome::OutOfDate => {
                        log::warn!("swapchain out of date at acquire, recreating");
                        return self.recreate(backend);
                    }
                }
            }
        };

        // 等待的是目标 image 的上一帧，而不是 slot 的
        if backend.wait_image(image_index, self.image_timeout_ns)? == WaitOutcome::Timeout {
            self.held_image = Some(image_index);
            return Ok(self.skip(SkipReason::ImageBusy));
        }
        backend.reset_image(image_index)?;

        backend.submit(slot, image_index)?;
        self.phase = FramePhase::Submitted;

        let present = backend.present(image_index)?;
        self.frame_counter += 1;
        self.phase = FramePhase::Presented;
        self.skip_streak = 0;

        if present == PresentOutcome::NeedRecreate {
            log::warn!("swapchain suboptimal or out of date at present, recreating");
            return self.recreate(backend);
        }
        if self.recreate_requested {
            return self.recreate(backend);
        }
        Ok(FrameOutcome::Presented)
    }

    fn skip(&mut self, reason: SkipReason) -> FrameOutcome {
        if self.skip_streak == 0 {
            log::warn!("skipping frame {}: {:?}", self.frame_counter, reason);
        } else {
            log::debug!("skipping frame {}: {:?} ({} in a row)", self.frame_counter, reason, self.skip_streak + 1);
        }
        self.skip_streak += 1;
        FrameOutcome::Skipped(reason)
    }

    fn recreate(&mut self, backend: &mut impl FrameBackend) -> anyhow::Result<FrameOutcome> {
        log::info!("recreating presentation chain");
        backend.recreate()?;
        self.recreate_requested = false;
        self.held_image = None;
        self.phase = FramePhase::Idle;
        Ok(FrameOutcome::Recreated)
    }
}

/// 交换链重建后旧的命令列表引用了已经销毁的对象
pub fn apply_frame_outcome(store: &mut EntityStore, outcome: FrameOutcome) {
    if outcome == FrameOutcome::Recreated {
        store.mark_command_list_dirty();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use opendom_scene::instance::Instance;

    use super::*;
    use crate::entity_store::{
        MeshBinding,
        tests::{MemorySink, small_config},
    };

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Acquire(usize),
        Wait(usize),
        Reset(usize),
        Submit { slot: usize, image: usize },
        Present(usize),
        Recreate,
    }

    /// 按脚本返回结果的 backend，未指定时返回成功
    struct ScriptedBackend {
        image_count: usize,
        next_image: usize,
        acquires: VecDeque<AcquireOutcome>,
        waits: VecDeque<WaitOutcome>,
        presents: VecDeque<PresentOutcome>,
        calls: Vec<Call>,
    }

    impl ScriptedBackend {
        fn new(image_count: usize) -> Self {
            Self {
                image_count,
                next_image: 0,
                acquires: VecDeque::new(),
                waits: VecDeque::new(),
                presents: VecDeque::new(),
                calls: vec![],
            }
        }

        fn submits(&self) -> Vec<(usize, usize)> {
            self.calls
                .iter()
                .filter_map(|c| match c {
                    Call::Submit { slot, image } => Some((*slot, *image)),
                    _ => None,
                })
                .collect()
        }
    }

    impl FrameBackend for ScriptedBackend {
        fn image_count(&self) -> usize {
            self.image_count
        }

        fn acquire(&mut self, slot: usize, _timeout_ns: u64) -> anyhow::Result<AcquireOutcome> {
            self.calls.push(Call::Acquire(slot));
            Ok(self.acquires.pop_front().unwrap_or_else(|| {
                let image_index = self.next_image;
                self.next_image = (self.next_image + 1) % self.image_count;
                AcquireOutcome::Acquired {
                    image_index,
                    suboptimal: false,
                }
            }))
        }

        fn wait_image(&mut self, image_index: usize, _timeout_ns: u64) -> anyhow::Result<WaitOutcome> {
            self.calls.push(Call::Wait(image_index));
            Ok(self.waits.pop_front().unwrap_or(WaitOutcome::Signaled))
        }

        fn reset_image(&mut self, image_index: usize) -> anyhow::Result<()> {
            self.calls.push(Call::Reset(image_index));
            Ok(())
        }

        fn submit(&mut self, slot: usize, image_index: usize) -> anyhow::Result<()> {
            self.calls.push(Call::Submit {
                slot,
                image: image_index,
            });
            Ok(())
        }

        fn present(&mut self, image_index: usize) -> anyhow::Result<PresentOutcome> {
            self.calls.push(Call::Present(image_index));
            Ok(self.presents.pop_front().unwrap_or(PresentOutcome::Presented))
        }

        fn recreate(&mut self) -> anyhow::Result<()> {
            self.calls.push(Call::Recreate);
            Ok(())
        }
    }

    fn acquired(image_index: usize) -> AcquireOutcome {
        AcquireOutcome::Acquired {
            image_index,
            suboptimal: false,
        }
    }

    #[test]
    fn test_normal_frame_sequence() {
        let mut backend = ScriptedBackend::new(3);
        let mut sync = FrameSynchronizer::new(100, 100);

        assert_eq!(sync.run_frame(&mut backend).unwrap(), FrameOutcome::Presented);
        assert_eq!(
            backend.calls,
            vec![
                Call::Acquire(0),
                Call::Wait(0),
                Call::Reset(0),
                Call::Submit { slot: 0, image: 0 },
                Call::Present(0),
            ]
        );
        assert_eq!(sync.phase(), FramePhase::Presented);
        assert_eq!(sync.frame_counter(), 1);
    }

    #[test]
    fn test_slot_and_image_are_decoupled() {
        let mut backend = ScriptedBackend::new(3);
        backend.acquires.extend([acquired(2), acquired(0), acquired(1), acquired(2)]);
        let mut sync = FrameSynchronizer::new(100, 100);

        for _ in 0..4 {
            sync.run_frame(&mut backend).unwrap();
        }
        assert_eq!(backend.submits(), vec![(0, 2), (1, 0), (2, 1), (0, 2)]);

        // 等待的是 image 的 fence
        let waits: Vec<_> = backend.calls.iter().filter(|c| matches!(c, Call::Wait(_))).copied().collect();
        assert_eq!(waits, vec![Call::Wait(2), Call::Wait(0), Call::Wait(1), Call::Wait(2)]);
    }

    #[test]
    fn test_acquire_timeout_skips_without_submit() {
        let mut backend = ScriptedBackend::new(2);
        backend.acquires.push_back(AcquireOutcome::Timeout);
        let mut sync = FrameSynchronizer::new(100, 100);

        assert_eq!(sync.run_frame(&mut backend).unwrap(), FrameOutcome::Skipped(SkipReason::AcquireTimeout));
        assert!(backend.submits().is_empty());
        assert_eq!(sync.frame_counter(), 0);
        assert_eq!(sync.phase(), FramePhase::Idle);

        // 下一帧使用同一个 slot 重试
        sync.run_frame(&mut backend).unwrap();
        assert_eq!(backend.submits(), vec![(0, 0)]);
    }

    #[test]
    fn test_image_busy_keeps_image_and_resets_only_after_wait() {
        let mut backend = ScriptedBackend::new(2);
        backend.acquires.push_back(acquired(1));
        backend.waits.push_back(WaitOutcome::Timeout);
        let mut sync = FrameSynchronizer::new(100, 100);

        assert_eq!(sync.run_frame(&mut backend).unwrap(), FrameOutcome::Skipped(SkipReason::ImageBusy));
        assert_eq!(backend.calls, vec![Call::Acquire(0), Call::Wait(1)]);
        assert_eq!(sync.held_image(), Some(1));

        // 不再 acquire，直接重新等待同一个 image
        assert_eq!(sync.run_frame(&mut backend).unwrap(), FrameOutcome::Presented);
        assert_eq!(
            backend.calls[2..],
            [Call::Wait(1), Call::Reset(1), Call::Submit { slot: 0, image: 1 }, Call::Present(1)]
        );
        assert_eq!(sync.held_image(), None);
    }

    #[test]
    fn test_out_of_date_at_acquire_recreates() {
        let mut backend = ScriptedBackend::new(2);
        backend.acquires.push_back(AcquireOutcome::OutOfDate);
        let mut sync = FrameSynchronizer::new(100, 100);

        assert_eq!(sync.run_frame(&mut backend).unwrap(), FrameOutcome::Recreated);
        assert_eq!(backend.calls, vec![Call::Acquire(0), Call::Recreate]);
        assert_eq!(sync.phase(), FramePhase::Idle);
    }

    #[test]
    fn test_present_out_of_date_recreates_after_present() {
        let mut backend = ScriptedBackend::new(2);
        backend.presents.push_back(PresentOutcome::NeedRecreate);
        let mut sync = FrameSynchronizer::new(100, 100);

        assert_eq!(sync.run_frame(&mut backend).unwrap(), FrameOutcome::Recreated);
        assert_eq!(backend.calls.last(), Some(&Call::Recreate));
        assert_eq!(backend.submits().len(), 1);
        assert_eq!(sync.frame_counter(), 1);
    }

    #[test]
    fn test_suboptimal_acquire_presents_then_recreates() {
        let mut backend = ScriptedBackend::new(2);
        backend.acquires.push_back(AcquireOutcome::Acquired {
            image_index: 0,
            suboptimal: true,
        });
        let mut sync = FrameSynchronizer::new(100, 100);

        assert_eq!(sync.run_frame(&mut backend).unwrap(), FrameOutcome::Recreated);
        assert_eq!(backend.calls[3..], [Call::Submit { slot: 0, image: 0 }, Call::Present(0), Call::Recreate]);
    }

    #[test]
    fn test_requested_recreate_waits_for_held_image() {
        let mut backend = ScriptedBackend::new(2);
        backend.waits.push_back(WaitOutcome::Timeout);
        let mut sync = FrameSynchronizer::new(100, 100);

        sync.run_frame(&mut backend).unwrap();
        sync.request_recreate();

        // 先把持有的 image 提交出去，present 之后再重建
        assert_eq!(sync.run_frame(&mut backend).unwrap(), FrameOutcome::Recreated);
        assert_eq!(backend.submits(), vec![(0, 0)]);
        assert_eq!(backend.calls.last(), Some(&Call::Recreate));
    }

    #[test]
    fn test_recreate_leaves_entity_data_untouched() {
        let mut store = EntityStore::new(&small_config());
        let e = store.create_entity_definition(MeshBinding { vertex_count: 3 });
        for _ in 0..3 {
            store.add_instance(e, Instance::identity().with_uniform_scale(0.01)).unwrap();
        }
        let mut sink = MemorySink::default();
        store.record_dirty_updates(&mut sink).unwrap();
        store.clear_command_list_dirty();
        let host_before = store.definition(e).unwrap().instances().to_vec();
        let device_before = sink.buffers[&e].clone();

        let mut backend = ScriptedBackend::new(3);
        backend.acquires.push_back(AcquireOutcome::OutOfDate);
        let mut sync = FrameSynchronizer::new(100, 100);
        let outcome = sync.run_frame(&mut backend).unwrap();
        apply_frame_outcome(&mut store, outcome);

        assert!(store.command_list_dirty());
        assert!(!store.has_pending_sync());
        assert_eq!(store.definition(e).unwrap().instances(), host_before.as_slice());

        let report = store.record_dirty_updates(&mut sink).unwrap();
        assert!(report.is_empty());
        assert_eq!(sink.buffers[&e], device_before);
    }
}
