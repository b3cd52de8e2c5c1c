use opendom_gfx::commands::{fence::GfxFence, semaphore::GfxSemaphore};

/// 每帧使用的 GPU 同步原语
///
/// - `image_ready` 按 acquire slot 索引
/// - `render_finished` 与 `image_fences` 按交换链 image 索引
///
/// 两种索引是解耦的，acquire 返回的 image 顺序不一定与 slot 一致
pub struct FrameSignals {
    image_ready: Vec<GfxSemaphore>,
    render_finished: Vec<GfxSemaphore>,
    /// 创建时即为触发状态，保证每个 image 的第一次等待可以直接通过
    image_fences: Vec<GfxFence>,
}

// new & init
impl FrameSignals {
    pub fn new(image_count: usize, max_image_count: usize) -> anyhow::Result<Self> {
        anyhow::ensure!(
            image_count <= max_image_count,
            "swapchain image count {} exceeds the maximum of {}",
            image_count,
            max_image_count
        );

        let image_ready =
            (0..image_count).map(|idx| GfxSemaphore::new(&format!("image-ready-{idx}"))).collect::<anyhow::Result<Vec<_>>>()?;
        let render_finished =
            (0..image_count).map(|idx| GfxSemaphore::new(&format!("render-finished-{idx}"))).collect::<anyhow::Result<Vec<_>>>()?;
        let image_fences =
            (0..image_count).map(|idx| GfxFence::new(true, &format!("image-in-flight-{idx}"))).collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            image_ready,
            render_finished,
            image_fences,
        })
    }

    pub fn destroy(self) {
        self.image_ready.into_iter().for_each(GfxSemaphore::destroy);
        self.render_finished.into_iter().for_each(GfxSemaphore::destroy);
        self.image_fences.into_iter().for_each(GfxFence::destroy);
    }
}

// getters
impl FrameSignals {
    #[inline]
    pub fn count(&self) -> usize {
        self.image_fences.len()
    }

    #[inline]
    pub fn image_ready(&self, slot: usize) -> &GfxSemaphore {
        &self.image_ready[slot]
    }

    #[inline]
    pub fn render_finished(&self, image_index: usize) -> &GfxSemaphore {
        &self.render_finished[image_index]
    }

    #[inline]
    pub fn image_fence(&self, image_index: usize) -> &GfxFence {
        &self.image_fences[image_index]
    }
}
