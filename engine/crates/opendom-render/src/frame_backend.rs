use ash::vk;
use opendom_gfx::{
    commands::submit_info::GfxSubmitInfo,
    gfx::Gfx,
    swapchain::{
        render_swapchain::{GfxAcquireResult, GfxPresentResult},
        surface::GfxSurface,
    },
};

use crate::{
    command_list::CommandLists,
    config::RendererConfig,
    frame_sync::{AcquireOutcome, FrameBackend, PresentOutcome},
    present_chain::PresentationChain,
    sync::{
        frame_signals::FrameSignals,
        gpu_token::{CompletionFence, WaitOutcome},
    },
    uniforms::GpuUniforms,
};

/// 基于交换链的 [`FrameBackend`]，只在一帧之内借用 RenderState 的各个部分
pub(crate) struct SwapchainFrameBackend<'a> {
    pub surface: &'a GfxSurface,
    pub config: &'a RendererConfig,
    pub window_extent: vk::Extent2D,

    pub chain: &'a mut PresentationChain,
    pub signals: &'a mut FrameSignals,
    /// 每个 slot 最后一次提交使用的 image
    pub slot_images: &'a mut Vec<Option<usize>>,
    pub command_lists: &'a CommandLists,
    pub uniforms: &'a mut GpuUniforms,
}

impl FrameBackend for SwapchainFrameBackend<'_> {
    fn image_count(&self) -> usize {
        self.chain.image_count()
    }

    fn acquire(&mut self, slot: usize, timeout_ns: u64) -> anyhow::Result<AcquireOutcome> {
        // slot 的 semaphore 被上一次提交等待，该提交完成之前不能再次用于 acquire
        if let Some(last_image) = self.slot_images[slot] {
            if CompletionFence::wait(self.signals.image_fence(last_image), timeout_ns)? == WaitOutcome::Timeout {
                return Ok(AcquireOutcome::Timeout);
            }
        }

        let result = self.chain.swapchain().acquire_next_image(self.signals.image_ready(slot), timeout_ns)?;
        Ok(match result {
            GfxAcquireResult::Acquired { image_index, suboptimal } => AcquireOutcome::Acquired {
                image_index: image_index as usize,
                suboptimal,
            },
            GfxAcquireResult::Timeout => AcquireOutcome::Timeout,
            GfxAcquireResult::OutOfDate => AcquireOutcome::OutOfDate,
        })
    }

    fn wait_image(&mut self, image_index: usize, timeout_ns: u64) -> anyhow::Result<WaitOutcome> {
        CompletionFence::wait(self.signals.image_fence(image_index), timeout_ns)
    }

    fn reset_image(&mut self, image_index: usize) -> anyhow::Result<()> {
        self.signals.image_fence(image_index).reset()
    }

    fn submit(&mut self, slot: usize, image_index: usize) -> anyhow::Result<()> {
        let cmd = self
            .command_lists
            .command_buffer(image_index)
            .ok_or_else(|| anyhow::anyhow!("no command list recorded for image {}", image_index))?;

        let submit_info = GfxSubmitInfo::new(&[cmd])
            .wait(self.signals.image_ready(slot), vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
            .signal(self.signals.render_finished(image_index), vk::PipelineStageFlags2::ALL_COMMANDS);
        Gfx::get().gfx_queue().submit(vec![submit_info], Some(self.signals.image_fence(image_index)))?;

        self.slot_images[slot] = Some(image_index);
        Ok(())
    }

    fn present(&mut self, image_index: usize) -> anyhow::Result<PresentOutcome> {
        let result = self.chain.swapchain().present_image(
            Gfx::get().gfx_queue(),
            image_index as u32,
            &[self.signals.render_finished(image_index)],
        )?;
        Ok(match result {
            GfxPresentResult::Optimal => PresentOutcome::Presented,
            GfxPresentResult::NeedRecreate => PresentOutcome::NeedRecreate,
        })
    }

    fn recreate(&mut self) -> anyhow::Result<()> {
        self.chain.recreate(self.surface, self.config, self.window_extent, &self.uniforms.bindings())?;
        self.uniforms.camera.update_projection(self.chain.extent());

        // queue 已经空闲，可以直接替换同步原语
        let image_count = self.chain.image_count();
        let signals = FrameSignals::new(image_count, self.config.max_swapchain_images)?;
        std::mem::replace(self.signals, signals).destroy();
        *self.slot_images = vec![None; image_count];
        Ok(())
    }
}
