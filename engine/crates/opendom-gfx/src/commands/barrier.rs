use ash::vk;

use crate::resources::buffer::GfxBuffer;

/// buffer memory barrier 的封装，默认覆盖整个 buffer，不做 queue family 转移
#[derive(Clone, Copy)]
pub struct GfxBufferBarrier {
    inner: vk::BufferMemoryBarrier2<'static>,
}

impl GfxBufferBarrier {
    pub fn new(buffer: &GfxBuffer) -> Self {
        Self {
            inner: vk::BufferMemoryBarrier2::default()
                .buffer(buffer.vk_buffer())
                .offset(0)
                .size(vk::WHOLE_SIZE)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED),
        }
    }

    #[inline]
    pub fn src_mask(mut self, stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        self.inner = self.inner.src_stage_mask(stage).src_access_mask(access);
        self
    }

    #[inline]
    pub fn dst_mask(mut self, stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        self.inner = self.inner.dst_stage_mask(stage).dst_access_mask(access);
        self
    }

    #[inline]
    pub fn inner(&self) -> &vk::BufferMemoryBarrier2<'static> {
        &self.inner
    }
}

/// 全局 memory barrier，作用于之前提交到同一队列的所有命令
#[derive(Clone, Copy, Default)]
pub struct GfxMemoryBarrier {
    inner: vk::MemoryBarrier2<'static>,
}

impl GfxMemoryBarrier {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn src_mask(mut self, stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        self.inner = self.inner.src_stage_mask(stage).src_access_mask(access);
        self
    }

    #[inline]
    pub fn dst_mask(mut self, stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        self.inner = self.inner.dst_stage_mask(stage).dst_access_mask(access);
        self
    }

    #[inline]
    pub fn inner(&self) -> &vk::MemoryBarrier2<'static> {
        &self.inner
    }
}
