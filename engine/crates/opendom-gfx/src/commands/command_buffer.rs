use anyhow::Context;
use ash::vk;
use itertools::Itertools;

use crate::{
    commands::{
        barrier::{GfxBufferBarrier, GfxMemoryBarrier},
        command_pool::GfxCommandPool,
    },
    foundation::debug_messenger::DebugType,
    gfx::Gfx,
    resources::buffer::GfxBuffer,
};

/// debug label 使用的颜色
const LABEL_COLOR: [f32; 4] = [0.6, 0.8, 0.4, 1.0];

/// 命令缓冲封装
///
/// 封装 Vulkan CommandBuffer，提供命令录制接口。
/// 生命周期跟随 command pool，不需要单独销毁。
///
/// # 使用示例
/// ```ignore
/// let cmd = GfxCommandBuffer::new(&pool, "instance-sync")?;
/// cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, "instance-sync")?;
/// cmd.cmd_update_buffer(buffer, 0, bytes);
/// cmd.end()?;
/// ```
#[derive(Clone)]
pub struct GfxCommandBuffer {
    vk_handle: vk::CommandBuffer,
}
// new & init
impl GfxCommandBuffer {
    pub fn new(command_pool: &GfxCommandPool, debug_name: &str) -> anyhow::Result<Self> {
        let mut buffers = Self::allocate(command_pool, 1, debug_name)?;
        buffers.pop().context("driver returned no command buffer")
    }

    /// 一次分配多个 primary command buffer，debug name 会带上序号
    pub fn allocate(command_pool: &GfxCommandPool, count: u32, debug_name: &str) -> anyhow::Result<Vec<Self>> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool.handle())
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        let gfx_device = Gfx::get().gfx_device();
        let handles = unsafe { gfx_device.allocate_command_buffers(&info) }
            .with_context(|| format!("failed to allocate command buffers {}", debug_name))?;

        let buffers = handles.into_iter().map(|vk_handle| Self { vk_handle }).collect_vec();
        for (idx, cmd) in buffers.iter().enumerate() {
            gfx_device.set_debug_name(cmd, format!("{}-{}", debug_name, idx));
        }
        Ok(buffers)
    }

    /// 释放之后，command buffer 不能再被使用
    pub fn free(command_pool: &GfxCommandPool, command_buffers: Vec<GfxCommandBuffer>) {
        if command_buffers.is_empty() {
            return;
        }
        let handles = command_buffers.iter().map(|cmd| cmd.vk_handle).collect_vec();
        unsafe {
            Gfx::get().gfx_device().free_command_buffers(command_pool.handle(), &handles);
        }
    }
}
// Basic 命令
impl GfxCommandBuffer {
    /// 开始录制 command，并且开启 debug label
    ///
    /// pool 需要带有 RESET_COMMAND_BUFFER，begin 会隐式 reset
    pub fn begin(&self, usage_flag: vk::CommandBufferUsageFlags, debug_label_name: &str) -> anyhow::Result<()> {
        unsafe {
            Gfx::get()
                .gfx_device()
                .begin_command_buffer(self.vk_handle, &vk::CommandBufferBeginInfo::default().flags(usage_flag))
        }
        .with_context(|| format!("failed to begin command buffer {}", debug_label_name))?;
        self.begin_label(debug_label_name);
        Ok(())
    }

    /// 结束 debug label 以及录制
    pub fn end(&self) -> anyhow::Result<()> {
        self.end_label();
        unsafe { Gfx::get().gfx_device().end_command_buffer(self.vk_handle) }.context("failed to end command buffer")
    }
}
// getters
impl GfxCommandBuffer {
    #[inline]
    pub fn vk_handle(&self) -> vk::CommandBuffer {
        self.vk_handle
    }
}
// 数据传输类型
impl GfxCommandBuffer {
    /// - command type: action
    /// - 支持的 queue：transfer，graphics，compute
    #[inline]
    pub fn cmd_copy_buffer(&self, src: &GfxBuffer, dst: &GfxBuffer, regions: &[vk::BufferCopy]) {
        unsafe {
            Gfx::get().gfx_device().cmd_copy_buffer(self.vk_handle, src.vk_buffer(), dst.vk_buffer(), regions);
        }
    }

    /// 将 data 传输到 buffer 中，大小限制：65536Bytes=64KB，offset 与大小都需要 4 字节对齐
    ///
    /// data 在录制时被拷贝进 command buffer，录制完成后 host 端可以随意修改原数据
    ///
    /// 需要在 render pass 之外进行，注意同步
    ///
    /// - command type: action
    /// - supported queue types: transfer, graphics, compute
    #[inline]
    pub fn cmd_update_buffer(&self, buffer: &GfxBuffer, offset: vk::DeviceSize, data: &[u8]) {
        debug_assert!(data.len() <= 65536 && data.len() % 4 == 0 && offset % 4 == 0);
        unsafe { Gfx::get().gfx_device().cmd_update_buffer(self.vk_handle, buffer.vk_buffer(), offset, data) }
    }
}
// 绘制类型的命令
impl GfxCommandBuffer {
    /// - command type: action, state
    /// - supported queue types: graphics
    #[inline]
    pub fn cmd_begin_render_pass(&self, begin_info: &vk::RenderPassBeginInfo) {
        unsafe {
            Gfx::get().gfx_device().cmd_begin_render_pass(self.vk_handle, begin_info, vk::SubpassContents::INLINE);
        }
    }

    /// - command type: action, state
    /// - supported queue types: graphics
    #[inline]
    pub fn cmd_end_render_pass(&self) {
        unsafe {
            Gfx::get().gfx_device().cmd_end_render_pass(self.vk_handle);
        }
    }

    /// 绘制参数从 buffer 中读取，在 GPU 执行时才决定 instance count
    ///
    /// - command type: action
    /// - supported queue types: graphics
    #[inline]
    pub fn cmd_draw_indirect(&self, args: &GfxBuffer, offset: vk::DeviceSize, draw_count: u32, stride: u32) {
        unsafe {
            Gfx::get().gfx_device().cmd_draw_indirect(self.vk_handle, args.vk_buffer(), offset, draw_count, stride);
        }
    }

    /// - command type: state
    /// - supported queue types: graphics, compute
    #[inline]
    pub fn bind_descriptor_sets(
        &self,
        bind_point: vk::PipelineBindPoint,
        pipeline_layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            Gfx::get().gfx_device().cmd_bind_descriptor_sets(
                self.vk_handle,
                bind_point,
                pipeline_layout,
                first_set,
                descriptor_sets,
                &[],
            );
        }
    }

    /// - command type: state
    /// - supported queue types: graphics, compute
    #[inline]
    pub fn cmd_bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe {
            Gfx::get().gfx_device().cmd_bind_pipeline(self.vk_handle, bind_point, pipeline);
        }
    }

    /// buffers 每个 vertex buffer 以及 offset
    /// - command type: state
    /// - supported queue types: graphics
    #[inline]
    pub fn cmd_bind_vertex_buffers(&self, first_bind: u32, buffers: &[vk::Buffer], offsets: &[vk::DeviceSize]) {
        unsafe {
            Gfx::get().gfx_device().cmd_bind_vertex_buffers(self.vk_handle, first_bind, buffers, offsets);
        }
    }
}
// 同步相关命令
impl GfxCommandBuffer {
    /// - command type: synchronize
    /// - supported queue types: graphics, compute, transfer
    #[inline]
    pub fn memory_barrier(&self, barriers: &[GfxMemoryBarrier]) {
        let barriers = barriers.iter().map(|b| *b.inner()).collect_vec();
        let dependency_info = vk::DependencyInfo::default().memory_barriers(&barriers);
        unsafe {
            Gfx::get().gfx_device().cmd_pipeline_barrier2(self.vk_handle, &dependency_info);
        }
    }

    /// - command type: synchronize
    /// - supported queue types: graphics, compute, transfer
    #[inline]
    pub fn buffer_memory_barrier(&self, barriers: &[GfxBufferBarrier]) {
        let barriers = barriers.iter().map(|b| *b.inner()).collect_vec();
        let dependency_info = vk::DependencyInfo::default().buffer_memory_barriers(&barriers);
        unsafe {
            Gfx::get().gfx_device().cmd_pipeline_barrier2(self.vk_handle, &dependency_info);
        }
    }
}
// debug 相关命令
impl GfxCommandBuffer {
    #[inline]
    pub fn begin_label(&self, label_name: &str) {
        // begin 和 end 必须成对出现，因此名字非法时也要开启 label
        let name = std::ffi::CString::new(label_name.replace('\0', "")).unwrap_or_default();
        unsafe {
            Gfx::get().gfx_device().debug_utils().cmd_begin_debug_utils_label(
                self.vk_handle,
                &vk::DebugUtilsLabelEXT::default().label_name(name.as_c_str()).color(LABEL_COLOR),
            );
        }
    }

    #[inline]
    pub fn end_label(&self) {
        unsafe {
            Gfx::get().gfx_device().debug_utils().cmd_end_debug_utils_label(self.vk_handle);
        }
    }
}
impl DebugType for GfxCommandBuffer {
    fn debug_type_name() -> &'static str {
        "GfxCommandBuffer"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.vk_handle
    }
}
