use ash::vk;
use opendom_gfx::{
    commands::{command_buffer::GfxCommandBuffer, command_pool::GfxCommandPool},
    gfx::Gfx,
};

use crate::{
    entity_store::{EntityId, EntityStore},
    instance_sync::{DRAW_ARGS_SIZE, GpuEntityBuffers},
    present_chain::PresentationChain,
    vertex_input::VERTEX_BINDING,
};

/// 命令列表中的一次绘制
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawItem {
    pub entity: EntityId,
    pub vertex_count: u32,
}

/// 按 entity 顺序列出需要绘制的 entity，没有 instance 的 entity 直接跳过
pub fn plan_draws(store: &EntityStore) -> Vec<DrawItem> {
    store
        .definitions()
        .filter(|(_, def)| def.is_drawable() && def.instance_count() > 0)
        .map(|(entity, def)| DrawItem {
            entity,
            vertex_count: def.mesh().vertex_count,
        })
        .collect()
}

/// 每个交换链 image 一份缓存的绘制命令
///
/// 只有 entity 集合变化或者交换链重建时才重新录制，
/// instance 数量从 indirect 参数中读取，因此新增 instance 不需要重新录制
pub struct CommandLists {
    command_pool: GfxCommandPool,
    command_buffers: Vec<GfxCommandBuffer>,
    draw_count: usize,
}

// new & init
impl CommandLists {
    pub fn new() -> anyhow::Result<Self> {
        let command_pool = GfxCommandPool::new(
            Gfx::get().gfx_queue_family(),
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            "frame-commands",
        )?;
        Ok(Self {
            command_pool,
            command_buffers: vec![],
            draw_count: 0,
        })
    }

    /// 调用前 queue 需要处于 idle 状态
    pub fn destroy(mut self) {
        GfxCommandBuffer::free(&self.command_pool, std::mem::take(&mut self.command_buffers));
        self.command_pool.destroy();
    }
}

// getters
impl CommandLists {
    #[inline]
    pub fn command_buffer(&self, image_index: usize) -> Option<&GfxCommandBuffer> {
        self.command_buffers.get(image_index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.command_buffers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.command_buffers.is_empty()
    }

    /// 最近一次录制包含的 draw call 数量
    #[inline]
    pub fn draw_count(&self) -> usize {
        self.draw_count
    }
}

// update
impl CommandLists {
    /// 重新录制所有 image 的命令
    pub fn rebuild(
        &mut self,
        chain: &PresentationChain,
        store: &EntityStore,
        buffers: &GpuEntityBuffers,
    ) -> anyhow::Result<()> {
        let _span = tracy_client::span!("CommandLists::rebuild");

        // 旧的 command buffer 可能仍在执行
        Gfx::get().gfx_queue().wait_idle()?;

        if self.command_buffers.len() != chain.image_count() {
            GfxCommandBuffer::free(&self.command_pool, std::mem::take(&mut self.command_buffers));
            self.command_buffers =
                GfxCommandBuffer::allocate(&self.command_pool, chain.image_count() as u32, "frame-commands")?;
        }

        let draws = plan_draws(store);
        for (image_index, cmd) in self.command_buffers.iter().enumerate() {
            Self::record(cmd, image_index, chain, &draws, buffers)?;
        }
        self.draw_count = draws.len();

        log::info!("recorded {} command list(s) with {} draw(s)", self.command_buffers.len(), draws.len());
        Ok(())
    }

    fn record(
        cmd: &GfxCommandBuffer,
        image_index: usize,
        chain: &PresentationChain,
        draws: &[DrawItem],
        buffers: &GpuEntityBuffers,
    ) -> anyhow::Result<()> {
        cmd.begin(vk::CommandBufferUsageFlags::empty(), &format!("frame-{image_index}"))?;

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.0, 0.0, 0.0, 1.0],
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            },
        ];
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(chain.render_pass().handle())
            .framebuffer(chain.framebuffer(image_index).handle())
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: chain.extent(),
            })
            .clear_values(&clear_values);

        cmd.cmd_begin_render_pass(&begin_info);
        cmd.cmd_bind_pipeline(vk::PipelineBindPoint::GRAPHICS, chain.pipeline().handle());
        cmd.bind_descriptor_sets(
            vk::PipelineBindPoint::GRAPHICS,
            chain.pipeline_layout().handle(),
            0,
            &[chain.descriptor_set(image_index)],
        );

        for draw in draws {
            let gpu = buffers.get(draw.entity).ok_or_else(|| anyhow::anyhow!("entity {} has no gpu buffers", draw.entity.0))?;
            let instance_buffer = gpu
                .instance_buffer()
                .ok_or_else(|| anyhow::anyhow!("entity {} has no instance buffer", draw.entity.0))?;
            debug_assert_eq!(gpu.mesh().vertex_count(), draw.vertex_count);

            // binding 0 逐顶点，binding 1 逐实例
            cmd.cmd_bind_vertex_buffers(
                VERTEX_BINDING,
                &[gpu.mesh().vertex_buffer().vk_buffer(), instance_buffer.vk_buffer()],
                &[0, 0],
            );
            cmd.cmd_draw_indirect(gpu.draw_args(), 0, 1, DRAW_ARGS_SIZE as u32);
        }

        cmd.cmd_end_render_pass();
        cmd.end()
    }
}
