use ash::vk;
use opendom_gfx::{
    descriptors::{descriptor_pool::GfxDescriptorPool, descriptor_set_layout::GfxDescriptorSetLayout},
    gfx::Gfx,
    pipelines::{
        framebuffer::GfxFramebuffer,
        graphics_pipeline::{GfxGraphicsPipeline, GfxGraphicsPipelineCreateInfo, GfxPipelineLayout},
        render_pass::GfxRenderPass,
    },
    resources::image::GfxImage2D,
    swapchain::{
        render_swapchain::{GfxRenderSwapchain, GfxSwapchainDesc},
        surface::GfxSurface,
    },
};

use crate::{
    config::RendererConfig,
    uniforms::UniformBindings,
    vertex_input::{vertex_attributes, vertex_bindings},
};

pub const CAMERA_BINDING: u32 = 0;
pub const INPUT_BINDING: u32 = 1;

const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] =
    [vk::Format::D32_SFLOAT, vk::Format::D32_SFLOAT_S8_UINT, vk::Format::D24_UNORM_S8_UINT];

/// 所有依赖交换链尺寸的对象
///
/// 交换链失效时整体销毁并重建；entity 的 buffer 不在这里，重建时不受影响
pub struct PresentationChain {
    swapchain: GfxRenderSwapchain,
    render_pass: GfxRenderPass,

    /// 每个交换链 image 一份
    depth_images: Vec<GfxImage2D>,
    framebuffers: Vec<GfxFramebuffer>,
    descriptor_sets: Vec<vk::DescriptorSet>,

    descriptor_set_layout: GfxDescriptorSetLayout,
    descriptor_pool: GfxDescriptorPool,
    pipeline_layout: GfxPipelineLayout,
    pipeline: GfxGraphicsPipeline,
}

// new & init
impl PresentationChain {
    /// 失败均属于配置错误，调用者应当终止程序
    pub fn create(
        surface: &GfxSurface,
        config: &RendererConfig,
        window_extent: vk::Extent2D,
        uniforms: &UniformBindings,
    ) -> anyhow::Result<Self> {
        Self::create_with_old(surface, config, window_extent, uniforms, None)
    }

    fn create_with_old(
        surface: &GfxSurface,
        config: &RendererConfig,
        window_extent: vk::Extent2D,
        uniforms: &UniformBindings,
        old_swapchain: Option<&GfxRenderSwapchain>,
    ) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("PresentationChain::create");
        let gfx = Gfx::get();

        let queue_family = gfx.gfx_queue_family();
        anyhow::ensure!(
            surface.supports_queue_family(queue_family.queue_family_index)?,
            "queue family {} cannot present to the window surface",
            queue_family.name
        );

        let desc = GfxSwapchainDesc::choose(
            &surface.capabilities()?,
            &surface.formats()?,
            &surface.present_modes()?,
            window_extent,
            config.prefer_immediate_present,
        )?;
        let swapchain = GfxRenderSwapchain::new(surface, desc, old_swapchain)?;
        let image_count = swapchain.image_count();
        if image_count > config.max_swapchain_images {
            swapchain.destroy();
            anyhow::bail!(
                "swapchain has {} images, more than the supported maximum of {}",
                image_count,
                config.max_swapchain_images
            );
        }
        let extent = swapchain.extent();

        let depth_format = gfx
            .find_supported_format(&DEPTH_FORMAT_CANDIDATES, vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
            .ok_or_else(|| anyhow::anyhow!("no supported depth attachment format"))?;
        let render_pass = GfxRenderPass::new_color_depth(swapchain.format(), depth_format, "main")?;

        let depth_images = (0..image_count)
            .map(|idx| GfxImage2D::new_depth_attachment(extent, depth_format, &format!("depth-{idx}")))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let framebuffers = swapchain
            .image_views()
            .iter()
            .zip(depth_images.iter())
            .enumerate()
            .map(|(idx, (color, depth))| {
                GfxFramebuffer::new(&render_pass, &[*color, depth.view()], extent, &format!("main-{idx}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let stages = vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT;
        let descriptor_set_layout = GfxDescriptorSetLayout::new(
            &[
                vk::DescriptorSetLayoutBinding::default()
                    .binding(CAMERA_BINDING)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .descriptor_count(1)
                    .stage_flags(stages),
                vk::DescriptorSetLayoutBinding::default()
                    .binding(INPUT_BINDING)
                    .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                    .descriptor_count(1)
                    .stage_flags(stages),
            ],
            "camera-input",
        )?;
        let descriptor_pool = GfxDescriptorPool::new(
            &[
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::UNIFORM_BUFFER,
                    descriptor_count: image_count as u32,
                },
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::STORAGE_BUFFER,
                    descriptor_count: image_count as u32,
                },
            ],
            image_count as u32,
            "camera-input",
        )?;
        let descriptor_sets = descriptor_pool.allocate_sets(&descriptor_set_layout, image_count, "camera-input")?;
        for set in &descriptor_sets {
            GfxDescriptorPool::write_buffers(
                *set,
                &[
                    (CAMERA_BINDING, vk::DescriptorType::UNIFORM_BUFFER, uniforms.camera),
                    (INPUT_BINDING, vk::DescriptorType::STORAGE_BUFFER, uniforms.input),
                ],
            );
        }

        let pipeline_layout = GfxPipelineLayout::new(&[descriptor_set_layout.handle()], "main")?;
        let mut pipeline_ci =
            GfxGraphicsPipelineCreateInfo::new(config.vertex_shader_path(), config.fragment_shader_path(), extent);
        pipeline_ci
            .vertex_binding(vertex_bindings())
            .vertex_attribute(vertex_attributes())
            .cull_mode(vk::CullModeFlags::BACK, vk::FrontFace::CLOCKWISE)
            .depth_test(vk::CompareOp::LESS)
            .alpha_blend(true);
        let pipeline = GfxGraphicsPipeline::new(&pipeline_ci, &pipeline_layout, &render_pass, "main")?;

        log::info!(
            "presentation chain: {} images, {}x{}, {:?}, {:?}",
            image_count,
            extent.width,
            extent.height,
            desc.surface_format.format,
            desc.present_mode
        );

        Ok(Self {
            swapchain,
            render_pass,
            depth_images,
            framebuffers,
            descriptor_sets,
            descriptor_set_layout,
            descriptor_pool,
            pipeline_layout,
            pipeline,
        })
    }

    /// 交换链 suboptimal 或 out of date 时调用
    ///
    /// 先等待 queue 空闲，再基于当前的 surface 能力重建；调用者需要把命令列表标记为 dirty
    pub fn recreate(
        &mut self,
        surface: &GfxSurface,
        config: &RendererConfig,
        window_extent: vk::Extent2D,
        uniforms: &UniformBindings,
    ) -> anyhow::Result<()> {
        let _span = tracy_client::span!("PresentationChain::recreate");
        Gfx::get().gfx_queue().wait_idle()?;

        let new_chain = Self::create_with_old(surface, config, window_extent, uniforms, Some(&self.swapchain))?;
        std::mem::replace(self, new_chain).destroy();
        Ok(())
    }

    /// 调用者需要保证 GPU 不再使用这些对象
    pub fn destroy(self) {
        self.pipeline.destroy();
        self.pipeline_layout.destroy();
        // descriptor set 随 pool 一起回收
        self.descriptor_pool.destroy();
        self.descriptor_set_layout.destroy();
        self.framebuffers.into_iter().for_each(GfxFramebuffer::destroy);
        self.depth_images.into_iter().for_each(GfxImage2D::destroy);
        self.render_pass.destroy();
        self.swapchain.destroy();
    }
}

// getters
impl PresentationChain {
    #[inline]
    pub fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    #[inline]
    pub fn swapchain(&self) -> &GfxRenderSwapchain {
        &self.swapchain
    }

    #[inline]
    pub fn render_pass(&self) -> &GfxRenderPass {
        &self.render_pass
    }

    #[inline]
    pub fn framebuffer(&self, image_index: usize) -> &GfxFramebuffer {
        &self.framebuffers[image_index]
    }

    #[inline]
    pub fn descriptor_set(&self, image_index: usize) -> vk::DescriptorSet {
        self.descriptor_sets[image_index]
    }

    #[inline]
    pub fn pipeline(&self) -> &GfxGraphicsPipeline {
        &self.pipeline
    }

    #[inline]
    pub fn pipeline_layout(&self) -> &GfxPipelineLayout {
        &self.pipeline_layout
    }
}
