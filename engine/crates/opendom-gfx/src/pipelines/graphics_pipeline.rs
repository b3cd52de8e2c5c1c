use std::path::{Path, PathBuf};

use anyhow::Context;
use ash::vk;
use itertools::Itertools;

use crate::{
    foundation::debug_messenger::DebugType,
    gfx::Gfx,
    pipelines::{render_pass::GfxRenderPass, shader::GfxShaderModule},
};

pub struct GfxPipelineLayout {
    handle: vk::PipelineLayout,
}
impl GfxPipelineLayout {
    pub fn new(descriptor_set_layouts: &[vk::DescriptorSetLayout], debug_name: &str) -> anyhow::Result<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default().set_layouts(descriptor_set_layouts);
        let gfx_device = Gfx::get().gfx_device();
        let handle = unsafe { gfx_device.create_pipeline_layout(&create_info, None) }
            .with_context(|| format!("failed to create pipeline layout {}", debug_name))?;
        let layout = Self { handle };
        gfx_device.set_debug_name(&layout, debug_name);
        Ok(layout)
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.handle
    }

    #[inline]
    pub fn destroy(self) {
        unsafe {
            Gfx::get().gfx_device().destroy_pipeline_layout(self.handle, None);
        }
    }
}
impl DebugType for GfxPipelineLayout {
    fn debug_type_name() -> &'static str {
        "GfxPipelineLayout"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

/// 创建 graphics pipeline 所需的参数
///
/// viewport 和 scissor 是静态的，交换链尺寸改变后需要重建管线
pub struct GfxGraphicsPipelineCreateInfo {
    vertex_shader: PathBuf,
    fragment_shader: PathBuf,

    vertex_binding_desc: Vec<vk::VertexInputBindingDescription>,
    vertex_attribute_desc: Vec<vk::VertexInputAttributeDescription>,

    extent: vk::Extent2D,

    cull_mode: vk::CullModeFlags,
    front_face: vk::FrontFace,
    depth_compare_op: vk::CompareOp,
    alpha_blend: bool,
}

impl GfxGraphicsPipelineCreateInfo {
    pub fn new(vertex_shader: impl AsRef<Path>, fragment_shader: impl AsRef<Path>, extent: vk::Extent2D) -> Self {
        Self {
            vertex_shader: vertex_shader.as_ref().to_path_buf(),
            fragment_shader: fragment_shader.as_ref().to_path_buf(),
            vertex_binding_desc: vec![],
            vertex_attribute_desc: vec![],
            extent,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::CLOCKWISE,
            depth_compare_op: vk::CompareOp::LESS,
            alpha_blend: true,
        }
    }

    #[inline]
    pub fn vertex_binding(&mut self, bindings: Vec<vk::VertexInputBindingDescription>) -> &mut Self {
        self.vertex_binding_desc = bindings;
        self
    }

    #[inline]
    pub fn vertex_attribute(&mut self, attributes: Vec<vk::VertexInputAttributeDescription>) -> &mut Self {
        self.vertex_attribute_desc = attributes;
        self
    }

    #[inline]
    pub fn cull_mode(&mut self, cull_mode: vk::CullModeFlags, front_face: vk::FrontFace) -> &mut Self {
        self.cull_mode = cull_mode;
        self.front_face = front_face;
        self
    }

    #[inline]
    pub fn depth_test(&mut self, compare_op: vk::CompareOp) -> &mut Self {
        self.depth_compare_op = compare_op;
        self
    }

    #[inline]
    pub fn alpha_blend(&mut self, enable: bool) -> &mut Self {
        self.alpha_blend = enable;
        self
    }

    fn color_blend_attachment(&self) -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(self.alpha_blend)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
            .color_write_mask(vk::ColorComponentFlags::RGBA)
    }
}

pub struct GfxGraphicsPipeline {
    pipeline: vk::Pipeline,
}
impl GfxGraphicsPipeline {
    pub fn new(
        create_info: &GfxGraphicsPipelineCreateInfo,
        layout: &GfxPipelineLayout,
        render_pass: &GfxRenderPass,
        debug_name: &str,
    ) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("GfxGraphicsPipeline::new");

        let vertex_module = GfxShaderModule::new(&create_info.vertex_shader)?;
        let fragment_module = match GfxShaderModule::new(&create_info.fragment_shader) {
            Ok(module) => module,
            Err(e) => {
                vertex_module.destroy();
                return Err(e);
            }
        };

        let shader_stages = [
            (vk::ShaderStageFlags::VERTEX, &vertex_module),
            (vk::ShaderStageFlags::FRAGMENT, &fragment_module),
        ]
        .iter()
        .map(|(stage, module)| {
            vk::PipelineShaderStageCreateInfo::default().stage(*stage).module(module.handle()).name(c"main")
        })
        .collect_vec();

        // 顶点
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&create_info.vertex_binding_desc)
            .vertex_attribute_descriptions(&create_info.vertex_attribute_desc);
        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewports = [vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: create_info.extent.width as f32,
            height: create_info.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: create_info.extent,
        }];
        let viewport_state = vk::PipelineViewportStateCreateInfo::default().viewports(&viewports).scissors(&scissors);

        let rasterize_state = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(create_info.cull_mode)
            .front_face(create_info.front_face)
            .line_width(1.0);
        let msaa_state =
            vk::PipelineMultisampleStateCreateInfo::default().rasterization_samples(vk::SampleCountFlags::TYPE_1);
        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(create_info.depth_compare_op);

        // 混合设置：需要为每个 color attachment 分别指定
        let blend_attachments = [create_info.color_blend_attachment()];
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterize_state)
            .multisample_state(&msaa_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .layout(layout.handle())
            .render_pass(render_pass.handle())
            .subpass(0);

        let gfx_device = Gfx::get().gfx_device();
        let result = unsafe {
            gfx_device.create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_info), None)
        };

        // shader module 只在创建管线时需要
        vertex_module.destroy();
        fragment_module.destroy();

        let pipeline = result
            .map_err(|(_, e)| e)
            .with_context(|| format!("failed to create graphics pipeline {}", debug_name))?
            .into_iter()
            .next()
            .context("driver returned no pipeline")?;

        let pipeline = Self { pipeline };
        gfx_device.set_debug_name(&pipeline, debug_name);
        Ok(pipeline)
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn destroy(self) {
        unsafe {
            Gfx::get().gfx_device().destroy_pipeline(self.pipeline, None);
        }
    }
}
impl DebugType for GfxGraphicsPipeline {
    fn debug_type_name() -> &'static str {
        "GfxGraphicsPipeline"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.pipeline
    }
}
