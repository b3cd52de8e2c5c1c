use anyhow::Context;
use ash::vk;

use crate::{foundation::debug_messenger::DebugType, gfx::Gfx, pipelines::render_pass::GfxRenderPass};

pub struct GfxFramebuffer {
    handle: vk::Framebuffer,
}
impl GfxFramebuffer {
    /// attachments 的顺序需要和 render pass 中的声明一致
    pub fn new(
        render_pass: &GfxRenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
        debug_name: &str,
    ) -> anyhow::Result<Self> {
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass.handle())
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let gfx_device = Gfx::get().gfx_device();
        let handle = unsafe { gfx_device.create_framebuffer(&create_info, None) }
            .with_context(|| format!("failed to create framebuffer {}", debug_name))?;
        let framebuffer = Self { handle };
        gfx_device.set_debug_name(&framebuffer, debug_name);
        Ok(framebuffer)
    }

    #[inline]
    pub fn handle(&self) -> vk::Framebuffer {
        self.handle
    }

    #[inline]
    pub fn destroy(self) {
        unsafe {
            Gfx::get().gfx_device().destroy_framebuffer(self.handle, None);
        }
    }
}
impl DebugType for GfxFramebuffer {
    fn debug_type_name() -> &'static str {
        "GfxFramebuffer"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
