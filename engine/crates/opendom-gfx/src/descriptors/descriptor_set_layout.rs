use anyhow::Context;
use ash::vk;

use crate::{foundation::debug_messenger::DebugType, gfx::Gfx};

pub struct GfxDescriptorSetLayout {
    handle: vk::DescriptorSetLayout,
}
impl GfxDescriptorSetLayout {
    pub fn new(bindings: &[vk::DescriptorSetLayoutBinding], debug_name: &str) -> anyhow::Result<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);
        let gfx_device = Gfx::get().gfx_device();
        let handle = unsafe { gfx_device.create_descriptor_set_layout(&create_info, None) }
            .with_context(|| format!("failed to create descriptor set layout {}", debug_name))?;
        let layout = Self { handle };
        gfx_device.set_debug_name(&layout, debug_name);
        Ok(layout)
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.handle
    }

    #[inline]
    pub fn destroy(self) {
        unsafe {
            Gfx::get().gfx_device().destroy_descriptor_set_layout(self.handle, None);
        }
    }
}
impl DebugType for GfxDescriptorSetLayout {
    fn debug_type_name() -> &'static str {
        "GfxDescriptorSetLayout"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
