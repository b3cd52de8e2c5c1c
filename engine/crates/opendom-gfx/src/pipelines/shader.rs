use std::path::Path;

use anyhow::Context;
use ash::vk;

use crate::{foundation::debug_messenger::DebugType, gfx::Gfx};

/// # Destroy
///
/// 需要手动调用 `destroy` 方法来释放资源。
/// 管线创建完成后即可销毁
pub struct GfxShaderModule {
    handle: vk::ShaderModule,
    destroyed: bool,
}
impl GfxShaderModule {
    /// # param
    /// * path - spv shader 文件路径
    ///
    /// 文件不存在或者不是合法的 SPIR-V 都视为配置错误
    pub fn new(path: &Path) -> anyhow::Result<Self> {
        let mut file =
            std::fs::File::open(path).with_context(|| format!("failed to open shader {}", path.display()))?;
        let shader_code =
            ash::util::read_spv(&mut file).with_context(|| format!("failed to read spir-v {}", path.display()))?;

        let gfx_device = Gfx::get().gfx_device();
        let handle =
            unsafe { gfx_device.create_shader_module(&vk::ShaderModuleCreateInfo::default().code(&shader_code), None) }
                .with_context(|| format!("failed to create shader module {}", path.display()))?;

        let shader_module = Self {
            handle,
            destroyed: false,
        };
        gfx_device.set_debug_name(&shader_module, path.to_string_lossy());
        Ok(shader_module)
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.handle
    }

    #[inline]
    pub fn destroy(mut self) {
        unsafe {
            Gfx::get().gfx_device().destroy_shader_module(self.handle, None);
        }
        self.destroyed = true;
    }
}
impl Drop for GfxShaderModule {
    fn drop(&mut self) {
        debug_assert!(self.destroyed, "ShaderModule must be destroyed manually before drop.");
    }
}
impl DebugType for GfxShaderModule {
    fn debug_type_name() -> &'static str {
        "GfxShaderModule"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
