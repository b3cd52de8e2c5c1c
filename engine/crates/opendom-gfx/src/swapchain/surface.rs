use anyhow::Context;
use ash::vk;

use crate::{foundation::debug_messenger::DebugType, gfx::Gfx};

pub struct GfxSurface {
    pub(crate) handle: vk::SurfaceKHR,
    pub(crate) pf: ash::khr::surface::Instance,
}

impl GfxSurface {
    pub fn new(
        raw_display_handle: raw_window_handle::RawDisplayHandle,
        raw_window_handle: raw_window_handle::RawWindowHandle,
    ) -> anyhow::Result<Self> {
        let gfx_core = &Gfx::get().gfx_core;
        let surface_pf = ash::khr::surface::Instance::new(&gfx_core.vk_entry, &gfx_core.instance.ash_instance);

        let handle = unsafe {
            ash_window::create_surface(
                &gfx_core.vk_entry,
                &gfx_core.instance.ash_instance,
                raw_display_handle,
                raw_window_handle,
                None,
            )
        }
        .context("failed to create window surface")?;

        let surface = GfxSurface { handle, pf: surface_pf };
        gfx_core.gfx_device.set_debug_name(&surface, "main");
        Ok(surface)
    }

    /// instance 创建时需要的 surface 扩展
    pub fn required_instance_exts(
        raw_display_handle: raw_window_handle::RawDisplayHandle,
    ) -> anyhow::Result<Vec<&'static std::ffi::CStr>> {
        let exts = ash_window::enumerate_required_extensions(raw_display_handle)
            .context("window system is not supported by vulkan")?;
        Ok(exts.iter().map(|ext| unsafe { std::ffi::CStr::from_ptr(*ext) }).collect())
    }
}

// getters
impl GfxSurface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// 实时查询，窗口尺寸变化后结果会不同
    pub fn capabilities(&self) -> anyhow::Result<vk::SurfaceCapabilitiesKHR> {
        unsafe { self.pf.get_physical_device_surface_capabilities(Gfx::get().physical_device().vk_handle(), self.handle) }
            .context("failed to query surface capabilities")
    }

    pub fn formats(&self) -> anyhow::Result<Vec<vk::SurfaceFormatKHR>> {
        unsafe { self.pf.get_physical_device_surface_formats(Gfx::get().physical_device().vk_handle(), self.handle) }
            .context("failed to query surface formats")
    }

    pub fn present_modes(&self) -> anyhow::Result<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.pf.get_physical_device_surface_present_modes(Gfx::get().physical_device().vk_handle(), self.handle)
        }
        .context("failed to query surface present modes")
    }

    /// queue family 是否可以向该 surface present
    pub fn supports_queue_family(&self, queue_family_index: u32) -> anyhow::Result<bool> {
        unsafe {
            self.pf.get_physical_device_surface_support(
                Gfx::get().physical_device().vk_handle(),
                queue_family_index,
                self.handle,
            )
        }
        .context("failed to query surface present support")
    }
}

// destroy
impl GfxSurface {
    pub fn destroy(self) {
        unsafe { self.pf.destroy_surface(self.handle, None) }
    }
}

impl DebugType for GfxSurface {
    fn debug_type_name() -> &'static str {
        "GfxSurface"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
