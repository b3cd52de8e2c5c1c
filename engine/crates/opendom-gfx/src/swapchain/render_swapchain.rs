use anyhow::Context;
use ash::vk;
use itertools::Itertools;

use crate::{
    commands::{command_queue::GfxCommandQueue, semaphore::GfxSemaphore},
    gfx::Gfx,
    swapchain::surface::GfxSurface,
};

/// 创建交换链所需的全部参数，由 [`GfxSwapchainDesc::choose`] 根据 surface 能力决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GfxSwapchainDesc {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

/// acquire 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GfxAcquireResult {
    /// suboptimal 时 semaphore 依然会被 signal，本帧可以继续
    Acquired { image_index: u32, suboptimal: bool },
    /// 超时，semaphore 不会被 signal
    Timeout,
    OutOfDate,
}

/// present 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GfxPresentResult {
    Optimal,
    /// suboptimal 或者 out of date，都需要重建交换链
    NeedRecreate,
}

pub struct GfxRenderSwapchain {
    swapchain_handle: vk::SwapchainKHR,

    swapchain_images: Vec<vk::Image>,
    swapchain_image_views: Vec<vk::ImageView>,

    desc: GfxSwapchainDesc,
}

// new & init
impl GfxRenderSwapchain {
    /// # param
    /// * old_swapchain - 重建时传入旧的交换链，驱动可以复用其中的资源
    pub fn new(
        surface: &GfxSurface,
        desc: GfxSwapchainDesc,
        old_swapchain: Option<&GfxRenderSwapchain>,
    ) -> anyhow::Result<Self> {
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle())
            .min_image_count(desc.image_count)
            .image_format(desc.surface_format.format)
            .image_color_space(desc.surface_format.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(desc.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(desc.present_mode)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .clipped(true)
            .old_swapchain(old_swapchain.map_or(vk::SwapchainKHR::null(), |s| s.swapchain_handle));

        let gfx_device = Gfx::get().gfx_device();
        let swapchain_handle =
            unsafe { gfx_device.swapchain().create_swapchain(&create_info, None) }.context("failed to create swapchain")?;
        gfx_device.set_object_debug_name(swapchain_handle, "main");

        let mut swapchain = Self {
            swapchain_handle,
            swapchain_images: vec![],
            swapchain_image_views: vec![],
            desc,
        };

        // 后续失败时通过 destroy 回收已经创建的部分
        if let Err(e) = swapchain.create_image_views() {
            swapchain.destroy();
            return Err(e);
        }
        Ok(swapchain)
    }

    fn create_image_views(&mut self) -> anyhow::Result<()> {
        let gfx_device = Gfx::get().gfx_device();
        self.swapchain_images = unsafe { gfx_device.swapchain().get_swapchain_images(self.swapchain_handle) }
            .context("failed to get swapchain images")?;

        for (idx, image) in self.swapchain_images.iter().enumerate() {
            let view_ci = vk::ImageViewCreateInfo::default()
                .image(*image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.desc.surface_format.format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view = unsafe { gfx_device.create_image_view(&view_ci, None) }
                .with_context(|| format!("failed to create swapchain image view {}", idx))?;
            gfx_device.set_object_debug_name(*image, format!("SwapchainImage::{}", idx));
            gfx_device.set_object_debug_name(view, format!("SwapchainImageView::{}", idx));
            self.swapchain_image_views.push(view);
        }
        Ok(())
    }
}

// getters
impl GfxRenderSwapchain {
    #[inline]
    pub fn image_count(&self) -> usize {
        self.swapchain_images.len()
    }

    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.swapchain_image_views
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.desc.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.desc.surface_format.format
    }

    #[inline]
    pub fn desc(&self) -> &GfxSwapchainDesc {
        &self.desc
    }
}

// tools
impl GfxSwapchainDesc {
    /// 根据 surface 当前的能力决定交换链参数
    pub fn choose(
        capabilities: &vk::SurfaceCapabilitiesKHR,
        formats: &[vk::SurfaceFormatKHR],
        present_modes: &[vk::PresentModeKHR],
        window_extent: vk::Extent2D,
        prefer_immediate: bool,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            surface_format: choose_surface_format(formats).context("surface reports no formats")?,
            present_mode: choose_present_mode(present_modes, prefer_immediate),
            extent: calculate_swapchain_extent(capabilities, window_extent),
            image_count: choose_image_count(capabilities),
            pre_transform: capabilities.current_transform,
        })
    }
}

/// 优先 B8G8R8A8_SRGB + SRGB_NONLINEAR，否则使用第一个
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| f.format == vk::Format::B8G8R8A8_SRGB && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.first())
        .copied()
}

/// IMMEDIATE（如果偏好且支持）> MAILBOX > FIFO
///
/// FIFO 是规范保证一定支持的模式
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR], prefer_immediate: bool) -> vk::PresentModeKHR {
    let preferred = if prefer_immediate {
        [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX].as_slice()
    } else {
        [vk::PresentModeKHR::MAILBOX].as_slice()
    };
    preferred.iter().find(|mode| present_modes.contains(mode)).copied().unwrap_or(vk::PresentModeKHR::FIFO)
}

/// min + 1，max_image_count == 0 表示不限制数量
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count == 0 { desired } else { u32::min(capabilities.max_image_count, desired) }
}

/// 确定 window 的 extent 尺寸
///
/// 如果 surface_capabilities.current_extent 包含特殊值 0xFFFFFFFF，则表示可以自己设置交换链的 extent
pub fn calculate_swapchain_extent(
    surface_capabilities: &vk::SurfaceCapabilitiesKHR,
    window_physical_extent: vk::Extent2D,
) -> vk::Extent2D {
    let surface_extent = surface_capabilities.current_extent;
    if surface_extent.width == u32::MAX || surface_extent.height == u32::MAX {
        let width = window_physical_extent
            .width
            .clamp(surface_capabilities.min_image_extent.width, surface_capabilities.max_image_extent.width);
        let height = window_physical_extent
            .height
            .clamp(surface_capabilities.min_image_extent.height, surface_capabilities.max_image_extent.height);
        vk::Extent2D { width, height }
    } else {
        surface_extent
    }
}

// update
impl GfxRenderSwapchain {
    /// timeout: nano seconds
    pub fn acquire_next_image(&self, semaphore: &GfxSemaphore, timeout: u64) -> anyhow::Result<GfxAcquireResult> {
        let result = unsafe {
            Gfx::get().gfx_device().swapchain().acquire_next_image(
                self.swapchain_handle,
                timeout,
                semaphore.handle(),
                vk::Fence::null(),
            )
        };

        match result {
            Ok((image_index, suboptimal)) => Ok(GfxAcquireResult::Acquired { image_index, suboptimal }),
            Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => Ok(GfxAcquireResult::Timeout),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(GfxAcquireResult::OutOfDate),
            Err(e) => Err(e).context("failed to acquire next swapchain image"),
        }
    }

    pub fn present_image(
        &self,
        queue: &GfxCommandQueue,
        image_index: u32,
        wait_semaphores: &[&GfxSemaphore],
    ) -> anyhow::Result<GfxPresentResult> {
        let wait_semaphores = wait_semaphores.iter().map(|s| s.handle()).collect_vec();
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .image_indices(&image_indices)
            .swapchains(std::slice::from_ref(&self.swapchain_handle));

        let result = unsafe { Gfx::get().gfx_device().swapchain().queue_present(queue.handle(), &present_info) };
        match result {
            Ok(false) => Ok(GfxPresentResult::Optimal),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(GfxPresentResult::NeedRecreate),
            Err(e) => Err(e).context("failed to present swapchain image"),
        }
    }
}

// destroy
impl GfxRenderSwapchain {
    pub fn destroy(self) {
        let gfx_device = Gfx::get().gfx_device();
        unsafe {
            for view in &self.swapchain_image_views {
                gfx_device.destroy_image_view(*view, None);
            }
            gfx_device.swapchain().destroy_swapchain(self.swapchain_handle, None);
        }
    }
}
