use anyhow::Context;
use ash::vk;
use vk_mem::Alloc;

use crate::{foundation::debug_messenger::DebugType, gfx::Gfx};

/// 2D image 以及对应的 image view
///
/// 目前只用于深度缓冲
pub struct GfxImage2D {
    handle: vk::Image,
    allocation: vk_mem::Allocation,
    view: vk::ImageView,

    format: vk::Format,
    extent: vk::Extent2D,
}
// init & destroy
impl GfxImage2D {
    pub fn new_depth_attachment(extent: vk::Extent2D, format: vk::Format, name: &str) -> anyhow::Result<Self> {
        let image_ci = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };

        let allocator = Gfx::get().allocator();
        let (image, mut allocation) = unsafe { allocator.create_image(&image_ci, &alloc_ci) }
            .with_context(|| format!("failed to create image {}", name))?;

        let view_ci = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::DEPTH,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        let gfx_device = Gfx::get().gfx_device();
        let view = match unsafe { gfx_device.create_image_view(&view_ci, None) } {
            Ok(view) => view,
            Err(e) => {
                unsafe { allocator.destroy_image(image, &mut allocation) };
                return Err(e).with_context(|| format!("failed to create image view {}", name));
            }
        };

        let image = Self {
            handle: image,
            allocation,
            view,
            format,
            extent,
        };
        gfx_device.set_debug_name(&image, name);
        gfx_device.set_object_debug_name(view, format!("ImageView::{}", name));
        Ok(image)
    }

    #[inline]
    pub fn destroy(self) {
        drop(self)
    }
}
// getters
impl GfxImage2D {
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}
impl Drop for GfxImage2D {
    fn drop(&mut self) {
        unsafe {
            Gfx::get().gfx_device().destroy_image_view(self.view, None);
            Gfx::get().allocator().destroy_image(self.handle, &mut self.allocation);
        }
    }
}
impl DebugType for GfxImage2D {
    fn debug_type_name() -> &'static str {
        "GfxImage2D"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
