use std::ops::Deref;

use anyhow::Context;
use ash::vk;

/// VMA 分配器
///
/// vma 需要引用 Instance 以及 Device，因此需要在 Gfx 的其他部分都初始化完成后再创建，
/// 并且在 Device 销毁之前销毁
pub struct GfxMemAllocator {
    inner: vk_mem::Allocator,
}

impl GfxMemAllocator {
    pub fn new(instance: &ash::Instance, pdevice: vk::PhysicalDevice, device: &ash::Device) -> anyhow::Result<Self> {
        let mut vma_ci = vk_mem::AllocatorCreateInfo::new(instance, device, pdevice);
        vma_ci.vulkan_api_version = vk::API_VERSION_1_3;

        let vma = unsafe { vk_mem::Allocator::new(vma_ci) }.context("failed to create vma allocator")?;
        Ok(Self { inner: vma })
    }

    pub fn destroy(self) {
        // 通过 drop 触发销毁
    }
}

impl Deref for GfxMemAllocator {
    type Target = vk_mem::Allocator;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
