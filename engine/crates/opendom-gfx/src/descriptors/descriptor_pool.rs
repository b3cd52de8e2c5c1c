use anyhow::Context;
use ash::vk;
use itertools::Itertools;

use crate::{descriptors::descriptor_set_layout::GfxDescriptorSetLayout, foundation::debug_messenger::DebugType, gfx::Gfx};

/// descriptor pool，销毁时会一起回收从中分配的 descriptor set
pub struct GfxDescriptorPool {
    handle: vk::DescriptorPool,
}
// init & destroy
impl GfxDescriptorPool {
    pub fn new(pool_sizes: &[vk::DescriptorPoolSize], max_sets: u32, debug_name: &str) -> anyhow::Result<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default().pool_sizes(pool_sizes).max_sets(max_sets);
        let gfx_device = Gfx::get().gfx_device();
        let handle = unsafe { gfx_device.create_descriptor_pool(&create_info, None) }
            .with_context(|| format!("failed to create descriptor pool {}", debug_name))?;
        let pool = Self { handle };
        gfx_device.set_debug_name(&pool, debug_name);
        Ok(pool)
    }

    #[inline]
    pub fn destroy(self) {
        unsafe {
            Gfx::get().gfx_device().destroy_descriptor_pool(self.handle, None);
        }
    }
}
// getters
impl GfxDescriptorPool {
    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.handle
    }
}
// tools
impl GfxDescriptorPool {
    /// 使用同一个 layout 分配 count 个 descriptor set
    pub fn allocate_sets(
        &self,
        layout: &GfxDescriptorSetLayout,
        count: usize,
        debug_name: &str,
    ) -> anyhow::Result<Vec<vk::DescriptorSet>> {
        let layouts = vec![layout.handle(); count];
        let alloc_info = vk::DescriptorSetAllocateInfo::default().descriptor_pool(self.handle).set_layouts(&layouts);

        let gfx_device = Gfx::get().gfx_device();
        let sets = unsafe { gfx_device.allocate_descriptor_sets(&alloc_info) }
            .with_context(|| format!("failed to allocate descriptor sets {}", debug_name))?;
        sets.iter().enumerate().for_each(|(idx, set)| {
            gfx_device.set_object_debug_name(*set, format!("DescriptorSet::{}-{}", debug_name, idx));
        });
        Ok(sets)
    }

    /// 将 buffer 写入到 set 的 binding 上，每个 binding 只有一个 descriptor
    pub fn write_buffers(set: vk::DescriptorSet, writes: &[(u32, vk::DescriptorType, vk::DescriptorBufferInfo)]) {
        let buffer_infos = writes.iter().map(|(_, _, info)| [*info]).collect_vec();
        let descriptor_writes = writes
            .iter()
            .zip(buffer_infos.iter())
            .map(|((binding, ty, _), info)| {
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(*binding)
                    .dst_array_element(0)
                    .descriptor_type(*ty)
                    .buffer_info(info)
            })
            .collect_vec();
        unsafe {
            Gfx::get().gfx_device().update_descriptor_sets(&descriptor_writes, &[]);
        }
    }
}
impl DebugType for GfxDescriptorPool {
    fn debug_type_name() -> &'static str {
        "GfxDescriptorPool"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
