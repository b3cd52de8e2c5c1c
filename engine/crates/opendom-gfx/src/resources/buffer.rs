use anyhow::Context;
use ash::vk;
use vk_mem::Alloc;

use crate::{foundation::debug_messenger::DebugType, gfx::Gfx};

/// VMA 分配的 buffer
///
/// host 可见的 buffer 在创建时就 map，直到销毁前都保持 map 状态
pub struct GfxBuffer {
    handle: vk::Buffer,
    allocation: vk_mem::Allocation,

    size: vk::DeviceSize,

    /// 在初始化阶段写死
    map_ptr: Option<*mut u8>,

    debug_name: String,
}
impl DebugType for GfxBuffer {
    fn debug_type_name() -> &'static str {
        "GfxBuffer"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
impl Drop for GfxBuffer {
    fn drop(&mut self) {
        let allocator = Gfx::get().allocator();
        unsafe {
            if self.map_ptr.is_some() {
                allocator.unmap_memory(&mut self.allocation);
            }
            allocator.destroy_buffer(self.handle, &mut self.allocation);
        }
    }
}
// init & destroy
impl GfxBuffer {
    /// # param
    /// * mem_map - 是否需要 host 访问；为 true 时 buffer 会被立即 map
    pub fn new(
        buffer_size: vk::DeviceSize,
        buffer_usage: vk::BufferUsageFlags,
        mem_map: bool,
        name: impl AsRef<str>,
    ) -> anyhow::Result<Self> {
        let buffer_ci = vk::BufferCreateInfo::default()
            .size(buffer_size)
            .usage(buffer_usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let alloc_ci = if mem_map {
            vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::Auto,
                flags: vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
                ..Default::default()
            }
        } else {
            vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferDevice,
                ..Default::default()
            }
        };

        let allocator = Gfx::get().allocator();
        let (buffer, mut allocation) = unsafe { allocator.create_buffer(&buffer_ci, &alloc_ci) }
            .with_context(|| format!("failed to create buffer {} ({} bytes)", name.as_ref(), buffer_size))?;

        let map_ptr = if mem_map {
            match unsafe { allocator.map_memory(&mut allocation) } {
                Ok(ptr) => Some(ptr),
                Err(e) => {
                    unsafe { allocator.destroy_buffer(buffer, &mut allocation) };
                    return Err(e).with_context(|| format!("failed to map buffer {}", name.as_ref()));
                }
            }
        } else {
            None
        };

        let buffer = Self {
            handle: buffer,
            allocation,
            size: buffer_size,
            map_ptr,
            debug_name: name.as_ref().to_string(),
        };
        Gfx::get().gfx_device().set_debug_name(&buffer, name);
        Ok(buffer)
    }

    /// 只能通过 transfer 写入的 device local buffer
    #[inline]
    pub fn new_device_local(
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        debug_name: impl AsRef<str>,
    ) -> anyhow::Result<Self> {
        Self::new(size, usage | vk::BufferUsageFlags::TRANSFER_DST, false, debug_name)
    }

    #[inline]
    pub fn new_stage_buffer(size: vk::DeviceSize, debug_name: impl AsRef<str>) -> anyhow::Result<Self> {
        Self::new(size, vk::BufferUsageFlags::TRANSFER_SRC, true, debug_name)
    }

    #[inline]
    pub fn destroy(self) {
        drop(self)
    }
}
// getters
impl GfxBuffer {
    #[inline]
    pub fn vk_buffer(&self) -> vk::Buffer {
        self.handle
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }
}
// tools
impl GfxBuffer {
    /// 通过 mem map 的方式将 data 写入到 buffer 的 offset 处，并 flush
    pub fn write_bytes(&self, offset: vk::DeviceSize, data: &[u8]) -> anyhow::Result<()> {
        let ptr = self.map_ptr.with_context(|| format!("buffer {} is not host visible", self.debug_name))?;
        anyhow::ensure!(
            offset + data.len() as vk::DeviceSize <= self.size,
            "write of {} bytes at {} overflows buffer {} ({} bytes)",
            data.len(),
            offset,
            self.debug_name,
            self.size
        );

        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.add(offset as usize), data.len());
        }
        Gfx::get()
            .allocator()
            .flush_allocation(&self.allocation, offset, data.len() as vk::DeviceSize)
            .context("flush allocation failed")
    }

    #[inline]
    pub fn write_pod<T: bytemuck::Pod>(&self, value: &T) -> anyhow::Result<()> {
        self.write_bytes(0, bytemuck::bytes_of(value))
    }
}
