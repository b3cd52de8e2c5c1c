use std::ffi::CStr;

use ash::vk;

use crate::{
    commands::command_queue::{GfxCommandQueue, GfxQueueFamily},
    foundation::{
        device::GfxDevice, instance::GfxInstance, mem_allocator::GfxMemAllocator, physical_device::GfxPhysicalDevice,
    },
    gfx_core::GfxCore,
};

/// Vulkan 图形上下文单例
///
/// 管理所有 Vulkan 核心资源，包括实例、设备、队列、内存分配器等。
/// 采用单例模式简化参数传递和生命周期管理，仅适用于单线程环境。
///
/// # 初始化流程
/// ```ignore
/// Gfx::init("MyApp", &extra_extensions, true)?;
/// let device = Gfx::get().gfx_device();
/// // 使用...
/// Gfx::destroy();
/// ```
pub struct Gfx {
    pub(crate) gfx_core: GfxCore,
    /// Option 只是为了在 destroy 时能先于 device 释放
    pub(crate) vm_allocator: Option<GfxMemAllocator>,
}

// 创建与销毁
impl Gfx {
    const ENGINE_NAME: &'static str = "OpenDom";

    fn new(app_name: &str, instance_extra_exts: &[&'static CStr], enable_validation: bool) -> anyhow::Result<Self> {
        let gfx_core = GfxCore::new(app_name, Self::ENGINE_NAME, instance_extra_exts, enable_validation)?;

        // 在初始化过程中，单例还没有准备好，需要显式传递 device
        let allocator = GfxMemAllocator::new(
            gfx_core.instance.ash_instance(),
            gfx_core.physical_device.vk_handle,
            &gfx_core.gfx_device,
        )?;

        Ok(Self {
            gfx_core,
            vm_allocator: Some(allocator),
        })
    }
}

// 注意：此静态变量仅用于单线程环境
static mut G_GFX: Option<Gfx> = None;

// 单例模式
// - Gfx 自身的生命周期管理比较简单，因此适合使用单例模式
// - 让代码变得简单，不再需要考虑复杂的借用规则
// - 其他类的类型签名也会变得更简单
impl Gfx {
    /// 获取单例实例
    ///
    /// # Panics
    /// 如果 Gfx 还未初始化，此方法会 panic
    #[inline]
    pub fn get() -> &'static Gfx {
        unsafe {
            // 使用 addr_of! 避免直接对 static mut 创建引用，编译器不允许这种行为
            let ptr = std::ptr::addr_of!(G_GFX);
            (*ptr).as_ref().expect("Gfx not initialized. Call Gfx::init() first.")
        }
    }

    /// 初始化 Gfx 单例
    ///
    /// # Panics
    /// 如果 Gfx 已经被初始化，此方法会 panic
    pub fn init(app_name: &str, instance_extra_exts: &[&'static CStr], enable_validation: bool) -> anyhow::Result<()> {
        let gfx = Self::new(app_name, instance_extra_exts, enable_validation)?;
        unsafe {
            let ptr = std::ptr::addr_of_mut!(G_GFX);
            assert!((*ptr).is_none(), "Gfx already initialized");
            *ptr = Some(gfx);
        }
        Ok(())
    }

    /// 销毁 Gfx 单例
    ///
    /// 调用此方法后，不应再使用 Gfx::get()
    pub fn destroy() {
        unsafe {
            let ptr = std::ptr::addr_of_mut!(G_GFX);
            let Some(gfx) = (*ptr).as_mut() else {
                return;
            };

            // allocator 依赖 device，需要先释放
            if let Some(allocator) = gfx.vm_allocator.take() {
                allocator.destroy();
            }

            if let Some(gfx) = (*ptr).take() {
                gfx.gfx_core.destroy();
            }
        }
    }
}

// getter
impl Gfx {
    #[inline]
    pub fn instance(&self) -> &GfxInstance {
        &self.gfx_core.instance
    }

    #[inline]
    pub fn gfx_device(&self) -> &GfxDevice {
        &self.gfx_core.gfx_device
    }

    #[inline]
    pub fn allocator(&self) -> &GfxMemAllocator {
        self.vm_allocator.as_ref().expect("allocator used after Gfx::destroy")
    }

    #[inline]
    pub fn physical_device(&self) -> &GfxPhysicalDevice {
        &self.gfx_core.physical_device
    }

    #[inline]
    pub fn gfx_queue_family(&self) -> GfxQueueFamily {
        self.gfx_core.physical_device.gfx_queue_family.clone()
    }

    #[inline]
    pub fn gfx_queue(&self) -> &GfxCommandQueue {
        &self.gfx_core.gfx_queue
    }
}

// tools
impl Gfx {
    /// 根据给定的候选格式，返回第一个支持 `features` 的 optimal tiling 格式
    pub fn find_supported_format(&self, candidates: &[vk::Format], features: vk::FormatFeatureFlags) -> Option<vk::Format> {
        candidates.iter().copied().find(|f| {
            let props = unsafe {
                self.instance()
                    .ash_instance()
                    .get_physical_device_format_properties(self.physical_device().vk_handle(), *f)
            };
            props.optimal_tiling_features.contains(features)
        })
    }

    #[inline]
    pub fn wait_idle(&self) -> anyhow::Result<()> {
        self.gfx_device().wait_idle()
    }
}
