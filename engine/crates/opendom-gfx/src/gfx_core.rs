use std::ffi::CStr;
use std::rc::Rc;

use anyhow::Context;
use ash::vk;

use crate::{
    commands::command_queue::GfxCommandQueue,
    foundation::{
        debug_messenger::GfxDebugMsger, device::GfxDevice, instance::GfxInstance, physical_device::GfxPhysicalDevice,
    },
};

pub struct GfxCore {
    /// vk 基础函数的接口
    ///
    /// 在 drop 之后，会卸载 dll，因此需要确保该字段最后 drop
    pub(crate) vk_entry: ash::Entry,

    pub(crate) instance: GfxInstance,
    pub(crate) physical_device: GfxPhysicalDevice,

    /// 多个组件需要共享相同的设备函数指针（GfxCommandQueue 等），
    /// 设备本身的销毁由 GfxCore::destroy 手动控制
    pub(crate) gfx_device: Rc<GfxDevice>,

    pub(crate) debug_utils: GfxDebugMsger,

    /// graphics + transfer + present 都使用这一个 queue
    pub(crate) gfx_queue: GfxCommandQueue,
}

// 创建与销毁
impl GfxCore {
    pub fn new(
        app_name: &str,
        engine_name: &str,
        instance_extra_exts: &[&'static CStr],
        enable_validation: bool,
    ) -> anyhow::Result<Self> {
        let vk_entry = unsafe { ash::Entry::load() }.context("failed to load vulkan loader")?;
        let instance = GfxInstance::new(&vk_entry, app_name, engine_name, instance_extra_exts, enable_validation)?;
        let debug_utils = GfxDebugMsger::new(&vk_entry, instance.ash_instance())?;
        let physical_device = GfxPhysicalDevice::select(instance.ash_instance())?;

        // 只使用一个全能的 queue，mesh 上传、实例同步和绘制都在上面串行执行
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(physical_device.gfx_queue_family.queue_family_index)
            .queue_priorities(&[1.0])];

        let gfx_device =
            Rc::new(GfxDevice::new(instance.ash_instance(), physical_device.vk_handle, &queue_create_infos)?);
        let gfx_queue = GfxCommandQueue {
            vk_queue: unsafe { gfx_device.get_device_queue(physical_device.gfx_queue_family.queue_family_index, 0) },
            queue_family: physical_device.gfx_queue_family.clone(),
            gfx_device: gfx_device.clone(),
        };

        log::info!("gfx queue's queue family:\n{:#?}", gfx_queue.queue_family);

        // 在 device 之前创建的 vk::Handle
        {
            gfx_device.set_object_debug_name(instance.vk_instance(), "GfxInstance");
            gfx_device.set_object_debug_name(physical_device.vk_handle, "GfxPhysicalDevice");
            gfx_device.set_object_debug_name(gfx_device.vk_handle(), "GfxDevice");
            gfx_device.set_debug_name(&gfx_queue, "gfx");
        }

        Ok(Self {
            vk_entry,
            instance,
            physical_device,
            gfx_device,
            debug_utils,
            gfx_queue,
        })
    }

    pub fn destroy(self) {
        self.gfx_device.destroy();
        self.debug_utils.destroy();
        self.physical_device.destroy();
        self.instance.destroy();
    }
}
