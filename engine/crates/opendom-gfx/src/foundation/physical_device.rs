use std::ffi::CStr;

use anyhow::Context;
use ash::vk;
use itertools::Itertools;

use crate::{commands::command_queue::GfxQueueFamily, foundation::debug_messenger::DebugType};

/// 表示一张物理显卡
pub struct GfxPhysicalDevice {
    pub(crate) vk_handle: vk::PhysicalDevice,

    /// 当前 gpu 的基础属性
    pub(crate) basic_props: vk::PhysicalDeviceProperties,
    pub(crate) _features: vk::PhysicalDeviceFeatures,

    /// graphics 和 transfer 都在这个 queue family 上完成
    pub(crate) gfx_queue_family: GfxQueueFamily,
}

impl GfxPhysicalDevice {
    /// 选择一张满足要求的显卡
    ///
    /// 优先选择独立显卡；不满足要求的显卡会被打印出原因并跳过。
    /// 没有任何可用显卡属于配置错误
    pub fn select(instance: &ash::Instance) -> anyhow::Result<Self> {
        let pdevices = unsafe { instance.enumerate_physical_devices() }.context("failed to enumerate gpus")?;

        let candidates = pdevices
            .iter()
            .filter_map(|pdevice| match Self::new(*pdevice, instance) {
                Ok(candidate) => Some(candidate),
                Err(reason) => {
                    log::warn!("skip gpu: {:#}", reason);
                    None
                }
            })
            .collect_vec();

        let selected = candidates
            .into_iter()
            // 优先使用独立显卡
            .find_or_first(GfxPhysicalDevice::is_descrete_gpu)
            .context("no gpu supports the required features (vulkan 1.3, swapchain, fragmentStoresAndAtomics)")?;

        log::info!("selected gpu: {}", selected.device_name());
        Ok(selected)
    }

    fn new(pdevice: vk::PhysicalDevice, instance: &ash::Instance) -> anyhow::Result<Self> {
        let basic_props = unsafe { instance.get_physical_device_properties(pdevice) };
        let features = unsafe { instance.get_physical_device_features(pdevice) };
        let name = basic_props.device_name_as_c_str().unwrap_or(c"unknown").to_string_lossy().to_string();
        log::info!("found gpu: {}", name);

        let device_extensions = unsafe { instance.enumerate_device_extension_properties(pdevice) }
            .with_context(|| format!("{}: failed to enumerate device extensions", name))?;
        let has_swapchain = device_extensions
            .iter()
            .any(|ext| ext.extension_name_as_c_str().is_ok_and(|ext| ext == ash::khr::swapchain::NAME));

        let queue_family_props = unsafe { instance.get_physical_device_queue_family_properties(pdevice) };
        log::debug!("{}: queue family props:\n{:#?}", name, queue_family_props);

        check_device_requirements(basic_props.api_version, &features, has_swapchain)
            .with_context(|| format!("gpu {} rejected", name))?;

        let gfx_queue_family = find_queue_family(
            &queue_family_props,
            "gfx",
            vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER,
        )
        .with_context(|| format!("gpu {} has no graphics + transfer queue family", name))?;

        Ok(Self {
            vk_handle: pdevice,
            basic_props,
            _features: features,
            gfx_queue_family,
        })
    }

    pub fn destroy(self) {
        // 无需销毁
    }
}

// getters
impl GfxPhysicalDevice {
    /// 当前 gpu 是否是独立显卡
    #[inline]
    pub fn is_descrete_gpu(&self) -> bool {
        self.basic_props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
    }

    #[inline]
    pub fn vk_handle(&self) -> vk::PhysicalDevice {
        self.vk_handle
    }

    pub fn device_name(&self) -> String {
        self.basic_props.device_name_as_c_str().map(CStr::to_string_lossy).unwrap_or_default().to_string()
    }

    #[inline]
    pub fn gfx_queue_family(&self) -> &GfxQueueFamily {
        &self.gfx_queue_family
    }
}

/// 检查显卡是否满足渲染器的硬性要求
///
/// fragment shader 需要写 storage buffer（拾取），因此 fragmentStoresAndAtomics 是必须的
pub fn check_device_requirements(
    api_version: u32,
    features: &vk::PhysicalDeviceFeatures,
    has_swapchain_ext: bool,
) -> anyhow::Result<()> {
    let version = (vk::api_version_major(api_version), vk::api_version_minor(api_version));
    anyhow::ensure!(version >= (1, 3), "vulkan 1.3 is required, device supports {}.{}", version.0, version.1);
    anyhow::ensure!(features.fragment_stores_and_atomics == vk::TRUE, "missing feature fragmentStoresAndAtomics");
    anyhow::ensure!(has_swapchain_ext, "missing device extension VK_KHR_swapchain");
    Ok(())
}

/// 找到第一个包含全部 `include_flags` 的 queue family
pub fn find_queue_family(
    props: &[vk::QueueFamilyProperties],
    name: &str,
    include_flags: vk::QueueFlags,
) -> Option<GfxQueueFamily> {
    props.iter().enumerate().find(|(_, props)| props.queue_flags.contains(include_flags)).map(|(idx, props)| {
        GfxQueueFamily {
            name: name.to_string(),
            queue_family_index: idx as u32,
            queue_flags: props.queue_flags,
            queue_count: props.queue_count,
        }
    })
}

impl DebugType for GfxPhysicalDevice {
    fn debug_type_name() -> &'static str {
        "GfxPhysicalDevice"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.vk_handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(stores: bool) -> vk::PhysicalDeviceFeatures {
        vk::PhysicalDeviceFeatures::default().fragment_stores_and_atomics(stores)
    }

    #[test]
    fn test_requirements_pass() {
        assert!(check_device_requirements(vk::API_VERSION_1_3, &features(true), true).is_ok());
    }

    #[test]
    fn test_reject_missing_fragment_stores() {
        let err = check_device_requirements(vk::API_VERSION_1_3, &features(false), true).unwrap_err();
        assert!(err.to_string().contains("fragmentStoresAndAtomics"));
    }

    #[test]
    fn test_reject_old_api_and_missing_swapchain() {
        assert!(check_device_requirements(vk::API_VERSION_1_2, &features(true), true).is_err());
        assert!(check_device_requirements(vk::API_VERSION_1_3, &features(true), false).is_err());
    }

    #[test]
    fn test_find_queue_family_requires_all_flags() {
        let props = [
            vk::QueueFamilyProperties {
                queue_flags: vk::QueueFlags::TRANSFER,
                queue_count: 2,
                ..Default::default()
            },
            vk::QueueFamilyProperties {
                queue_flags: vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
                queue_count: 16,
                ..Default::default()
            },
        ];
        let family = find_queue_family(&props, "gfx", vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER).unwrap();
        assert_eq!(family.queue_family_index, 1);
        assert_eq!(family.queue_count, 16);

        assert!(find_queue_family(&props[..1], "gfx", vk::QueueFlags::GRAPHICS).is_none());
    }
}
