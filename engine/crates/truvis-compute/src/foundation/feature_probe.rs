use std::ffi::CStr;

use ash::vk;

/// 物理设备对 fence fd 导出的支持情况
///
/// 支持时可以把 fence 导出为 sync fd，交给 epoll/select 等待；
/// 不支持时只能使用 `vkWaitForFences` 同步等待
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FenceFdProbe {
    /// 物理设备是否提供 `VK_KHR_external_fence_fd`
    pub extension_present: bool,
    /// `SYNC_FD` 类型的 external fence 能力
    pub features: vk::ExternalFenceFeatureFlags,
}

impl FenceFdProbe {
    pub const HANDLE_TYPE: vk::ExternalFenceHandleTypeFlags = vk::ExternalFenceHandleTypeFlags::SYNC_FD;

    /// 查询物理设备
    ///
    /// `vkGetPhysicalDeviceExternalFenceProperties` 是 vulkan 1.1 的 core 函数，
    /// 设备版本低于 1.1 时直接视为不支持
    pub fn query(
        instance: &ash::Instance,
        pdevice: vk::PhysicalDevice,
        api_version: u32,
        device_extensions: &[&CStr],
    ) -> Self {
        let extension_present = device_extensions.contains(&ash::khr::external_fence_fd::NAME);
        if !extension_present || api_version < vk::API_VERSION_1_1 {
            return Self {
                extension_present,
                features: vk::ExternalFenceFeatureFlags::empty(),
            };
        }

        let fence_info = vk::PhysicalDeviceExternalFenceInfo::default().handle_type(Self::HANDLE_TYPE);
        let mut fence_props = vk::ExternalFenceProperties::default();
        unsafe {
            instance.get_physical_device_external_fence_properties(pdevice, &fence_info, &mut fence_props);
        }

        Self {
            extension_present,
            features: fence_props.external_fence_features,
        }
    }

    /// 扩展存在，且 sync fd 可以被导出
    #[inline]
    pub fn supported(&self) -> bool {
        self.extension_present && self.features.contains(vk::ExternalFenceFeatureFlags::EXPORTABLE)
    }
}
