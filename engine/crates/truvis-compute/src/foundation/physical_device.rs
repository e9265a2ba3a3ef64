use std::ffi::{CStr, CString};

use ash::vk;
use itertools::Itertools;

use crate::error::DeviceResult;
use crate::foundation::feature_probe::FenceFdProbe;
use crate::foundation::memory::MemoryTypeTable;

/// 物理设备的句柄，不拥有任何资源
///
/// 生命周期由 `ComputeInstance` 决定，可以随意复制
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhysicalDeviceRef(pub(crate) vk::PhysicalDevice);

impl PhysicalDeviceRef {
    #[inline]
    pub fn vk_handle(&self) -> vk::PhysicalDevice {
        self.0
    }
}

impl From<vk::PhysicalDevice> for PhysicalDeviceRef {
    fn from(handle: vk::PhysicalDevice) -> Self {
        Self(handle)
    }
}

/// 物理设备信息的快照
///
/// 创建逻辑设备所需的信息都在这里，创建之后不会再变化
#[derive(Debug, Clone)]
pub struct PhysicalDeviceInfo {
    pub(crate) handle: PhysicalDeviceRef,
    pub(crate) properties: vk::PhysicalDeviceProperties,
    pub(crate) memory_types: MemoryTypeTable,
    pub(crate) queue_families: Vec<vk::QueueFamilyProperties>,
    pub(crate) extensions: Vec<CString>,
    pub(crate) fence_fd: FenceFdProbe,
}

impl PhysicalDeviceInfo {
    /// `instance_api_version` 是创建 instance 时声明的版本，
    /// 用于判断 vulkan 1.1 的 instance 函数是否可用
    pub fn query(
        instance: &ash::Instance,
        pdevice: PhysicalDeviceRef,
        instance_api_version: u32,
    ) -> DeviceResult<Self> {
        let vk_pdevice = pdevice.vk_handle();
        unsafe {
            let properties = instance.get_physical_device_properties(vk_pdevice);
            log::info!("found gpu: {:?}", CStr::from_ptr(properties.device_name.as_ptr()));

            let memory_props = instance.get_physical_device_memory_properties(vk_pdevice);
            let memory_types = MemoryTypeTable::from_properties(&memory_props);

            let queue_families = instance.get_physical_device_queue_family_properties(vk_pdevice);
            log::debug!("queue family props:\n{:#?}", queue_families);

            let extensions = instance
                .enumerate_device_extension_properties(vk_pdevice)?
                .iter()
                .map(|ext| CStr::from_ptr(ext.extension_name.as_ptr()).to_owned())
                .collect_vec();

            let ext_names = extensions.iter().map(CString::as_c_str).collect_vec();
            let api_version = properties.api_version.min(instance_api_version);
            let fence_fd = FenceFdProbe::query(instance, vk_pdevice, api_version, &ext_names);

            Ok(Self {
                handle: pdevice,
                properties,
                memory_types,
                queue_families,
                extensions,
                fence_fd,
            })
        }
    }

    #[inline]
    pub fn handle(&self) -> PhysicalDeviceRef {
        self.handle
    }

    #[inline]
    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    #[inline]
    pub fn memory_types(&self) -> &MemoryTypeTable {
        &self.memory_types
    }

    #[inline]
    pub fn queue_families(&self) -> &[vk::QueueFamilyProperties] {
        &self.queue_families
    }

    #[inline]
    pub fn fence_fd(&self) -> FenceFdProbe {
        self.fence_fd
    }

    pub fn device_name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()).to_string_lossy().into_owned() }
    }

    #[inline]
    pub fn is_discrete_gpu(&self) -> bool {
        self.properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
    }

    /// 物理设备是否支持指定的扩展
    pub fn supports_extension(&self, ext: &CStr) -> bool {
        self.extensions.iter().any(|supported| supported.as_c_str() == ext)
    }
}
