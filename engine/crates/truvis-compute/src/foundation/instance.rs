use std::collections::HashSet;
use std::ffi::{CStr, CString};

use ash::vk;
use itertools::Itertools;

use crate::error::{DeviceError, DeviceResult};
use crate::foundation::debug_messenger::ComputeDebugMessenger;
use crate::foundation::init_info::ComputeInstanceInitInfo;
use crate::foundation::physical_device::PhysicalDeviceRef;

/// 可用的 instance layers
pub fn available_layers(entry: &ash::Entry) -> DeviceResult<Vec<vk::LayerProperties>> {
    Ok(unsafe { entry.enumerate_instance_layer_properties()? })
}

/// 可用的 instance extensions
///
/// 包括 vulkan 实现本身提供的，以及每个可用 layer 提供的
pub fn available_extensions(entry: &ash::Entry) -> DeviceResult<Vec<vk::ExtensionProperties>> {
    let mut exts = unsafe { entry.enumerate_instance_extension_properties(None)? };
    for layer in available_layers(entry)? {
        let layer_name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
        let layer_exts = unsafe { entry.enumerate_instance_extension_properties(Some(layer_name))? };
        exts.extend(layer_exts);
    }
    Ok(exts)
}

/// 对 vulkan instance 的最小封装
///
/// 所有 `ComputeDevice` 都借用 instance，因此 instance 一定比它们活得更久
pub struct ComputeInstance {
    entry: ash::Entry,
    ash_instance: ash::Instance,
    debug_messenger: Option<ComputeDebugMessenger>,

    vk_version: u32,
    enabled_layers: Vec<CString>,
    enabled_extensions: Vec<CString>,
}

// init & destroy
impl ComputeInstance {
    pub fn new(init_info: &ComputeInstanceInitInfo) -> DeviceResult<Self> {
        let entry = unsafe { ash::Entry::load() }.map_err(|e| DeviceError::Loading(e.to_string()))?;
        Self::with_entry(entry, init_info)
    }

    pub fn with_entry(entry: ash::Entry, init_info: &ComputeInstanceInitInfo) -> DeviceResult<Self> {
        let app_name = CString::new(init_info.app_name.as_str()).unwrap_or_default();
        let engine_name = CString::new(init_info.engine_name.as_str()).unwrap_or_default();
        let app_info = vk::ApplicationInfo::default()
            .api_version(init_info.vk_version)
            .application_name(app_name.as_c_str())
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(engine_name.as_c_str())
            .engine_version(vk::make_api_version(0, 1, 0, 0));

        let supported_layers = available_layers(&entry)?
            .iter()
            .map(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) }.to_owned())
            .collect::<HashSet<_>>();
        let supported_exts = available_extensions(&entry)?
            .iter()
            .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }.to_owned())
            .collect::<HashSet<_>>();

        let validation_layers = init_info.validation_layers();
        let requested_layers = init_info.instance_layers.iter().chain(&validation_layers).copied();
        let enabled_layers = Self::filter_supported("layer", requested_layers, &supported_layers);

        let validation_exts = init_info.validation_extensions();
        let requested_exts = init_info.instance_extensions.iter().chain(&validation_exts).copied();
        let enabled_extensions = Self::filter_supported("extension", requested_exts, &supported_exts);

        // 没有 debug utils 扩展时无法创建 messenger
        let use_messenger = init_info.enable_validation
            && enabled_extensions.iter().any(|ext| ext.as_c_str() == ash::ext::debug_utils::NAME);

        let layer_ptrs = enabled_layers.iter().map(|layer| layer.as_ptr()).collect_vec();
        let ext_ptrs = enabled_extensions.iter().map(|ext| ext.as_ptr()).collect_vec();

        let mut create_flags = init_info.instance_create_flags;
        if !enabled_extensions.iter().any(|ext| ext.as_c_str() == ash::khr::portability_enumeration::NAME) {
            create_flags &= !vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
        }

        let mut instance_ci = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&ext_ptrs)
            .flags(create_flags);

        // 为 instance info 添加 debug messenger
        let mut messenger_ci =
            ComputeDebugMessenger::create_info(init_info.debug_msg_severity, init_info.debug_msg_type);
        if use_messenger {
            instance_ci = instance_ci.push_next(&mut messenger_ci);
        }

        let ash_instance = unsafe { entry.create_instance(&instance_ci, None)? };
        log::info!(
            "vulkan instance created, layers: {:?}, extensions: {:?}",
            enabled_layers,
            enabled_extensions
        );

        let debug_messenger = if use_messenger {
            match ComputeDebugMessenger::new(&entry, &ash_instance, &messenger_ci) {
                Ok(messenger) => Some(messenger),
                Err(e) => {
                    unsafe { ash_instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        Ok(Self {
            entry,
            ash_instance,
            debug_messenger,
            vk_version: init_info.vk_version,
            enabled_layers,
            enabled_extensions,
        })
    }

    /// 使用已经加载好的函数表，不启用任何 layer 和 extension
    #[cfg(test)]
    pub(crate) fn from_loaded(entry: ash::Entry, ash_instance: ash::Instance, vk_version: u32) -> Self {
        Self {
            entry,
            ash_instance,
            debug_messenger: None,
            vk_version,
            enabled_layers: vec![],
            enabled_extensions: vec![],
        }
    }

    /// 不支持的 layer 或 extension 会被跳过，并输出警告
    fn filter_supported<'a>(
        kind: &str,
        requested: impl Iterator<Item = &'a CStr>,
        supported: &HashSet<CString>,
    ) -> Vec<CString> {
        requested
            .unique()
            .filter(|name| {
                let ok = supported.contains(*name);
                if !ok {
                    log::warn!("instance {} {:?} is not available, skipped", kind, name);
                }
                ok
            })
            .map(CStr::to_owned)
            .collect_vec()
    }
}

impl Drop for ComputeInstance {
    fn drop(&mut self) {
        // messenger 需要在 instance 之前销毁
        self.debug_messenger.take();
        log::info!("destroying vulkan instance");
        unsafe {
            self.ash_instance.destroy_instance(None);
        }
    }
}

// getters
impl ComputeInstance {
    #[inline]
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    #[inline]
    pub fn ash_instance(&self) -> &ash::Instance {
        &self.ash_instance
    }

    #[inline]
    pub fn vk_version(&self) -> u32 {
        self.vk_version
    }

    #[inline]
    pub fn enabled_layers(&self) -> &[CString] {
        &self.enabled_layers
    }

    #[inline]
    pub fn enabled_extensions(&self) -> &[CString] {
        &self.enabled_extensions
    }

    #[inline]
    pub fn validation_enabled(&self) -> bool {
        self.enabled_layers.iter().any(|layer| layer.as_c_str() == ComputeInstanceInitInfo::VALIDATION_LAYER_NAME)
    }

    /// instance 是否启用了 debug utils，启用后可以给 vulkan object 设置 debug name
    #[inline]
    pub fn debug_utils_enabled(&self) -> bool {
        self.enabled_extensions.iter().any(|ext| ext.as_c_str() == ash::ext::debug_utils::NAME)
    }
}

// tools
impl ComputeInstance {
    pub fn physical_devices(&self) -> DeviceResult<Vec<PhysicalDeviceRef>> {
        let pdevices = unsafe { self.ash_instance.enumerate_physical_devices()? };
        Ok(pdevices.into_iter().map(PhysicalDeviceRef::from).collect_vec())
    }
}
