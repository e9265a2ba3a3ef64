use std::ffi::CStr;

use ash::vk;

/// 创建 `ComputeInstance` 所需的参数
pub struct ComputeInstanceInitInfo {
    pub app_name: String,
    pub engine_name: String,

    /// fence fd 的查询需要 vulkan 1.1
    pub vk_version: u32,

    /// 开启后会尝试启用 validation layer 以及 debug utils 扩展
    pub enable_validation: bool,

    pub instance_layers: Vec<&'static CStr>,
    pub instance_extensions: Vec<&'static CStr>,
    pub instance_create_flags: vk::InstanceCreateFlags,

    pub debug_msg_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    pub debug_msg_type: vk::DebugUtilsMessageTypeFlagsEXT,
}

impl ComputeInstanceInitInfo {
    pub const VALIDATION_LAYER_NAME: &'static CStr = c"VK_LAYER_KHRONOS_validation";

    pub fn init_basic(app_name: impl Into<String>) -> Self {
        let instance_create_flags = if cfg!(target_os = "macos") {
            vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR
        } else {
            vk::InstanceCreateFlags::empty()
        };

        Self {
            app_name: app_name.into(),
            engine_name: "Truvis".to_string(),

            vk_version: vk::API_VERSION_1_1,

            enable_validation: cfg!(debug_assertions),

            instance_layers: vec![],
            instance_extensions: Self::basic_instance_extensions(),
            instance_create_flags,

            debug_msg_severity: vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            debug_msg_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        }
    }

    /// 关闭 validation
    pub fn without_validation(mut self) -> Self {
        self.enable_validation = false;
        self
    }

    fn basic_instance_extensions() -> Vec<&'static CStr> {
        let mut exts = Vec::new();

        if cfg!(target_os = "macos") {
            // 这个扩展能够在枚举 pdevice 时，将不受支持的 pdevice 也列举出来
            // 不受支持的 pdevice 可以通过模拟层运行 vulkan
            exts.push(ash::khr::portability_enumeration::NAME);
        }
        exts
    }

    /// validation 开启时额外需要的 layers
    pub(crate) fn validation_layers(&self) -> Vec<&'static CStr> {
        if self.enable_validation { vec![Self::VALIDATION_LAYER_NAME] } else { vec![] }
    }

    /// validation 开启时额外需要的 extensions
    ///
    /// debug utils 提供 debug messenger 以及为 vulkan object 设置 debug name
    pub(crate) fn validation_extensions(&self) -> Vec<&'static CStr> {
        if self.enable_validation { vec![ash::ext::debug_utils::NAME] } else { vec![] }
    }
}

impl Default for ComputeInstanceInitInfo {
    fn default() -> Self {
        Self::init_basic("truvis-compute")
    }
}
