use std::ffi::CStr;

use ash::vk;

use crate::error::DeviceResult;

/// validation layer 的消息输出到 log
pub struct ComputeDebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl ComputeDebugMessenger {
    pub fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        create_info: &vk::DebugUtilsMessengerCreateInfoEXT,
    ) -> DeviceResult<Self> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let messenger = unsafe { loader.create_debug_utils_messenger(create_info, None)? };

        Ok(Self { loader, messenger })
    }

    /// 在 instance 创建时也需要这个结构体，用于捕获 vkCreateInstance 本身的消息
    pub fn create_info(
        severity: vk::DebugUtilsMessageSeverityFlagsEXT,
        ty: vk::DebugUtilsMessageTypeFlagsEXT,
    ) -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
        vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(severity)
            .message_type(ty)
            .pfn_user_callback(Some(vk_debug_callback))
    }
}

impl Drop for ComputeDebugMessenger {
    fn drop(&mut self) {
        log::info!("destroying debug messenger");
        unsafe {
            self.loader.destroy_debug_utils_messenger(self.messenger, None);
        }
    }
}

/// debug messenger 的回调函数
///
/// # Safety
/// 由 vulkan loader 调用，`p_callback_data` 在回调期间有效
unsafe extern "system" fn vk_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let callback_data = unsafe { *p_callback_data };

    let to_str = |ptr: *const std::os::raw::c_char| {
        if ptr.is_null() { std::borrow::Cow::from("") } else { unsafe { CStr::from_ptr(ptr).to_string_lossy() } }
    };
    let id_name = to_str(callback_data.p_message_id_name);
    let msg = to_str(callback_data.p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("[{:?}] {}\n{}", message_type, id_name, msg),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("[{:?}] {}\n{}", message_type, id_name, msg),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::info!("[{:?}] {}\n{}", message_type, id_name, msg),
        _ => log::debug!("[{:?}] {}\n{}", message_type, id_name, msg),
    };

    // 只有 layer developer 才需要返回 True
    vk::FALSE
}
