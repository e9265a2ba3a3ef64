use ash::vk;

use crate::device::ComputeDevice;
use crate::error::{DeviceError, DeviceResult};
use crate::foundation::feature_probe::FenceFdProbe;

/// # Destroy
/// 不实现 Drop，需要手动调用 `destroy`
#[derive(Debug, Clone)]
pub struct ComputeFence {
    fence: vk::Fence,
    /// 创建时是否带上了 sync fd 的导出信息
    exportable: bool,
}

// 创建与销毁
impl ComputeFence {
    /// # param
    /// * exportable - 是否需要导出为 sync fd，设备不支持时退化为普通 fence
    pub fn new(device: &ComputeDevice, signaled: bool, exportable: bool, debug_name: &str) -> DeviceResult<Self> {
        let raw = device.checked_raw()?;
        let exportable = exportable && device.support_fence_fd();

        let flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let mut export_info = vk::ExportFenceCreateInfo::default().handle_types(FenceFdProbe::HANDLE_TYPE);
        let mut create_info = vk::FenceCreateInfo::default().flags(flags);
        if exportable {
            create_info = create_info.push_next(&mut export_info);
        }

        let fence = unsafe { raw.create_fence(&create_info, None)? };
        device.set_debug_name(fence, debug_name);

        Ok(Self { fence, exportable })
    }

    #[inline]
    pub fn destroy(self, device: &ComputeDevice) {
        if let Some(raw) = device.raw() {
            unsafe { raw.destroy_fence(self.fence, None) };
        }
    }
}

// getters
impl ComputeFence {
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    #[inline]
    pub fn exportable(&self) -> bool {
        self.exportable
    }
}

// tools
impl ComputeFence {
    /// 阻塞等待 fence
    ///
    /// # return
    /// 超时返回 false
    pub fn wait(&self, device: &ComputeDevice, timeout_ns: u64) -> DeviceResult<bool> {
        let raw = device.checked_raw()?;
        match unsafe { raw.wait_for_fences(std::slice::from_ref(&self.fence), true, timeout_ns) } {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn reset(&self, device: &ComputeDevice) -> DeviceResult<()> {
        let raw = device.checked_raw()?;
        unsafe { raw.reset_fences(std::slice::from_ref(&self.fence))? };
        Ok(())
    }

    /// fence 是否已经 signaled，不会阻塞
    pub fn is_signaled(&self, device: &ComputeDevice) -> DeviceResult<bool> {
        let raw = device.checked_raw()?;
        Ok(unsafe { raw.get_fence_status(self.fence)? })
    }

    /// 将 fence 的 payload 导出为 sync fd，可以交给 poll/epoll/select 等待
    ///
    /// fence 需要已经被提交到 queue。导出之后 fd 归调用者所有，fence 的 payload 会被重置。
    /// 驱动可能返回 -1，表示 fence 已经 signaled
    #[cfg(unix)]
    pub fn export_fd(&self, device: &ComputeDevice) -> DeviceResult<std::os::raw::c_int> {
        if !self.exportable {
            return Err(DeviceError::PreconditionViolation("fence was not created as exportable"));
        }
        let loader = device
            .fence_fd_loader()
            .ok_or(DeviceError::PreconditionViolation("fence fd is not supported by this device"))?;

        let info = vk::FenceGetFdInfoKHR::default().fence(self.fence).handle_type(FenceFdProbe::HANDLE_TYPE);
        Ok(unsafe { loader.get_fence_fd(&info)? })
    }
}
