//! Vulkan compute 设备封装
//!
//! 将逻辑设备和每个 compute 任务都需要的状态打包在一起：command pool、primary command buffer、
//! queue family index 以及可选特性的检测结果。每张 GPU 创建一个 [`device::ComputeDevice`]，
//! 之后提交 compute 或 transfer 工作时不再需要重复查询 queue family、重建 pool 或探测特性。
//!
//! # 多线程
//! 同一个 `ComputeDevice` 不能被多个线程同时修改。需要在多个线程中使用同一张 GPU 时，
//! 为每个线程 `clone` 一份：clone 会重新创建逻辑设备以及所有 command 资源。
//!
//! ```ignore
//! let instance = ComputeInstance::new(&ComputeInstanceInitInfo::init_basic("app"))?;
//! let pdevice = instance.physical_devices()?[0];
//! let mut device = ComputeDevice::try_new(&instance, pdevice)?;
//!
//! let memory_type = device.select_memory(buffer, vk::MemoryPropertyFlags::HOST_VISIBLE)?;
//! let memory = device.alloc(buffer, memory_type)?;
//! let cmd = device.compute_cmd_buffer()?;
//! ```

/// tracy 的 span，只在 tracy client 已经启动时生效
macro_rules! profile_span {
    ($name:literal) => {
        tracy_client::Client::running()
            .map(|client| client.span_alloc(Some($name), module_path!(), file!(), line!(), 0))
    };
}

pub mod commands;
pub mod device;
pub mod error;
pub mod foundation;

pub use device::ComputeDevice;
pub use error::{DeviceError, DeviceResult};
pub use foundation::init_info::ComputeInstanceInitInfo;
pub use foundation::instance::ComputeInstance;
pub use foundation::physical_device::PhysicalDeviceRef;
