use ash::vk;
use thiserror::Error;

/// compute 设备相关的所有错误
///
/// 每个错误都可以映射为一个 [`vk::Result`]，用于 `ComputeDevice` 内部缓存的最近一次操作结果
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// 物理设备上没有任何支持 compute 的 queue family
    #[error("physical device exposes no compute-capable queue family")]
    NoComputeCapableFamily,

    /// 资源允许的 memory type 中，没有一个包含所需的 property flags
    #[error("no memory type matches type bits {type_bits:#b} with properties {required:?}")]
    NoCompatibleMemoryType {
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    },

    /// 驱动返回的错误码，原样保留
    #[error("vulkan driver error: {0}")]
    Driver(#[from] vk::Result),

    /// 非法的 queue 索引、使用已被移走的设备等
    #[error("precondition violated: {0}")]
    PreconditionViolation(&'static str),

    /// 无法加载 vulkan loader
    #[error("failed to load vulkan library: {0}")]
    Loading(String),
}

impl DeviceError {
    /// 该错误对应的 vulkan 错误码
    pub fn code(&self) -> vk::Result {
        match self {
            Self::NoComputeCapableFamily => vk::Result::ERROR_FEATURE_NOT_PRESENT,
            Self::NoCompatibleMemoryType { .. } => vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            Self::Driver(code) => *code,
            Self::PreconditionViolation(_) => vk::Result::ERROR_INITIALIZATION_FAILED,
            Self::Loading(_) => vk::Result::ERROR_INITIALIZATION_FAILED,
        }
    }

    /// 出现该错误后逻辑设备的句柄不再可用，之后的操作都应该返回这个错误
    #[inline]
    pub fn invalidates_device(&self) -> bool {
        matches!(self, Self::Driver(vk::Result::ERROR_DEVICE_LOST))
    }
}

pub type DeviceResult<T> = Result<T, DeviceError>;
