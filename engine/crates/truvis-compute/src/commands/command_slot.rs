use ash::vk;

use crate::error::DeviceResult;
use crate::foundation::queue_family::QueueFamilyAssignment;

/// 一个 command pool 以及从中分配的 primary command buffer
///
/// command pool 是和 queue family 绑定的，而不是和 queue 绑定的。
/// buffer 可以被 `take_buffer` 拿走，之后需要时再重新分配
#[derive(Debug)]
pub struct CommandSlot {
    pool: vk::CommandPool,
    buffer: Option<vk::CommandBuffer>,
    queue_family_index: u32,
}

// init & destroy
impl CommandSlot {
    /// pool 使用 `RESET_COMMAND_BUFFER`，每个 buffer 可以单独 reset
    pub fn new(device: &ash::Device, queue_family_index: u32) -> DeviceResult<Self> {
        let pool = unsafe {
            device.create_command_pool(
                &vk::CommandPoolCreateInfo::default()
                    .queue_family_index(queue_family_index)
                    .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER),
                None,
            )?
        };

        let buffer = match Self::allocate_primary(device, pool) {
            Ok(buffer) => buffer,
            Err(e) => {
                unsafe { device.destroy_command_pool(pool, None) };
                return Err(e);
            }
        };
        log::debug!("command pool created for queue family {}", queue_family_index);

        Ok(Self {
            pool,
            buffer: Some(buffer),
            queue_family_index,
        })
    }

    fn allocate_primary(device: &ash::Device, pool: vk::CommandPool) -> DeviceResult<vk::CommandBuffer> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { device.allocate_command_buffers(&info)? };
        Ok(buffers[0])
    }

    /// 先释放 buffer，再销毁 pool
    ///
    /// 被 `take_buffer` 拿走的 buffer 也会随 pool 一起失效
    pub fn destroy(self, device: &ash::Device) {
        unsafe {
            if let Some(buffer) = self.buffer {
                device.free_command_buffers(self.pool, &[buffer]);
            }
            device.destroy_command_pool(self.pool, None);
        }
        log::debug!("command pool destroyed for queue family {}", self.queue_family_index);
    }
}

// getters
impl CommandSlot {
    #[inline]
    pub fn pool(&self) -> vk::CommandPool {
        self.pool
    }

    /// 当前持有的 primary buffer，被拿走之后为 None
    #[inline]
    pub fn buffer(&self) -> Option<vk::CommandBuffer> {
        self.buffer
    }

    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }
}

// tools
impl CommandSlot {
    /// 返回当前的 primary buffer，没有时从 pool 重新分配一个
    pub fn ensure_buffer(&mut self, device: &ash::Device) -> DeviceResult<vk::CommandBuffer> {
        match self.buffer {
            Some(buffer) => Ok(buffer),
            None => {
                let buffer = Self::allocate_primary(device, self.pool)?;
                self.buffer = Some(buffer);
                Ok(buffer)
            }
        }
    }

    /// 拿走 primary buffer，所有权交给调用者
    #[inline]
    pub fn take_buffer(&mut self) -> Option<vk::CommandBuffer> {
        self.buffer.take()
    }
}

/// transfer 所使用的 command slot，在第一次请求 transfer 时才创建
///
/// | 状态 | 触发 | 下一个状态 |
/// |---|---|---|
/// | `Uninit` | 第一次请求，family 不同 | `OwnedDistinct` |
/// | `Uninit` | 第一次请求，family 相同 | `AliasedToCompute` |
#[derive(Debug, Default)]
pub enum TransferSlot {
    #[default]
    Uninit,
    /// transfer 和 compute 共用同一个 family，直接使用 compute slot
    AliasedToCompute,
    /// 独立的 transfer family，拥有自己的 pool
    OwnedDistinct(CommandSlot),
}

impl TransferSlot {
    /// 已经初始化时什么都不做
    ///
    /// `create_slot` 只会在需要独立 pool 时调用，参数为 transfer family index
    pub fn materialize(
        &mut self,
        families: &QueueFamilyAssignment,
        create_slot: impl FnOnce(u32) -> DeviceResult<CommandSlot>,
    ) -> DeviceResult<()> {
        if !matches!(self, Self::Uninit) {
            return Ok(());
        }

        *self = if families.has_separate_queues() {
            Self::OwnedDistinct(create_slot(families.transfer_family_index)?)
        } else {
            Self::AliasedToCompute
        };
        Ok(())
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        !matches!(self, Self::Uninit)
    }

    /// 只有 `OwnedDistinct` 需要释放资源，alias 的情况由 compute slot 负责
    pub fn destroy(self, device: &ash::Device) {
        if let Self::OwnedDistinct(slot) = self {
            slot.destroy(device);
        }
    }
}
