use ash::vk;

use crate::error::{DeviceError, DeviceResult};

/// 每个 queue family 只创建 1 个 queue
///
/// 修改这个值时，需要同时修改 `queue_create_infos` 里的 priorities
pub const QUEUES_PER_FAMILY: u32 = 1;

static QUEUE_PRIORITIES: [f32; QUEUES_PER_FAMILY as usize] = [1.0];

/// compute 和 transfer 所使用的 queue family
///
/// 如果物理设备有专用的 transfer family（支持 transfer 但不支持 compute），就使用它；
/// 否则 transfer 和 compute 共用同一个 family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueFamilyAssignment {
    pub compute_family_index: u32,
    pub transfer_family_index: u32,
}

impl QueueFamilyAssignment {
    /// 按 index 顺序查找，index 小的优先
    pub fn resolve(families: &[vk::QueueFamilyProperties]) -> DeviceResult<Self> {
        let first_family = |pred: &dyn Fn(vk::QueueFlags) -> bool| {
            families
                .iter()
                .position(|props| props.queue_count > 0 && pred(props.queue_flags))
                .map(|idx| idx as u32)
        };

        let compute_family_index = first_family(&|flags| flags.contains(vk::QueueFlags::COMPUTE))
            .ok_or(DeviceError::NoComputeCapableFamily)?;

        // 支持 compute 的 family 一定隐式支持 transfer
        let transfer_family_index = first_family(&|flags| {
            flags.contains(vk::QueueFlags::TRANSFER) && !flags.contains(vk::QueueFlags::COMPUTE)
        })
        .unwrap_or(compute_family_index);

        Ok(Self {
            compute_family_index,
            transfer_family_index,
        })
    }

    #[inline]
    pub fn has_separate_queues(&self) -> bool {
        self.compute_family_index != self.transfer_family_index
    }

    /// family 相同时只生成一个 create info
    pub fn queue_create_infos(&self) -> Vec<vk::DeviceQueueCreateInfo<'static>> {
        let info = |family_index: u32| {
            vk::DeviceQueueCreateInfo::default().queue_family_index(family_index).queue_priorities(&QUEUE_PRIORITIES)
        };

        if self.has_separate_queues() {
            vec![info(self.compute_family_index), info(self.transfer_family_index)]
        } else {
            vec![info(self.compute_family_index)]
        }
    }
}
