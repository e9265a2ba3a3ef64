use ash::vk;

use crate::error::{DeviceError, DeviceResult};

/// 需要选择 memory type 的资源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryResource {
    Buffer(vk::Buffer),
    Image(vk::Image),
}

impl From<vk::Buffer> for MemoryResource {
    fn from(buffer: vk::Buffer) -> Self {
        Self::Buffer(buffer)
    }
}

impl From<vk::Image> for MemoryResource {
    fn from(image: vk::Image) -> Self {
        Self::Image(image)
    }
}

impl MemoryResource {
    pub(crate) fn requirements(&self, device: &ash::Device) -> vk::MemoryRequirements {
        unsafe {
            match *self {
                Self::Buffer(buffer) => device.get_buffer_memory_requirements(buffer),
                Self::Image(image) => device.get_image_memory_requirements(image),
            }
        }
    }
}

/// 物理设备的 memory type 表，只读
///
/// index 即为 vulkan 中的 memory type index
#[derive(Debug, Clone, Default)]
pub struct MemoryTypeTable {
    types: Vec<vk::MemoryType>,
}

impl MemoryTypeTable {
    pub fn new(types: Vec<vk::MemoryType>) -> Self {
        Self { types }
    }

    pub fn from_properties(props: &vk::PhysicalDeviceMemoryProperties) -> Self {
        let count = (props.memory_type_count as usize).min(props.memory_types.len());
        Self::new(props.memory_types[..count].to_vec())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    #[inline]
    pub fn property_flags(&self, id: u32) -> Option<vk::MemoryPropertyFlags> {
        self.types.get(id as usize).map(|ty| ty.property_flags)
    }

    #[inline]
    pub fn heap_index(&self, id: u32) -> Option<u32> {
        self.types.get(id as usize).map(|ty| ty.heap_index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &vk::MemoryType)> {
        self.types.iter().enumerate().map(|(idx, ty)| (idx as u32, ty))
    }

    /// 找到第一个满足条件的 memory type
    ///
    /// - `type_bits` 来自 `vk::MemoryRequirements::memory_type_bits`，第 i 位表示资源可以使用 memory type i
    /// - memory type 的 property flags 需要包含 `required` 的所有位
    ///
    /// 驱动通常把 device local 等更快的 memory type 放在前面，因此取 index 最小的
    pub fn select(&self, type_bits: u32, required: vk::MemoryPropertyFlags) -> DeviceResult<u32> {
        self.iter()
            .find(|(idx, ty)| {
                let allowed = type_bits.checked_shr(*idx).is_some_and(|bits| bits & 1 == 1);
                allowed && ty.property_flags.contains(required)
            })
            .map(|(idx, _)| idx)
            .ok_or(DeviceError::NoCompatibleMemoryType { type_bits, required })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_type(flags: vk::MemoryPropertyFlags, heap_index: u32) -> vk::MemoryType {
        vk::MemoryType {
            property_flags: flags,
            heap_index,
        }
    }

    fn discrete_gpu_table() -> MemoryTypeTable {
        MemoryTypeTable::new(vec![
            memory_type(vk::MemoryPropertyFlags::DEVICE_LOCAL, 0),
            memory_type(vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT, 1),
            memory_type(
                vk::MemoryPropertyFlags::HOST_VISIBLE
                    | vk::MemoryPropertyFlags::HOST_COHERENT
                    | vk::MemoryPropertyFlags::HOST_CACHED,
                1,
            ),
            memory_type(
                vk::MemoryPropertyFlags::DEVICE_LOCAL
                    | vk::MemoryPropertyFlags::HOST_VISIBLE
                    | vk::MemoryPropertyFlags::HOST_COHERENT,
                2,
            ),
        ])
    }

    #[test]
    fn test_host_visible_picks_first_match() {
        let table = MemoryTypeTable::new(vec![
            memory_type(vk::MemoryPropertyFlags::DEVICE_LOCAL, 0),
            memory_type(vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT, 1),
        ]);

        assert_eq!(table.select(0b11, vk::MemoryPropertyFlags::HOST_VISIBLE), Ok(1));
        assert_eq!(table.select(0b11, vk::MemoryPropertyFlags::DEVICE_LOCAL), Ok(0));
    }

    #[test]
    fn test_requirement_bits_are_respected() {
        let table = discrete_gpu_table();

        // 资源不能放在 type 1
        assert_eq!(table.select(0b1100, vk::MemoryPropertyFlags::HOST_VISIBLE), Ok(2));
        // 只能放在 type 3
        assert_eq!(table.select(0b1000, vk::MemoryPropertyFlags::DEVICE_LOCAL), Ok(3));
    }

    #[test]
    fn test_empty_required_flags_match_any_allowed_type() {
        let table = discrete_gpu_table();
        assert_eq!(table.select(0b0110, vk::MemoryPropertyFlags::empty()), Ok(1));
    }

    #[test]
    fn test_result_is_minimal_compatible_index() {
        let table = discrete_gpu_table();
        let required = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

        for type_bits in 1u32..16 {
            let Ok(selected) = table.select(type_bits, required) else {
                continue;
            };
            assert_eq!((type_bits >> selected) & 1, 1);
            assert!(table.property_flags(selected).unwrap().contains(required));
            for lower in 0..selected {
                let compatible =
                    (type_bits >> lower) & 1 == 1 && table.property_flags(lower).unwrap().contains(required);
                assert!(!compatible, "type {lower} is compatible and lower than {selected}");
            }
        }
    }

    #[test]
    fn test_no_compatible_memory_type() {
        let table = discrete_gpu_table();
        assert_eq!(
            table.select(0b0001, vk::MemoryPropertyFlags::HOST_VISIBLE),
            Err(DeviceError::NoCompatibleMemoryType {
                type_bits: 0b0001,
                required: vk::MemoryPropertyFlags::HOST_VISIBLE,
            })
        );
        assert!(table.select(0, vk::MemoryPropertyFlags::empty()).is_err());
        assert!(MemoryTypeTable::default().select(!0, vk::MemoryPropertyFlags::empty()).is_err());
    }

    #[test]
    fn test_from_properties_respects_count() {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 2,
            ..Default::default()
        };
        props.memory_types[0] = memory_type(vk::MemoryPropertyFlags::DEVICE_LOCAL, 0);
        props.memory_types[1] = memory_type(vk::MemoryPropertyFlags::HOST_VISIBLE, 1);
        props.memory_types[2] = memory_type(vk::MemoryPropertyFlags::HOST_CACHED, 1);

        let table = MemoryTypeTable::from_properties(&props);
        assert_eq!(table.len(), 2);
        assert_eq!(table.property_flags(1), Some(vk::MemoryPropertyFlags::HOST_VISIBLE));
        assert_eq!(table.property_flags(2), None);
        assert_eq!(table.heap_index(1), Some(1));
    }
}
