//! 需要真实 vulkan 驱动的测试
//!
//! 没有 vulkan loader 或者没有支持 compute 的 GPU 时，测试直接跳过

use ash::vk;
use truvis_compute::commands::command_slot::TransferSlot;
use truvis_compute::commands::fence::ComputeFence;
use truvis_compute::{ComputeDevice, ComputeInstance, ComputeInstanceInitInfo, DeviceError};
use truvis_crate_tools::init_log::init_log_for_test;

fn test_instance() -> Option<ComputeInstance> {
    init_log_for_test();
    match ComputeInstance::new(&ComputeInstanceInitInfo::init_basic("truvis-compute-test").without_validation()) {
        Ok(instance) => Some(instance),
        Err(e) => {
            log::warn!("skip: vulkan is not available: {}", e);
            None
        }
    }
}

/// 第一个可以创建 compute 设备的物理设备
fn first_device(instance: &ComputeInstance) -> Option<ComputeDevice<'_>> {
    let pdevices = instance.physical_devices().ok()?;
    let device = pdevices.into_iter().find_map(|pdevice| ComputeDevice::try_new(instance, pdevice).ok());
    if device.is_none() {
        log::warn!("skip: no compute capable device");
    }
    device
}

macro_rules! device_or_skip {
    ($instance:ident, $($device:tt)+) => {
        let Some($instance) = test_instance() else {
            return;
        };
        let Some($($device)+) = first_device(&$instance) else {
            return;
        };
    };
}

#[test]
fn test_construction_resolves_queue_families() {
    device_or_skip!(instance, mut device);

    assert!(device.is_valid());
    assert_eq!(device.result(), vk::Result::SUCCESS);
    assert_ne!(device.vk_handle(), vk::Device::null());

    let families = device.queue_families().unwrap();
    let props = device.physical_device_info().unwrap().queue_families();
    let compute = &props[families.compute_family_index as usize];
    assert!(compute.queue_flags.contains(vk::QueueFlags::COMPUTE));
    assert_eq!(device.has_separate_queues(), families.compute_family_index != families.transfer_family_index);

    if device.has_separate_queues() {
        let transfer = &props[families.transfer_family_index as usize];
        assert!(transfer.queue_flags.contains(vk::QueueFlags::TRANSFER));
        assert!(!transfer.queue_flags.contains(vk::QueueFlags::COMPUTE));
    }

    assert_eq!(device.num_compute_queues(), 1);
    assert_eq!(device.num_transfer_queues(), 1);
    assert!(device.compute_cmd_buffer().is_ok());
    assert!(matches!(device.transfer_slot(), Some(TransferSlot::Uninit)));
}

#[test]
fn test_transfer_slot_is_lazy() {
    device_or_skip!(instance, mut device);

    let compute_pool = device.compute_cmd_pool().unwrap();
    let compute_cmd = device.compute_cmd_buffer().unwrap();
    let transfer_pool = device.transfer_cmd_pool().unwrap();
    let transfer_cmd = device.transfer_cmd_buffer().unwrap();

    if device.has_separate_queues() {
        assert_ne!(transfer_pool, compute_pool);
        assert_ne!(transfer_cmd, compute_cmd);
        assert!(matches!(device.transfer_slot(), Some(TransferSlot::OwnedDistinct(_))));
    } else {
        assert_eq!(transfer_pool, compute_pool);
        assert_eq!(transfer_cmd, compute_cmd);
        assert!(matches!(device.transfer_slot(), Some(TransferSlot::AliasedToCompute)));
    }

    // 第二次请求返回同样的句柄
    assert_eq!(device.transfer_cmd_buffer().unwrap(), transfer_cmd);
}

#[test]
fn test_clone_creates_independent_handles() {
    device_or_skip!(instance, mut device);

    let mut copy = device.clone();
    assert!(copy.is_valid());
    assert_ne!(copy.vk_handle(), device.vk_handle());
    assert_ne!(copy.compute_cmd_pool().unwrap(), device.compute_cmd_pool().unwrap());
    assert_ne!(copy.compute_cmd_buffer().unwrap(), device.compute_cmd_buffer().unwrap());

    assert_eq!(copy.physical_device(), device.physical_device());
    assert!(std::ptr::eq(copy.instance(), device.instance()));
    assert_eq!(copy.properties().device_id, device.properties().device_id);
    assert_eq!(copy.properties().vendor_id, device.properties().vendor_id);
    assert_eq!(copy.queue_families(), device.queue_families());
    assert_eq!(copy.support_fence_fd(), device.support_fence_fd());
}

#[test]
fn test_clone_from_replaces_resources() {
    device_or_skip!(instance, mut device);

    let source = device.clone();
    let old_handle = device.vk_handle();
    device.clone_from(&source);

    assert!(device.is_valid());
    assert_ne!(device.vk_handle(), old_handle);
    assert_ne!(device.vk_handle(), source.vk_handle());
    assert_eq!(device.physical_device(), source.physical_device());
}

#[test]
fn test_take_leaves_empty_device() {
    device_or_skip!(instance, mut device);

    let handle = device.vk_handle();
    let moved = device.take();

    assert_eq!(moved.vk_handle(), handle);
    assert!(moved.is_valid());

    assert!(!device.is_valid());
    assert_eq!(device.vk_handle(), vk::Device::null());
    assert!(matches!(device.compute_cmd_buffer(), Err(DeviceError::PreconditionViolation(_))));
    assert_eq!(device.result(), vk::Result::ERROR_INITIALIZATION_FAILED);

    // 空设备的 clone 仍然是空设备
    let empty_copy = device.clone();
    assert!(!empty_copy.is_valid());

    drop(device);
    drop(empty_copy);
    assert!(moved.compute_cmd_pool().is_ok());
}

#[test]
fn test_release_compute_cmd_buffer() {
    device_or_skip!(instance, mut device);

    let released = device.release_compute_cmd_buffer().unwrap();
    assert_ne!(released, vk::CommandBuffer::null());
    assert_eq!(device.result(), vk::Result::SUCCESS);
    assert_eq!(device.compute_slot().unwrap().buffer(), None);

    // 再次请求时重新分配
    let fresh = device.compute_cmd_buffer().unwrap();
    assert_ne!(fresh, released);
    assert_eq!(device.compute_slot().unwrap().buffer(), Some(fresh));

    unsafe {
        device.raw().unwrap().free_command_buffers(device.compute_cmd_pool().unwrap(), &[released]);
    }
}

#[test]
fn test_queue_index_out_of_range() {
    device_or_skip!(instance, device);

    assert!(device.compute_queue(0).is_ok());
    assert!(device.transfer_queue(0).is_ok());

    assert!(matches!(device.compute_queue(1), Err(DeviceError::PreconditionViolation(_))));
    assert_eq!(device.result(), vk::Result::ERROR_INITIALIZATION_FAILED);
    assert!(matches!(device.transfer_queue(1), Err(DeviceError::PreconditionViolation(_))));

    // 成功的操作会覆盖之前的结果
    assert!(device.compute_queue(0).is_ok());
    assert_eq!(device.result(), vk::Result::SUCCESS);
}

#[test]
fn test_memory_properties() {
    device_or_skip!(instance, device);

    let count = device.physical_device_info().unwrap().memory_types().len() as u32;
    assert!(count > 0);
    for id in 0..count {
        assert!(device.memory_properties(id).is_ok());
    }
    assert!(matches!(device.memory_properties(count), Err(DeviceError::PreconditionViolation(_))));
}

#[test]
fn test_select_and_alloc_buffer_memory() {
    device_or_skip!(instance, device);
    let raw = device.raw().unwrap().clone();

    let buffer_ci = vk::BufferCreateInfo::default()
        .size(1024)
        .usage(vk::BufferUsageFlags::STORAGE_BUFFER)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);
    let buffer = unsafe { raw.create_buffer(&buffer_ci, None).unwrap() };

    let host_visible = vk::MemoryPropertyFlags::HOST_VISIBLE;
    let memory_type = device.select_memory(buffer, host_visible).unwrap();
    assert!(device.memory_properties(memory_type).unwrap().contains(host_visible));

    // 返回的是满足要求的最小 index
    let requirements = unsafe { raw.get_buffer_memory_requirements(buffer) };
    for id in 0..memory_type {
        let allowed = requirements.memory_type_bits & (1 << id) != 0;
        assert!(!(allowed && device.memory_properties(id).unwrap().contains(host_visible)));
    }

    let out_of_range = device.physical_device_info().unwrap().memory_types().len() as u32;
    assert!(matches!(device.alloc(buffer, out_of_range), Err(DeviceError::PreconditionViolation(_))));

    let memory = device.alloc(buffer, memory_type).unwrap();
    assert_eq!(device.result(), vk::Result::SUCCESS);
    unsafe {
        raw.bind_buffer_memory(buffer, memory, 0).unwrap();
        raw.destroy_buffer(buffer, None);
        raw.free_memory(memory, None);
    }
}

#[test]
fn test_fence_wait() {
    device_or_skip!(instance, device);

    let fence = ComputeFence::new(&device, true, false, "test-fence").unwrap();
    assert!(!fence.exportable());
    assert!(fence.is_signaled(&device).unwrap());
    assert!(fence.wait(&device, 0).unwrap());

    fence.reset(&device).unwrap();
    assert!(!fence.is_signaled(&device).unwrap());
    assert!(!fence.wait(&device, 0).unwrap());

    fence.destroy(&device);
}

#[test]
fn test_exportable_fence_follows_support() {
    device_or_skip!(instance, device);

    let fence = ComputeFence::new(&device, false, true, "export-fence").unwrap();
    assert_eq!(fence.exportable(), device.support_fence_fd());
    fence.destroy(&device);
}

#[test]
fn test_clone_per_thread() {
    device_or_skip!(instance, device);

    let copies = (0..2).map(|_| device.clone()).collect::<Vec<_>>();
    std::thread::scope(|s| {
        for mut copy in copies {
            s.spawn(move || {
                assert!(copy.is_valid());
                assert!(copy.compute_cmd_buffer().is_ok());
                assert!(copy.transfer_cmd_buffer().is_ok());
                copy.wait_idle().unwrap();
            });
        }
    });
}
