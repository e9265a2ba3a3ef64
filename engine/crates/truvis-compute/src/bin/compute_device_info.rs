//! 列出所有物理设备，并为每个设备创建一个 `ComputeDevice`，输出 queue family、memory type 以及特性信息

use anyhow::Context;
use ash::vk;
use truvis_compute::{ComputeDevice, ComputeInstance, ComputeInstanceInitInfo};
use truvis_crate_tools::init_log::init_log;

fn describe(device: &mut ComputeDevice) -> anyhow::Result<()> {
    let info = device.physical_device_info().context("physical device info is missing")?;
    log::info!("== {} ({:?}), discrete: {}", info.device_name(), info.properties().device_type, info.is_discrete_gpu());

    for (idx, ty) in info.memory_types().iter() {
        log::info!("memory type {}: heap {}, {:?}", idx, ty.heap_index, ty.property_flags);
    }
    let host_visible = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
    let host_visible_types =
        info.memory_types().iter().filter(|(_, ty)| ty.property_flags.contains(host_visible)).count();
    log::info!("host visible + coherent memory types: {}", host_visible_types);

    let families = device.queue_families().context("device has no queue families")?;
    log::info!(
        "compute family: {}, transfer family: {}, separate queues: {}",
        families.compute_family_index,
        families.transfer_family_index,
        device.has_separate_queues()
    );
    log::info!("fence fd supported: {}", device.support_fence_fd());

    let compute_cmd = device.compute_cmd_buffer()?;
    let transfer_cmd = device.transfer_cmd_buffer()?;
    log::info!("transfer buffer aliases compute buffer: {}", compute_cmd == transfer_cmd);

    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_log();
    tracy_client::Client::start();

    let instance = ComputeInstance::new(&ComputeInstanceInitInfo::init_basic("compute-device-info"))
        .context("failed to create vulkan instance")?;

    let pdevices = instance.physical_devices()?;
    if pdevices.is_empty() {
        log::warn!("no physical device found");
        return Ok(());
    }

    for pdevice in pdevices {
        let mut device = ComputeDevice::new(&instance, pdevice);
        if !device.is_valid() {
            log::warn!("skip physical device {:?}: {:?}", pdevice, device.result());
            continue;
        }
        describe(&mut device)?;
    }

    Ok(())
}
