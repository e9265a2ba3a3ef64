use std::ffi::{CStr, CString};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicI32, Ordering};

use ash::vk;
use itertools::Itertools;

use crate::commands::command_slot::{CommandSlot, TransferSlot};
use crate::error::{DeviceError, DeviceResult};
use crate::foundation::instance::ComputeInstance;
use crate::foundation::memory::{MemoryResource, MemoryTypeTable};
use crate::foundation::physical_device::{PhysicalDeviceInfo, PhysicalDeviceRef};
use crate::foundation::queue_family::{QUEUES_PER_FAMILY, QueueFamilyAssignment};

/// 逻辑设备以及它所拥有的 command 资源
///
/// 只存在于构造成功的 `ComputeDevice` 中
struct DeviceCore {
    device: ash::Device,
    families: QueueFamilyAssignment,

    compute: CommandSlot,
    transfer: TransferSlot,

    /// 设备支持 fence fd 时才会加载
    fence_fd: Option<ash::khr::external_fence_fd::Device>,
    /// instance 启用了 debug utils 时才会加载
    debug_utils: Option<ash::ext::debug_utils::Device>,
}

impl DeviceCore {
    fn new(
        instance: &ComputeInstance,
        info: &PhysicalDeviceInfo,
        families: QueueFamilyAssignment,
    ) -> DeviceResult<Self> {
        let fence_fd_supported = info.fence_fd().supported();

        let mut device_exts: Vec<&'static CStr> = vec![];
        if fence_fd_supported {
            device_exts.push(ash::khr::external_fence_fd::NAME);
        }
        // 在 metal 上模拟出 vulkan 时必须启用
        if info.supports_extension(ash::khr::portability_subset::NAME) {
            device_exts.push(ash::khr::portability_subset::NAME);
        }
        let ext_ptrs = device_exts.iter().map(|ext| ext.as_ptr()).collect_vec();
        log::info!("device exts: {:?}", device_exts);

        let queue_create_infos = families.queue_create_infos();
        let device_ci = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&ext_ptrs);

        let ash_instance = instance.ash_instance();
        let device = unsafe { ash_instance.create_device(info.handle().vk_handle(), &device_ci, None)? };

        let compute = match CommandSlot::new(&device, families.compute_family_index) {
            Ok(slot) => slot,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e);
            }
        };

        let fence_fd = fence_fd_supported.then(|| ash::khr::external_fence_fd::Device::new(ash_instance, &device));
        let debug_utils =
            instance.debug_utils_enabled().then(|| ash::ext::debug_utils::Device::new(ash_instance, &device));

        let core = Self {
            device,
            families,
            compute,
            transfer: TransferSlot::Uninit,
            fence_fd,
            debug_utils,
        };
        core.set_debug_name(core.device.handle(), "compute-device");
        core.set_debug_name(core.compute.pool(), "compute-pool");
        if let Some(buffer) = core.compute.buffer() {
            core.set_debug_name(buffer, "compute-primary");
        }
        Ok(core)
    }

    /// 销毁顺序：transfer slot，compute slot，逻辑设备
    fn destroy(self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                log::warn!("device wait idle failed before destroy: {:?}", e);
            }
        }
        self.transfer.destroy(&self.device);
        self.compute.destroy(&self.device);

        log::info!("destroying device");
        unsafe {
            self.device.destroy_device(None);
        }
    }

    fn set_debug_name<T: vk::Handle>(&self, handle: T, name: &str) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(name) else {
            return;
        };
        let info = vk::DebugUtilsObjectNameInfoEXT::default().object_handle(handle).object_name(name.as_c_str());
        if let Err(e) = unsafe { debug_utils.set_debug_utils_object_name(&info) } {
            log::warn!("failed to set debug name {:?}: {:?}", name, e);
        }
    }

    fn materialize_transfer(&mut self) -> DeviceResult<()> {
        if self.transfer.is_initialized() {
            return Ok(());
        }

        let device = &self.device;
        self.transfer.materialize(&self.families, |family| CommandSlot::new(device, family))?;
        if let TransferSlot::OwnedDistinct(slot) = &self.transfer {
            log::info!("transfer command pool created on dedicated family {}", slot.queue_family_index());
            self.set_debug_name(slot.pool(), "transfer-pool");
        }
        Ok(())
    }

    fn transfer_cmd_pool(&mut self) -> DeviceResult<vk::CommandPool> {
        self.materialize_transfer()?;
        match &self.transfer {
            TransferSlot::OwnedDistinct(slot) => Ok(slot.pool()),
            TransferSlot::AliasedToCompute => Ok(self.compute.pool()),
            TransferSlot::Uninit => Err(DeviceError::PreconditionViolation("transfer slot is not initialized")),
        }
    }

    fn transfer_cmd_buffer(&mut self) -> DeviceResult<vk::CommandBuffer> {
        self.materialize_transfer()?;
        match &mut self.transfer {
            TransferSlot::OwnedDistinct(slot) => slot.ensure_buffer(&self.device),
            TransferSlot::AliasedToCompute => self.compute.ensure_buffer(&self.device),
            TransferSlot::Uninit => Err(DeviceError::PreconditionViolation("transfer slot is not initialized")),
        }
    }
}

/// 最近一次操作的结果
///
/// 设备丢失之后结果被锁定为丢失时的错误，之后的记录都会被忽略
#[derive(Debug)]
struct ResultLatch {
    code: AtomicI32,
    lost: OnceLock<DeviceError>,
}

impl ResultLatch {
    fn new(code: vk::Result) -> Self {
        Self {
            code: AtomicI32::new(code.as_raw()),
            lost: OnceLock::new(),
        }
    }

    #[inline]
    fn code(&self) -> vk::Result {
        vk::Result::from_raw(self.code.load(Ordering::Relaxed))
    }

    #[inline]
    fn store(&self, code: vk::Result) {
        self.code.store(code.as_raw(), Ordering::Relaxed);
    }

    /// 使设备失效的错误
    #[inline]
    fn lost(&self) -> Option<&DeviceError> {
        self.lost.get()
    }

    fn record<T>(&self, result: &DeviceResult<T>) {
        if self.lost.get().is_some() {
            return;
        }
        match result {
            Ok(_) => self.store(vk::Result::SUCCESS),
            Err(e) => {
                self.store(e.code());
                if e.invalidates_device() {
                    log::error!("device is lost, all following operations will fail: {}", e);
                    let _ = self.lost.set(e.clone());
                }
            }
        }
    }
}

/// 设备当前所处的状态
enum DeviceState {
    Ready(DeviceCore),
    /// 构造失败，所有操作都返回这个错误
    Failed(DeviceError),
    /// 已经被 `take` 移走
    Empty,
}

/// 逻辑设备 + command pool + queue family 的组合
///
/// # 复制
/// `clone` 不会共享任何句柄：它针对同一个物理设备重新创建逻辑设备、command pool 和 command buffer。
/// 这是一个很重的操作，用于给每个线程提供独立的提交环境。
///
/// # 失败
/// `new` 不会返回错误，失败时设备处于 failed 状态，之后的操作都会返回构造时的错误，
/// 可以通过 `result` 查询。需要 `Result` 时使用 `try_new`。
/// 操作返回 `ERROR_DEVICE_LOST` 之后同理，设备不再可用，`result` 保持为该错误。
///
/// # 销毁
/// drop 时依次释放 transfer slot、compute slot、逻辑设备。
/// 通过 `release_compute_cmd_buffer` 拿走的 command buffer 也会随 compute pool 一起失效。
pub struct ComputeDevice<'a> {
    instance: &'a ComputeInstance,
    physical_device: PhysicalDeviceRef,
    info: Option<PhysicalDeviceInfo>,

    state: DeviceState,

    /// 最近一次可能失败的操作的结果
    status: ResultLatch,
    /// 是否可以将 fence 导出为 fd，从而使用 epoll 或 select 等待 fence
    support_fence_fd: bool,
}

// 构造与销毁
impl<'a> ComputeDevice<'a> {
    pub fn new(instance: &'a ComputeInstance, physical_device: PhysicalDeviceRef) -> Self {
        let _span = profile_span!("ComputeDevice::new");

        let mut device = Self::empty(instance, physical_device);
        if let Err(e) = device.init() {
            log::warn!("failed to create compute device: {}", e);
            device.status.store(e.code());
            device.state = DeviceState::Failed(e);
        }
        device
    }

    pub fn try_new(instance: &'a ComputeInstance, physical_device: PhysicalDeviceRef) -> DeviceResult<Self> {
        let device = Self::new(instance, physical_device);
        if let DeviceState::Failed(e) = &device.state {
            return Err(e.clone());
        }
        Ok(device)
    }

    fn empty(instance: &'a ComputeInstance, physical_device: PhysicalDeviceRef) -> Self {
        Self {
            instance,
            physical_device,
            info: None,
            state: DeviceState::Empty,
            status: ResultLatch::new(vk::Result::ERROR_INITIALIZATION_FAILED),
            support_fence_fd: false,
        }
    }

    fn init(&mut self) -> DeviceResult<()> {
        let info = self.info.insert(PhysicalDeviceInfo::query(
            self.instance.ash_instance(),
            self.physical_device,
            self.instance.vk_version(),
        )?);

        let families = QueueFamilyAssignment::resolve(info.queue_families())?;
        log::info!(
            "queue families of {}: compute = {}, transfer = {}",
            info.device_name(),
            families.compute_family_index,
            families.transfer_family_index
        );

        let core = DeviceCore::new(self.instance, info, families)?;
        self.support_fence_fd = core.fence_fd.is_some();
        log::info!("fence fd supported: {}", self.support_fence_fd);

        self.state = DeviceState::Ready(core);
        self.status.store(vk::Result::SUCCESS);
        Ok(())
    }

    /// 移走所有句柄，`self` 变为空设备
    ///
    /// 空设备的所有操作都会返回 `PreconditionViolation`，drop 时什么都不做
    pub fn take(&mut self) -> Self {
        let empty = Self::empty(self.instance, self.physical_device);
        std::mem::replace(self, empty)
    }
}

impl Drop for ComputeDevice<'_> {
    fn drop(&mut self) {
        if let DeviceState::Ready(core) = std::mem::replace(&mut self.state, DeviceState::Empty) {
            core.destroy();
        }
    }
}

impl Clone for ComputeDevice<'_> {
    /// 针对同一个物理设备重新构造
    fn clone(&self) -> Self {
        let _span = profile_span!("ComputeDevice::clone");
        match self.state {
            DeviceState::Empty => Self::empty(self.instance, self.physical_device),
            _ => Self::new(self.instance, self.physical_device),
        }
    }

    /// copy-and-swap：先构造新的设备，再与 `self` 交换，旧资源随临时对象一起释放
    ///
    /// 新设备构造失败时，`self` 同样变为 failed 状态，旧资源依然会被释放
    fn clone_from(&mut self, source: &Self) {
        let mut fresh = source.clone();
        std::mem::swap(self, &mut fresh);
    }
}

impl std::fmt::Debug for ComputeDevice<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            DeviceState::Ready(_) if self.status.lost().is_some() => "lost",
            DeviceState::Ready(_) => "ready",
            DeviceState::Failed(_) => "failed",
            DeviceState::Empty => "empty",
        };
        f.debug_struct("ComputeDevice")
            .field("physical_device", &self.physical_device)
            .field("device", &self.vk_handle())
            .field("state", &state)
            .field("families", &self.queue_families())
            .field("result", &self.result())
            .field("support_fence_fd", &self.support_fence_fd)
            .finish()
    }
}

// 内部辅助函数
impl ComputeDevice<'_> {
    /// 记录操作结果
    ///
    /// 只有可用的设备才会记录，failed 或者空设备的结果保持不变
    fn latch<T>(&self, result: DeviceResult<T>) -> DeviceResult<T> {
        if self.is_valid() {
            self.status.record(&result);
        }
        result
    }

    fn state_error(state: &DeviceState) -> DeviceError {
        match state {
            DeviceState::Failed(e) => e.clone(),
            _ => DeviceError::PreconditionViolation("device has been moved out"),
        }
    }

    fn core(&self) -> DeviceResult<&DeviceCore> {
        if let Some(e) = self.status.lost() {
            return Err(e.clone());
        }
        match &self.state {
            DeviceState::Ready(core) => Ok(core),
            state => Err(Self::state_error(state)),
        }
    }

    fn core_mut(&mut self) -> DeviceResult<&mut DeviceCore> {
        if let Some(e) = self.status.lost() {
            return Err(e.clone());
        }
        match &mut self.state {
            DeviceState::Ready(core) => Ok(core),
            state => Err(Self::state_error(state)),
        }
    }

    fn memory_table(&self) -> DeviceResult<&MemoryTypeTable> {
        self.info
            .as_ref()
            .map(PhysicalDeviceInfo::memory_types)
            .ok_or_else(|| Self::state_error(&self.state))
    }

    fn queue(
        &self,
        family_index: impl Fn(&QueueFamilyAssignment) -> u32,
        queue_index: u32,
    ) -> DeviceResult<vk::Queue> {
        let core = self.core()?;
        if queue_index >= QUEUES_PER_FAMILY {
            return Err(DeviceError::PreconditionViolation("queue index out of range"));
        }
        Ok(unsafe { core.device.get_device_queue(family_index(&core.families), queue_index) })
    }
}

// getters
impl<'a> ComputeDevice<'a> {
    /// 创建设备时使用的 instance
    #[inline]
    pub fn instance(&self) -> &'a ComputeInstance {
        self.instance
    }

    #[inline]
    pub fn physical_device(&self) -> PhysicalDeviceRef {
        self.physical_device
    }

    /// 物理设备属性的快照
    pub fn properties(&self) -> vk::PhysicalDeviceProperties {
        match &self.info {
            Some(info) => *info.properties(),
            None => unsafe {
                self.instance.ash_instance().get_physical_device_properties(self.physical_device.vk_handle())
            },
        }
    }

    #[inline]
    pub fn physical_device_info(&self) -> Option<&PhysicalDeviceInfo> {
        self.info.as_ref()
    }

    #[inline]
    pub fn num_compute_queues(&self) -> u32 {
        QUEUES_PER_FAMILY
    }

    #[inline]
    pub fn num_transfer_queues(&self) -> u32 {
        QUEUES_PER_FAMILY
    }

    #[inline]
    pub fn queue_families(&self) -> Option<QueueFamilyAssignment> {
        self.core().ok().map(|core| core.families)
    }

    /// transfer 是否有独立的 queue family
    #[inline]
    pub fn has_separate_queues(&self) -> bool {
        self.queue_families().is_some_and(|families| families.has_separate_queues())
    }

    #[inline]
    pub fn support_fence_fd(&self) -> bool {
        self.support_fence_fd
    }

    /// 最近一次可能失败的操作的结果
    #[inline]
    pub fn result(&self) -> vk::Result {
        self.status.code()
    }

    /// 构造成功，没有被移走，也没有丢失
    #[inline]
    pub fn is_valid(&self) -> bool {
        matches!(self.state, DeviceState::Ready(_)) && self.status.lost().is_none()
    }

    /// 底层的 ash 设备，用于调用这里没有封装的 vulkan 函数
    #[inline]
    pub fn raw(&self) -> Option<&ash::Device> {
        self.core().ok().map(|core| &core.device)
    }

    pub fn checked_raw(&self) -> DeviceResult<&ash::Device> {
        self.core().map(|core| &core.device)
    }

    /// 失败或者已经移走的设备返回 null
    #[inline]
    pub fn vk_handle(&self) -> vk::Device {
        self.raw().map_or(vk::Device::null(), |device| device.handle())
    }

    #[inline]
    pub(crate) fn fence_fd_loader(&self) -> Option<&ash::khr::external_fence_fd::Device> {
        self.core().ok().and_then(|core| core.fence_fd.as_ref())
    }

    #[inline]
    pub fn compute_slot(&self) -> Option<&CommandSlot> {
        self.core().ok().map(|core| &core.compute)
    }

    #[inline]
    pub fn transfer_slot(&self) -> Option<&TransferSlot> {
        self.core().ok().map(|core| &core.transfer)
    }
}

// memory
impl ComputeDevice<'_> {
    /// memory type `id` 的 property flags
    pub fn memory_properties(&self, id: u32) -> DeviceResult<vk::MemoryPropertyFlags> {
        let result = self.core().and_then(|_| self.memory_table()).and_then(|table| {
            table.property_flags(id).ok_or(DeviceError::PreconditionViolation("memory type out of range"))
        });
        self.latch(result)
    }

    /// 为 buffer 或 image 选择 index 最小的兼容 memory type
    pub fn select_memory(
        &self,
        resource: impl Into<MemoryResource>,
        properties: vk::MemoryPropertyFlags,
    ) -> DeviceResult<u32> {
        let resource = resource.into();
        let result = self.core().and_then(|core| {
            let requirements = resource.requirements(&core.device);
            self.memory_table()?.select(requirements.memory_type_bits, properties)
        });
        self.latch(result)
    }

    /// 按照资源的 memory requirements 分配内存
    ///
    /// 不会将内存绑定到资源上，绑定和释放由调用者负责
    pub fn alloc(&self, resource: impl Into<MemoryResource>, memory_type_id: u32) -> DeviceResult<vk::DeviceMemory> {
        let resource = resource.into();
        let result = self.core().and_then(|core| {
            if self.memory_table()?.property_flags(memory_type_id).is_none() {
                return Err(DeviceError::PreconditionViolation("memory type out of range"));
            }
            let requirements = resource.requirements(&core.device);
            let alloc_info =
                vk::MemoryAllocateInfo::default().allocation_size(requirements.size).memory_type_index(memory_type_id);
            Ok(unsafe { core.device.allocate_memory(&alloc_info, None)? })
        });
        self.latch(result)
    }
}

// queues & commands
impl ComputeDevice<'_> {
    /// 只有 `i == 0` 是合法的
    pub fn compute_queue(&self, i: u32) -> DeviceResult<vk::Queue> {
        let result = self.queue(|families| families.compute_family_index, i);
        self.latch(result)
    }

    /// 只有 `i == 0` 是合法的
    pub fn transfer_queue(&self, i: u32) -> DeviceResult<vk::Queue> {
        let result = self.queue(|families| families.transfer_family_index, i);
        self.latch(result)
    }

    pub fn compute_cmd_pool(&self) -> DeviceResult<vk::CommandPool> {
        let result = self.core().map(|core| core.compute.pool());
        self.latch(result)
    }

    /// compute 的 primary buffer
    ///
    /// 如果之前的 buffer 已经被 `release_compute_cmd_buffer` 拿走，会重新分配一个
    pub fn compute_cmd_buffer(&mut self) -> DeviceResult<vk::CommandBuffer> {
        let result = self.core_mut().and_then(|core| core.compute.ensure_buffer(&core.device));
        self.latch(result)
    }

    /// 第一次调用时创建 transfer slot；没有独立的 transfer family 时返回 compute pool
    pub fn transfer_cmd_pool(&mut self) -> DeviceResult<vk::CommandPool> {
        let result = self.core_mut().and_then(DeviceCore::transfer_cmd_pool);
        self.latch(result)
    }

    /// 第一次调用时创建 transfer slot；没有独立的 transfer family 时返回 compute buffer
    pub fn transfer_cmd_buffer(&mut self) -> DeviceResult<vk::CommandBuffer> {
        let result = self.core_mut().and_then(DeviceCore::transfer_cmd_buffer);
        self.latch(result)
    }

    /// 拿走 compute 的 primary buffer，所有权交给调用者
    ///
    /// 通常用于提交之后由 fence 决定 buffer 的生命周期。之后需要 compute buffer 时会重新分配
    pub fn release_compute_cmd_buffer(&mut self) -> DeviceResult<vk::CommandBuffer> {
        let result = self.core_mut().and_then(|core| {
            let buffer = core.compute.ensure_buffer(&core.device)?;
            core.compute.take_buffer();
            Ok(buffer)
        });
        self.latch(result)
    }
}

// pipeline & tools
impl ComputeDevice<'_> {
    /// 创建只有一个 shader stage 的 compute pipeline
    ///
    /// `cache` 可以为 null；`flags` 可以携带 derivative pipeline 等创建信息
    pub fn create_pipeline(
        &self,
        layout: vk::PipelineLayout,
        cache: vk::PipelineCache,
        shader_stage: &vk::PipelineShaderStageCreateInfo,
        flags: vk::PipelineCreateFlags,
    ) -> DeviceResult<vk::Pipeline> {
        let result = self.core().and_then(|core| {
            let pipeline_ci = vk::ComputePipelineCreateInfo::default().flags(flags).layout(layout).stage(*shader_stage);
            let pipelines = unsafe {
                core.device
                    .create_compute_pipelines(cache, std::slice::from_ref(&pipeline_ci), None)
                    .map_err(|(_, e)| e)?
            };
            pipelines.first().copied().ok_or(DeviceError::Driver(vk::Result::ERROR_UNKNOWN))
        });
        self.latch(result)
    }

    /// instance 没有启用 debug utils 时什么都不做
    pub fn set_debug_name<T: vk::Handle>(&self, handle: T, name: &str) {
        if let Ok(core) = self.core() {
            core.set_debug_name(handle, name);
        }
    }

    pub fn wait_idle(&self) -> DeviceResult<()> {
        let result = self.core().and_then(|core| Ok(unsafe { core.device.device_wait_idle()? }));
        self.latch(result)
    }
}
