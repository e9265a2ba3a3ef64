pub mod debug_messenger;
pub mod feature_probe;
pub mod init_info;
pub mod instance;
pub mod memory;
pub mod physical_device;
pub mod queue_family;
