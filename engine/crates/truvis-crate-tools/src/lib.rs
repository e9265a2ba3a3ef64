//! Truvis 工具集
//!
//! 目前只提供日志初始化，供各个 crate 的 bin 和测试共享。

pub mod init_log;
