use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::CollaboratorError;
use crate::options::{OptionSet, OptionValue};

/// 底层加密字节流提供者（通常为 TLS）。
///
/// # 教案式说明
/// - **意图 (Why)**：编排层从不接触握手细节，只需要三种能力：设置单个选项、导出当前选项快照、
///   把旧快照整体回放到新实例上；
/// - **契约 (What)**：`retrieve_options` 返回的快照必须可以被同类实现的 `feed_options` 接受；
///   实例被丢弃即视为销毁。
pub trait SecureTransport: Send {
    /// 设置单个选项。
    fn set_option(&mut self, name: &str, value: &OptionValue) -> Result<(), CollaboratorError>;

    /// 导出当前全部选项。
    fn retrieve_options(&self) -> Result<OptionSet, CollaboratorError>;

    /// 回放一份选项快照。
    fn feed_options(&mut self, options: &OptionSet) -> Result<(), CollaboratorError>;
}

/// 连接与编排层共同持有的安全传输句柄。
pub type SharedSecureTransport = Arc<Mutex<Box<dyn SecureTransport>>>;

/// 安全传输工厂，按目标主机名创建新实例。
pub trait SecureTransportFactory: Send {
    /// 为 `host` 创建新的安全传输。
    fn create(&self, host: &str) -> Result<Box<dyn SecureTransport>, CollaboratorError>;
}
