use std::sync::Arc;

use crate::error::CollaboratorError;

use super::events::{ConnectionEvent, EventInbox};
use super::secure_transport::SharedSecureTransport;

/// 共享连接的生命周期状态。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ConnectionState {
    /// 已创建但尚未打开，或已关闭。
    Closed,
    /// 已打开，设备可以在其会话上工作。
    Opened,
    /// 连接出错；这是整连接重建的唯一触发条件。
    Error,
}

/// 连接建立时选择的认证形态。
///
/// - `Claims`：创建 SASL 层与 CBS 令牌交换通道；
/// - `Certificate`：两者都不创建，依赖 TLS 客户端证书。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ConnectionAuth {
    /// 基于声明（CBS）的令牌认证。
    Claims,
    /// 基于 X.509 证书的认证。
    Certificate,
}

impl ConnectionAuth {
    /// 是否需要 SASL 层。
    pub fn uses_sasl(self) -> bool {
        matches!(self, ConnectionAuth::Claims)
    }

    /// 是否需要 CBS 通道。
    pub fn uses_cbs(self) -> bool {
        matches!(self, ConnectionAuth::Claims)
    }
}

/// 创建共享连接所需的配置。
#[derive(Clone)]
pub struct ConnectionConfig {
    /// 目标主机名。
    pub host: Arc<str>,
    /// 连接底层使用的安全传输。
    pub transport: SharedSecureTransport,
    /// 认证形态。
    pub auth: ConnectionAuth,
    /// 协议帧跟踪开关初始值。
    pub trace: bool,
    /// 连接状态变化通知的投递目标。
    pub events: EventInbox<ConnectionEvent>,
}

/// 会话句柄，由连接签发，交给设备启动使用。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SessionHandle(u64);

impl SessionHandle {
    /// 以原始编号构造。
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// 原始编号。
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// CBS 安全通道句柄。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SecurityHandle(u64);

impl SecurityHandle {
    /// 以原始编号构造。
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// 原始编号。
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// 所有设备复用的共享连接。
///
/// # 教案式说明
/// - **意图 (Why)**：连接的协议进展（打开、心跳、关闭）以增量方式在 `do_work` 中推进；
///   编排层只在需要时索取会话与安全句柄；
/// - **契约 (What)**：
///   - `session_handle` / `security_handle` 可能在连接未就绪时失败；
///   - 状态变化通过构造时传入的 [`EventInbox`] 通知；
///   - 实例被丢弃即视为销毁。
pub trait Connection: Send {
    /// 获取会话句柄。
    fn session_handle(&mut self) -> Result<SessionHandle, CollaboratorError>;

    /// 获取 CBS 安全通道句柄。
    fn security_handle(&mut self) -> Result<SecurityHandle, CollaboratorError>;

    /// 切换协议帧跟踪。
    fn set_logging(&mut self, enabled: bool) -> Result<(), CollaboratorError>;

    /// 推进一次增量协议工作，不得阻塞。
    fn do_work(&mut self);
}

/// 共享连接工厂。
pub trait ConnectionFactory: Send {
    /// 按配置创建连接。
    fn create(&self, config: ConnectionConfig) -> Result<Box<dyn Connection>, CollaboratorError>;
}
