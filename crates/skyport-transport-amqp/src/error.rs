//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为编排引擎对外暴露的错误语义提供集中定义：构造、注册、状态超时、发送、处置与连接六类；
//! - 每个变体都映射到稳定的点分错误码，便于日志检索与告警聚合。
//!
//! ## 设计要求（What）
//! - 所有错误类型派生 `thiserror::Error`，消息使用英文；
//! - [`TransportError::status`] 把任意错误折叠为对外的三态结果 [`OperationStatus`]，供
//!   `SetOption` 与处置接口直接返回。
//!
//! ## 扩展建议（How）
//! - 新增变体时同步补充 `code()` 与 `status()` 的映射，并在单元测试中覆盖。

use std::time::Duration;

use skyport_core::{ClockError, CollaboratorError, ConfigError};
use thiserror::Error;

use crate::auth::PreferredAuthMode;
use crate::lifecycle::DeviceFault;

/// 对外三态结果。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum OperationStatus {
    /// 成功。
    Ok,
    /// 参数非法，调用方需要修正输入。
    InvalidArgument,
    /// 运行期失败。
    Error,
}

impl OperationStatus {
    /// 将操作结果折叠为三态。
    pub fn of<T>(result: &Result<T, TransportError>) -> Self {
        match result {
            Ok(_) => OperationStatus::Ok,
            Err(err) => err.status(),
        }
    }
}

/// 设备注册失败。
///
/// - **意图 (Why)**：注册失败必须完整回滚，错误需要说明是身份冲突、凭据形态不符还是协作方
///   拒绝创建设备会话；
/// - **契约 (What)**：返回该错误时注册表与认证模式均保持调用前状态。
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistrationError {
    /// 同名设备已注册。
    #[error("device `{device_id}` is already registered")]
    Duplicate {
        /// 设备标识。
        device_id: String,
    },
    /// 同时提供了对称密钥与 SAS 令牌。
    #[error("device `{device_id}` must provide either a symmetric key or a SAS token, not both")]
    ConflictingCredentials {
        /// 设备标识。
        device_id: String,
    },
    /// 凭据形态与传输已锁定的认证模式不兼容。
    #[error("credentials of device `{device_id}` are incompatible with {mode:?} authentication")]
    IncompatibleCredentials {
        /// 设备标识。
        device_id: String,
        /// 传输当前的认证模式。
        mode: PreferredAuthMode,
    },
    /// 协作方拒绝创建设备会话。
    #[error("failed to create session logic for device `{device_id}`: {source}")]
    DeviceCreation {
        /// 设备标识。
        device_id: String,
        /// 底层原因。
        source: CollaboratorError,
    },
    /// 默认参数无法复制到新设备。
    #[error("failed to replicate default options onto device `{device_id}`: {source}")]
    OptionReplication {
        /// 设备标识。
        device_id: String,
        /// 底层原因。
        source: CollaboratorError,
    },
}

/// 设备状态切换未能按时完成。
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StateTimeoutError {
    /// 在 Starting/Stopping 停留超过上限。
    #[error("device `{device_id}` stayed in {phase} for longer than {timeout:?}")]
    Exceeded {
        /// 设备标识。
        device_id: String,
        /// 停留的阶段。
        phase: &'static str,
        /// 允许的最长时间。
        timeout: Duration,
    },
    /// 无法读取时钟，按超时处理。
    #[error("device `{device_id}` state deadline could not be evaluated: {source}")]
    ClockUnavailable {
        /// 设备标识。
        device_id: String,
        /// 底层原因。
        source: ClockError,
    },
}

/// 出站事件发送失败。
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SendFailure {
    /// 协作方同步拒绝提交。
    #[error("device `{device_id}` rejected event submission: {source}")]
    Submission {
        /// 设备标识。
        device_id: String,
        /// 底层原因。
        source: CollaboratorError,
    },
    /// 连续发送完成失败达到阈值。
    #[error("device `{device_id}` reported {failures} consecutive failed send completions")]
    CompletionFailures {
        /// 设备标识。
        device_id: String,
        /// 连续失败次数。
        failures: u32,
    },
}

/// 入站处置失败。
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DispositionError {
    /// 消息未携带处置上下文。
    #[error("inbound message carries no disposition context")]
    MissingContext,
    /// 消息负载缺失。
    #[error("inbound message handle is missing")]
    MissingMessage,
    /// 上下文指向的设备已不在注册表中。
    #[error("device `{device_id}` of the disposition context is not registered")]
    UnknownDevice {
        /// 设备标识。
        device_id: String,
    },
    /// 协作方回传处置结果失败。
    #[error("device `{device_id}` failed to send disposition for delivery {delivery_id}: {source}")]
    Acknowledgment {
        /// 设备标识。
        device_id: String,
        /// 投递编号。
        delivery_id: u32,
        /// 底层原因。
        source: CollaboratorError,
    },
}

/// 共享连接相关失败。
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConnectionError {
    /// 尚未锁定认证模式，无法决定连接形态。
    #[error("connection cannot be established before an authentication mode is known")]
    AuthenticationModeUnset,
    /// 无法获得安全传输。
    #[error("failed to obtain a secure transport: {source}")]
    SecureTransport {
        /// 底层原因。
        source: CollaboratorError,
    },
    /// 协作方拒绝创建连接。
    #[error("failed to create the shared connection: {source}")]
    Creation {
        /// 底层原因。
        source: CollaboratorError,
    },
    /// 切换协议帧跟踪失败。
    #[error("failed to toggle connection tracing: {source}")]
    Logging {
        /// 底层原因。
        source: CollaboratorError,
    },
}

/// 编排引擎的顶层错误。
///
/// # 教案式说明
/// - **意图 (Why)**：对外接口统一返回该类型，调用方既可以按变体精确匹配，也可以只看
///   [`status`](Self::status) 的三态结果；
/// - **契约 (What)**：子错误通过 `#[from]` 自动提升，`?` 可直接传播；
/// - **风险 (Trade-offs)**：上下文使用 `String` 保存，牺牲少量堆分配换取易读性。
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// 构造参数非法。
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// 注册失败。
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    /// 状态切换超时。
    #[error(transparent)]
    StateTimeout(#[from] StateTimeoutError),
    /// 发送失败。
    #[error(transparent)]
    Send(#[from] SendFailure),
    /// 处置失败。
    #[error(transparent)]
    Disposition(#[from] DispositionError),
    /// 连接失败。
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    /// 句柄未注册。
    #[error("device handle {handle} is not registered")]
    UnknownDevice {
        /// 句柄编号。
        handle: u64,
    },
    /// 选项名或取值不被接受。
    #[error("option `{option}` rejected: {detail}")]
    InvalidOption {
        /// 选项名。
        option: String,
        /// 原因。
        detail: String,
    },
    /// 设备默认参数未能广播到全部设备；传输级默认值已更新。
    #[error("option `{option}` could not be applied to {failed} registered device(s)")]
    OptionPropagation {
        /// 选项名。
        option: String,
        /// 失败设备数量。
        failed: usize,
    },
    /// 设备生命周期中的协作方调用失败。
    #[error("device `{device_id}` lifecycle step failed: {source}")]
    Lifecycle {
        /// 设备标识。
        device_id: String,
        /// 底层原因。
        source: CollaboratorError,
    },
    /// 设备连续失败达到阈值，需要整连接重建。
    #[error("device `{device_id}` remained faulted ({fault:?}) after {failures} consecutive failures")]
    DeviceFaulted {
        /// 设备标识。
        device_id: String,
        /// 最近一次故障来源。
        fault: DeviceFault,
        /// 连续失败次数。
        failures: u32,
    },
    /// 设备协作方的其他调用失败（订阅、发送状态查询等）。
    #[error("device `{device_id}` collaborator call failed: {source}")]
    Collaborator {
        /// 设备标识。
        device_id: String,
        /// 底层原因。
        source: CollaboratorError,
    },
    /// 安全传输拒绝透传选项。
    #[error("secure transport rejected option `{option}`: {source}")]
    TransportOption {
        /// 选项名。
        option: String,
        /// 底层原因。
        source: CollaboratorError,
    },
}

impl TransportError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            TransportError::Config(ConfigError::MissingField { .. }) => {
                "transport.config.missing_field"
            }
            TransportError::Config(_) => "transport.config.invalid",
            TransportError::Registration(err) => match err {
                RegistrationError::Duplicate { .. } => "transport.registration.duplicate",
                RegistrationError::ConflictingCredentials { .. } => {
                    "transport.registration.conflicting_credentials"
                }
                RegistrationError::IncompatibleCredentials { .. } => {
                    "transport.registration.incompatible_credentials"
                }
                RegistrationError::DeviceCreation { .. } => "transport.registration.device_create",
                RegistrationError::OptionReplication { .. } => {
                    "transport.registration.option_replication"
                }
            },
            TransportError::StateTimeout(StateTimeoutError::Exceeded { .. }) => {
                "transport.device.state_timeout"
            }
            TransportError::StateTimeout(StateTimeoutError::ClockUnavailable { .. }) => {
                "transport.device.clock_unavailable"
            }
            TransportError::Send(SendFailure::Submission { .. }) => "transport.send.submission",
            TransportError::Send(SendFailure::CompletionFailures { .. }) => {
                "transport.send.completion_failures"
            }
            TransportError::Disposition(err) => match err {
                DispositionError::MissingContext => "transport.disposition.missing_context",
                DispositionError::MissingMessage => "transport.disposition.missing_message",
                DispositionError::UnknownDevice { .. } => "transport.disposition.unknown_device",
                DispositionError::Acknowledgment { .. } => "transport.disposition.ack_failed",
            },
            TransportError::Connection(err) => match err {
                ConnectionError::AuthenticationModeUnset => "transport.connection.auth_mode_unset",
                ConnectionError::SecureTransport { .. } => "transport.connection.secure_transport",
                ConnectionError::Creation { .. } => "transport.connection.create",
                ConnectionError::Logging { .. } => "transport.connection.logging",
            },
            TransportError::UnknownDevice { .. } => "transport.device.unknown",
            TransportError::InvalidOption { .. } => "transport.option.invalid",
            TransportError::OptionPropagation { .. } => "transport.option.propagation",
            TransportError::Lifecycle { .. } => "transport.device.lifecycle",
            TransportError::DeviceFaulted { .. } => "transport.device.faulted",
            TransportError::Collaborator { .. } => "transport.device.collaborator",
            TransportError::TransportOption { .. } => "transport.option.secure_transport",
        }
    }

    /// 折叠为对外三态结果。
    pub fn status(&self) -> OperationStatus {
        match self {
            TransportError::Config(_)
            | TransportError::InvalidOption { .. }
            | TransportError::UnknownDevice { .. }
            | TransportError::Registration(
                RegistrationError::Duplicate { .. }
                | RegistrationError::ConflictingCredentials { .. }
                | RegistrationError::IncompatibleCredentials { .. },
            )
            | TransportError::Disposition(
                DispositionError::MissingContext | DispositionError::MissingMessage,
            ) => OperationStatus::InvalidArgument,
            _ => OperationStatus::Error,
        }
    }

    pub(crate) fn lifecycle(device_id: &str, source: CollaboratorError) -> Self {
        TransportError::Lifecycle {
            device_id: device_id.to_owned(),
            source,
        }
    }

    pub(crate) fn collaborator(device_id: &str, source: CollaboratorError) -> Self {
        TransportError::Collaborator {
            device_id: device_id.to_owned(),
            source,
        }
    }
}
