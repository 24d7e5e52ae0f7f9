use std::sync::Arc;

use bytes::Bytes;

use crate::error::CollaboratorError;
use crate::message::{DeliveryOutcome, SendConfirmation};
use crate::options::OptionValue;

use super::connection::{SecurityHandle, SessionHandle};
use super::events::{DeviceEvent, EventInbox};

/// 设备会话自身报告的状态。
///
/// - **契约 (What)**：三个错误状态在编排层的升级策略中被同等对待，但保留区分以便日志定位。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DeviceState {
    /// 已停止。
    Stopped,
    /// 启动中。
    Starting,
    /// 已启动，可以收发消息。
    Started,
    /// 停止中。
    Stopping,
    /// 认证失败。
    ErrorAuth,
    /// 认证超时。
    ErrorAuthTimeout,
    /// 消息链路失败。
    ErrorMessaging,
}

/// 协作方报告的发送完成原因。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SendResult {
    /// 云端确认。
    Ok,
    /// 无法序列化。
    CannotParse,
    /// 发送失败。
    FailSending,
    /// 超时。
    Timeout,
    /// 设备在完成前被销毁。
    DeviceDestroyed,
    /// 未知原因。
    Unknown,
}

impl From<SendResult> for SendConfirmation {
    fn from(result: SendResult) -> Self {
        match result {
            SendResult::Ok => SendConfirmation::Ok,
            SendResult::CannotParse | SendResult::FailSending | SendResult::Unknown => {
                SendConfirmation::Error
            }
            SendResult::Timeout => SendConfirmation::Timeout,
            SendResult::DeviceDestroyed => SendConfirmation::DestroyedDuringTeardown,
        }
    }
}

/// 提交出站事件时分配的令牌，完成通知以此回指事件。
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SubmissionToken(u64);

impl SubmissionToken {
    /// 以原始编号构造。
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// 原始编号。
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// 设备发送通道是否空闲。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SendStatus {
    /// 没有待发送或在途事件。
    Idle,
    /// 仍有待发送或在途事件。
    Busy,
}

/// 设备使用的凭据。
#[derive(Clone, Eq, PartialEq)]
pub enum DeviceAuth {
    /// 对称密钥，由设备会话自行生成 SAS 令牌。
    SymmetricKey(String),
    /// 预先计算好的 SAS 令牌。
    SasToken(String),
    /// X.509 证书，凭据位于安全传输层。
    X509,
}

impl DeviceAuth {
    /// 是否通过 CBS 令牌交换认证。
    pub fn uses_claims(&self) -> bool {
        !matches!(self, DeviceAuth::X509)
    }
}

impl std::fmt::Debug for DeviceAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 凭据原文不得进入日志。
        let kind = match self {
            DeviceAuth::SymmetricKey(_) => "SymmetricKey(..)",
            DeviceAuth::SasToken(_) => "SasToken(..)",
            DeviceAuth::X509 => "X509",
        };
        f.write_str(kind)
    }
}

/// 创建设备会话所需的配置。
#[derive(Clone, Debug)]
pub struct DeviceConfig {
    /// 设备标识。
    pub device_id: Arc<str>,
    /// 目标主机名。
    pub host: Arc<str>,
    /// 凭据。
    pub auth: DeviceAuth,
    /// 设备事件的投递目标。
    pub events: EventInbox<DeviceEvent>,
}

/// 设备收到的一次入站投递。
#[derive(Clone, Debug, PartialEq)]
pub struct InboundDelivery {
    /// 消息负载。
    pub payload: Bytes,
    /// 投递链路名。
    pub link_name: String,
    /// 投递编号。
    pub delivery_id: u32,
}

/// 入站投递的即时处置。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ReceiveOutcome {
    /// 已交给应用，处置结果稍后通过 `send_disposition` 回传。
    Deferred,
    /// 未能交给应用，投递应立即以“已释放”结束。
    Released,
}

/// 设备会话收到入站投递时调用的处理器。
pub type InboundHandler = Box<dyn FnMut(InboundDelivery) -> ReceiveOutcome + Send>;

/// 单个设备的协议会话逻辑（链路、会话生命周期、消息传输）。
///
/// # 教案式说明
/// - **意图 (Why)**：编排层只负责“何时启动、何时停止、何时提交”，链路层细节留给实现；
/// - **契约 (What)**：
///   - 所有方法同步返回，真正的进展在 `do_work` 中增量推进；
///   - `start_async` 接受后，状态变化通过 [`DeviceEvent::StateChanged`] 通知；
///   - `send_event_async` 接受后，必须且只能对该令牌发出一次 [`DeviceEvent::SendCompleted`]；
///   - 实例被丢弃即视为销毁，实现可以在 `Drop` 中为在途事件发出 `DeviceDestroyed` 完成通知。
pub trait Device: Send {
    /// 在给定会话（以及可选 CBS 通道）上异步启动。
    fn start_async(
        &mut self,
        session: SessionHandle,
        security: Option<SecurityHandle>,
    ) -> Result<(), CollaboratorError>;

    /// 停止设备。
    fn stop(&mut self) -> Result<(), CollaboratorError>;

    /// 提交一个出站事件。
    fn send_event_async(
        &mut self,
        token: SubmissionToken,
        payload: Bytes,
    ) -> Result<(), CollaboratorError>;

    /// 订阅入站消息。
    fn subscribe_messages(&mut self, handler: InboundHandler) -> Result<(), CollaboratorError>;

    /// 取消入站消息订阅。
    fn unsubscribe_messages(&mut self) -> Result<(), CollaboratorError>;

    /// 查询发送通道状态。
    fn send_status(&self) -> Result<SendStatus, CollaboratorError>;

    /// 设置设备级选项。
    fn set_option(&mut self, name: &str, value: &OptionValue) -> Result<(), CollaboratorError>;

    /// 回传某次入站投递的处置结果。
    fn send_disposition(
        &mut self,
        link_name: &str,
        delivery_id: u32,
        outcome: DeliveryOutcome,
    ) -> Result<(), CollaboratorError>;

    /// 推进一次增量协议工作，不得阻塞。
    fn do_work(&mut self);
}

/// 设备会话工厂。
pub trait DeviceFactory: Send {
    /// 按配置创建设备会话。
    fn create(&self, config: DeviceConfig) -> Result<Box<dyn Device>, CollaboratorError>;
}
