//! # collaborators：编排层消费的外部协作方契约
//!
//! ## 核心意图（Why）
//! - 协议帧编解码、CBS 令牌交换、TLS 协商都不属于编排层；编排层只通过本模块声明的 trait
//!   驱动它们，所有调用都是同步、立即返回的；
//! - 协作方的异步通知（连接状态变化、设备状态变化、发送完成）不再以“函数指针 + 不透明上下文”
//!   回调，而是作为类型化事件推入 [`EventInbox`]，由编排层在 Tick 内排空处理。
//!
//! ## 架构定位（Where）
//! - `secure_transport`：安全传输及其工厂；
//! - `connection`：共享连接及其工厂；
//! - `device`：设备会话及其工厂；
//! - `hub`：把入站消息交给应用的 Hub 客户端回调；
//! - `events`：事件收件箱与事件枚举。
//!
//! ## 风险提示（Trade-offs）
//! - 事件在下一次排空前不会被观察到，状态变化的可见性因此滞后至多一个 Tick；
//!   这与轮询驱动模型的节拍一致。

mod connection;
mod device;
mod events;
mod hub;
mod secure_transport;

pub use connection::{
    Connection, ConnectionAuth, ConnectionConfig, ConnectionFactory, ConnectionState,
    SecurityHandle, SessionHandle,
};
pub use device::{
    Device, DeviceAuth, DeviceConfig, DeviceFactory, DeviceState, InboundDelivery,
    InboundHandler, ReceiveOutcome, SendResult, SendStatus, SubmissionToken,
};
pub use events::{ConnectionEvent, DeviceEvent, EventInbox};
pub use hub::HubClientSink;
pub use secure_transport::{SecureTransport, SecureTransportFactory, SharedSecureTransport};
