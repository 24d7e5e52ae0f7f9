#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]
#![doc = "skyport-transport-amqp: 单连接多设备复用的 AMQP 传输编排引擎。"]
#![doc = ""]
#![doc = "== 执行模型 =="]
#![doc = "引擎完全由外部串行调用驱动：`tick` 推进协议进度，注册、注销、选项、订阅与处置在 Tick 之外同步执行；内部不创建线程，也不阻塞。"]
#![doc = "协作方（连接、设备会话、安全传输、Hub 客户端）的契约定义在 `skyport-core`，本 crate 只负责编排。"]

//! ## 模块地图（Where）
//! - `auth`：认证模式锁定与凭据形态校验；
//! - `registry`：设备注册表与稳定句柄；
//! - `lifecycle`：设备生命周期状态机与失败升级；
//! - `pipeline`：出站事件的有序提交与完成映射；
//! - `disposition`：入站消息的处置上下文与意见回传；
//! - `options`：设备默认参数的复制与广播；
//! - `connection` / `tls_cache`：共享连接的建立、观察、重建与 TLS 选项快照；
//! - `transport`：对外入口 [`AmqpTransport`]。

mod auth;
mod connection;
mod device;
mod disposition;
mod error;
mod lifecycle;
mod options;
mod pipeline;
mod registry;
mod tls_cache;
mod transport;

pub use auth::{DeviceRegistration, PreferredAuthMode};
pub use error::{
    ConnectionError, DispositionError, OperationStatus, RegistrationError, SendFailure,
    StateTimeoutError, TransportError,
};
pub use lifecycle::{DeviceFault, DevicePhase, FailureCounters};
pub use registry::DeviceHandle;
pub use transport::{AmqpTransport, Collaborators, RetryPolicy};
