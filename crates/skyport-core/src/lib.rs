#![deny(unsafe_code)]

//! # skyport-core
//!
//! ## 定位与职责（Why）
//! - 为“单连接复用多设备会话”的传输编排引擎提供稳定的协作方契约：连接、设备会话、
//!   安全传输与 Hub 客户端回调均以 trait 形式声明，编排层只依赖这些抽象；
//! - 集中维护编排层与协作方之间共享的词汇（选项名、出站事件、处置上下文、时钟），
//!   避免各实现各自定义导致语义漂移。
//!
//! ## 架构嵌入（Where）
//! - `collaborators`：协作方 trait 与其配置、事件类型；
//! - `config`：可经 TOML 装载的传输配置与设备默认参数；
//! - `error`：协作方失败的统一错误形态；
//! - `message`：出站事件队列、发送确认、入站消息与处置上下文；
//! - `options`：选项名常量、选项值与安全传输选项快照；
//! - `time`：可注入时钟，测试中以 [`MockClock`](time::MockClock) 复现超时路径。
//!
//! ## 设计取舍（Trade-offs）
//! - 本 crate 不含任何编排逻辑，也不引入日志门面；所有副作用均留给上层决定。

pub mod collaborators;
pub mod config;
pub mod error;
pub mod message;
pub mod options;
pub mod time;

pub use config::{ConfigError, DeviceDefaults, TransportConfig};
pub use error::{CollaboratorError, ErrorCategory};
pub use message::{
    CompletionCallback, DeliveryOutcome, DispositionContext, EventQueue, InboundMessage,
    MessageVerdict, OutboundEvent, SendConfirmation,
};
pub use options::{DeviceTunable, OptionSet, OptionValue, TransportOption};
pub use time::{Clock, ClockError, MockClock, SystemClock};
