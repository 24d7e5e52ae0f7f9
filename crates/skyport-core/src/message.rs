//! # message 模块
//!
//! ## 核心意图（Why）
//! - 出站：应用把事件放入每设备一份的 [`EventQueue`]，编排层在设备就绪后按 FIFO 顺序取出
//!   提交，并在协作方确认后以 [`SendConfirmation`] 回调应用；
//! - 入站：设备收到云端消息后，编排层为其附加 [`DispositionContext`]，打包为
//!   [`InboundMessage`] 交给应用；应用稍后以 [`MessageVerdict`] 决定处置结果。
//!
//! ## 行为契约（What）
//! - [`OutboundEvent::complete`] 消费事件本身：回调至多执行一次，负载随事件一起释放一次；
//! - [`EventQueue`] 可克隆，克隆体共享同一队列，应用与编排层各持一份；
//! - [`InboundMessage`] 的两个部分都是可选的，缺失任一部分的处置请求会被判为参数非法。

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

/// 应用可见的发送结果。
///
/// - **契约 (What)**：协作方的完成原因被归约为四种；除 `Ok` 与 `DestroyedDuringTeardown`
///   之外的结果都计入设备的发送完成失败计数。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SendConfirmation {
    /// 云端已确认。
    Ok,
    /// 发送失败（含序列化失败与一般发送失败）。
    Error,
    /// 发送超时。
    Timeout,
    /// 设备或传输在事件完成前被拆除。
    DestroyedDuringTeardown,
}

impl SendConfirmation {
    /// 是否计入发送完成失败计数。
    pub fn counts_as_failure(self) -> bool {
        !matches!(
            self,
            SendConfirmation::Ok | SendConfirmation::DestroyedDuringTeardown
        )
    }
}

/// 发送完成回调；闭包捕获的状态即调用方上下文。
pub type CompletionCallback = Box<dyn FnOnce(SendConfirmation) + Send + 'static>;

/// 等待提交的出站事件。
///
/// # 教案式说明
/// - **意图 (Why)**：负载与完成回调必须一起移动、一起释放，拆成两个集合容易出现“回调执行了
///   但负载泄漏”或“负载释放两次”；
/// - **契约 (What)**：`payload` 采用 [`Bytes`]，提交给协作方时仅克隆引用计数；回调可选。
pub struct OutboundEvent {
    payload: Bytes,
    callback: Option<CompletionCallback>,
}

impl OutboundEvent {
    /// 构造没有回调的事件。
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            callback: None,
        }
    }

    /// 附加完成回调。
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(SendConfirmation) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// 负载。
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// 是否携带回调。
    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    /// 以给定结果完成事件：回调（若存在）执行一次，随后负载被释放。
    pub fn complete(self, confirmation: SendConfirmation) {
        let OutboundEvent { payload, callback } = self;
        if let Some(callback) = callback {
            callback(confirmation);
        }
        drop(payload);
    }
}

impl fmt::Debug for OutboundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundEvent")
            .field("payload_len", &self.payload.len())
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

/// 每设备一份的出站 FIFO 队列。
///
/// - **意图 (Why)**：应用线程负责入队，编排层在 Tick 中出队，双方需要共享同一份队列；
/// - **契约 (What)**：严格保持入队顺序；克隆体共享底层存储。
#[derive(Clone, Default)]
pub struct EventQueue {
    inner: Arc<Mutex<VecDeque<OutboundEvent>>>,
}

impl EventQueue {
    /// 创建空队列。
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加到队尾。
    pub fn push(&self, event: OutboundEvent) {
        self.inner.lock().push_back(event);
    }

    /// 取出队首。
    pub fn pop_front(&self) -> Option<OutboundEvent> {
        self.inner.lock().pop_front()
    }

    /// 一次性取出全部事件，保持顺序。
    pub fn drain(&self) -> Vec<OutboundEvent> {
        self.inner.lock().drain(..).collect()
    }

    /// 当前长度。
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// 是否为空。
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("len", &self.len())
            .finish()
    }
}

/// 入站投递的处置上下文。
///
/// # 教案式说明
/// - **意图 (Why)**：处置结果最终要回到“哪个设备、哪条链路、哪一次投递”，上下文在收到消息
///   时生成并随消息一起流转；
/// - **契约 (What)**：按值消费，至多被解析一次。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DispositionContext {
    device_id: Arc<str>,
    link_name: String,
    delivery_id: u32,
}

impl DispositionContext {
    /// 构造上下文。
    pub fn new(device_id: Arc<str>, link_name: impl Into<String>, delivery_id: u32) -> Self {
        Self {
            device_id,
            link_name: link_name.into(),
            delivery_id,
        }
    }

    /// 所属设备标识。
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// 投递链路名。
    pub fn link_name(&self) -> &str {
        &self.link_name
    }

    /// 投递编号。
    pub fn delivery_id(&self) -> u32 {
        self.delivery_id
    }
}

/// 交给应用的入站消息。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InboundMessage {
    payload: Option<Bytes>,
    context: Option<DispositionContext>,
}

impl InboundMessage {
    /// 以负载与上下文构造消息；两者都允许缺失。
    pub fn new(payload: Option<Bytes>, context: Option<DispositionContext>) -> Self {
        Self { payload, context }
    }

    /// 负载。
    pub fn payload(&self) -> Option<&Bytes> {
        self.payload.as_ref()
    }

    /// 处置上下文。
    pub fn context(&self) -> Option<&DispositionContext> {
        self.context.as_ref()
    }

    /// 拆分为负载与上下文。
    pub fn into_parts(self) -> (Option<Bytes>, Option<DispositionContext>) {
        (self.payload, self.context)
    }
}

/// 应用给出的处置意见。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MessageVerdict {
    /// 接受。
    Accepted,
    /// 放弃，允许云端重新投递。
    Abandoned,
    /// 拒绝。
    Rejected,
}

/// 协议层投递结果。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DeliveryOutcome {
    /// 已接受。
    Accepted,
    /// 已释放。
    Released,
    /// 已拒绝。
    Rejected,
}

impl From<MessageVerdict> for DeliveryOutcome {
    fn from(verdict: MessageVerdict) -> Self {
        match verdict {
            MessageVerdict::Accepted => DeliveryOutcome::Accepted,
            MessageVerdict::Abandoned => DeliveryOutcome::Released,
            MessageVerdict::Rejected => DeliveryOutcome::Rejected,
        }
    }
}
