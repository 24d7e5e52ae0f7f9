//! # DeviceEntry：注册表中的单个设备条目
//!
//! ## 核心意图（Why）
//! - 把一个设备在编排层所需的全部状态收拢在一处：协作方会话、出站队列、在途事件、生命周期、
//!   两个失败计数与入站订阅；
//! - 条目不持有指回传输的引用，Tick 在驱动时以参数形式提供连接与时钟。
//!
//! ## 行为契约（What）
//! - 条目必须先从注册表移除，再调用 [`DeviceEntry::teardown`] 释放资源；
//! - `teardown` 保证：已提交事件恰好获得一次完成回调，尚未提交的事件以
//!   `DestroyedDuringTeardown` 完成。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use skyport_core::collaborators::{
    ConnectionAuth, Device, DeviceEvent, EventInbox, HubClientSink, SendStatus, SubmissionToken,
};
use skyport_core::{Clock, CollaboratorError, EventQueue, OutboundEvent, SendConfirmation};
use tracing::{debug, warn};

use crate::lifecycle::{FailureCounters, Lifecycle};

/// 入站订阅状态。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Subscription {
    Inactive,
    Active,
}

pub(crate) struct DeviceEntry {
    id: Arc<str>,
    auth: ConnectionAuth,
    device: Box<dyn Device>,
    events: EventInbox<DeviceEvent>,
    pub(crate) queue: EventQueue,
    pub(crate) in_flight: BTreeMap<SubmissionToken, OutboundEvent>,
    next_token: u64,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) failures: FailureCounters,
    pub(crate) max_state_change: Duration,
    pub(crate) sink: Arc<dyn HubClientSink>,
    pub(crate) subscription: Subscription,
}

impl DeviceEntry {
    pub(crate) fn new(
        id: Arc<str>,
        auth: ConnectionAuth,
        device: Box<dyn Device>,
        events: EventInbox<DeviceEvent>,
        queue: EventQueue,
        sink: Arc<dyn HubClientSink>,
        max_state_change: Duration,
    ) -> Self {
        Self {
            id,
            auth,
            device,
            events,
            queue,
            in_flight: BTreeMap::new(),
            next_token: 0,
            lifecycle: Lifecycle::Stopped,
            failures: FailureCounters::default(),
            max_state_change,
            sink,
            subscription: Subscription::Inactive,
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn id_arc(&self) -> Arc<str> {
        Arc::clone(&self.id)
    }

    /// 设备凭据对应的认证形态。
    pub(crate) fn auth(&self) -> ConnectionAuth {
        self.auth
    }

    pub(crate) fn device_mut(&mut self) -> &mut dyn Device {
        self.device.as_mut()
    }

    pub(crate) fn allocate_token(&mut self) -> SubmissionToken {
        let token = SubmissionToken::new(self.next_token);
        self.next_token = self.next_token.wrapping_add(1);
        token
    }

    /// 排空协作方事件收件箱。
    pub(crate) fn process_events(&mut self, clock: &dyn Clock) {
        for event in self.events.drain() {
            match event {
                DeviceEvent::StateChanged { previous, current } => {
                    self.apply_reported_state(previous, current, clock);
                }
                DeviceEvent::SendCompleted { token, result } => {
                    self.on_send_completed(token, result.into());
                }
            }
        }
    }

    /// 发送通道状态：本地仍有待发送或在途事件即为忙。
    pub(crate) fn send_status(&self) -> Result<SendStatus, CollaboratorError> {
        if !self.queue.is_empty() || !self.in_flight.is_empty() {
            return Ok(SendStatus::Busy);
        }
        self.device.send_status()
    }

    /// 重连前的设备清理：非停止态的设备被停止（尽力而为），失败计数清零。
    pub(crate) fn prepare_for_retry(&mut self) {
        if self.lifecycle != Lifecycle::Stopped {
            if let Err(err) = self.device.stop() {
                warn!(device_id = %self.id, error = %err, "failed to stop device while preparing for connection retry");
            }
        }
        self.failures.reset();
    }

    /// 释放条目资源；调用前条目必须已从注册表移除。
    ///
    /// # 教案式注释
    /// - **执行 (How)**：
    ///   1. 先处理收件箱中已到达的完成通知；
    ///   2. 丢弃协作方会话，实现可在 `Drop` 中为在途事件补发完成通知，随后再次排空；
    ///   3. 仍在途的事件以 `DestroyedDuringTeardown` 完成；
    ///   4. 队列中尚未提交的事件同样以 `DestroyedDuringTeardown` 完成。
    pub(crate) fn teardown(mut self, clock: &dyn Clock) {
        self.process_events(clock);
        let DeviceEntry {
            id,
            device,
            events,
            queue,
            mut in_flight,
            ..
        } = self;
        drop(device);

        for event in events.drain() {
            if let DeviceEvent::SendCompleted { token, result } = event {
                if let Some(pending) = in_flight.remove(&token) {
                    pending.complete(result.into());
                }
            }
        }

        let abandoned = in_flight.len();
        for (_, pending) in in_flight {
            pending.complete(SendConfirmation::DestroyedDuringTeardown);
        }
        let queued = queue.drain();
        let unsent = queued.len();
        for pending in queued {
            pending.complete(SendConfirmation::DestroyedDuringTeardown);
        }
        debug!(device_id = %id, abandoned, unsent, "device torn down");
    }
}
