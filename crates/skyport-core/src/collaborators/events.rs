use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::connection::ConnectionState;
use super::device::{DeviceState, SendResult, SubmissionToken};

/// 协作方事件收件箱。
///
/// # 教案式说明
/// - **意图 (Why)**：协作方在 `do_work`、`stop` 乃至 `Drop` 期间都可能产生通知，而此时编排层
///   正持有对自身状态的可变借用；先入箱、后排空可以避免重入；
/// - **契约 (What)**：克隆体共享同一队列；`drain` 按推入顺序返回并清空；
/// - **风险 (Trade-offs)**：内部使用 `parking_lot::Mutex`，协作方即使在其他线程推入事件也安全，
///   但编排层本身仍是单调用者模型。
pub struct EventInbox<E> {
    inner: Arc<Mutex<VecDeque<E>>>,
}

impl<E> EventInbox<E> {
    /// 创建空收件箱。
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// 推入一条事件。
    pub fn emit(&self, event: E) {
        self.inner.lock().push_back(event);
    }

    /// 取出全部事件。
    pub fn drain(&self) -> Vec<E> {
        self.inner.lock().drain(..).collect()
    }

    /// 是否没有待处理事件。
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl<E> Clone for EventInbox<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> Default for EventInbox<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventInbox<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventInbox")
            .field("pending", &self.inner.lock().len())
            .finish()
    }
}

/// 共享连接产生的事件。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionEvent {
    /// 连接状态变化。
    StateChanged {
        /// 变化前状态。
        previous: ConnectionState,
        /// 变化后状态。
        current: ConnectionState,
    },
}

/// 设备会话产生的事件。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeviceEvent {
    /// 设备状态变化。
    StateChanged {
        /// 变化前状态。
        previous: DeviceState,
        /// 变化后状态。
        current: DeviceState,
    },
    /// 已提交事件的发送完成通知。
    SendCompleted {
        /// 提交时分配的令牌。
        token: SubmissionToken,
        /// 协作方给出的完成原因。
        result: SendResult,
    },
}
