//! # 设备生命周期状态机
//!
//! ## 核心意图（Why）
//! - 每个设备在共享连接打开后，由 Tick 逐一驱动：停止的设备被启动，卡在过渡态的设备接受
//!   超时检查，出错的设备被停止以便重试，已启动的设备排空出站队列；
//! - 失败在设备内部先行重试，连续失败达到阈值后由 Tick 升级为整连接重建，不存在“仅该设备
//!   永久失败”的终态。
//!
//! ## 状态机约束（What）
//! - 状态：`Stopped`（初始）、`Starting`、`Started`、`Stopping`、`Error`；三类协作方错误与本地
//!   超时、时钟失败都归入 `Error`，仅以 [`DeviceFault`] 区分来源；
//! - `Starting → Started` 只由协作方事件驱动，不存在轮询式晋升；
//! - 过渡态携带进入时刻，`None` 表示进入时读取时钟失败，届时按超时处理。
//!
//! ## 风险提示（Trade-offs）
//! - 协作方报告的状态是事实来源：即使跃迁不在预期图中也会被接受，只记录告警日志。

use std::time::Instant;

use skyport_core::Clock;
use skyport_core::collaborators::{Connection, ConnectionAuth, DeviceState};
use skyport_core::time::elapsed_since;
use tracing::{debug, warn};

use crate::device::DeviceEntry;
use crate::error::{StateTimeoutError, TransportError};

/// 进入 `Error` 的原因。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DeviceFault {
    /// 协作方报告认证失败。
    Auth,
    /// 协作方报告认证超时。
    AuthTimeout,
    /// 协作方报告消息链路失败。
    Messaging,
    /// 过渡态停留超过上限。
    StateTimeout,
    /// 无法读取时钟，按最坏情况处理。
    ClockUnavailable,
}

/// 对外可见的生命周期阶段（不含时间戳）。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DevicePhase {
    /// 已停止。
    Stopped,
    /// 启动中。
    Starting,
    /// 已启动。
    Started,
    /// 停止中。
    Stopping,
    /// 出错。
    Error(DeviceFault),
}

impl DevicePhase {
    /// 判断协作方报告的跃迁是否在预期状态图内。
    ///
    /// - **契约 (What)**：任意状态都允许跳入 `Error` 与 `Stopping`；`Stopped` 只能进入
    ///   `Starting`；`Starting` 可进入 `Started`；`Error` 只能回到 `Stopped`。
    pub fn can_transition_to(self, target: DevicePhase) -> bool {
        use DevicePhase::*;
        matches!(
            (self, target),
            (_, Error(_))
                | (_, Stopping)
                | (Stopped, Starting)
                | (Starting, Started)
                | (Starting, Stopped)
                | (Started, Stopped)
                | (Stopping, Stopped)
                | (Error(_), Stopped)
        )
    }
}

/// 设备生命周期状态，过渡态携带进入时刻。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Lifecycle {
    Stopped,
    Starting { since: Option<Instant> },
    Started,
    Stopping { since: Option<Instant> },
    Error(DeviceFault),
}

impl Lifecycle {
    /// 由协作方报告的状态构造；`at` 为记录时刻。
    pub(crate) fn from_reported(state: DeviceState, at: Option<Instant>) -> Self {
        match state {
            DeviceState::Stopped => Lifecycle::Stopped,
            DeviceState::Starting => Lifecycle::Starting { since: at },
            DeviceState::Started => Lifecycle::Started,
            DeviceState::Stopping => Lifecycle::Stopping { since: at },
            DeviceState::ErrorAuth => Lifecycle::Error(DeviceFault::Auth),
            DeviceState::ErrorAuthTimeout => Lifecycle::Error(DeviceFault::AuthTimeout),
            DeviceState::ErrorMessaging => Lifecycle::Error(DeviceFault::Messaging),
        }
    }

    pub(crate) fn phase(self) -> DevicePhase {
        match self {
            Lifecycle::Stopped => DevicePhase::Stopped,
            Lifecycle::Starting { .. } => DevicePhase::Starting,
            Lifecycle::Started => DevicePhase::Started,
            Lifecycle::Stopping { .. } => DevicePhase::Stopping,
            Lifecycle::Error(fault) => DevicePhase::Error(fault),
        }
    }
}

/// 两个相互独立的连续失败计数。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FailureCounters {
    /// 生命周期失败（启动失败、出错、发送管线失败）。
    pub lifecycle: u32,
    /// 发送完成失败。
    pub send_completion: u32,
}

impl FailureCounters {
    pub(crate) fn reset(&mut self) {
        *self = FailureCounters::default();
    }
}

/// 一次设备驱动所需的外部能力。
pub(crate) struct DriveContext<'a> {
    pub(crate) connection: &'a mut dyn Connection,
    pub(crate) auth: ConnectionAuth,
    pub(crate) clock: &'a dyn Clock,
    pub(crate) failure_threshold: u32,
}

impl DeviceEntry {
    /// 将协作方报告的状态变化应用到本地状态机。
    pub(crate) fn apply_reported_state(
        &mut self,
        previous: DeviceState,
        current: DeviceState,
        clock: &dyn Clock,
    ) {
        if previous == current {
            return;
        }
        let next = Lifecycle::from_reported(current, clock.now().ok());
        // 本地已先行记录同一阶段（例如发起启动时），保留原进入时刻。
        if next.phase() == self.lifecycle.phase() {
            return;
        }
        if !self.lifecycle.phase().can_transition_to(next.phase()) {
            warn!(
                device_id = %self.id(),
                from = ?self.lifecycle.phase(),
                to = ?next.phase(),
                "device reported an unexpected state transition"
            );
        }
        debug!(device_id = %self.id(), state = ?next.phase(), "device state changed");
        self.lifecycle = next;
    }

    /// 在连接打开时驱动一次设备。
    ///
    /// # 教案式注释
    /// - **意图 (Why)**：每个 Tick 对每个设备只评估一个分支，保证单设备的工作量有界；
    /// - **契约 (What)**：返回 `Err` 表示本 Tick 出现了生命周期失败；是否升级为整连接重建由
    ///   调用方依据 [`FailureCounters::lifecycle`] 与阈值判断；
    /// - **执行 (How)**：按当前状态选择分支，最后无条件调用协作方的 `do_work`（未启动时协作方
    ///   自行忽略）。
    pub(crate) fn drive(&mut self, ctx: &mut DriveContext<'_>) -> Result<(), TransportError> {
        let outcome = match self.lifecycle {
            Lifecycle::Stopped => self.start(ctx),
            Lifecycle::Starting { since } => self.check_deadline("starting", since, ctx.clock),
            Lifecycle::Stopping { since } => self.check_deadline("stopping", since, ctx.clock),
            Lifecycle::Error(fault) => self.recover(fault, ctx.failure_threshold),
            Lifecycle::Started => match self.send_pending() {
                Ok(()) => {
                    self.failures.lifecycle = 0;
                    Ok(())
                }
                Err(err) => {
                    self.failures.lifecycle += 1;
                    Err(err.into())
                }
            },
        };
        self.device_mut().do_work();
        outcome
    }

    fn start(&mut self, ctx: &mut DriveContext<'_>) -> Result<(), TransportError> {
        let result = self.try_start(ctx);
        if result.is_err() {
            self.failures.lifecycle += 1;
        }
        result
    }

    fn try_start(&mut self, ctx: &mut DriveContext<'_>) -> Result<(), TransportError> {
        let session = ctx
            .connection
            .session_handle()
            .map_err(|source| TransportError::lifecycle(self.id(), source))?;
        let security = if ctx.auth.uses_cbs() {
            let handle = ctx
                .connection
                .security_handle()
                .map_err(|source| TransportError::lifecycle(self.id(), source))?;
            Some(handle)
        } else {
            None
        };
        let id = self.id_arc();
        self.device_mut()
            .start_async(session, security)
            .map_err(|source| TransportError::lifecycle(&id, source))?;
        self.lifecycle = Lifecycle::Starting {
            since: ctx.clock.now().ok(),
        };
        debug!(device_id = %id, "device start requested");
        Ok(())
    }

    fn check_deadline(
        &mut self,
        phase: &'static str,
        since: Option<Instant>,
        clock: &dyn Clock,
    ) -> Result<(), TransportError> {
        match elapsed_since(clock, since) {
            Err(source) => {
                self.lifecycle = Lifecycle::Error(DeviceFault::ClockUnavailable);
                Err(StateTimeoutError::ClockUnavailable {
                    device_id: self.id().to_owned(),
                    source,
                }
                .into())
            }
            Ok(elapsed) if elapsed >= self.max_state_change => {
                self.lifecycle = Lifecycle::Error(DeviceFault::StateTimeout);
                Err(StateTimeoutError::Exceeded {
                    device_id: self.id().to_owned(),
                    phase,
                    timeout: self.max_state_change,
                }
                .into())
            }
            Ok(_) => Ok(()),
        }
    }

    fn recover(&mut self, fault: DeviceFault, threshold: u32) -> Result<(), TransportError> {
        self.failures.lifecycle += 1;
        warn!(
            device_id = %self.id(),
            ?fault,
            failures = self.failures.lifecycle,
            "device is in error state"
        );
        if self.failures.lifecycle >= threshold {
            return Err(TransportError::DeviceFaulted {
                device_id: self.id().to_owned(),
                fault,
                failures: self.failures.lifecycle,
            });
        }
        let id = self.id_arc();
        self.device_mut()
            .stop()
            .map_err(|source| TransportError::lifecycle(&id, source))
    }
}
