use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;

/// 读取时钟失败。
///
/// - **意图 (Why)**：超时判定必须对“时间不可得”保持悲观，调用方需要一个可区分的错误；
/// - **契约 (What)**：`reason` 为人类可读原因。
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("clock unavailable: {reason}")]
pub struct ClockError {
    reason: String,
}

impl ClockError {
    /// 以原因构造错误。
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// 失败原因。
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// 抽象可注入的时钟，统一“获取当前时间”的能力。
///
/// # 设计背景（Why）
/// - 设备状态切换超时以挂钟时间在每次 Tick 时重新采样，若直接调用系统时钟，测试将无法
///   复现“恰好超时”的边界；
/// - 通过 trait 注入时钟，生产环境使用真实时间，测试中使用可控的虚拟时间。
///
/// # 接口约束（What）
/// - `now`：返回当前单调时间点；失败时返回 [`ClockError`]，调用方必须按最坏情况处理；
/// - 实现者必须保证成功返回的时间点单调不减。
///
/// # 使用指引（How）
/// - 推荐通过 `Arc<dyn Clock>` 传递给需要时间能力的组件；
/// - 测试场景可注入 [`MockClock`] 并调用其 `advance` 方法推进时间。
pub trait Clock: Send + Sync + 'static {
    /// 返回当前的单调时间点。
    fn now(&self) -> Result<Instant, ClockError>;
}

/// 基于 [`Instant::now`] 的系统时钟，读取永不失败。
#[derive(Clone, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Result<Instant, ClockError> {
        Ok(Instant::now())
    }
}

/// 计算自 `since` 起经过的时长。
///
/// # 教案式说明
/// - **意图 (Why)**：超时判定在两个地方可能失败：起点本身缺失（记录状态切换时读时钟失败），
///   或当前时间读取失败；两者统一折叠为 [`ClockError`]；
/// - **契约 (What)**：`since` 为 `None` 时直接返回错误；否则返回饱和差值，不会因为时间点
///   乱序而 panic。
pub fn elapsed_since(clock: &dyn Clock, since: Option<Instant>) -> Result<Duration, ClockError> {
    let since = since.ok_or_else(|| ClockError::new("state change time was never recorded"))?;
    let now = clock.now()?;
    Ok(now.saturating_duration_since(since))
}

/// 虚拟时钟：通过手动推进时间在测试中复现确定性的超时序列。
///
/// # 设计动机（Why）
/// - 状态切换超时逻辑需要在 CI 中保证 100% 可重复；
/// - 额外提供“读取失败”开关，覆盖时钟不可用时的悲观分支。
///
/// # 行为概览（How）
/// - 内部维护起点 `origin` 与累计偏移 `elapsed`，`now = origin + elapsed`；
/// - 克隆体共享同一状态，测试可以把一个克隆注入被测对象，另一个留在手中推进时间。
///
/// # 契约说明（What）
/// - `advance` 可多次调用，偏移量单调增加；
/// - `set_unavailable(true)` 之后所有 `now` 调用返回错误，直到再次关闭。
#[derive(Clone, Debug)]
pub struct MockClock {
    inner: Arc<Mutex<MockClockState>>,
}

#[derive(Debug)]
struct MockClockState {
    origin: Instant,
    elapsed: Duration,
    unavailable: bool,
}

impl MockClock {
    /// 创建起始时间为当前系统时间的虚拟时钟。
    pub fn new() -> Self {
        Self::with_start(Instant::now())
    }

    /// 以指定起始时间构造虚拟时钟。
    pub fn with_start(origin: Instant) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockClockState {
                origin,
                elapsed: Duration::ZERO,
                unavailable: false,
            })),
        }
    }

    /// 推进虚拟时间。
    pub fn advance(&self, delta: Duration) {
        let mut state = self.inner.lock();
        state.elapsed = state.elapsed.saturating_add(delta);
    }

    /// 自构造起累计推进的时长。
    pub fn elapsed(&self) -> Duration {
        self.inner.lock().elapsed
    }

    /// 切换“读取失败”模式。
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().unavailable = unavailable;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Result<Instant, ClockError> {
        let state = self.inner.lock();
        if state.unavailable {
            return Err(ClockError::new("mock clock marked unavailable"));
        }
        Ok(state.origin + state.elapsed)
    }
}
