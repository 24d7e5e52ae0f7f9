//! # 共享连接生命周期
//!
//! ## 核心意图（Why）
//! - 所有设备复用同一条连接；连接的创建、状态观察与整体重建集中在 [`ConnectionManager`]，
//!   设备状态机只借用它提供的会话与安全句柄；
//! - 连接进入 `Error` 是触发整连接重建的唯一外部信号，设备侧的升级也只是置位同一个标志。
//!
//! ## 行为契约（What）
//! - `establish` 要求认证模式已锁定；成功后状态记为 `Closed`，等待协作方自行推进到 `Opened`；
//!   失败时不保留任何半成品，下一 Tick 从头再来；
//! - 状态观察是边沿触发的：前后状态相同的通知被忽略；
//! - 每条连接拥有独立的事件收件箱，关闭连接时旧收件箱随之作废，迟到的旧通知不会污染新连接。
//!
//! ## 风险提示（Trade-offs）
//! - 状态变化在下一次排空前不可见，因此“打开后立即驱动设备”至少滞后一个 Tick。

use std::sync::Arc;

use skyport_core::collaborators::{
    Connection, ConnectionConfig, ConnectionEvent, ConnectionFactory, ConnectionState, EventInbox,
    SecureTransportFactory,
};
use skyport_core::{CollaboratorError, OptionSet, OptionValue};
use tracing::{debug, error, info, warn};

use crate::auth::PreferredAuthMode;
use crate::error::ConnectionError;
use crate::tls_cache::TlsOptionCache;

pub(crate) struct ConnectionManager {
    host: Arc<str>,
    factory: Box<dyn ConnectionFactory>,
    tls: TlsOptionCache,
    connection: Option<Box<dyn Connection>>,
    state: ConnectionState,
    events: EventInbox<ConnectionEvent>,
    retry_required: bool,
    trace: bool,
}

impl ConnectionManager {
    pub(crate) fn new(
        host: Arc<str>,
        factory: Box<dyn ConnectionFactory>,
        secure_transports: Box<dyn SecureTransportFactory>,
    ) -> Self {
        Self {
            host,
            factory,
            tls: TlsOptionCache::new(secure_transports),
            connection: None,
            state: ConnectionState::Closed,
            events: EventInbox::new(),
            retry_required: false,
            trace: false,
        }
    }

    pub(crate) fn host(&self) -> &str {
        &self.host
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.state
    }

    pub(crate) fn is_established(&self) -> bool {
        self.connection.is_some()
    }

    pub(crate) fn is_open(&self) -> bool {
        self.connection.is_some() && self.state == ConnectionState::Opened
    }

    pub(crate) fn connection_mut(&mut self) -> Option<&mut (dyn Connection + 'static)> {
        self.connection.as_deref_mut()
    }

    pub(crate) fn retry_required(&self) -> bool {
        self.retry_required
    }

    pub(crate) fn request_retry(&mut self) {
        self.retry_required = true;
    }

    pub(crate) fn trace_enabled(&self) -> bool {
        self.trace
    }

    pub(crate) fn saved_options(&self) -> Option<Arc<OptionSet>> {
        self.tls.snapshot()
    }

    /// 建立共享连接。
    ///
    /// # 教案式注释
    /// - **前置条件**：认证模式已锁定（注册成功至少一次）；
    /// - **执行 (How)**：
    ///   1. 取得安全传输（必要时创建并重放快照）；
    ///   2. 为新连接准备独立的事件收件箱，按认证模式组装配置；
    ///   3. 创建成功后才替换内部状态，失败时保持“无连接”。
    pub(crate) fn establish(&mut self, mode: PreferredAuthMode) -> Result<(), ConnectionError> {
        let auth = mode
            .connection_auth()
            .ok_or(ConnectionError::AuthenticationModeUnset)?;
        let transport = self
            .tls
            .ensure(&self.host)
            .map_err(|source| ConnectionError::SecureTransport { source })?;
        let events = EventInbox::new();
        let config = ConnectionConfig {
            host: Arc::clone(&self.host),
            transport,
            auth,
            trace: self.trace,
            events: events.clone(),
        };
        let connection = self.factory.create(config).map_err(|source| {
            error!(host = %self.host, error = %source, "failed to create the shared connection");
            ConnectionError::Creation { source }
        })?;
        self.connection = Some(connection);
        self.events = events;
        self.state = ConnectionState::Closed;
        info!(host = %self.host, ?auth, "shared connection created");
        Ok(())
    }

    /// 排空连接事件并记录状态变化；`Error` 状态置位重建标志。
    pub(crate) fn observe_state_changes(&mut self) {
        for event in self.events.drain() {
            let ConnectionEvent::StateChanged { previous, current } = event;
            if previous == current {
                continue;
            }
            self.state = current;
            match current {
                ConnectionState::Error => {
                    error!(host = %self.host, ?previous, "shared connection reported an error; scheduling retry");
                    self.retry_required = true;
                }
                ConnectionState::Opened => info!(host = %self.host, "shared connection opened"),
                ConnectionState::Closed => debug!(host = %self.host, ?previous, "shared connection closed"),
            }
        }
    }

    /// 推进连接自身的协议工作，随后排空其事件。
    pub(crate) fn do_work(&mut self) {
        if let Some(connection) = self.connection.as_mut() {
            connection.do_work();
        }
        self.observe_state_changes();
    }

    /// 切换协议帧跟踪；存在活动连接时立即生效。
    pub(crate) fn set_trace(&mut self, enabled: bool) -> Result<(), ConnectionError> {
        self.trace = enabled;
        if let Some(connection) = self.connection.as_mut() {
            connection
                .set_logging(enabled)
                .map_err(|source| ConnectionError::Logging { source })?;
        }
        debug!(enabled, "frame tracing toggled");
        Ok(())
    }

    /// 透传安全传输选项。
    pub(crate) fn apply_transport_option(
        &mut self,
        name: &str,
        value: &OptionValue,
    ) -> Result<(), CollaboratorError> {
        self.tls.apply(&self.host, name, value)
    }

    /// 尽力保存当前安全传输的选项快照。
    pub(crate) fn persist_options(&self) {
        if let Err(err) = self.tls.persist() {
            warn!(host = %self.host, error = %err, "failed to save TLS options before teardown");
        }
    }

    /// 销毁连接与安全传输，保留选项快照与重建标志以外的配置。
    pub(crate) fn close(&mut self) {
        let had_connection = self.connection.take().is_some();
        self.tls.release();
        self.events = EventInbox::new();
        self.state = ConnectionState::Closed;
        if had_connection {
            info!(host = %self.host, "shared connection destroyed");
        }
    }

    /// 重建准备完成后清除标志。
    pub(crate) fn clear_retry(&mut self) {
        self.retry_required = false;
    }

    /// 传输销毁时的最终释放：连接、安全传输与快照。
    pub(crate) fn shutdown(&mut self) {
        self.close();
        self.tls.clear_snapshot();
        self.retry_required = false;
    }
}
