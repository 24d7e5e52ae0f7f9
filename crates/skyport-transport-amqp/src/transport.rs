//! # AmqpTransport：对外编排入口
//!
//! ## 核心意图（Why）
//! - 把注册表、共享连接、设备状态机、发送管线、处置与选项传播组装成一个由外部驱动的引擎；
//! - 外部只需反复调用 [`AmqpTransport::tick`]，其余入口（注册、注销、选项、订阅、处置）在 Tick
//!   之外同步执行。
//!
//! ## 调用约定（What）
//! - 所有修改状态的入口都接收 `&mut self`：调用方必须串行化对同一实例的访问，编译器据此排除
//!   注销与 Tick 交错执行的可能；
//! - 构造与注册失败完整回滚，不会留下半初始化的实例或条目；
//! - 实例被丢弃时等价于 [`AmqpTransport::destroy`]。
//!
//! ## Tick 流程（How）
//! 1. 排空连接与设备事件；
//! 2. 若重建标志已置位：执行重建准备后立即返回，本 Tick 不发送；
//! 3. 否则在存在设备时：无连接则建立；连接已打开则逐一驱动设备；
//! 4. 推进连接自身的协议工作，并再次排空事件。

use std::sync::Arc;
use std::time::Duration;

use skyport_core::collaborators::{
    ConnectionAuth, ConnectionFactory, ConnectionState, DeviceConfig, DeviceFactory, EventInbox,
    HubClientSink, SecureTransportFactory, SendStatus,
};
use skyport_core::{
    Clock, ConfigError, DeviceDefaults, EventQueue, InboundMessage, MessageVerdict, OptionSet,
    OptionValue, SystemClock, TransportConfig, TransportOption,
};
use tracing::{debug, error, info, warn};

use crate::auth::{DeviceRegistration, PreferredAuthMode, accept_credentials, connection_auth_of};
use crate::connection::ConnectionManager;
use crate::device::{DeviceEntry, Subscription};
use crate::disposition::{inbound_handler, split};
use crate::error::{DispositionError, RegistrationError, SendFailure, TransportError};
use crate::lifecycle::{DevicePhase, DriveContext, FailureCounters};
use crate::options::set_default_secs;
use crate::registry::{DeviceHandle, DeviceRegistry};

/// 客户端层的重试策略。
///
/// 连接重建只由连接错误与设备失败升级驱动，策略值仅被接受并记录。
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum RetryPolicy {
    /// 不重试。
    None,
    /// 立即重试。
    Immediate,
    /// 固定间隔。
    Interval,
    /// 线性退避。
    LinearBackoff,
    /// 指数退避。
    ExponentialBackoff,
    /// 指数退避并加入抖动。
    #[default]
    ExponentialBackoffWithJitter,
    /// 随机间隔。
    Random,
}

/// 构造传输所需的协作方集合。
pub struct Collaborators {
    secure_transports: Box<dyn SecureTransportFactory>,
    connections: Box<dyn ConnectionFactory>,
    devices: Box<dyn DeviceFactory>,
    clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// 以系统时钟组装协作方。
    pub fn new(
        secure_transports: Box<dyn SecureTransportFactory>,
        connections: Box<dyn ConnectionFactory>,
        devices: Box<dyn DeviceFactory>,
    ) -> Self {
        Self {
            secure_transports,
            connections,
            devices,
            clock: Arc::new(SystemClock),
        }
    }

    /// 替换时钟，测试中注入 [`MockClock`](skyport_core::MockClock)。
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// 单连接多设备的传输编排引擎。
pub struct AmqpTransport {
    host: Arc<str>,
    defaults: DeviceDefaults,
    auth_mode: PreferredAuthMode,
    registry: DeviceRegistry,
    connection: ConnectionManager,
    devices: Box<dyn DeviceFactory>,
    clock: Arc<dyn Clock>,
}

impl AmqpTransport {
    /// 校验配置并创建传输；此时不建立任何连接。
    pub fn create(config: TransportConfig, collaborators: Collaborators) -> Result<Self, TransportError> {
        config.validate()?;
        let host: Arc<str> = Arc::from(config.host_name());
        let Collaborators {
            secure_transports,
            connections,
            devices,
            clock,
        } = collaborators;
        info!(host = %host, "transport created");
        Ok(Self {
            connection: ConnectionManager::new(Arc::clone(&host), connections, secure_transports),
            host,
            defaults: config.defaults,
            auth_mode: PreferredAuthMode::Unset,
            registry: DeviceRegistry::default(),
            devices,
            clock,
        })
    }

    /// 注销全部设备并释放连接、安全传输与选项快照。
    pub fn destroy(mut self) {
        self.shutdown();
    }

    /// 注册设备。
    ///
    /// # 教案式注释
    /// - **契约 (What)**：
    ///   - 缺少标识为配置错误，标识重复或凭据形态不符为注册错误；
    ///   - 成功时当前默认参数已复制到设备上，首个成功注册的设备锁定认证模式；
    ///   - 任一步骤失败时注册表与认证模式保持调用前状态。
    /// - **执行 (How)**：校验身份与凭据 → 创建设备会话 → 复制默认参数 → 插入注册表 → 锁定模式。
    pub fn register(
        &mut self,
        registration: DeviceRegistration,
        sink: Arc<dyn HubClientSink>,
        queue: EventQueue,
    ) -> Result<DeviceHandle, TransportError> {
        let device_id = match registration.device_id() {
            Some(id) if !id.is_empty() => id,
            _ => return Err(ConfigError::MissingField { field: "device_id" }.into()),
        };
        if self.registry.contains(device_id) {
            return Err(RegistrationError::Duplicate {
                device_id: device_id.to_owned(),
            }
            .into());
        }
        let credentials = accept_credentials(device_id, &registration, self.auth_mode)?;
        let auth = connection_auth_of(&credentials);
        let id: Arc<str> = Arc::from(device_id);
        let events = EventInbox::new();
        let device = self
            .devices
            .create(DeviceConfig {
                device_id: Arc::clone(&id),
                host: Arc::clone(&self.host),
                auth: credentials,
                events: events.clone(),
            })
            .map_err(|source| {
                error!(device_id = %id, error = %source, "failed to create device session");
                RegistrationError::DeviceCreation {
                    device_id: id.to_string(),
                    source,
                }
            })?;

        let mut entry = DeviceEntry::new(
            Arc::clone(&id),
            auth,
            device,
            events,
            queue,
            sink,
            self.defaults.state_change_timeout(),
        );
        if let Err(source) = entry.replicate_defaults(&self.defaults) {
            error!(device_id = %id, error = %source, "failed to replicate default options");
            entry.teardown(self.clock.as_ref());
            return Err(RegistrationError::OptionReplication {
                device_id: id.to_string(),
                source,
            }
            .into());
        }
        let handle = match self.registry.insert(entry) {
            Ok(handle) => handle,
            Err(rejected) => {
                rejected.teardown(self.clock.as_ref());
                return Err(RegistrationError::Duplicate {
                    device_id: id.to_string(),
                }
                .into());
            }
        };
        self.auth_mode.latch(auth);
        info!(device_id = %id, handle = handle.raw(), ?auth, "device registered");
        Ok(handle)
    }

    /// 注销设备：先从注册表摘除，再释放资源；未知句柄只记录告警。
    pub fn unregister(&mut self, handle: DeviceHandle) {
        match self.registry.remove(handle) {
            Some(entry) => {
                let id = entry.id_arc();
                entry.teardown(self.clock.as_ref());
                info!(device_id = %id, handle = handle.raw(), "device unregistered");
            }
            None => warn!(handle = handle.raw(), "cannot unregister a device that is not registered"),
        }
    }

    /// 推进一次编排。
    pub fn tick(&mut self) {
        self.connection.observe_state_changes();
        self.process_device_events();

        if self.connection.retry_required() {
            self.prepare_for_retry();
            return;
        }
        if self.registry.is_empty() {
            return;
        }
        if !self.connection.is_established() {
            if let Err(err) = self.connection.establish(self.auth_mode) {
                let err = TransportError::from(err);
                error!(host = %self.host, code = err.code(), error = %err, "connection establishment failed");
            }
        } else if self.connection.is_open() {
            self.drive_devices();
        }
        self.connection.do_work();
        self.process_device_events();
    }

    /// 订阅入站消息；重复订阅无副作用。
    pub fn subscribe(&mut self, handle: DeviceHandle) -> Result<(), TransportError> {
        let entry = self
            .registry
            .get_mut(handle)
            .ok_or(TransportError::UnknownDevice { handle: handle.raw() })?;
        if entry.subscription == Subscription::Active {
            return Ok(());
        }
        let handler = inbound_handler(entry.id_arc(), Arc::clone(&entry.sink));
        let id = entry.id_arc();
        entry
            .device_mut()
            .subscribe_messages(handler)
            .map_err(|source| TransportError::collaborator(&id, source))?;
        entry.subscription = Subscription::Active;
        debug!(device_id = %id, "inbound messages subscribed");
        Ok(())
    }

    /// 取消入站消息订阅；未订阅时无副作用。
    pub fn unsubscribe(&mut self, handle: DeviceHandle) -> Result<(), TransportError> {
        let entry = self
            .registry
            .get_mut(handle)
            .ok_or(TransportError::UnknownDevice { handle: handle.raw() })?;
        if entry.subscription == Subscription::Inactive {
            return Ok(());
        }
        let id = entry.id_arc();
        entry
            .device_mut()
            .unsubscribe_messages()
            .map_err(|source| TransportError::collaborator(&id, source))?;
        entry.subscription = Subscription::Inactive;
        debug!(device_id = %id, "inbound messages unsubscribed");
        Ok(())
    }

    /// 查询设备发送通道是否空闲。
    pub fn send_status(&self, handle: DeviceHandle) -> Result<SendStatus, TransportError> {
        let entry = self
            .registry
            .get(handle)
            .ok_or(TransportError::UnknownDevice { handle: handle.raw() })?;
        entry
            .send_status()
            .map_err(|source| TransportError::collaborator(entry.id(), source))
    }

    /// 设置选项。
    ///
    /// # 教案式注释
    /// - **契约 (What)**：
    ///   - 设备默认参数：先更新传输级默认值，再广播给全部设备；任一设备失败即返回
    ///     [`TransportError::OptionPropagation`]，默认值仍保持更新；
    ///   - `logtrace`：更新传输设置并作用于活动连接；
    ///   - 证书材料：声明式认证模式下拒绝；先交给安全传输，安全传输接受后才锁定为证书模式，
    ///     被拒绝时认证模式保持不变；
    ///   - 其他名字：透传给安全传输（按需创建），成功后刷新选项快照。
    pub fn set_option(&mut self, name: &str, value: OptionValue) -> Result<(), TransportError> {
        match TransportOption::classify(name) {
            TransportOption::Device(tunable) => {
                let secs = value
                    .as_seconds()
                    .ok_or_else(|| invalid_option(name, "expected a non-negative number of seconds"))?
                    .as_secs();
                set_default_secs(&mut self.defaults, tunable, secs);
                let mut failed = 0usize;
                for (_, entry) in self.registry.entries_mut() {
                    if let Err(err) = entry.apply_tunable(tunable, secs) {
                        error!(device_id = %entry.id(), option = name, error = %err, "failed to apply option to device");
                        failed += 1;
                    }
                }
                if failed > 0 {
                    return Err(TransportError::OptionPropagation {
                        option: name.to_owned(),
                        failed,
                    });
                }
                debug!(option = name, secs, devices = self.registry.len(), "device option updated");
                Ok(())
            }
            TransportOption::LogTrace => {
                let enabled = value
                    .as_bool()
                    .ok_or_else(|| invalid_option(name, "expected a boolean"))?;
                self.connection.set_trace(enabled)?;
                Ok(())
            }
            TransportOption::X509Certificate | TransportOption::X509PrivateKey => {
                if self.auth_mode == PreferredAuthMode::Claims {
                    return Err(invalid_option(
                        name,
                        "certificate material cannot be used with claims-based authentication",
                    ));
                }
                self.apply_transport_option(name, &value)?;
                self.auth_mode.latch(ConnectionAuth::Certificate);
                Ok(())
            }
            TransportOption::Passthrough(_) => self.apply_transport_option(name, &value),
        }
    }

    /// 接受并忽略客户端重试策略。
    pub fn set_retry_policy(
        &mut self,
        policy: RetryPolicy,
        retry_timeout_limit: Duration,
    ) -> Result<(), TransportError> {
        debug!(?policy, ?retry_timeout_limit, "retry policy ignored; reconnection is driven by connection state");
        Ok(())
    }

    /// 目标主机名的副本。
    pub fn hostname(&self) -> String {
        self.host.to_string()
    }

    /// 回传应用对入站消息的处置意见。
    ///
    /// # 教案式注释
    /// - **契约 (What)**：消息与上下文按值传入，在本次调用内恰好释放一次，包括参数非法、
    ///   设备未注册与协作方回传失败的路径；
    /// - **风险 (Trade-offs)**：协作方失败时不会重试回传，投递由协议层按链路超时处理。
    pub fn resolve_disposition(
        &mut self,
        message: InboundMessage,
        verdict: MessageVerdict,
    ) -> Result<(), TransportError> {
        let (payload, context) = split(message)?;
        let entry = self
            .registry
            .handle_of(context.device_id())
            .and_then(|handle| self.registry.get_mut(handle));
        let result = match entry {
            Some(entry) => entry.acknowledge(&context, verdict),
            None => Err(DispositionError::UnknownDevice {
                device_id: context.device_id().to_owned(),
            }),
        };
        if let Err(err) = &result {
            error!(device_id = %context.device_id(), delivery_id = context.delivery_id(), error = %err, "failed to resolve disposition");
        }
        drop(payload);
        drop(context);
        result.map_err(TransportError::from)
    }

    /// 下一 Tick 是否执行整连接重建准备。
    pub fn retry_required(&self) -> bool {
        self.connection.retry_required()
    }

    /// 已注册设备数量。
    pub fn device_count(&self) -> usize {
        self.registry.len()
    }

    /// 设备当前生命周期阶段。
    pub fn device_phase(&self, handle: DeviceHandle) -> Option<DevicePhase> {
        self.registry.get(handle).map(|entry| entry.lifecycle.phase())
    }

    /// 设备当前失败计数。
    pub fn device_failures(&self, handle: DeviceHandle) -> Option<FailureCounters> {
        self.registry.get(handle).map(|entry| entry.failures)
    }

    /// 最近观察到的连接状态。
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// 当前认证模式。
    pub fn preferred_auth_mode(&self) -> PreferredAuthMode {
        self.auth_mode
    }

    /// 当前设备默认参数。
    pub fn device_defaults(&self) -> &DeviceDefaults {
        &self.defaults
    }

    /// 协议帧跟踪是否开启。
    pub fn trace_enabled(&self) -> bool {
        self.connection.trace_enabled()
    }

    /// 最近一次保存的安全传输选项快照。
    pub fn saved_tls_options(&self) -> Option<Arc<OptionSet>> {
        self.connection.saved_options()
    }

    fn apply_transport_option(&mut self, name: &str, value: &OptionValue) -> Result<(), TransportError> {
        self.connection
            .apply_transport_option(name, value)
            .map_err(|source| {
                error!(option = name, error = %source, "secure transport rejected option");
                TransportError::TransportOption {
                    option: name.to_owned(),
                    source,
                }
            })
    }

    fn process_device_events(&mut self) {
        let clock = self.clock.as_ref();
        for (_, entry) in self.registry.entries_mut() {
            entry.process_events(clock);
        }
    }

    /// 逐一驱动设备，并按失败计数决定是否升级为整连接重建。
    fn drive_devices(&mut self) {
        let Some(auth) = self.auth_mode.connection_auth() else {
            return;
        };
        let Some(connection) = self.connection.connection_mut() else {
            return;
        };
        let threshold = self.defaults.failure_threshold;
        let mut ctx = DriveContext {
            connection,
            auth,
            clock: self.clock.as_ref(),
            failure_threshold: threshold,
        };
        let mut escalate = false;
        for (handle, entry) in self.registry.entries_mut() {
            if entry.failures.send_completion >= threshold {
                let err = TransportError::from(SendFailure::CompletionFailures {
                    device_id: entry.id().to_owned(),
                    failures: entry.failures.send_completion,
                });
                error!(
                    device_id = %entry.id(),
                    handle = handle.raw(),
                    code = err.code(),
                    error = %err,
                    "scheduling connection retry"
                );
                escalate = true;
                continue;
            }
            if let Err(err) = entry.drive(&mut ctx) {
                if entry.failures.lifecycle >= threshold {
                    error!(
                        device_id = %entry.id(),
                        handle = handle.raw(),
                        failures = entry.failures.lifecycle,
                        code = err.code(),
                        error = %err,
                        "device failure threshold reached; scheduling connection retry"
                    );
                    escalate = true;
                } else {
                    warn!(
                        device_id = %entry.id(),
                        failures = entry.failures.lifecycle,
                        code = err.code(),
                        error = %err,
                        "device lifecycle step failed"
                    );
                }
            }
        }
        if escalate {
            self.connection.request_retry();
        }
    }

    /// 重建准备：保存选项、停止设备并清零计数、销毁连接与安全传输。
    fn prepare_for_retry(&mut self) {
        self.connection.persist_options();
        for (_, entry) in self.registry.entries_mut() {
            entry.prepare_for_retry();
        }
        self.connection.close();
        self.connection.clear_retry();
        self.process_device_events();
        info!(host = %self.host, devices = self.registry.len(), "prepared for connection retry");
    }

    fn shutdown(&mut self) {
        self.process_device_events();
        let clock = self.clock.as_ref();
        for entry in self.registry.drain() {
            let id = entry.id_arc();
            entry.teardown(clock);
            debug!(device_id = %id, "device unregistered during transport teardown");
        }
        if self.connection.is_established() || self.connection.saved_options().is_some() {
            info!(host = %self.connection.host(), "transport destroyed");
        }
        self.connection.shutdown();
    }
}

impl Drop for AmqpTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for AmqpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpTransport")
            .field("host", &self.host)
            .field("auth_mode", &self.auth_mode)
            .field("devices", &self.registry.len())
            .field("connection_state", &self.connection.state())
            .field("retry_required", &self.connection.retry_required())
            .finish()
    }
}

fn invalid_option(name: &str, detail: &str) -> TransportError {
    TransportError::InvalidOption {
        option: name.to_owned(),
        detail: detail.to_owned(),
    }
}
