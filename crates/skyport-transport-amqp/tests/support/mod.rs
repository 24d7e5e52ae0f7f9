//! 集成测试共享的脚本化协作方。
//!
//! # 结构概览（What）
//! - [`World`]：所有模拟协作方共享的可观察状态与故障开关，测试通过它注入失败、读取调用记录；
//! - `Mock*Factory`：按 `skyport-core` 契约实现的工厂，创建出的实例都回写同一个 [`World`]；
//! - [`Harness`]：组装好的传输实例，附带 `MockClock` 与常用的注册、推进辅助方法。
//!
//! # 脚本约定（How）
//! - 连接在首次 `do_work` 时报告 `Closed → Opened`；
//! - 设备 `start_async` 立即报告 `Stopped → Starting`，`auto_start` 开启时紧接着报告
//!   `Starting → Started`；`stop` 报告当前状态到 `Stopped`；
//! - 已提交事件在设备 `do_work` 时按 `completion` 脚本完成，`None` 表示保持在途。

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use skyport_core::collaborators::{
    Connection, ConnectionAuth, ConnectionConfig, ConnectionEvent, ConnectionFactory,
    ConnectionState, Device, DeviceAuth, DeviceConfig, DeviceEvent, DeviceFactory, DeviceState,
    EventInbox, HubClientSink, InboundDelivery, InboundHandler, ReceiveOutcome, SecureTransport,
    SecureTransportFactory, SecurityHandle, SendResult, SendStatus, SessionHandle,
    SubmissionToken,
};
use skyport_core::{
    CollaboratorError, DeliveryOutcome, EventQueue, InboundMessage, MockClock, OptionSet,
    OptionValue, OutboundEvent, SendConfirmation, TransportConfig,
};
use skyport_transport_amqp::{AmqpTransport, Collaborators, DeviceHandle, DeviceRegistration};

/// 单个模拟设备的脚本与调用记录。
pub struct DeviceScript {
    pub auth: DeviceAuth,
    pub events: EventInbox<DeviceEvent>,
    pub state: DeviceState,
    pub auto_start: bool,
    pub fail_start: bool,
    pub fail_stop: bool,
    pub fail_submissions: usize,
    pub completion: Option<SendResult>,
    pub status: SendStatus,
    pub rejected_options: HashSet<String>,
    pub fail_disposition: bool,
    pub starts: usize,
    pub start_security: Vec<Option<SecurityHandle>>,
    pub stops: usize,
    pub options: Vec<(String, OptionValue)>,
    pub attempts: Vec<Bytes>,
    pub submitted: Vec<Bytes>,
    pub in_flight: Vec<SubmissionToken>,
    pub dispositions: Vec<(String, u32, DeliveryOutcome)>,
    pub handler: Option<InboundHandler>,
    pub subscribe_calls: usize,
    pub unsubscribe_calls: usize,
    pub dropped: bool,
}

impl DeviceScript {
    fn new(auth: DeviceAuth, events: EventInbox<DeviceEvent>) -> Self {
        Self {
            auth,
            events,
            state: DeviceState::Stopped,
            auto_start: true,
            fail_start: false,
            fail_stop: false,
            fail_submissions: 0,
            completion: Some(SendResult::Ok),
            status: SendStatus::Idle,
            rejected_options: HashSet::new(),
            fail_disposition: false,
            starts: 0,
            start_security: Vec::new(),
            stops: 0,
            options: Vec::new(),
            attempts: Vec::new(),
            submitted: Vec::new(),
            in_flight: Vec::new(),
            dispositions: Vec::new(),
            handler: None,
            subscribe_calls: 0,
            unsubscribe_calls: 0,
            dropped: false,
        }
    }

    fn report(&mut self, next: DeviceState) {
        let previous = self.state;
        self.state = next;
        self.events.emit(DeviceEvent::StateChanged {
            previous,
            current: next,
        });
    }

    /// 指定选项最近一次被设置的值。
    pub fn option(&self, name: &str) -> Option<&OptionValue> {
        self.options
            .iter()
            .rev()
            .find(|(option, _)| option == name)
            .map(|(_, value)| value)
    }
}

/// 全部模拟协作方共享的世界状态。
#[derive(Default)]
pub struct World {
    pub devices: HashMap<String, DeviceScript>,
    pub devices_created: usize,
    pub fail_device_create: HashSet<String>,
    pub rejected_device_options: HashSet<String>,

    pub connections_created: usize,
    pub connections_dropped: usize,
    pub connection_auths: Vec<ConnectionAuth>,
    pub connection_traces: Vec<bool>,
    pub connection_inbox: Option<EventInbox<ConnectionEvent>>,
    pub connection_opened: bool,
    pub connection_do_work: usize,
    pub fail_connection_create: bool,
    pub fail_session_handle: bool,
    pub security_requests: usize,
    pub logging_calls: Vec<bool>,

    pub transports_created: usize,
    pub transport_hosts: Vec<String>,
    pub transport_sets: Vec<(String, OptionValue)>,
    pub fed: Vec<OptionSet>,
    pub rejected_tls_options: HashSet<String>,
    pub fail_retrieve: bool,
}

pub type SharedWorld = Arc<Mutex<World>>;

impl World {
    pub fn device(&self, id: &str) -> &DeviceScript {
        self.devices
            .get(id)
            .unwrap_or_else(|| panic!("device `{id}` was never created"))
    }

    pub fn device_mut(&mut self, id: &str) -> &mut DeviceScript {
        self.devices
            .get_mut(id)
            .unwrap_or_else(|| panic!("device `{id}` was never created"))
    }

    /// 以设备会话的身份报告一次状态变化。
    pub fn report_device_state(&mut self, id: &str, state: DeviceState) {
        self.device_mut(id).report(state);
    }

    /// 让当前连接报告错误。
    pub fn fail_connection(&mut self) {
        let inbox = self
            .connection_inbox
            .as_ref()
            .expect("a connection must exist before it can fail");
        inbox.emit(ConnectionEvent::StateChanged {
            previous: ConnectionState::Opened,
            current: ConnectionState::Error,
        });
    }
}

/// 以设备会话的身份把一次入站投递交给已订阅的处理器。
pub fn deliver_inbound(world: &SharedWorld, device_id: &str, delivery: InboundDelivery) -> ReceiveOutcome {
    let mut handler = world
        .lock()
        .device_mut(device_id)
        .handler
        .take()
        .expect("device must be subscribed");
    let outcome = handler(delivery);
    world.lock().device_mut(device_id).handler = Some(handler);
    outcome
}

pub struct MockSecureTransport {
    world: SharedWorld,
    options: OptionSet,
}

impl SecureTransport for MockSecureTransport {
    fn set_option(&mut self, name: &str, value: &OptionValue) -> Result<(), CollaboratorError> {
        let mut world = self.world.lock();
        if world.rejected_tls_options.contains(name) {
            return Err(CollaboratorError::new("tls.set_option", format!("`{name}` rejected")));
        }
        world.transport_sets.push((name.to_owned(), value.clone()));
        self.options.insert(name, value.clone());
        Ok(())
    }

    fn retrieve_options(&self) -> Result<OptionSet, CollaboratorError> {
        if self.world.lock().fail_retrieve {
            return Err(CollaboratorError::new("tls.retrieve_options", "options unavailable"));
        }
        Ok(self.options.clone())
    }

    fn feed_options(&mut self, options: &OptionSet) -> Result<(), CollaboratorError> {
        self.world.lock().fed.push(options.clone());
        for (name, value) in options.iter() {
            self.options.insert(name, value.clone());
        }
        Ok(())
    }
}

pub struct MockSecureTransportFactory(pub SharedWorld);

impl SecureTransportFactory for MockSecureTransportFactory {
    fn create(&self, host: &str) -> Result<Box<dyn SecureTransport>, CollaboratorError> {
        let mut world = self.0.lock();
        world.transports_created += 1;
        world.transport_hosts.push(host.to_owned());
        Ok(Box::new(MockSecureTransport {
            world: Arc::clone(&self.0),
            options: OptionSet::new(),
        }))
    }
}

pub struct MockConnection {
    world: SharedWorld,
    events: EventInbox<ConnectionEvent>,
    opened: bool,
}

impl Connection for MockConnection {
    fn session_handle(&mut self) -> Result<SessionHandle, CollaboratorError> {
        if self.world.lock().fail_session_handle {
            return Err(CollaboratorError::new("connection.session", "session refused"));
        }
        Ok(SessionHandle::new(1))
    }

    fn security_handle(&mut self) -> Result<SecurityHandle, CollaboratorError> {
        self.world.lock().security_requests += 1;
        Ok(SecurityHandle::new(2))
    }

    fn set_logging(&mut self, enabled: bool) -> Result<(), CollaboratorError> {
        self.world.lock().logging_calls.push(enabled);
        Ok(())
    }

    fn do_work(&mut self) {
        let mut world = self.world.lock();
        world.connection_do_work += 1;
        if !self.opened {
            self.opened = true;
            world.connection_opened = true;
            self.events.emit(ConnectionEvent::StateChanged {
                previous: ConnectionState::Closed,
                current: ConnectionState::Opened,
            });
        }
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        let mut world = self.world.lock();
        world.connections_dropped += 1;
        world.connection_opened = false;
    }
}

pub struct MockConnectionFactory(pub SharedWorld);

impl ConnectionFactory for MockConnectionFactory {
    fn create(&self, config: ConnectionConfig) -> Result<Box<dyn Connection>, CollaboratorError> {
        let mut world = self.0.lock();
        if world.fail_connection_create {
            return Err(CollaboratorError::new("connection.create", "endpoint unreachable"));
        }
        world.connections_created += 1;
        world.connection_auths.push(config.auth);
        world.connection_traces.push(config.trace);
        world.connection_inbox = Some(config.events.clone());
        Ok(Box::new(MockConnection {
            world: Arc::clone(&self.0),
            events: config.events,
            opened: false,
        }))
    }
}

pub struct MockDevice {
    id: String,
    world: SharedWorld,
}

impl MockDevice {
    fn with_script<R>(&self, f: impl FnOnce(&mut DeviceScript) -> R) -> R {
        f(self.world.lock().device_mut(&self.id))
    }
}

impl Device for MockDevice {
    fn start_async(
        &mut self,
        _session: SessionHandle,
        security: Option<SecurityHandle>,
    ) -> Result<(), CollaboratorError> {
        self.with_script(|script| {
            if script.fail_start {
                return Err(CollaboratorError::new("device.start", "link attach refused"));
            }
            script.starts += 1;
            script.start_security.push(security);
            script.report(DeviceState::Starting);
            if script.auto_start {
                script.report(DeviceState::Started);
            }
            Ok(())
        })
    }

    fn stop(&mut self) -> Result<(), CollaboratorError> {
        self.with_script(|script| {
            script.stops += 1;
            if script.fail_stop {
                return Err(CollaboratorError::new("device.stop", "link detach failed"));
            }
            script.report(DeviceState::Stopped);
            Ok(())
        })
    }

    fn send_event_async(&mut self, token: SubmissionToken, payload: Bytes) -> Result<(), CollaboratorError> {
        self.with_script(|script| {
            script.attempts.push(payload.clone());
            if script.fail_submissions > 0 {
                script.fail_submissions -= 1;
                return Err(CollaboratorError::new("device.send_event", "sender link busy"));
            }
            script.submitted.push(payload);
            script.in_flight.push(token);
            Ok(())
        })
    }

    fn subscribe_messages(&mut self, handler: InboundHandler) -> Result<(), CollaboratorError> {
        self.with_script(|script| {
            script.subscribe_calls += 1;
            script.handler = Some(handler);
            Ok(())
        })
    }

    fn unsubscribe_messages(&mut self) -> Result<(), CollaboratorError> {
        self.with_script(|script| {
            script.unsubscribe_calls += 1;
            script.handler = None;
            Ok(())
        })
    }

    fn send_status(&self) -> Result<SendStatus, CollaboratorError> {
        Ok(self.world.lock().device(&self.id).status)
    }

    fn set_option(&mut self, name: &str, value: &OptionValue) -> Result<(), CollaboratorError> {
        let globally_rejected = self.world.lock().rejected_device_options.contains(name);
        self.with_script(|script| {
            if globally_rejected || script.rejected_options.contains(name) {
                return Err(CollaboratorError::new("device.set_option", format!("`{name}` rejected")));
            }
            script.options.push((name.to_owned(), value.clone()));
            Ok(())
        })
    }

    fn send_disposition(
        &mut self,
        link_name: &str,
        delivery_id: u32,
        outcome: DeliveryOutcome,
    ) -> Result<(), CollaboratorError> {
        self.with_script(|script| {
            script
                .dispositions
                .push((link_name.to_owned(), delivery_id, outcome));
            if script.fail_disposition {
                return Err(CollaboratorError::new("device.send_disposition", "link detached"));
            }
            Ok(())
        })
    }

    fn do_work(&mut self) {
        self.with_script(|script| {
            if script.state != DeviceState::Started {
                return;
            }
            if let Some(result) = script.completion {
                for token in script.in_flight.drain(..) {
                    script.events.emit(DeviceEvent::SendCompleted { token, result });
                }
            }
        });
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        if let Some(script) = self.world.lock().devices.get_mut(&self.id) {
            script.dropped = true;
        }
    }
}

pub struct MockDeviceFactory(pub SharedWorld);

impl DeviceFactory for MockDeviceFactory {
    fn create(&self, config: DeviceConfig) -> Result<Box<dyn Device>, CollaboratorError> {
        let mut world = self.0.lock();
        let id = config.device_id.to_string();
        if world.fail_device_create.contains(&id) {
            return Err(CollaboratorError::new("device.create", "out of link slots"));
        }
        world.devices_created += 1;
        world
            .devices
            .insert(id.clone(), DeviceScript::new(config.auth, config.events));
        Ok(Box::new(MockDevice {
            id,
            world: Arc::clone(&self.0),
        }))
    }
}

/// 记录入站消息的 Hub 客户端。
#[derive(Default)]
pub struct RecordingSink {
    pub refuse: AtomicBool,
    pub received: Mutex<Vec<InboundMessage>>,
}

impl HubClientSink for RecordingSink {
    fn deliver_inbound_message(&self, message: InboundMessage) -> Result<(), InboundMessage> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(message);
        }
        self.received.lock().push(message);
        Ok(())
    }
}

/// 在析构时计数的负载所有者。
pub struct DropProbe(pub Arc<AtomicUsize>);

impl AsRef<[u8]> for DropProbe {
    fn as_ref(&self) -> &[u8] {
        b"probe"
    }
}

impl Drop for DropProbe {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

pub type CompletionLog = Arc<Mutex<Vec<(String, SendConfirmation)>>>;

/// 构造带回调的出站事件，完成时把 `(负载, 结果)` 写入日志。
pub fn tracked_event(payload: &str, log: &CompletionLog) -> OutboundEvent {
    let log = Arc::clone(log);
    let label = payload.to_owned();
    OutboundEvent::new(Bytes::copy_from_slice(payload.as_bytes()))
        .with_callback(move |confirmation| log.lock().push((label, confirmation)))
}

pub struct Harness {
    pub transport: AmqpTransport,
    pub world: SharedWorld,
    pub clock: MockClock,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(TransportConfig::new("contoso", "azure-devices.net"))
    }

    pub fn with_config(config: TransportConfig) -> Self {
        let world: SharedWorld = Arc::new(Mutex::new(World::default()));
        let clock = MockClock::new();
        let collaborators = Collaborators::new(
            Box::new(MockSecureTransportFactory(Arc::clone(&world))),
            Box::new(MockConnectionFactory(Arc::clone(&world))),
            Box::new(MockDeviceFactory(Arc::clone(&world))),
        )
        .with_clock(Arc::new(clock.clone()));
        let transport = AmqpTransport::create(config, collaborators).expect("valid config");
        Self {
            transport,
            world,
            clock,
            sink: Arc::new(RecordingSink::default()),
        }
    }

    pub fn register(&mut self, registration: DeviceRegistration) -> (DeviceHandle, EventQueue) {
        let queue = EventQueue::new();
        let handle = self
            .transport
            .register(registration, self.sink.clone(), queue.clone())
            .expect("registration succeeds");
        (handle, queue)
    }

    pub fn register_key(&mut self, id: &str) -> (DeviceHandle, EventQueue) {
        self.register(DeviceRegistration::new(id).with_key("c2VjcmV0"))
    }

    pub fn register_x509(&mut self, id: &str) -> (DeviceHandle, EventQueue) {
        self.register(DeviceRegistration::new(id))
    }

    pub fn tick(&mut self, times: usize) {
        for _ in 0..times {
            self.transport.tick();
        }
    }

    /// 建立并打开连接，随后让所有设备进入 `Started`。
    pub fn bring_up(&mut self) {
        self.tick(2);
    }
}
