//! # TLS 选项缓存
//!
//! ## 核心意图（Why）
//! - 重连时安全传输整体销毁重建，证书、信任根等先前设置过的选项必须在新实例上重放，
//!   否则重连后认证形态悄然改变；
//! - 缓存持有“当前安全传输 + 最近一次成功取回的选项快照”，两者生命周期不同：
//!   传输随连接销毁，快照跨越重连保留。
//!
//! ## 行为契约（What）
//! - [`TlsOptionCache::ensure`] 按需创建传输并重放快照，重放失败只记录告警；
//! - [`TlsOptionCache::persist`] 从传输取回选项并替换快照；取回失败时保留旧快照；
//! - 快照以 [`ArcSwapOption`] 保存，读取方拿到的是不可变的整份快照，不会观察到半更新状态。

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use skyport_core::collaborators::{SecureTransportFactory, SharedSecureTransport};
use skyport_core::{CollaboratorError, OptionSet, OptionValue};
use tracing::{debug, warn};

pub(crate) struct TlsOptionCache {
    factory: Box<dyn SecureTransportFactory>,
    transport: Option<SharedSecureTransport>,
    saved: ArcSwapOption<OptionSet>,
}

impl TlsOptionCache {
    pub(crate) fn new(factory: Box<dyn SecureTransportFactory>) -> Self {
        Self {
            factory,
            transport: None,
            saved: ArcSwapOption::empty(),
        }
    }

    /// 返回当前安全传输，不存在时创建并重放快照。
    ///
    /// # 教案式注释
    /// - **契约 (What)**：只有工厂失败会返回错误；快照重放失败不影响传输的可用性；
    /// - **执行 (How)**：创建后立即包成共享句柄，连接与缓存持有同一个实例。
    pub(crate) fn ensure(&mut self, host: &str) -> Result<SharedSecureTransport, CollaboratorError> {
        if let Some(transport) = &self.transport {
            return Ok(Arc::clone(transport));
        }
        let mut created = self.factory.create(host)?;
        if let Some(snapshot) = self.saved.load_full() {
            match created.feed_options(&snapshot) {
                Ok(()) => debug!(host, options = snapshot.len(), "replayed saved TLS options"),
                Err(err) => warn!(host, error = %err, "failed to replay saved TLS options"),
            }
        }
        let shared: SharedSecureTransport = Arc::new(Mutex::new(created));
        self.transport = Some(Arc::clone(&shared));
        Ok(shared)
    }

    /// 从当前传输取回选项并更新快照。
    pub(crate) fn persist(&self) -> Result<(), CollaboratorError> {
        let Some(transport) = &self.transport else {
            return Ok(());
        };
        let options = transport.lock().retrieve_options()?;
        self.saved.store(Some(Arc::new(options)));
        Ok(())
    }

    /// 设置透传选项，随后尽力更新快照。
    pub(crate) fn apply(
        &mut self,
        host: &str,
        name: &str,
        value: &OptionValue,
    ) -> Result<(), CollaboratorError> {
        let transport = self.ensure(host)?;
        transport.lock().set_option(name, value)?;
        if let Err(err) = self.persist() {
            warn!(option = name, error = %err, "failed to persist TLS options after update");
        }
        Ok(())
    }

    /// 丢弃当前传输；快照保留。
    pub(crate) fn release(&mut self) {
        self.transport = None;
    }

    pub(crate) fn snapshot(&self) -> Option<Arc<OptionSet>> {
        self.saved.load_full()
    }

    pub(crate) fn clear_snapshot(&self) {
        self.saved.store(None);
    }
}
