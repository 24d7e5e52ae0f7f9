//! # 选项传播
//!
//! ## 核心意图（Why）
//! - 四个设备默认参数既保存在传输上（供之后注册的设备继承），也需要立即广播给已注册设备；
//! - 认证形态决定哪些参数有意义：事件发送超时总是复制，令牌有效期、刷新提前量与 CBS 请求
//!   超时只复制给声明式认证的设备。
//!
//! ## 行为契约（What）
//! - 对证书设备广播仅声明式参数视为该设备成功（不调用协作方）；
//! - 协作方拒绝时返回其错误，由调用方决定是否汇总为部分失败。

use skyport_core::collaborators::ConnectionAuth;
use skyport_core::{CollaboratorError, DeviceDefaults, DeviceTunable, OptionValue};
use tracing::trace;

use crate::device::DeviceEntry;

/// 读取某个参数的当前默认值（秒）。
pub(crate) fn default_secs(defaults: &DeviceDefaults, tunable: DeviceTunable) -> u64 {
    match tunable {
        DeviceTunable::SasTokenLifetime => defaults.sas_token_lifetime_secs,
        DeviceTunable::SasTokenRefreshTime => defaults.sas_token_refresh_secs,
        DeviceTunable::CbsRequestTimeout => defaults.cbs_request_timeout_secs,
        DeviceTunable::EventSendTimeout => defaults.event_send_timeout_secs,
    }
}

/// 更新某个参数的默认值（秒）。
pub(crate) fn set_default_secs(defaults: &mut DeviceDefaults, tunable: DeviceTunable, secs: u64) {
    let slot = match tunable {
        DeviceTunable::SasTokenLifetime => &mut defaults.sas_token_lifetime_secs,
        DeviceTunable::SasTokenRefreshTime => &mut defaults.sas_token_refresh_secs,
        DeviceTunable::CbsRequestTimeout => &mut defaults.cbs_request_timeout_secs,
        DeviceTunable::EventSendTimeout => &mut defaults.event_send_timeout_secs,
    };
    *slot = secs;
}

impl DeviceEntry {
    /// 将单个参数应用到设备。
    ///
    /// 仅声明式参数对证书设备直接返回成功；注册时的复制与 `set_option` 的广播都经过这里，
    /// 因此广播同样跳过证书设备。
    pub(crate) fn apply_tunable(
        &mut self,
        tunable: DeviceTunable,
        secs: u64,
    ) -> Result<(), CollaboratorError> {
        if tunable.requires_claims() && self.auth() != ConnectionAuth::Claims {
            return Ok(());
        }
        trace!(device_id = %self.id(), option = tunable.option_name(), secs, "replicating option");
        self.device_mut()
            .set_option(tunable.option_name(), &OptionValue::Seconds(secs))
    }

    /// 把全部默认参数复制到设备上。
    pub(crate) fn replicate_defaults(
        &mut self,
        defaults: &DeviceDefaults,
    ) -> Result<(), CollaboratorError> {
        for tunable in DeviceTunable::ALL {
            self.apply_tunable(tunable, default_secs(defaults, tunable))?;
        }
        Ok(())
    }
}
