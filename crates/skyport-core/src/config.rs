//! # config 模块
//!
//! ## 核心意图（Why）
//! - 传输实例在构造时需要目标 Hub 的身份（名称 + 域名后缀，或协议网关主机名）以及一组设备
//!   默认参数；这些值通常来自部署配置文件，因此以 `serde` 结构体承载并支持 TOML 装载；
//! - 默认值集中在 [`DeviceDefaults`] 中，保证“未配置”与“显式写入默认值”行为一致。
//!
//! ## 行为契约（What）
//! - [`TransportConfig::validate`] 在构造传输实例前调用，失败即拒绝构造；
//! - [`TransportConfig::host_name`] 给出最终连接的主机名：设置了网关主机时使用网关，
//!   否则为 `"{iothub_name}.{iothub_suffix}"`。
//!
//! ## 示例
//! ```toml
//! iothub_name = "contoso"
//! iothub_suffix = "azure-devices.net"
//!
//! [defaults]
//! event_send_timeout_secs = 120
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 设备状态切换超时默认值（秒）。
pub const DEFAULT_STATE_CHANGE_TIMEOUT_SECS: u64 = 60;
/// CBS 请求超时默认值（秒）。
pub const DEFAULT_CBS_REQUEST_TIMEOUT_SECS: u64 = 30;
/// 事件发送超时默认值（秒）。
pub const DEFAULT_EVENT_SEND_TIMEOUT_SECS: u64 = 300;
/// SAS 令牌有效期默认值（秒）。
pub const DEFAULT_SAS_TOKEN_LIFETIME_SECS: u64 = 3600;
/// SAS 令牌提前刷新默认值（秒）。
pub const DEFAULT_SAS_TOKEN_REFRESH_SECS: u64 = 1800;
/// 连续失败阈值。
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// 配置错误。
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// 必填字段缺失或为空。
    #[error("configuration field `{field}` is missing or empty")]
    MissingField {
        /// 字段名。
        field: &'static str,
    },
    /// 字段取值非法。
    #[error("configuration field `{field}` is invalid: {detail}")]
    InvalidValue {
        /// 字段名。
        field: &'static str,
        /// 说明。
        detail: String,
    },
    /// TOML 文本无法解析。
    #[error("failed to parse transport configuration: {source}")]
    Parse {
        /// 底层解析错误。
        #[from]
        source: toml::de::Error,
    },
}

impl ConfigError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::MissingField { .. } => "config.missing_field",
            ConfigError::InvalidValue { .. } => "config.invalid_value",
            ConfigError::Parse { .. } => "config.parse",
        }
    }
}

/// 复制到每个设备上的默认参数，以及每设备的生命周期阈值。
///
/// # 教案式说明
/// - **意图 (Why)**：这些值既可以来自配置文件，也可以在运行期通过 `SetOption` 修改；
///   修改后新注册的设备必须立即继承最新值；
/// - **契约 (What)**：所有字段都有默认值，缺省字段按常量填充；`failure_threshold` 必须大于 0。
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct DeviceDefaults {
    /// SAS 令牌有效期（秒）。
    pub sas_token_lifetime_secs: u64,
    /// SAS 令牌提前刷新时长（秒）。
    pub sas_token_refresh_secs: u64,
    /// CBS 请求超时（秒）。
    pub cbs_request_timeout_secs: u64,
    /// 事件发送超时（秒）。
    pub event_send_timeout_secs: u64,
    /// 设备在 Starting/Stopping 状态允许停留的最长时间（秒）。
    pub state_change_timeout_secs: u64,
    /// 连续失败阈值，达到即触发整连接重建。
    pub failure_threshold: u32,
}

impl DeviceDefaults {
    /// 状态切换超时。
    pub fn state_change_timeout(&self) -> Duration {
        Duration::from_secs(self.state_change_timeout_secs)
    }
}

impl Default for DeviceDefaults {
    fn default() -> Self {
        Self {
            sas_token_lifetime_secs: DEFAULT_SAS_TOKEN_LIFETIME_SECS,
            sas_token_refresh_secs: DEFAULT_SAS_TOKEN_REFRESH_SECS,
            cbs_request_timeout_secs: DEFAULT_CBS_REQUEST_TIMEOUT_SECS,
            event_send_timeout_secs: DEFAULT_EVENT_SEND_TIMEOUT_SECS,
            state_change_timeout_secs: DEFAULT_STATE_CHANGE_TIMEOUT_SECS,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }
}

/// 传输实例的构造配置。
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct TransportConfig {
    /// Hub 名称。
    #[serde(default)]
    pub iothub_name: String,
    /// Hub 域名后缀。
    #[serde(default)]
    pub iothub_suffix: String,
    /// 协议网关主机名；设置后覆盖 `name.suffix` 的拼接结果。
    #[serde(default)]
    pub protocol_gateway_host_name: Option<String>,
    /// 设备默认参数。
    #[serde(default)]
    pub defaults: DeviceDefaults,
}

impl TransportConfig {
    /// 以 Hub 名称与后缀构造配置，其余字段取默认值。
    pub fn new(iothub_name: impl Into<String>, iothub_suffix: impl Into<String>) -> Self {
        Self {
            iothub_name: iothub_name.into(),
            iothub_suffix: iothub_suffix.into(),
            ..Self::default()
        }
    }

    /// 设置协议网关主机名。
    pub fn with_gateway(mut self, host: impl Into<String>) -> Self {
        self.protocol_gateway_host_name = Some(host.into());
        self
    }

    /// 从 TOML 文本解析并校验。
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: TransportConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 校验必填字段与阈值。
    ///
    /// - 未设置网关时，`iothub_name` 与 `iothub_suffix` 必须非空；
    /// - 设置了网关时，网关主机名必须非空；
    /// - `failure_threshold` 必须大于 0。
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.protocol_gateway_host_name.as_deref() {
            Some(gateway) if gateway.trim().is_empty() => {
                return Err(ConfigError::MissingField {
                    field: "protocol_gateway_host_name",
                });
            }
            Some(_) => {}
            None => {
                if self.iothub_name.trim().is_empty() {
                    return Err(ConfigError::MissingField {
                        field: "iothub_name",
                    });
                }
                if self.iothub_suffix.trim().is_empty() {
                    return Err(ConfigError::MissingField {
                        field: "iothub_suffix",
                    });
                }
            }
        }
        if self.defaults.failure_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                field: "defaults.failure_threshold",
                detail: "threshold must be greater than zero".to_owned(),
            });
        }
        Ok(())
    }

    /// 最终连接的主机名。
    pub fn host_name(&self) -> String {
        match &self.protocol_gateway_host_name {
            Some(gateway) => gateway.clone(),
            None => format!("{}.{}", self.iothub_name, self.iothub_suffix),
        }
    }
}
