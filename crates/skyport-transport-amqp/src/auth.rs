//! # auth：凭据形态与传输级认证模式
//!
//! ## 核心意图（Why）
//! - 所有设备共享同一条连接，而连接只能以一种方式认证：要么建立 SASL + CBS 令牌交换通道，
//!   要么依赖 TLS 客户端证书；因此传输持有一个“首选认证模式”，由第一个成功注册的设备
//!   （或证书类选项）锁定，此后不再改变；
//! - 本模块负责判定一个设备的凭据形态能否在当前模式下被接受。
//!
//! ## 行为契约（What）
//! - 同时提供对称密钥与 SAS 令牌永远非法；
//! - `Claims` 模式要求二者之一；`Certificate` 模式要求二者皆无；`Unset` 模式接受任意合法形态。

use skyport_core::collaborators::{ConnectionAuth, DeviceAuth};

use crate::error::RegistrationError;

/// 传输的首选认证模式。
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum PreferredAuthMode {
    /// 尚未锁定。
    #[default]
    Unset,
    /// 基于声明（CBS）的令牌认证。
    Claims,
    /// 基于 X.509 证书的认证。
    Certificate,
}

impl PreferredAuthMode {
    /// 锁定后的连接形态；未锁定时为 `None`。
    pub fn connection_auth(self) -> Option<ConnectionAuth> {
        match self {
            PreferredAuthMode::Unset => None,
            PreferredAuthMode::Claims => Some(ConnectionAuth::Claims),
            PreferredAuthMode::Certificate => Some(ConnectionAuth::Certificate),
        }
    }

    /// 若尚未锁定，则锁定为 `auth` 对应的模式；已锁定时保持不变。
    pub(crate) fn latch(&mut self, auth: ConnectionAuth) {
        if *self == PreferredAuthMode::Unset {
            *self = match auth {
                ConnectionAuth::Claims => PreferredAuthMode::Claims,
                ConnectionAuth::Certificate => PreferredAuthMode::Certificate,
            };
        }
    }
}

/// 应用提交的设备注册请求。
///
/// # 教案式说明
/// - **意图 (Why)**：注册请求保留调用方给出的原始形态（包括“身份缺失”“双凭据”等非法组合），
///   以便在边界处给出准确的错误，而不是在类型层面提前丢失信息；
/// - **契约 (What)**：`device_id` 为空或缺失时注册以配置错误失败。
#[derive(Clone, Default, Eq, PartialEq)]
pub struct DeviceRegistration {
    device_id: Option<String>,
    device_key: Option<String>,
    device_sas_token: Option<String>,
}

impl DeviceRegistration {
    /// 以设备标识构造不带凭据的请求（证书认证形态）。
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: Some(device_id.into()),
            ..Self::default()
        }
    }

    /// 构造没有设备标识的请求。
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// 附加对称密钥。
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.device_key = Some(key.into());
        self
    }

    /// 附加预计算的 SAS 令牌。
    pub fn with_sas_token(mut self, token: impl Into<String>) -> Self {
        self.device_sas_token = Some(token.into());
        self
    }

    /// 设备标识。
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }
}

impl std::fmt::Debug for DeviceRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistration")
            .field("device_id", &self.device_id)
            .field("has_key", &self.device_key.is_some())
            .field("has_sas_token", &self.device_sas_token.is_some())
            .finish()
    }
}

/// 判定凭据形态是否可在 `mode` 下接受，并给出设备会话使用的凭据。
pub(crate) fn accept_credentials(
    device_id: &str,
    registration: &DeviceRegistration,
    mode: PreferredAuthMode,
) -> Result<DeviceAuth, RegistrationError> {
    let auth = match (&registration.device_key, &registration.device_sas_token) {
        (Some(_), Some(_)) => {
            return Err(RegistrationError::ConflictingCredentials {
                device_id: device_id.to_owned(),
            });
        }
        (Some(key), None) => DeviceAuth::SymmetricKey(key.clone()),
        (None, Some(token)) => DeviceAuth::SasToken(token.clone()),
        (None, None) => DeviceAuth::X509,
    };

    let compatible = match mode {
        PreferredAuthMode::Unset => true,
        PreferredAuthMode::Claims => auth.uses_claims(),
        PreferredAuthMode::Certificate => !auth.uses_claims(),
    };
    if compatible {
        Ok(auth)
    } else {
        Err(RegistrationError::IncompatibleCredentials {
            device_id: device_id.to_owned(),
            mode,
        })
    }
}

/// 凭据对应的连接形态。
pub(crate) fn connection_auth_of(auth: &DeviceAuth) -> ConnectionAuth {
    if auth.uses_claims() {
        ConnectionAuth::Claims
    } else {
        ConnectionAuth::Certificate
    }
}
