//! # options 模块
//!
//! ## 核心意图（Why）
//! - 传输层对外只暴露一个 `SetOption(name, value)` 入口，但不同名字的处理路径完全不同：
//!   设备默认参数需要广播到所有设备，日志开关作用于连接，证书材料会锁定认证模式，
//!   其余名字原样透传给安全传输；
//! - 本模块负责把“字符串名字”归类为 [`TransportOption`]，并定义值类型 [`OptionValue`]
//!   与安全传输选项快照 [`OptionSet`]。
//!
//! ## 行为契约（What）
//! - 选项名是线上稳定字符串，常量一经发布不得修改；
//! - [`OptionSet`] 按首次插入顺序保存条目，重复插入同名选项会原地覆盖，重放时顺序稳定。

use std::time::Duration;

use bytes::Bytes;

/// SAS 令牌有效期（秒）。
pub const OPTION_SAS_TOKEN_LIFETIME: &str = "sas_token_lifetime";
/// SAS 令牌提前刷新时长（秒）。
pub const OPTION_SAS_TOKEN_REFRESH_TIME: &str = "sas_token_refresh_time";
/// CBS 令牌交换请求超时（秒）。
pub const OPTION_CBS_REQUEST_TIMEOUT: &str = "cbs_request_timeout";
/// 事件发送超时（秒）。
pub const OPTION_EVENT_SEND_TIMEOUT_SECS: &str = "event_send_timeout_secs";
/// 协议帧跟踪开关。
pub const OPTION_LOG_TRACE: &str = "logtrace";
/// X.509 证书。
pub const OPTION_X509_CERT: &str = "x509certificate";
/// X.509 私钥。
pub const OPTION_X509_PRIVATE_KEY: &str = "x509privatekey";

/// 选项值。
///
/// # 教案式说明
/// - **意图 (Why)**：不同选项的值形态不同（秒数、布尔、证书文本、二进制材料），以枚举
///   代替无类型指针，让解析失败在边界处显式暴露；
/// - **契约 (What)**：`Seconds` 与非负 `Integer` 都可以被解释为时长，见 [`OptionValue::as_seconds`]。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OptionValue {
    /// 以秒计的时长。
    Seconds(u64),
    /// 通用整数。
    Integer(i64),
    /// 布尔开关。
    Bool(bool),
    /// 文本（证书、代理地址等）。
    Text(String),
    /// 二进制材料。
    Bytes(Bytes),
}

impl OptionValue {
    /// 将值解释为时长；负数与非数值返回 `None`。
    pub fn as_seconds(&self) -> Option<Duration> {
        match self {
            OptionValue::Seconds(secs) => Some(Duration::from_secs(*secs)),
            OptionValue::Integer(value) => u64::try_from(*value).ok().map(Duration::from_secs),
            _ => None,
        }
    }

    /// 将值解释为布尔开关。
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    /// 将值解释为文本。
    pub fn as_text(&self) -> Option<&str> {
        match self {
            OptionValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// 需要复制到每个设备上的默认参数。
///
/// - **契约 (What)**：事件发送超时对所有设备生效；其余三项只对基于声明（CBS）认证的设备
///   有意义，见 [`DeviceTunable::requires_claims`]。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DeviceTunable {
    /// SAS 令牌有效期。
    SasTokenLifetime,
    /// SAS 令牌提前刷新时长。
    SasTokenRefreshTime,
    /// CBS 请求超时。
    CbsRequestTimeout,
    /// 事件发送超时。
    EventSendTimeout,
}

impl DeviceTunable {
    /// 全部可复制参数，顺序即复制顺序。
    pub const ALL: [DeviceTunable; 4] = [
        DeviceTunable::EventSendTimeout,
        DeviceTunable::CbsRequestTimeout,
        DeviceTunable::SasTokenLifetime,
        DeviceTunable::SasTokenRefreshTime,
    ];

    /// 对应的稳定选项名。
    pub fn option_name(self) -> &'static str {
        match self {
            DeviceTunable::SasTokenLifetime => OPTION_SAS_TOKEN_LIFETIME,
            DeviceTunable::SasTokenRefreshTime => OPTION_SAS_TOKEN_REFRESH_TIME,
            DeviceTunable::CbsRequestTimeout => OPTION_CBS_REQUEST_TIMEOUT,
            DeviceTunable::EventSendTimeout => OPTION_EVENT_SEND_TIMEOUT_SECS,
        }
    }

    /// 参数是否只对声明式认证设备生效。
    pub fn requires_claims(self) -> bool {
        !matches!(self, DeviceTunable::EventSendTimeout)
    }
}

/// 选项名的分类结果。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransportOption<'a> {
    /// 设备默认参数，需要广播。
    Device(DeviceTunable),
    /// 协议帧跟踪开关。
    LogTrace,
    /// X.509 证书，锁定证书认证模式后透传。
    X509Certificate,
    /// X.509 私钥，锁定证书认证模式后透传。
    X509PrivateKey,
    /// 未识别的名字，原样透传给安全传输。
    Passthrough(&'a str),
}

impl<'a> TransportOption<'a> {
    /// 按名字归类；名字区分大小写。
    pub fn classify(name: &'a str) -> Self {
        match name {
            OPTION_SAS_TOKEN_LIFETIME => TransportOption::Device(DeviceTunable::SasTokenLifetime),
            OPTION_SAS_TOKEN_REFRESH_TIME => {
                TransportOption::Device(DeviceTunable::SasTokenRefreshTime)
            }
            OPTION_CBS_REQUEST_TIMEOUT => TransportOption::Device(DeviceTunable::CbsRequestTimeout),
            OPTION_EVENT_SEND_TIMEOUT_SECS => {
                TransportOption::Device(DeviceTunable::EventSendTimeout)
            }
            OPTION_LOG_TRACE => TransportOption::LogTrace,
            OPTION_X509_CERT => TransportOption::X509Certificate,
            OPTION_X509_PRIVATE_KEY => TransportOption::X509PrivateKey,
            other => TransportOption::Passthrough(other),
        }
    }

    /// 是否属于证书材料。
    pub fn is_certificate_material(self) -> bool {
        matches!(
            self,
            TransportOption::X509Certificate | TransportOption::X509PrivateKey
        )
    }
}

/// 安全传输的选项快照。
///
/// # 教案式说明
/// - **意图 (Why)**：重连时安全传输会被整体销毁重建，先前协商/设置过的选项必须能够回放到
///   新实例上；快照即回放的载体；
/// - **契约 (What)**：条目保持首次插入顺序；同名插入覆盖旧值但不改变位置；
/// - **风险 (Trade-offs)**：线性查找，适用于条目数量很少（个位数到数十）的选项集合。
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct OptionSet {
    entries: Vec<(String, OptionValue)>,
}

impl OptionSet {
    /// 创建空快照。
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入或覆盖一个选项，返回被覆盖的旧值。
    pub fn insert(&mut self, name: impl Into<String>, value: OptionValue) -> Option<OptionValue> {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((name, value));
                None
            }
        }
    }

    /// 按名字读取。
    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    /// 按插入顺序遍历。
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    /// 条目数量。
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空。
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N: Into<String>> FromIterator<(N, OptionValue)> for OptionSet {
    fn from_iter<I: IntoIterator<Item = (N, OptionValue)>>(iter: I) -> Self {
        let mut set = OptionSet::new();
        for (name, value) in iter {
            set.insert(name, value);
        }
        set
    }
}
