//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 协作方（连接、设备会话、安全传输）的每一次同步调用都可能失败，编排层只关心
//!   “哪个操作失败、失败属于哪一类”，并据此决定计数、重试或直接上报；
//! - 将这类失败收敛为单一结构 [`CollaboratorError`]，避免协作方实现各自定义错误类型，
//!   让编排层无需为每个实现编写转换样板。
//!
//! ## 设计要求（What）
//! - `operation` 使用 `'static` 字符串，约定为 `<协作方>.<动作>`，例如 `device.start_async`；
//! - `detail` 面向排障人员，避免包含密钥或令牌原文。

use thiserror::Error;

/// 协作方失败的处置分类。
///
/// - **意图 (Why)**：编排层在记录日志与映射对外状态码时需要区分“参数非法”与“运行期失败”；
/// - **契约 (What)**：未显式标记时默认 [`ErrorCategory::NonRetryable`]。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// 暂时性失败，后续 Tick 可以再次尝试。
    Retryable,
    /// 非暂时性失败。
    #[default]
    NonRetryable,
    /// 调用方提供的参数不被协作方接受。
    InvalidArgument,
    /// 协作方内部超时。
    Timeout,
}

/// 协作方同步调用失败时返回的统一错误。
///
/// # 教案式说明
/// - **意图 (Why)**：编排层的重试与升级策略只依赖“失败发生了”这一事实，但排障需要知道
///   具体是哪个操作；结构体同时承载两者。
/// - **契约 (What)**：
///   - `operation`：稳定的操作名，作为日志字段输出；
///   - `detail`：可读描述；
///   - `category`：处置分类，默认 `NonRetryable`。
/// - **风险 (Trade-offs)**：`detail` 使用 `String` 保存，牺牲少量堆分配换取易读性。
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("collaborator operation `{operation}` failed: {detail}")]
pub struct CollaboratorError {
    operation: &'static str,
    detail: String,
    category: ErrorCategory,
}

impl CollaboratorError {
    /// 以操作名与描述构造错误。
    pub fn new(operation: &'static str, detail: impl Into<String>) -> Self {
        Self {
            operation,
            detail: detail.into(),
            category: ErrorCategory::default(),
        }
    }

    /// 覆盖处置分类。
    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = category;
        self
    }

    /// 失败的操作名。
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// 可读描述。
    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// 处置分类。
    pub fn category(&self) -> ErrorCategory {
        self.category
    }
}
