//! 替换模块统一错误处理
//!
//! 引擎本身从不因错误而停止运行：大部分错误在产生处被记录后吞掉，
//! 只有配置加载、文档解析与序列化会把错误返回给调用者。

use std::fmt;

use thiserror::Error;

/// 替换错误类型
#[derive(Error, Debug, Clone)]
pub enum SubstitutionError {
    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 词典内容无效
    #[error("词典无效: {0}")]
    InvalidDictionary(String),

    /// 某个词条在所有匹配层级上都无法编译
    #[error("无法编译词条 '{key}': {reason}")]
    PatternCompile { key: String, reason: String },

    /// 单个匹配器在某段文本上执行失败
    #[error("匹配器 '{key}' 执行失败: {reason}")]
    MatcherFailed { key: String, reason: String },

    /// DOM 写入失败（节点类型不符或已被移除）
    #[error("DOM写入失败: {0}")]
    DomWrite(String),

    /// 恢复原始值失败
    #[error("恢复失败: {0}")]
    RestoreFailed(String),

    /// 解析错误
    #[error("解析错误: {0}")]
    Parse(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    Serialization(String),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(String),
}

impl SubstitutionError {
    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            SubstitutionError::ConfigError(_) => ErrorSeverity::Critical,
            SubstitutionError::InvalidDictionary(_) => ErrorSeverity::Error,
            SubstitutionError::PatternCompile { .. } => ErrorSeverity::Warning,
            SubstitutionError::MatcherFailed { .. } => ErrorSeverity::Info,
            SubstitutionError::DomWrite(_) => ErrorSeverity::Info,
            SubstitutionError::RestoreFailed(_) => ErrorSeverity::Warning,
            SubstitutionError::Parse(_) => ErrorSeverity::Error,
            SubstitutionError::Serialization(_) => ErrorSeverity::Error,
            SubstitutionError::Io(_) => ErrorSeverity::Error,
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            SubstitutionError::ConfigError(_) => ErrorCategory::Configuration,
            SubstitutionError::InvalidDictionary(_) => ErrorCategory::Input,
            SubstitutionError::PatternCompile { .. } => ErrorCategory::Compilation,
            SubstitutionError::MatcherFailed { .. } => ErrorCategory::Matching,
            SubstitutionError::DomWrite(_) => ErrorCategory::Dom,
            SubstitutionError::RestoreFailed(_) => ErrorCategory::Dom,
            SubstitutionError::Parse(_) => ErrorCategory::Parsing,
            SubstitutionError::Serialization(_) => ErrorCategory::Serialization,
            SubstitutionError::Io(_) => ErrorCategory::Io,
        }
    }

    /// 引擎内部会吞掉的错误（不影响运行状态）
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Compilation | ErrorCategory::Matching | ErrorCategory::Dom
        )
    }

    /// 创建带上下文的错误
    pub fn with_context<T: fmt::Display>(self, context: T) -> Self {
        match self {
            SubstitutionError::ConfigError(msg) => {
                SubstitutionError::ConfigError(format!("{} (上下文: {})", msg, context))
            }
            SubstitutionError::DomWrite(msg) => {
                SubstitutionError::DomWrite(format!("{} (上下文: {})", msg, context))
            }
            SubstitutionError::RestoreFailed(msg) => {
                SubstitutionError::RestoreFailed(format!("{} (上下文: {})", msg, context))
            }
            SubstitutionError::Io(msg) => {
                SubstitutionError::Io(format!("{} (上下文: {})", msg, context))
            }
            other => other,
        }
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Input,
    Compilation,
    Matching,
    Dom,
    Parsing,
    Serialization,
    Io,
}

impl From<std::io::Error> for SubstitutionError {
    fn from(error: std::io::Error) -> Self {
        SubstitutionError::Io(error.to_string())
    }
}

impl From<serde_json::Error> for SubstitutionError {
    fn from(error: serde_json::Error) -> Self {
        SubstitutionError::InvalidDictionary(format!("JSON解析错误: {}", error))
    }
}

impl From<toml::de::Error> for SubstitutionError {
    fn from(error: toml::de::Error) -> Self {
        SubstitutionError::ConfigError(format!("TOML解析错误: {}", error))
    }
}

/// 错误结果类型别名
pub type SubstitutionResult<T> = Result<T, SubstitutionError>;

/// 错误处理助手函数
pub mod helpers {
    use super::*;

    /// 记录一个被吞掉的错误，按严重程度选择日志级别
    pub fn log_swallowed(error: &SubstitutionError) {
        match error.severity() {
            ErrorSeverity::Info => tracing::debug!("已忽略: {}", error),
            ErrorSeverity::Warning => tracing::warn!("已忽略: {}", error),
            ErrorSeverity::Error | ErrorSeverity::Critical => {
                tracing::error!("已忽略: {}", error)
            }
        }
    }

    /// 执行结果为错误时记录并丢弃
    pub fn swallow<T>(result: SubstitutionResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                log_swallowed(&error);
                None
            }
        }
    }

    /// 创建配置错误
    pub fn config_error<T: fmt::Display>(msg: T) -> SubstitutionError {
        SubstitutionError::ConfigError(msg.to_string())
    }
}
