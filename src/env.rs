//! 环境变量管理
//!
//! 类型安全、可验证的环境变量访问，用于覆盖配置文件中的值。

use std::env;
use std::fmt;
use std::path::PathBuf;

/// 环境变量解析错误
#[derive(Debug, Clone)]
pub struct EnvError {
    pub variable: String,
    pub message: String,
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment variable '{}': {}", self.variable, self.message)
    }
}

impl std::error::Error for EnvError {}

pub type EnvResult<T> = Result<T, EnvError>;

/// 环境变量访问器特性
pub trait EnvVar<T> {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    /// 未设置时返回 `Ok(None)`，设置了但无效时返回错误
    fn get() -> EnvResult<Option<T>> {
        match env::var(Self::NAME) {
            Ok(value) => Self::parse(&value).map(Some),
            Err(_) => Ok(None),
        }
    }

    fn get_or_default(default: T) -> T {
        Self::get().ok().flatten().unwrap_or(default)
    }
}

/// 日志级别
pub struct LogLevel;
impl EnvVar<String> for LogLevel {
    const NAME: &'static str = "RELABEL_LOG_LEVEL";
    const DESCRIPTION: &'static str = "Log level: trace, debug, info, warn, error";

    fn parse(value: &str) -> EnvResult<String> {
        match value.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(value.to_lowercase()),
            _ => Err(EnvError {
                variable: Self::NAME.to_string(),
                message: format!(
                    "Invalid log level '{}'. Use: trace, debug, info, warn, error",
                    value
                ),
            }),
        }
    }
}

/// 禁用颜色输出
pub struct NoColor;
impl EnvVar<bool> for NoColor {
    const NAME: &'static str = "NO_COLOR";
    const DESCRIPTION: &'static str = "Disable colored output when set to any value";

    fn parse(value: &str) -> EnvResult<bool> {
        // NO_COLOR 遵循标准：任何非空值都表示禁用颜色
        Ok(!value.is_empty())
    }
}

/// 长文本阈值
pub struct LongTextThreshold;
impl EnvVar<usize> for LongTextThreshold {
    const NAME: &'static str = "RELABEL_LONG_TEXT_THRESHOLD";
    const DESCRIPTION: &'static str =
        "Texts and containers longer than this many characters are never substituted";

    fn parse(value: &str) -> EnvResult<usize> {
        match value.trim().parse::<usize>() {
            Ok(0) => Err(EnvError {
                variable: Self::NAME.to_string(),
                message: "Threshold must be greater than zero".to_string(),
            }),
            Ok(n) => Ok(n),
            Err(_) => Err(EnvError {
                variable: Self::NAME.to_string(),
                message: format!("Invalid number '{}'", value),
            }),
        }
    }
}

/// 配置文件路径
pub struct ConfigPath;
impl EnvVar<PathBuf> for ConfigPath {
    const NAME: &'static str = "RELABEL_CONFIG";
    const DESCRIPTION: &'static str = "Path to a TOML settings file";

    fn parse(value: &str) -> EnvResult<PathBuf> {
        if value.trim().is_empty() {
            return Err(EnvError {
                variable: Self::NAME.to_string(),
                message: "Path must not be empty".to_string(),
            });
        }
        Ok(PathBuf::from(value))
    }
}

/// 所有已知变量及其说明
pub fn describe_all() -> Vec<(&'static str, &'static str)> {
    vec![
        (LogLevel::NAME, LogLevel::DESCRIPTION),
        (NoColor::NAME, NoColor::DESCRIPTION),
        (LongTextThreshold::NAME, LongTextThreshold::DESCRIPTION),
        (ConfigPath::NAME, ConfigPath::DESCRIPTION),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::parse("DEBUG").unwrap(), "debug");
        assert_eq!(LogLevel::parse("warn").unwrap(), "warn");
        assert!(LogLevel::parse("loud").is_err());
    }

    #[test]
    fn test_threshold_parsing() {
        assert_eq!(LongTextThreshold::parse("120").unwrap(), 120);
        assert_eq!(LongTextThreshold::parse(" 40 ").unwrap(), 40);
        assert!(LongTextThreshold::parse("0").is_err());
        assert!(LongTextThreshold::parse("many").is_err());
    }

    #[test]
    fn test_no_color_any_value_disables() {
        assert!(NoColor::parse("1").unwrap());
        assert!(!NoColor::parse("").unwrap());
    }

    #[test]
    fn test_config_path_rejects_blank() {
        assert!(ConfigPath::parse("  ").is_err());
        assert_eq!(
            ConfigPath::parse("relabel.toml").unwrap(),
            PathBuf::from("relabel.toml")
        );
    }

    #[test]
    fn test_describe_all_lists_every_variable() {
        let names: Vec<&str> = describe_all().into_iter().map(|(n, _)| n).collect();
        assert!(names.contains(&"RELABEL_LONG_TEXT_THRESHOLD"));
        assert_eq!(names.len(), 4);
    }
}
