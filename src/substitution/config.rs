//! 替换引擎配置
//!
//! 提供默认常量、从 TOML 文件加载设置以及环境变量覆盖。

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::env::{self, EnvVar};
use crate::substitution::dictionary::Dictionary;
use crate::substitution::error::{helpers::config_error, SubstitutionError, SubstitutionResult};

/// 引擎配置常量
pub mod constants {
    /// 超过此字符数的文本容器/单节点将跳过替换
    pub const LONG_TEXT_THRESHOLD: usize = 80;
    /// 新增元素文本少于此字符数时立即处理
    pub const URGENT_TEXT_LIMIT: usize = 200;
    /// 子元素超过此数量时对该元素做完整遍历
    pub const FANOUT_LIMIT: usize = 8;
    /// 单批变更记录超过此数量时升级为紧急处理
    pub const BATCH_RECORD_LIMIT: usize = 8;
    /// 小型变更超过此数量时升级为紧急处理
    pub const BATCH_SMALL_LIMIT: usize = 6;
    pub const NAVIGATION_COOLDOWN_MS: u64 = 700;
    pub const IDLE_TIMEOUT_MS: u64 = 200;
    pub const FALLBACK_DELAY_MS: u64 = 50;

    pub const TRANSLATABLE_ATTRS: &[&str] = &["placeholder", "title", "alt", "aria-label", "value"];

    /// 其内容永远不做替换的元素
    pub const SKIP_ELEMENTS: &[&str] = &[
        "script", "style", "noscript", "textarea", "code", "pre", "input", "select", "option",
    ];

    /// 查找文本容器时视为块级的元素
    pub const BLOCK_CONTAINER_ELEMENTS: &[&str] = &[
        "p",
        "div",
        "section",
        "article",
        "li",
        "td",
        "th",
        "header",
        "footer",
        "main",
        "aside",
        "nav",
        "figure",
        "figcaption",
        "blockquote",
        "pre",
    ];
}

/// 引擎设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// 长文本阈值（字符数）
    pub long_text_threshold: usize,
    /// 新增元素被视为小型变更的文本上限
    pub urgent_text_limit: usize,
    /// 定向遍历时的子元素扇出上限
    pub fanout_limit: usize,
    /// 批次记录数升级阈值
    pub batch_record_limit: usize,
    /// 小型变更数升级阈值
    pub batch_small_limit: usize,
    /// 导航信号的冷却时间
    pub navigation_cooldown_ms: u64,
    /// 空闲回调的超时
    pub idle_timeout_ms: u64,
    /// 既无动画帧也无空闲回调时的定时器延迟
    pub fallback_delay_ms: u64,
    /// 可替换的属性白名单
    pub translatable_attributes: Vec<String>,
    /// 初始词典，默认为空
    ///
    /// 内置词表需要显式加入：`mapping = Dictionary::builtin()`，
    /// 或在 `EnableConfig::with_mapping` 中传入；命令行对应 `--builtin`。
    pub mapping: Dictionary,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            long_text_threshold: constants::LONG_TEXT_THRESHOLD,
            urgent_text_limit: constants::URGENT_TEXT_LIMIT,
            fanout_limit: constants::FANOUT_LIMIT,
            batch_record_limit: constants::BATCH_RECORD_LIMIT,
            batch_small_limit: constants::BATCH_SMALL_LIMIT,
            navigation_cooldown_ms: constants::NAVIGATION_COOLDOWN_MS,
            idle_timeout_ms: constants::IDLE_TIMEOUT_MS,
            fallback_delay_ms: constants::FALLBACK_DELAY_MS,
            translatable_attributes: constants::TRANSLATABLE_ATTRS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            mapping: Dictionary::default(),
        }
    }
}

impl Settings {
    /// 从 TOML 文本加载
    pub fn from_toml_str(content: &str) -> SubstitutionResult<Self> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// 从 TOML 文件加载
    pub fn from_file<P: AsRef<Path>>(path: P) -> SubstitutionResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| SubstitutionError::from(e).with_context(path.display()))?;
        Self::from_toml_str(&content).map_err(|e| e.with_context(path.display()))
    }

    /// 按 `RELABEL_CONFIG` 加载（未设置则使用默认值），再应用环境变量覆盖
    pub fn load() -> SubstitutionResult<Self> {
        let mut settings = match env::ConfigPath::get().map_err(config_error)? {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_env_overrides()?;
        Ok(settings)
    }

    /// 应用环境变量覆盖
    pub fn apply_env_overrides(&mut self) -> SubstitutionResult<()> {
        if let Some(threshold) = env::LongTextThreshold::get().map_err(config_error)? {
            tracing::debug!("长文本阈值由环境变量覆盖为 {}", threshold);
            self.long_text_threshold = threshold;
        }
        self.validate()
    }

    /// 验证配置
    pub fn validate(&self) -> SubstitutionResult<()> {
        if self.long_text_threshold == 0 {
            return Err(config_error("long_text_threshold 必须大于 0"));
        }
        if self.fanout_limit == 0 {
            return Err(config_error("fanout_limit 必须大于 0"));
        }
        if self.translatable_attributes.is_empty() {
            return Err(config_error("translatable_attributes 不能为空"));
        }
        if self
            .translatable_attributes
            .iter()
            .any(|name| name.trim().is_empty())
        {
            return Err(config_error("translatable_attributes 包含空属性名"));
        }
        Ok(())
    }

    pub fn navigation_cooldown(&self) -> Duration {
        Duration::from_millis(self.navigation_cooldown_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn fallback_delay(&self) -> Duration {
        Duration::from_millis(self.fallback_delay_ms)
    }
}

/// `enable` 的参数
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnableConfig {
    /// 启用前合并进词典的词条
    pub merge_mapping: Dictionary,
}

impl EnableConfig {
    pub fn with_mapping(merge_mapping: Dictionary) -> Self {
        Self { merge_mapping }
    }
}
