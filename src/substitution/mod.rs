//! 文本替换模块
//!
//! 按词典把页面中的短界面文本替换为目标文本，跟随 DOM 变化持续生效，并可完整回滚：
//! - **config**: 设置、常量与启用参数
//! - **dictionary**: 词典
//! - **error**: 错误类型与吞错辅助函数
//! - **pipeline**: 模式编译、资格过滤、替换与遍历
//! - **storage**: 原始值存储
//! - **core**: 引擎、调度器与导航信号

pub mod config;
pub mod core;
pub mod dictionary;
pub mod error;
pub mod pipeline;
pub mod storage;

pub use config::{constants, EnableConfig, Settings};
pub use core::{Engine, EngineStats, HistoryNavigation, NavigationObserver, SchedulerState};
pub use dictionary::Dictionary;
pub use error::{ErrorCategory, ErrorSeverity, SubstitutionError, SubstitutionResult};
pub use pipeline::{compile, replace_string, EligibilityFilter, MatcherSet, SkipReason, Translator};
pub use storage::{OriginalStore, RestoreReport};
