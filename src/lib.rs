//! # Relabel Library
//!
//! 在活动的 HTML 文档中把界面短文本按词典替换为目标文本，
//! 跟随 DOM 变化持续生效，并能精确回滚全部修改。
//!
//! ## 模块组织
//!
//! - `core` - 离线处理入口（读取、替换、序列化）
//! - `document` - 可观察的活动文档与变更记录
//! - `host` - 任务宿主接口与确定性事件循环
//! - `parsers` - HTML 解析、DOM 读写与序列化
//! - `substitution` - 替换引擎（编译、过滤、替换、遍历、调度、回滚）
//! - `env` - 环境变量

pub mod core;
pub mod document;
pub mod env;
pub mod host;
pub mod parsers;
pub mod substitution;

// Re-export commonly used items for convenience
pub use core::*;
pub use document::LiveDocument;
pub use host::{EventLoop, HostCapabilities, TaskHost};
pub use substitution::{Dictionary, EnableConfig, Engine, Settings};
