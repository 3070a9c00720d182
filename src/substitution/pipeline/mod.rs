//! 替换处理管道
//!
//! 编译 → 过滤 → 替换 → 遍历

pub mod applier;
pub mod compiler;
pub mod filters;
pub mod walker;

pub use applier::replace_string;
pub use compiler::{compile, compile_with, BoundaryCapabilities, BoundaryStrategy, Matcher, MatcherSet};
pub use filters::{EligibilityFilter, SkipReason};
pub use walker::{Translator, WalkReport};
