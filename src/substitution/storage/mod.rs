//! 原始值存储模块

pub mod originals;

pub use originals::{OriginalStore, RestoreReport};
