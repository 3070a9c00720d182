//! # 解析器模块
//!
//! HTML文档解析、DOM读写与序列化。

pub mod html;

pub use html::{html_to_dom, serialize_document};
