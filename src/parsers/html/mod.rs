//! HTML解析和处理模块
//!
//! - `dom`: 基础DOM读写操作
//! - `serializer`: 序列化功能

pub mod dom;
pub mod serializer;

pub use dom::{
    append_child, child_element_count, closest_element, create_element, create_text,
    descendant_elements, descendant_text_nodes, detach, find_first_element, get_charset, get_node_attr,
    get_node_name, get_parent_element, get_parent_node, get_text_value, html_to_dom, is_element,
    is_inclusive_descendant, is_text, set_node_attr, text_content, NodeId,
};
pub use serializer::serialize_document;
