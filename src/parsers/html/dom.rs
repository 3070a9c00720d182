use std::cell::RefCell;
use std::rc::Rc;

use encoding_rs::Encoding;
use html5ever::interface::{Attribute, QualName};
use html5ever::parse_document;
use html5ever::tendril::{format_tendril, StrTendril, TendrilSink};
use html5ever::{namespace_url, ns, LocalName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom};

use crate::substitution::error::{SubstitutionError, SubstitutionResult};

/// 节点身份，基于 `Rc` 指针
///
/// 只有在持有对应 `Handle` 时才稳定（指针不会被复用）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn of(node: &Handle) -> Self {
        NodeId(Rc::as_ptr(node) as usize)
    }
}

/// 将 HTML 字节转换为 DOM
pub fn html_to_dom(data: &[u8], document_encoding: &str) -> SubstitutionResult<RcDom> {
    let s = match Encoding::for_label(document_encoding.as_bytes()) {
        Some(encoding) => encoding.decode(data).0.into_owned(),
        None => String::from_utf8_lossy(data).into_owned(),
    };

    parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut s.as_bytes())
        .map_err(|e| SubstitutionError::Parse(e.to_string()))
}

/// 查找指定名称的第一个后代元素（深度优先）
pub fn find_first_element(node: &Handle, node_name: &str) -> Option<Handle> {
    if get_node_name(node) == Some(node_name) {
        return Some(node.clone());
    }
    node.children
        .borrow()
        .iter()
        .find_map(|child| find_first_element(child, node_name))
}

/// 从 `<meta charset>` 或 `<meta http-equiv="content-type">` 读取文档编码
pub fn get_charset(node: &Handle) -> Option<String> {
    let mut metas = Vec::new();
    collect_nodes(node, &mut metas, &|n: &Handle| get_node_name(n) == Some("meta"));

    for meta in metas.iter() {
        if let Some(charset) = get_node_attr(meta, "charset") {
            return Some(charset.trim().to_string());
        }

        if get_node_attr(meta, "http-equiv")
            .unwrap_or_default()
            .eq_ignore_ascii_case("content-type")
        {
            let content = get_node_attr(meta, "content").unwrap_or_default();
            let charset = content.split(';').find_map(|part| {
                let (name, value) = part.split_once('=')?;
                name.trim()
                    .eq_ignore_ascii_case("charset")
                    .then(|| value.trim().trim_matches('"').to_string())
            });
            if charset.is_some() {
                return charset;
            }
        }
    }

    None
}

/// 获取节点属性值
pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => {
            for attr in attrs.borrow().iter() {
                if &*attr.name.local == attr_name {
                    return Some(attr.value.to_string());
                }
            }
            None
        }
        _ => None,
    }
}

/// 获取节点名称
pub fn get_node_name(node: &Handle) -> Option<&'_ str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

pub fn is_element(node: &Handle) -> bool {
    matches!(node.data, NodeData::Element { .. })
}

pub fn is_text(node: &Handle) -> bool {
    matches!(node.data, NodeData::Text { .. })
}

/// 获取父节点（不会取走节点上的父引用）
pub fn get_parent_node(child: &Handle) -> Option<Handle> {
    let weak = child.parent.take();
    let parent = weak.as_ref().and_then(|node| node.upgrade());
    child.parent.set(weak);
    parent
}

/// 获取父元素；父节点是文档本身时返回 `None`
pub fn get_parent_element(child: &Handle) -> Option<Handle> {
    get_parent_node(child).filter(is_element)
}

/// 节点本身或其最近的元素祖先
pub fn closest_element(node: &Handle) -> Option<Handle> {
    if is_element(node) {
        Some(node.clone())
    } else {
        get_parent_element(node)
    }
}

/// 判断 `node` 是否为 `root` 或位于其子树内
pub fn is_inclusive_descendant(node: &Handle, root: &Handle) -> bool {
    let mut current = Some(node.clone());
    while let Some(n) = current {
        if Rc::ptr_eq(&n, root) {
            return true;
        }
        current = get_parent_node(&n);
    }
    false
}

pub fn child_element_count(node: &Handle) -> usize {
    node.children.borrow().iter().filter(|c| is_element(c)).count()
}

/// 文本节点的当前值
pub fn get_text_value(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Text { contents } => Some(contents.borrow().to_string()),
        _ => None,
    }
}

/// 子树中所有文本节点的拼接（等价于 `textContent`）
pub fn text_content(node: &Handle) -> String {
    let mut out = String::new();
    collect_text(node, &mut out);
    out
}

fn collect_text(node: &Handle, out: &mut String) {
    match &node.data {
        NodeData::Text { contents } => out.push_str(&contents.borrow()),
        _ => {
            for child in node.children.borrow().iter() {
                collect_text(child, out);
            }
        }
    }
}

/// 按文档顺序收集子树内的文本节点（包含根本身）
pub fn descendant_text_nodes(root: &Handle) -> Vec<Handle> {
    let mut found = Vec::new();
    collect_nodes(root, &mut found, &is_text);
    found
}

/// 按文档顺序收集子树内的元素（包含根本身）
pub fn descendant_elements(root: &Handle) -> Vec<Handle> {
    let mut found = Vec::new();
    collect_nodes(root, &mut found, &is_element);
    found
}

fn collect_nodes(node: &Handle, found: &mut Vec<Handle>, pred: &dyn Fn(&Handle) -> bool) {
    if pred(node) {
        found.push(node.clone());
    }
    for child in node.children.borrow().iter() {
        collect_nodes(child, found, pred);
    }
}

/// 新建一个游离的元素节点
pub fn create_element(name: &str, attributes: &[(&str, &str)]) -> Handle {
    let attrs = attributes
        .iter()
        .map(|(k, v)| Attribute {
            name: QualName::new(None, ns!(), LocalName::from(*k)),
            value: format_tendril!("{}", v),
        })
        .collect();

    Node::new(NodeData::Element {
        name: QualName::new(None, ns!(html), LocalName::from(name)),
        attrs: RefCell::new(attrs),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    })
}

/// 新建一个游离的文本节点
pub fn create_text(value: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from_slice(value)),
    })
}

/// 写入文本节点的值
pub fn set_text_value(node: &Handle, value: &str) -> SubstitutionResult<()> {
    match &node.data {
        NodeData::Text { contents } => {
            let mut contents = contents.borrow_mut();
            contents.clear();
            contents.push_slice(value);
            Ok(())
        }
        _ => Err(SubstitutionError::DomWrite(
            "target is not a text node".to_string(),
        )),
    }
}

/// 将子节点追加到父节点末尾（先从原父节点摘除）
pub fn append_child(parent: &Handle, child: &Handle) {
    detach(child);
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child.clone());
}

/// 从父节点摘除；返回原父节点
pub fn detach(node: &Handle) -> Option<Handle> {
    let parent = get_parent_node(node)?;
    parent
        .children
        .borrow_mut()
        .retain(|child| !Rc::ptr_eq(child, node));
    node.parent.set(None);
    Some(parent)
}

/// 用单个文本节点替换元素的全部子节点（`innerText` 赋值）
///
/// 返回 (被移除的子节点, 新增的文本节点)。
pub fn replace_children_with_text(
    element: &Handle,
    value: &str,
) -> SubstitutionResult<(Vec<Handle>, Option<Handle>)> {
    if !is_element(element) {
        return Err(SubstitutionError::DomWrite(
            "inner text can only be written to an element".to_string(),
        ));
    }

    let removed: Vec<Handle> = element.children.borrow_mut().drain(..).collect();
    for child in removed.iter() {
        child.parent.set(None);
    }

    if value.is_empty() {
        return Ok((removed, None));
    }

    let text = create_text(value);
    text.parent.set(Some(Rc::downgrade(element)));
    element.children.borrow_mut().push(text.clone());
    Ok((removed, Some(text)))
}

/// 设置节点属性；`None` 表示删除该属性
pub fn set_node_attr(
    node: &Handle,
    attr_name: &str,
    attr_value: Option<&str>,
) -> SubstitutionResult<()> {
    let NodeData::Element { attrs, .. } = &node.data else {
        return Err(SubstitutionError::DomWrite(format!(
            "cannot set attribute '{}' on a non-element node",
            attr_name
        )));
    };

    let attrs_mut = &mut attrs.borrow_mut();
    let mut found_existing_attr = false;

    attrs_mut.retain_mut(|attr| {
        if &*attr.name.local != attr_name {
            return true;
        }
        found_existing_attr = true;
        match attr_value {
            Some(value) => {
                attr.value.clear();
                attr.value.push_slice(value);
                true
            }
            // Remove attr completely if attr_value is not defined
            None => false,
        }
    });

    if !found_existing_attr {
        if let Some(value) = attr_value {
            attrs_mut.push(Attribute {
                name: QualName::new(None, ns!(), LocalName::from(attr_name)),
                value: format_tendril!("{}", value),
            });
        }
    }

    Ok(())
}
