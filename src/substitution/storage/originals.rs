//! 原始值存储
//!
//! 在引擎第一次修改某个文本节点、元素文本或属性之前记录它的原值，
//! 以便 `disable(true)` 时精确回滚。每个 节点/属性 在一次启用周期内
//! 只写入一次（先写者胜），因此恢复的永远是引擎接触之前的值。
//!
//! 同时记录引擎最后一次写入的值：当前值仍等于它时，说明节点没有被页面改动过，
//! 不必再次替换（替换结果中含有词条时也不会被重复展开）。

use std::collections::{BTreeMap, HashMap};

use markup5ever_rcdom::Handle;

use crate::document::LiveDocument;
use crate::parsers::html::dom::{get_text_value, NodeId};
use crate::substitution::error::helpers::log_swallowed;
use crate::substitution::error::SubstitutionError;

/// 文本节点的原值
#[derive(Debug, Clone)]
struct TextRecord {
    node: Handle,
    value: String,
    written: Option<String>,
}

/// 元素的原值：拼接文本（仅在引擎改写过元素文本时）以及逐个属性的原值
#[derive(Debug, Clone)]
struct ElementRecord {
    node: Handle,
    inner_text: Option<String>,
    written_text: Option<String>,
    /// `None` 表示修改前该属性不存在
    attrs: BTreeMap<String, Option<String>>,
    written_attrs: BTreeMap<String, String>,
}

/// 回滚结果统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: usize,
    pub failed: usize,
}

/// 原始值存储
#[derive(Debug, Default)]
pub struct OriginalStore {
    texts: Vec<TextRecord>,
    text_index: HashMap<NodeId, usize>,
    elements: Vec<ElementRecord>,
    element_index: HashMap<NodeId, usize>,
    /// 引擎改写元素文本时新建的文本节点；没有原值可恢复，只记录写入值
    created_texts: HashMap<NodeId, (Handle, String)>,
}

impl OriginalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录文本节点的当前值（已有记录时不做任何事）
    pub fn record_text_once(&mut self, node: &Handle) {
        let id = NodeId::of(node);
        if self.text_index.contains_key(&id) {
            return;
        }
        let Some(value) = get_text_value(node) else {
            return;
        };
        self.text_index.insert(id, self.texts.len());
        self.texts.push(TextRecord {
            node: node.clone(),
            value,
            written: None,
        });
    }

    /// 确保元素有一条记录，返回其下标
    pub fn record_element_once(&mut self, element: &Handle) -> usize {
        let id = NodeId::of(element);
        if let Some(&index) = self.element_index.get(&id) {
            return index;
        }
        let index = self.elements.len();
        self.element_index.insert(id, index);
        self.elements.push(ElementRecord {
            node: element.clone(),
            inner_text: None,
            written_text: None,
            attrs: BTreeMap::new(),
            written_attrs: BTreeMap::new(),
        });
        index
    }

    /// 记录无子元素的元素在首次改写前的拼接文本
    pub fn record_element_text_once(&mut self, element: &Handle, text: &str) {
        let index = self.record_element_once(element);
        let record = &mut self.elements[index];
        if record.inner_text.is_none() {
            record.inner_text = Some(text.to_string());
        }
    }

    /// 记录属性在首次改写前的值；`None` 表示原先不存在
    pub fn record_attribute_once(&mut self, element: &Handle, name: &str, value: Option<&str>) {
        let index = self.record_element_once(element);
        self.elements[index]
            .attrs
            .entry(name.to_string())
            .or_insert_with(|| value.map(str::to_string));
    }

    /// 记录引擎写入文本节点的值
    pub fn mark_text_written(&mut self, node: &Handle, value: &str) {
        if let Some(&index) = self.text_index.get(&NodeId::of(node)) {
            self.texts[index].written = Some(value.to_string());
        }
    }

    /// 记录引擎新建的文本节点及其写入值
    pub fn mark_text_created(&mut self, node: &Handle, value: &str) {
        self.created_texts
            .insert(NodeId::of(node), (node.clone(), value.to_string()));
    }

    /// 记录引擎写入元素的拼接文本
    pub fn mark_element_text_written(&mut self, element: &Handle, value: &str) {
        if let Some(&index) = self.element_index.get(&NodeId::of(element)) {
            self.elements[index].written_text = Some(value.to_string());
        }
    }

    /// 记录引擎写入的属性值
    pub fn mark_attribute_written(&mut self, element: &Handle, name: &str, value: &str) {
        if let Some(&index) = self.element_index.get(&NodeId::of(element)) {
            self.elements[index]
                .written_attrs
                .insert(name.to_string(), value.to_string());
        }
    }

    /// 文本节点的当前值是否就是引擎上次写入的值
    pub fn is_own_text(&self, node: &Handle, current: &str) -> bool {
        let id = NodeId::of(node);
        let written = match self.text_index.get(&id) {
            Some(&index) => self.texts[index].written.as_deref(),
            None => self.created_texts.get(&id).map(|(_, value)| value.as_str()),
        };
        written == Some(current)
    }

    pub fn is_own_element_text(&self, element: &Handle, current: &str) -> bool {
        self.element_index
            .get(&NodeId::of(element))
            .and_then(|&index| self.elements[index].written_text.as_deref())
            == Some(current)
    }

    pub fn is_own_attribute(&self, element: &Handle, name: &str, current: &str) -> bool {
        self.element_index
            .get(&NodeId::of(element))
            .and_then(|&index| self.elements[index].written_attrs.get(name))
            .map(String::as_str)
            == Some(current)
    }

    pub fn has_text_record(&self, node: &Handle) -> bool {
        self.text_index.contains_key(&NodeId::of(node))
    }

    pub fn has_element_record(&self, element: &Handle) -> bool {
        self.element_index.contains_key(&NodeId::of(element))
    }

    /// 元素某个属性记录的原值
    pub fn original_attribute(&self, element: &Handle, name: &str) -> Option<Option<&str>> {
        let index = *self.element_index.get(&NodeId::of(element))?;
        self.elements[index]
            .attrs
            .get(name)
            .map(|value| value.as_deref())
    }

    pub fn len(&self) -> usize {
        self.texts.len() + self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty() && self.elements.is_empty()
    }

    /// 写回全部原值并清空记录
    ///
    /// 先恢复文本节点，再恢复元素；单个节点失败不会中断其余恢复。
    pub fn restore_all(&mut self, document: &LiveDocument) -> RestoreReport {
        let mut report = RestoreReport::default();

        for record in self.texts.drain(..) {
            tally(
                &mut report,
                document
                    .set_text(&record.node, &record.value)
                    .map_err(|e| SubstitutionError::RestoreFailed(e.to_string())),
            );
        }

        for record in self.elements.drain(..) {
            if let Some(text) = record.inner_text.as_deref() {
                tally(
                    &mut report,
                    document
                        .set_inner_text(&record.node, text)
                        .map(|_| ())
                        .map_err(|e| SubstitutionError::RestoreFailed(e.to_string())),
                );
            }
            for (name, value) in record.attrs.iter() {
                tally(
                    &mut report,
                    document
                        .set_attribute(&record.node, name, value.as_deref())
                        .map_err(|e| {
                            SubstitutionError::RestoreFailed(e.to_string()).with_context(name)
                        }),
                );
            }
        }

        self.text_index.clear();
        self.element_index.clear();
        self.created_texts.clear();

        tracing::debug!(
            "恢复了 {} 个原始值（失败 {} 个）",
            report.restored,
            report.failed
        );
        report
    }

    /// 丢弃全部记录而不写回
    pub fn clear(&mut self) {
        self.texts.clear();
        self.text_index.clear();
        self.elements.clear();
        self.element_index.clear();
        self.created_texts.clear();
    }
}

fn tally(report: &mut RestoreReport, result: Result<(), SubstitutionError>) {
    match result {
        Ok(()) => report.restored += 1,
        Err(error) => {
            log_swallowed(&error);
            report.failed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::dom::{
        create_element, descendant_text_nodes, find_first_element, get_node_attr, text_content,
    };

    #[test]
    fn test_first_write_wins_for_text() {
        let doc = LiveDocument::parse("<p>Run</p>").unwrap();
        let text = descendant_text_nodes(&doc.body())[0].clone();
        let mut store = OriginalStore::new();

        store.record_text_once(&text);
        doc.set_text(&text, "运行").unwrap();
        store.record_text_once(&text);
        doc.set_text(&text, "运行!").unwrap();

        store.restore_all(&doc);
        assert_eq!(get_text_value(&text).unwrap(), "Run");
        assert!(store.is_empty());
    }

    #[test]
    fn test_own_output_is_recognised() {
        let doc = LiveDocument::parse("<p title=Run>Run</p>").unwrap();
        let p = find_first_element(doc.document(), "p").unwrap();
        let text = descendant_text_nodes(&p)[0].clone();
        let mut store = OriginalStore::new();

        store.record_text_once(&text);
        store.mark_text_written(&text, "运行");
        assert!(store.is_own_text(&text, "运行"));
        assert!(!store.is_own_text(&text, "Run"));

        store.record_attribute_once(&p, "title", Some("Run"));
        store.mark_attribute_written(&p, "title", "运行");
        assert!(store.is_own_attribute(&p, "title", "运行"));
        assert!(!store.is_own_attribute(&p, "alt", "运行"));
        assert!(!store.is_own_element_text(&p, "运行"));
    }

    #[test]
    fn test_created_text_node_is_own_output() {
        let doc = LiveDocument::parse("<div><span>Run</span></div>").unwrap();
        let span = find_first_element(doc.document(), "span").unwrap();
        let mut store = OriginalStore::new();

        store.record_element_text_once(&span, "Run");
        let created = doc.set_inner_text(&span, "运行 (Run)").unwrap().unwrap();
        store.mark_text_created(&created, "运行 (Run)");
        assert!(store.is_own_text(&created, "运行 (Run)"));
        assert!(!store.is_own_text(&created, "Run"));
        assert!(!store.has_text_record(&created));

        store.restore_all(&doc);
        assert_eq!(text_content(&span), "Run");
        assert!(!store.is_own_text(&created, "运行 (Run)"));
    }

    #[test]
    fn test_attribute_absent_sentinel_removes() {
        let doc = LiveDocument::parse("<p title=Run>x</p>").unwrap();
        let p = find_first_element(doc.document(), "p").unwrap();
        let mut store = OriginalStore::new();

        store.record_attribute_once(&p, "title", Some("Run"));
        store.record_attribute_once(&p, "alt", None);
        store.record_attribute_once(&p, "title", Some("运行"));
        assert_eq!(store.original_attribute(&p, "title"), Some(Some("Run")));

        doc.set_attribute(&p, "title", Some("运行")).unwrap();
        doc.set_attribute(&p, "alt", Some("new")).unwrap();

        let report = store.restore_all(&doc);
        assert_eq!(report.restored, 2);
        assert_eq!(get_node_attr(&p, "title"), Some("Run".to_string()));
        assert_eq!(get_node_attr(&p, "alt"), None);
    }

    #[test]
    fn test_element_text_restored_after_text_nodes() {
        let doc = LiveDocument::parse("<div><span>Run</span></div>").unwrap();
        let span = find_first_element(doc.document(), "span").unwrap();
        let mut store = OriginalStore::new();

        store.record_element_text_once(&span, "Run");
        doc.set_inner_text(&span, "运行").unwrap();
        assert_eq!(text_content(&span), "运行");

        store.restore_all(&doc);
        assert_eq!(text_content(&span), "Run");
    }

    #[test]
    fn test_detached_nodes_do_not_block_restore() {
        let doc = LiveDocument::parse("<div><p>Run</p><i title=Save>x</i></div>").unwrap();
        let p = find_first_element(doc.document(), "p").unwrap();
        let i = find_first_element(doc.document(), "i").unwrap();
        let text = descendant_text_nodes(&p)[0].clone();
        let mut store = OriginalStore::new();

        store.record_text_once(&text);
        store.record_attribute_once(&i, "title", Some("Save"));
        doc.set_text(&text, "运行").unwrap();
        doc.set_attribute(&i, "title", Some("保存")).unwrap();
        doc.remove(&p);

        let report = store.restore_all(&doc);
        assert_eq!(report.failed, 0);
        assert_eq!(get_node_attr(&i, "title"), Some("Save".to_string()));
        assert_eq!(get_text_value(&text).unwrap(), "Run");
    }

    #[test]
    fn test_write_failures_are_counted() {
        let doc = LiveDocument::parse("<p>x</p>").unwrap();
        let mut store = OriginalStore::new();
        // 元素被错误地当作文本节点写回时会失败
        let el = create_element("span", &[]);
        store.record_element_text_once(&el, "a");
        store.texts.push(TextRecord {
            node: el.clone(),
            value: "b".to_string(),
            written: None,
        });

        let report = store.restore_all(&doc);
        assert_eq!(report.failed, 1);
        assert_eq!(report.restored, 1);
    }
}
