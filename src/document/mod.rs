//! 可观察的活动文档
//!
//! `LiveDocument` 是对 DOM 的唯一写入入口：页面（宿主）和替换引擎都通过它
//! 修改节点。观察器连接期间，位于被观察子树内的每次修改都会产生一条
//! `MutationRecord`，由事件循环在微任务检查点交付。

pub mod mutation;

use std::cell::RefCell;
use std::rc::Rc;

use markup5ever_rcdom::{Handle, RcDom};

use crate::parsers::html::dom::{self, find_first_element, get_node_attr, is_inclusive_descendant};
use crate::substitution::error::{SubstitutionError, SubstitutionResult};

pub use mutation::{MutationKind, MutationRecord, ObserverOptions};

/// 观察器回调，每次交付收到一批记录
pub type MutationCallback = Rc<dyn Fn(Vec<MutationRecord>)>;

#[derive(Default)]
struct ObserverSlot {
    /// 已连接时为 (观察根, 选项)
    target: Option<(Handle, ObserverOptions)>,
    queue: Vec<MutationRecord>,
    callback: Option<MutationCallback>,
}

/// 带变更观察的文档
pub struct LiveDocument {
    dom: RcDom,
    observer: RefCell<ObserverSlot>,
}

impl LiveDocument {
    pub fn new(dom: RcDom) -> Self {
        Self {
            dom,
            observer: RefCell::new(ObserverSlot::default()),
        }
    }

    /// 解析 UTF-8 HTML
    pub fn parse(html: &str) -> SubstitutionResult<Self> {
        Ok(Self::new(dom::html_to_dom(html.as_bytes(), "utf-8")?))
    }

    pub fn document(&self) -> &Handle {
        &self.dom.document
    }

    /// `<body>` 元素；没有时退回文档节点
    pub fn body(&self) -> Handle {
        find_first_element(&self.dom.document, "body").unwrap_or_else(|| self.dom.document.clone())
    }

    pub fn into_dom(self) -> RcDom {
        self.dom
    }

    // ------------------------------------------------------------------
    // 观察器
    // ------------------------------------------------------------------

    /// 连接观察器；已连接时替换观察目标
    pub fn observe(&self, root: &Handle, options: ObserverOptions) {
        self.observer.borrow_mut().target = Some((root.clone(), options));
    }

    /// 断开观察器并丢弃尚未交付的记录
    pub fn disconnect(&self) {
        let mut slot = self.observer.borrow_mut();
        slot.target = None;
        slot.queue.clear();
    }

    pub fn is_observing(&self) -> bool {
        self.observer.borrow().target.is_some()
    }

    /// 取走尚未交付的记录
    pub fn take_records(&self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.observer.borrow_mut().queue)
    }

    pub fn has_pending_records(&self) -> bool {
        !self.observer.borrow().queue.is_empty()
    }

    /// 设置（或清除）交付记录时调用的回调
    pub fn set_observer_callback(&self, callback: Option<MutationCallback>) {
        self.observer.borrow_mut().callback = callback;
    }

    /// 把排队的记录交给回调；没有记录或没有回调时返回 `false`
    ///
    /// 回调在释放内部借用之后执行，可以安全地再次修改文档。
    pub fn deliver_records(&self) -> bool {
        let (records, callback) = {
            let mut slot = self.observer.borrow_mut();
            if slot.queue.is_empty() {
                return false;
            }
            let Some(callback) = slot.callback.clone() else {
                return false;
            };
            (std::mem::take(&mut slot.queue), callback)
        };
        callback(records);
        true
    }

    fn record(&self, record: MutationRecord) {
        let mut slot = self.observer.borrow_mut();
        let keep = match slot.target.as_ref() {
            None => false,
            Some((root, options)) => {
                let wanted = match &record {
                    MutationRecord::Attributes { name, .. } => options.wants_attribute(name),
                    other => options.wants(other.kind()),
                };
                let target = record.target();
                let in_scope = if options.subtree {
                    is_inclusive_descendant(target, root)
                } else {
                    Rc::ptr_eq(target, root)
                };
                wanted && in_scope
            }
        };

        if keep {
            slot.queue.push(record);
        }
    }

    // ------------------------------------------------------------------
    // 写操作
    // ------------------------------------------------------------------

    /// 修改文本节点内容
    pub fn set_text(&self, node: &Handle, value: &str) -> SubstitutionResult<()> {
        dom::set_text_value(node, value)?;
        self.record(MutationRecord::CharacterData {
            target: node.clone(),
        });
        Ok(())
    }

    /// 用单个文本节点替换元素的全部子节点；返回新建的文本节点（值为空时没有）
    pub fn set_inner_text(&self, element: &Handle, value: &str) -> SubstitutionResult<Option<Handle>> {
        let (removed, added) = dom::replace_children_with_text(element, value)?;
        self.record(MutationRecord::ChildList {
            target: element.clone(),
            added: added.iter().cloned().collect(),
            removed,
        });
        Ok(added)
    }

    /// 设置或删除属性
    pub fn set_attribute(
        &self,
        element: &Handle,
        name: &str,
        value: Option<&str>,
    ) -> SubstitutionResult<()> {
        dom::set_node_attr(element, name, value)?;
        self.record(MutationRecord::Attributes {
            target: element.clone(),
            name: name.to_string(),
        });
        Ok(())
    }

    pub fn get_attribute(&self, element: &Handle, name: &str) -> Option<String> {
        get_node_attr(element, name)
    }

    /// 追加子节点
    pub fn append_child(&self, parent: &Handle, child: &Handle) {
        if let Some(old_parent) = dom::detach(child) {
            self.record(MutationRecord::ChildList {
                target: old_parent,
                added: Vec::new(),
                removed: vec![child.clone()],
            });
        }
        dom::append_child(parent, child);
        self.record(MutationRecord::ChildList {
            target: parent.clone(),
            added: vec![child.clone()],
            removed: Vec::new(),
        });
    }

    /// 移除节点；节点没有父节点时返回 `false`
    pub fn remove(&self, node: &Handle) -> bool {
        match dom::detach(node) {
            Some(parent) => {
                self.record(MutationRecord::ChildList {
                    target: parent,
                    added: Vec::new(),
                    removed: vec![node.clone()],
                });
                true
            }
            None => false,
        }
    }

    /// 解析一段 HTML 片段，返回游离的顶层节点
    pub fn create_fragment(&self, html: &str) -> SubstitutionResult<Vec<Handle>> {
        let dom = dom::html_to_dom(format!("<body>{}</body>", html).as_bytes(), "utf-8")?;
        let body = find_first_element(&dom.document, "body")
            .ok_or_else(|| SubstitutionError::Parse("fragment has no body".to_string()))?;
        let nodes: Vec<Handle> = body.children.borrow().clone();
        for node in nodes.iter() {
            dom::detach(node);
        }
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::dom::{descendant_text_nodes, text_content};

    fn observed(html: &str) -> LiveDocument {
        let doc = LiveDocument::parse(html).unwrap();
        let body = doc.body();
        doc.observe(
            &body,
            ObserverOptions::subtree_with_attributes(&["title".to_string()]),
        );
        doc
    }

    #[test]
    fn test_records_only_while_observing() {
        let doc = observed("<p>Run</p>");
        let text = descendant_text_nodes(&doc.body())[0].clone();
        doc.set_text(&text, "Stop").unwrap();
        assert_eq!(doc.take_records().len(), 1);

        doc.disconnect();
        doc.set_text(&text, "Go").unwrap();
        assert!(doc.take_records().is_empty());
    }

    #[test]
    fn test_disconnect_drops_queued_records() {
        let doc = observed("<p>Run</p>");
        let text = descendant_text_nodes(&doc.body())[0].clone();
        doc.set_text(&text, "Stop").unwrap();
        doc.disconnect();
        assert!(!doc.has_pending_records());
    }

    #[test]
    fn test_deliver_records_invokes_callback() {
        use std::cell::Cell;

        let doc = observed("<p>Run</p>");
        let seen = Rc::new(Cell::new(0));
        let counter = seen.clone();
        doc.set_observer_callback(Some(Rc::new(move |records: Vec<MutationRecord>| {
            counter.set(counter.get() + records.len());
        })));

        assert!(!doc.deliver_records());
        let text = descendant_text_nodes(&doc.body())[0].clone();
        doc.set_text(&text, "a").unwrap();
        doc.set_text(&text, "b").unwrap();
        assert!(doc.deliver_records());
        assert_eq!(seen.get(), 2);
        assert!(!doc.has_pending_records());
    }

    #[test]
    fn test_attribute_filter_applies() {
        let doc = observed("<p title=a class=b>Run</p>");
        let p = find_first_element(doc.document(), "p").unwrap();
        doc.set_attribute(&p, "class", Some("c")).unwrap();
        assert!(doc.take_records().is_empty());
        doc.set_attribute(&p, "title", Some("z")).unwrap();
        assert_eq!(doc.take_records().len(), 1);
    }

    #[test]
    fn test_mutations_outside_root_are_ignored() {
        let doc = observed("<p>x</p>");
        let head = find_first_element(doc.document(), "head").unwrap();
        let title = dom::create_element("title", &[]);
        doc.append_child(&head, &title);
        assert!(doc.take_records().is_empty());
    }

    #[test]
    fn test_append_fragment_records_added_nodes() {
        let doc = observed("<div id=root></div>");
        let root = find_first_element(doc.document(), "div").unwrap();
        for node in doc.create_fragment("<button>Run</button>tail").unwrap() {
            doc.append_child(&root, &node);
        }
        let records = doc.take_records();
        assert_eq!(records.len(), 2);
        assert_eq!(text_content(&root), "Runtail");
    }

    #[test]
    fn test_set_inner_text_replaces_children() {
        let doc = observed("<span>a<b>b</b></span>");
        let span = find_first_element(doc.document(), "span").unwrap();
        doc.set_inner_text(&span, "plain").unwrap();
        assert_eq!(text_content(&span), "plain");
        match &doc.take_records()[0] {
            MutationRecord::ChildList { added, removed, .. } => {
                assert_eq!(added.len(), 1);
                assert_eq!(removed.len(), 2);
            }
            other => panic!("unexpected record {:?}", other),
        }
    }
}
