//! 树遍历与翻译
//!
//! 两种遍历模式：
//! - 完整遍历：根节点下的全部文本节点，再到全部元素（包含根本身）
//! - 定向遍历：单个节点；子元素超过扇出上限的元素会在其下做一次完整遍历，
//!   否则只处理它的文本后代
//!
//! 所有写入都经过 `LiveDocument`，首次写入前在 `OriginalStore` 记录原值。

use std::collections::HashMap;

use markup5ever_rcdom::Handle;

use crate::document::LiveDocument;
use crate::parsers::html::dom::{
    child_element_count, descendant_elements, descendant_text_nodes, get_text_value, is_element,
    is_text, text_content,
};
use crate::substitution::config::constants;
use crate::substitution::error::helpers::{log_swallowed, swallow};
use crate::substitution::pipeline::applier::replace_string;
use crate::substitution::pipeline::compiler::MatcherSet;
use crate::substitution::pipeline::filters::{EligibilityFilter, SkipReason};
use crate::substitution::storage::OriginalStore;

/// 一次遍历的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkReport {
    pub text_nodes: usize,
    pub elements: usize,
    pub substitutions: usize,
    pub skipped: HashMap<SkipReason, usize>,
}

impl WalkReport {
    pub fn skipped(&self, reason: SkipReason) -> usize {
        self.skipped.get(&reason).copied().unwrap_or(0)
    }

    fn skip(&mut self, reason: SkipReason) {
        *self.skipped.entry(reason).or_insert(0) += 1;
    }
}

/// 翻译器：把过滤器与替换执行器应用到 DOM 上
pub struct Translator<'a> {
    document: &'a LiveDocument,
    matchers: &'a MatcherSet,
    filter: &'a EligibilityFilter,
    originals: &'a mut OriginalStore,
    attributes: Vec<&'a str>,
    fanout_limit: usize,
    report: WalkReport,
}

impl<'a> Translator<'a> {
    pub fn new(
        document: &'a LiveDocument,
        matchers: &'a MatcherSet,
        filter: &'a EligibilityFilter,
        originals: &'a mut OriginalStore,
    ) -> Self {
        Self {
            document,
            matchers,
            filter,
            originals,
            attributes: constants::TRANSLATABLE_ATTRS.to_vec(),
            fanout_limit: constants::FANOUT_LIMIT,
            report: WalkReport::default(),
        }
    }

    /// 设置可替换属性白名单
    pub fn with_attributes(mut self, attributes: &'a [String]) -> Self {
        self.attributes = attributes.iter().map(String::as_str).collect();
        self
    }

    pub fn with_fanout_limit(mut self, fanout_limit: usize) -> Self {
        self.fanout_limit = fanout_limit;
        self
    }

    pub fn report(&self) -> &WalkReport {
        &self.report
    }

    pub fn into_report(self) -> WalkReport {
        self.report
    }

    /// 替换单个文本节点；发生写入时返回 `true`
    pub fn translate_text_node(&mut self, node: &Handle) -> bool {
        let Some(text) = get_text_value(node) else {
            return false;
        };
        self.report.text_nodes += 1;

        if self.originals.is_own_text(node, &text) {
            return false;
        }
        if let Err(reason) = self.filter.check(node, &text) {
            self.report.skip(reason);
            return false;
        }

        let replaced = replace_string(self.matchers, &text);
        if replaced == text {
            return false;
        }

        self.originals.record_text_once(node);
        match self.document.set_text(node, &replaced) {
            Ok(()) => {
                self.originals.mark_text_written(node, &replaced);
                self.report.substitutions += 1;
                true
            }
            Err(error) => {
                log_swallowed(&error);
                false
            }
        }
    }

    /// 替换元素：无子元素时把拼接文本作为一个整体，否则处理少量子元素下的文本；
    /// 属性总是单独检查
    pub fn translate_element(&mut self, element: &Handle) {
        if !is_element(element) {
            return;
        }
        self.report.elements += 1;

        if self.filter.is_inside_skip_tag(element) {
            self.report.skip(SkipReason::ExcludedTag);
            return;
        }

        match self.filter.container_skip_reason(element) {
            Some(reason) => self.report.skip(reason),
            None => {
                let children = child_element_count(element);
                if children == 0 {
                    self.translate_flattened_text(element);
                } else if children <= self.fanout_limit {
                    for node in descendant_text_nodes(element) {
                        self.translate_text_node(&node);
                    }
                }
            }
        }

        self.translate_attributes(element);
    }

    fn translate_flattened_text(&mut self, element: &Handle) {
        let text = text_content(element);
        if self.is_own_output(element, &text) {
            return;
        }
        if let Some(reason) = self.filter.text_skip_reason(&text) {
            self.report.skip(reason);
            return;
        }

        let replaced = replace_string(self.matchers, &text);
        if replaced == text {
            return;
        }

        self.originals.record_element_text_once(element, &text);
        if let Some(created) = swallow(self.document.set_inner_text(element, &replaced)) {
            self.originals.mark_element_text_written(element, &replaced);
            if let Some(node) = created {
                self.originals.mark_text_created(&node, &replaced);
            }
            self.report.substitutions += 1;
        }
    }

    /// 元素文本完全由引擎上次写入的内容构成
    fn is_own_output(&self, element: &Handle, text: &str) -> bool {
        if self.originals.is_own_element_text(element, text) {
            return true;
        }
        let nodes = descendant_text_nodes(element);
        !nodes.is_empty()
            && nodes.iter().all(|node| {
                get_text_value(node).is_some_and(|value| self.originals.is_own_text(node, &value))
            })
    }

    /// 替换白名单内的属性值；只检查排除标签与属性值自身的长度
    pub fn translate_attributes(&mut self, element: &Handle) {
        if !is_element(element) {
            return;
        }

        for name in self.attributes.clone() {
            let Some(value) = self.document.get_attribute(element, name) else {
                continue;
            };
            if self.originals.is_own_attribute(element, name, &value) {
                continue;
            }
            if let Err(reason) = self.filter.check_attribute(element, &value) {
                if reason != SkipReason::Empty {
                    self.report.skip(reason);
                }
                continue;
            }

            let replaced = replace_string(self.matchers, &value);
            if replaced == value {
                continue;
            }

            self.originals
                .record_attribute_once(element, name, Some(value.as_str()));
            match self.document.set_attribute(element, name, Some(&replaced)) {
                Ok(()) => {
                    self.originals.mark_attribute_written(element, name, &replaced);
                    self.report.substitutions += 1;
                }
                Err(error) => log_swallowed(&error.with_context(name)),
            }
        }
    }

    /// 完整遍历
    pub fn walk(&mut self, root: &Handle) {
        for node in descendant_text_nodes(root) {
            self.translate_text_node(&node);
        }
        for element in descendant_elements(root) {
            self.translate_element(&element);
        }
    }

    /// 定向遍历
    pub fn translate_targeted(&mut self, node: &Handle) {
        if is_text(node) {
            self.translate_text_node(node);
        } else if is_element(node) {
            self.translate_element(node);
            if child_element_count(node) > self.fanout_limit {
                self.walk(node);
            } else {
                for text in descendant_text_nodes(node) {
                    self.translate_text_node(&text);
                }
            }
        } else {
            self.walk(node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::dom::{find_first_element, get_node_attr};
    use crate::substitution::dictionary::Dictionary;
    use crate::substitution::pipeline::compiler::compile;

    fn matchers() -> MatcherSet {
        compile(&Dictionary::from_iter([
            ("Run", "运行"),
            ("Save", "保存"),
            ("Settings", "设置"),
        ]))
    }

    fn walk_body(doc: &LiveDocument, originals: &mut OriginalStore) -> WalkReport {
        let matchers = matchers();
        let filter = EligibilityFilter::default();
        let mut translator = Translator::new(doc, &matchers, &filter, originals);
        translator.walk(&doc.body());
        translator.into_report()
    }

    #[test]
    fn test_full_walk_translates_labels_and_attributes() {
        let doc = LiveDocument::parse(
            "<div><button title=\"Save\">Run</button><input placeholder=\"Settings\"></div>",
        )
        .unwrap();
        let mut originals = OriginalStore::new();
        let report = walk_body(&doc, &mut originals);

        let button = find_first_element(doc.document(), "button").unwrap();
        assert_eq!(text_content(&button), "运行");
        assert_eq!(get_node_attr(&button, "title"), Some("保存".to_string()));
        // input 是排除标签，属性同样保持不变
        let input = find_first_element(doc.document(), "input").unwrap();
        assert_eq!(get_node_attr(&input, "placeholder"), Some("Settings".to_string()));
        assert_eq!(report.substitutions, 2);
        assert!(report.skipped(SkipReason::ExcludedTag) >= 1);
    }

    #[test]
    fn test_own_output_is_not_expanded_again() {
        let doc = LiveDocument::parse("<div><a id=p title=Playground>Playground</a></div>").unwrap();
        let matchers = compile(&Dictionary::builtin());
        let filter = EligibilityFilter::default();
        let mut originals = OriginalStore::new();

        for _ in 0..3 {
            let mut translator = Translator::new(&doc, &matchers, &filter, &mut originals);
            translator.walk(&doc.body());
        }

        let a = find_first_element(doc.document(), "a").unwrap();
        assert_eq!(text_content(&a), "沙盒 (Playground)");
        assert_eq!(get_node_attr(&a, "title"), Some("沙盒 (Playground)".to_string()));
    }

    /// 元素文本被整体改写后，新文本节点在定向与完整遍历中都不会再展开
    #[test]
    fn test_flattened_output_is_not_expanded_again() {
        let doc = LiveDocument::parse("<div><a>Playground</a><span id=s></span></div>").unwrap();
        let a = find_first_element(doc.document(), "a").unwrap();
        let span = find_first_element(doc.document(), "span").unwrap();
        doc.append_child(&span, &crate::parsers::html::dom::create_text("Play"));
        doc.append_child(&span, &crate::parsers::html::dom::create_text("ground"));

        let matchers = compile(&Dictionary::builtin());
        let filter = EligibilityFilter::default();
        let mut originals = OriginalStore::new();

        for _ in 0..3 {
            let mut translator = Translator::new(&doc, &matchers, &filter, &mut originals);
            translator.translate_targeted(&a);
            translator.translate_targeted(&span);
            translator.walk(&doc.body());
        }

        assert_eq!(text_content(&a), "沙盒 (Playground)");
        assert_eq!(text_content(&span), "沙盒 (Playground)");

        originals.restore_all(&doc);
        assert_eq!(text_content(&a), "Playground");
        assert_eq!(text_content(&span), "Playground");
    }

    #[test]
    fn test_partial_words_are_untouched() {
        let doc = LiveDocument::parse("<div><span>Running RunnerUp</span></div>").unwrap();
        let mut originals = OriginalStore::new();
        walk_body(&doc, &mut originals);
        assert_eq!(text_content(&doc.body()), "Running RunnerUp");
        assert!(originals.is_empty());
    }

    #[test]
    fn test_long_container_skips_text_but_not_attributes() {
        let long = "lorem ipsum ".repeat(10);
        let doc = LiveDocument::parse(&format!(
            "<p>{} <a title=\"Run\">Run</a></p>",
            long
        ))
        .unwrap();
        let mut originals = OriginalStore::new();
        let report = walk_body(&doc, &mut originals);

        let a = find_first_element(doc.document(), "a").unwrap();
        assert_eq!(text_content(&a), "Run");
        assert_eq!(get_node_attr(&a, "title"), Some("运行".to_string()));
        assert!(report.skipped(SkipReason::LongContainer) >= 1);
    }

    #[test]
    fn test_fragmented_text_is_one_unit() {
        let doc = LiveDocument::parse("<div><span>x</span></div>").unwrap();
        let span = find_first_element(doc.document(), "span").unwrap();
        doc.set_inner_text(&span, "Ru").unwrap();
        doc.append_child(&span, &crate::parsers::html::dom::create_text("n"));

        let matchers = matchers();
        let filter = EligibilityFilter::default();
        let mut originals = OriginalStore::new();
        let mut translator = Translator::new(&doc, &matchers, &filter, &mut originals);
        translator.translate_element(&span);

        assert_eq!(text_content(&span), "运行");
        assert_eq!(span.children.borrow().len(), 1);
    }

    #[test]
    fn test_targeted_mode_respects_fanout() {
        let items: String = (0..10).map(|_| "<i>Run</i>").collect();
        let doc = LiveDocument::parse(&format!("<nav id=wide>{}</nav>", items)).unwrap();
        let nav = find_first_element(doc.document(), "nav").unwrap();

        let matchers = matchers();
        let filter = EligibilityFilter::default();
        let mut originals = OriginalStore::new();
        let mut translator =
            Translator::new(&doc, &matchers, &filter, &mut originals).with_fanout_limit(8);
        translator.translate_targeted(&nav);

        assert_eq!(text_content(&nav), "运行".repeat(10));
    }

    #[test]
    fn test_restrict_attribute_allowlist() {
        let doc = LiveDocument::parse("<div><img alt=\"Run\" title=\"Run\"></div>").unwrap();
        let img = find_first_element(doc.document(), "img").unwrap();
        let allow = vec!["alt".to_string()];

        let matchers = matchers();
        let filter = EligibilityFilter::default();
        let mut originals = OriginalStore::new();
        let mut translator =
            Translator::new(&doc, &matchers, &filter, &mut originals).with_attributes(&allow);
        translator.translate_attributes(&img);

        assert_eq!(get_node_attr(&img, "alt"), Some("运行".to_string()));
        assert_eq!(get_node_attr(&img, "title"), Some("Run".to_string()));
    }
}
