//! 资格过滤器
//!
//! 判断一个文本节点、元素或属性值是否允许被替换：
//! - 自身或祖先属于排除标签（脚本、样式、代码、表单控件）时跳过
//! - 最近的块级容器的文本（去除首尾空白）超过阈值时跳过
//! - 自身文本超过阈值时跳过

use std::collections::HashSet;

use markup5ever_rcdom::Handle;

use crate::parsers::html::dom::{closest_element, get_node_name, get_parent_element, text_content};
use crate::substitution::config::constants;

/// 跳过原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// 位于排除标签内
    ExcludedTag,
    /// 所在块级容器文本过长
    LongContainer,
    /// 自身文本过长
    LongText,
    /// 无文本
    Empty,
}

/// 资格过滤器
#[derive(Debug, Clone)]
pub struct EligibilityFilter {
    threshold: usize,
    skip_tags: HashSet<&'static str>,
    block_tags: HashSet<&'static str>,
}

impl EligibilityFilter {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            skip_tags: constants::SKIP_ELEMENTS.iter().copied().collect(),
            block_tags: constants::BLOCK_CONTAINER_ELEMENTS.iter().copied().collect(),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// 节点本身或任一祖先元素属于排除标签
    pub fn is_inside_skip_tag(&self, node: &Handle) -> bool {
        let mut current = closest_element(node);
        while let Some(el) = current {
            if get_node_name(&el).is_some_and(|name| self.skip_tags.contains(name)) {
                return true;
            }
            current = get_parent_element(&el);
        }
        false
    }

    /// 最近的块级容器；找不到块级元素时返回最外层元素
    pub fn nearest_text_container(&self, node: &Handle) -> Option<Handle> {
        let mut current = closest_element(node);
        while let Some(el) = current {
            if get_node_name(&el).is_some_and(|name| self.block_tags.contains(name)) {
                return Some(el);
            }
            match get_parent_element(&el) {
                Some(parent) => current = Some(parent),
                None => return Some(el),
            }
        }
        None
    }

    /// 排除标签或长容器检查
    pub fn container_skip_reason(&self, node: &Handle) -> Option<SkipReason> {
        if self.is_inside_skip_tag(node) {
            return Some(SkipReason::ExcludedTag);
        }
        let container = self.nearest_text_container(node)?;
        let text = text_content(&container);
        if exceeds(text.trim(), self.threshold) {
            Some(SkipReason::LongContainer)
        } else {
            None
        }
    }

    /// 自身文本的长度检查
    pub fn text_skip_reason(&self, text: &str) -> Option<SkipReason> {
        if text.is_empty() {
            Some(SkipReason::Empty)
        } else if exceeds(text, self.threshold) {
            Some(SkipReason::LongText)
        } else {
            None
        }
    }

    /// 节点及其文本的完整检查
    pub fn check(&self, node: &Handle, text: &str) -> Result<(), SkipReason> {
        match self
            .container_skip_reason(node)
            .or_else(|| self.text_skip_reason(text))
        {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    /// 属性值只检查排除标签与自身长度，不查找容器
    pub fn check_attribute(&self, element: &Handle, value: &str) -> Result<(), SkipReason> {
        if self.is_inside_skip_tag(element) {
            return Err(SkipReason::ExcludedTag);
        }
        match self.text_skip_reason(value) {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }
}

impl Default for EligibilityFilter {
    fn default() -> Self {
        Self::new(constants::LONG_TEXT_THRESHOLD)
    }
}

/// 按字符数判断是否超过阈值
fn exceeds(text: &str, threshold: usize) -> bool {
    text.chars().nth(threshold).is_some()
}
