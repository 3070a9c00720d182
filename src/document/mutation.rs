//! 变更记录与观察选项

use markup5ever_rcdom::Handle;

/// 一条 DOM 变更记录
#[derive(Debug, Clone)]
pub enum MutationRecord {
    /// 文本节点内容变化
    CharacterData { target: Handle },
    /// 子节点增删
    ChildList {
        target: Handle,
        added: Vec<Handle>,
        removed: Vec<Handle>,
    },
    /// 属性变化
    Attributes { target: Handle, name: String },
}

impl MutationRecord {
    pub fn target(&self) -> &Handle {
        match self {
            MutationRecord::CharacterData { target }
            | MutationRecord::ChildList { target, .. }
            | MutationRecord::Attributes { target, .. } => target,
        }
    }

    pub fn kind(&self) -> MutationKind {
        match self {
            MutationRecord::CharacterData { .. } => MutationKind::CharacterData,
            MutationRecord::ChildList { .. } => MutationKind::ChildList,
            MutationRecord::Attributes { .. } => MutationKind::Attributes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    CharacterData,
    ChildList,
    Attributes,
}

/// 观察选项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverOptions {
    pub child_list: bool,
    pub subtree: bool,
    pub character_data: bool,
    pub attributes: bool,
    /// 为空表示观察所有属性
    pub attribute_filter: Vec<String>,
}

impl ObserverOptions {
    /// 观察子树内的全部结构、文本与指定属性变化
    pub fn subtree_with_attributes(attribute_filter: &[String]) -> Self {
        Self {
            child_list: true,
            subtree: true,
            character_data: true,
            attributes: true,
            attribute_filter: attribute_filter.to_vec(),
        }
    }

    pub(crate) fn wants(&self, kind: MutationKind) -> bool {
        match kind {
            MutationKind::CharacterData => self.character_data,
            MutationKind::ChildList => self.child_list,
            MutationKind::Attributes => self.attributes,
        }
    }

    pub(crate) fn wants_attribute(&self, name: &str) -> bool {
        self.attributes
            && (self.attribute_filter.is_empty()
                || self.attribute_filter.iter().any(|a| a == name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_filter() {
        let options = ObserverOptions::subtree_with_attributes(&["title".to_string()]);
        assert!(options.wants_attribute("title"));
        assert!(!options.wants_attribute("class"));

        let all = ObserverOptions::subtree_with_attributes(&[]);
        assert!(all.wants_attribute("class"));
    }
}
