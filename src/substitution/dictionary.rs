//! 替换词典
//!
//! 词条为 字面键 → 替换文本；插入顺序无关，匹配顺序由编译器决定。

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::substitution::error::{SubstitutionError, SubstitutionResult};

/// 键唯一的替换词典
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dictionary {
    entries: HashMap<String, String>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// 内置的界面词汇
    pub fn builtin() -> Self {
        [
            ("Playground", "沙盒 (Playground)"),
            ("Gallery", "画廊"),
            ("Run", "运行"),
            ("Save", "保存"),
            ("Settings", "设置"),
        ]
        .into_iter()
        .collect()
    }

    /// 从 JSON 对象文本加载
    pub fn from_json_str(json: &str) -> SubstitutionResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// 从 JSON 文件加载
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> SubstitutionResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| SubstitutionError::from(e).with_context(path.display()))?;
        Self::from_json_str(&content)
    }

    /// 合并词条，同名键以新值为准
    pub fn merge<I, K, V>(&mut self, other: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in other {
            self.entries.insert(key.into(), value.into());
        }
    }

    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Dictionary {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut dict = Dictionary::new();
        dict.merge(iter);
        dict
    }
}

impl IntoIterator for Dictionary {
    type Item = (String, String);
    type IntoIter = std::collections::hash_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_overrides_existing_keys() {
        let mut dict = Dictionary::builtin();
        dict.merge([("Run", "执行"), ("Open", "打开")]);
        assert_eq!(dict.get("Run"), Some("执行"));
        assert_eq!(dict.get("Open"), Some("打开"));
        assert_eq!(dict.get("Save"), Some("保存"));
        assert_eq!(dict.len(), 6);
    }

    #[test]
    fn test_from_json_str() {
        let dict = Dictionary::from_json_str(r#"{"Run": "运行", "Stop": "停止"}"#).unwrap();
        assert_eq!(dict.len(), 2);
        assert_eq!(dict.get("Stop"), Some("停止"));
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        assert!(Dictionary::from_json_str(r#"["Run"]"#).is_err());
        assert!(Dictionary::from_json_str(r#"{"Run": 1}"#).is_err());
    }
}
