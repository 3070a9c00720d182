//! 词条编译器
//!
//! 把词典编译成按键长降序排列的匹配器列表。每个匹配器只在键的两侧
//! 都不紧邻字母、数字或下划线（任意 Unicode 文字）时命中，
//! 从而避免在 "Running" 中替换 "Run"。
//!
//! 边界能力在每次编译时检测一次，按三个层级选择策略：
//! 1. `UnicodeGuarded`: 精确的 Unicode 边界检查
//! 2. `AsciiWordBoundary`: 纯 ASCII 单词键使用 `\b`
//! 3. `Literal`: 无边界保护的字面匹配

use std::borrow::Cow;
use std::ops::Range;

use regex::{Regex, RegexBuilder};

use crate::substitution::dictionary::Dictionary;
use crate::substitution::error::{SubstitutionError, SubstitutionResult};

/// 匹配器的边界策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundaryStrategy {
    UnicodeGuarded,
    AsciiWordBoundary,
    Literal,
}

/// 正则引擎能力
#[derive(Debug, Clone)]
pub struct BoundaryCapabilities {
    /// 单字符的 `[\p{L}\p{N}_]` 判定；不可用时为 `None`
    word_char: Option<Regex>,
    /// 是否支持 Unicode 大小写折叠
    unicode_case: bool,
}

impl BoundaryCapabilities {
    /// 探测当前正则引擎的能力
    pub fn detect() -> Self {
        let word_char = Regex::new(r"^[\p{L}\p{N}_]$").ok();
        let unicode_case = RegexBuilder::new("é")
            .case_insensitive(true)
            .build()
            .map(|re| re.is_match("É"))
            .unwrap_or(false);

        Self {
            word_char,
            unicode_case,
        }
    }

    /// 不具备任何 Unicode 能力（用于测试回退路径）
    pub fn ascii_only() -> Self {
        Self {
            word_char: None,
            unicode_case: false,
        }
    }

    pub fn supports_unicode_guard(&self) -> bool {
        self.word_char.is_some() && self.unicode_case
    }

    fn is_word_char(&self, c: char) -> bool {
        match &self.word_char {
            Some(re) => {
                let mut buf = [0u8; 4];
                re.is_match(c.encode_utf8(&mut buf))
            }
            None => c.is_ascii_alphanumeric() || c == '_',
        }
    }
}

impl Default for BoundaryCapabilities {
    fn default() -> Self {
        Self::detect()
    }
}

/// 由单个词条编译出的匹配器
#[derive(Debug, Clone)]
pub struct Matcher {
    key: String,
    replacement: String,
    pattern: Regex,
    strategy: BoundaryStrategy,
    /// 测试用：从非零位置继续查找时报错
    #[cfg(test)]
    fail_after_start: bool,
}

impl Matcher {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    pub fn strategy(&self) -> BoundaryStrategy {
        self.strategy
    }

    /// 从 `pos` 开始寻找下一个满足边界条件的命中
    pub fn next_match(
        &self,
        text: &str,
        mut pos: usize,
        caps: &BoundaryCapabilities,
    ) -> SubstitutionResult<Option<Range<usize>>> {
        #[cfg(test)]
        if self.fail_after_start && pos > 0 {
            return Err(self.failure("injected failure"));
        }
        while pos <= text.len() {
            let Some(m) = self.pattern.find_at(text, pos) else {
                return Ok(None);
            };
            if !m.is_empty() && self.accepts(text, m.range(), caps)? {
                return Ok(Some(m.range()));
            }
            // 从命中起点的下一个字符继续寻找
            pos = m.start() + char_width_at(text, m.start());
        }
        Ok(None)
    }

    /// 替换所有不重叠的命中；替换文本按字面输出
    pub fn replace_all<'t>(
        &self,
        text: &'t str,
        caps: &BoundaryCapabilities,
    ) -> SubstitutionResult<Cow<'t, str>> {
        let mut out: Option<String> = None;
        let mut last = 0;
        let mut pos = 0;

        while let Some(range) = self.next_match(text, pos, caps)? {
            let buf = out.get_or_insert_with(|| String::with_capacity(text.len()));
            buf.push_str(&text[last..range.start]);
            buf.push_str(&self.replacement);
            last = range.end;
            pos = range.end;
        }

        Ok(match out {
            Some(mut buf) => {
                buf.push_str(&text[last..]);
                Cow::Owned(buf)
            }
            None => Cow::Borrowed(text),
        })
    }

    fn accepts(
        &self,
        text: &str,
        range: Range<usize>,
        caps: &BoundaryCapabilities,
    ) -> SubstitutionResult<bool> {
        if self.strategy != BoundaryStrategy::UnicodeGuarded {
            return Ok(true);
        }
        let before = text.get(..range.start).ok_or_else(|| self.failure("left context"))?;
        let after = text.get(range.end..).ok_or_else(|| self.failure("right context"))?;
        let blocked_left = before.chars().next_back().is_some_and(|c| caps.is_word_char(c));
        let blocked_right = after.chars().next().is_some_and(|c| caps.is_word_char(c));
        Ok(!blocked_left && !blocked_right)
    }

    #[cfg(test)]
    pub(crate) fn failing_after_start(mut self) -> Self {
        self.fail_after_start = true;
        self
    }

    fn failure(&self, reason: &str) -> SubstitutionError {
        SubstitutionError::MatcherFailed {
            key: self.key.clone(),
            reason: reason.to_string(),
        }
    }
}

fn char_width_at(text: &str, at: usize) -> usize {
    text.get(at..)
        .and_then(|rest| rest.chars().next())
        .map(char::len_utf8)
        .unwrap_or(1)
}

/// 编译结果：有序匹配器 + 编译时探测到的能力
#[derive(Debug, Clone)]
pub struct MatcherSet {
    matchers: Vec<Matcher>,
    capabilities: BoundaryCapabilities,
}

impl MatcherSet {
    pub fn empty() -> Self {
        Self {
            matchers: Vec::new(),
            capabilities: BoundaryCapabilities::ascii_only(),
        }
    }

    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    #[cfg(test)]
    pub(crate) fn matchers_mut(&mut self) -> &mut Vec<Matcher> {
        &mut self.matchers
    }

    pub fn capabilities(&self) -> &BoundaryCapabilities {
        &self.capabilities
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

/// 使用探测到的能力编译词典
pub fn compile(dictionary: &Dictionary) -> MatcherSet {
    compile_with(dictionary, BoundaryCapabilities::detect())
}

/// 使用给定能力编译词典
pub fn compile_with(dictionary: &Dictionary, capabilities: BoundaryCapabilities) -> MatcherSet {
    let mut entries: Vec<(&str, &str)> = dictionary.iter().filter(|(k, _)| !k.is_empty()).collect();
    // 长词先替换，避免被短词覆盖；等长时按字典序保证结果稳定
    entries.sort_by(|a, b| {
        b.0.chars()
            .count()
            .cmp(&a.0.chars().count())
            .then_with(|| a.0.cmp(b.0))
    });

    let matchers = entries
        .into_iter()
        .filter_map(|(key, value)| match compile_key(key, value, &capabilities) {
            Ok(matcher) => Some(matcher),
            Err(error) => {
                tracing::warn!("{}", error);
                None
            }
        })
        .collect::<Vec<_>>();

    tracing::debug!(
        "编译了 {} 个匹配器（Unicode边界: {}）",
        matchers.len(),
        capabilities.supports_unicode_guard()
    );

    MatcherSet {
        matchers,
        capabilities,
    }
}

fn compile_key(
    key: &str,
    replacement: &str,
    caps: &BoundaryCapabilities,
) -> SubstitutionResult<Matcher> {
    let escaped = regex::escape(key);
    let matcher = |pattern: Regex, strategy| Matcher {
        key: key.to_string(),
        replacement: replacement.to_string(),
        pattern,
        strategy,
        #[cfg(test)]
        fail_after_start: false,
    };

    if caps.supports_unicode_guard() {
        if let Ok(re) = RegexBuilder::new(&escaped).case_insensitive(true).build() {
            return Ok(matcher(re, BoundaryStrategy::UnicodeGuarded));
        }
    }

    if is_ascii_word(key) {
        let bounded = [r"\b{}\b", r"(?-u:\b){}(?-u:\b)"]
            .iter()
            .find_map(|template| {
                RegexBuilder::new(&template.replace("{}", &escaped))
                    .case_insensitive(true)
                    .build()
                    .ok()
            });
        if let Some(re) = bounded {
            return Ok(matcher(re, BoundaryStrategy::AsciiWordBoundary));
        }
    }

    let literal = RegexBuilder::new(&escaped)
        .case_insensitive(true)
        .build()
        .or_else(|_| Regex::new(&escaped))
        .map_err(|e| SubstitutionError::PatternCompile {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
    Ok(matcher(literal, BoundaryStrategy::Literal))
}

fn is_ascii_word(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
