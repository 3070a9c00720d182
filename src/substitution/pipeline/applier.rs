//! 替换执行器
//!
//! 依次独立应用每个匹配器。前一个匹配器写入的替换文本不会在同一次
//! 执行中被后面的匹配器再次匹配；单个匹配器失败只跳过它自己。

use std::borrow::Cow;
use std::ops::Range;

use crate::substitution::error::helpers::log_swallowed;
use crate::substitution::error::{SubstitutionError, SubstitutionResult};
use crate::substitution::pipeline::compiler::{BoundaryCapabilities, Matcher, MatcherSet};

/// 对字符串应用全部匹配器
///
/// 没有任何匹配器命中时返回借用的原字符串。
pub fn replace_string<'t>(matchers: &MatcherSet, text: &'t str) -> Cow<'t, str> {
    if text.is_empty() || matchers.is_empty() {
        return Cow::Borrowed(text);
    }

    let mut current: Cow<'t, str> = Cow::Borrowed(text);
    // 已写入的替换文本所在区间（有序、不重叠）
    let mut protected: Vec<Range<usize>> = Vec::new();

    for matcher in matchers.matchers() {
        match apply_matcher(matcher, matchers.capabilities(), &current, &protected) {
            Ok(Some((next, ranges))) => {
                current = Cow::Owned(next);
                protected = ranges;
            }
            Ok(None) => {}
            Err(error) => log_swallowed(&error),
        }
    }

    current
}

/// 应用单个匹配器；未命中时返回 `None`
fn apply_matcher(
    matcher: &Matcher,
    caps: &BoundaryCapabilities,
    text: &str,
    protected: &[Range<usize>],
) -> SubstitutionResult<Option<(String, Vec<Range<usize>>)>> {
    let mut accepted = Vec::new();
    let mut pos = 0;

    while let Some(found) = matcher.next_match(text, pos, caps)? {
        match protected
            .iter()
            .find(|p| p.start < found.end && found.start < p.end)
        {
            // 与已替换文本重叠：跳到该区间之后继续
            Some(p) => pos = p.end.max(found.start + 1),
            None => {
                pos = found.end;
                accepted.push(found);
            }
        }
        while pos < text.len() && !text.is_char_boundary(pos) {
            pos += 1;
        }
    }

    if accepted.is_empty() {
        return Ok(None);
    }

    let replacement = matcher.replacement();
    let mut out = String::with_capacity(text.len() + accepted.len() * replacement.len());
    let mut ranges = Vec::with_capacity(protected.len() + accepted.len());
    let mut old = protected.iter().peekable();
    let mut last = 0;

    for found in accepted {
        let gap = text
            .get(last..found.start)
            .ok_or_else(|| slice_failure(matcher))?;
        let shift = out.len() as isize - last as isize;
        while let Some(p) = old.next_if(|p| p.end <= found.start) {
            ranges.push(shifted(p, shift));
        }
        out.push_str(gap);
        let start = out.len();
        out.push_str(replacement);
        ranges.push(start..out.len());
        last = found.end;
    }

    let shift = out.len() as isize - last as isize;
    ranges.extend(old.map(|p| shifted(p, shift)));
    out.push_str(text.get(last..).ok_or_else(|| slice_failure(matcher))?);

    Ok(Some((out, ranges)))
}

fn shifted(range: &Range<usize>, shift: isize) -> Range<usize> {
    (range.start as isize + shift) as usize..(range.end as isize + shift) as usize
}

fn slice_failure(matcher: &Matcher) -> SubstitutionError {
    SubstitutionError::MatcherFailed {
        key: matcher.key().to_string(),
        reason: "match is not on a character boundary".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::substitution::dictionary::Dictionary;
    use crate::substitution::pipeline::compiler::compile;

    fn set(entries: &[(&str, &str)]) -> MatcherSet {
        compile(&entries.iter().copied().collect::<Dictionary>())
    }

    #[test]
    fn test_no_match_borrows_input() {
        let matchers = set(&[("Run", "运行")]);
        let out = replace_string(&matchers, "Stop");
        assert!(matches!(out, Cow::Borrowed("Stop")));
    }

    #[test]
    fn test_all_matchers_apply() {
        let matchers = set(&[("Run", "运行"), ("Save", "保存")]);
        assert_eq!(replace_string(&matchers, "Run / Save"), "运行 / 保存");
    }

    #[test]
    fn test_longest_key_wins() {
        let matchers = set(&[("Run", "运行"), ("Running", "运行中"), ("Run all", "全部运行")]);
        assert_eq!(replace_string(&matchers, "Running"), "运行中");
        assert_eq!(replace_string(&matchers, "Run all"), "全部运行");
        assert_eq!(replace_string(&matchers, "Run"), "运行");
    }

    #[test]
    fn test_replacements_are_not_rescanned() {
        // "Save" 的替换文本中含有键 "Run"，不会被再次替换
        let matchers = set(&[("Save", "Save and Run"), ("Run", "运行")]);
        assert_eq!(replace_string(&matchers, "Save"), "Save and Run");
        assert_eq!(replace_string(&matchers, "Save | Run"), "Save and Run | 运行");
    }

    #[test]
    fn test_boundaries_see_neighbouring_replacements() {
        // "ab" 替换为 "X" 后，"Xc" 中的 "c" 左侧是字母，不应命中
        let matchers = set(&[("ab", "X"), ("c", "Y")]);
        assert_eq!(replace_string(&matchers, "ab c"), "X Y");
        assert_eq!(replace_string(&matchers, "abc"), "abc");
    }

    #[test]
    fn test_idempotent_when_values_contain_no_keys() {
        let matchers = set(&[("Run", "运行"), ("Gallery", "画廊")]);
        let once = replace_string(&matchers, "Run Gallery").into_owned();
        let twice = replace_string(&matchers, &once).into_owned();
        assert_eq!(once, twice);
    }

    /// 一个匹配器中途失败时，它已找到的命中全部丢弃，其余匹配器照常应用
    #[test]
    fn test_failing_matcher_is_skipped() {
        let mut matchers = set(&[("Gallery", "画廊"), ("Save", "保存"), ("Run", "运行")]);
        let failing = matchers
            .matchers()
            .iter()
            .position(|m| m.key() == "Save")
            .unwrap();
        let matcher = matchers.matchers_mut().remove(failing).failing_after_start();
        matchers.matchers_mut().insert(failing, matcher);

        assert_eq!(
            replace_string(&matchers, "Save · Gallery · Run · Save"),
            "Save · 画廊 · 运行 · Save"
        );
        // 失败前没有任何命中时同样不影响其他匹配器
        assert_eq!(replace_string(&matchers, "Run"), "运行");
    }

    #[test]
    fn test_empty_text_and_empty_set() {
        assert_eq!(replace_string(&set(&[("Run", "运行")]), ""), "");
        assert_eq!(replace_string(&MatcherSet::empty(), "Run"), "Run");
    }
}
