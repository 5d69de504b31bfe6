use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::core::{encode, Namespace};

#[derive(Clone, Debug)]
pub struct TermOptions<'a> {
    /// None 表示按空白切分
    pub separator: Option<&'a str>,
    pub namespace: Namespace,
}

impl Default for TermOptions<'_> {
    fn default() -> Self {
        Self {
            separator: None,
            namespace: Namespace::Term,
        }
    }
}

impl<'a> TermOptions<'a> {
    pub fn namespace(ns: Namespace) -> Self {
        Self {
            namespace: ns,
            ..Default::default()
        }
    }

    pub fn separator(mut self, sep: &'a str) -> Self {
        self.separator = Some(sep);
        self
    }
}

/// NFC 规范化 + 小写折叠 + 去首尾空白
pub fn fold_token(token: &str) -> String {
    token.trim().nfc().collect::<String>().to_lowercase()
}

/// 切分 → 折叠 → 编码为 `<ns>/<token>`；折叠后为空的 token 丢弃。
pub fn extract_terms(content: &str, opts: &TermOptions<'_>) -> Vec<String> {
    let pieces: Box<dyn Iterator<Item = &str>> = match opts.separator {
        Some(sep) if !sep.is_empty() => Box::new(content.split(sep)),
        _ => Box::new(content.split_whitespace()),
    };
    let prefix_len = opts.namespace.prefix().len();
    pieces
        .map(fold_token)
        .map(|t| encode(opts.namespace, &t))
        .filter(|key| key.len() > prefix_len)
        .collect()
}

fn url_splitter() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\p{L}\p{N}]+").expect("static regex"))
}

/// URL / pageId 拆成字母数字片段（去重，按字典序）
pub fn url_tokens(url: &str) -> BTreeSet<String> {
    url_splitter()
        .split(url)
        .map(fold_token)
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn whitespace_split_folds_and_prefixes() {
        let out = extract_terms("Hello  WORLD\tRust\n", &TermOptions::default());
        assert_eq!(out, ["term/hello", "term/world", "term/rust"]);
    }

    #[test]
    fn separator_only_input_yields_nothing() {
        assert!(extract_terms("   \t\n ", &TermOptions::default()).is_empty());
        assert!(extract_terms(",,, ,", &TermOptions::default().separator(",")).is_empty());
    }

    #[test]
    fn custom_separator_and_namespace() {
        let opts = TermOptions::namespace(Namespace::Tag).separator(",");
        let out = extract_terms("Work, reading,,Later", &opts);
        assert_eq!(out, ["tag/work", "tag/reading", "tag/later"]);
    }

    #[test]
    fn folding_normalizes_composed_forms() {
        // "e" + U+0301 与预组合的 "é" 折叠为同一 token
        assert_eq!(fold_token("Cafe\u{301}"), fold_token("CAFÉ"));
    }

    #[test]
    fn url_tokens_split_on_punctuation() {
        let out = url_tokens("example.com/docs/Intro-Guide?q=1");
        let expected: BTreeSet<String> = ["example", "com", "docs", "intro", "guide", "q", "1"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(out, expected);
    }
}
