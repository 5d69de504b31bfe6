use std::fmt;

/// 排序上界字符：追加在前缀之后即得到该命名空间的闭区间上界。
/// key 按 UTF-8 字节序比较，`char::MAX` 的编码大于任何合法后缀的首字节。
pub const MAX_SORT_CHAR: char = char::MAX;

/// key 空间的命名空间（封闭枚举，新增命名空间需在此扩展）。
///
/// ## 不变式
/// - 任意两个前缀（含 `/`）互不为前缀，范围扫描依赖这一点保证区间独占。
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Namespace {
    Page,
    Term,
    Title,
    Domain,
    Tag,
    Url,
    Visit,
    Bookmark,
}

impl Namespace {
    pub const ALL: [Namespace; 8] = [
        Namespace::Page,
        Namespace::Term,
        Namespace::Title,
        Namespace::Domain,
        Namespace::Tag,
        Namespace::Url,
        Namespace::Visit,
        Namespace::Bookmark,
    ];

    /// 倒排（posting）类命名空间
    pub const POSTINGS: [Namespace; 5] = [
        Namespace::Term,
        Namespace::Title,
        Namespace::Domain,
        Namespace::Tag,
        Namespace::Url,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Page => "page",
            Namespace::Term => "term",
            Namespace::Title => "title",
            Namespace::Domain => "domain",
            Namespace::Tag => "tag",
            Namespace::Url => "url",
            Namespace::Visit => "visit",
            Namespace::Bookmark => "bookmark",
        }
    }

    /// 带分隔符的前缀，例如 `term/`
    pub fn prefix(self) -> &'static str {
        match self {
            Namespace::Page => "page/",
            Namespace::Term => "term/",
            Namespace::Title => "title/",
            Namespace::Domain => "domain/",
            Namespace::Tag => "tag/",
            Namespace::Url => "url/",
            Namespace::Visit => "visit/",
            Namespace::Bookmark => "bookmark/",
        }
    }

    /// 整个命名空间的扫描区间 `[prefix, prefix + MAX_SORT_CHAR]`
    pub fn span(self) -> (String, String) {
        let lo = self.prefix().to_string();
        let mut hi = lo.clone();
        hi.push(MAX_SORT_CHAR);
        (lo, hi)
    }

    /// 识别 key 所属命名空间；未知前缀返回 None。
    pub fn of_key(key: &str) -> Option<Namespace> {
        Namespace::ALL
            .into_iter()
            .find(|ns| key.starts_with(ns.prefix()))
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn encode(ns: Namespace, raw: &str) -> String {
    let mut key = String::with_capacity(ns.prefix().len() + raw.len());
    key.push_str(ns.prefix());
    key.push_str(raw);
    key
}

/// 去掉已知命名空间前缀；未知前缀原样返回（永不失败）。
pub fn decode(key: &str) -> &str {
    match Namespace::of_key(key) {
        Some(ns) => &key[ns.prefix().len()..],
        None => key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_inverts_encode_for_every_namespace() {
        for ns in Namespace::ALL {
            for raw in ["foo", "a/b", "1700000000000", "ünïcode", "page/nested"] {
                assert_eq!(decode(&encode(ns, raw)), raw, "ns={ns}");
            }
        }
    }

    #[test]
    fn decode_passes_unknown_prefix_through() {
        assert_eq!(decode("other/xyz"), "other/xyz");
        assert_eq!(decode(""), "");
        assert_eq!(decode("pagexyz"), "pagexyz");
    }

    #[test]
    fn prefixes_are_collision_free() {
        for a in Namespace::ALL {
            for b in Namespace::ALL {
                if a != b {
                    assert!(
                        !a.prefix().starts_with(b.prefix()),
                        "{} is a prefix of {}",
                        b.prefix(),
                        a.prefix()
                    );
                }
            }
        }
    }

    #[test]
    fn span_bounds_every_key_in_namespace() {
        let (lo, hi) = Namespace::Term.span();
        let k = encode(Namespace::Term, "zzzz");
        assert!(lo.as_str() <= k.as_str() && k.as_str() <= hi.as_str());
        let other = encode(Namespace::Title, "a");
        assert!(!(lo.as_str() <= other.as_str() && other.as_str() <= hi.as_str()));
    }
}
