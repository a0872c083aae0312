//! Language code normalization: the supported set, aliases, and the
//! Han-script variant conversion tables.
//!
//! `LanguageCode` is kept as a thin wrapper around `Box<str>` rather than a
//! bare `String` so call sites cannot pass an un-normalized value by
//! accident — the same reasoning that keeps `cache::CacheKey` a distinct
//! `[u8; 32]` rather than a raw byte slice.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// An opaque language tag, e.g. `"en"`, `"zh-Hans"`, `"ja"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LanguageCode(Box<str>);

impl LanguageCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LanguageCode {
    fn from(s: &str) -> Self {
        LanguageCode(s.into())
    }
}

impl From<String> for LanguageCode {
    fn from(s: String) -> Self {
        LanguageCode(s.into_boxed_str())
    }
}

impl AsRef<str> for LanguageCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An ordered `(from, to)` language pair, keyed as `"{from}_{to}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LanguagePair {
    pub from: LanguageCode,
    pub to: LanguageCode,
}

impl LanguagePair {
    pub fn new(from: impl Into<LanguageCode>, to: impl Into<LanguageCode>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// The `"{from}_{to}"` key used to address catalog records and cache
    /// entries.
    pub fn key(&self) -> String {
        format!("{}_{}", self.from, self.to)
    }
}

impl fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// The union of every language code reachable by at least one model chain,
/// plus every Han-script variant and every alias source.
pub const SUPPORTED: &[&str] = &[
    "en", "ja", "ko", "ru", "es", "fr", "de", "it", "pt", "nl", "pl", "uk", "tr", "ar", "hi",
    "zh-Hans", "zh-Hant", "zh-HK", "zh", "zh-CN", "zh-TW",
];

/// `code → canonical code`. Alternate tags for the same language collapse to
/// one canonical form before any routing decision is made.
pub fn aliases() -> &'static HashMap<&'static str, &'static str> {
    static ALIASES: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    ALIASES.get_or_init(|| {
        HashMap::from([
            ("zh", "zh-Hans"),
            ("zh-CN", "zh-Hans"),
            ("zh-TW", "zh-Hant"),
        ])
    })
}

pub fn resolve_alias(code: &str) -> LanguageCode {
    match aliases().get(code) {
        Some(canonical) => LanguageCode::from(*canonical),
        None => LanguageCode::from(code),
    }
}

/// Codes denoting Chinese script variants that are not directly modeled.
pub const HAN_VARIANTS: &[&str] = &["zh-Hant", "zh-HK"];

pub fn is_han_variant(code: &str) -> bool {
    HAN_VARIANTS.contains(&code)
}

pub fn is_supported(code: &str) -> bool {
    SUPPORTED.contains(&code) || aliases().contains_key(code)
}

/// `variant → simplified` conversion target, i.e. the script-converter
/// direction applied when a Han variant is the *source* language.
pub fn to_hans(variant: &str) -> Option<&'static str> {
    match variant {
        "zh-Hant" | "zh-HK" => Some("zh-Hans"),
        _ => None,
    }
}

/// `simplified → variant` conversion target, i.e. the script-converter
/// direction applied when a Han variant is the *target* language.
pub fn from_hans(variant: &str) -> Option<&'static str> {
    match variant {
        "zh-Hant" => Some("zh-Hant"),
        "zh-HK" => Some("zh-HK"),
        _ => None,
    }
}
