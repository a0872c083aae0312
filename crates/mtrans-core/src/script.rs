//! Script Converter (C2): a synchronous text transform for Han-script
//! variants, kept behind a trait since the real implementation (a full
//! Simplified/Traditional conversion table, e.g. OpenCC) is an external
//! collaborator's concern — this core only needs a working interface plus a
//! default that exercises the routing plan end to end.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Direction of a single Han-script conversion step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptDirection {
    /// Variant (Traditional, Hong Kong, ...) → Simplified.
    ToHans,
    /// Simplified → a specific variant.
    FromHans(&'static str),
}

/// A pure, synchronous text transform between Han script variants.
pub trait ScriptConverter: Send + Sync {
    fn convert(&self, text: &str, direction: ScriptDirection) -> String;
}

/// Small built-in character-map converter covering a representative subset
/// of Simplified/Traditional pairs. Sufficient to exercise the routing plan
/// (S3/S4) without shipping a full conversion database, which belongs to an
/// external collaborator per scope.
pub struct BuiltinHanConverter;

fn simplified_to_traditional() -> &'static HashMap<char, char> {
    static MAP: OnceLock<HashMap<char, char>> = OnceLock::new();
    MAP.get_or_init(|| {
        [
            ('简', '簡'),
            ('体', '體'),
            ('中', '中'),
            ('文', '文'),
            ('汉', '漢'),
            ('语', '語'),
            ('为', '為'),
            ('国', '國'),
            ('学', '學'),
            ('说', '說'),
        ]
        .into_iter()
        .collect()
    })
}

fn traditional_to_simplified() -> &'static HashMap<char, char> {
    static MAP: OnceLock<HashMap<char, char>> = OnceLock::new();
    MAP.get_or_init(|| {
        simplified_to_traditional()
            .iter()
            .map(|(&s, &t)| (t, s))
            .collect()
    })
}

impl ScriptConverter for BuiltinHanConverter {
    fn convert(&self, text: &str, direction: ScriptDirection) -> String {
        match direction {
            ScriptDirection::ToHans => {
                let table = traditional_to_simplified();
                text.chars().map(|c| *table.get(&c).unwrap_or(&c)).collect()
            }
            ScriptDirection::FromHans(_variant) => {
                let table = simplified_to_traditional();
                text.chars().map(|c| *table.get(&c).unwrap_or(&c)).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_hans_converts_traditional_to_simplified() {
        let conv = BuiltinHanConverter;
        assert_eq!(conv.convert("簡體中文", ScriptDirection::ToHans), "简体中文");
    }

    #[test]
    fn test_from_hans_converts_simplified_to_traditional() {
        let conv = BuiltinHanConverter;
        assert_eq!(
            conv.convert("简体中文", ScriptDirection::FromHans("zh-Hant")),
            "簡體中文"
        );
    }

    #[test]
    fn test_unmapped_characters_pass_through_unchanged() {
        let conv = BuiltinHanConverter;
        assert_eq!(conv.convert("hello", ScriptDirection::ToHans), "hello");
    }
}
