//! `CleanText`: the deterministic pre-processing applied to every source
//! text before it reaches a worker (§4.3 step 1).
//!
//! A pure function over `&str`, kept free of any worker/queue/channel
//! machinery so it is trivially unit-testable — the same separation the
//! teacher draws between its text-wrapping heuristics and the VM that
//! consumes their output.

const SOFT_HYPHEN: char = '\u{00AD}';

/// The three pieces `CleanText` extracts from a source string: the leading
/// whitespace run, the cleaned body, and the trailing whitespace run. A
/// worker re-wraps its translated body between `before` and `after` before
/// emitting a response, preserving whitespace shape (testable property 7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedText {
    pub before: String,
    pub cleaned: String,
    pub after: String,
}

/// Codes for which `CleanText` inserts a space between full-width sentence
/// punctuation and an immediately following left double quote.
fn needs_quote_spacing(source_lang: &str) -> bool {
    matches!(source_lang, "ja" | "ko" | "zh") || crate::languages::is_han_variant(source_lang)
}

/// Insert a space between `。！？` and an immediately following `"`,
/// replacing the quote with the left double quotation mark `“`.
///
/// Exact pattern per contract: `/([。！？])"/g → "$1 “"`.
fn space_before_left_quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        out.push(c);
        if matches!(c, '。' | '！' | '？') {
            if let Some(&next) = chars.peek() {
                if next == '"' {
                    chars.next();
                    out.push(' ');
                    out.push('“');
                    continue;
                }
            }
        }
    }
    out
}

/// Strip leading/trailing whitespace (preserving both runs for re-wrap) and
/// remove soft hyphens, then apply source-language-specific quote spacing.
pub fn clean_text(source: &str, source_lang: &str) -> CleanedText {
    let trimmed_start = source.trim_start();
    let leading_len = source.len() - trimmed_start.len();
    let before = source[..leading_len].to_string();

    let trimmed = trimmed_start.trim_end();
    let after = trimmed_start[trimmed.len()..].to_string();

    let without_soft_hyphen: String = trimmed.chars().filter(|&c| c != SOFT_HYPHEN).collect();

    let cleaned = if needs_quote_spacing(source_lang) {
        space_before_left_quote(&without_soft_hyphen)
    } else {
        without_soft_hyphen
    };

    CleanedText {
        before,
        cleaned,
        after,
    }
}

/// Re-wrap a translated body with the whitespace extracted by
/// [`clean_text`].
pub fn rewrap(cleaned: &CleanedText, translated: &str) -> String {
    format!("{}{}{}", cleaned.before, translated, cleaned.after)
}
