//! Language Detector (C3): short-text classification with a script-map
//! fallback.
//!
//! Grounded on `whatlang`, whose `detect()` already exposes the
//! `{alpha2, alpha3}` pair the classifier contract calls for. Detection never
//! fails outward — any internal uncertainty collapses to `"en"`, matching the
//! "errors never propagate" rule for this component.

use crate::languages::LanguageCode;

/// `alpha3 → major-language` rewrite table for languages `whatlang` can
/// recognize but that have no direct ISO 639-1 (`alpha2`) code. Reproduced
/// as a fixed table per the routing contract: changing an entry changes
/// which pair a caller ends up translating through. `cmn` (Mandarin) is not
/// listed here: `iso639_1` already maps `Lang::Cmn` to `"zh-Hans"` directly,
/// so that code never reaches this table.
const ALPHA3_REWRITES: &[(&str, &str)] = &[("yue", "zh-Hant"), ("lzh", "zh-Hant")];

fn rewrite_alpha3(alpha3: &str) -> Option<&'static str> {
    ALPHA3_REWRITES
        .iter()
        .find(|(code, _)| *code == alpha3)
        .map(|(_, rewrite)| *rewrite)
}

/// Collapse runs of whitespace into single spaces and trim the ends.
fn clean_for_detection(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Classify `text` to a canonical language code, or `"en"` when uncertain.
///
/// Mirrors the coordinator's own truncation policy (§4.7) is the caller's
/// job, not this function's — `Detect` operates on whatever text it is
/// given.
pub fn detect(text: &str) -> LanguageCode {
    let cleaned = clean_for_detection(text);
    if cleaned.is_empty() {
        return LanguageCode::from("en");
    }

    match whatlang::detect(&cleaned) {
        Some(info) => {
            let lang = info.lang();
            if let Some(alpha2) = iso639_1(lang) {
                LanguageCode::from(alpha2)
            } else if let Some(rewrite) = rewrite_alpha3(lang.code()) {
                LanguageCode::from(rewrite)
            } else {
                LanguageCode::from("en")
            }
        }
        None => LanguageCode::from("en"),
    }
}

/// `whatlang::Lang` exposes only its ISO 639-3 code directly; this maps the
/// handful of common majority languages we route on back to alpha2. Any
/// language not in this table falls through to the alpha3 rewrite table (or
/// `"en"`).
fn iso639_1(lang: whatlang::Lang) -> Option<&'static str> {
    use whatlang::Lang::*;
    Some(match lang {
        Eng => "en",
        Jpn => "ja",
        Kor => "ko",
        Rus => "ru",
        Spa => "es",
        Fra => "fr",
        Deu => "de",
        Ita => "it",
        Por => "pt",
        Nld => "nl",
        Pol => "pl",
        Ukr => "uk",
        Tur => "tr",
        Arb => "ar",
        Hin => "hi",
        Cmn => "zh-Hans",
        _ => return None,
    })
}
