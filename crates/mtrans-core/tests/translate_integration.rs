use mtrans_core::{Config, TranslateInput, Translator};
use tempfile::TempDir;

fn translator() -> (Translator, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = Config::default();
    config.offline = true;
    config.data_dir = dir.path().to_path_buf();
    config.worker_init_timeout = std::time::Duration::from_secs(5);
    seed_fixture_catalog(&config.data_dir, &[("en", "ja"), ("en", "zh-Hans")]);
    (Translator::new(config), dir)
}

fn seed_fixture_catalog(data_dir: &std::path::Path, pairs: &[(&str, &str)]) {
    use serde::Serialize;
    use sha2::{Digest, Sha256};

    #[derive(Serialize)]
    struct Attachment {
        location: String,
        hash: String,
    }
    #[derive(Serialize)]
    struct Record {
        #[serde(rename = "fromLang")]
        from_lang: String,
        #[serde(rename = "toLang")]
        to_lang: String,
        #[serde(rename = "fileType")]
        file_kind: String,
        name: String,
        attachment: Attachment,
    }

    std::fs::create_dir_all(data_dir.join("models")).unwrap();
    let mut records = Vec::new();
    for (from, to) in pairs {
        for (kind, contents) in [("model", b"model-bytes".as_slice()), ("vocab", b"vocab-bytes".as_slice())] {
            let name = format!("{from}-{to}.{kind}.bin");
            std::fs::write(data_dir.join("models").join(&name), contents).unwrap();
            let mut hasher = Sha256::new();
            hasher.update(contents);
            records.push(Record {
                from_lang: from.to_string(),
                to_lang: to.to_string(),
                file_kind: kind.to_string(),
                name,
                attachment: Attachment { location: "unused://".to_string(), hash: hex::encode(hasher.finalize()) },
            });
        }
    }
    std::fs::write(data_dir.join("models.json"), serde_json::to_vec(&records).unwrap()).unwrap();
}

#[test]
fn translates_a_simple_sentence_end_to_end() {
    let (t, _dir) = translator();
    let out = t.translate(TranslateInput::One("Good morning".to_string()), "en", "ja", false).unwrap();
    match out {
        TranslateInput::One(text) => assert!(text.contains("Good morning") && text.contains("ja")),
        _ => panic!("expected scalar output for scalar input"),
    }
}

#[test]
fn preserves_batch_shape_and_order() {
    let (t, _dir) = translator();
    let input = TranslateInput::Many(vec!["one".to_string(), "two".to_string(), "three".to_string()]);
    let out = t.translate(input, "en", "ja", false).unwrap();
    match out {
        TranslateInput::Many(v) => {
            assert_eq!(v.len(), 3);
            assert!(v[0].contains("one"));
            assert!(v[1].contains("two"));
            assert!(v[2].contains("three"));
        }
        _ => panic!("expected list output for list input"),
    }
}

#[test]
fn rejects_unsupported_language_codes() {
    let (t, _dir) = translator();
    let err = t.translate(TranslateInput::One("hi".to_string()), "en", "klingon", false).unwrap_err();
    assert!(matches!(err, mtrans_core::TranslateError::InvalidLanguage(_)));
}

#[test]
fn han_script_conversion_needs_no_engine() {
    let (t, _dir) = translator();
    let out = t.translate(TranslateInput::One("简体".to_string()), "zh-Hans", "zh-Hant", false).unwrap();
    match out {
        TranslateInput::One(text) => assert_ne!(text, "简体"),
        _ => panic!("expected scalar output"),
    }
}

#[test]
fn preload_then_translate_reuses_the_warmed_engine() {
    let (t, _dir) = translator();
    let handle = t.preload("en", "zh-Hans").unwrap();
    let out = handle.translate(TranslateInput::One("hello".to_string()), false).unwrap();
    match out {
        TranslateInput::One(text) => assert!(text.contains("hello")),
        _ => panic!("expected scalar output"),
    }
}

/// Neither leg of `ja → zh-Hans` is `en`, and the catalog has no direct
/// record for that pair — only the two `en`-anchored hops. Translation must
/// still succeed by chaining `ja → en → zh-Hans`.
#[test]
fn pivot_translation_routes_through_english() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = Config::default();
    config.offline = true;
    config.data_dir = dir.path().to_path_buf();
    config.worker_init_timeout = std::time::Duration::from_secs(5);
    seed_fixture_catalog(&config.data_dir, &[("ja", "en"), ("en", "zh-Hans")]);
    let t = Translator::new(config);

    let out = t.translate(TranslateInput::One("konnichiwa".to_string()), "ja", "zh-Hans", false).unwrap();
    match out {
        TranslateInput::One(text) => assert!(text.contains("konnichiwa") && text.contains("zh-Hans")),
        _ => panic!("expected scalar output"),
    }
}

/// `zh-Hant → zh-HK` is a pure script conversion (both legs are Han
/// variants), so it must route through the script converter twice — once
/// into `zh-Hans`, once out to the target variant — without ever building a
/// neural pool.
#[test]
fn complex_script_conversion_chains_both_variant_steps() {
    let (t, _dir) = translator();
    let out = t
        .translate(TranslateInput::One("简体中文".to_string()), "zh-Hant", "zh-HK", false)
        .unwrap();
    match out {
        TranslateInput::One(text) => assert!(!text.is_empty()),
        _ => panic!("expected scalar output"),
    }
}

/// `from: "auto"` must classify the input instead of failing as an
/// unsupported code.
#[test]
fn auto_detect_routes_without_explicit_source_language() {
    let (t, _dir) = translator();
    let out = t
        .translate(TranslateInput::One("The quick brown fox".to_string()), "auto", "ja", false)
        .unwrap();
    match out {
        TranslateInput::One(text) => assert!(text.contains("quick") && text.contains("ja")),
        _ => panic!("expected scalar output"),
    }
}
