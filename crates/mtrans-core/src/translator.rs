//! Translator Coordinator (C8): input normalization, language detection,
//! script-routing planning, direct/pivot selection, dispatch, and result
//! reassembly.
//!
//! The pending-message map here plays the same role the teacher's
//! `executor::execute` plays around a single dispatch-then-await call, just
//! generalized to many concurrent in-flight messages: a background "pump"
//! thread (the coordinator's analogue of a slot thread returning its result
//! over a one-shot channel) drains every live pool's worker messages and
//! resolves the matching pending entry by `messageId`, exactly as the
//! teacher's pool slot sends its `VmRunResult` back over the work item's own
//! response channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::cache::CacheManager;
use crate::config::Config;
use crate::detect::detect;
use crate::error::TranslateError;
use crate::languages::{is_han_variant, is_supported, resolve_alias, LanguageCode, LanguagePair};
use crate::pool::EnginePool;
use crate::script::{BuiltinHanConverter, ScriptConverter, ScriptDirection};
use crate::store::ModelStore;
use crate::worker::{null_backend_factory, BackendFactory, ModelPayload};

const PUMP_INTERVAL: Duration = Duration::from_millis(2);

/// Caller-facing shape of a `Translate` call's input/output: a single text
/// or a list, preserved across the round trip (testable property 2).
#[derive(Debug, Clone, PartialEq)]
pub enum TranslateInput {
    One(String),
    Many(Vec<String>),
}

impl TranslateInput {
    fn into_vec(self) -> Vec<String> {
        match self {
            TranslateInput::One(s) => vec![s],
            TranslateInput::Many(v) => v,
        }
    }

    fn wrap_like(was_many: bool, mut values: Vec<String>) -> TranslateInput {
        if was_many {
            TranslateInput::Many(values)
        } else {
            TranslateInput::One(values.pop().unwrap_or_default())
        }
    }
}

struct PendingTranslation {
    resolver: mpsc::Sender<Result<String, TranslateError>>,
    pair_key: String,
}

/// A handle returned by `Preload`, bound to one language pair.
pub struct TranslationHandle<'a> {
    translator: &'a Translator,
    pair: LanguagePair,
}

impl<'a> TranslationHandle<'a> {
    pub fn translate(&self, input: TranslateInput, is_html: bool) -> Result<TranslateInput, TranslateError> {
        self.translator
            .translate(input, self.pair.from.as_str(), self.pair.to.as_str(), is_html)
    }

    pub fn discard_translations(&self) {
        self.translator.discard_translations(&self.pair);
    }

    /// Cancels `translation_id` on this handle's pair, per `CancelOne`
    /// (§6.1): a no-op if it already finished or isn't queued on this pool.
    pub fn cancel(&self, translation_id: u64) {
        self.translator.cancel(&self.pair, translation_id);
    }
}

/// The full planning pipeline coordinator (§4.7).
pub struct Translator {
    config: Config,
    store: ModelStore,
    cache: Arc<CacheManager>,
    script_converter: Arc<dyn ScriptConverter>,
    backend_factory: Arc<BackendFactory>,
    pending: Arc<Mutex<HashMap<u64, PendingTranslation>>>,
    next_message_id: AtomicU64,
    pump_running: Arc<AtomicBool>,
    pump_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Translator {
    pub fn new(config: Config) -> Self {
        Self::with_backend_factory(config, null_backend_factory())
    }

    /// Construct with an explicit backend factory — the seam tests and
    /// embedders use to swap in a real inference runtime or, as the default
    /// build does, [`NullBackend`].
    pub fn with_backend_factory(config: Config, backend_factory: Arc<BackendFactory>) -> Self {
        let idle_timeout = if config.idle_timeout_disabled {
            None
        } else {
            Some(config.idle_timeout)
        };
        let cache = CacheManager::new(idle_timeout, config.memory_check_interval, config.timeout_reset_threshold);
        let store = ModelStore::new(
            config.data_dir.clone(),
            config.catalog_url.clone(),
            config.artifacts_base_url.clone(),
            config.offline,
        );

        let pending = Arc::new(Mutex::new(HashMap::new()));
        let pump_running = Arc::new(AtomicBool::new(true));

        let this = Self {
            config,
            store,
            cache,
            script_converter: Arc::new(BuiltinHanConverter),
            backend_factory,
            pending,
            next_message_id: AtomicU64::new(1),
            pump_running,
            pump_handle: Mutex::new(None),
        };
        this.start_pump();
        this
    }

    fn start_pump(&self) {
        let cache = Arc::clone(&self.cache);
        let pending = Arc::clone(&self.pending);
        let running = Arc::clone(&self.pump_running);
        let handle = thread::Builder::new()
            .name("mtrans-coordinator-pump".to_string())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    thread::sleep(PUMP_INTERVAL);
                    for entry in cache.entries_snapshot() {
                        for msg in entry.pool.try_recv_any() {
                            resolve_worker_message(&cache, &pending, msg);
                        }
                    }
                }
            })
            .expect("failed to spawn coordinator pump thread");
        *self.pump_handle.lock().expect("pump handle mutex poisoned") = Some(handle);
    }

    /// Every code the system accepts, including aliases.
    pub fn get_supported_languages(&self) -> Vec<String> {
        let mut codes: Vec<String> = crate::languages::SUPPORTED.iter().map(|s| s.to_string()).collect();
        codes.extend(crate::languages::aliases().keys().map(|s| s.to_string()));
        codes.sort();
        codes.dedup();
        codes
    }

    /// Classifies `text`, truncated to `MAX_DETECTION_LENGTH` characters.
    pub fn detect(&self, text: &str) -> LanguageCode {
        let truncated: String = text.chars().take(self.config.max_detection_length).collect();
        detect(&truncated)
    }

    /// Builds (or reuses) the pool for `(from, to)` and returns a handle
    /// bound to it.
    pub fn preload(&self, from: &str, to: &str) -> Result<TranslationHandle<'_>, TranslateError> {
        let from_code = resolve_alias(from);
        let to_code = resolve_alias(to);
        if !is_supported(from_code.as_str()) || !is_supported(to_code.as_str()) {
            return Err(TranslateError::InvalidLanguage(format!("{from}/{to}")));
        }
        let pair = LanguagePair::new(from_code, to_code);
        let effective = effective_pair(&pair);
        if effective.from != effective.to {
            self.ensure_pool(&effective)?;
        }
        Ok(TranslationHandle { translator: self, pair })
    }

    fn ensure_pool(&self, pair: &LanguagePair) -> Result<Arc<crate::cache::EngineCacheEntry>, TranslateError> {
        let key = pair.key();
        let workers_per_pair = self.config.workers_per_pair;
        let worker_init_timeout = self.config.worker_init_timeout;
        let backend_factory = Arc::clone(&self.backend_factory);
        let pair_clone = pair.clone();
        let store = &self.store;

        self.cache.get_or_create(&key, move || {
            store.init(false)?;
            let payloads = collect_model_payloads(store, &pair_clone)?;
            EnginePool::build(
                workers_per_pair,
                pair_clone.from.as_str(),
                pair_clone.to.as_str(),
                payloads,
                backend_factory,
                worker_init_timeout,
            )
        })
    }

    /// The full `Translate(input, from, to, isHTML)` pipeline (§4.7).
    pub fn translate(
        &self,
        input: TranslateInput,
        from: &str,
        to: &str,
        is_html: bool,
    ) -> Result<TranslateInput, TranslateError> {
        let was_many = matches!(input, TranslateInput::Many(_));
        let texts = input.into_vec();

        let resolved_from = if from == "auto" {
            let first = texts.first().map(String::as_str).unwrap_or("");
            self.detect(first)
        } else {
            if !is_supported(from) {
                return Err(TranslateError::InvalidLanguage(from.to_string()));
            }
            resolve_alias(from)
        };
        if !is_supported(to) {
            return Err(TranslateError::InvalidLanguage(to.to_string()));
        }
        let to_code = resolve_alias(to);

        if resolved_from == to_code {
            return Ok(TranslateInput::wrap_like(was_many, texts));
        }

        let mut effective_from = resolved_from.clone();
        let mut effective_to = to_code.clone();
        let mut pre_convert: Option<&'static str> = None;
        let mut post_convert: Option<&'static str> = None;

        if is_han_variant(resolved_from.as_str()) {
            pre_convert = crate::languages::to_hans(resolved_from.as_str());
            effective_from = LanguageCode::from("zh-Hans");
        }
        if is_han_variant(to_code.as_str()) {
            post_convert = crate::languages::from_hans(to_code.as_str());
            effective_to = LanguageCode::from("zh-Hans");
        }

        let pure_script_conversion = effective_from.as_str() == "zh-Hans" && effective_to.as_str() == "zh-Hans";

        if pure_script_conversion {
            let results = texts
                .iter()
                .map(|t| self.apply_script_plan(t, pre_convert, post_convert))
                .collect();
            return Ok(TranslateInput::wrap_like(was_many, results));
        }

        let pair = LanguagePair::new(effective_from, effective_to);
        let entry = self.ensure_pool(&pair)?;

        let mut results = Vec::with_capacity(texts.len());
        let mut waiters = Vec::with_capacity(texts.len());

        for text in &texts {
            if text.trim().is_empty() {
                waiters.push(None);
                continue;
            }
            let source_for_worker = match pre_convert {
                Some(_) => self.script_converter.convert(text, ScriptDirection::ToHans),
                None => text.clone(),
            };
            let (tx, rx) = mpsc::channel();
            let message_id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
            self.pending.lock().expect("pending map mutex poisoned").insert(
                message_id,
                PendingTranslation { resolver: tx, pair_key: pair.key() },
            );
            entry.pool.submit(message_id, message_id, source_for_worker, is_html);
            waiters.push(Some(rx));
        }

        for waiter in waiters {
            match waiter {
                None => results.push(String::new()),
                Some(rx) => {
                    let resolved = rx
                        .recv_timeout(Duration::from_secs(300))
                        .unwrap_or(Err(TranslateError::TranslationFailure("no response from worker".to_string())))?;
                    let final_text = match post_convert {
                        Some(variant) => self
                            .script_converter
                            .convert(&resolved, ScriptDirection::FromHans(variant)),
                        None => resolved,
                    };
                    results.push(final_text);
                }
            }
        }

        self.cache.keep_alive(&pair.key());
        Ok(TranslateInput::wrap_like(was_many, results))
    }

    fn apply_script_plan(&self, text: &str, pre: Option<&'static str>, post: Option<&'static str>) -> String {
        if text.trim().is_empty() {
            return String::new();
        }
        let after_pre = match pre {
            Some(_) => self.script_converter.convert(text, ScriptDirection::ToHans),
            None => text.to_string(),
        };
        match post {
            Some(variant) => self
                .script_converter
                .convert(&after_pre, ScriptDirection::FromHans(variant)),
            None => after_pre,
        }
    }

    /// Sends `DiscardQueue` to every worker for `pair` and rejects all
    /// in-flight messages against it with `Discarded`.
    pub fn discard_translations(&self, pair: &LanguagePair) {
        let effective = effective_pair(pair);
        if let Some(entry) = self.cache.get(&effective.key()) {
            entry.pool.discard_all();
        }
    }

    /// Cancels `translation_id` if it is still queued on `pair`'s pool,
    /// broadcasting `CancelOne` to every worker (§6.1, §7).
    pub fn cancel(&self, pair: &LanguagePair, translation_id: u64) {
        let effective = effective_pair(pair);
        if let Some(entry) = self.cache.get(&effective.key()) {
            entry.pool.cancel_one(translation_id);
        }
    }

    /// Rejects all pending messages, terminates all pools, stops the
    /// sweeper and the response pump. Idempotent.
    pub fn shutdown(&self) {
        tracing::debug!("translator shutdown requested");
        let mut pending = self.pending.lock().expect("pending map mutex poisoned");
        for (_, entry) in pending.drain() {
            let _ = entry.resolver.send(Err(TranslateError::Shutdown));
        }
        drop(pending);

        self.cache.clear();
        self.pump_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.pump_handle.lock().expect("pump handle mutex poisoned").take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Translator {
    fn drop(&mut self) {
        self.pump_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.pump_handle.lock().expect("pump handle mutex poisoned").take() {
            let _ = handle.join();
        }
    }
}

/// Resolves one worker message against the pending map. A `TranslationError`
/// carrying a cooperative cancellation (`CancelOne`/`DiscardQueue`, both
/// surfaced as `TranslateError::Cancelled`) only fails the one message it
/// names. Any other `TranslationError` is a genuine backend failure (§4.7,
/// §7): the pair's cache entry is torn down and every other message still
/// pending against that pair fails with the same error, matching
/// `discard_translations`'s teardown path instead of leaving siblings to
/// time out on their own.
fn resolve_worker_message(
    cache: &CacheManager,
    pending: &Mutex<HashMap<u64, PendingTranslation>>,
    msg: crate::worker::WorkerMessage,
) {
    use crate::worker::WorkerMessage::*;
    let (message_id, result) = match msg {
        TranslationResponse { message_id, target_text, .. } => (message_id, Ok(target_text)),
        TranslationError { message_id, error } => (message_id, Err(TranslateError::TranslationFailure(error))),
        _ => return,
    };

    let is_cancellation = matches!(&result, Err(e) if e.to_string() == TranslateError::Cancelled.to_string());

    let entry = pending.lock().expect("pending map mutex poisoned").remove(&message_id);
    let Some(entry) = entry else { return };
    let pair_key = entry.pair_key.clone();
    let _ = entry.resolver.send(result);

    if is_cancellation {
        return;
    }

    cache.remove(&pair_key);
    let mut pending = pending.lock().expect("pending map mutex poisoned");
    let stale: Vec<u64> = pending
        .iter()
        .filter(|(_, p)| p.pair_key == pair_key)
        .map(|(id, _)| *id)
        .collect();
    for id in stale {
        if let Some(sibling) = pending.remove(&id) {
            let _ = sibling
                .resolver
                .send(Err(TranslateError::TranslationFailure("sibling translation failed".to_string())));
        }
    }
}

/// Maps a Han-script variant leg of `pair` onto `zh-Hans`, the only Chinese
/// variant a pool is ever built for — script conversion happens around the
/// engine call, never inside it.
fn effective_pair(pair: &LanguagePair) -> LanguagePair {
    let from = if is_han_variant(pair.from.as_str()) {
        LanguageCode::from("zh-Hans")
    } else {
        pair.from.clone()
    };
    let to = if is_han_variant(pair.to.as_str()) {
        LanguageCode::from("zh-Hans")
    } else {
        pair.to.clone()
    };
    LanguagePair::new(from, to)
}

fn collect_model_payloads(store: &ModelStore, pair: &LanguagePair) -> Result<Vec<ModelPayload>, TranslateError> {
    let mut payloads = Vec::new();
    let direct = pair.from.as_str() == "en" || pair.to.as_str() == "en";

    if direct {
        append_bundle_payloads(&mut payloads, store.get_model(pair)?);
    } else {
        let en = LanguageCode::from("en");
        let first_hop = LanguagePair::new(pair.from.clone(), en.clone());
        let second_hop = LanguagePair::new(en, pair.to.clone());
        append_bundle_payloads(&mut payloads, store.get_model(&first_hop)?);
        append_bundle_payloads(&mut payloads, store.get_model(&second_hop)?);
    }
    Ok(payloads)
}

fn append_bundle_payloads(payloads: &mut Vec<ModelPayload>, bundle: crate::store::ModelBundle) {
    for (file_kind, bytes) in bundle.files {
        let alignment = crate::backend::alignment_for_file_kind(&file_kind);
        payloads.push(ModelPayload {
            name: file_kind.clone(),
            file_kind,
            bytes: Arc::from(bytes.into_boxed_slice()),
            alignment,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Attachment, ModelRecord};
    use sha2::{Digest, Sha256};
    use std::time::Duration as StdDuration;
    use tempfile::TempDir;

    fn test_translator() -> Translator {
        let mut config = Config::default();
        config.offline = true;
        config.worker_init_timeout = StdDuration::from_secs(5);
        Translator::new(config)
    }

    fn hash_of(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    /// Pre-seeds an offline data dir with a local catalog and already-valid
    /// model files for `pairs`, so `ensure_pool` resolves without any
    /// network access — the same fixture shape `store.rs`'s own tests use.
    fn fixture_translator(pairs: &[(&str, &str)]) -> (Translator, TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("models")).unwrap();

        let mut records = Vec::new();
        for (from, to) in pairs {
            let model_bytes = b"model-bytes";
            let vocab_bytes = b"vocab-bytes";
            let model_name = format!("{from}-{to}.model.bin");
            let vocab_name = format!("{from}-{to}.vocab.bin");
            std::fs::write(dir.path().join("models").join(&model_name), model_bytes).unwrap();
            std::fs::write(dir.path().join("models").join(&vocab_name), vocab_bytes).unwrap();
            records.push(ModelRecord {
                from_lang: from.to_string(),
                to_lang: to.to_string(),
                file_kind: "model".to_string(),
                name: model_name,
                attachment: Attachment { location: "unused://".to_string(), hash: hash_of(model_bytes) },
            });
            records.push(ModelRecord {
                from_lang: from.to_string(),
                to_lang: to.to_string(),
                file_kind: "vocab".to_string(),
                name: vocab_name,
                attachment: Attachment { location: "unused://".to_string(), hash: hash_of(vocab_bytes) },
            });
        }
        std::fs::write(dir.path().join("models.json"), serde_json::to_vec(&records).unwrap()).unwrap();

        let mut config = Config::default();
        config.offline = true;
        config.data_dir = dir.path().to_path_buf();
        config.worker_init_timeout = StdDuration::from_secs(5);
        (Translator::new(config), dir)
    }

    #[test]
    fn test_identity_translate_returns_input_unchanged() {
        let t = test_translator();
        let out = t
            .translate(TranslateInput::One("hello".to_string()), "en", "en", false)
            .unwrap();
        assert_eq!(out, TranslateInput::One("hello".to_string()));
    }

    #[test]
    fn test_identity_translate_via_alias() {
        let t = test_translator();
        let out = t
            .translate(TranslateInput::One("你好".to_string()), "zh", "zh-Hans", false)
            .unwrap();
        assert_eq!(out, TranslateInput::One("你好".to_string()));
    }

    #[test]
    fn test_invalid_language_rejected() {
        let t = test_translator();
        let err = t
            .translate(TranslateInput::One("hi".to_string()), "en", "xx", false)
            .unwrap_err();
        assert!(matches!(err, TranslateError::InvalidLanguage(_)));
    }

    #[test]
    fn test_empty_text_bypasses_engine() {
        let (t, _dir) = fixture_translator(&[("en", "zh-Hans")]);
        let out = t
            .translate(TranslateInput::One("   ".to_string()), "en", "zh-Hans", false)
            .unwrap();
        assert_eq!(out, TranslateInput::One(String::new()));
    }

    #[test]
    fn test_direct_pair_simple_text_s1() {
        let (t, _dir) = fixture_translator(&[("en", "zh-Hans")]);
        let out = t
            .translate(TranslateInput::One("Hello, world!".to_string()), "en", "zh-Hans", false)
            .unwrap();
        match out {
            TranslateInput::One(s) => assert!(s.contains("zh-Hans") && s.contains("Hello")),
            _ => panic!("expected scalar output"),
        }
    }

    #[test]
    fn test_pure_script_conversion_creates_no_engine_s3() {
        let t = test_translator();
        let out = t
            .translate(TranslateInput::One("简体中文".to_string()), "zh-Hans", "zh-Hant", false)
            .unwrap();
        match out {
            TranslateInput::One(s) => assert_eq!(s, "簡體中文"),
            _ => panic!("expected scalar output"),
        }
        assert_eq!(t.cache.len(), 0, "no neural pool should have been built");
    }

    #[test]
    fn test_batch_ordering_preserved_s6() {
        let (t, _dir) = fixture_translator(&[("en", "zh-Hans")]);
        let out = t
            .translate(
                TranslateInput::Many(vec!["A".to_string(), "".to_string(), "B".to_string()]),
                "en",
                "zh-Hans",
                false,
            )
            .unwrap();
        match out {
            TranslateInput::Many(v) => {
                assert_eq!(v.len(), 3);
                assert_eq!(v[1], "");
                assert!(v[0].contains('A'));
                assert!(v[2].contains('B'));
            }
            _ => panic!("expected list output"),
        }
    }

    #[test]
    fn test_preload_twice_reuses_same_pool() {
        let (t, _dir) = fixture_translator(&[("en", "ja")]);
        t.preload("en", "ja").unwrap();
        t.preload("en", "ja").unwrap();
        assert_eq!(t.cache.len(), 1, "second preload must not build a second pool");
    }

    #[test]
    fn test_shutdown_empties_cache_and_rejects_pending() {
        let (t, _dir) = fixture_translator(&[("en", "ja")]);
        t.preload("en", "ja").unwrap();
        assert_eq!(t.cache.len(), 1);
        t.shutdown();
        assert_eq!(t.cache.len(), 0);
    }

    #[test]
    fn test_get_supported_languages_includes_aliases() {
        let t = test_translator();
        let langs = t.get_supported_languages();
        assert!(langs.iter().any(|l| l == "zh"));
        assert!(langs.iter().any(|l| l == "en"));
    }
}
