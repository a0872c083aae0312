//! Model Store (C1): on-disk model registry, checksum-validated downloads,
//! and content-addressed reload.
//!
//! Grounded on the retrieval pack's `ModelManager` (a checksum-verified
//! downloader for OCR models): both read a JSON catalog, check each
//! artifact's local hash against the catalog before reusing it, and fetch
//! over HTTP with a bounded retry policy on mismatch. `sha2` provides the
//! SHA-256 verification exactly as the teacher's `cache::cache_key` uses it
//! for content hashing, just applied to files on disk instead of in-memory
//! source strings.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::TranslateError;
use crate::languages::LanguagePair;

const DOWNLOAD_ATTEMPTS: u32 = 3;
const RETRY_DELAY: std::time::Duration = std::time::Duration::from_millis(500);

/// One file of a translation model, as described by the catalog (§6.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRecord {
    #[serde(rename = "fromLang")]
    pub from_lang: String,
    #[serde(rename = "toLang")]
    pub to_lang: String,
    #[serde(rename = "fileType")]
    pub file_kind: String,
    pub name: String,
    pub attachment: Attachment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub location: String,
    pub hash: String,
}

/// All files required to translate one pair, keyed by file kind.
#[derive(Debug, Clone)]
pub struct ModelBundle {
    pub files: std::collections::HashMap<String, Vec<u8>>,
}

impl ModelBundle {
    /// A bundle is complete if it has `model` plus either `vocab` or both
    /// `srcvocab` and `trgvocab` (§3).
    pub fn is_complete(&self) -> bool {
        self.files.contains_key("model")
            && (self.files.contains_key("vocab")
                || (self.files.contains_key("srcvocab") && self.files.contains_key("trgvocab")))
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FlagsFile {
    downloaded: Vec<String>,
}

/// Resolves `pair → ModelBundle` from disk, downloading and verifying as
/// needed.
pub struct ModelStore {
    data_dir: PathBuf,
    catalog_url: String,
    artifacts_base_url: String,
    offline: bool,
    client: reqwest::blocking::Client,
    catalog: std::sync::Mutex<Option<Vec<ModelRecord>>>,
}

impl ModelStore {
    pub fn new(data_dir: PathBuf, catalog_url: String, artifacts_base_url: String, offline: bool) -> Self {
        Self {
            data_dir,
            catalog_url,
            artifacts_base_url,
            offline,
            client: reqwest::blocking::Client::new(),
            catalog: std::sync::Mutex::new(None),
        }
    }

    /// Resolves `location` against `ARTIFACTS_BASE_URL` (§6.4) when it isn't
    /// already an absolute URL, so a catalog can list artifact paths
    /// relative to a configurable mirror instead of baking in a host.
    fn artifact_url(&self, location: &str) -> String {
        if self.artifacts_base_url.is_empty() || location.starts_with("http://") || location.starts_with("https://")
        {
            location.to_string()
        } else {
            format!("{}/{}", self.artifacts_base_url.trim_end_matches('/'), location.trim_start_matches('/'))
        }
    }

    fn models_dir(&self) -> PathBuf {
        self.data_dir.join("models")
    }

    fn catalog_path(&self) -> PathBuf {
        self.data_dir.join("models.json")
    }

    fn flags_path(&self) -> PathBuf {
        self.data_dir.join("flags.json")
    }

    /// Ensures the cache/models directories exist and loads the catalog
    /// (from disk, or by fetching it if missing and `force_refresh` or no
    /// cached copy exists).
    pub fn init(&self, force_refresh: bool) -> Result<(), TranslateError> {
        std::fs::create_dir_all(self.models_dir())?;

        let needs_fetch = force_refresh || !self.catalog_path().exists();
        let records: Vec<ModelRecord> = if needs_fetch {
            if self.offline {
                if self.catalog_path().exists() {
                    self.read_catalog_file()?
                } else {
                    return Err(TranslateError::CatalogUnavailable);
                }
            } else {
                let fetched = self.fetch_catalog()?;
                self.write_json_atomic(&self.catalog_path(), &fetched)?;
                fetched
            }
        } else {
            self.read_catalog_file()?
        };

        *self.catalog.lock().expect("catalog mutex poisoned") = Some(records);
        Ok(())
    }

    fn read_catalog_file(&self) -> Result<Vec<ModelRecord>, TranslateError> {
        let bytes = std::fs::read(self.catalog_path()).map_err(|_| TranslateError::CatalogUnavailable)?;
        serde_json::from_slice(&bytes).map_err(TranslateError::from)
    }

    fn fetch_catalog(&self) -> Result<Vec<ModelRecord>, TranslateError> {
        let response = self
            .client
            .get(&self.catalog_url)
            .header("User-Agent", "mtrans-core")
            .header("Accept-Encoding", "gzip, deflate, br")
            .send()
            .map_err(|_| TranslateError::CatalogUnavailable)?;
        response.json::<Vec<ModelRecord>>().map_err(|_| TranslateError::CatalogUnavailable)
    }

    fn records_for(&self, pair: &LanguagePair) -> Result<Vec<ModelRecord>, TranslateError> {
        let guard = self.catalog.lock().expect("catalog mutex poisoned");
        let catalog = guard.as_ref().ok_or(TranslateError::CatalogUnavailable)?;
        let matches: Vec<ModelRecord> = catalog
            .iter()
            .filter(|r| r.from_lang == pair.from.as_str() && r.to_lang == pair.to.as_str())
            .cloned()
            .collect();
        if matches.is_empty() {
            return Err(TranslateError::NoSuchPair(pair.key()));
        }
        Ok(matches)
    }

    /// Returns a complete bundle for `pair`, downloading and re-verifying
    /// any missing or corrupt file (§4.1).
    pub fn get_model(&self, pair: &LanguagePair) -> Result<ModelBundle, TranslateError> {
        let records = self.records_for(pair)?;
        let mut files = std::collections::HashMap::new();

        for record in &records {
            let local_path = self.models_dir().join(&record.name);
            let needs_download = match std::fs::read(&local_path) {
                Ok(bytes) => sha256_hex(&bytes) != record.attachment.hash,
                Err(_) => true,
            };

            if needs_download {
                if self.offline {
                    return Err(TranslateError::Offline);
                }
                self.download_with_retry(record, &local_path)?;
            }

            let bytes = std::fs::read(&local_path)?;
            files.insert(record.file_kind.clone(), bytes);
        }

        let bundle = ModelBundle { files };
        if !bundle.is_complete() {
            return Err(TranslateError::NoSuchPair(pair.key()));
        }

        self.mark_downloaded(&pair.key())?;
        Ok(bundle)
    }

    fn download_with_retry(&self, record: &ModelRecord, local_path: &Path) -> Result<(), TranslateError> {
        let mut last_err = None;
        for attempt in 0..DOWNLOAD_ATTEMPTS {
            match self.download_once(record, local_path) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        file = %record.name,
                        attempt = attempt + 1,
                        error = %e,
                        "model artifact download attempt failed"
                    );
                    let _ = std::fs::remove_file(local_path);
                    last_err = Some(e);
                    if attempt + 1 < DOWNLOAD_ATTEMPTS {
                        std::thread::sleep(RETRY_DELAY);
                    }
                }
            }
        }
        Err(last_err.unwrap_or(TranslateError::ChecksumMismatch(record.name.clone())))
    }

    fn download_once(&self, record: &ModelRecord, local_path: &Path) -> Result<(), TranslateError> {
        let response = self
            .client
            .get(self.artifact_url(&record.attachment.location))
            .header("User-Agent", "mtrans-core")
            .header("Accept-Encoding", "gzip, deflate, br")
            .send()?;
        let bytes = response.bytes()?;

        if sha256_hex(&bytes) != record.attachment.hash {
            return Err(TranslateError::ChecksumMismatch(record.name.clone()));
        }

        if let Some(parent) = local_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(local_path, &bytes)?;
        Ok(())
    }

    fn mark_downloaded(&self, pair_key: &str) -> Result<(), TranslateError> {
        let mut flags = self.read_flags().unwrap_or_default();
        if !flags.downloaded.iter().any(|k| k == pair_key) {
            flags.downloaded.push(pair_key.to_string());
        }
        self.write_json_atomic(&self.flags_path(), &flags)
    }

    fn read_flags(&self) -> Result<FlagsFile, TranslateError> {
        let bytes = std::fs::read(self.flags_path())?;
        serde_json::from_slice(&bytes).map_err(TranslateError::from)
    }

    /// The set of pair-keys that have a complete, verified bundle on disk.
    pub fn list_downloaded(&self) -> HashSet<String> {
        self.read_flags()
            .map(|f| f.downloaded.into_iter().collect())
            .unwrap_or_default()
    }

    /// Writes `value` to `path` atomically: write to a sibling temp file,
    /// then rename, so a crash mid-write cannot corrupt the file.
    fn write_json_atomic<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), TranslateError> {
        let tmp_path = path.with_extension("tmp");
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(&serde_json::to_vec_pretty(value)?)?;
        file.sync_all()?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_fixture_catalog(dir: &Path, records: &[ModelRecord]) {
        std::fs::write(dir.join("models.json"), serde_json::to_vec(records).unwrap()).unwrap();
    }

    fn write_model_file(dir: &Path, name: &str, contents: &[u8]) -> String {
        std::fs::create_dir_all(dir.join("models")).unwrap();
        std::fs::write(dir.join("models").join(name), contents).unwrap();
        sha256_hex(contents)
    }

    #[test]
    fn test_get_model_reuses_valid_local_file_without_download() {
        let dir = tempdir().unwrap();
        let hash = write_model_file(dir.path(), "en-zh.model.bin", b"model-bytes");
        write_fixture_catalog(
            dir.path(),
            &[
                ModelRecord {
                    from_lang: "en".to_string(),
                    to_lang: "zh-Hans".to_string(),
                    file_kind: "model".to_string(),
                    name: "en-zh.model.bin".to_string(),
                    attachment: Attachment { location: "unused://".to_string(), hash },
                },
                ModelRecord {
                    from_lang: "en".to_string(),
                    to_lang: "zh-Hans".to_string(),
                    file_kind: "vocab".to_string(),
                    name: "en-zh.vocab.bin".to_string(),
                    attachment: Attachment {
                        location: "unused://".to_string(),
                        hash: write_model_file(dir.path(), "en-zh.vocab.bin", b"vocab-bytes"),
                    },
                },
            ],
        );

        let store = ModelStore::new(dir.path().to_path_buf(), String::new(), String::new(), true);
        store.init(false).unwrap();
        let bundle = store
            .get_model(&LanguagePair::new("en", "zh-Hans"))
            .expect("bundle should resolve from local files without network access");
        assert!(bundle.is_complete());
        assert_eq!(bundle.files.get("model").unwrap(), b"model-bytes");
    }

    #[test]
    fn test_get_model_fails_no_such_pair() {
        let dir = tempdir().unwrap();
        write_fixture_catalog(dir.path(), &[]);
        let store = ModelStore::new(dir.path().to_path_buf(), String::new(), String::new(), true);
        store.init(false).unwrap();
        let err = store.get_model(&LanguagePair::new("en", "xx")).unwrap_err();
        assert!(matches!(err, TranslateError::NoSuchPair(_)));
    }

    #[test]
    fn test_get_model_offline_with_missing_file_fails_offline() {
        let dir = tempdir().unwrap();
        write_fixture_catalog(
            dir.path(),
            &[ModelRecord {
                from_lang: "en".to_string(),
                to_lang: "ja".to_string(),
                file_kind: "model".to_string(),
                name: "en-ja.model.bin".to_string(),
                attachment: Attachment { location: "unused://".to_string(), hash: "deadbeef".to_string() },
            }],
        );
        let store = ModelStore::new(dir.path().to_path_buf(), String::new(), String::new(), true);
        store.init(false).unwrap();
        let err = store.get_model(&LanguagePair::new("en", "ja")).unwrap_err();
        assert!(matches!(err, TranslateError::Offline));
    }

    #[test]
    fn test_init_fails_catalog_unavailable_when_offline_and_missing() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path().to_path_buf(), String::new(), String::new(), true);
        let err = store.init(false).unwrap_err();
        assert!(matches!(err, TranslateError::CatalogUnavailable));
    }

    #[test]
    fn test_artifact_url_joins_relative_location_with_base() {
        let store = ModelStore::new(PathBuf::new(), String::new(), "https://mirror.example/artifacts".to_string(), true);
        assert_eq!(
            store.artifact_url("en-ja/model.bin"),
            "https://mirror.example/artifacts/en-ja/model.bin"
        );
    }

    #[test]
    fn test_artifact_url_leaves_absolute_location_unchanged() {
        let store = ModelStore::new(PathBuf::new(), String::new(), "https://mirror.example/artifacts".to_string(), true);
        assert_eq!(store.artifact_url("https://other.example/model.bin"), "https://other.example/model.bin");
    }

    #[test]
    fn test_artifact_url_without_base_leaves_location_unchanged() {
        let store = ModelStore::new(PathBuf::new(), String::new(), String::new(), true);
        assert_eq!(store.artifact_url("en-ja/model.bin"), "en-ja/model.bin");
    }

    #[test]
    fn test_list_downloaded_reflects_mark_after_get_model() {
        let dir = tempdir().unwrap();
        let hash = write_model_file(dir.path(), "en-ja.model.bin", b"m");
        let vocab_hash = write_model_file(dir.path(), "en-ja.vocab.bin", b"v");
        write_fixture_catalog(
            dir.path(),
            &[
                ModelRecord {
                    from_lang: "en".to_string(),
                    to_lang: "ja".to_string(),
                    file_kind: "model".to_string(),
                    name: "en-ja.model.bin".to_string(),
                    attachment: Attachment { location: "unused://".to_string(), hash },
                },
                ModelRecord {
                    from_lang: "en".to_string(),
                    to_lang: "ja".to_string(),
                    file_kind: "vocab".to_string(),
                    name: "en-ja.vocab.bin".to_string(),
                    attachment: Attachment { location: "unused://".to_string(), hash: vocab_hash },
                },
            ],
        );
        let store = ModelStore::new(dir.path().to_path_buf(), String::new(), String::new(), true);
        store.init(false).unwrap();
        store.get_model(&LanguagePair::new("en", "ja")).unwrap();
        assert!(store.list_downloaded().contains("en_ja"));
    }
}
