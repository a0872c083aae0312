//! Configuration surface (§6.4). Loading these values from the environment
//! or a config file is an external collaborator's job — this crate only
//! defines the struct and its documented defaults; a `Config` is always
//! constructed explicitly by the embedding application.

use std::time::Duration;

/// Recognized configuration options for a [`crate::translator::Translator`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Disables all network requests; any required fetch fails with
    /// `Offline`.
    pub offline: bool,
    /// Pool size: number of workers per language pair.
    pub workers_per_pair: usize,
    /// Idle eviction timeout. `<= 0` disables eviction entirely.
    pub idle_timeout: Duration,
    pub idle_timeout_disabled: bool,
    /// Interval between sweeper passes.
    pub memory_check_interval: Duration,
    /// Minimum interval between idle-deadline rearms.
    pub timeout_reset_threshold: Duration,
    /// Bound on worker pool construction.
    pub worker_init_timeout: Duration,
    /// Characters of input the coordinator passes to the detector.
    pub max_detection_length: usize,
    /// Persistent cache root for the Model Store.
    pub data_dir: std::path::PathBuf,
    pub catalog_url: String,
    pub artifacts_base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            offline: false,
            workers_per_pair: 1,
            idle_timeout: Duration::from_secs(30 * 60),
            idle_timeout_disabled: false,
            memory_check_interval: Duration::from_millis(60_000),
            timeout_reset_threshold: Duration::from_millis(300_000),
            worker_init_timeout: Duration::from_millis(600_000),
            max_detection_length: 64,
            data_dir: std::path::PathBuf::from("./mtrans-data"),
            catalog_url: String::new(),
            artifacts_base_url: String::new(),
        }
    }
}
