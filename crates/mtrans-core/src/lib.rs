// mtrans-core: embedded, local machine-translation orchestration engine.

pub mod backend;
pub mod cache;
pub mod config;
pub mod detect;
pub mod error;
pub mod languages;
pub mod pool;
pub mod queue;
pub mod script;
pub mod store;
pub mod text;
pub mod timeout;
pub mod translator;
pub mod worker;

pub use backend::{InferenceBackend, InferenceKnobs, NullBackend};
pub use config::Config;
pub use error::TranslateError;
pub use languages::{LanguageCode, LanguagePair};
pub use translator::{TranslateInput, Translator};
