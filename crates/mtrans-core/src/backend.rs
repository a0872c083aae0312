//! Inference backend boundary: the interface this core needs from the
//! concrete neural inference runtime (Bergamot/Marian), which is treated as
//! an external, black-box capability. Mirrors the `Translator` trait shape
//! found in the voice-agent retrieval pack example: a handle constructed
//! from loaded model bytes, with a synchronous `translate` call.

use crate::error::TranslateError;

/// Alignment in bytes required for each model file kind when copied into a
/// worker's sandboxed memory (§4.3 step 1).
pub fn alignment_for_file_kind(kind: &str) -> usize {
    match kind {
        "model" => 256,
        _ => 64,
    }
}

/// GEMM precision mode, selected from the model file name (§4.3 step 3).
pub fn gemm_precision(model_file_name: &str) -> &'static str {
    if model_file_name.ends_with("intgemm8.bin") {
        "int8shiftAll"
    } else {
        "int8shiftAlphaAll"
    }
}

/// The fixed inference configuration knobs (§4.3 step 4). Exact values are
/// part of the interface contract with the inference runtime; changing them
/// changes observable translation output.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceKnobs {
    pub beam_size: u32,
    pub normalize: f64,
    pub word_penalty: f64,
    pub max_length_break: u32,
    pub mini_batch_words: u32,
    pub workspace: u32,
    pub max_length_factor: f64,
    pub skip_cost: bool,
    pub cpu_threads: u32,
    pub quiet: bool,
    pub quiet_translation: bool,
    pub alignment: &'static str,
    pub gemm_precision: &'static str,
}

impl InferenceKnobs {
    /// `skip_cost` is true exactly when no quality model is loaded;
    /// `gemm_precision` is selected from the model file's name (§4.3 steps
    /// 3-4), handed to the backend factory alongside the model payloads.
    pub fn new(has_quality_model: bool, model_file_name: &str) -> Self {
        Self {
            beam_size: 1,
            normalize: 1.0,
            word_penalty: 0.0,
            max_length_break: 128,
            mini_batch_words: 1024,
            workspace: 128,
            max_length_factor: 2.0,
            skip_cost: !has_quality_model,
            cpu_threads: 0,
            quiet: true,
            quiet_translation: true,
            alignment: "soft",
            gemm_precision: gemm_precision(model_file_name),
        }
    }
}

/// A loaded set of 1 or 2 translation models (direct, or source→pivot +
/// pivot→target) ready to translate sentences. Construction is the only
/// place a concrete backend touches model bytes; `translate` is
/// synchronous, matching the Work Queue's one-task-at-a-time drain loop.
pub trait InferenceBackend: Send + Sync {
    /// Translate each sentence in `sentences` independently, preserving
    /// order. Returns one output per input.
    fn translate(&self, sentences: &[String]) -> Result<Vec<String>, TranslateError>;
}

/// Deterministic stand-in backend used by the core's own tests and the demo
/// CLI. It performs no real translation — it echoes each input tagged with
/// the configured target language — so the worker/pool/cache machinery is
/// exercisable without a real model binary. Never mistake this for a
/// production backend.
pub struct NullBackend {
    target_tag: String,
}

impl NullBackend {
    pub fn new(target_lang: &str) -> Self {
        Self {
            target_tag: target_lang.to_string(),
        }
    }
}

impl InferenceBackend for NullBackend {
    fn translate(&self, sentences: &[String]) -> Result<Vec<String>, TranslateError> {
        Ok(sentences
            .iter()
            .map(|s| format!("[{}] {}", self.target_tag, s))
            .collect())
    }
}
