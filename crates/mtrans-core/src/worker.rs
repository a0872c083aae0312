//! Inference Worker (C4): an isolated unit owning one backend instance and
//! its Work Queue, communicating with the coordinator solely by message
//! (§6.2). Generalizes the teacher's `start_slot_thread` (`pool.rs`): there
//! a slot thread owns a `!Send` `PyInterp`; here a worker thread owns a
//! `dyn InferenceBackend` handle that likewise never crosses a thread
//! boundary, and a second thread drains its Work Queue so control messages
//! (`DiscardQueue`, `CancelOne`) are never blocked behind a long-running
//! translation batch.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use crate::backend::{InferenceBackend, InferenceKnobs};
use crate::error::TranslateError;
use crate::queue::{WorkItem, WorkQueue};
use crate::text::clean_text;
use crate::timeout::run_with_timeout;

/// Bound on a single `InferenceBackend::translate` call. A real backend that
/// hangs (corrupt model, runaway beam search) must not wedge a worker's
/// drain thread forever; the teacher applies the same abandonment strategy
/// to a Python loop that never yields.
const INFERENCE_CALL_TIMEOUT_NS: u64 = 120_000_000_000;

/// One file of a translation model, handed to the backend factory during
/// `InitRequest`.
#[derive(Debug, Clone)]
pub struct ModelPayload {
    pub file_kind: String,
    pub name: String,
    pub bytes: Arc<[u8]>,
    /// Byte alignment this file needs once copied into a worker's memory
    /// (§4.3 step 1), computed by `backend::alignment_for_file_kind`.
    pub alignment: usize,
}

/// Messages the coordinator sends to a worker (§6.2, C → W).
pub enum CoordinatorMessage {
    InitRequest {
        source_language: String,
        target_language: String,
        model_payloads: Vec<ModelPayload>,
    },
    TranslationRequest {
        message_id: u64,
        translation_id: u64,
        source_text: String,
        is_html: bool,
    },
    DiscardQueue,
    CancelOne {
        translation_id: u64,
    },
    Terminate,
}

/// Messages a worker sends to the coordinator (§6.2, W → C).
pub enum WorkerMessage {
    WorkerReady,
    InitSuccess,
    InitError { error: String },
    TranslationResponse {
        message_id: u64,
        translation_id: u64,
        target_text: String,
        inference_millis: u64,
    },
    TranslationError { message_id: u64, error: String },
    TranslationsDiscarded,
}

/// Constructs a concrete [`InferenceBackend`] from a loaded model payload
/// set. The Engine Pool owns one factory per pair and hands it to each
/// worker it spawns — the seam that keeps the real inference runtime
/// pluggable without this core depending on it directly.
pub type BackendFactory =
    dyn Fn(&str, &str, &[ModelPayload], &InferenceKnobs) -> Result<Box<dyn InferenceBackend>, TranslateError>
        + Send
        + Sync;

/// A running worker's communication endpoints and join handle.
pub struct WorkerHandle {
    pub to_worker: Sender<CoordinatorMessage>,
    pub from_worker: Mutex<Receiver<WorkerMessage>>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Spawns a worker thread named `name`. The worker immediately emits
    /// `WorkerReady` and then waits for an `InitRequest`.
    pub fn spawn(name: String, source_lang: String, backend_factory: Arc<BackendFactory>) -> Self {
        let (to_worker_tx, to_worker_rx) = mpsc::channel::<CoordinatorMessage>();
        let (from_worker_tx, from_worker_rx) = mpsc::channel::<WorkerMessage>();

        let join = thread::Builder::new()
            .name(name)
            .spawn(move || run_worker(to_worker_rx, from_worker_tx, source_lang, backend_factory))
            .expect("failed to spawn worker thread");

        WorkerHandle {
            to_worker: to_worker_tx,
            from_worker: Mutex::new(from_worker_rx),
            join: Some(join),
        }
    }

    /// Sends `Terminate` and joins the worker thread. Resources (backend,
    /// queue) are released on the worker thread before this returns.
    pub fn terminate(mut self) {
        let _ = self.to_worker.send(CoordinatorMessage::Terminate);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        let _ = self.to_worker.send(CoordinatorMessage::Terminate);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn run_worker(
    rx: Receiver<CoordinatorMessage>,
    tx: Sender<WorkerMessage>,
    source_lang: String,
    backend_factory: Arc<BackendFactory>,
) {
    let _ = tx.send(WorkerMessage::WorkerReady);

    let backend: Arc<dyn InferenceBackend> = loop {
        match rx.recv() {
            Ok(CoordinatorMessage::InitRequest {
                source_language,
                target_language,
                model_payloads,
            }) => {
                let model_file_name = model_payloads
                    .iter()
                    .find(|p| p.file_kind == "model")
                    .map(|p| p.name.as_str())
                    .unwrap_or("");
                let has_quality_model = model_payloads.iter().any(|p| p.file_kind == "qualityModel");
                let knobs = InferenceKnobs::new(has_quality_model, model_file_name);

                match backend_factory(&source_language, &target_language, &model_payloads, &knobs) {
                    Ok(backend) => {
                        let _ = tx.send(WorkerMessage::InitSuccess);
                        break Arc::from(backend);
                    }
                    Err(e) => {
                        tracing::warn!(source = %source_language, target = %target_language, error = %e, "worker backend init failed");
                        let _ = tx.send(WorkerMessage::InitError { error: e.to_string() });
                        return;
                    }
                }
            }
            Ok(CoordinatorMessage::Terminate) | Err(_) => return,
            Ok(_) => continue,
        }
    };

    let queue = Arc::new(WorkQueue::new());
    let drain_queue = Arc::clone(&queue);
    let drain_handle = thread::Builder::new()
        .name("mtrans-worker-queue".to_string())
        .spawn(move || drain_queue.drain_loop())
        .expect("failed to spawn queue drain thread");

    loop {
        match rx.recv() {
            Ok(CoordinatorMessage::TranslationRequest {
                message_id,
                translation_id,
                source_text,
                is_html: _,
            }) => {
                let cleaned = clean_text(&source_text, &source_lang);
                let backend = Arc::clone(&backend);
                let tx_complete = tx.clone();
                let started = Instant::now();
                queue.run_task(WorkItem {
                    translation_id,
                    task: Box::new(move || {
                        let sentence = cleaned.cleaned.clone();
                        let call_backend = Arc::clone(&backend);
                        let translated = run_with_timeout(
                            move || call_backend.translate(&[sentence]),
                            INFERENCE_CALL_TIMEOUT_NS,
                        )
                        .ok_or_else(|| TranslateError::TranslationFailure("inference call timed out".to_string()))??;
                        let first = translated.into_iter().next().unwrap_or_default();
                        Ok(crate::text::rewrap(&cleaned, &first))
                    }),
                    completion: Box::new(move |result| {
                        let inference_millis = started.elapsed().as_millis() as u64;
                        match result {
                            Ok(target_text) => {
                                let _ = tx_complete.send(WorkerMessage::TranslationResponse {
                                    message_id,
                                    translation_id,
                                    target_text,
                                    inference_millis,
                                });
                            }
                            Err(e) => {
                                let _ = tx_complete.send(WorkerMessage::TranslationError {
                                    message_id,
                                    error: e.to_string(),
                                });
                            }
                        }
                    }),
                });
            }
            Ok(CoordinatorMessage::DiscardQueue) => {
                queue.cancel_all();
                let _ = tx.send(WorkerMessage::TranslationsDiscarded);
            }
            Ok(CoordinatorMessage::CancelOne { translation_id }) => {
                queue.cancel_one(translation_id);
            }
            Ok(CoordinatorMessage::InitRequest { .. }) => {
                // Already initialized; a second InitRequest is a coordinator bug
                // we tolerate silently rather than corrupting worker state.
            }
            Ok(CoordinatorMessage::Terminate) | Err(_) => break,
        }
    }

    queue.close();
    let _ = drain_handle.join();
}

/// A [`BackendFactory`] that always builds a [`crate::backend::NullBackend`],
/// ignoring the model payloads. Used by the core's own tests and the demo
/// CLI in place of a real inference runtime.
pub fn null_backend_factory() -> Arc<BackendFactory> {
    Arc::new(|_source: &str, target: &str, _payloads: &[ModelPayload], _knobs: &InferenceKnobs| {
        Ok(Box::new(crate::backend::NullBackend::new(target)) as Box<dyn InferenceBackend>)
    })
}
