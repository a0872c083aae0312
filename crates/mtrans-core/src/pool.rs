//! Engine Pool (C6): a fixed-size, round-robin pool of workers for one
//! language pair, built atomically — either every worker reaches
//! `InitSuccess` or construction fails and every already-started sibling is
//! terminated.
//!
//! Directly generalizes the teacher's `InterpreterPool`: there, `size`
//! identical `PyInterp` slots back a stateless code-execution service; here,
//! `size` identical [`crate::worker::WorkerHandle`]s back one loaded
//! language pair, selected round-robin exactly as `InterpreterPool` selects
//! an available slot — except here every worker is already "available" by
//! construction (each owns its own Work Queue), so dispatch never blocks on
//! pool capacity the way `dispatch_work` can.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::TranslateError;
use crate::worker::{BackendFactory, CoordinatorMessage, ModelPayload, WorkerHandle, WorkerMessage};

/// The fixed set of workers serving one language pair.
pub struct EnginePool {
    workers: Vec<WorkerHandle>,
    rr_index: AtomicUsize,
}

impl EnginePool {
    /// Builds a pool of `size` workers (minimum 1), each initialized with
    /// `model_payloads` via the given `backend_factory`. Blocks until every
    /// worker reports `InitSuccess` or `worker_init_timeout` elapses.
    ///
    /// On any worker failure or timeout, every worker started so far
    /// (including ones that already succeeded) is terminated and the error
    /// is returned — construction is all-or-nothing (§4.5).
    pub fn build(
        size: usize,
        source_lang: &str,
        target_lang: &str,
        model_payloads: Vec<ModelPayload>,
        backend_factory: Arc<BackendFactory>,
        worker_init_timeout: Duration,
    ) -> Result<Self, TranslateError> {
        let target_size = size.max(1);
        let mut workers = Vec::with_capacity(target_size);

        for slot_id in 0..target_size {
            let handle = WorkerHandle::spawn(
                format!("mtrans-worker-{source_lang}-{target_lang}-{slot_id}"),
                source_lang.to_string(),
                Arc::clone(&backend_factory),
            );

            let ready_result = handle.from_worker.lock().unwrap().recv_timeout(worker_init_timeout);
            match ready_result {
                Ok(WorkerMessage::WorkerReady) => {}
                _ => {
                    workers.push(handle);
                    return Self::abort(
                        workers,
                        TranslateError::WorkerInitTimeout(worker_init_timeout.as_millis() as u64),
                    );
                }
            }

            if handle
                .to_worker
                .send(CoordinatorMessage::InitRequest {
                    source_language: source_lang.to_string(),
                    target_language: target_lang.to_string(),
                    model_payloads: model_payloads.clone(),
                })
                .is_err()
            {
                workers.push(handle);
                return Self::abort(
                    workers,
                    TranslateError::WorkerInitError("worker channel closed before init".to_string()),
                );
            }

            let init_result = handle.from_worker.lock().unwrap().recv_timeout(worker_init_timeout);
            match init_result {
                Ok(WorkerMessage::InitSuccess) => {
                    workers.push(handle);
                }
                Ok(WorkerMessage::InitError { error }) => {
                    workers.push(handle);
                    return Self::abort(workers, TranslateError::WorkerInitError(error));
                }
                _ => {
                    workers.push(handle);
                    return Self::abort(
                        workers,
                        TranslateError::WorkerInitTimeout(worker_init_timeout.as_millis() as u64),
                    );
                }
            }
        }

        Ok(EnginePool {
            workers,
            rr_index: AtomicUsize::new(0),
        })
    }

    fn abort(workers: Vec<WorkerHandle>, err: TranslateError) -> Result<Self, TranslateError> {
        for worker in workers {
            worker.terminate();
        }
        Err(err)
    }

    /// Selects `workers[rrIndex]`, advances the round-robin index, and
    /// dispatches the translation request to it. Non-blocking: the worker's
    /// own Work Queue absorbs back-pressure.
    pub fn submit(&self, message_id: u64, translation_id: u64, source_text: String, is_html: bool) {
        let idx = self.rr_index.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        let _ = self.workers[idx]
            .to_worker
            .send(CoordinatorMessage::TranslationRequest {
                message_id,
                translation_id,
                source_text,
                is_html,
            });
    }

    /// Broadcasts `DiscardQueue` to every worker in the pool.
    pub fn discard_all(&self) {
        for worker in &self.workers {
            let _ = worker.to_worker.send(CoordinatorMessage::DiscardQueue);
        }
    }

    /// Broadcasts `CancelOne` to every worker — the coordinator does not
    /// track which worker a translation_id was routed to, so every worker
    /// but the one actually holding it treats this as a no-op.
    pub fn cancel_one(&self, translation_id: u64) {
        for worker in &self.workers {
            let _ = worker
                .to_worker
                .send(CoordinatorMessage::CancelOne { translation_id });
        }
    }

    /// Terminates every worker.
    pub fn shutdown(self) {
        for worker in self.workers {
            worker.terminate();
        }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Drains every worker's `from_worker` channel once, non-blocking. Used
    /// by the coordinator's response-collection loop.
    pub fn try_recv_any(&self) -> Vec<WorkerMessage> {
        let mut out = Vec::new();
        for worker in &self.workers {
            while let Ok(msg) = worker.from_worker.lock().unwrap().try_recv() {
                out.push(msg);
            }
        }
        out
    }
}
