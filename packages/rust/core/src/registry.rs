//! In-memory registry of background enrichment runs.
//!
//! A serving layer calls [`RunRegistry::start`] and later polls the returned
//! handle. Entries stay until the caller removes them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use siren_enrich_shared::RunId;

use crate::pipeline::{RunRequest, RunSummary, SilentProgress, run_enrichment};

/// Lifecycle state of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Processing,
    Completed { summary: RunSummary },
    Error { message: String },
}

impl RunStatus {
    /// Completed or failed; the input file is no longer in use.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Processing => f.write_str("processing"),
            Self::Completed { .. } => f.write_str("completed"),
            Self::Error { message } => write!(f, "error: {message}"),
        }
    }
}

/// A registered run and its timestamps.
#[derive(Debug, Clone, Serialize)]
pub struct RunEntry {
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Returned by [`RunRegistry::start`]; used to poll the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RunHandle {
    pub id: RunId,
}

/// Cloneable store of run statuses keyed by [`RunId`].
#[derive(Debug, Clone, Default)]
pub struct RunRegistry {
    runs: Arc<Mutex<HashMap<RunId, RunEntry>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a run as `processing` and execute it in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, request: RunRequest) -> RunHandle {
        let handle = RunHandle { id: RunId::new() };
        lock(&self.runs).insert(
            handle.id,
            RunEntry {
                status: RunStatus::Processing,
                started_at: Utc::now(),
                finished_at: None,
            },
        );
        info!(run = %handle.id, input = %request.input.display(), "run registered");

        let task = tokio::spawn(async move { run_enrichment(&request, &SilentProgress).await });

        let runs = Arc::clone(&self.runs);
        tokio::spawn(async move {
            let status = match task.await {
                Ok(Ok(summary)) => RunStatus::Completed { summary },
                Ok(Err(e)) => RunStatus::Error {
                    message: e.to_string(),
                },
                Err(e) => RunStatus::Error {
                    message: format!("run task aborted: {e}"),
                },
            };

            match &status {
                RunStatus::Error { message } => warn!(run = %handle.id, %message, "run failed"),
                _ => info!(run = %handle.id, "run completed"),
            }

            if let Some(entry) = lock(&runs).get_mut(&handle.id) {
                entry.status = status;
                entry.finished_at = Some(Utc::now());
            }
        });

        handle
    }

    /// Current status, or `None` for an unknown or removed run.
    pub fn poll_status(&self, handle: &RunHandle) -> Option<RunStatus> {
        lock(&self.runs).get(&handle.id).map(|e| e.status.clone())
    }

    /// Full entry including timestamps.
    pub fn get(&self, handle: &RunHandle) -> Option<RunEntry> {
        lock(&self.runs).get(&handle.id).cloned()
    }

    /// Evict a run. A still-running task keeps going but its result is dropped.
    pub fn remove(&self, handle: &RunHandle) -> Option<RunStatus> {
        lock(&self.runs).remove(&handle.id).map(|e| e.status)
    }

    pub fn len(&self) -> usize {
        lock(&self.runs).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.runs).is_empty()
    }
}

fn lock(runs: &Mutex<HashMap<RunId, RunEntry>>) -> MutexGuard<'_, HashMap<RunId, RunEntry>> {
    runs.lock().unwrap_or_else(PoisonError::into_inner)
}
