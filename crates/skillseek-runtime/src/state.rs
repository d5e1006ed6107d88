//! Observable ingestion progress, shared between the coordinator (writer)
//! and the tool surface / health endpoint (readers).

use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use tokio::sync::watch;

/// One recorded ingestion failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadError {
    pub source: String,
    pub message: String,
}

/// Consistent point-in-time view of ingestion progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadingSnapshot {
    pub sources_total: usize,
    pub sources_done: usize,
    pub skills_loaded: usize,
    pub errors: Vec<LoadError>,
    pub is_complete: bool,
}

#[derive(Default)]
struct Inner {
    sources_total: usize,
    sources_done: usize,
    skills_loaded: usize,
    errors: Vec<LoadError>,
}

/// Progress record mutated only by the coordinator.
///
/// A separate watch channel carries fatal conditions (the embedding model
/// refusing to load) so the binary can terminate instead of serving an
/// index that can never grow.
pub struct LoadingState {
    inner: RwLock<Inner>,
    fatal_tx: watch::Sender<Option<String>>,
}

impl LoadingState {
    pub fn new(sources_total: usize) -> Self {
        let (fatal_tx, _) = watch::channel(None);
        Self {
            inner: RwLock::new(Inner { sources_total, ..Inner::default() }),
            fatal_tx,
        }
    }

    pub fn snapshot(&self) -> LoadingSnapshot {
        let inner = self.inner.read().unwrap();
        LoadingSnapshot {
            sources_total: inner.sources_total,
            sources_done: inner.sources_done,
            skills_loaded: inner.skills_loaded,
            errors: inner.errors.clone(),
            is_complete: inner.sources_done >= inner.sources_total,
        }
    }

    pub fn is_complete(&self) -> bool {
        let inner = self.inner.read().unwrap();
        inner.sources_done >= inner.sources_total
    }

    /// Mark one source finished, crediting it with the skills it indexed.
    pub fn record_source_done(&self, skills_loaded: usize) {
        let mut inner = self.inner.write().unwrap();
        inner.sources_done += 1;
        inner.skills_loaded += skills_loaded;
    }

    pub fn record_error(&self, source: &str, message: &str) {
        let mut inner = self.inner.write().unwrap();
        inner.errors.push(LoadError { source: source.to_string(), message: message.to_string() });
    }

    /// Credit skills added outside source ingestion (uploads, refreshes).
    pub fn record_extra_skills(&self, count: usize) {
        let mut inner = self.inner.write().unwrap();
        inner.skills_loaded += count;
    }

    /// Raise the unrecoverable flag. The first message wins.
    pub fn set_fatal(&self, message: &str) {
        self.fatal_tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(message.to_string());
                true
            } else {
                false
            }
        });
    }

    /// Subscribe to the fatal flag.
    pub fn fatal_signal(&self) -> watch::Receiver<Option<String>> {
        self.fatal_tx.subscribe()
    }
}
