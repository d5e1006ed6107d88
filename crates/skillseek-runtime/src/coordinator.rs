//! Lifecycle coordination: staged startup ingestion, runtime uploads, and
//! the periodic refresh scheduler.
//!
//! The coordinator is the only component that mutates the search index.
//! Startup launches one worker per configured source so a slow clone never
//! delays the others; tool requests served before completion simply see a
//! partial index. Uploads and refresh replacements are serialized by a
//! dedicated lock so name collisions resolve deterministically.

use crate::config::ServiceConfig;
use crate::errors::{Result, ServiceError};
use crate::index::SkillIndex;
use crate::loader::SkillLoader;
use crate::skill::SkillScope;
use crate::sources::SkillSource;
use crate::state::LoadingState;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct Coordinator {
    config: Arc<ServiceConfig>,
    index: Arc<SkillIndex>,
    loading: Arc<LoadingState>,
    loader: SkillLoader,
    sources: Vec<SkillSource>,
    upload_lock: tokio::sync::Mutex<()>,
    upload_seq: AtomicU64,
    cancel: CancellationToken,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Coordinator {
    pub fn new(config: Arc<ServiceConfig>, index: Arc<SkillIndex>) -> Arc<Self> {
        let sources: Vec<SkillSource> = config
            .skill_sources
            .iter()
            .map(|s| SkillSource::new(s.clone(), config.cache_dir.clone()))
            .collect();
        Arc::new(Self {
            loading: Arc::new(LoadingState::new(sources.len())),
            loader: SkillLoader::new(config.clone()),
            sources,
            config,
            index,
            upload_lock: tokio::sync::Mutex::new(()),
            upload_seq: AtomicU64::new(0),
            cancel: CancellationToken::new(),
            workers: std::sync::Mutex::new(Vec::new()),
        })
    }

    pub fn loading(&self) -> &Arc<LoadingState> {
        &self.loading
    }

    pub fn index(&self) -> &Arc<SkillIndex> {
        &self.index
    }

    /// Launch one ingestion worker per source plus, when enabled, the
    /// refresh scheduler. Returns immediately; progress is observable via
    /// the loading state.
    pub fn start(self: &Arc<Self>) {
        let mut workers = self.workers.lock().unwrap();
        for source in self.sources.clone() {
            let this = self.clone();
            workers.push(tokio::spawn(async move {
                this.ingest_source(source).await;
            }));
        }
        if self.config.auto_update_enabled {
            let this = self.clone();
            workers.push(tokio::spawn(async move {
                this.run_scheduler().await;
            }));
        }
    }

    /// Signal the scheduler and wait for in-flight workers to finish.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock().unwrap());
        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn ingest_source(&self, source: SkillSource) {
        let source_id = source.identifier();
        info!(source = %source_id, "ingesting skill source");
        let dir = match self.acquire_with_timeout(&source).await {
            Ok(dir) => dir,
            Err(e) => {
                warn!(source = %source_id, error = %e, "source ingestion failed");
                self.loading.record_error(&source_id, &e.to_string());
                self.loading.record_source_done(0);
                return;
            }
        };

        let scope = source.config.scope();
        let tenant = source.config.tenant_id().to_string();
        match self.loader.load_dir(&dir, &source_id, scope, &tenant) {
            Ok(skills) => match self.index.add_skills(skills).await {
                Ok(_) => {
                    let count = self.index.len().await;
                    info!(source = %source_id, total = count, "source indexed");
                    self.loading.record_source_done(count_for(&self.index, &source_id).await);
                }
                Err(e) => {
                    if matches!(e, ServiceError::EmbedInit(_)) {
                        self.loading.set_fatal(&e.to_string());
                    }
                    self.loading.record_error(&source_id, &e.to_string());
                    self.loading.record_source_done(0);
                }
            },
            Err(e) => {
                self.loading.record_error(&source_id, &e.to_string());
                self.loading.record_source_done(0);
            }
        }
    }

    async fn acquire_with_timeout(&self, source: &SkillSource) -> Result<PathBuf> {
        let seconds = self.config.source_timeout_seconds;
        let src = source.clone();
        let acquired = tokio::time::timeout(
            Duration::from_secs(seconds),
            tokio::task::spawn_blocking(move || src.acquire()),
        )
        .await;
        match acquired {
            Err(_) => Err(ServiceError::SourceTimeout { source_id: source.identifier(), seconds }),
            Ok(Err(join)) => Err(ServiceError::SourceUnavailable {
                source_id: source.identifier(),
                message: join.to_string(),
            }),
            Ok(Ok(result)) => result,
        }
    }

    /// Unpack an uploaded zip archive, load its skill roots, and add them to
    /// the index. Nothing is mutated on failure; concurrent uploads are
    /// serialized. Returns the names of the added skills.
    pub async fn upload_archive(
        &self,
        archive: Vec<u8>,
        tenant_id: Option<String>,
        scope: Option<SkillScope>,
    ) -> Result<Vec<String>> {
        let tenant = tenant_id.unwrap_or_default();
        let scope = scope.unwrap_or(if tenant.is_empty() { SkillScope::Global } else { SkillScope::Tenant });
        if scope == SkillScope::Tenant && tenant.is_empty() {
            return Err(ServiceError::UploadRejected(
                "tenant scope requires a non-empty tenant_id".to_string(),
            ));
        }
        if scope == SkillScope::Global && !tenant.is_empty() {
            return Err(ServiceError::UploadRejected(
                "global scope cannot carry a tenant_id".to_string(),
            ));
        }

        let _guard = self.upload_lock.lock().await;

        let seq = self.upload_seq.fetch_add(1, Ordering::Relaxed);
        let stamp = format!("{}-{}", chrono::Utc::now().timestamp_millis(), seq);
        let source_id = format!("upload:{stamp}");
        let staging = self.config.cache_dir.join("uploads").join(format!("upload-{stamp}"));

        let result = self.unpack_and_index(&archive, &staging, &source_id, scope, &tenant).await;
        if result.is_err() {
            let _ = std::fs::remove_dir_all(&staging);
        }
        result
    }

    async fn unpack_and_index(
        &self,
        archive: &[u8],
        staging: &Path,
        source_id: &str,
        scope: SkillScope,
        tenant: &str,
    ) -> Result<Vec<String>> {
        std::fs::create_dir_all(staging)?;
        let mut zip = zip::ZipArchive::new(Cursor::new(archive))
            .map_err(|e| ServiceError::UploadRejected(format!("not a zip archive: {e}")))?;
        zip.extract(staging)
            .map_err(|e| ServiceError::UploadRejected(format!("archive extraction failed: {e}")))?;

        let skills = self.loader.load_dir(staging, source_id, scope, tenant)?;
        if skills.is_empty() {
            return Err(ServiceError::UploadRejected(
                "archive contains no valid skill bundles".to_string(),
            ));
        }
        let names: Vec<String> = skills.iter().map(|s| s.name.clone()).collect();
        self.index.add_skills(skills).await?;
        self.loading.record_extra_skills(names.len());
        info!(source = %source_id, skills = ?names, "upload indexed");
        Ok(names)
    }

    async fn run_scheduler(&self) {
        let period = Duration::from_secs(self.config.update_interval_seconds);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await; // the first tick completes immediately
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("refresh scheduler stopped");
                    return;
                }
                _ = interval.tick() => {
                    self.refresh_sources().await;
                }
            }
        }
    }

    /// One refresh pass: for every git source whose ref advanced, reload it
    /// and swap its skills in the index. Other sources are untouched.
    pub async fn refresh_sources(&self) {
        for source in &self.sources {
            let source_id = source.identifier();
            let probe = source.clone();
            let advanced = tokio::task::spawn_blocking(move || probe.has_advanced()).await;
            let advanced = match advanced {
                Ok(Ok(advanced)) => advanced,
                Ok(Err(e)) => {
                    warn!(source = %source_id, error = %e, "refresh probe failed");
                    self.loading.record_error(&source_id, &e.to_string());
                    continue;
                }
                Err(join) => {
                    warn!(source = %source_id, error = %join, "refresh probe panicked");
                    continue;
                }
            };
            if !advanced {
                continue;
            }
            if let Err(e) = self.reload_source(source).await {
                warn!(source = %source_id, error = %e, "source refresh failed");
                self.loading.record_error(&source_id, &e.to_string());
            }
        }
    }

    async fn reload_source(&self, source: &SkillSource) -> Result<()> {
        let source_id = source.identifier();
        let dir = self.acquire_with_timeout(source).await?;
        let scope = source.config.scope();
        let tenant = source.config.tenant_id().to_string();
        let skills = self.loader.load_dir(&dir, &source_id, scope, &tenant)?;

        // Removal precedes addition, under the same lock uploads take, so a
        // replaced skill is never present twice.
        let _guard = self.upload_lock.lock().await;
        if !self.config.refresh_retains_missing {
            self.index.remove_source(&source_id).await;
        }
        let added = skills.len();
        self.index.add_skills(skills).await?;
        info!(source = %source_id, skills = added, "source refreshed");
        Ok(())
    }
}

/// Number of indexed skills currently attributed to a source.
async fn count_for(index: &SkillIndex, source_id: &str) -> usize {
    index.list().await.iter().filter(|s| s.source == source_id).count()
}
