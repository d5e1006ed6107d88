//! Process-wide service context handed to the tool surface and HTTP layer.

use crate::config::ServiceConfig;
use crate::coordinator::Coordinator;
use crate::embeddings::EmbeddingProvider;
use crate::errors::{Result, ServiceError};
use crate::index::SkillIndex;
use crate::skill::SkillDocument;
use crate::state::LoadingState;
use std::sync::Arc;

/// Everything a tool handler needs, bundled so tests can construct their
/// own hermetic instance instead of reaching for globals.
pub struct ServiceContext {
    pub config: Arc<ServiceConfig>,
    pub index: Arc<SkillIndex>,
    pub coordinator: Arc<Coordinator>,
}

/// Result of resolving a `read_skill_document` request.
pub enum DocumentReading {
    /// A literal path matched exactly one document.
    Literal(SkillDocument),
    /// A glob pattern matched one or more documents, in bundle order.
    Glob { pattern: String, documents: Vec<SkillDocument> },
}

impl ServiceContext {
    pub fn new(config: ServiceConfig, embedder: Arc<dyn EmbeddingProvider>) -> Arc<Self> {
        let config = Arc::new(config);
        let index = Arc::new(SkillIndex::new(embedder));
        let coordinator = Coordinator::new(config.clone(), index.clone());
        Arc::new(Self { config, index, coordinator })
    }

    pub fn loading(&self) -> &Arc<LoadingState> {
        self.coordinator.loading()
    }

    /// Launch background ingestion.
    pub fn start(self: &Arc<Self>) {
        self.coordinator.start();
    }

    /// Resolve a document path against a skill's known document set.
    ///
    /// Paths are matched by membership, never against the filesystem, so
    /// traversal tokens cannot escape the bundle. A path containing glob
    /// metacharacters matches any number of documents; everything else is
    /// an exact lookup.
    pub async fn read_document(&self, skill_name: &str, document_path: &str) -> Result<DocumentReading> {
        let skill = self
            .index
            .get(skill_name)
            .await
            .ok_or_else(|| ServiceError::SkillNotFound(skill_name.to_string()))?;

        let not_found = || ServiceError::DocNotFound {
            skill: skill_name.to_string(),
            path: document_path.to_string(),
        };

        if is_glob(document_path) {
            let pattern = glob::Pattern::new(document_path).map_err(|_| not_found())?;
            let documents: Vec<SkillDocument> =
                skill.matching_documents(&pattern).into_iter().cloned().collect();
            if documents.is_empty() {
                return Err(not_found());
            }
            Ok(DocumentReading::Glob { pattern: document_path.to_string(), documents })
        } else {
            let document = skill.document(document_path).ok_or_else(not_found)?.clone();
            Ok(DocumentReading::Literal(document))
        }
    }
}

fn is_glob(path: &str) -> bool {
    path.contains(['*', '?', '['])
}
