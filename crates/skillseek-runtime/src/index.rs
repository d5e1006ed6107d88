//! In-memory vector index over skill descriptions.
//!
//! One lock guards the skill sequence and the embedding matrix together, so
//! every reader observes row `i` of the matrix belonging to skill `i`.
//! Embedding batches run before the lock is taken: a failed embed leaves the
//! index untouched, and `list`/`get` stay responsive while the model warms
//! up.

use crate::embeddings::EmbeddingProvider;
use crate::errors::Result;
use crate::skill::{Skill, SkillSummary};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// One search result: a skill snapshot plus its raw cosine similarity.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub skill: Skill,
    pub relevance_score: f32,
}

#[derive(Default)]
struct IndexState {
    skills: Vec<Skill>,
    /// L2-normalized rows, one per skill, same order.
    embeddings: Vec<Vec<f32>>,
}

/// Thread-safe mapping of skills to embedding rows with scope-filtered
/// top-k retrieval.
pub struct SkillIndex {
    state: Mutex<IndexState>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl SkillIndex {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { state: Mutex::new(IndexState::default()), embedder }
    }

    /// Replace the whole index with a freshly embedded batch.
    pub async fn index_skills(&self, skills: Vec<Skill>) -> Result<()> {
        let rows = self.embed_descriptions(&skills).await?;
        let mut state = self.state.lock().await;
        state.skills = skills;
        state.embeddings = rows;
        info!(count = state.skills.len(), "index rebuilt");
        Ok(())
    }

    /// Append a batch, replacing any existing skill with a colliding name.
    /// Returns the number of skills added.
    pub async fn add_skills(&self, skills: Vec<Skill>) -> Result<usize> {
        if skills.is_empty() {
            return Ok(0);
        }
        let rows = self.embed_descriptions(&skills).await?;
        let mut state = self.state.lock().await;
        for (skill, row) in skills.into_iter().zip(rows) {
            if let Some(existing) = state.skills.iter().position(|s| s.name == skill.name) {
                debug!(name = %skill.name, "replacing existing skill");
                state.skills.remove(existing);
                state.embeddings.remove(existing);
            }
            state.skills.push(skill);
            state.embeddings.push(row);
        }
        let total = state.skills.len();
        debug!(total, "index grown");
        Ok(total)
    }

    /// Drop every skill loaded from the given source. Returns the number of
    /// removed entries.
    pub async fn remove_source(&self, source_id: &str) -> usize {
        let mut state = self.state.lock().await;
        let mut removed = 0;
        let mut i = 0;
        while i < state.skills.len() {
            if state.skills[i].source == source_id {
                state.skills.remove(i);
                state.embeddings.remove(i);
                removed += 1;
            } else {
                i += 1;
            }
        }
        if removed > 0 {
            info!(source = source_id, removed, "dropped skills from refreshed source");
        }
        removed
    }

    /// Scope-filtered top-k similarity search.
    ///
    /// Tenant skills surface only for a matching `tenant_id` AND an explicit
    /// entry in `allowed`; with an empty allow-list only global skills are
    /// candidates. Scores are raw cosine similarities; ties break toward the
    /// earlier insertion index.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        tenant_id: Option<&str>,
        allowed: &[String],
    ) -> Result<Vec<SearchHit>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let query_row = {
            let mut rows = self.embedder.embed(vec![query.to_string()]).await?;
            let mut row = rows.pop().unwrap_or_default();
            l2_normalize(&mut row);
            row
        };

        let state = self.state.lock().await;
        let candidates: Vec<usize> = state
            .skills
            .iter()
            .enumerate()
            .filter(|(_, s)| s.visible_to(tenant_id, allowed))
            .map(|(i, _)| i)
            .collect();
        if candidates.is_empty() {
            debug!(tenant = ?tenant_id, allowed = allowed.len(), "no skills match scope filter");
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = candidates
            .into_iter()
            .map(|i| (i, dot(&query_row, &state.embeddings[i])))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0))
        });
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| SearchHit { skill: state.skills[i].clone(), relevance_score: score })
            .collect())
    }

    /// Snapshot of every indexed skill, in insertion order, unfiltered.
    pub async fn list(&self) -> Vec<SkillSummary> {
        let state = self.state.lock().await;
        state.skills.iter().map(SkillSummary::from).collect()
    }

    /// Full snapshot of one skill by name.
    pub async fn get(&self, name: &str) -> Option<Skill> {
        let state = self.state.lock().await;
        state.skills.iter().find(|s| s.name == name).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.skills.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Row count of the embedding matrix; equals `len()` by invariant.
    pub async fn embedding_rows(&self) -> usize {
        self.state.lock().await.embeddings.len()
    }

    async fn embed_descriptions(&self, skills: &[Skill]) -> Result<Vec<Vec<f32>>> {
        let descriptions: Vec<String> = skills.iter().map(|s| s.description.clone()).collect();
        let mut rows = self.embedder.embed(descriptions).await?;
        for row in &mut rows {
            l2_normalize(row);
        }
        Ok(rows)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Normalize in place; the zero vector is left as-is.
fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
