//! The immutable skill value published to the search index.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Visibility class of a skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SkillScope {
    /// Visible to every caller.
    #[default]
    Global,
    /// Visible only to the owning tenant, and only when explicitly allowed.
    Tenant,
}

impl std::fmt::Display for SkillScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkillScope::Global => write!(f, "global"),
            SkillScope::Tenant => write!(f, "tenant"),
        }
    }
}

/// Classification of a document inside a skill bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    Text,
    Image,
    BinaryOther,
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentKind::Text => write!(f, "text"),
            DocumentKind::Image => write!(f, "image"),
            DocumentKind::BinaryOther => write!(f, "binary-other"),
        }
    }
}

/// One file inside a skill bundle.
///
/// Text documents carry their contents inline; image and binary documents
/// carry a filesystem locator that can be resolved lazily.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillDocument {
    /// Path relative to the skill root, `/`-separated.
    pub path: String,
    pub kind: DocumentKind,
    pub size: u64,
    /// Inline contents for `Text` documents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// On-disk location for `Image`/`BinaryOther` documents.
    #[serde(skip)]
    pub locator: Option<PathBuf>,
}

/// A named bundle of instructions and supporting files, selected by agents
/// via semantic search over its description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    /// Unique identifier; inserting the same name again replaces the skill.
    pub name: String,
    /// Free text used as the semantic key for retrieval.
    pub description: String,
    /// Opaque origin identifier (repository URL + path, or local path).
    pub source: String,
    pub scope: SkillScope,
    /// Non-empty iff `scope == Tenant`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tenant_id: String,
    /// Manifest body after the front-matter block.
    pub instructions: String,
    /// All files in the bundle. The manifest is always `documents[0]`.
    pub documents: Vec<SkillDocument>,
}

impl Skill {
    /// The bundle's manifest file.
    pub fn primary_document(&self) -> &SkillDocument {
        &self.documents[0]
    }

    /// Whether a query with the given tenant and allow-list may see this
    /// skill. Tenant skills need a matching tenant AND an explicit entry in
    /// the allow-list; an empty allow-list hides every tenant skill.
    pub fn visible_to(&self, tenant_id: Option<&str>, allowed: &[String]) -> bool {
        match self.scope {
            SkillScope::Global => true,
            SkillScope::Tenant => {
                tenant_id == Some(self.tenant_id.as_str())
                    && allowed.iter().any(|n| n == &self.name)
            }
        }
    }

    /// Look up a document by exact relative path.
    pub fn document(&self, path: &str) -> Option<&SkillDocument> {
        self.documents.iter().find(|d| d.path == path)
    }

    /// All documents whose path matches a glob pattern, in bundle order.
    pub fn matching_documents(&self, pattern: &glob::Pattern) -> Vec<&SkillDocument> {
        self.documents.iter().filter(|d| pattern.matches(&d.path)).collect()
    }
}

/// Listing row for one indexed skill, exposed by the `list_skills` tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillSummary {
    pub name: String,
    pub description: String,
    pub source: String,
    pub scope: SkillScope,
    pub document_count: usize,
}

impl From<&Skill> for SkillSummary {
    fn from(skill: &Skill) -> Self {
        Self {
            name: skill.name.clone(),
            description: skill.description.clone(),
            source: skill.source.clone(),
            scope: skill.scope,
            document_count: skill.documents.len(),
        }
    }
}
