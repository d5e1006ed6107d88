//! Parses skill bundles into [`Skill`] values.
//!
//! A bundle is a directory with a `SKILL.md` manifest (YAML front-matter
//! followed by markdown instructions) and arbitrary sibling files, which
//! become the skill's documents.

use crate::config::ServiceConfig;
use crate::errors::{Result, ServiceError};
use crate::skill::{DocumentKind, Skill, SkillDocument, SkillScope};
use crate::sources::{candidate_skill_roots, MANIFEST_FILE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// YAML front-matter of a skill manifest. Keys beyond `name` and
/// `description` are carried opaquely.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ManifestFrontmatter {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_yaml::Value>,
}

/// Split a manifest into front-matter and body.
///
/// The front-matter block is delimited by `---` lines at the very start of
/// the file; `name` and `description` must both be present and non-empty.
pub fn parse_manifest(raw: &str, manifest_path: &Path) -> Result<(ManifestFrontmatter, String)> {
    let malformed = |message: String| ServiceError::ManifestMalformed {
        path: manifest_path.display().to_string(),
        message,
    };

    let trimmed = raw.trim_start_matches('\u{feff}');
    if !trimmed.starts_with("---") {
        return Err(malformed("missing front-matter block".to_string()));
    }
    let rest = &trimmed[3..];
    let end = rest
        .find("\n---")
        .ok_or_else(|| malformed("front-matter block is not closed".to_string()))?;
    let yaml = rest[..end].trim();
    // Skip the opening fence, the block, and the "\n---" closing fence.
    let body_start = 3 + end + 4;
    let body = if body_start < trimmed.len() {
        trimmed[body_start..].trim().to_string()
    } else {
        String::new()
    };

    let frontmatter: ManifestFrontmatter =
        serde_yaml::from_str(yaml).map_err(|e| malformed(e.to_string()))?;
    if frontmatter.name.trim().is_empty() {
        return Err(malformed("front-matter has no 'name'".to_string()));
    }
    if frontmatter.description.trim().is_empty() {
        return Err(malformed("front-matter has no 'description'".to_string()));
    }
    Ok((frontmatter, body))
}

/// Loads skill bundles from acquired source directories.
#[derive(Clone)]
pub struct SkillLoader {
    config: Arc<ServiceConfig>,
}

impl SkillLoader {
    pub fn new(config: Arc<ServiceConfig>) -> Self {
        Self { config }
    }

    /// Load every candidate skill root under `dir`.
    ///
    /// Malformed bundles are skipped with a warning; duplicate names within
    /// the batch resolve last-wins.
    pub fn load_dir(
        &self,
        dir: &Path,
        source_id: &str,
        scope: SkillScope,
        tenant_id: &str,
    ) -> Result<Vec<Skill>> {
        let roots = candidate_skill_roots(dir)?;
        let mut by_name: Vec<Skill> = Vec::new();
        for root in roots {
            match self.load_root(&root, source_id, scope, tenant_id) {
                Ok(skill) => {
                    if let Some(prior) = by_name.iter().position(|s| s.name == skill.name) {
                        warn!(name = %skill.name, "duplicate skill name in batch, later bundle wins");
                        by_name.remove(prior);
                    }
                    by_name.push(skill);
                }
                Err(e) => warn!(root = %root.display(), error = %e, "skipping skill bundle"),
            }
        }
        debug!(source = source_id, count = by_name.len(), "loaded skills from source");
        Ok(by_name)
    }

    /// Parse one bundle directory into a skill.
    pub fn load_root(
        &self,
        root: &Path,
        source_id: &str,
        scope: SkillScope,
        tenant_id: &str,
    ) -> Result<Skill> {
        let manifest_path = root.join(MANIFEST_FILE);
        let raw = std::fs::read_to_string(&manifest_path)?;
        let (frontmatter, body) = parse_manifest(&raw, &manifest_path)?;

        let mut documents = vec![SkillDocument {
            path: MANIFEST_FILE.to_string(),
            kind: DocumentKind::Text,
            size: raw.len() as u64,
            content: Some(raw),
            locator: Some(manifest_path),
        }];
        if self.config.load_skill_documents {
            documents.extend(self.walk_documents(root));
        }

        Ok(Skill {
            name: frontmatter.name.trim().to_string(),
            description: frontmatter.description.trim().to_string(),
            source: source_id.to_string(),
            scope,
            tenant_id: tenant_id.to_string(),
            instructions: body,
            documents,
        })
    }

    /// Depth-first deterministic walk over the bundle, classifying each file.
    fn walk_documents(&self, root: &Path) -> Vec<SkillDocument> {
        let mut documents = Vec::new();
        let walker = WalkDir::new(root).sort_by_file_name().into_iter();
        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else { continue };
            let rel_path: String = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if rel_path == MANIFEST_FILE {
                continue;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            match self.classify(entry.path()) {
                DocumentKind::Text => match std::fs::read(entry.path()) {
                    Ok(bytes) => match String::from_utf8(bytes) {
                        Ok(text) => documents.push(SkillDocument {
                            path: rel_path,
                            kind: DocumentKind::Text,
                            size,
                            content: Some(text),
                            locator: Some(entry.path().to_path_buf()),
                        }),
                        Err(_) => {
                            debug!(path = %rel_path, "not valid UTF-8, treating as binary");
                            documents.push(SkillDocument {
                                path: rel_path,
                                kind: DocumentKind::BinaryOther,
                                size,
                                content: None,
                                locator: Some(entry.path().to_path_buf()),
                            });
                        }
                    },
                    Err(e) => warn!(path = %rel_path, error = %e, "unreadable document skipped"),
                },
                DocumentKind::Image => {
                    if size > self.config.max_image_size_bytes {
                        warn!(
                            path = %rel_path,
                            size,
                            limit = self.config.max_image_size_bytes,
                            "image exceeds size limit, skipped"
                        );
                        continue;
                    }
                    documents.push(SkillDocument {
                        path: rel_path,
                        kind: DocumentKind::Image,
                        size,
                        content: None,
                        locator: Some(entry.path().to_path_buf()),
                    });
                }
                DocumentKind::BinaryOther => documents.push(SkillDocument {
                    path: rel_path,
                    kind: DocumentKind::BinaryOther,
                    size,
                    content: None,
                    locator: Some(entry.path().to_path_buf()),
                }),
            }
        }
        documents
    }

    fn classify(&self, path: &Path) -> DocumentKind {
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        if self.config.is_text_extension(&ext) {
            DocumentKind::Text
        } else if self.config.is_image_extension(&ext) {
            DocumentKind::Image
        } else {
            DocumentKind::BinaryOther
        }
    }
}
