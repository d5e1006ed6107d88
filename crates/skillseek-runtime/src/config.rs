//! Service configuration, loaded from a JSON file.
//!
//! Every field has a default so a bare `{}` is a valid configuration; with
//! no file at all the built-in defaults index the public Anthropic skills
//! repository.

use crate::errors::{Result, ServiceError};
use crate::skill::SkillScope;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One ingestion origin plus its scope/tenant defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    Git {
        url: String,
        /// Branch, tag, or commit; `None` means the default branch.
        #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
        git_ref: Option<String>,
        /// Subdirectory of the repository holding the skill roots.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subdir: Option<String>,
        #[serde(default)]
        scope: SkillScope,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        tenant_id: String,
    },
    Local {
        path: PathBuf,
        #[serde(default)]
        scope: SkillScope,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        tenant_id: String,
    },
}

impl SourceConfig {
    /// Opaque identifier stamped onto every skill loaded from this source.
    pub fn identifier(&self) -> String {
        match self {
            SourceConfig::Git { url, git_ref, subdir, .. } => {
                let mut id = url.clone();
                if let Some(r) = git_ref {
                    id.push('@');
                    id.push_str(r);
                }
                if let Some(s) = subdir {
                    id.push('/');
                    id.push_str(s.trim_matches('/'));
                }
                id
            }
            SourceConfig::Local { path, .. } => path.display().to_string(),
        }
    }

    pub fn scope(&self) -> SkillScope {
        match self {
            SourceConfig::Git { scope, .. } | SourceConfig::Local { scope, .. } => *scope,
        }
    }

    pub fn tenant_id(&self) -> &str {
        match self {
            SourceConfig::Git { tenant_id, .. } | SourceConfig::Local { tenant_id, .. } => tenant_id,
        }
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub skill_sources: Vec<SourceConfig>,
    /// Identifier handed to the embedding provider.
    pub embedding_model: String,
    pub default_top_k: usize,
    pub auto_update_enabled: bool,
    pub update_interval_seconds: u64,
    /// When false only the manifest is kept per skill.
    pub load_skill_documents: bool,
    pub text_file_extensions: Vec<String>,
    pub allowed_image_extensions: Vec<String>,
    pub max_image_size_bytes: u64,
    /// Per-source fetch timeout.
    pub source_timeout_seconds: u64,
    /// Cache directory for cloned git sources.
    pub cache_dir: PathBuf,
    /// When true, a refresh keeps skills the refreshed source no longer
    /// provides instead of dropping them.
    pub refresh_retains_missing: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            skill_sources: vec![SourceConfig::Git {
                url: "https://github.com/anthropics/skills".to_string(),
                git_ref: None,
                subdir: None,
                scope: SkillScope::Global,
                tenant_id: String::new(),
            }],
            embedding_model: "all-minilm".to_string(),
            default_top_k: 3,
            auto_update_enabled: false,
            update_interval_seconds: 3600,
            load_skill_documents: true,
            text_file_extensions: default_text_extensions(),
            allowed_image_extensions: default_image_extensions(),
            max_image_size_bytes: 5 * 1024 * 1024,
            source_timeout_seconds: 300,
            cache_dir: default_cache_dir(),
            refresh_retains_missing: false,
        }
    }
}

fn default_text_extensions() -> Vec<String> {
    [
        ".md", ".txt", ".py", ".js", ".ts", ".json", ".yaml", ".yml", ".toml", ".sh", ".csv",
        ".html", ".css", ".xml",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_image_extensions() -> Vec<String> {
    [".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", ".bmp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_cache_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".skillseek").join("sources")
}

impl ServiceConfig {
    /// Read and validate a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ServiceError::Config(format!("{}: {}", path.display(), e)))?;
        let config: ServiceConfig = serde_json::from_str(&raw)
            .map_err(|e| ServiceError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks that must hold before the service starts.
    pub fn validate(&self) -> Result<()> {
        for source in &self.skill_sources {
            match source {
                SourceConfig::Git { url, .. } if url.trim().is_empty() => {
                    return Err(ServiceError::Config("git source with empty url".to_string()));
                }
                SourceConfig::Local { path, .. } if path.as_os_str().is_empty() => {
                    return Err(ServiceError::Config("local source with empty path".to_string()));
                }
                _ => {}
            }
            if source.scope() == SkillScope::Tenant && source.tenant_id().is_empty() {
                return Err(ServiceError::Config(format!(
                    "source {} is tenant-scoped but has no tenant_id",
                    source.identifier()
                )));
            }
            if source.scope() == SkillScope::Global && !source.tenant_id().is_empty() {
                return Err(ServiceError::Config(format!(
                    "source {} is global but carries tenant_id '{}'",
                    source.identifier(),
                    source.tenant_id()
                )));
            }
        }
        if self.default_top_k == 0 {
            return Err(ServiceError::Config("default_top_k must be at least 1".to_string()));
        }
        if self.update_interval_seconds == 0 {
            return Err(ServiceError::Config("update_interval_seconds must be nonzero".to_string()));
        }
        Ok(())
    }

    /// Whether a file extension (with leading dot, lowercase) is text.
    pub fn is_text_extension(&self, ext: &str) -> bool {
        self.text_file_extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }

    /// Whether a file extension (with leading dot, lowercase) is an image.
    pub fn is_image_extension(&self, ext: &str) -> bool {
        self.allowed_image_extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_object_is_a_valid_config() {
        let config: ServiceConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.default_top_k, 3);
        assert_eq!(config.update_interval_seconds, 3600);
        assert!(config.load_skill_documents);
        assert!(config.is_text_extension(".md"));
        assert!(config.is_image_extension(".PNG"));
    }

    #[test]
    fn parses_git_and_local_sources() {
        let raw = r#"{
            "skill_sources": [
                {"type": "git", "url": "https://github.com/acme/skills", "ref": "v1", "subdir": "bundles"},
                {"type": "local", "path": "/srv/skills", "scope": "tenant", "tenant_id": "acme"}
            ],
            "auto_update_enabled": true
        }"#;
        let config: ServiceConfig = serde_json::from_str(raw).unwrap();
        config.validate().unwrap();
        assert_eq!(config.skill_sources.len(), 2);
        assert_eq!(
            config.skill_sources[0].identifier(),
            "https://github.com/acme/skills@v1/bundles"
        );
        assert_eq!(config.skill_sources[1].identifier(), "/srv/skills");
        assert_eq!(config.skill_sources[1].tenant_id(), "acme");
    }

    #[test]
    fn tenant_source_without_tenant_id_is_rejected() {
        let raw = r#"{"skill_sources": [{"type": "local", "path": "/srv/x", "scope": "tenant"}]}"#;
        let config: ServiceConfig = serde_json::from_str(raw).unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), "config-invalid");
    }

    #[test]
    fn load_reports_malformed_json_as_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();
        let err = ServiceConfig::load(file.path()).unwrap_err();
        assert_eq!(err.kind(), "config-invalid");
    }
}
