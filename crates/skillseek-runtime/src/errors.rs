use thiserror::Error;

/// Error kinds surfaced by the retrieval service.
///
/// Per-skill and per-source failures are local: they are recorded in the
/// loading state and the service keeps serving whatever is indexed.
/// `Config` and `EmbedInit` are fatal at the binary boundary.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("source unavailable: {source_id}: {message}")]
    SourceUnavailable { source_id: String, message: String },

    #[error("source timed out after {seconds}s: {source_id}")]
    SourceTimeout { source_id: String, seconds: u64 },

    #[error("malformed manifest in {path}: {message}")]
    ManifestMalformed { path: String, message: String },

    #[error("embedding model could not be loaded: {0}")]
    EmbedInit(String),

    #[error("embedding failed: {0}")]
    EmbedFailed(String),

    #[error("skill not found: {0}")]
    SkillNotFound(String),

    #[error("document not found in skill '{skill}': {path}")]
    DocNotFound { skill: String, path: String },

    #[error("upload rejected: {0}")]
    UploadRejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    /// Stable machine-readable kind, used in tool error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Config(_) => "config-invalid",
            ServiceError::SourceUnavailable { .. } => "source-unavailable",
            ServiceError::SourceTimeout { .. } => "source-timeout",
            ServiceError::ManifestMalformed { .. } => "manifest-malformed",
            ServiceError::EmbedInit(_) => "embed-init-failed",
            ServiceError::EmbedFailed(_) => "embed-failed",
            ServiceError::SkillNotFound(_) => "skill-not-found",
            ServiceError::DocNotFound { .. } => "doc-not-found",
            ServiceError::UploadRejected(_) => "upload-rejected",
            ServiceError::Io(_) => "io-error",
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
