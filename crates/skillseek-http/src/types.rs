//! Wire types for the HTTP endpoints.

use serde::{Deserialize, Serialize};
use skillseek_runtime::SkillSummary;

/// Response of `POST /skills/upload`.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    /// `"ok"` or `"error"`.
    pub status: String,
    #[serde(default)]
    pub skills_added: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl UploadResponse {
    pub fn ok(skills_added: Vec<String>) -> Self {
        Self { status: "ok".to_string(), skills_added, errors: Vec::new() }
    }

    pub fn error(message: String) -> Self {
        Self { status: "error".to_string(), skills_added: Vec::new(), errors: vec![message] }
    }
}

/// Response of `GET /skills`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SkillListResponse {
    pub skills: Vec<SkillSummary>,
    pub loading_in_progress: bool,
}
