//! MCP server implementation - exposes the skill retrieval tools to agents.

use anyhow::Result;
use futures::FutureExt;
use rmcp::{
    handler::server::{
        router::{tool::ToolRoute, Router},
        tool::ToolCallContext,
        ServerHandler,
    },
    model::{
        CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
        Tool,
    },
    transport::stdio,
    ErrorData as McpError, ServiceExt,
};
use schemars::JsonSchema;
use serde::Deserialize;
use skillseek_runtime::{
    DocumentKind, DocumentReading, LoadingSnapshot, SearchHit, ServiceContext, ServiceError,
    SkillSummary,
};
use std::borrow::Cow;
use std::sync::Arc;

/// Hard ceiling on `top_k`, whatever the caller asks for.
const MAX_TOP_K: usize = 20;

/// Request for the `find_helpful_skills` tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct FindHelpfulSkillsRequest {
    pub task_description: String,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub list_documents: bool,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub allowed_skill_names: Option<Vec<String>>,
}

/// Request for the `read_skill_document` tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadSkillDocumentRequest {
    pub skill_name: String,
    pub document_path: String,
}

/// MCP server backed by the shared service context.
#[derive(Clone)]
pub struct SkillsMcpServer {
    ctx: Arc<ServiceContext>,
}

impl SkillsMcpServer {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    async fn find_helpful_skills(&self, request: FindHelpfulSkillsRequest) -> Result<String, ServiceError> {
        let top_k = request
            .top_k
            .unwrap_or(self.ctx.config.default_top_k)
            .clamp(1, MAX_TOP_K);
        let allowed = request.allowed_skill_names.unwrap_or_default();
        let hits = self
            .ctx
            .index
            .search(&request.task_description, top_k, request.tenant_id.as_deref(), &allowed)
            .await?;
        Ok(format_search_hits(&request.task_description, &hits, request.list_documents))
    }

    async fn read_skill_document(&self, request: ReadSkillDocumentRequest) -> Result<String, ServiceError> {
        let reading = self.ctx.read_document(&request.skill_name, &request.document_path).await?;
        Ok(format_reading(&reading))
    }

    async fn list_skills(&self) -> String {
        let skills = self.ctx.index.list().await;
        let snapshot = self.ctx.loading().snapshot();
        format_listing(&skills, &snapshot)
    }

    /// Run the server over stdio. Blocks until the client disconnects.
    pub async fn run_stdio(ctx: Arc<ServiceContext>) -> Result<()> {
        tracing::info!("starting MCP server on stdio");
        build_router(ctx).serve(stdio()).await?.waiting().await?;
        Ok(())
    }
}

/// Router with the three retrieval tools registered. Shared by the stdio
/// and HTTP transports.
pub fn build_router(ctx: Arc<ServiceContext>) -> Router<SkillsMcpServer> {
    Router::new(SkillsMcpServer::new(ctx))
        .with_tool(find_helpful_skills_route())
        .with_tool(read_skill_document_route())
        .with_tool(list_skills_route())
}

impl ServerHandler for SkillsMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "skillseek - semantic retrieval over a curated skill library. \
                 Describe your task to `find_helpful_skills`, then fetch supporting \
                 files with `read_skill_document`. `list_skills` shows the full inventory."
                    .to_string(),
            ),
        }
    }
}

fn tool_error(e: &ServiceError) -> CallToolResult {
    CallToolResult::error(vec![Content::text(format!("{}: {}", e.kind(), e))])
}

fn find_helpful_skills_route() -> ToolRoute<SkillsMcpServer> {
    let schema: serde_json::Map<String, serde_json::Value> = serde_json::from_value(serde_json::json!({
        "type": "object",
        "properties": {
            "task_description": {
                "type": "string",
                "description": "Natural language description of the task you need help with"
            },
            "top_k": {
                "type": "integer",
                "description": "Number of skills to return (default: 3, clamped to 1-20)",
                "minimum": 1,
                "maximum": 20
            },
            "list_documents": {
                "type": "boolean",
                "description": "Include each result's document path list"
            },
            "tenant_id": {
                "type": "string",
                "description": "Tenant identifier for tenant-scoped skills"
            },
            "allowed_skill_names": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Explicit allow-list; tenant-scoped skills surface only when named here"
            }
        },
        "required": ["task_description"]
    }))
    .unwrap();

    let tool = Tool {
        name: Cow::Borrowed("find_helpful_skills"),
        title: None,
        description: Some(Cow::Borrowed(
            "Find the skills most likely to help with a task, ranked by semantic \
             similarity between the task description and each skill's description.",
        )),
        input_schema: Arc::new(schema),
        output_schema: None,
        annotations: None,
        icons: None,
        meta: None,
    };

    ToolRoute::new_dyn(tool, |ctx: ToolCallContext<'_, SkillsMcpServer>| {
        async move {
            let args = ctx.arguments.clone().unwrap_or_default();
            let request: FindHelpfulSkillsRequest =
                serde_json::from_value(serde_json::Value::Object(args))
                    .map_err(|e| McpError::invalid_params(format!("invalid parameters: {e}"), None))?;
            match ctx.service.find_helpful_skills(request).await {
                Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
                Err(e) => Ok(tool_error(&e)),
            }
        }
        .boxed()
    })
}

fn read_skill_document_route() -> ToolRoute<SkillsMcpServer> {
    let schema: serde_json::Map<String, serde_json::Value> = serde_json::from_value(serde_json::json!({
        "type": "object",
        "properties": {
            "skill_name": {
                "type": "string",
                "description": "Name of an indexed skill (as returned by find_helpful_skills)"
            },
            "document_path": {
                "type": "string",
                "description": "Relative path within the skill, or a glob such as 'scripts/*.py'"
            }
        },
        "required": ["skill_name", "document_path"]
    }))
    .unwrap();

    let tool = Tool {
        name: Cow::Borrowed("read_skill_document"),
        title: None,
        description: Some(Cow::Borrowed(
            "Read a document from a skill bundle by relative path. A glob pattern \
             returns every matching text document, concatenated with separators; \
             binary matches are listed but not inlined.",
        )),
        input_schema: Arc::new(schema),
        output_schema: None,
        annotations: None,
        icons: None,
        meta: None,
    };

    ToolRoute::new_dyn(tool, |ctx: ToolCallContext<'_, SkillsMcpServer>| {
        async move {
            let args = ctx.arguments.clone().unwrap_or_default();
            let request: ReadSkillDocumentRequest =
                serde_json::from_value(serde_json::Value::Object(args))
                    .map_err(|e| McpError::invalid_params(format!("invalid parameters: {e}"), None))?;
            match ctx.service.read_skill_document(request).await {
                Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
                Err(e) => Ok(tool_error(&e)),
            }
        }
        .boxed()
    })
}

fn list_skills_route() -> ToolRoute<SkillsMcpServer> {
    let schema: serde_json::Map<String, serde_json::Value> =
        serde_json::from_value(serde_json::json!({"type": "object", "properties": {}})).unwrap();

    let tool = Tool {
        name: Cow::Borrowed("list_skills"),
        title: None,
        description: Some(Cow::Borrowed(
            "List every indexed skill with its description, source, scope, and \
             document count. Also reports whether ingestion is still in progress.",
        )),
        input_schema: Arc::new(schema),
        output_schema: None,
        annotations: None,
        icons: None,
        meta: None,
    };

    ToolRoute::new_dyn(tool, |ctx: ToolCallContext<'_, SkillsMcpServer>| {
        async move {
            let text = ctx.service.list_skills().await;
            Ok(CallToolResult::success(vec![Content::text(text)]))
        }
        .boxed()
    })
}

// --- Text rendering ---

fn format_search_hits(query: &str, hits: &[SearchHit], list_documents: bool) -> String {
    if hits.is_empty() {
        return format!("No skills matched \"{query}\".");
    }
    let mut out = format!("Found {} skill(s) for \"{query}\":\n", hits.len());
    for (rank, hit) in hits.iter().enumerate() {
        out.push_str(&format!(
            "\n{}. {} (relevance: {:.4})\n   {}\n   source: {} | scope: {}\n",
            rank + 1,
            hit.skill.name,
            hit.relevance_score,
            hit.skill.description,
            hit.skill.source,
            hit.skill.scope,
        ));
        if list_documents {
            out.push_str("   documents:\n");
            for doc in &hit.skill.documents {
                out.push_str(&format!("     - {} ({}, {} bytes)\n", doc.path, doc.kind, doc.size));
            }
        }
    }
    out
}

fn format_reading(reading: &DocumentReading) -> String {
    match reading {
        DocumentReading::Literal(doc) => match (&doc.kind, &doc.content) {
            (DocumentKind::Text, Some(content)) => content.clone(),
            _ => format!("[{} document {} ({} bytes) - contents not inlined]", doc.kind, doc.path, doc.size),
        },
        DocumentReading::Glob { pattern, documents } => {
            let mut out = format!("{} document(s) match \"{pattern}\":\n", documents.len());
            for doc in documents {
                out.push_str(&format!("\n=== {} ===\n", doc.path));
                match (&doc.kind, &doc.content) {
                    (DocumentKind::Text, Some(content)) => {
                        out.push_str(content);
                        if !content.ends_with('\n') {
                            out.push('\n');
                        }
                    }
                    _ => out.push_str(&format!(
                        "[{} document, {} bytes - contents not inlined]\n",
                        doc.kind, doc.size
                    )),
                }
            }
            out
        }
    }
}

fn format_listing(skills: &[SkillSummary], snapshot: &LoadingSnapshot) -> String {
    let mut out = format!(
        "{} skill(s) indexed | loading_in_progress: {} ({}/{} sources done)\n",
        skills.len(),
        !snapshot.is_complete,
        snapshot.sources_done,
        snapshot.sources_total,
    );
    for skill in skills {
        out.push_str(&format!(
            "- {} [{}] ({} document(s)) - {}\n  source: {}\n",
            skill.name, skill.scope, skill.document_count, skill.description, skill.source,
        ));
    }
    if !snapshot.errors.is_empty() {
        out.push_str("\nload errors:\n");
        for error in &snapshot.errors {
            out.push_str(&format!("- {}: {}\n", error.source, error.message));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use skillseek_runtime::{
        EmbeddingProvider, ServiceConfig, Skill, SkillDocument, SkillScope,
    };

    struct ZeroEmbedder;

    #[async_trait]
    impl EmbeddingProvider for ZeroEmbedder {
        async fn embed(&self, texts: Vec<String>) -> skillseek_runtime::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0; 4]).collect())
        }

        fn model_id(&self) -> &str {
            "zero"
        }
    }

    fn doc(path: &str, kind: DocumentKind, content: Option<&str>) -> SkillDocument {
        SkillDocument {
            path: path.to_string(),
            kind,
            size: content.map(|c| c.len() as u64).unwrap_or(32),
            content: content.map(|c| c.to_string()),
            locator: None,
        }
    }

    fn doc_skill() -> Skill {
        Skill {
            name: "Doc".to_string(),
            description: "documentation bundle".to_string(),
            source: "test".to_string(),
            scope: SkillScope::Global,
            tenant_id: String::new(),
            instructions: String::new(),
            documents: vec![
                doc("SKILL.md", DocumentKind::Text, Some("manifest")),
                doc("scripts/a.py", DocumentKind::Text, Some("print('a')\n")),
                doc("scripts/b.py", DocumentKind::Text, Some("print('b')\n")),
                doc("model.onnx", DocumentKind::BinaryOther, None),
            ],
        }
    }

    async fn server_with_doc_skill() -> SkillsMcpServer {
        let mut config = ServiceConfig::default();
        config.skill_sources.clear();
        let ctx = ServiceContext::new(config, Arc::new(ZeroEmbedder));
        ctx.index.add_skills(vec![doc_skill()]).await.unwrap();
        SkillsMcpServer::new(ctx)
    }

    #[tokio::test]
    async fn glob_read_concatenates_with_separators() {
        let server = server_with_doc_skill().await;
        let text = server
            .read_skill_document(ReadSkillDocumentRequest {
                skill_name: "Doc".to_string(),
                document_path: "scripts/*.py".to_string(),
            })
            .await
            .unwrap();
        assert!(text.contains("=== scripts/a.py ==="));
        assert!(text.contains("print('a')"));
        assert!(text.contains("=== scripts/b.py ==="));
        assert!(text.contains("print('b')"));
        let a = text.find("scripts/a.py").unwrap();
        let b = text.find("scripts/b.py").unwrap();
        assert!(a < b);
    }

    #[tokio::test]
    async fn glob_lists_binary_documents_without_inlining() {
        let server = server_with_doc_skill().await;
        let text = server
            .read_skill_document(ReadSkillDocumentRequest {
                skill_name: "Doc".to_string(),
                document_path: "*.onnx".to_string(),
            })
            .await
            .unwrap();
        assert!(text.contains("model.onnx"));
        assert!(text.contains("not inlined"));
    }

    #[tokio::test]
    async fn literal_read_returns_raw_content() {
        let server = server_with_doc_skill().await;
        let text = server
            .read_skill_document(ReadSkillDocumentRequest {
                skill_name: "Doc".to_string(),
                document_path: "scripts/a.py".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(text, "print('a')\n");
    }

    #[tokio::test]
    async fn unknown_paths_surface_structured_kinds() {
        let server = server_with_doc_skill().await;
        let err = server
            .read_skill_document(ReadSkillDocumentRequest {
                skill_name: "Doc".to_string(),
                document_path: "nothing/*.rs".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "doc-not-found");

        let err = server
            .read_skill_document(ReadSkillDocumentRequest {
                skill_name: "Ghost".to_string(),
                document_path: "SKILL.md".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "skill-not-found");
    }

    #[tokio::test]
    async fn top_k_is_clamped_into_range() {
        let server = server_with_doc_skill().await;
        // A huge top_k is legal and simply capped.
        let text = server
            .find_helpful_skills(FindHelpfulSkillsRequest {
                task_description: "anything".to_string(),
                top_k: Some(1000),
                list_documents: false,
                tenant_id: None,
                allowed_skill_names: None,
            })
            .await
            .unwrap();
        assert!(text.contains("Doc"));
        // Zero is raised to one instead of returning nothing.
        let text = server
            .find_helpful_skills(FindHelpfulSkillsRequest {
                task_description: "anything".to_string(),
                top_k: Some(0),
                list_documents: false,
                tenant_id: None,
                allowed_skill_names: None,
            })
            .await
            .unwrap();
        assert!(text.contains("Doc"));
    }

    #[tokio::test]
    async fn listing_reports_loading_flag() {
        let server = server_with_doc_skill().await;
        let text = server.list_skills().await;
        // No sources configured, so loading finished before the first call.
        assert!(text.contains("loading_in_progress: false"));
        assert!(text.contains("- Doc [global] (4 document(s))"));
    }

    #[test]
    fn search_hit_rendering_includes_documents_on_request() {
        let hit = SearchHit { skill: doc_skill(), relevance_score: 0.5 };
        let without = format_search_hits("q", std::slice::from_ref(&hit), false);
        assert!(!without.contains("documents:"));
        let with = format_search_hits("q", &[hit], true);
        assert!(with.contains("documents:"));
        assert!(with.contains("- scripts/a.py (text,"));
    }
}
