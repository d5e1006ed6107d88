//! MCP tool surface for skillseek.
//!
//! Exposes three retrieval tools to AI agents over the Model Context
//! Protocol: `find_helpful_skills` (semantic search), `read_skill_document`
//! (document fetch by path or glob), and `list_skills` (full inventory).
//! The server runs over newline-delimited JSON-RPC on stdio or as a
//! streamable HTTP service nested at `/mcp`.

pub mod server;

pub use server::{build_router, SkillsMcpServer};
