//! HTTP surface for skillseek.
//!
//! Serves the out-of-band endpoints next to the streamable MCP transport:
//!
//! - `POST /skills/upload` - add skill bundles from a zip archive at runtime
//! - `GET /health` - loading-state snapshot
//! - `GET /skills` - indexed skill inventory
//! - `/mcp` - the MCP tool surface over streamable HTTP

pub mod handlers;
pub mod server;
pub mod types;

pub use server::{create_app, serve};
