//! mail-gmail-mcp-rs: Gmail MCP server over stdio
//!
//! This server exposes Gmail over the Model Context Protocol (MCP) via stdio:
//! listing unread inbox mail and creating correctly threaded draft replies.
//! Drafts stay unsent until a human sends them.
//!
//! # Architecture
//!
//! - [`main`]: Process entry point with env loading and stdio serving
//! - [`config`]: Environment-driven configuration for credential paths and defaults
//! - [`errors`]: Application error model with MCP error mapping
//! - [`auth`]: OAuth installed-app flow, token refresh, and token persistence
//! - [`gmail`]: Typed Gmail REST client for list/metadata/draft operations
//! - [`mime`]: Reply envelope serialization and base64url encoding
//! - [`models`]: Input/output DTOs and schema-bearing types
//! - [`reply`]: Reply threading core (header lookup, subject, references)
//! - [`server`]: MCP tool handlers with validation and business orchestration

mod auth;
mod config;
mod errors;
mod gmail;
mod mime;
mod models;
mod reply;
mod server;

use config::ServerConfig;
use rmcp::ServiceExt;
use rmcp::transport::stdio;
use tracing_subscriber::EnvFilter;

/// Application entry point
///
/// Initializes tracing from environment, loads config, and serves the MCP
/// server over stdio. This process expects to be spawned by an MCP client
/// via `stdio` transport.
///
/// # Environment Variables
///
/// See [`ServerConfig::load_from_env`] for full configuration options.
///
/// # Example
///
/// ```no_run
/// GOOGLE_CREDENTIALS_PATH=credentials.json \
/// GOOGLE_TOKEN_PATH=token.json \
/// cargo run
/// ```
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = ServerConfig::load_from_env()?;
    let service = server::GmailMcpServer::new(config).serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}
