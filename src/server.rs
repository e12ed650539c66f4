//! MCP server implementation with tool handlers
//!
//! Implements the `ServerHandler` trait and registers the two Gmail tools.
//! Handles input validation, business logic orchestration, and response
//! formatting. The authenticated Gmail client initializes lazily on first use
//! and is shared for the process lifetime.

use std::sync::Arc;
use std::time::Instant;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{ErrorData, ServerCapabilities, ServerInfo};
use rmcp::{Json, ServerHandler, tool, tool_handler, tool_router};
use tokio::sync::OnceCell;

use crate::config::ServerConfig;
use crate::errors::{AppError, AppResult};
use crate::gmail::GmailClient;
use crate::mime;
use crate::models::{
    CreateDraftReplyInput, DraftResult, GetUnreadEmailsInput, MessageSummary, Meta, ToolEnvelope,
};
use crate::reply::{self, ReplyDraft, ReplyMetadata};

/// Upper bound on unread messages per listing
const MAX_UNREAD_LIMIT: usize = 50;
/// Gmail search query selecting unread inbox messages
const UNREAD_QUERY: &str = "is:unread in:inbox";

/// Gmail MCP server
///
/// Holds shared configuration and the lazily-initialized Gmail client.
/// Implements MCP tool handlers via `#[tool]` attribute macro and
/// `ServerHandler` trait.
#[derive(Clone)]
pub struct GmailMcpServer {
    /// Server config (credential paths, listing default)
    config: Arc<ServerConfig>,
    /// Authenticated client, created once on first tool call
    client: Arc<OnceCell<GmailClient>>,
    /// Tool router for dispatching MCP tool calls
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl GmailMcpServer {
    /// Create a new MCP server instance
    ///
    /// The Gmail client is not constructed here; first use triggers
    /// authorization so server startup never blocks on a browser flow.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            client: Arc::new(OnceCell::new()),
            tool_router: Self::tool_router(),
        }
    }

    /// Tool: List unread inbox messages
    ///
    /// Returns sender, subject, date, snippet, message id, and thread id for
    /// each unread message, newest first as reported by Gmail.
    #[tool(
        name = "get_unread_emails",
        description = "Return unread inbox emails with sender, subject, snippet, message id and thread id"
    )]
    async fn get_unread_emails(
        &self,
        Parameters(input): Parameters<GetUnreadEmailsInput>,
    ) -> Result<Json<ToolEnvelope<Vec<MessageSummary>>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.list_unread_impl(input)
                .await
                .map(|data| (format!("{} unread message(s)", data.len()), data)),
        )
    }

    /// Tool: Create a threaded draft reply
    ///
    /// Resolves the original message's threading metadata, derives recipient,
    /// subject, and threading headers, and stores an unsent draft on the
    /// original thread.
    #[tool(
        name = "create_draft_reply",
        description = "Create a correctly threaded Gmail draft reply to an existing message"
    )]
    async fn create_draft_reply(
        &self,
        Parameters(input): Parameters<CreateDraftReplyInput>,
    ) -> Result<Json<ToolEnvelope<DraftResult>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.create_draft_reply_impl(input)
                .await
                .map(|data| (format!("draft {} created on thread {}", data.draft_id, data.thread_id), data)),
        )
    }
}

/// MCP server handler implementation
///
/// Provides server info and capabilities to MCP client.
#[tool_handler(router = self.tool_router)]
impl ServerHandler for GmailMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build()).with_instructions(
            "Gmail MCP server. Lists unread inbox mail and creates threaded draft replies; drafts are never sent automatically.",
        )
    }
}

/// Tool implementation methods
///
/// Private methods handle the actual business logic for each tool, separated
/// from the public `#[tool]` methods that handle response formatting.
impl GmailMcpServer {
    /// Shared Gmail client, authorizing on first use
    ///
    /// `OnceCell` keeps initialization race-safe if the host ever invokes
    /// tools concurrently; a failed authorization is retried on the next call.
    async fn client(&self) -> AppResult<&GmailClient> {
        self.client
            .get_or_try_init(|| GmailClient::connect(Arc::clone(&self.config)))
            .await
    }

    async fn list_unread_impl(
        &self,
        input: GetUnreadEmailsInput,
    ) -> AppResult<Vec<MessageSummary>> {
        let limit = effective_max_results(input.max_results, self.config.max_unread_default);
        let client = self.client().await?;

        let ids = client.list_message_ids(UNREAD_QUERY, limit).await?;

        // One metadata round trip per message, in provider order.
        let mut summaries = Vec::with_capacity(ids.len());
        for id in ids {
            let message = client.get_metadata(&id, &reply::SUMMARY_HEADERS).await?;
            let header = |name: &str| reply::find_header(&message.headers, name).map(str::to_owned);
            summaries.push(MessageSummary {
                id: message.id,
                thread_id: message.thread_id,
                from: header("From"),
                subject: header("Subject"),
                date: header("Date"),
                snippet: message.snippet,
            });
        }

        Ok(summaries)
    }

    async fn create_draft_reply_impl(&self, input: CreateDraftReplyInput) -> AppResult<DraftResult> {
        let message_id = validate_draft_reply_input(&input)?;
        let client = self.client().await?;

        let message = client.get_metadata(&message_id, &reply::REPLY_HEADERS).await?;
        let metadata = ReplyMetadata::from_message(&message)?;
        let draft = ReplyDraft::compose(&metadata, &input.reply_body)?;

        let raw = mime::encode_reply_raw(&draft);
        let draft_id = client.create_draft(&raw, &metadata.thread_id).await?;

        Ok(DraftResult {
            draft_id,
            thread_id: metadata.thread_id,
        })
    }
}

/// Calculate elapsed milliseconds
fn duration_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

/// Build a standardized MCP tool response envelope from business logic output
fn finalize_tool<T>(
    started: Instant,
    result: AppResult<(String, T)>,
) -> Result<Json<ToolEnvelope<T>>, ErrorData>
where
    T: schemars::JsonSchema,
{
    match result {
        Ok((summary, data)) => Ok(Json(ToolEnvelope {
            summary,
            data,
            meta: Meta::now(duration_ms(started)),
        })),
        Err(e) => Err(e.to_error_data()),
    }
}

/// Resolve the effective unread listing count
///
/// Zero or negative requests fall back to the configured default; the result
/// is always clamped to `1..=MAX_UNREAD_LIMIT`.
fn effective_max_results(requested: i64, configured_default: usize) -> usize {
    let count = if requested > 0 {
        requested as usize
    } else {
        configured_default
    };
    count.clamp(1, MAX_UNREAD_LIMIT)
}

/// Validate draft reply input before any network call
///
/// Both arguments must be non-empty after trimming. Returns the trimmed
/// message id; the body is passed through as given.
fn validate_draft_reply_input(input: &CreateDraftReplyInput) -> AppResult<String> {
    let message_id = input.original_message_id.trim();
    if message_id.is_empty() {
        return Err(AppError::invalid("original_message_id is required"));
    }
    if input.reply_body.trim().is_empty() {
        return Err(AppError::invalid("reply_body is required"));
    }
    Ok(message_id.to_owned())
}

#[cfg(test)]
mod tests {
    use super::{effective_max_results, validate_draft_reply_input};
    use crate::models::CreateDraftReplyInput;

    #[test]
    fn zero_request_uses_configured_default() {
        assert_eq!(effective_max_results(0, 10), 10);
    }

    #[test]
    fn oversized_request_is_clamped_to_upper_bound() {
        assert_eq!(effective_max_results(1000, 10), 50);
    }

    #[test]
    fn negative_request_uses_configured_default() {
        assert_eq!(effective_max_results(-5, 10), 10);
    }

    #[test]
    fn positive_request_within_bounds_is_honored() {
        assert_eq!(effective_max_results(7, 10), 7);
    }

    #[test]
    fn zero_configured_default_still_yields_at_least_one() {
        assert_eq!(effective_max_results(0, 0), 1);
    }

    #[test]
    fn rejects_blank_message_id() {
        let err = validate_draft_reply_input(&CreateDraftReplyInput {
            original_message_id: "   ".to_owned(),
            reply_body: "hello".to_owned(),
        })
        .expect_err("must fail");
        assert!(err.to_string().contains("original_message_id"));
    }

    #[test]
    fn rejects_blank_reply_body() {
        let err = validate_draft_reply_input(&CreateDraftReplyInput {
            original_message_id: "msg-1".to_owned(),
            reply_body: "\n\t".to_owned(),
        })
        .expect_err("must fail");
        assert!(err.to_string().contains("reply_body"));
    }

    #[test]
    fn trims_message_id_surrounding_whitespace() {
        let id = validate_draft_reply_input(&CreateDraftReplyInput {
            original_message_id: "  msg-1  ".to_owned(),
            reply_body: "hello".to_owned(),
        })
        .expect("must validate");
        assert_eq!(id, "msg-1");
    }
}
