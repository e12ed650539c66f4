//! Input/output DTOs and schema-bearing types
//!
//! Defines all data structures used in MCP tool contracts. Each type is
//! annotated with `JsonSchema` for automatic schema generation.

use chrono::{SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Metadata included in all tool responses
///
/// Provides timing information and current UTC timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Meta {
    /// Current UTC timestamp in RFC 3339 format with milliseconds
    pub now_utc: String,
    /// Tool execution duration in milliseconds
    pub duration_ms: u64,
}

impl Meta {
    /// Create metadata populated with current time and elapsed duration
    pub fn now(duration_ms: u64) -> Self {
        Self {
            now_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            duration_ms,
        }
    }
}

/// Standard response envelope for all tools
///
/// Wraps tool-specific data with human-readable summary and execution metadata.
/// This structure provides consistent response shape across all MCP tools.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToolEnvelope<T>
where
    T: JsonSchema,
{
    /// Human-readable summary of the operation outcome
    pub summary: String,
    /// Tool-specific data payload
    pub data: T,
    /// Execution metadata (timestamp, duration)
    pub meta: Meta,
}

/// Unread message summary
///
/// Lightweight projection returned by `get_unread_emails`. Every field except
/// `id` is optional; values come straight from the message headers and the
/// provider-generated snippet.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MessageSummary {
    /// Gmail message identifier
    pub id: String,
    /// Conversation thread identifier
    pub thread_id: Option<String>,
    /// Parsed From header
    pub from: Option<String>,
    /// Parsed Subject header
    pub subject: Option<String>,
    /// Parsed Date header
    pub date: Option<String>,
    /// Provider-generated preview text
    pub snippet: Option<String>,
}

/// Result of a successful draft creation
///
/// Returned by `create_draft_reply`. The draft stays unsent in the mailbox
/// until sent manually.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DraftResult {
    /// Identifier of the created draft
    pub draft_id: String,
    /// Thread the draft is attached to (the original message's thread)
    pub thread_id: String,
}

/// Input: list unread inbox messages
///
/// Used by `get_unread_emails`. A `max_results` of zero (the default) or any
/// negative value means "use the configured default" (`MAX_UNREAD`).
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetUnreadEmailsInput {
    /// Maximum messages to return (0 or negative uses the configured default;
    /// effective count is clamped to 1..50)
    #[serde(default)]
    pub max_results: i64,
}

/// Input: create a threaded draft reply
///
/// Used by `create_draft_reply`. Both fields are required and must be
/// non-empty after trimming surrounding whitespace.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateDraftReplyInput {
    /// Gmail identifier of the message being replied to
    pub original_message_id: String,
    /// Plain-text body of the reply
    pub reply_body: String,
}
