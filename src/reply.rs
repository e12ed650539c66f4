//! Reply threading core
//!
//! Pure logic for composing a threaded reply from an original message's
//! metadata: case-insensitive header lookup, idempotent subject normalization,
//! `References` chain composition, and recipient selection. Validation happens
//! at construction time ([`ReplyMetadata::from_message`] and
//! [`ReplyDraft::compose`]) rather than scattered through the handlers.

use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{AppError, AppResult};
use crate::gmail::MessageMetadata;

/// Headers requested when fetching a message for reply composition
pub const REPLY_HEADERS: [&str; 7] = [
    "From",
    "To",
    "Cc",
    "Subject",
    "Message-ID",
    "References",
    "Reply-To",
];

/// Headers requested when building unread summaries
pub const SUMMARY_HEADERS: [&str; 3] = ["From", "Subject", "Date"];

/// Matches subjects that already carry a reply marker
static REPLY_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*re:").expect("reply prefix pattern is valid"));

/// Find a header value by case-insensitive name
///
/// Returns the first matching value in list order; headers may contain
/// duplicates and the snapshot order is authoritative.
pub fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(header_name, _)| header_name.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Prefix a subject with the reply marker unless already prefixed
///
/// Idempotent: an already-marked subject (any case, leading whitespace
/// allowed) is returned unchanged, so replies to replies never accumulate
/// "Re: Re: ...".
pub fn normalize_reply_subject(subject: &str) -> String {
    if subject.is_empty() {
        return "Re:".to_owned();
    }
    if REPLY_PREFIX.is_match(subject) {
        return subject.to_owned();
    }
    format!("Re: {subject}")
}

/// Compose the `References` chain for a reply
///
/// Appends the parent message id to the trimmed prior chain unless the chain
/// already contains it. Containment is a plain substring test, matching the
/// behavior mail clients have come to expect from this draft flow.
pub fn thread_references(prior: Option<&str>, in_reply_to: &str) -> String {
    let prior = prior.unwrap_or_default().trim();
    if prior.is_empty() {
        return in_reply_to.to_owned();
    }
    if prior.contains(in_reply_to) {
        return prior.to_owned();
    }
    format!("{prior} {in_reply_to}")
}

/// Threading metadata resolved from one original message
///
/// Constructed via [`ReplyMetadata::from_message`], which enforces that both
/// the thread id and the Message-ID header are present.
#[derive(Debug, Clone)]
pub struct ReplyMetadata {
    /// Conversation thread id (from the fetch result, not a header)
    pub thread_id: String,
    /// From header
    pub from: Option<String>,
    /// To header
    pub to: Option<String>,
    /// Cc header
    pub cc: Option<String>,
    /// Subject header
    pub subject: Option<String>,
    /// Message-ID header of the original message
    pub message_id: String,
    /// References header of the original message
    pub references: Option<String>,
    /// Reply-To header, preferred over From as reply recipient
    pub reply_to: Option<String>,
}

impl ReplyMetadata {
    /// Extract and validate threading metadata from a fetched message
    ///
    /// # Errors
    ///
    /// Returns `Resolution` if the thread id or the Message-ID header is
    /// absent or empty.
    pub fn from_message(message: &MessageMetadata) -> AppResult<Self> {
        let thread_id = message
            .thread_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                AppError::Resolution("could not find a thread id for the message".to_owned())
            })?;

        let message_id = find_header(&message.headers, "Message-ID")
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                AppError::Resolution(
                    "could not find a Message-ID header for the message".to_owned(),
                )
            })?;

        let header = |name: &str| find_header(&message.headers, name).map(str::to_owned);

        Ok(Self {
            thread_id: thread_id.to_owned(),
            from: header("From"),
            to: header("To"),
            cc: header("Cc"),
            subject: header("Subject"),
            message_id: message_id.to_owned(),
            references: header("References"),
            reply_to: header("Reply-To"),
        })
    }
}

/// A composed reply draft, ready for envelope serialization
///
/// Consumed once to build the outbound raw message; never persisted.
#[derive(Debug, Clone)]
pub struct ReplyDraft {
    /// Reply recipient (Reply-To of the original if present, else From)
    pub recipient: String,
    /// Normalized subject with reply marker
    pub subject: String,
    /// Message-ID of the message being replied to
    pub in_reply_to: String,
    /// Ancestry chain including the parent message id
    pub references: String,
    /// Plain-text reply body
    pub body: String,
}

impl ReplyDraft {
    /// Derive reply headers from resolved metadata and a caller-supplied body
    ///
    /// # Errors
    ///
    /// Returns `MissingRecipient` if neither Reply-To nor From carries a
    /// usable address.
    pub fn compose(metadata: &ReplyMetadata, body: &str) -> AppResult<Self> {
        let recipient = metadata
            .reply_to
            .as_deref()
            .filter(|addr| !addr.is_empty())
            .or(metadata
                .from
                .as_deref()
                .filter(|addr| !addr.is_empty()))
            .ok_or_else(|| {
                AppError::MissingRecipient(
                    "could not determine recipient (Reply-To and From both missing)".to_owned(),
                )
            })?;

        let subject = normalize_reply_subject(metadata.subject.as_deref().unwrap_or_default());
        let in_reply_to = metadata.message_id.clone();
        let references = thread_references(metadata.references.as_deref(), &in_reply_to);

        Ok(Self {
            recipient: recipient.to_owned(),
            subject,
            in_reply_to,
            references,
            body: body.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect()
    }

    fn message(thread_id: Option<&str>, pairs: &[(&str, &str)]) -> MessageMetadata {
        MessageMetadata {
            id: "msg-1".to_owned(),
            thread_id: thread_id.map(str::to_owned),
            snippet: None,
            headers: headers(pairs),
        }
    }

    #[test]
    fn header_lookup_ignores_name_case() {
        let set = headers(&[("FROM", "alice@x.com"), ("Subject", "hi")]);
        assert_eq!(find_header(&set, "from"), Some("alice@x.com"));
        assert_eq!(find_header(&set, "sUbJeCt"), Some("hi"));
    }

    #[test]
    fn header_lookup_returns_first_match_in_order() {
        let set = headers(&[("Received", "first"), ("received", "second")]);
        assert_eq!(find_header(&set, "Received"), Some("first"));
    }

    #[test]
    fn header_lookup_absent_name_is_none() {
        let set = headers(&[("From", "alice@x.com")]);
        assert_eq!(find_header(&set, "Reply-To"), None);
        assert_eq!(find_header(&[], "From"), None);
    }

    #[test]
    fn normalizes_plain_subject() {
        assert_eq!(normalize_reply_subject("Hello"), "Re: Hello");
    }

    #[test]
    fn empty_subject_becomes_bare_marker() {
        assert_eq!(normalize_reply_subject(""), "Re:");
    }

    #[test]
    fn already_prefixed_subjects_pass_through() {
        assert_eq!(normalize_reply_subject("Re: Hello"), "Re: Hello");
        assert_eq!(normalize_reply_subject("RE:Hello"), "RE:Hello");
        assert_eq!(normalize_reply_subject("  re: hello"), "  re: hello");
    }

    #[test]
    fn normalization_is_idempotent() {
        for subject in ["", "Hello", "Re: Hello", "RE:Hello", "  re: x", "Re:"] {
            let once = normalize_reply_subject(subject);
            assert_eq!(normalize_reply_subject(&once), once, "subject: {subject:?}");
        }
    }

    #[test]
    fn references_starts_chain_from_parent() {
        assert_eq!(thread_references(None, "<m1>"), "<m1>");
        assert_eq!(thread_references(Some("   "), "<m1>"), "<m1>");
    }

    #[test]
    fn references_skips_already_contained_parent() {
        assert_eq!(thread_references(Some("<a> <b>"), "<b>"), "<a> <b>");
    }

    #[test]
    fn references_appends_new_parent() {
        assert_eq!(thread_references(Some("<a>"), "<c>"), "<a> <c>");
    }

    #[test]
    fn resolution_fails_without_thread_id() {
        let msg = message(None, &[("Message-ID", "<abc>")]);
        let err = ReplyMetadata::from_message(&msg).expect_err("must fail");
        assert!(matches!(err, AppError::Resolution(_)));
        assert!(err.to_string().contains("thread id"));
    }

    #[test]
    fn resolution_fails_without_message_id_header() {
        let msg = message(Some("t1"), &[("From", "alice@x.com")]);
        let err = ReplyMetadata::from_message(&msg).expect_err("must fail");
        assert!(matches!(err, AppError::Resolution(_)));
        assert!(err.to_string().contains("Message-ID"));
    }

    #[test]
    fn reply_to_wins_over_from() {
        let msg = message(
            Some("t1"),
            &[
                ("From", "alice@x.com"),
                ("Reply-To", "list@x.com"),
                ("Message-ID", "<abc>"),
            ],
        );
        let metadata = ReplyMetadata::from_message(&msg).expect("must resolve");
        let draft = ReplyDraft::compose(&metadata, "ok").expect("must compose");
        assert_eq!(draft.recipient, "list@x.com");
    }

    #[test]
    fn falls_back_to_from_when_reply_to_empty() {
        let msg = message(
            Some("t1"),
            &[
                ("From", "alice@x.com"),
                ("Reply-To", ""),
                ("Message-ID", "<abc>"),
            ],
        );
        let metadata = ReplyMetadata::from_message(&msg).expect("must resolve");
        let draft = ReplyDraft::compose(&metadata, "ok").expect("must compose");
        assert_eq!(draft.recipient, "alice@x.com");
    }

    #[test]
    fn missing_both_addresses_is_an_error() {
        let msg = message(Some("t1"), &[("Message-ID", "<abc>")]);
        let metadata = ReplyMetadata::from_message(&msg).expect("must resolve");
        let err = ReplyDraft::compose(&metadata, "ok").expect_err("must fail");
        assert!(matches!(err, AppError::MissingRecipient(_)));
    }

    #[test]
    fn composes_reply_to_fresh_thread() {
        let msg = message(
            Some("t1"),
            &[
                ("From", "alice@x.com"),
                ("Subject", "Project X"),
                ("Message-ID", "<abc>"),
            ],
        );
        let metadata = ReplyMetadata::from_message(&msg).expect("must resolve");
        let draft = ReplyDraft::compose(&metadata, "Sounds good.").expect("must compose");

        assert_eq!(draft.recipient, "alice@x.com");
        assert_eq!(draft.subject, "Re: Project X");
        assert_eq!(draft.in_reply_to, "<abc>");
        assert_eq!(draft.references, "<abc>");
        assert_eq!(draft.body, "Sounds good.");
        assert_eq!(metadata.thread_id, "t1");
    }

    #[test]
    fn composes_reply_extending_existing_chain() {
        let msg = message(
            Some("t1"),
            &[
                ("From", "bob@x.com"),
                ("Subject", "Re: Project X"),
                ("Message-ID", "<def>"),
                ("References", "<abc>"),
            ],
        );
        let metadata = ReplyMetadata::from_message(&msg).expect("must resolve");
        let draft = ReplyDraft::compose(&metadata, "Agreed.").expect("must compose");

        assert_eq!(draft.subject, "Re: Project X");
        assert_eq!(draft.references, "<abc> <def>");
    }
}
