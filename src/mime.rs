//! Outbound reply envelope serialization
//!
//! Builds the RFC 822 text for a plain-text reply and encodes it for the Gmail
//! API `raw` field (base64url). The envelope carries only the headers a
//! threaded reply needs; no HTML part, no attachments.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::reply::ReplyDraft;

/// Serialize a reply draft to a base64url-encoded raw message
pub fn encode_reply_raw(draft: &ReplyDraft) -> String {
    URL_SAFE_NO_PAD.encode(reply_message_text(draft).as_bytes())
}

/// Build the RFC 822 message text for a reply draft
fn reply_message_text(draft: &ReplyDraft) -> String {
    let headers = [
        format!("To: {}", draft.recipient),
        format!("Subject: {}", draft.subject),
        format!("In-Reply-To: {}", draft.in_reply_to),
        format!("References: {}", draft.references),
        "MIME-Version: 1.0".to_owned(),
        "Content-Type: text/plain; charset=utf-8".to_owned(),
    ];

    format!("{}\r\n\r\n{}", headers.join("\r\n"), draft.body)
}
