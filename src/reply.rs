//! Reply construction and dispatch

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info};

use crate::client::GmailClient;
use crate::error::{GmailError, Result};

pub const REPLY_SUBJECT: &str = "Re: Your Email";

static ANGLE_ADDRESS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<(.+)>").unwrap());

/// Address inside `<...>` when present, otherwise the header value verbatim
pub fn extract_sender_address(from_header: &str) -> String {
    ANGLE_ADDRESS
        .captures(from_header)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| from_header.to_string())
}

/// Minimal plain-text RFC 822 reply, CRLF line endings
pub fn build_reply_envelope(recipient: &str, body: &str, in_reply_to: &str) -> String {
    [
        format!("To: {}", recipient),
        format!("Subject: {}", REPLY_SUBJECT),
        format!("In-Reply-To: {}", in_reply_to),
        "Content-Type: text/plain; charset=\"UTF-8\"".to_string(),
        "Content-Transfer-Encoding: 7bit".to_string(),
        String::new(),
        body.to_string(),
    ]
    .join("\r\n")
}

/// base64url without padding, as the Gmail `raw` field expects
pub fn encode_raw(envelope: &str) -> String {
    URL_SAFE_NO_PAD.encode(envelope.as_bytes())
}

pub struct ReplySender {
    client: Arc<dyn GmailClient>,
}

impl ReplySender {
    pub fn new(client: Arc<dyn GmailClient>) -> Self {
        Self { client }
    }

    /// Send `body` to `recipient` threaded onto `thread_id`
    ///
    /// Fails with [`GmailError::EmptyReply`] before any provider call when
    /// the body is blank. Never retried.
    pub async fn send(
        &self,
        recipient: &str,
        body: &str,
        thread_id: &str,
        in_reply_to: &str,
    ) -> Result<String> {
        if body.trim().is_empty() {
            return Err(GmailError::EmptyReply);
        }

        let envelope = build_reply_envelope(recipient, body, in_reply_to);
        debug!(bytes = envelope.len(), "Built reply envelope for {}", recipient);

        let sent_id = self
            .client
            .send_message(&encode_raw(&envelope), thread_id)
            .await?;

        info!("Reply sent to {} (ID: {})", recipient, sent_id);
        Ok(sent_id)
    }
}
