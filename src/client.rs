//! Gmail API client with timeout and retry logic

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use google_gmail1::{
    api::{Label, LabelColor as ApiLabelColor, Message, ModifyMessageRequest},
    hyper_rustls, hyper_util, Gmail,
};
use std::future::Future;
use std::io::Cursor;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{GmailError, Result};
use crate::models::{LabelSpec, MailMessage};
use crate::retry::RetryPolicy;

const SCOPE_MODIFY: &str = "https://www.googleapis.com/auth/gmail.modify";
const SCOPE_LABELS: &str = "https://www.googleapis.com/auth/gmail.labels";
const SCOPE_SEND: &str = "https://www.googleapis.com/auth/gmail.send";

/// Per-call ceiling so a stalled connection cannot hang the run
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Label info returned from Gmail API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelInfo {
    pub id: String,
    pub name: String,
}

/// Trait defining Gmail client operations for easier testing
#[async_trait]
pub trait GmailClient: Send + Sync {
    /// List message IDs matching a query, at most `max_results`
    async fn list_message_ids(&self, query: &str, max_results: u32) -> Result<Vec<String>>;

    /// Get a full message: headers, snippet and labels
    async fn get_message(&self, id: &str) -> Result<MailMessage>;

    /// List all labels in the account
    async fn list_labels(&self) -> Result<Vec<LabelInfo>>;

    /// Create a new label, returning its ID
    async fn create_label(&self, spec: &LabelSpec) -> Result<String>;

    /// Overwrite name, visibility and color of an existing label
    async fn update_label(&self, label_id: &str, spec: &LabelSpec) -> Result<()>;

    /// Add and remove labels on a single message
    async fn modify_message(
        &self,
        message_id: &str,
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<()>;

    /// Send a base64url-encoded RFC 822 message into a thread, returning the sent ID
    async fn send_message(&self, raw: &str, thread_id: &str) -> Result<String>;
}

type HttpsHub = Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Production Gmail client
///
/// Idempotent calls (reads, label updates, modify) are retried on transient
/// failures. Label creation and sending are not retried: a lost response
/// would turn the repeat into a 409 or a duplicate reply.
pub struct ProductionGmailClient {
    hub: HttpsHub,
    retry_policy: RetryPolicy,
}

impl ProductionGmailClient {
    pub fn new(hub: HttpsHub) -> Self {
        Self {
            hub,
            retry_policy: RetryPolicy::gmail_default(),
        }
    }

    /// Check if an error is retryable
    fn should_retry(error: &GmailError) -> bool {
        error.is_transient()
    }

    /// Execute an async operation, retrying transient failures per `policy`
    async fn with_retry<T, F, Fut>(
        operation_name: &str,
        policy: RetryPolicy,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retry = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if Self::should_retry(&e) => {
                    retry += 1;
                    let Some(delay) = policy.delay_before_retry(retry) else {
                        return Err(e);
                    };
                    // Never wait less than the server asked for
                    let delay = e.retry_after().map_or(delay, |hint| hint.max(delay));
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        operation_name,
                        retry,
                        policy.max_attempts(),
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Run one API call under [`CALL_TIMEOUT`], mapping both failure kinds
async fn timed<T, Fut>(operation_name: &str, call: Fut) -> Result<T>
where
    Fut: Future<Output = std::result::Result<T, google_gmail1::Error>>,
{
    debug!("Calling Gmail API: {}", operation_name);
    match tokio::time::timeout(CALL_TIMEOUT, call).await {
        Ok(result) => result.map_err(GmailError::from),
        Err(_) => {
            warn!("Gmail API {} call timed out after {:?}", operation_name, CALL_TIMEOUT);
            Err(GmailError::NetworkError(format!(
                "API call timed out after {:?}",
                CALL_TIMEOUT
            )))
        }
    }
}

/// Parse a Gmail API message into [`MailMessage`]
fn parse_message(msg: Message) -> Result<MailMessage> {
    let id = msg
        .id
        .ok_or_else(|| GmailError::InvalidMessageFormat("Missing message ID".to_string()))?;

    let headers = msg
        .payload
        .and_then(|p| p.headers)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|h| match (h.name, h.value) {
            (Some(name), Some(value)) => Some((name, value)),
            _ => None,
        })
        .collect();

    Ok(MailMessage {
        id,
        thread_id: msg.thread_id,
        headers,
        snippet: msg.snippet.unwrap_or_default(),
        label_ids: msg.label_ids.unwrap_or_default(),
    })
}

fn to_api_label(spec: &LabelSpec) -> Label {
    Label {
        name: Some(spec.name.clone()),
        label_list_visibility: Some(spec.label_list_visibility.clone()),
        message_list_visibility: Some(spec.message_list_visibility.clone()),
        color: Some(ApiLabelColor {
            background_color: Some(spec.color.background.to_string()),
            text_color: Some(spec.color.text.to_string()),
        }),
        ..Default::default()
    }
}

fn non_empty(ids: &[String]) -> Option<Vec<String>> {
    if ids.is_empty() {
        None
    } else {
        Some(ids.to_vec())
    }
}

#[async_trait]
impl GmailClient for ProductionGmailClient {
    async fn list_message_ids(&self, query: &str, max_results: u32) -> Result<Vec<String>> {
        Self::with_retry("list_message_ids", self.retry_policy, || async {
            let (_, response) = timed(
                "messages.list",
                self.hub
                    .users()
                    .messages_list("me")
                    .q(query)
                    .max_results(max_results)
                    .add_scope(SCOPE_MODIFY)
                    .doit(),
            )
            .await?;

            // Single page only; matches beyond max_results are not followed
            let ids: Vec<String> = response
                .messages
                .unwrap_or_default()
                .into_iter()
                .filter_map(|m| m.id)
                .take(max_results as usize)
                .collect();

            debug!("Listed {} message IDs for query {:?}", ids.len(), query);
            Ok(ids)
        })
        .await
    }

    async fn get_message(&self, id: &str) -> Result<MailMessage> {
        Self::with_retry("get_message", self.retry_policy, || async {
            let (_, msg) = timed(
                "messages.get",
                self.hub
                    .users()
                    .messages_get("me", id)
                    .format("full")
                    .add_scope(SCOPE_MODIFY)
                    .doit(),
            )
            .await?;

            parse_message(msg)
        })
        .await
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        Self::with_retry("list_labels", self.retry_policy, || async {
            let (_, response) = timed(
                "labels.list",
                self.hub.users().labels_list("me").add_scope(SCOPE_LABELS).doit(),
            )
            .await?;

            let labels: Vec<LabelInfo> = response
                .labels
                .unwrap_or_default()
                .into_iter()
                .filter_map(|label| match (label.id, label.name) {
                    (Some(id), Some(name)) => Some(LabelInfo { id, name }),
                    _ => None,
                })
                .collect();

            debug!("Successfully parsed {} labels", labels.len());
            Ok(labels)
        })
        .await
    }

    async fn create_label(&self, spec: &LabelSpec) -> Result<String> {
        // Not retried: a create whose response was lost would come back as 409
        let (_, created_label) = timed(
            "labels.create",
            self.hub
                .users()
                .labels_create(to_api_label(spec), "me")
                .add_scope(SCOPE_LABELS)
                .doit(),
        )
        .await?;

        created_label
            .id
            .ok_or_else(|| GmailError::LabelError("Created label has no ID".to_string()))
    }

    async fn update_label(&self, label_id: &str, spec: &LabelSpec) -> Result<()> {
        Self::with_retry("update_label", self.retry_policy, || async {
            timed(
                "labels.update",
                self.hub
                    .users()
                    .labels_update(to_api_label(spec), "me", label_id)
                    .add_scope(SCOPE_LABELS)
                    .doit(),
            )
            .await?;

            Ok(())
        })
        .await
    }

    async fn modify_message(
        &self,
        message_id: &str,
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<()> {
        Self::with_retry("modify_message", self.retry_policy, || async {
            let modify_request = ModifyMessageRequest {
                add_label_ids: non_empty(add_label_ids),
                remove_label_ids: non_empty(remove_label_ids),
            };

            timed(
                "messages.modify",
                self.hub
                    .users()
                    .messages_modify(modify_request, "me", message_id)
                    .add_scope(SCOPE_MODIFY)
                    .doit(),
            )
            .await?;

            Ok(())
        })
        .await
    }

    async fn send_message(&self, raw: &str, thread_id: &str) -> Result<String> {
        let rfc822 = URL_SAFE_NO_PAD
            .decode(raw)
            .map_err(|e| GmailError::SendError(format!("Raw message is not base64url: {}", e)))?;

        let mime_type: mime::Mime = "message/rfc822"
            .parse()
            .map_err(|e| GmailError::SendError(format!("Invalid MIME type: {}", e)))?;

        let envelope = Message {
            thread_id: Some(thread_id.to_string()),
            ..Default::default()
        };

        let (_, sent) = timed(
            "messages.send",
            self.hub
                .users()
                .messages_send(envelope, "me")
                .add_scope(SCOPE_SEND)
                .upload(Cursor::new(rfc822), mime_type),
        )
        .await
        .map_err(|e| GmailError::SendError(e.to_string()))?;

        sent.id
            .ok_or_else(|| GmailError::SendError("Sent message has no ID".to_string()))
    }
}
