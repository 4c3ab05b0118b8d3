//! Candidate discovery: unread messages inside the recent window

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::GmailClient;
use crate::error::{GmailError, Result};
use crate::models::MailMessage;

/// Gmail search query for unread mail received after `now - window_days`
pub fn candidate_query(now: DateTime<Utc>, window_days: u32) -> String {
    let since = now - ChronoDuration::days(i64::from(window_days));
    format!("after:{} is:unread", since.timestamp())
}

/// Read side of the mailbox used at the start of a run
pub struct MailboxGateway {
    client: Arc<dyn GmailClient>,
}

impl MailboxGateway {
    pub fn new(client: Arc<dyn GmailClient>) -> Self {
        Self { client }
    }

    /// Fetch full content for every candidate, in the order listed
    ///
    /// Any listing or per-message failure aborts the whole fetch; the run
    /// treats it as a run-level failure.
    pub async fn fetch_candidates(&self, window_days: u32, max_results: u32) -> Result<Vec<MailMessage>> {
        self.fetch_candidates_at(Utc::now(), window_days, max_results)
            .await
    }

    pub async fn fetch_candidates_at(
        &self,
        now: DateTime<Utc>,
        window_days: u32,
        max_results: u32,
    ) -> Result<Vec<MailMessage>> {
        let query = candidate_query(now, window_days);
        debug!("Fetching candidates with query {:?}", query);

        let ids = self
            .client
            .list_message_ids(&query, max_results)
            .await
            .map_err(|e| {
                warn!("Failed to list candidate messages: {}", e);
                GmailError::FetchFailed(Box::new(e))
            })?;

        if ids.is_empty() {
            info!("No unread messages in the last {} days", window_days);
            return Ok(Vec::new());
        }

        let mut messages = Vec::with_capacity(ids.len());
        for id in ids.iter().take(max_results as usize) {
            let message = self.client.get_message(id).await.map_err(|e| {
                warn!("Failed to fetch message {}: {}", id, e);
                GmailError::FetchFailed(Box::new(e))
            })?;
            messages.push(message);
        }

        info!("Fetched {} candidate messages", messages.len());
        Ok(messages)
    }
}
