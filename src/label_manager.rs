//! Label upsert and message tagging
use crate::client::{GmailClient, LabelInfo};
use crate::error::{GmailError, Result};
use crate::models::{LabelColor, LabelSpec};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// System label cleared when a message is tagged
pub const UNREAD_LABEL: &str = "UNREAD";

pub const DEFAULT_LABEL_COLOR: LabelColor = LabelColor {
    background: "#fbe983",
    text: "#000000",
};

/// Colors keyed by lower-cased label name
static LABEL_COLORS: Lazy<HashMap<&'static str, LabelColor>> = Lazy::new(|| {
    HashMap::from([
        (
            "interested",
            LabelColor {
                background: "#16a766",
                text: "#ffffff",
            },
        ),
        (
            "not interested",
            LabelColor {
                background: "#cc3a21",
                text: "#ffffff",
            },
        ),
        (
            "more info",
            LabelColor {
                background: "#f2c960",
                text: "#ffffff",
            },
        ),
        ("default", DEFAULT_LABEL_COLOR),
    ])
});

/// Color for a label name; unknown names get [`DEFAULT_LABEL_COLOR`]
pub fn label_color(name: &str) -> LabelColor {
    LABEL_COLORS
        .get(name.trim().to_lowercase().as_str())
        .copied()
        .unwrap_or(DEFAULT_LABEL_COLOR)
}

/// Resolves taxonomy labels to Gmail label IDs and applies them
///
/// Keeps no cache: every `ensure_label` lists the account's labels again.
pub struct LabelManager {
    client: Arc<dyn GmailClient>,
}

impl LabelManager {
    pub fn new(client: Arc<dyn GmailClient>) -> Self {
        Self { client }
    }

    /// Find a label by case-insensitive name and re-apply its display
    /// metadata, or create it. Returns the label ID either way.
    pub async fn ensure_label(&self, name: &str) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GmailError::LabelError(
                "Label name cannot be empty".to_string(),
            ));
        }

        let spec = LabelSpec::shown(name, label_color(name));

        if let Some(existing) = self.find_label(name).await? {
            debug!("Label '{}' exists as {}, updating", existing.name, existing.id);
            self.client
                .update_label(&existing.id, &spec)
                .await
                .map_err(|e| {
                    GmailError::LabelError(format!("Failed to update label '{}': {}", name, e))
                })?;
            return Ok(existing.id);
        }

        info!("Creating label: {}", name);
        let label_id = match self.client.create_label(&spec).await {
            Ok(id) => id,
            Err(e) => {
                // The create may have committed before the error surfaced
                match self.find_label(name).await {
                    Ok(Some(committed)) => {
                        warn!(
                            "Create of label '{}' reported {} but the label exists as {}",
                            name, e, committed.id
                        );
                        committed.id
                    }
                    _ => {
                        return Err(GmailError::LabelError(format!(
                            "Failed to create label '{}': {}",
                            name, e
                        )))
                    }
                }
            }
        };

        debug!("Created label '{}' with ID: {}", name, label_id);
        Ok(label_id)
    }

    async fn find_label(&self, name: &str) -> Result<Option<LabelInfo>> {
        let wanted = name.to_lowercase();
        let labels = self.client.list_labels().await?;
        Ok(labels.into_iter().find(|l| l.name.to_lowercase() == wanted))
    }

    /// Add the label and clear UNREAD in a single modify call
    pub async fn apply_label(&self, message_id: &str, label_id: &str) -> Result<()> {
        self.client
            .modify_message(
                message_id,
                &[label_id.to_string()],
                &[UNREAD_LABEL.to_string()],
            )
            .await
            .map_err(|e| {
                GmailError::LabelError(format!(
                    "Failed to label message {}: {}",
                    message_id, e
                ))
            })?;

        debug!("Labeled message {} with {}", message_id, label_id);
        Ok(())
    }
}
