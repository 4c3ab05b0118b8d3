use serde::{Deserialize, Serialize};

/// An unread message as fetched at the start of a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MailMessage {
    pub id: String,
    pub thread_id: Option<String>,
    /// Headers in the order the provider returned them
    pub headers: Vec<(String, String)>,
    pub snippet: String,
    pub label_ids: Vec<String>,
}

impl MailMessage {
    /// First header with the given name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Thread the reply should join: the provider thread if known, else the message itself
    pub fn reply_thread_id(&self) -> &str {
        self.thread_id.as_deref().unwrap_or(&self.id)
    }
}

/// Label plus reply text produced for one message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassificationResult {
    pub label: String,
    pub reply_body: String,
}

pub const FALLBACK_LABEL: &str = "default";
pub const FALLBACK_REPLY: &str = "Unable to generate a response.";
pub const QUOTA_EXCEEDED_LABEL: &str = "Quota exceeded";
pub const QUOTA_EXCEEDED_REPLY: &str = "Please try again later.";

impl ClassificationResult {
    pub fn new(label: impl Into<String>, reply_body: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            reply_body: reply_body.into(),
        }
    }

    /// Result used when the model output is unusable or the provider failed
    pub fn fallback() -> Self {
        Self::new(FALLBACK_LABEL, FALLBACK_REPLY)
    }

    /// Result returned without a provider call once the quota breaker has tripped
    pub fn quota_exceeded() -> Self {
        Self::new(QUOTA_EXCEEDED_LABEL, QUOTA_EXCEEDED_REPLY)
    }

    pub fn is_fallback(&self) -> bool {
        self.label == FALLBACK_LABEL && self.reply_body == FALLBACK_REPLY
    }

    pub fn is_quota_exceeded(&self) -> bool {
        self.label == QUOTA_EXCEEDED_LABEL && self.reply_body == QUOTA_EXCEEDED_REPLY
    }
}

/// Background/text color pair for a Gmail label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelColor {
    pub background: &'static str,
    pub text: &'static str,
}

/// Label body sent on create and update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSpec {
    pub name: String,
    pub label_list_visibility: String,
    pub message_list_visibility: String,
    pub color: LabelColor,
}

impl LabelSpec {
    /// Visible in both the label list and the message list
    pub fn shown(name: &str, color: LabelColor) -> Self {
        Self {
            name: name.to_string(),
            label_list_visibility: "labelShow".to_string(),
            message_list_visibility: "show".to_string(),
            color,
        }
    }
}
