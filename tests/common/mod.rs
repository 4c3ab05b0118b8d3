//! Common test utilities and fixtures

#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use gmail_autoreply::client::{GmailClient, LabelInfo};
use gmail_autoreply::config::Config;
use gmail_autoreply::error::{GmailError, Result};
use gmail_autoreply::llm::{CompletionProvider, ProviderError};
use gmail_autoreply::models::{LabelSpec, MailMessage};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Create a test message with a From header and a thread
pub fn create_test_message(id: &str, from: &str, snippet: &str) -> MailMessage {
    MailMessage {
        id: id.to_string(),
        thread_id: Some(format!("thread_{}", id)),
        headers: vec![
            ("From".to_string(), from.to_string()),
            ("Subject".to_string(), format!("Question {}", id)),
        ],
        snippet: snippet.to_string(),
        label_ids: vec!["INBOX".to_string(), "UNREAD".to_string()],
    }
}

/// Create a message the provider returned without a From header
pub fn create_message_without_sender(id: &str) -> MailMessage {
    let mut message = create_test_message(id, "", "no sender");
    message.headers.retain(|(name, _)| name != "From");
    message
}

/// Config with no pacing delay, so tests do not wait between messages
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.orchestrator.inter_item_delay_secs = 0;
    config
}

/// Decode a `raw` field captured from a send call
pub fn decode_raw(raw: &str) -> String {
    String::from_utf8(URL_SAFE_NO_PAD.decode(raw).expect("valid base64url")).expect("utf-8")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyCall {
    pub message_id: String,
    pub add: Vec<String>,
    pub remove: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentReply {
    pub raw: String,
    pub thread_id: String,
}

#[derive(Default)]
struct MailboxState {
    messages: Vec<MailMessage>,
    labels: Vec<LabelInfo>,
    created: Vec<LabelSpec>,
    updated: Vec<(String, LabelSpec)>,
    modified: Vec<ModifyCall>,
    sent: Vec<SentReply>,
    list_queries: Vec<String>,
    fail_list: bool,
    fail_create_label: bool,
    fail_send_to_thread: HashSet<String>,
}

/// In-memory mailbox implementing [`GmailClient`]
///
/// Records every write so tests can assert on side effects.
#[derive(Default)]
pub struct FakeMailbox {
    state: Mutex<MailboxState>,
}

impl FakeMailbox {
    pub fn new(messages: Vec<MailMessage>) -> Self {
        let mailbox = Self::default();
        mailbox.state.lock().unwrap().messages = messages;
        mailbox
    }

    pub fn with_label(self, id: &str, name: &str) -> Self {
        self.state.lock().unwrap().labels.push(LabelInfo {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn fail_list(&self) {
        self.state.lock().unwrap().fail_list = true;
    }

    pub fn fail_create_label(&self) {
        self.state.lock().unwrap().fail_create_label = true;
    }

    pub fn fail_send_to_thread(&self, thread_id: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_send_to_thread
            .insert(thread_id.to_string());
    }

    pub fn labels(&self) -> Vec<LabelInfo> {
        self.state.lock().unwrap().labels.clone()
    }

    pub fn created_labels(&self) -> Vec<LabelSpec> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn updated_labels(&self) -> Vec<(String, LabelSpec)> {
        self.state.lock().unwrap().updated.clone()
    }

    pub fn modify_calls(&self) -> Vec<ModifyCall> {
        self.state.lock().unwrap().modified.clone()
    }

    pub fn sent(&self) -> Vec<SentReply> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn list_queries(&self) -> Vec<String> {
        self.state.lock().unwrap().list_queries.clone()
    }
}

#[async_trait]
impl GmailClient for FakeMailbox {
    async fn list_message_ids(&self, query: &str, max_results: u32) -> Result<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.list_queries.push(query.to_string());
        if state.fail_list {
            return Err(GmailError::ServerError {
                status: 503,
                message: "backend unavailable".to_string(),
            });
        }
        Ok(state
            .messages
            .iter()
            .take(max_results as usize)
            .map(|m| m.id.clone())
            .collect())
    }

    async fn get_message(&self, id: &str) -> Result<MailMessage> {
        let state = self.state.lock().unwrap();
        state
            .messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| GmailError::MessageNotFound(id.to_string()))
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        Ok(self.state.lock().unwrap().labels.clone())
    }

    async fn create_label(&self, spec: &LabelSpec) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if state.fail_create_label {
            return Err(GmailError::Forbidden("label quota".to_string()));
        }
        let id = format!("Label_{}", state.labels.len() + 1);
        state.labels.push(LabelInfo {
            id: id.clone(),
            name: spec.name.clone(),
        });
        state.created.push(spec.clone());
        Ok(id)
    }

    async fn update_label(&self, label_id: &str, spec: &LabelSpec) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.updated.push((label_id.to_string(), spec.clone()));
        Ok(())
    }

    async fn modify_message(
        &self,
        message_id: &str,
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<()> {
        self.state.lock().unwrap().modified.push(ModifyCall {
            message_id: message_id.to_string(),
            add: add_label_ids.to_vec(),
            remove: remove_label_ids.to_vec(),
        });
        Ok(())
    }

    async fn send_message(&self, raw: &str, thread_id: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if state.fail_send_to_thread.contains(thread_id) {
            return Err(GmailError::SendError(format!("rejected for {}", thread_id)));
        }
        state.sent.push(SentReply {
            raw: raw.to_string(),
            thread_id: thread_id.to_string(),
        });
        Ok(format!("sent_{}", state.sent.len()))
    }
}

/// Completion provider that replays queued responses in order
///
/// Once the queue is empty every call returns `default`.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<std::result::Result<String, ProviderError>>>,
    default: std::result::Result<String, ProviderError>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<std::result::Result<String, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            default: Ok("interested\nThanks for reaching out!".to_string()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Every call answers with the same label and reply
    pub fn always(label: &str, reply: &str) -> Self {
        Self::new(Vec::new()).with_default(Ok(format!("{}\n{}", label, reply)))
    }

    /// Every call reports a rate limit
    pub fn always_rate_limited() -> Self {
        Self::new(Vec::new()).with_default(Err(ProviderError::RateLimited(
            "429 Too Many Requests".to_string(),
        )))
    }

    pub fn with_default(mut self, default: std::result::Result<String, ProviderError>) -> Self {
        self.default = default;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn user_prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(
        &self,
        _system_prompt: &str,
        user_prompt: &str,
        _max_tokens: u16,
    ) -> std::result::Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(user_prompt.to_string());
        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.default.clone())
    }
}
