//! Batch driver: fetch once, then classify, label and reply per message
//!
//! Messages are processed strictly in fetch order, one at a time. A failure
//! in any per-message stage is logged and recorded on that message's outcome;
//! only the initial fetch can fail the run.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::circuit_breaker::{BreakerStats, QuotaBreaker};
use crate::classifier::ReplyClassifier;
use crate::client::GmailClient;
use crate::config::Config;
use crate::error::Result;
use crate::gateway::MailboxGateway;
use crate::label_manager::LabelManager;
use crate::llm::CompletionProvider;
use crate::models::{ClassificationResult, MailMessage};
use crate::reply::{extract_sender_address, ReplySender};

/// Called after each message with (1-based position, total, outcome)
pub type ProgressCallback = Arc<dyn Fn(usize, usize, &MessageOutcome) + Send + Sync>;

/// Per-message pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Classify,
    Label,
    Reply,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Classify => write!(f, "classify"),
            Stage::Label => write!(f, "label"),
            Stage::Reply => write!(f, "reply"),
        }
    }
}

/// Where a message ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    Fetched,
    Classified,
    Labeled,
    Replied,
    Failed(Stage),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: Stage,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct MessageOutcome {
    pub message_id: String,
    pub classification: Option<ClassificationResult>,
    pub label_id: Option<String>,
    pub reply_id: Option<String>,
    pub failures: Vec<StageFailure>,
}

impl MessageOutcome {
    fn new(message_id: &str) -> Self {
        Self {
            message_id: message_id.to_string(),
            classification: None,
            label_id: None,
            reply_id: None,
            failures: Vec::new(),
        }
    }

    fn fail(&mut self, stage: Stage, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(message_id = %self.message_id, %stage, "Stage failed: {}", reason);
        self.failures.push(StageFailure { stage, reason });
    }

    /// A sent reply wins; otherwise the latest failure, otherwise the furthest stage reached
    pub fn state(&self) -> MessageState {
        if self.reply_id.is_some() {
            return MessageState::Replied;
        }
        if let Some(last) = self.failures.last() {
            return MessageState::Failed(last.stage);
        }
        if self.label_id.is_some() {
            MessageState::Labeled
        } else if self.classification.is_some() {
            MessageState::Classified
        } else {
            MessageState::Fetched
        }
    }

    pub fn failed_at(&self, stage: Stage) -> bool {
        self.failures.iter().any(|f| f.stage == stage)
    }
}

/// Summary of one batch run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub dry_run: bool,
    pub outcomes: Vec<MessageOutcome>,
    pub breaker: BreakerStats,
}

impl RunReport {
    pub fn fetched(&self) -> usize {
        self.outcomes.len()
    }

    pub fn replied(&self) -> usize {
        self.outcomes.iter().filter(|o| o.reply_id.is_some()).count()
    }

    pub fn labeled(&self) -> usize {
        self.outcomes.iter().filter(|o| o.label_id.is_some()).count()
    }

    pub fn failures_at(&self, stage: Stage) -> usize {
        self.outcomes.iter().filter(|o| o.failed_at(stage)).count()
    }

    /// Messages that got the fallback classification
    pub fn degraded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.classification.as_ref().is_some_and(|c| c.is_fallback()))
            .count()
    }

    /// Message count per classified label
    pub fn label_breakdown(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for result in self.outcomes.iter().filter_map(|o| o.classification.as_ref()) {
            *counts.entry(result.label.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn duration_seconds(&self) -> i64 {
        (self.completed_at - self.started_at).num_seconds()
    }
}

/// Drives batch runs against one mailbox
///
/// Each call to [`Orchestrator::run`] builds a fresh quota breaker, so a
/// breaker tripped in one run never affects the next.
pub struct Orchestrator {
    gateway: MailboxGateway,
    labels: LabelManager,
    sender: ReplySender,
    provider: Arc<dyn CompletionProvider>,
    config: Config,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn GmailClient>, provider: Arc<dyn CompletionProvider>, config: Config) -> Self {
        Self {
            gateway: MailboxGateway::new(Arc::clone(&client)),
            labels: LabelManager::new(Arc::clone(&client)),
            sender: ReplySender::new(client),
            provider,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn run(&self) -> Result<RunReport> {
        self.run_with_progress(None).await
    }

    pub async fn run_with_progress(&self, on_progress: Option<ProgressCallback>) -> Result<RunReport> {
        self.run_as(Uuid::new_v4(), on_progress).await
    }

    /// Run under a caller-chosen ID, e.g. one already handed to an HTTP client
    pub async fn run_as(&self, run_id: Uuid, on_progress: Option<ProgressCallback>) -> Result<RunReport> {
        let span = info_span!("run", %run_id);
        self.execute(run_id, on_progress).instrument(span).await
    }

    async fn execute(&self, run_id: Uuid, on_progress: Option<ProgressCallback>) -> Result<RunReport> {
        let started_at = Utc::now();
        let dry_run = self.config.execution.dry_run;
        let breaker = QuotaBreaker::new(self.config.circuit_breaker.clone());
        let classifier = ReplyClassifier::new(
            Arc::clone(&self.provider),
            breaker.clone(),
            &self.config.classifier,
        );

        info!(dry_run, "Starting batch run");

        let messages = self
            .gateway
            .fetch_candidates(self.config.scan.window_days, self.config.scan.max_results)
            .await
            .map_err(|e| {
                error!("Run aborted, could not fetch candidates: {}", e);
                e
            })?;

        if messages.is_empty() {
            info!("No new emails to process");
        }

        let total = messages.len();
        let delay = self.config.orchestrator.inter_item_delay();
        let mut outcomes = Vec::with_capacity(total);

        for (index, message) in messages.iter().enumerate() {
            let outcome = self
                .process_message(&classifier, message, dry_run)
                .instrument(info_span!("message", message_id = %message.id))
                .await;

            if let Some(callback) = on_progress.as_ref() {
                callback(index + 1, total, &outcome);
            }
            outcomes.push(outcome);

            // Unconditional pacing, whatever the outcome
            if !delay.is_zero() {
                debug!("Waiting {:?} before next message", delay);
                tokio::time::sleep(delay).await;
            }
        }

        let report = RunReport {
            run_id,
            started_at,
            completed_at: Utc::now(),
            dry_run,
            outcomes,
            breaker: breaker.stats(),
        };

        info!(
            fetched = report.fetched(),
            replied = report.replied(),
            label_failures = report.failures_at(Stage::Label),
            send_failures = report.failures_at(Stage::Reply),
            degraded = report.degraded(),
            "Batch run complete"
        );

        Ok(report)
    }

    async fn process_message(
        &self,
        classifier: &ReplyClassifier,
        message: &MailMessage,
        dry_run: bool,
    ) -> MessageOutcome {
        let mut outcome = MessageOutcome::new(&message.id);

        let result = classifier.classify(&message.snippet).await;
        if result.label.trim().is_empty() || result.reply_body.trim().is_empty() {
            outcome.fail(Stage::Classify, "Label or response is empty");
            return outcome;
        }
        outcome.classification = Some(result.clone());

        if dry_run {
            info!(label = %result.label, "[DRY RUN] Would label message and send reply");
            return outcome;
        }

        match self.labels.ensure_label(&result.label).await {
            Ok(label_id) => match self.labels.apply_label(&message.id, &label_id).await {
                Ok(()) => {
                    info!(label = %result.label, "Labeled message");
                    outcome.label_id = Some(label_id);
                }
                Err(e) => outcome.fail(Stage::Label, e.to_string()),
            },
            Err(e) => outcome.fail(Stage::Label, e.to_string()),
        }

        // Labeling and sending are independent side effects
        let Some(from) = message.header("From") else {
            outcome.fail(Stage::Reply, "Unable to extract sender email");
            return outcome;
        };
        let recipient = extract_sender_address(from);

        info!("Sending reply to: {}", recipient);
        match self
            .sender
            .send(&recipient, &result.reply_body, message.reply_thread_id(), &message.id)
            .await
        {
            Ok(sent_id) => outcome.reply_id = Some(sent_id),
            Err(e) => outcome.fail(Stage::Reply, format!("Failed to send reply to {}: {}", recipient, e)),
        }

        outcome
    }
}
