//! Gmail Auto-Reply
//!
//! Fetches recent unread Gmail messages, asks a language model to classify
//! each one and draft a reply, then labels the message and answers it in its
//! thread.
//!
//! # Overview
//!
//! - **Authentication**: OAuth2 for Gmail with token caching, API key for the model
//! - **Fetching**: one query for unread mail inside a rolling time window
//! - **Classification**: model call with bounded retries and a run-wide quota breaker
//! - **Label Management**: find-or-create labels with a fixed color palette
//! - **Replies**: RFC 2822 envelopes sent into the original thread
//! - **Triggering**: a foreground CLI run or an HTTP `GET /start-gmail`
//!
//! # Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use gmail_autoreply::{auth, config::Config, OpenAiProvider, Orchestrator, ProductionGmailClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     let hub = auth::initialize_gmail_hub(
//!         "credentials.json".as_ref(),
//!         ".gmail-autoreply/token.json".as_ref(),
//!     )
//!     .await?;
//!     let client = Arc::new(ProductionGmailClient::new(hub));
//!
//!     let settings = auth::OpenAiSettings::from_env()?;
//!     let provider = Arc::new(OpenAiProvider::new(
//!         settings.into_config(),
//!         config.classifier.model.clone(),
//!     ));
//!
//!     let report = Orchestrator::new(client, provider, config).run().await?;
//!     println!("Replied to {} of {} messages", report.replied(), report.fetched());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 authentication and model-provider credentials
//! - [`circuit_breaker`] - Run-scoped quota breaker
//! - [`classifier`] - Prompting, retry loop and output parsing
//! - [`cli`] - Command-line interface and foreground runs
//! - [`client`] - Gmail API client with retry and timeouts
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases
//! - [`gateway`] - Candidate query and message fetching
//! - [`label_manager`] - Label find-or-create and application
//! - [`llm`] - Completion provider seam
//! - [`models`] - Core data structures
//! - [`orchestrator`] - Per-run pipeline driver
//! - [`reply`] - Reply envelope construction and sending
//! - [`retry`] - Retry schedules
//! - [`server`] - HTTP trigger

pub mod auth;
pub mod circuit_breaker;
pub mod classifier;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod label_manager;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod reply;
pub mod retry;
pub mod server;

// Re-export commonly used types for convenience
pub use error::{GmailError, Result};

// Core data models
pub use models::{ClassificationResult, LabelSpec, MailMessage};

// Config types
pub use config::{
    CircuitBreakerConfig, ClassifierConfig, Config, ExecutionConfig, OrchestratorConfig,
    ScanConfig, ServerConfig,
};

// Client traits
pub use client::{GmailClient, LabelInfo, ProductionGmailClient};

// Pipeline stages
pub use circuit_breaker::{BreakerStats, CircuitState, QuotaBreaker};
pub use classifier::ReplyClassifier;
pub use gateway::MailboxGateway;
pub use label_manager::LabelManager;
pub use llm::{CompletionProvider, OpenAiProvider, ProviderError};
pub use reply::ReplySender;
pub use retry::RetryPolicy;

// Orchestration
pub use orchestrator::{MessageOutcome, MessageState, Orchestrator, RunReport, Stage};
pub use server::{AppState, BatchRunner};

// CLI types (for binary usage)
pub use cli::{Cli, Commands, ProgressReporter};
