//! Command-line interface

use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::auth::{self, OpenAiSettings};
use crate::client::{GmailClient, ProductionGmailClient};
use crate::config::Config;
use crate::error::{GmailError, Result};
use crate::llm::OpenAiProvider;
use crate::orchestrator::{
    MessageOutcome, MessageState, Orchestrator, ProgressCallback, RunReport, Stage,
};
use crate::server::{self, AppState};

#[derive(Parser, Debug)]
#[command(name = "gmail-autoreply")]
#[command(version = "0.1.0")]
#[command(about = "Label unread Gmail messages and answer them with a language model", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file
    #[arg(long, default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = ".gmail-autoreply/token.json")]
    pub token_cache: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authenticate with Gmail API
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// Process unread mail once, in the foreground
    Run {
        /// Classify only; no labels are changed and no replies are sent
        #[arg(long)]
        dry_run: bool,
    },

    /// Serve the HTTP trigger (GET /start-gmail)
    Serve {
        /// Address to bind, overrides server.bind
        #[arg(long)]
        bind: Option<String>,
    },

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

/// Truncate a string to max_len characters, adding "..." if truncated
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len.saturating_sub(3)).collect::<String>())
    }
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
    bar_style: ProgressStyle,
}

impl ProgressReporter {
    /// Share a MultiProgress with the log writer so bars and log lines do not tear
    pub fn with_multi_progress(multi: MultiProgress) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        let bar_style = ProgressStyle::default_bar()
            .template("[{elapsed:>6}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
            .unwrap()
            .progress_chars("##-");

        Self {
            multi,
            spinner_style,
            bar_style,
        }
    }

    pub fn multi_progress(&self) -> &MultiProgress {
        &self.multi
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn add_progress_bar(&self, len: u64, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(len));
        pb.set_style(self.bar_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        let _ = self.multi.println(format!("  ✓ {}", msg));
    }
}

/// Human-readable summary of a run
pub fn format_summary(report: &RunReport) -> String {
    let mut out = String::new();

    out.push_str("\n========================================\n");
    if report.dry_run {
        out.push_str("Run Summary (DRY RUN - no labels or replies)\n");
    } else {
        out.push_str("Run Summary\n");
    }
    out.push_str("========================================\n");
    out.push_str(&format!("Run ID: {}\n", report.run_id));
    out.push_str(&format!(
        "Duration: {} minutes {} seconds\n",
        report.duration_seconds() / 60,
        report.duration_seconds() % 60
    ));
    out.push_str(&format!("Messages fetched: {}\n", report.fetched()));
    out.push_str(&format!("Messages labeled: {}\n", report.labeled()));
    out.push_str(&format!("Replies sent: {}\n", report.replied()));
    out.push_str(&format!("Fallback classifications: {}\n", report.degraded()));
    out.push_str(&format!(
        "Failures: classify {}, label {}, reply {}\n",
        report.failures_at(Stage::Classify),
        report.failures_at(Stage::Label),
        report.failures_at(Stage::Reply)
    ));
    if report.breaker.short_circuited > 0 {
        out.push_str(&format!(
            "Quota exceeded: {} messages skipped the model\n",
            report.breaker.short_circuited
        ));
    }

    let breakdown = report.label_breakdown();
    if !breakdown.is_empty() {
        out.push_str("\nLabels:\n");
        for (label, count) in &breakdown {
            out.push_str(&format!("  {:<20} {}\n", truncate_string(label, 20), count));
        }
    }

    let failed: Vec<_> = report
        .outcomes
        .iter()
        .filter(|o| !o.failures.is_empty())
        .collect();
    if !failed.is_empty() {
        out.push_str("\nProblems:\n");
        for outcome in failed {
            for failure in &outcome.failures {
                out.push_str(&format!(
                    "  {} [{}] {}\n",
                    outcome.message_id,
                    failure.stage,
                    truncate_string(&failure.reason, 80)
                ));
            }
        }
    }
    out.push_str("========================================");
    out
}

/// Authenticate both providers and assemble the pipeline
pub async fn build_orchestrator(cli: &Cli, config: Config) -> Result<Orchestrator> {
    let settings = OpenAiSettings::from_env()?;
    auth::load_credentials(&cli.credentials).await?;

    let hub = auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache).await?;
    let client: Arc<dyn GmailClient> = Arc::new(ProductionGmailClient::new(hub));
    let provider = Arc::new(OpenAiProvider::new(
        settings.into_config(),
        config.classifier.model.clone(),
    ));

    Ok(Orchestrator::new(client, provider, config))
}

/// Run one batch in the foreground with a progress bar
pub async fn run_pipeline(cli: &Cli, dry_run: bool, multi: MultiProgress) -> Result<RunReport> {
    let reporter = ProgressReporter::with_multi_progress(multi);

    let config_spinner = reporter.add_spinner("Loading configuration...");
    let mut config = Config::load(&cli.config).await?;
    if dry_run {
        config.execution.dry_run = true;
    }
    reporter.finish_spinner(&config_spinner, &format!("Configuration loaded from {:?}", cli.config));

    let auth_spinner = reporter.add_spinner("Authenticating with Gmail and OpenAI...");
    let orchestrator = build_orchestrator(cli, config).await?;
    reporter.finish_spinner(&auth_spinner, "Providers ready");

    let bar = reporter.add_progress_bar(0, "Processing messages...");
    let bar_for_callback = bar.clone();
    let on_progress: ProgressCallback = Arc::new(move |position: usize, total: usize, outcome: &MessageOutcome| {
        bar_for_callback.set_length(total as u64);
        bar_for_callback.set_position(position as u64);
        let status = match outcome.state() {
            MessageState::Replied => "replied".to_string(),
            MessageState::Failed(stage) => format!("{} failed", stage),
            other => format!("{:?}", other).to_lowercase(),
        };
        bar_for_callback.set_message(format!("{} {}", outcome.message_id, status));
    });

    let report = orchestrator.run_with_progress(Some(on_progress)).await?;
    bar.finish_with_message(format!("Processed {} messages", report.fetched()));

    Ok(report)
}

/// Serve the HTTP trigger until the process exits
pub async fn run_server(cli: &Cli, bind: Option<String>) -> Result<()> {
    let mut config = Config::load(&cli.config).await?;
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    config.validate()?;

    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .map_err(|e| GmailError::ConfigError(format!("Invalid bind address: {}", e)))?;

    let orchestrator = build_orchestrator(cli, config).await?;
    info!("Pipeline ready, waiting for triggers");

    server::serve(addr, AppState::new(Arc::new(orchestrator))).await
}
