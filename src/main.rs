use anyhow::Result;
use clap::Parser;
use gmail_autoreply::cli::{self, Cli, Commands};
use gmail_autoreply::config::Config;
use gmail_autoreply::error::GmailError;
use indicatif::MultiProgress;
use std::io::Write;
use std::process;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Log sink that prints above the progress bars
///
/// tracing asks for a fresh writer per event, so each one owns its buffer
/// and hands the finished line to `MultiProgress::println` when dropped.
#[derive(Clone)]
struct ProgressLogSink {
    multi: Arc<MultiProgress>,
}

struct ProgressLogLine {
    multi: Arc<MultiProgress>,
    line: Vec<u8>,
}

impl<'a> MakeWriter<'a> for ProgressLogSink {
    type Writer = ProgressLogLine;

    fn make_writer(&'a self) -> Self::Writer {
        ProgressLogLine {
            multi: Arc::clone(&self.multi),
            line: Vec::with_capacity(128),
        }
    }
}

impl Write for ProgressLogLine {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.line.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let text = String::from_utf8_lossy(&self.line);
        let text = text.trim_end_matches('\n');
        if !text.is_empty() {
            self.multi.println(text)?;
        }
        self.line.clear();
        Ok(())
    }
}

impl Drop for ProgressLogLine {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        display_error(&e);
        eprintln!("\nFor help, run: gmail-autoreply --help");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Dependencies pull in more than one rustls crypto provider; pick one explicitly.
    // aws-lc-rs everywhere except Windows, where ring avoids the NASM/CMake toolchain.
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    // Missing .env is fine; variables may come from the real environment
    let _ = dotenv::dotenv();

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_autoreply=debug,info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_autoreply=info,warn,error"))
    };

    let multi_progress = Arc::new(MultiProgress::new());
    let log_sink = ProgressLogSink {
        multi: Arc::clone(&multi_progress),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(log_sink)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    match cli.command {
        Commands::Auth { force } => {
            tracing::info!("Authenticating with Gmail API...");

            if force && gmail_autoreply::auth::clear_token_cache(&cli.token_cache).await? {
                tracing::info!("Removed existing token cache");
            }

            let hub =
                gmail_autoreply::auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache)
                    .await?;

            println!("Successfully authenticated with Gmail API");
            println!("Token cached at: {:?}", cli.token_cache);

            // Scope must match the cached token or a second OAuth flow starts
            let (_, profile) = hub
                .users()
                .get_profile("me")
                .add_scope("https://www.googleapis.com/auth/gmail.modify")
                .doit()
                .await?;
            println!(
                "Connected to account: {}",
                profile.email_address.unwrap_or_default()
            );

            Ok(())
        }

        Commands::Run { dry_run } => {
            if dry_run {
                println!("Running in DRY RUN mode - no labels or replies will be written");
            }

            let report = cli::run_pipeline(&cli, dry_run, (*multi_progress).clone()).await?;
            println!("{}", cli::format_summary(&report));

            Ok(())
        }

        Commands::Serve { ref bind } => {
            cli::run_server(&cli, bind.clone()).await?;
            Ok(())
        }

        Commands::InitConfig { ref output, force } => {
            if output.exists() && !force {
                return Err(GmailError::ConfigError(format!(
                    "Configuration file already exists at {:?}. Use --force to overwrite.",
                    output
                ))
                .into());
            }

            Config::create_example(output).await?;

            println!("Created example configuration file at: {:?}", output);
            println!("\nKey settings to review:");
            println!("  - scan.window_days: How far back to look for unread mail");
            println!("  - classifier.signature: Name used to sign replies");
            println!("  - orchestrator.inter_item_delay_secs: Pause between messages");
            println!("  - server.bind: Address for the /start-gmail trigger");
            println!("\nSet OPENAI_API_KEY in the environment or a .env file.");

            Ok(())
        }
    }
}

/// Display error with context
fn display_error(error: &anyhow::Error) {
    eprintln!("Error: {}", error);

    let mut cause = error.source();
    while let Some(e) = cause {
        eprintln!("  Caused by: {}", e);
        cause = e.source();
    }

    if let Some(gmail_err) = error.downcast_ref::<GmailError>() {
        match gmail_err {
            GmailError::AuthError(_) => {
                eprintln!("\nHint: Make sure your credentials.json file is valid.");
                eprintln!("      Try running: gmail-autoreply auth --force");
            }
            GmailError::FetchFailed(_) => {
                eprintln!("\nHint: The mailbox could not be read; no messages were touched.");
            }
            GmailError::ConfigError(_) => {
                eprintln!("\nHint: Check your configuration file and environment.");
                eprintln!("      Run: gmail-autoreply init-config --force");
            }
            _ => {}
        }
    }
}
