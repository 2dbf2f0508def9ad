use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use creditroll::credits::ProgressEvent;
use creditroll::output::Reporter;
use creditroll::{Config, Credentials, CreditsOrchestrator, GitHubClient};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Organization whose public repositories are credited
    #[arg(long)]
    org: String,

    /// Forge token; read from the token file when absent
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// File holding the forge token on its first line
    #[arg(long)]
    token_file: Option<PathBuf>,

    /// Output format (text, json)
    #[arg(short, long)]
    format: Option<String>,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<String>,

    /// Items requested per page (max 100)
    #[arg(long)]
    page_size: Option<u32>,

    /// Repositories processed at the same time
    #[arg(long)]
    repo_concurrency: Option<usize>,

    /// Contributor lookups in flight at the same time, across all repositories
    #[arg(long)]
    lookup_concurrency: Option<usize>,

    /// Stop starting new repositories after this many seconds
    #[arg(long)]
    deadline: Option<u64>,

    /// Configuration file (defaults to ./creditroll.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(path) = &self.token_file {
            config.forge.token_file = path.clone();
        }
        if let Some(format) = &self.format {
            config.output.format = format.clone();
        }
        if let Some(output) = &self.output {
            config.output.path = Some(PathBuf::from(output));
        }
        if let Some(page_size) = self.page_size {
            config.crawl.page_size = page_size;
        }
        if let Some(n) = self.repo_concurrency {
            config.crawl.max_concurrent_repositories = n;
        }
        if let Some(n) = self.lookup_concurrency {
            config.crawl.max_concurrent_lookups = n;
        }
        if let Some(secs) = self.deadline {
            config.crawl.deadline_secs = Some(secs);
        }
        if self.no_color {
            config.output.color = false;
        }
    }
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} repositories {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("#>-");
    pb.set_style(style);
    pb
}

/// Renders engine progress until the orchestrator drops its sender.
async fn render_progress(mut events: mpsc::UnboundedReceiver<ProgressEvent>, pb: ProgressBar) {
    let mut resolved = 0u64;
    let mut rate = String::new();
    while let Some(event) = events.recv().await {
        match event {
            ProgressEvent::RepositoryDiscovered { .. } => pb.inc_length(1),
            ProgressEvent::RepositoryFinished { .. } => pb.inc(1),
            ProgressEvent::ContributorResolved { .. } => resolved += 1,
            ProgressEvent::ContributorFailed {
                repository,
                subject,
                message,
            } => {
                pb.suspend(|| warn!("{}: could not resolve {}: {}", repository, subject, message));
            }
            ProgressEvent::RateLimitObserved(rate_limit) => {
                rate = format!(", rate limit {}/{}", rate_limit.remaining, rate_limit.limit);
            }
        }
        pb.set_message(format!("({} contributors resolved{})", resolved, rate));
    }
    pb.finish_and_clear();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply(&mut config);

    eprintln!(
        "{}",
        "CreditRoll - Organization Contributor Credits"
            .bright_cyan()
            .bold()
    );
    eprintln!("Organization: {}", cli.org.bright_white());

    let credentials = Credentials::resolve(cli.token.as_deref(), &config.forge.token_file);
    if !credentials.is_authenticated() {
        info!("No forge token configured, using unauthenticated rate limits");
    }

    let client = GitHubClient::new(
        &config.forge,
        &credentials,
        config.crawl.effective_page_size(),
    )
    .context("Failed to build forge client")?;

    let token = CancellationToken::new();
    let ctrl_c = {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, finishing repositories already in progress");
                token.cancel();
            }
        })
    };

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let progress = tokio::spawn(render_progress(events_rx, progress_bar()));

    let orchestrator = CreditsOrchestrator::new(Arc::new(client), config.crawl.clone())
        .with_cancellation(token)
        .with_progress(events_tx);
    let run = orchestrator.run(&cli.org).await;
    drop(orchestrator);
    ctrl_c.abort();
    let _ = progress.await;

    let output_path = config
        .output
        .path
        .as_ref()
        .map(|path| path.display().to_string());
    let reporter = Reporter::new(&config.output.format, output_path.as_deref(), config.output.color);
    reporter
        .generate_report(&run)
        .context("Failed to write credits report")?;

    if run.is_complete() {
        eprintln!("\n{}", "Credits complete!".bright_green().bold());
        Ok(())
    } else {
        anyhow::bail!(
            "credits for {} are incomplete ({:?}, {} failures, {} repositories not started)",
            run.organization,
            run.completion,
            run.failures.len(),
            run.skipped.len()
        )
    }
}
