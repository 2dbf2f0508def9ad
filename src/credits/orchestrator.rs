use super::paginator::{OrganizationRepositories, Paginator, RepositoryContributors};
use super::progress::{ProgressEvent, ProgressSink};
use super::{Aggregator, ContributorResolver, CreditsReport, RepositoryTally, ResolvedContribution};
use crate::config::CrawlConfig;
use crate::error::CreditsError;
use crate::forge::{ContributorRecord, ForgeClient, RateLimit, Repository, Visibility};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transport,
    Decode,
    RateLimited,
    /// Work dropped because the run was halted before it could start.
    Aborted,
    Internal,
}

impl From<&CreditsError> for FailureKind {
    fn from(err: &CreditsError) -> Self {
        match err {
            CreditsError::Http(_) | CreditsError::Transport { .. } => FailureKind::Transport,
            CreditsError::Decode { .. } => FailureKind::Decode,
            CreditsError::RateLimitExceeded { .. } => FailureKind::RateLimited,
            _ => FailureKind::Internal,
        }
    }
}

/// A unit of work that did not make it into the report. `repository` is
/// `None` when listing the organization itself failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub repository: Option<String>,
    pub subject: String,
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    fn from_error(repository: Option<&str>, subject: &str, err: &CreditsError) -> Self {
        Self {
            repository: repository.map(str::to_string),
            subject: subject.to_string(),
            kind: FailureKind::from(err),
            message: err.to_string(),
        }
    }

    fn aborted(repository: &str, subject: &str) -> Self {
        Self {
            repository: Some(repository.to_string()),
            subject: subject.to_string(),
            kind: FailureKind::Aborted,
            message: "run halted before this lookup started".to_string(),
        }
    }

    fn internal(repository: Option<&str>, subject: &str, message: String) -> Self {
        Self {
            repository: repository.map(str::to_string),
            subject: subject.to_string(),
            kind: FailureKind::Internal,
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Completion {
    Complete,
    Cancelled,
    DeadlineExceeded,
    RateLimited {
        reset_at: Option<DateTime<Utc>>,
        retry_after_seconds: Option<u64>,
    },
}

/// Outcome of one run. Every started repository has a tally in the report,
/// partial when its listing failed or the run halted underway; the matching
/// `failures` entries say what is missing. Repositories never started are
/// listed in `skipped`.
#[derive(Debug, Clone, Serialize)]
pub struct CreditsRun {
    pub organization: String,
    pub report: CreditsReport,
    pub failures: Vec<Failure>,
    /// Repositories discovered but never started.
    pub skipped: Vec<String>,
    pub completion: Completion,
    pub rate_limit: Option<RateLimit>,
}

impl CreditsRun {
    pub fn is_complete(&self) -> bool {
        self.completion == Completion::Complete && self.failures.is_empty()
    }
}

struct RunContext {
    client: Arc<dyn ForgeClient>,
    resolver: ContributorResolver,
    lookups: Arc<Semaphore>,
    cancel: CancellationToken,
    halted: Mutex<Option<Completion>>,
    deadline_hit: AtomicBool,
    rate_limit: Mutex<Option<RateLimit>>,
    progress: ProgressSink,
}

impl RunContext {
    fn is_halted(&self) -> bool {
        self.halted.lock().map(|h| h.is_some()).unwrap_or(true)
    }

    /// Stops the whole run after the forge refused us; first signal wins.
    fn halt_on_rate_limit(&self, err: &CreditsError) {
        if let CreditsError::RateLimitExceeded {
            reset_at,
            retry_after_seconds,
            ..
        } = err
        {
            if let Ok(mut halted) = self.halted.lock() {
                if halted.is_none() {
                    warn!("Forge rate limit exhausted, halting run: {}", err);
                    *halted = Some(Completion::RateLimited {
                        reset_at: *reset_at,
                        retry_after_seconds: *retry_after_seconds,
                    });
                }
            }
            self.cancel.cancel();
        }
    }

    /// Keeps the most recent counters; responses of concurrent requests can
    /// arrive out of order.
    fn observe_rate_limit(&self, observed: Option<RateLimit>) {
        let Some(observed) = observed else { return };
        if let Ok(mut current) = self.rate_limit.lock() {
            if current.map_or(true, |seen| observed.supersedes(&seen)) {
                *current = Some(observed);
            }
        }
        debug!(remaining = observed.remaining, limit = observed.limit, "Rate limit");
        self.progress.emit(ProgressEvent::RateLimitObserved(observed));
    }
}

struct RepositoryOutcome {
    name: String,
    tally: Option<RepositoryTally>,
    failures: Vec<Failure>,
}

/// Fans work out per repository and, inside each repository, per contributor
/// record, then joins everything before handing back the report.
pub struct CreditsOrchestrator {
    client: Arc<dyn ForgeClient>,
    crawl: CrawlConfig,
    cancel: CancellationToken,
    progress: ProgressSink,
}

impl CreditsOrchestrator {
    pub fn new(client: Arc<dyn ForgeClient>, crawl: CrawlConfig) -> Self {
        Self {
            client,
            crawl,
            cancel: CancellationToken::new(),
            progress: ProgressSink::default(),
        }
    }

    /// Cancelling `token` stops new repositories from starting; repositories
    /// already underway still drain.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_progress(mut self, sender: UnboundedSender<ProgressEvent>) -> Self {
        self.progress = ProgressSink::new(sender);
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(&self, organization: &str) -> CreditsRun {
        let run_token = self.cancel.child_token();
        let ctx = Arc::new(RunContext {
            client: Arc::clone(&self.client),
            resolver: ContributorResolver::new(Arc::clone(&self.client)),
            lookups: Arc::new(Semaphore::new(self.crawl.max_concurrent_lookups.max(1))),
            cancel: run_token.clone(),
            halted: Mutex::new(None),
            deadline_hit: AtomicBool::new(false),
            rate_limit: Mutex::new(None),
            progress: self.progress.clone(),
        });

        let deadline = self.crawl.deadline().map(|limit| {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(limit) => {
                        warn!("Run deadline of {:?} reached, no further repositories will start", limit);
                        ctx.deadline_hit.store(true, Ordering::SeqCst);
                        ctx.cancel.cancel();
                    }
                    _ = ctx.cancel.cancelled() => {}
                }
            })
        });

        info!("Collecting credits for organization {}", organization);

        let repository_slots = Arc::new(Semaphore::new(self.crawl.max_concurrent_repositories.max(1)));
        let mut repositories = Paginator::new(OrganizationRepositories {
            client: Arc::clone(&self.client),
            organization: organization.to_string(),
            visibility: Visibility::Public,
        });
        let mut units = JoinSet::new();
        let mut failures = Vec::new();
        let mut skipped = Vec::new();
        let mut interrupted = false;

        loop {
            let repository = match repositories.try_next().await {
                Ok(Some(repository)) => repository,
                Ok(None) => break,
                Err(e) => {
                    warn!("Listing repositories of {} failed: {}", organization, e);
                    ctx.halt_on_rate_limit(&e);
                    failures.push(Failure::from_error(None, organization, &e));
                    break;
                }
            };
            ctx.observe_rate_limit(repositories.last_rate_limit());
            ctx.progress.emit(ProgressEvent::RepositoryDiscovered {
                repository: repository.name.clone(),
            });

            let permit = if ctx.cancel.is_cancelled() {
                None
            } else {
                tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => None,
                    permit = Arc::clone(&repository_slots).acquire_owned() => permit.ok(),
                }
            };
            let Some(permit) = permit else {
                skipped.push(repository.name);
                // the rest of the current page was discovered too
                for repository in repositories.take_buffered() {
                    ctx.progress.emit(ProgressEvent::RepositoryDiscovered {
                        repository: repository.name.clone(),
                    });
                    skipped.push(repository.name);
                }
                interrupted = true;
                break;
            };

            debug!(repo = %repository.name, "Starting repository");
            let ctx = Arc::clone(&ctx);
            units.spawn(async move {
                let outcome = process_repository(ctx, repository).await;
                drop(permit);
                outcome
            });
        }

        let mut report = CreditsReport::new();
        while let Some(joined) = units.join_next().await {
            match joined {
                Ok(outcome) => {
                    failures.extend(outcome.failures);
                    if let Some(tally) = outcome.tally {
                        report.insert(outcome.name, tally);
                    }
                }
                Err(e) => {
                    warn!("Repository task failed to join: {}", e);
                    failures.push(Failure::internal(None, organization, e.to_string()));
                }
            }
        }

        if let Some(deadline) = deadline {
            deadline.abort();
        }

        let halted = ctx.halted.lock().ok().and_then(|h| h.clone());
        let completion = match halted {
            Some(completion) => completion,
            None if interrupted && ctx.deadline_hit.load(Ordering::SeqCst) => {
                Completion::DeadlineExceeded
            }
            None if interrupted => Completion::Cancelled,
            None => Completion::Complete,
        };
        let rate_limit = ctx.rate_limit.lock().ok().and_then(|r| *r);

        info!(
            "Credits for {} collected: {} repositories, {} failures, {} skipped ({:?})",
            organization,
            report.len(),
            failures.len(),
            skipped.len(),
            completion
        );

        CreditsRun {
            organization: organization.to_string(),
            report,
            failures,
            skipped,
            completion,
            rate_limit,
        }
    }
}

/// One repository's unit of work: walk its contributors, resolve each record
/// in its own task and fold the results into the repository's tally. Returns
/// only after every spawned lookup has finished.
async fn process_repository(ctx: Arc<RunContext>, repository: Repository) -> RepositoryOutcome {
    let name = repository.name.clone();
    let aggregator = Aggregator::spawn(&name);
    let mut contributors = Paginator::new(RepositoryContributors {
        client: Arc::clone(&ctx.client),
        repository: repository.clone(),
        include_anonymous: true,
    });
    let repository = Arc::new(repository);
    let mut lookups = JoinSet::new();
    let mut failures = Vec::new();
    let mut records = 0usize;

    loop {
        if ctx.is_halted() && !contributors.is_finished() {
            failures.push(Failure::aborted(&name, "contributors"));
            break;
        }

        let record = match contributors.try_next().await {
            Ok(Some(record)) => record,
            Ok(None) => break,
            Err(e) => {
                warn!(repo = %name, "Listing contributors failed: {}", e);
                ctx.halt_on_rate_limit(&e);
                failures.push(Failure::from_error(Some(&name), "contributors", &e));
                break;
            }
        };
        records += 1;

        let ctx = Arc::clone(&ctx);
        let repository = Arc::clone(&repository);
        let sender = aggregator.sender();
        lookups.spawn(async move {
            resolve_record(&ctx, &repository, &record)
                .await
                .map(|resolved| {
                    sender.send(resolved);
                })
        });
    }
    ctx.observe_rate_limit(contributors.last_rate_limit());

    while let Some(joined) = lookups.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(failure)) => failures.push(failure),
            Err(e) => failures.push(Failure::internal(Some(&name), "lookup", e.to_string())),
        }
    }

    let tally = match aggregator.finish().await {
        Ok(tally) => Some(tally),
        Err(e) => {
            failures.push(Failure::internal(Some(&name), "tally", e.to_string()));
            None
        }
    };

    if let Some(tally) = &tally {
        info!(
            "Done processing {} contributor records for {} ({} credited)",
            records,
            name,
            tally.len()
        );
        ctx.progress.emit(ProgressEvent::RepositoryFinished {
            repository: name.clone(),
            entries: tally.len(),
            contributions: tally.total_contributions(),
        });
    }

    RepositoryOutcome {
        name,
        tally,
        failures,
    }
}

async fn resolve_record(
    ctx: &RunContext,
    repository: &Repository,
    record: &ContributorRecord,
) -> Result<ResolvedContribution, Failure> {
    let subject = record.label();
    let _permit = match Arc::clone(&ctx.lookups).acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return Err(Failure::aborted(&repository.name, subject)),
    };
    if ctx.is_halted() {
        return Err(Failure::aborted(&repository.name, subject));
    }

    match ctx.resolver.resolve(repository, record).await {
        Ok(lookup) => {
            ctx.observe_rate_limit(lookup.rate_limit);
            let resolved = lookup.value;
            ctx.progress.emit(ProgressEvent::ContributorResolved {
                repository: repository.name.clone(),
                key: resolved.attribution.to_string(),
                contributions: resolved.contributions,
            });
            Ok(resolved)
        }
        Err(e) => {
            debug!(repo = %repository.name, subject = %subject, "Resolution failed: {}", e);
            ctx.halt_on_rate_limit(&e);
            ctx.progress.emit(ProgressEvent::ContributorFailed {
                repository: repository.name.clone(),
                subject: subject.to_string(),
                message: e.to_string(),
            });
            Err(Failure::from_error(Some(&repository.name), subject, &e))
        }
    }
}
