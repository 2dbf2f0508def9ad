//! In-memory forge used by the engine's unit tests.

use crate::error::{CreditsError, CreditsResult};
use crate::forge::*;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const PROFILE_BASE: &str = "https://forge.test/users/";

#[derive(Default)]
pub struct FakeForge {
    repository_pages: Vec<Vec<Repository>>,
    contributors: HashMap<String, Vec<Vec<ContributorRecord>>>,
    commits: HashMap<(String, String), Vec<CommitSummary>>,
    profiles: HashMap<String, AccountProfile>,
    failing_commits: HashSet<String>,
    failing_contributors: HashSet<String>,
    rate_limited_commits: HashSet<String>,
    cancel_on_repository_page: Option<(usize, CancellationToken)>,
    lookup_delay: Duration,
    listing_delays: HashMap<String, Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    started_repositories: Mutex<Vec<String>>,
}

impl FakeForge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(login: &str, contributions: u64) -> ContributorRecord {
        ContributorRecord::Named {
            login: login.to_string(),
            profile_url: format!("{}{}", PROFILE_BASE, login),
            contributions,
        }
    }

    pub fn anonymous(email: &str, name: Option<&str>, contributions: u64) -> ContributorRecord {
        ContributorRecord::Anonymous {
            email: email.to_string(),
            name: name.map(str::to_string),
            contributions,
        }
    }

    pub fn with_repository_page(mut self, names: &[&str]) -> Self {
        self.repository_pages
            .push(names.iter().map(|n| Repository::new("acme", n)).collect());
        self
    }

    pub fn with_contributors(mut self, repo: &str, records: Vec<ContributorRecord>) -> Self {
        self.contributors
            .entry(repo.to_string())
            .or_default()
            .push(records);
        self
    }

    pub fn with_commits(mut self, repo: &str, email: &str, commits: Vec<CommitSummary>) -> Self {
        self.commits
            .insert((repo.to_string(), email.to_string()), commits);
        self
    }

    pub fn with_profile(mut self, login: &str, name: Option<&str>) -> Self {
        self.profiles.insert(
            format!("{}{}", PROFILE_BASE, login),
            AccountProfile {
                login: login.to_string(),
                name: name.map(str::to_string),
            },
        );
        self
    }

    pub fn failing_commits_for(mut self, email: &str) -> Self {
        self.failing_commits.insert(email.to_string());
        self
    }

    pub fn failing_contributors_for(mut self, repo: &str) -> Self {
        self.failing_contributors.insert(repo.to_string());
        self
    }

    pub fn rate_limited_commits_for(mut self, email: &str) -> Self {
        self.rate_limited_commits.insert(email.to_string());
        self
    }

    /// Cancels `token` when the repository page with index `page` is requested.
    pub fn cancel_on_repository_page(mut self, page: usize, token: CancellationToken) -> Self {
        self.cancel_on_repository_page = Some((page, token));
        self
    }

    pub fn with_lookup_delay(mut self, delay: Duration) -> Self {
        self.lookup_delay = delay;
        self
    }

    /// Counters attached to every commit and profile lookup.
    pub fn lookup_rate_limit() -> RateLimit {
        RateLimit {
            remaining: 3990,
            limit: 5000,
            reset_at: None,
        }
    }

    /// Delays the first contributor page of `repo`.
    pub fn with_listing_delay(mut self, repo: &str, delay: Duration) -> Self {
        self.listing_delays.insert(repo.to_string(), delay);
        self
    }

    pub fn peak_concurrent_lookups(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn started_repositories(&self) -> Vec<String> {
        self.started_repositories
            .lock()
            .map(|started| started.clone())
            .unwrap_or_default()
    }

    async fn track_lookup(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.lookup_delay.is_zero() {
            tokio::time::sleep(self.lookup_delay).await;
        } else {
            tokio::task::yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn not_found(url: String) -> CreditsError {
        CreditsError::Transport {
            status: 404,
            url,
            message: "Not Found".to_string(),
        }
    }
}

fn page_index(cursor: Option<&PageCursor>) -> usize {
    cursor.and_then(|c| c.as_str().parse().ok()).unwrap_or(0)
}

fn page_of<T: Clone>(pages: &[Vec<T>], index: usize) -> Page<T> {
    let items = pages.get(index).cloned().unwrap_or_default();
    let next = (index + 1 < pages.len()).then(|| PageCursor((index + 1).to_string()));
    Page {
        items,
        next,
        rate_limit: Some(RateLimit {
            remaining: 4000,
            limit: 5000,
            reset_at: None,
        }),
    }
}

#[async_trait]
impl ForgeClient for FakeForge {
    async fn list_organization_repositories(
        &self,
        _organization: &str,
        _visibility: Visibility,
        cursor: Option<&PageCursor>,
    ) -> CreditsResult<Page<Repository>> {
        let index = page_index(cursor);
        if let Some((page, token)) = &self.cancel_on_repository_page {
            if *page == index {
                token.cancel();
            }
        }
        Ok(page_of(&self.repository_pages, index))
    }

    async fn list_contributors(
        &self,
        repository: &Repository,
        _include_anonymous: bool,
        cursor: Option<&PageCursor>,
    ) -> CreditsResult<Page<ContributorRecord>> {
        let index = page_index(cursor);
        if index == 0 {
            if let Ok(mut started) = self.started_repositories.lock() {
                started.push(repository.name.clone());
            }
            if let Some(delay) = self.listing_delays.get(&repository.name) {
                tokio::time::sleep(*delay).await;
            }
        }
        if self.failing_contributors.contains(&repository.name) {
            return Err(Self::not_found(format!("{}/contributors", repository.full_name)));
        }
        let pages = self
            .contributors
            .get(&repository.name)
            .map(Vec::as_slice)
            .unwrap_or_default();
        Ok(page_of(pages, index))
    }

    async fn list_commits(
        &self,
        repository: &Repository,
        author_email: &str,
        limit: u32,
    ) -> CreditsResult<Lookup<Vec<CommitSummary>>> {
        self.track_lookup().await;
        if self.rate_limited_commits.contains(author_email) {
            return Err(CreditsError::RateLimitExceeded {
                limit: Some(60),
                reset_at: None,
                retry_after_seconds: None,
            });
        }
        if self.failing_commits.contains(author_email) {
            return Err(CreditsError::Transport {
                status: 502,
                url: format!("{}/commits", repository.full_name),
                message: "Bad Gateway".to_string(),
            });
        }
        let commits = self
            .commits
            .get(&(repository.name.clone(), author_email.to_string()))
            .cloned()
            .unwrap_or_default();
        Ok(Lookup {
            value: commits.into_iter().take(limit as usize).collect(),
            rate_limit: Some(Self::lookup_rate_limit()),
        })
    }

    async fn get_account_profile(&self, profile_url: &str) -> CreditsResult<Lookup<AccountProfile>> {
        self.track_lookup().await;
        let profile = self
            .profiles
            .get(profile_url)
            .cloned()
            .ok_or_else(|| Self::not_found(profile_url.to_string()))?;
        Ok(Lookup {
            value: profile,
            rate_limit: Some(Self::lookup_rate_limit()),
        })
    }
}
