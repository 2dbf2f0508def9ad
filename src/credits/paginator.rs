use crate::error::CreditsResult;
use crate::forge::{ContributorRecord, ForgeClient, Page, PageCursor, RateLimit, Repository, Visibility};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;

/// One paged collection on the forge.
#[async_trait]
pub trait PageSource: Send + Sync {
    type Item: Send;

    async fn fetch(&self, cursor: Option<&PageCursor>) -> CreditsResult<Page<Self::Item>>;
}

/// Lazily walks a [`PageSource`], following next cursors until the forge
/// stops handing them out. Items are never inspected. A fresh paginator
/// always starts again from the first page.
pub struct Paginator<S: PageSource> {
    source: S,
    buffered: VecDeque<S::Item>,
    cursor: Option<PageCursor>,
    exhausted: bool,
    pages_fetched: usize,
    last_rate_limit: Option<RateLimit>,
}

impl<S: PageSource> Paginator<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            buffered: VecDeque::new(),
            cursor: None,
            exhausted: false,
            pages_fetched: 0,
            last_rate_limit: None,
        }
    }

    /// Next item, fetching further pages as needed. An error ends the walk at
    /// that point; items handed out before it stay valid.
    pub async fn try_next(&mut self) -> CreditsResult<Option<S::Item>> {
        loop {
            if let Some(item) = self.buffered.pop_front() {
                return Ok(Some(item));
            }
            if self.exhausted {
                return Ok(None);
            }

            let page = match self.source.fetch(self.cursor.as_ref()).await {
                Ok(page) => page,
                Err(e) => {
                    self.exhausted = true;
                    return Err(e);
                }
            };

            self.pages_fetched += 1;
            if page.rate_limit.is_some() {
                self.last_rate_limit = page.rate_limit;
            }
            self.buffered.extend(page.items);
            self.cursor = page.next;
            self.exhausted = self.cursor.is_none();
        }
    }

    pub async fn try_collect(mut self) -> CreditsResult<Vec<S::Item>> {
        let mut items = Vec::new();
        while let Some(item) = self.try_next().await? {
            items.push(item);
        }
        Ok(items)
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Most recent rate-limit counters reported alongside a page.
    pub fn last_rate_limit(&self) -> Option<RateLimit> {
        self.last_rate_limit
    }

    /// True once every page has been fetched and every item handed out.
    pub fn is_finished(&self) -> bool {
        self.exhausted && self.buffered.is_empty()
    }

    /// Items already fetched but not yet handed out. Never fetches.
    pub fn take_buffered(&mut self) -> Vec<S::Item> {
        self.buffered.drain(..).collect()
    }
}

pub struct OrganizationRepositories {
    pub client: Arc<dyn ForgeClient>,
    pub organization: String,
    pub visibility: Visibility,
}

#[async_trait]
impl PageSource for OrganizationRepositories {
    type Item = Repository;

    async fn fetch(&self, cursor: Option<&PageCursor>) -> CreditsResult<Page<Repository>> {
        self.client
            .list_organization_repositories(&self.organization, self.visibility, cursor)
            .await
    }
}

pub struct RepositoryContributors {
    pub client: Arc<dyn ForgeClient>,
    pub repository: Repository,
    pub include_anonymous: bool,
}

#[async_trait]
impl PageSource for RepositoryContributors {
    type Item = ContributorRecord;

    async fn fetch(&self, cursor: Option<&PageCursor>) -> CreditsResult<Page<ContributorRecord>> {
        self.client
            .list_contributors(&self.repository, self.include_anonymous, cursor)
            .await
    }
}
