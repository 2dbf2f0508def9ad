use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod credentials;
pub mod github;
pub mod links;

pub use credentials::Credentials;
pub use github::GitHubClient;

use crate::error::CreditsResult;

/// Read-only view of the code forge. Every listing is paged; callers hand
/// back the cursor from the previous page to continue.
#[async_trait]
pub trait ForgeClient: Send + Sync {
    async fn list_organization_repositories(
        &self,
        organization: &str,
        visibility: Visibility,
        cursor: Option<&PageCursor>,
    ) -> CreditsResult<Page<Repository>>;

    async fn list_contributors(
        &self,
        repository: &Repository,
        include_anonymous: bool,
        cursor: Option<&PageCursor>,
    ) -> CreditsResult<Page<ContributorRecord>>;

    async fn list_commits(
        &self,
        repository: &Repository,
        author_email: &str,
        limit: u32,
    ) -> CreditsResult<Lookup<Vec<CommitSummary>>>;

    async fn get_account_profile(&self, profile_url: &str) -> CreditsResult<Lookup<AccountProfile>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
    All,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::All => "all",
        }
    }
}

/// Opaque continuation token. For GitHub this is the absolute `rel="next"` URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageCursor(pub String);

impl PageCursor {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub remaining: u64,
    pub limit: u64,
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateLimit {
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Whether these counters are more recent than `other`. A later reset is
    /// a newer window; within one window the remaining budget only shrinks.
    pub fn supersedes(&self, other: &RateLimit) -> bool {
        (self.reset_at, std::cmp::Reverse(self.remaining))
            > (other.reset_at, std::cmp::Reverse(other.remaining))
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<PageCursor>,
    pub rate_limit: Option<RateLimit>,
}

/// A non-paged response together with the rate-limit counters it carried.
#[derive(Debug, Clone)]
pub struct Lookup<T> {
    pub value: T,
    pub rate_limit: Option<RateLimit>,
}

impl<T> Lookup<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        Lookup {
            value: f(self.value),
            rate_limit: self.rate_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub full_name: String,
    pub owner: Owner,
}

impl Repository {
    pub fn new(owner: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            full_name: format!("{}/{}", owner, name),
            owner: Owner {
                login: owner.to_string(),
            },
        }
    }
}

/// One entry of a repository's contributor listing. GitHub only links the
/// first few hundred author emails to accounts; the rest come back as
/// anonymous entries carrying nothing but the email and the commit name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContributorRecord {
    #[serde(rename = "User", alias = "Bot")]
    Named {
        login: String,
        #[serde(rename = "url")]
        profile_url: String,
        contributions: u64,
    },
    Anonymous {
        email: String,
        #[serde(default)]
        name: Option<String>,
        contributions: u64,
    },
}

impl ContributorRecord {
    pub fn contributions(&self) -> u64 {
        match self {
            ContributorRecord::Named { contributions, .. }
            | ContributorRecord::Anonymous { contributions, .. } => *contributions,
        }
    }

    /// Login for named records, email for anonymous ones.
    pub fn label(&self) -> &str {
        match self {
            ContributorRecord::Named { login, .. } => login,
            ContributorRecord::Anonymous { email, .. } => email,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, ContributorRecord::Anonymous { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub sha: String,
    pub commit: CommitDetail,
    /// Null when the commit email is not linked to any account.
    pub author: Option<Owner>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitDetail {
    pub author: Option<GitSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSignature {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProfile {
    pub login: String,
    #[serde(default)]
    pub name: Option<String>,
}
