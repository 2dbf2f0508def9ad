use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub mod orchestrator;
pub mod paginator;
pub mod progress;
pub mod resolver;
pub mod tally;

#[cfg(test)]
pub(crate) mod testing;

pub use orchestrator::{Completion, CreditsOrchestrator, CreditsRun, Failure, FailureKind};
pub use paginator::{PageSource, Paginator};
pub use progress::ProgressEvent;
pub use resolver::ContributorResolver;
pub use tally::{Aggregator, RepositoryTally, TallyEntry, TallySender};

/// Who a contribution is credited to. Accounts are keyed by login; emails
/// not linked to any account form their own bucket so they never vanish
/// from the report.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Attribution {
    Account(String),
    Unattributed(String),
}

impl Attribution {
    /// Email buckets are case-insensitive.
    pub fn unattributed(email: &str) -> Self {
        Attribution::Unattributed(email.trim().to_lowercase())
    }

    pub fn identity(&self) -> Option<&str> {
        match self {
            Attribution::Account(login) => Some(login),
            Attribution::Unattributed(_) => None,
        }
    }

    pub fn email(&self) -> Option<&str> {
        match self {
            Attribution::Account(_) => None,
            Attribution::Unattributed(email) => Some(email),
        }
    }
}

impl fmt::Display for Attribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // logins never contain '@', so the two namespaces cannot collide
        match self {
            Attribution::Account(login) => f.write_str(login),
            Attribution::Unattributed(email) => f.write_str(email),
        }
    }
}

/// Where a display name came from, least to most authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NameSource {
    Fallback,
    Commit,
    Profile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedContribution {
    pub attribution: Attribution,
    pub display_name: String,
    pub contributions: u64,
    pub name_source: NameSource,
}

impl ResolvedContribution {
    pub fn identity(&self) -> Option<&str> {
        self.attribution.identity()
    }
}

/// Repository name to tally. Only ever grows during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CreditsReport {
    repositories: BTreeMap<String, RepositoryTally>,
}

impl CreditsReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, repository: String, tally: RepositoryTally) {
        self.repositories.insert(repository, tally);
    }

    pub fn get(&self, repository: &str) -> Option<&RepositoryTally> {
        self.repositories.get(repository)
    }

    pub fn contains(&self, repository: &str) -> bool {
        self.repositories.contains_key(repository)
    }

    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RepositoryTally)> {
        self.repositories.iter()
    }

    pub fn repository_names(&self) -> Vec<&str> {
        self.repositories.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unattributed_emails_are_normalized() {
        assert_eq!(
            Attribution::unattributed(" Ghost@Example.COM "),
            Attribution::Unattributed("ghost@example.com".to_string())
        );
        assert_eq!(Attribution::unattributed("a@b.c").identity(), None);
        assert_eq!(Attribution::unattributed("a@b.c").email(), Some("a@b.c"));
    }

    #[test]
    fn report_keeps_repositories_apart() {
        let mut a = RepositoryTally::new();
        a.merge(ResolvedContribution {
            attribution: Attribution::Account("ana".to_string()),
            display_name: "Ana".to_string(),
            contributions: 5,
            name_source: NameSource::Profile,
        });
        a.merge(ResolvedContribution {
            attribution: Attribution::unattributed("x@y.z"),
            display_name: "x".to_string(),
            contributions: 9,
            name_source: NameSource::Commit,
        });
        let mut b = RepositoryTally::new();
        b.merge(ResolvedContribution {
            attribution: Attribution::Account("ana".to_string()),
            display_name: "Ana".to_string(),
            contributions: 2,
            name_source: NameSource::Profile,
        });

        let mut report = CreditsReport::new();
        report.insert("a".to_string(), a);
        report.insert("b".to_string(), b);
        report.insert("c".to_string(), RepositoryTally::new());

        assert_eq!(report.repository_names(), vec!["a", "b", "c"]);
        assert_eq!(report.get("a").unwrap().get_login("ana").unwrap().total_contributions, 5);
        assert_eq!(report.get("b").unwrap().get_login("ana").unwrap().total_contributions, 2);
        assert_eq!(report.get("a").unwrap().unattributed_count(), 1);
        assert!(report.get("c").unwrap().is_empty());
    }
}
