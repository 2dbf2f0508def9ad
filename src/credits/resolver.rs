use super::{Attribution, NameSource, ResolvedContribution};
use crate::error::CreditsResult;
use crate::forge::links::login_from_noreply_email;
use crate::forge::{CommitSummary, ContributorRecord, ForgeClient, Lookup, Repository};
use std::sync::Arc;
use tracing::debug;

/// Turns raw contributor records into attributed contributions. Holds no
/// state besides the client, so concurrent resolutions never interfere.
#[derive(Clone)]
pub struct ContributorResolver {
    client: Arc<dyn ForgeClient>,
}

impl ContributorResolver {
    pub fn new(client: Arc<dyn ForgeClient>) -> Self {
        Self { client }
    }

    /// Resolves one record. The returned rate limit is the one reported by
    /// the secondary lookup the record needed.
    pub async fn resolve(
        &self,
        repository: &Repository,
        record: &ContributorRecord,
    ) -> CreditsResult<Lookup<ResolvedContribution>> {
        match record {
            ContributorRecord::Named {
                login,
                profile_url,
                contributions,
            } => self.resolve_named(login, profile_url, *contributions).await,
            ContributorRecord::Anonymous {
                email,
                name,
                contributions,
            } => {
                self.resolve_anonymous(repository, email, name.as_deref(), *contributions)
                    .await
            }
        }
    }

    /// The contributor listing omits display names, so each named record
    /// costs one profile fetch.
    async fn resolve_named(
        &self,
        login: &str,
        profile_url: &str,
        contributions: u64,
    ) -> CreditsResult<Lookup<ResolvedContribution>> {
        let profile = self.client.get_account_profile(profile_url).await?;
        Ok(profile.map(|profile| {
            let (display_name, name_source) = match non_empty(profile.name.as_deref()) {
                Some(name) => (name.to_string(), NameSource::Profile),
                None => (login.to_string(), NameSource::Fallback),
            };
            ResolvedContribution {
                attribution: Attribution::Account(login.to_string()),
                display_name,
                contributions,
                name_source,
            }
        }))
    }

    async fn resolve_anonymous(
        &self,
        repository: &Repository,
        email: &str,
        name: Option<&str>,
        contributions: u64,
    ) -> CreditsResult<Lookup<ResolvedContribution>> {
        let Lookup {
            value: commits,
            rate_limit,
        } = self.client.list_commits(repository, email, 1).await?;
        let resolved = |attribution: Attribution, (display_name, name_source): (String, NameSource)| Lookup {
            value: ResolvedContribution {
                attribution,
                display_name,
                contributions,
                name_source,
            },
            rate_limit,
        };

        if let Some((login, author_name)) = commits.first().and_then(linked_author) {
            debug!(
                repo = %repository.name,
                email = %email,
                login = %login,
                "Deanonymized contributor via commit"
            );
            let recorded = non_empty(author_name).or_else(|| non_empty(name));
            return Ok(resolved(
                Attribution::Account(login.to_string()),
                named_or(recorded, login),
            ));
        }

        if let Some(login) = login_from_noreply_email(email) {
            debug!(
                repo = %repository.name,
                email = %email,
                login = %login,
                "Deanonymized contributor via noreply address"
            );
            let named = named_or(non_empty(name), &login);
            return Ok(resolved(Attribution::Account(login), named));
        }

        debug!(repo = %repository.name, email = %email, "Contributor email is not linked to any account");
        Ok(resolved(
            Attribution::unattributed(email),
            named_or(non_empty(name), email),
        ))
    }
}

/// Login and commit author name, when the commit's email is linked to an account.
fn linked_author(commit: &CommitSummary) -> Option<(&str, Option<&str>)> {
    let account = commit.author.as_ref()?;
    let name = commit.commit.author.as_ref().map(|a| a.name.as_str());
    Some((account.login.as_str(), name))
}

/// A commit-recorded name when there is one, otherwise the fallback key.
fn named_or(name: Option<&str>, fallback: &str) -> (String, NameSource) {
    match name {
        Some(name) => (name.to_string(), NameSource::Commit),
        None => (fallback.to_string(), NameSource::Fallback),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
