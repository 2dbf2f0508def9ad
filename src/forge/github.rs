use super::links;
use super::*;
use crate::config::ForgeConfig;
use crate::error::{CreditsError, CreditsResult};
use chrono::DateTime;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

const RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
const RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
const RATELIMIT_RESET: &str = "x-ratelimit-reset";

/// GitHub REST v3 client. Headers (including the token) are fixed when the
/// client is built and shared by every request issued through it.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    endpoint: String,
    page_size: u32,
}

struct Fetched<T> {
    body: T,
    next: Option<PageCursor>,
    rate_limit: Option<RateLimit>,
}

impl GitHubClient {
    pub fn new(config: &ForgeConfig, credentials: &Credentials, page_size: u32) -> CreditsResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| CreditsError::Config(format!("invalid user agent: {}", e)))?,
        );
        if let Some(bearer) = credentials.bearer() {
            let mut value = HeaderValue::from_str(&bearer)
                .map_err(|_| CreditsError::Credentials("token contains invalid characters".to_string()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            page_size: page_size.clamp(1, crate::config::MAX_PAGE_SIZE),
        })
    }

    /// Issues a GET and decodes the body. Statuses listed in `empty_on`
    /// yield `T::default()` instead of an error.
    async fn get<T>(
        &self,
        url: &str,
        query: &[(&str, String)],
        empty_on: &[StatusCode],
    ) -> CreditsResult<Fetched<T>>
    where
        T: DeserializeOwned + Default,
    {
        debug!(url = %url, "Making forge API request");

        let mut request = self.client.get(url);
        if !query.is_empty() {
            request = request.query(query);
        }
        let response = request.send().await?;
        let status = response.status();
        let rate_limit = parse_rate_limit(response.headers());
        let next = response
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(links::next_page);

        if empty_on.contains(&status) {
            return Ok(Fetched {
                body: T::default(),
                next: None,
                rate_limit,
            });
        }

        if status.is_success() {
            let text = response.text().await?;
            let body = serde_json::from_str(&text).map_err(|source| CreditsError::Decode {
                url: url.to_string(),
                source,
            })?;
            return Ok(Fetched {
                body,
                next,
                rate_limit,
            });
        }

        if let Some(err) = rate_limit_error(status, response.headers(), rate_limit) {
            return Err(err);
        }

        let message = response.text().await.unwrap_or_default();
        Err(CreditsError::Transport {
            status: status.as_u16(),
            url: url.to_string(),
            message,
        })
    }

    async fn get_page<T>(
        &self,
        path: &str,
        query: Vec<(&str, String)>,
        cursor: Option<&PageCursor>,
        empty_on: &[StatusCode],
    ) -> CreditsResult<Page<T>>
    where
        T: DeserializeOwned,
    {
        // The next link already carries every query parameter of the first request.
        let fetched: Fetched<Vec<T>> = match cursor {
            Some(cursor) => self.get(cursor.as_str(), &[], empty_on).await?,
            None => {
                let url = format!("{}{}", self.endpoint, path);
                self.get(&url, &query, empty_on).await?
            }
        };

        Ok(Page {
            items: fetched.body,
            next: fetched.next,
            rate_limit: fetched.rate_limit,
        })
    }
}

#[async_trait]
impl ForgeClient for GitHubClient {
    async fn list_organization_repositories(
        &self,
        organization: &str,
        visibility: Visibility,
        cursor: Option<&PageCursor>,
    ) -> CreditsResult<Page<Repository>> {
        let path = format!("/orgs/{}/repos", organization);
        let query = vec![
            ("type", visibility.as_str().to_string()),
            ("per_page", self.page_size.to_string()),
        ];
        self.get_page(&path, query, cursor, &[]).await
    }

    async fn list_contributors(
        &self,
        repository: &Repository,
        include_anonymous: bool,
        cursor: Option<&PageCursor>,
    ) -> CreditsResult<Page<ContributorRecord>> {
        let path = format!("/repos/{}/contributors", repository.full_name);
        let query = vec![
            ("anon", include_anonymous.to_string()),
            ("per_page", self.page_size.to_string()),
        ];
        // 204 is what GitHub answers for a repository without commits.
        self.get_page(&path, query, cursor, &[StatusCode::NO_CONTENT])
            .await
    }

    async fn list_commits(
        &self,
        repository: &Repository,
        author_email: &str,
        limit: u32,
    ) -> CreditsResult<Lookup<Vec<CommitSummary>>> {
        let url = format!("{}/repos/{}/commits", self.endpoint, repository.full_name);
        let query = [
            ("author", author_email.to_string()),
            ("per_page", limit.to_string()),
        ];
        // 409: "Git Repository is empty."
        let fetched: Fetched<Vec<CommitSummary>> =
            self.get(&url, &query, &[StatusCode::CONFLICT]).await?;
        Ok(Lookup {
            value: fetched.body,
            rate_limit: fetched.rate_limit,
        })
    }

    async fn get_account_profile(&self, profile_url: &str) -> CreditsResult<Lookup<AccountProfile>> {
        let fetched: Fetched<Option<AccountProfile>> = self.get(profile_url, &[], &[]).await?;
        let profile = fetched.body.ok_or_else(|| CreditsError::Transport {
            status: StatusCode::OK.as_u16(),
            url: profile_url.to_string(),
            message: "empty profile payload".to_string(),
        })?;
        Ok(Lookup {
            value: profile,
            rate_limit: fetched.rate_limit,
        })
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

fn parse_rate_limit(headers: &HeaderMap) -> Option<RateLimit> {
    let remaining = header_u64(headers, RATELIMIT_REMAINING)?;
    let limit = header_u64(headers, RATELIMIT_LIMIT)?;
    let reset_at = header_u64(headers, RATELIMIT_RESET)
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0));

    Some(RateLimit {
        remaining,
        limit,
        reset_at,
    })
}

/// GitHub signals both the primary limit (403/429 with `remaining: 0`) and
/// the secondary abuse limit (403/429 with `Retry-After`).
fn rate_limit_error(
    status: StatusCode,
    headers: &HeaderMap,
    rate_limit: Option<RateLimit>,
) -> Option<CreditsError> {
    if status != StatusCode::FORBIDDEN && status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }

    let retry_after_seconds = header_u64(headers, RETRY_AFTER.as_str());
    let exhausted = rate_limit.is_some_and(|r| r.is_exhausted());
    if status == StatusCode::FORBIDDEN && !exhausted && retry_after_seconds.is_none() {
        return None;
    }

    Some(CreditsError::RateLimitExceeded {
        limit: rate_limit.map(|r| r.limit),
        reset_at: rate_limit.and_then(|r| r.reset_at),
        retry_after_seconds,
    })
}
