use creditroll::config::{CrawlConfig, ForgeConfig};
use creditroll::credits::{Attribution, Completion, FailureKind};
use creditroll::{Credentials, CreditsOrchestrator, GitHubClient};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_json(server: &MockServer, route: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(body)
                .insert_header("x-ratelimit-remaining", "57")
                .insert_header("x-ratelimit-limit", "60"),
        )
        .mount(server)
        .await;
}

/// Organization `acme` with repositories A (ana, bo, and ana under a second
/// email) and B (no commits yet).
async fn acme(server: &MockServer) {
    let uri = server.uri();
    mount_json(
        server,
        "/orgs/acme/repos",
        json!([
            {"name": "A", "full_name": "acme/A", "owner": {"login": "acme"}},
            {"name": "B", "full_name": "acme/B", "owner": {"login": "acme"}}
        ]),
    )
    .await;
    mount_json(
        server,
        "/repos/acme/A/contributors",
        json!([
            {"login": "ana", "url": format!("{}/users/ana", uri), "type": "User", "contributions": 5},
            {"login": "bo", "url": format!("{}/users/bo", uri), "type": "User", "contributions": 2},
            {"email": "ana@home.example", "name": "ana", "type": "Anonymous", "contributions": 3}
        ]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/B/contributors"))
        .respond_with(ResponseTemplate::new(204))
        .mount(server)
        .await;
    mount_json(server, "/users/ana", json!({"login": "ana", "name": "Ana Lima"})).await;
    mount_json(server, "/users/bo", json!({"login": "bo", "name": null})).await;
}

fn orchestrator(server: &MockServer) -> CreditsOrchestrator {
    let forge = ForgeConfig {
        endpoint: server.uri(),
        ..ForgeConfig::default()
    };
    let client = GitHubClient::new(&forge, &Credentials::anonymous(), 100).unwrap();
    CreditsOrchestrator::new(Arc::new(client), CrawlConfig::default())
}

#[tokio::test]
async fn test_organization_credits_merge_anonymous_emails() {
    let server = MockServer::start().await;
    acme(&server).await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/A/commits"))
        .and(query_param("author", "ana@home.example"))
        .and(query_param("per_page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"sha": "abc", "commit": {"author": {"name": "Ana Lima"}}, "author": {"login": "ana"}}
        ])))
        .mount(&server)
        .await;

    let run = orchestrator(&server).run("acme").await;

    assert!(run.is_complete(), "{:?}", run.failures);
    assert_eq!(run.report.repository_names(), vec!["A", "B"]);

    let a = run.report.get("A").unwrap();
    assert_eq!(a.len(), 2);
    let ana = a.get_login("ana").unwrap();
    assert_eq!(ana.total_contributions, 8);
    assert_eq!(ana.display_name, "Ana Lima");
    let bo = a.get_login("bo").unwrap();
    assert_eq!(bo.total_contributions, 2);
    assert_eq!(bo.display_name, "bo");

    assert!(run.report.get("B").unwrap().is_empty());
    assert_eq!(run.rate_limit.map(|r| r.remaining), Some(57));
}

#[tokio::test]
async fn test_unlinked_email_is_reported_not_dropped() {
    let server = MockServer::start().await;
    acme(&server).await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/A/commits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"sha": "abc", "commit": {"author": {"name": "ana"}}, "author": null}
        ])))
        .mount(&server)
        .await;

    let run = orchestrator(&server).run("acme").await;

    assert!(run.is_complete());
    let a = run.report.get("A").unwrap();
    assert_eq!(a.get_login("ana").unwrap().total_contributions, 5);
    let bucket = a
        .get(&Attribution::Unattributed("ana@home.example".to_string()))
        .unwrap();
    assert_eq!(bucket.total_contributions, 3);
    assert_eq!(a.total_contributions(), 10);
}

#[tokio::test]
async fn test_rate_limited_lookup_marks_run_incomplete() {
    let server = MockServer::start().await;
    acme(&server).await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/A/commits"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-limit", "60")
                .insert_header("x-ratelimit-reset", "1700000000"),
        )
        .mount(&server)
        .await;

    let run = orchestrator(&server).run("acme").await;

    assert!(!run.is_complete());
    match run.completion {
        Completion::RateLimited { reset_at, .. } => {
            assert_eq!(reset_at.map(|t| t.timestamp()), Some(1_700_000_000));
        }
        other => panic!("expected rate limited run, got {:?}", other),
    }
    assert!(run
        .failures
        .iter()
        .any(|f| f.kind == FailureKind::RateLimited && f.subject == "ana@home.example"));
}
