//! End-to-end `update` runs against fake integration endpoints.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sessync::SessionSync;
use sessync_core::config::{IntegrationConfig, IntegrationSettings};
use sessync_core::{AggregateStatus, FailureKind, Outcome, SessyncConfig};
use sessync_journal::{JournalStore, JsonlJournal};
use sessync_vault::{CredentialVault, EncryptedFileVault};

fn base_config(root: &Path) -> SessyncConfig {
    let mut config = SessyncConfig::default();
    config.root = root.to_path_buf();
    config.project.name = "Atlas".to_string();
    config
}

fn source_host(api_url: &str) -> IntegrationConfig {
    IntegrationConfig {
        enabled: true,
        timeout_secs: None,
        settings: IntegrationSettings::SourceHost {
            repository: "acme/atlas".to_string(),
            api_url: api_url.to_string(),
        },
    }
}

fn chat(api_url: &str, timeout_secs: u64) -> IntegrationConfig {
    IntegrationConfig {
        enabled: true,
        timeout_secs: Some(timeout_secs),
        settings: IntegrationSettings::ChatNotifier {
            channel: "C42".to_string(),
            api_url: api_url.to_string(),
        },
    }
}

fn vault(root: &Path) -> Arc<EncryptedFileVault> {
    Arc::new(EncryptedFileVault::with_key(root.join("credentials.json"), [7; 32]))
}

fn store(vault: &EncryptedFileVault, id: &str, field: &str, value: &str) {
    vault
        .set(id, field, SecretString::from(value.to_string()))
        .unwrap();
}

async fn mount_comment_endpoint(server: &MockServer, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/repos/acme/atlas/issues/7/comments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 99 })))
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test]
async fn timed_out_adapter_does_not_block_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mount_comment_endpoint(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/chat.postMessage"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "ok": true, "ts": "1.2" }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let mut config = base_config(dir.path());
    config.integrations.insert("gh".to_string(), source_host(&server.uri()));
    config.integrations.insert("slack".to_string(), chat(&server.uri(), 1));
    let vault = vault(dir.path());
    store(&vault, "gh", "token", "ghp_test");
    store(&vault, "slack", "token", "xoxb-test");

    let sync = SessionSync::with_client(config, vault, reqwest::Client::new()).unwrap();
    let report = sync.update("Fixed #7 in src/lib.rs").await.unwrap();

    let outcomes = &report.entry.outcomes;
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].integration_id, "gh");
    assert_eq!(
        outcomes[0].outcome,
        Outcome::Succeeded {
            external_reference: "#7:99".to_string()
        }
    );
    assert_eq!(outcomes[1].integration_id, "slack");
    assert!(matches!(
        outcomes[1].outcome,
        Outcome::Failed {
            kind: FailureKind::Timeout,
            ..
        }
    ));
    match &report.entry.status {
        AggregateStatus::PartialFailure { shortfalls } => {
            assert_eq!(shortfalls.len(), 1);
            assert_eq!(shortfalls[0].subject, "slack");
        }
        AggregateStatus::Success => panic!("a timed-out integration is not a success"),
    }

    let logged = sync.recent_entries(5, None).await.unwrap();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].outcomes, report.entry.outcomes);
}

#[tokio::test]
async fn all_integrations_succeeding_is_success() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mount_comment_endpoint(&server, 1).await;

    let mut config = base_config(dir.path());
    config.integrations.insert("gh".to_string(), source_host(&server.uri()));
    let vault = vault(dir.path());
    store(&vault, "gh", "token", "ghp_test");

    let sync = SessionSync::with_client(config, vault, reqwest::Client::new()).unwrap();
    let report = sync.update("Implemented the tile cache, closes #7").await.unwrap();

    assert!(report.is_success());
    assert!(report.entry.warnings.is_empty());
    let artifacts = report.artifacts.expect("auto-refresh is on by default");
    assert!(artifacts.full.content.contains("tile cache"));
    assert!(sync.artifacts().quick_path().exists());
}

#[tokio::test]
async fn missing_credentials_skip_but_still_log() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mount_comment_endpoint(&server, 0).await;

    let mut config = base_config(dir.path());
    config.integrations.insert("gh".to_string(), source_host(&server.uri()));

    let sync = SessionSync::with_client(config, vault(dir.path()), reqwest::Client::new()).unwrap();
    let report = sync.update("Fixed #7").await.unwrap();

    assert_eq!(
        report.entry.outcomes[0].outcome,
        Outcome::skipped("credentials not configured")
    );
    assert!(!report.is_success());

    let journal = JsonlJournal::open(dir.path().join("session-logs")).unwrap();
    assert_eq!(journal.latest().unwrap().unwrap().id, report.entry.id);
}

#[tokio::test]
async fn unwritable_context_dir_is_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mount_comment_endpoint(&server, 1).await;

    std::fs::write(dir.path().join("blocker"), "not a directory").unwrap();
    let mut config = base_config(dir.path());
    config.context.directory = "blocker/ai-context".to_string();
    config.integrations.insert("gh".to_string(), source_host(&server.uri()));
    let vault = vault(dir.path());
    store(&vault, "gh", "token", "ghp_test");

    let sync = SessionSync::with_client(config, vault, reqwest::Client::new()).unwrap();
    let report = sync.update("Fixed #7").await.unwrap();

    assert!(report.artifacts.is_none());
    assert!(report.entry.outcomes[0].outcome.is_success());
    assert_eq!(report.entry.warnings.len(), 1);
    match &report.entry.status {
        AggregateStatus::PartialFailure { shortfalls } => {
            assert_eq!(shortfalls.len(), 1);
            assert_eq!(shortfalls[0].subject, "context");
        }
        AggregateStatus::Success => panic!("artifact failure must be reported"),
    }
}

#[tokio::test]
async fn artifacts_stay_within_bounds_for_oversized_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path());
    config.context.max_length = 400;
    config.context.quick_max_length = 120;

    let sync = SessionSync::with_client(config, vault(dir.path()), reqwest::Client::new()).unwrap();
    let huge = format!("Refactored ATL-1 {}", "überlong detail ".repeat(500));
    for _ in 0..3 {
        let report = sync.update(&huge).await.unwrap();
        let artifacts = report.artifacts.unwrap();
        assert!(artifacts.full.len() <= 400);
        assert!(artifacts.quick.len() <= 120);
    }

    let full = std::fs::read_to_string(sync.artifacts().full_path()).unwrap();
    let quick = std::fs::read_to_string(sync.artifacts().quick_path()).unwrap();
    assert!(full.chars().count() <= 400);
    assert!(quick.chars().count() <= 120);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_updates_append_whole_entries() {
    let dir = tempfile::tempdir().unwrap();
    let sync = SessionSync::with_client(
        base_config(dir.path()),
        vault(dir.path()),
        reqwest::Client::new(),
    )
    .unwrap();
    // A second orchestrator over the same project root, as a second process would be.
    let other = SessionSync::with_client(
        base_config(dir.path()),
        vault(dir.path()),
        reqwest::Client::new(),
    )
    .unwrap();

    let (a, b) = tokio::join!(sync.update("Fixed ATL-1"), other.update("Fixed ATL-2"));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.entry.id, b.entry.id);

    let scan = JsonlJournal::open(dir.path().join("session-logs"))
        .unwrap()
        .scan()
        .unwrap();
    assert!(scan.rejected.is_empty());
    assert_eq!(scan.entries.len(), 2);
}

#[tokio::test]
async fn status_reports_tampered_lines_and_health() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path());
    config.integrations.insert("gh".to_string(), source_host("http://127.0.0.1:9"));
    let sync = SessionSync::with_client(config, vault(dir.path()), reqwest::Client::new()).unwrap();

    sync.update("Fixed ATL-1").await.unwrap();
    sync.update("Fixed ATL-2").await.unwrap();

    let log = dir.path().join("session-logs").join("session-log.jsonl");
    let content = std::fs::read_to_string(&log).unwrap();
    std::fs::write(&log, content.replacen("Fixed ATL-1", "Fixed ATL-9", 1)).unwrap();

    let status = sync.status().await.unwrap();
    assert_eq!(status.stats.total, 1);
    assert_eq!(status.maintenance.rejected_lines, 1);
    assert_eq!(status.last_entry.unwrap().summary, "Fixed ATL-2");
    assert!(matches!(
        status.integrations[0].last_outcome,
        Some((_, Outcome::Skipped { .. }))
    ));
}
