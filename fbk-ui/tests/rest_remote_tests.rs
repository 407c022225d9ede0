//! HTTP remote store against a local fake backend

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use fbk_common::config::BackendConfig;
use fbk_common::events::ChangeKind;
use fbk_common::{EnrichmentState, Error, NewRecord, Record, RecordId, UserId};
use fbk_ui::remote::{RemoteStore, RestRemoteStore};
use fbk_ui::{Dashboard, DashboardSettings, Draft, StaticSession, SubmitOutcome};
use helpers::{FakeBackend, API_KEY};
use tokio::time::timeout;
use uuid::Uuid;

const FEED_WAIT: Duration = Duration::from_secs(5);

fn client(backend: &FakeBackend) -> RestRemoteStore {
    RestRemoteStore::new(&backend.config()).expect("client builds")
}

fn row(title: &str, age_minutes: i64) -> Record {
    Record {
        id: RecordId::new_v4(),
        title: title.to_string(),
        description: "seeded".to_string(),
        category: None,
        priority: None,
        status: EnrichmentState::Pending,
        created_at: Utc::now() - ChronoDuration::minutes(age_minutes),
        user_id: None,
    }
}

#[tokio::test]
async fn test_insert_returns_server_row_and_sends_auth_headers() {
    let backend = FakeBackend::start().await;
    let store = client(&backend);
    let user = UserId(Uuid::new_v4());

    let new_record = NewRecord::pending("Crash", "on startup", user).unwrap();
    let inserted = store.insert_record(&new_record).await.unwrap();
    assert_eq!(inserted.title, "Crash");
    assert!(inserted.is_pending());
    assert_eq!(inserted.user_id, Some(user));

    let headers = backend.last_insert_headers();
    assert_eq!(headers.apikey.as_deref(), Some(API_KEY));
    assert_eq!(
        headers.authorization,
        Some(format!("Bearer {}", API_KEY))
    );
    assert_eq!(headers.prefer.as_deref(), Some("return=representation"));
}

#[tokio::test]
async fn test_fetch_record_by_identity() {
    let backend = FakeBackend::start().await;
    let seeded = row("Existing", 1);
    backend.seed(seeded.clone());
    backend.seed(row("Other", 2));
    let store = client(&backend);

    let fetched = store.fetch_record(seeded.id).await.unwrap();
    assert_eq!(fetched.map(|r| r.id), Some(seeded.id));

    let missing = store.fetch_record(RecordId::new_v4()).await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_fetch_all_is_newest_first() {
    let backend = FakeBackend::start().await;
    backend.seed(row("Oldest", 30));
    backend.seed(row("Newest", 1));
    backend.seed(row("Middle", 10));
    let store = client(&backend);

    let titles: Vec<String> = store
        .fetch_all()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.title)
        .collect();
    assert_eq!(titles, vec!["Newest", "Middle", "Oldest"]);
}

#[tokio::test]
async fn test_non_success_status_is_transient_backend_error() {
    let backend = FakeBackend::start().await;
    backend.fail_next_reads(1);
    let store = client(&backend);

    match store.fetch_all().await {
        Err(err @ Error::Backend { status: 503, .. }) => assert!(err.is_transient()),
        other => panic!("expected 503 backend error, got {:?}", other),
    }
    assert!(store.fetch_all().await.is_ok());
}

#[tokio::test]
async fn test_missing_api_key_is_rejected() {
    let backend = FakeBackend::start().await;
    let config = BackendConfig {
        api_key: None,
        ..backend.config()
    };
    let store = RestRemoteStore::new(&config).unwrap();

    match store.fetch_all().await {
        Err(err @ Error::Backend { status: 401, .. }) => assert!(!err.is_transient()),
        other => panic!("expected 401 backend error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let backend = FakeBackend::start().await;
    let config = BackendConfig {
        table: "broken".to_string(),
        ..backend.config()
    };
    let store = RestRemoteStore::new(&config).unwrap();

    assert!(matches!(store.fetch_all().await, Err(Error::Decode(_))));
}

#[tokio::test]
async fn test_change_feed_yields_update_notices_and_ends_with_body() {
    let backend = FakeBackend::start().await;
    let store = client(&backend);
    let mut subscription = store.subscribe().await.unwrap();

    backend.announce("INSERT");
    backend.announce("UPDATE");
    backend.announce("DELETE");
    backend.announce("UPDATE");

    // Neither the ConnectionStatus greeting nor inserts and deletes are notices
    let first = timeout(FEED_WAIT, subscription.next_notice()).await.unwrap();
    assert_eq!(first.map(|n| n.kind), Some(ChangeKind::Update));
    let second = timeout(FEED_WAIT, subscription.next_notice()).await.unwrap();
    assert_eq!(second.map(|n| n.kind), Some(ChangeKind::Update));

    backend.close_feeds();
    let ended = timeout(FEED_WAIT, subscription.next_notice()).await.unwrap();
    assert!(ended.is_none());
}

#[tokio::test]
async fn test_dashboard_over_http_picks_up_enrichment() {
    let backend = FakeBackend::start().await;
    let remote = Arc::new(client(&backend));
    let session = Arc::new(StaticSession::signed_in(UserId(Uuid::new_v4())));
    let dashboard = Dashboard::open(remote, session, DashboardSettings::default())
        .await
        .unwrap();

    // Enrich shortly after the insert lands, inside the polling window
    let enricher = {
        let backend = backend.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let pending = backend_pending_id(&backend).await;
            backend.enrich(pending, "Bug", "High");
        })
    };

    let mut draft = Draft::new("Save fails", "Error 500 on save");
    let outcome = dashboard.submit(&mut draft).await.unwrap();
    enricher.await.unwrap();

    match outcome {
        SubmitOutcome::Enriched(record) => {
            assert_eq!(record.category.as_deref(), Some("Bug"));
            assert_eq!(dashboard.snapshot()[0].id, record.id);
        }
        other => panic!("expected enriched outcome, got {:?}", other),
    }

    dashboard.close().await;
}

/// Identity of the single pending row, polling until the insert has landed
async fn backend_pending_id(backend: &FakeBackend) -> RecordId {
    let store = client(backend);
    loop {
        let rows = store.fetch_all().await.expect("fetch rows");
        if let Some(row) = rows.into_iter().find(|r| r.is_pending()) {
            return row.id;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
