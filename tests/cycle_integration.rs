// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! End-to-end reconciliation cycles against a mock Cloudflare API.
//!
//! Every collaborator is the production implementation: the HTTP client, the
//! file snapshot source, the file state store and the file credential store.

use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tunnelsync::cloudflare::CloudflareClient;
use tunnelsync::reconciler::{CycleOutcome, Phase, Reconciler, ReconcilerSettings};
use tunnelsync::route::FileSnapshotSource;
use tunnelsync::state::{FileStateStore, StateStore};
use tunnelsync::tunnel::FileCredentialStore;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Helper Functions
// ============================================================================

fn ok(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "errors": [],
        "messages": [],
        "result": result,
    }))
}

fn record(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "type": "CNAME",
        "content": "tun-1.cfargotunnel.com",
        "proxied": true,
        "ttl": 1
    })
}

fn settings() -> ReconcilerSettings {
    ReconcilerSettings {
        account_id: "account-1".to_string(),
        zone_id: "zone-1".to_string(),
        tunnel_name: "docker-host".to_string(),
        tunnel_domain: "cfargotunnel.com".to_string(),
        proxied: true,
    }
}

fn write_snapshot(path: &Path, routes: Value) {
    std::fs::write(path, serde_json::to_vec(&routes).unwrap()).unwrap();
}

struct Setup {
    _dir: TempDir,
    server: MockServer,
    reconciler: Reconciler,
    source: FileSnapshotSource,
    snapshot_path: std::path::PathBuf,
    state: Arc<FileStateStore>,
    credential_path: std::path::PathBuf,
}

async fn setup() -> Setup {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    let snapshot_path = dir.path().join("current.json");
    let credential_path = dir.path().join("cloudflared").join("token");
    let state = Arc::new(FileStateStore::new(dir.path().join("previous.json")));

    let client =
        CloudflareClient::new(server.uri().parse().unwrap(), "test-token".to_string(), 5)
            .unwrap();
    let reconciler = Reconciler::new(
        Arc::new(client),
        state.clone(),
        Arc::new(FileCredentialStore::new(credential_path.clone())),
        settings(),
    );

    Setup {
        source: FileSnapshotSource::new(snapshot_path.clone()),
        _dir: dir,
        server,
        reconciler,
        snapshot_path,
        state,
        credential_path,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_first_cycle_creates_tunnel_records_and_ingress() {
    let s = setup().await;
    write_snapshot(
        &s.snapshot_path,
        json!([
            { "hostname": "App.Example.com", "target": "http://app:8080" },
            { "hostname": "api.example.com", "service": "http://api:3000" }
        ]),
    );

    Mock::given(method("GET"))
        .and(path("/accounts/account-1/cfd_tunnel"))
        .and(query_param("name", "docker-host"))
        .respond_with(ok(json!([])))
        .expect(1)
        .mount(&s.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/accounts/account-1/cfd_tunnel"))
        .and(body_json(json!({ "name": "docker-host", "config_src": "cloudflare" })))
        .respond_with(ok(json!({ "id": "tun-1", "name": "docker-host" })))
        .expect(1)
        .mount(&s.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/accounts/account-1/cfd_tunnel/tun-1/token"))
        .respond_with(ok(json!("eyJ-tunnel-token")))
        .expect(1)
        .mount(&s.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/zones/zone-1/dns_records"))
        .respond_with(ok(json!([])))
        .expect(2)
        .mount(&s.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/zones/zone-1/dns_records"))
        .respond_with(ok(record("rec-1", "app.example.com")))
        .expect(2)
        .mount(&s.server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/accounts/account-1/cfd_tunnel/tun-1/configurations"))
        .and(body_json(json!({
            "config": {
                "ingress": [
                    { "hostname": "app.example.com", "service": "http://app:8080" },
                    { "hostname": "api.example.com", "service": "http://api:3000" },
                    { "service": "http_status:404" }
                ]
            }
        })))
        .respond_with(ok(json!({})))
        .expect(1)
        .mount(&s.server)
        .await;

    let outcome = s.reconciler.run_cycle(&s.source).await;

    assert!(outcome.is_success(), "{outcome:?}");
    assert_eq!(outcome.exit_code(), 0);
    assert!(outcome.report().tunnel_created);

    let token = std::fs::read_to_string(&s.credential_path).unwrap();
    assert_eq!(token, "eyJ-tunnel-token");

    let state = s.state.load().await.unwrap();
    let hostnames: Vec<&str> = state.routes.iter().map(|r| r.hostname.as_str()).collect();
    assert_eq!(hostnames, vec!["app.example.com", "api.example.com"]);
}

#[tokio::test]
async fn test_removed_route_deletes_its_record() {
    let s = setup().await;
    write_snapshot(
        &s.snapshot_path,
        json!([{ "hostname": "app.example.com", "target": "http://app:8080" }]),
    );
    std::fs::create_dir_all(s.credential_path.parent().unwrap()).unwrap();
    std::fs::write(&s.credential_path, "cached-token").unwrap();
    s.state
        .save(&tunnelsync::state::PersistedState::new(
            vec![
                tunnelsync::route::Route::new("app.example.com", "http://app:8080"),
                tunnelsync::route::Route::new("old.example.com", "http://old:80"),
            ],
            Vec::new(),
        ))
        .await
        .unwrap();

    Mock::given(method("GET"))
        .and(path("/accounts/account-1/cfd_tunnel"))
        .respond_with(ok(json!([{ "id": "tun-1", "name": "docker-host" }])))
        .mount(&s.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/zones/zone-1/dns_records"))
        .and(query_param("name", "app.example.com"))
        .respond_with(ok(json!([record("rec-1", "app.example.com")])))
        .mount(&s.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/zones/zone-1/dns_records"))
        .and(query_param("name", "old.example.com"))
        .respond_with(ok(json!([record("rec-2", "old.example.com")])))
        .mount(&s.server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/accounts/account-1/cfd_tunnel/tun-1/configurations"))
        .respond_with(ok(json!({})))
        .expect(1)
        .mount(&s.server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/zones/zone-1/dns_records/rec-2"))
        .respond_with(ok(json!({ "id": "rec-2" })))
        .expect(1)
        .mount(&s.server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ok(json!({})))
        .expect(0)
        .mount(&s.server)
        .await;

    let outcome = s.reconciler.run_cycle(&s.source).await;

    assert!(outcome.is_success(), "{outcome:?}");
    let report = outcome.report();
    assert_eq!(report.records_unchanged, 1);
    assert_eq!(report.deletions_succeeded, 1);
    assert!(!report.tunnel_created);
    assert!(!report.credential_written);

    let state = s.state.load().await.unwrap();
    assert_eq!(state.routes.len(), 1);
}

#[tokio::test]
async fn test_auth_failure_exits_fatal_without_state() {
    let s = setup().await;
    write_snapshot(
        &s.snapshot_path,
        json!([{ "hostname": "app.example.com", "target": "http://app:8080" }]),
    );

    Mock::given(method("GET"))
        .and(path("/accounts/account-1/cfd_tunnel"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "success": false,
            "errors": [{ "code": 10000, "message": "Authentication error" }],
            "messages": [],
            "result": null
        })))
        .mount(&s.server)
        .await;

    let outcome = s.reconciler.run_cycle(&s.source).await;

    assert!(matches!(
        outcome,
        CycleOutcome::Fatal {
            phase: Phase::ResolvingIdentity,
            ..
        }
    ));
    assert_eq!(outcome.exit_code(), 2);
    assert!(s.state.load().await.is_none());
    assert!(!s.credential_path.exists());
}

#[tokio::test]
async fn test_missing_snapshot_is_fatal_before_any_call() {
    let s = setup().await;

    let outcome = s.reconciler.run_cycle(&s.source).await;

    assert!(matches!(
        outcome,
        CycleOutcome::Fatal {
            phase: Phase::Validating,
            ..
        }
    ));
    assert!(s.server.received_requests().await.unwrap().is_empty());
}
