use std::time::Duration;

use puzzlequota_server::{AppConfig, AppState, ServerBuilder};
use serde_json::json;
use tokio::task::JoinHandle;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn start_server(cfg: AppConfig) -> (String, tokio::sync::oneshot::Sender<()>, JoinHandle<()>) {
    let state = AppState::from_config(&cfg).await.expect("state");
    let server = ServerBuilder::new()
        .with_state(state)
        .build()
        .await
        .expect("build server");

    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        let _ = server
            .serve(listener, async move {
                let _ = rx.await;
            })
            .await;
    });

    (format!("http://{addr}"), tx, handle)
}

fn config_for(provider: &MockServer, ttl: Duration) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.identity.issuer = provider.uri();
    cfg.identity.client_id = "m2m".into();
    cfg.identity.client_secret = "s3cret".into();
    cfg.identity.principal_cache_ttl = ttl;
    cfg
}

async fn get_me(client: &reqwest::Client, base: &str, token: &str) -> reqwest::StatusCode {
    client
        .get(format!("{base}/me"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn cached_principal_revalidates_once_after_expiry() {
    let provider = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oidc/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "sub": "u1" })))
        .expect(2)
        .mount(&provider)
        .await;

    let (base, shutdown_tx, handle) =
        start_server(config_for(&provider, Duration::from_millis(300))).await;
    let client = reqwest::Client::new();

    // Within the TTL: one validation for three requests
    for _ in 0..3 {
        assert_eq!(get_me(&client, &base, "session-token").await, 200);
    }

    tokio::time::sleep(Duration::from_millis(400)).await;

    // After expiry: exactly one more validation
    assert_eq!(get_me(&client, &base, "session-token").await, 200);
    assert_eq!(get_me(&client, &base, "session-token").await, 200);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn disabled_principal_cache_validates_every_request() {
    let provider = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oidc/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "sub": "u1" })))
        .expect(3)
        .mount(&provider)
        .await;

    let mut cfg = config_for(&provider, Duration::from_secs(3600));
    cfg.identity.principal_cache_enabled = false;
    let (base, shutdown_tx, handle) = start_server(cfg).await;
    let client = reqwest::Client::new();

    for _ in 0..3 {
        assert_eq!(get_me(&client, &base, "session-token").await, 200);
    }

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn rejected_token_is_not_cached() {
    let provider = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oidc/me"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&provider)
        .await;

    let (base, shutdown_tx, handle) =
        start_server(config_for(&provider, Duration::from_secs(3600))).await;
    let client = reqwest::Client::new();

    assert_eq!(get_me(&client, &base, "revoked").await, 401);
    assert_eq!(get_me(&client, &base, "revoked").await, 401);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}
