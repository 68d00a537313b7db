//! End-to-end tests: real gateway, real HTTP client, mock upstream.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::http::StatusCode;
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use secure_gateway::config::{EncryptFailurePolicy, GatewayConfig, KeyEntry};
use secure_gateway::filter::Collaborators;
use secure_gateway::services::crypto::{EngineCryptoService, KeyRing, UnconfiguredCrypto};
use secure_gateway::services::replay::{MemoryReplayCache, NonceReplayProtection};

mod common;

use common::{CountingLogger, XorEngine};

const KEY_V1: &[u8] = b"\x11first-key";
const KEY_V2: &[u8] = b"\x22second-key";

fn gateway_config(upstream: &common::MockBackend) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.upstream.address = upstream.url();
    config.security.logging.include_payload = true;
    config.security.global.exclude_paths = vec!["/actuator/**".into()];
    config
}

fn key_entries() -> Vec<KeyEntry> {
    vec![
        KeyEntry {
            version: "v1".into(),
            secret: B64.encode(KEY_V1),
            primary: false,
        },
        KeyEntry {
            version: "v2".into(),
            secret: B64.encode(KEY_V2),
            primary: true,
        },
    ]
}

fn collaborators(config: &GatewayConfig, logger: Arc<CountingLogger>) -> Collaborators {
    let crypto = EngineCryptoService::new(XorEngine, KeyRing::from_entries(&key_entries()).unwrap());
    Collaborators {
        crypto: Arc::new(crypto),
        replay: Arc::new(NonceReplayProtection::new(
            Arc::new(MemoryReplayCache::new()),
            &config.security.replay,
        )),
        logging: logger,
    }
}

/// Client-side transport encryption with a given key.
fn seal(key: &[u8], plaintext: &[u8]) -> String {
    let mut cipher = vec![key[0]];
    cipher.extend(common::xor(key, plaintext));
    B64.encode(cipher)
}

fn open(key: &[u8], transport: &[u8]) -> Vec<u8> {
    let cipher = B64.decode(transport).unwrap();
    assert_eq!(cipher[0], key[0], "sealed with unexpected key");
    common::xor(key, &cipher[1..])
}

fn now_ms() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis()
        .to_string()
}

#[tokio::test]
async fn test_encrypted_round_trip_through_gateway() {
    let backend = common::start_backend(|_| (200, br#"{"ok":true}"#.to_vec())).await;

    let mut config = gateway_config(&backend);
    config.security.crypto.enabled = true;
    config.security.crypto.keys = key_entries();
    let logger = Arc::new(CountingLogger::default());
    let gateway = common::start_gateway(config.clone(), collaborators(&config, logger.clone())).await;

    let res = common::client()
        .post(gateway.url("/api/v1/order"))
        .header("X-Key-Version", "v1")
        .body(seal(KEY_V1, br#"{"x":1}"#))
        .send()
        .await
        .expect("gateway unreachable");

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-key-version"], "v2");
    assert!(res.headers().contains_key("x-request-id"));
    let body = res.bytes().await.unwrap();
    assert_eq!(open(KEY_V2, &body), br#"{"ok":true}"#.to_vec());

    assert_eq!(backend.hits(), 1);
    let forwarded = backend.last().unwrap();
    assert_eq!(forwarded.body, br#"{"x":1}"#.to_vec());
    assert_eq!(forwarded.header("content-length").as_deref(), Some("7"));
    assert!(forwarded.header("x-request-id").is_some());

    assert_eq!(logger.request_count(), 1);
    assert_eq!(logger.response_count(), 1);
    let logged = logger.requests.lock().unwrap()[0].clone();
    assert_eq!(logged.body.as_deref(), Some(&br#"{"x":1}"#[..]));
}

#[tokio::test]
async fn test_excluded_path_is_forwarded_untouched() {
    let backend = common::start_fixed_backend("UP").await;
    let mut config = gateway_config(&backend);
    config.security.crypto.enabled = true;
    config.security.crypto.keys = key_entries();
    let logger = Arc::new(CountingLogger::default());
    let gateway = common::start_gateway(config.clone(), collaborators(&config, logger.clone())).await;

    let res = common::client()
        .get(gateway.url("/actuator/health"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert!(!res.headers().contains_key("x-key-version"));
    assert_eq!(res.text().await.unwrap(), "UP");
    assert_eq!(logger.request_count(), 0);
    assert_eq!(logger.response_count(), 0);
}

#[tokio::test]
async fn test_oversized_declared_body_never_reaches_upstream() {
    let backend = common::start_fixed_backend("never").await;
    let mut config = gateway_config(&backend);
    config.security.crypto.max_body_bytes = 16;
    let logger = Arc::new(CountingLogger::default());
    let gateway = common::start_gateway(config.clone(), collaborators(&config, logger)).await;

    let res = common::client()
        .post(gateway.url("/api/upload"))
        .body(vec![b'a'; 64])
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(backend.hits(), 0);
}

#[tokio::test]
async fn test_undecryptable_body_is_bad_request() {
    let backend = common::start_fixed_backend("never").await;
    let mut config = gateway_config(&backend);
    config.security.crypto.enabled = true;
    config.security.crypto.keys = key_entries();
    let logger = Arc::new(CountingLogger::default());
    let gateway = common::start_gateway(config.clone(), collaborators(&config, logger)).await;

    let res = common::client()
        .post(gateway.url("/api/v1/order"))
        .header("X-Key-Version", "v1")
        .body("definitely not base64 ciphertext")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(backend.hits(), 0);
}

#[tokio::test]
async fn test_encrypt_failure_policies() {
    let backend = common::start_fixed_backend("secret-response").await;

    for (policy, expected) in [
        (EncryptFailurePolicy::Fail, StatusCode::INTERNAL_SERVER_ERROR),
        (EncryptFailurePolicy::PassThrough, StatusCode::OK),
    ] {
        let mut config = gateway_config(&backend);
        config.security.crypto.enabled = true;
        config.security.crypto.on_encrypt_failure = policy;
        let logger = Arc::new(CountingLogger::default());
        let mut collaborators = collaborators(&config, logger);
        collaborators.crypto = Arc::new(UnconfiguredCrypto);
        let gateway = common::start_gateway(config, collaborators).await;

        // Empty request body skips decryption; the response body is still encrypted.
        let res = common::client().get(gateway.url("/api/data")).send().await.unwrap();
        assert_eq!(res.status(), expected, "policy {policy:?}");
        assert!(!res.headers().contains_key("x-key-version"));

        let body = res.text().await.unwrap();
        if expected == StatusCode::OK {
            assert_eq!(body, "secret-response");
        } else {
            assert!(!body.contains("secret-response"));
        }
    }
}

#[tokio::test]
async fn test_replay_protection_end_to_end() {
    let backend = common::start_fixed_backend("ok").await;
    let mut config = gateway_config(&backend);
    config.security.replay.enabled = true;
    config.security.replay.ttl_secs = 60;
    let logger = Arc::new(CountingLogger::default());
    let gateway = common::start_gateway(config.clone(), collaborators(&config, logger)).await;
    let client = common::client();

    let send = |nonce: Option<&'static str>, timestamp: String| {
        let mut req = client.get(gateway.url("/api/orders")).header("X-Timestamp", timestamp);
        if let Some(nonce) = nonce {
            req = req.header("X-Nonce", nonce);
        }
        req.send()
    };

    let first = send(Some("nonce-1"), now_ms()).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let replayed = send(Some("nonce-1"), now_ms()).await.unwrap();
    assert_eq!(replayed.status(), StatusCode::FORBIDDEN);

    let missing = send(None, now_ms()).await.unwrap();
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let stale = send(Some("nonce-2"), "1000".into()).await.unwrap();
    assert_eq!(stale.status(), StatusCode::FORBIDDEN);

    assert_eq!(backend.hits(), 1);
}

#[tokio::test]
async fn test_config_update_rebuilds_rule() {
    let backend = common::start_fixed_backend("ok").await;
    let mut config = gateway_config(&backend);
    config.security.replay.enabled = true;
    let logger = Arc::new(CountingLogger::default());
    let gateway = common::start_gateway(config.clone(), collaborators(&config, logger)).await;
    let client = common::client();

    let res = client.get(gateway.url("/open/ping")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    config.security.replay.exclude_paths = vec!["/open/**".into()];
    gateway.updates.send(config).unwrap();

    let mut status = StatusCode::BAD_REQUEST;
    for _ in 0..50 {
        status = client.get(gateway.url("/open/ping")).send().await.unwrap().status();
        if status == StatusCode::OK {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_upstream_down_is_bad_gateway() {
    let mut config = GatewayConfig::default();
    // Bind and drop to get a port nothing listens on.
    let unused = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    config.upstream.address = format!("http://{}", unused.local_addr().unwrap());
    drop(unused);

    let gateway = common::start_gateway(
        config,
        Collaborators {
            crypto: Arc::new(UnconfiguredCrypto),
            replay: Arc::new(NonceReplayProtection::new(
                Arc::new(MemoryReplayCache::new()),
                &Default::default(),
            )),
            logging: Arc::new(CountingLogger::default()),
        },
    )
    .await;

    let res = common::client().get(gateway.url("/api")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_reload_cannot_switch_on_crypto_without_engine() {
    let backend = common::start_backend(|_| (200, b"plain".to_vec())).await;
    let config = gateway_config(&backend);
    let logger = Arc::new(CountingLogger::default());
    let mut collaborators = collaborators(&config, logger);
    collaborators.crypto = Arc::new(UnconfiguredCrypto);
    let gateway = common::start_gateway(config.clone(), collaborators).await;
    let client = common::client();

    let mut crypto_on = config.clone();
    crypto_on.security.crypto.enabled = true;
    crypto_on.security.crypto.keys = key_entries();
    gateway.updates.send(crypto_on).unwrap();

    // A later accepted update marks the point where the first was handled.
    let mut marker = config.clone();
    marker.security.replay.enabled = true;
    marker.security.replay.exclude_paths = vec!["/api/**".into()];
    gateway.updates.send(marker).unwrap();

    let mut status = StatusCode::OK;
    for _ in 0..50 {
        status = client.get(gateway.url("/other")).send().await.unwrap().status();
        if status == StatusCode::BAD_REQUEST {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(status, StatusCode::BAD_REQUEST, "marker update never applied");

    let res = client.get(gateway.url("/api/data")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(!res.headers().contains_key("x-key-version"));
    assert_eq!(res.text().await.unwrap(), "plain");

    let res = client
        .post(gateway.url("/api/data"))
        .body(r#"{"x":1}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(backend.last().unwrap().body, br#"{"x":1}"#.to_vec());
}
