#![allow(clippy::unwrap_used)]
// Integration tests for `HttpTransport` using wiremock.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use relaydeck_api::{Error, Generation, HttpTransport, Transport, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, HttpTransport, String) {
    let server = MockServer::start().await;
    let transport = HttpTransport::new(TransportConfig {
        timeout: Duration::from_millis(500),
        ..TransportConfig::default()
    })
    .unwrap();
    let address = server.uri();
    (server, transport, address)
}

// ── Status ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_fetch_status_gen2() {
    let (server, transport, address) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rpc/Shelly.GetStatus"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "switch:0": { "id": 0, "output": true, "apower": 150.0, "voltage": 230.1 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let status = transport
        .fetch_status(&address, Generation::Gen2)
        .await
        .unwrap();
    assert_eq!(status["switch:0"]["apower"], 150.0);
}

#[tokio::test]
async fn test_fetch_status_gen1() {
    let (server, transport, address) = setup().await;

    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "relays": [{ "ison": false }],
            "meters": [{ "power": 0.0, "total": 1200 }]
        })))
        .mount(&server)
        .await;

    let status = transport
        .fetch_status(&address, Generation::Gen1)
        .await
        .unwrap();
    assert_eq!(status["relays"][0]["ison"], false);
}

#[tokio::test]
async fn test_http_error_status() {
    let (server, transport, address) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rpc/Shelly.GetStatus"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .mount(&server)
        .await;

    let result = transport.fetch_status(&address, Generation::Gen2).await;
    assert!(
        matches!(result, Err(Error::Http { status: 503, .. })),
        "expected Http 503, got: {result:?}"
    );
}

#[tokio::test]
async fn test_malformed_body_is_deserialization_error() {
    let (server, transport, address) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rpc/Shelly.GetStatus"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let result = transport.fetch_status(&address, Generation::Gen2).await;
    assert!(
        matches!(result, Err(Error::Deserialization { .. })),
        "expected Deserialization error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_slow_device_times_out() {
    let (server, transport, address) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rpc/Shelly.GetStatus"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let result = transport.fetch_status(&address, Generation::Gen2).await;
    assert!(
        matches!(result, Err(Error::Timeout { .. })),
        "expected Timeout, got: {result:?}"
    );
}

// ── Config ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_fetch_config_gen2() {
    let (server, transport, address) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rpc/Shelly.GetConfig"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sys": { "device": { "name": "Kitchen", "mac": "A8032AB12345" } }
        })))
        .mount(&server)
        .await;

    let config = transport
        .fetch_config(&address, Generation::Gen2)
        .await
        .unwrap();
    assert_eq!(config["sys"]["device"]["name"], "Kitchen");
}

// ── Control ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_set_switch_gen2() {
    let (server, transport, address) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rpc/Switch.Set"))
        .and(query_param("id", "0"))
        .and(query_param("on", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "was_on": false })))
        .expect(1)
        .mount(&server)
        .await;

    transport
        .set_switch(&address, Generation::Gen2, 0, true)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_set_switch_gen1() {
    let (server, transport, address) = setup().await;

    Mock::given(method("GET"))
        .and(path("/relay/1"))
        .and(query_param("turn", "off"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ison": false })))
        .expect(1)
        .mount(&server)
        .await;

    transport
        .set_switch(&address, Generation::Gen1, 1, false)
        .await
        .unwrap();
}

// ── Push ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_subscribe_to_unreachable_device_fails() {
    let transport = HttpTransport::new(TransportConfig::default()).unwrap();

    // Port 9 (discard) is essentially never listening on loopback.
    let result = transport.subscribe("127.0.0.1:9").await;
    assert!(
        matches!(result, Err(Error::WebSocketConnect(_))),
        "expected WebSocketConnect error"
    );
}
