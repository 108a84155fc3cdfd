//! `WebPushSender` against a local stand-in push service.

use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use clinica_delivery::push::encode_base64url;
use clinica_delivery::{
    PushError, PushMessage, PushSender, PushTarget, VapidConfig, VapidKeys, WebPushSender,
};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::SecretKey;

#[derive(Debug, Clone)]
struct Received {
    headers: HeaderMap,
    body_len: usize,
}

#[derive(Clone)]
struct PushService {
    status: StatusCode,
    received: Arc<Mutex<Vec<Received>>>,
}

async fn accept(
    State(svc): State<PushService>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> StatusCode {
    svc.received.lock().unwrap().push(Received {
        headers,
        body_len: body.len(),
    });
    svc.status
}

/// Start a push service answering every request with `status`.
async fn spawn_service(status: StatusCode) -> (String, Arc<Mutex<Vec<Received>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/push/{token}", post(accept))
        .with_state(PushService {
            status,
            received: Arc::clone(&received),
        });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), received)
}

fn sender() -> WebPushSender {
    WebPushSender::new(VapidConfig {
        keys: VapidKeys::generate(),
        subject: "mailto:ops@clinica.example".to_string(),
    })
    .unwrap()
}

fn target(base: &str) -> PushTarget {
    let ua = SecretKey::from_slice(&[11u8; 32]).unwrap();
    PushTarget {
        endpoint: format!("{base}/push/device-1"),
        p256dh: encode_base64url(ua.public_key().to_encoded_point(false).as_bytes()),
        auth: encode_base64url(&[2u8; 16]),
    }
}

fn message() -> PushMessage {
    PushMessage {
        title: "Ovulation day".to_string(),
        body: "Hi Ana, today is your predicted ovulation day.".to_string(),
        url: "/".to_string(),
    }
}

#[tokio::test]
async fn created_is_success_with_protocol_headers() {
    let (base, received) = spawn_service(StatusCode::CREATED).await;
    let sender = sender();

    sender.send(&target(&base), &message()).await.unwrap();

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    let req = &received[0];
    assert_eq!(req.headers["ttl"], "86400");
    assert_eq!(req.headers["content-encoding"], "aes128gcm");
    let auth = req.headers["authorization"].to_str().unwrap();
    assert!(auth.starts_with("vapid t="));
    assert!(auth.ends_with(&format!("k={}", sender.public_key())));

    let payload_len = serde_json::to_vec(&message()).unwrap().len();
    assert_eq!(req.body_len, 16 + 4 + 1 + 65 + payload_len + 1 + 16);
}

#[tokio::test]
async fn gone_endpoint_reported() {
    let (base, _) = spawn_service(StatusCode::GONE).await;
    let err = sender().send(&target(&base), &message()).await.unwrap_err();
    assert!(err.is_gone());
}

#[tokio::test]
async fn server_error_is_transient() {
    let (base, _) = spawn_service(StatusCode::BAD_GATEWAY).await;
    let err = sender().send(&target(&base), &message()).await.unwrap_err();
    assert_matches!(err, PushError::Unavailable(502));
    assert!(!err.is_permanent());
}

#[tokio::test]
async fn unreachable_service_is_transient() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = sender()
        .send(&target(&format!("http://{addr}")), &message())
        .await
        .unwrap_err();
    assert_matches!(err, PushError::Request(_));
    assert!(!err.is_permanent());
}

#[tokio::test]
async fn corrupt_subscription_keys_never_reach_the_network() {
    let (base, received) = spawn_service(StatusCode::CREATED).await;
    let mut bad = target(&base);
    bad.p256dh = "not-a-key".to_string();

    let err = sender().send(&bad, &message()).await.unwrap_err();
    assert_matches!(err, PushError::InvalidSubscription(_));
    assert!(received.lock().unwrap().is_empty());
}
