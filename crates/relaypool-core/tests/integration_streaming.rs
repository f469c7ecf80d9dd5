#![allow(unused_crate_dependencies)]
#![allow(clippy::tests_outside_test_module, reason = "integration tests live in tests/ dir")]
#![allow(clippy::expect_used, reason = "integration test — panics are the assertion mechanism")]

mod common;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::response::Response;
use axum::routing::post;
use axum::Router;
use bytes::Bytes;
use common::{account, client, config, eventually, spawn_relay, spawn_upstream};
use relaypool_types::HealthState;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};

/// Fires when the upstream response stream is dropped.
struct DropSignal(Option<oneshot::Sender<()>>);

impl Drop for DropSignal {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

fn sse_response(body: Body) -> Response {
    Response::builder()
        .header(CONTENT_TYPE, "text/event-stream")
        .body(body)
        .expect("sse response")
}

#[tokio::test]
async fn test_first_event_arrives_before_upstream_finishes() {
    let release = Arc::new(Notify::new());
    let gate = Arc::clone(&release);

    let upstream = spawn_upstream(Router::new().route(
        "/v1/messages",
        post(move || {
            let gate = Arc::clone(&gate);
            async move {
                let stream = async_stream::stream! {
                    yield Ok::<_, Infallible>(Bytes::from_static(b"event: message_start\ndata: {}\n\n"));
                    gate.notified().await;
                    yield Ok(Bytes::from_static(b"event: message_stop\ndata: {}\n\n"));
                };
                sse_response(Body::from_stream(stream))
            }
        }),
    ))
    .await;

    let (relay, state) = spawn_relay(config(vec![account("a", &upstream)])).await;

    let mut resp = client()
        .post(format!("{relay}/v1/messages"))
        .body("{}")
        .send()
        .await
        .expect("relay request");
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get(CONTENT_TYPE).expect("content type"), "text/event-stream");

    let first = tokio::time::timeout(Duration::from_secs(5), resp.chunk())
        .await
        .expect("first chunk was buffered behind the rest of the stream")
        .expect("chunk read")
        .expect("chunk present");
    assert!(first.starts_with(b"event: message_start"));
    assert_eq!(state.registry.in_flight("a"), 1);

    release.notify_one();
    let mut rest = Vec::new();
    while let Some(chunk) = resp.chunk().await.expect("chunk read") {
        rest.extend_from_slice(&chunk);
    }
    assert_eq!(rest, b"event: message_stop\ndata: {}\n\n");

    assert!(eventually(|| state.registry.in_flight("a") == 0).await);
    assert_eq!(state.registry.get("a").expect("a").snapshot().health, HealthState::Healthy);
}

#[tokio::test]
async fn test_client_disconnect_cancels_upstream_and_keeps_account_healthy() {
    let (dropped_tx, dropped_rx) = oneshot::channel::<()>();
    let dropped_tx = Arc::new(parking_lot::Mutex::new(Some(dropped_tx)));

    let upstream = spawn_upstream(Router::new().route(
        "/v1/messages",
        post(move || {
            let signal = DropSignal(dropped_tx.lock().take());
            async move {
                let stream = async_stream::stream! {
                    let _signal = signal;
                    let mut ticker = tokio::time::interval(Duration::from_millis(20));
                    loop {
                        ticker.tick().await;
                        yield Ok::<_, Infallible>(Bytes::from_static(b"event: ping\ndata: {}\n\n"));
                    }
                };
                sse_response(Body::from_stream(stream))
            }
        }),
    ))
    .await;

    let (relay, state) = spawn_relay(config(vec![account("a", &upstream)])).await;

    let mut resp = client()
        .post(format!("{relay}/v1/messages"))
        .body("{}")
        .send()
        .await
        .expect("relay request");
    let first = resp.chunk().await.expect("chunk read").expect("chunk present");
    assert!(first.starts_with(b"event: ping"));
    drop(resp);

    tokio::time::timeout(Duration::from_secs(5), dropped_rx)
        .await
        .expect("upstream stream was not cancelled")
        .expect("signal sent");

    assert!(eventually(|| state.registry.in_flight("a") == 0).await);
    assert_eq!(state.registry.get("a").expect("a").snapshot().health, HealthState::Healthy);
}

#[tokio::test]
async fn test_idle_upstream_is_cut_and_marked_unreachable() {
    let upstream = spawn_upstream(Router::new().route(
        "/v1/messages",
        post(|| async {
            let stream = async_stream::stream! {
                yield Ok::<_, Infallible>(Bytes::from_static(b"event: message_start\ndata: {}\n\n"));
                futures::future::pending::<()>().await;
            };
            sse_response(Body::from_stream(stream))
        }),
    ))
    .await;

    let mut cfg = config(vec![account("a", &upstream)]);
    cfg.idle_timeout_secs = 1;
    let (relay, state) = spawn_relay(cfg).await;

    let mut resp = client()
        .post(format!("{relay}/v1/messages"))
        .body("{}")
        .send()
        .await
        .expect("relay request");

    let mut received = Vec::new();
    while let Ok(Some(chunk)) = resp.chunk().await {
        received.extend_from_slice(&chunk);
    }
    assert!(received.starts_with(b"event: message_start"));

    assert!(eventually(|| state.registry.in_flight("a") == 0).await);
    assert_eq!(state.registry.get("a").expect("a").snapshot().health, HealthState::Unreachable);
}

#[tokio::test]
async fn test_slow_steady_upload_is_not_an_idle_upstream() {
    let upstream =
        spawn_upstream(Router::new().route("/v1/messages", post(|body: Bytes| async move { body })))
            .await;

    let mut cfg = config(vec![account("a", &upstream), account("b", &upstream)]);
    cfg.idle_timeout_secs = 1;
    let (relay, state) = spawn_relay(cfg).await;

    // takes well over the idle timeout overall, never silent for long
    let upload = async_stream::stream! {
        for part in ["he", "ll", "o ", "wo", "rl", "d!"] {
            tokio::time::sleep(Duration::from_millis(400)).await;
            yield Ok::<_, std::io::Error>(Bytes::from_static(part.as_bytes()));
        }
    };

    let resp = client()
        .post(format!("{relay}/v1/messages"))
        .body(reqwest::Body::wrap_stream(upload))
        .send()
        .await
        .expect("relay request");

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.expect("body"), "hello world!");
    assert_eq!(state.registry.get("a").expect("a").snapshot().health, HealthState::Healthy);
    assert_eq!(state.registry.get("b").expect("b").snapshot().health, HealthState::Healthy);
}

#[tokio::test]
async fn test_stream_failure_after_reload_leaves_replacement_untouched() {
    let release = Arc::new(Notify::new());
    let gate = Arc::clone(&release);

    let upstream = spawn_upstream(Router::new().route(
        "/v1/messages",
        post(move || {
            let gate = Arc::clone(&gate);
            async move {
                let stream = async_stream::stream! {
                    yield Ok::<_, std::io::Error>(Bytes::from_static(b"event: message_start\ndata: {}\n\n"));
                    gate.notified().await;
                    yield Err(std::io::Error::other("upstream reset"));
                };
                sse_response(Body::from_stream(stream))
            }
        }),
    ))
    .await;

    let (relay, state) = spawn_relay(config(vec![account("a", &upstream)])).await;

    let mut resp = client()
        .post(format!("{relay}/v1/messages"))
        .body("{}")
        .send()
        .await
        .expect("relay request");
    let first = resp.chunk().await.expect("chunk read").expect("chunk present");
    assert!(first.starts_with(b"event: message_start"));

    let original = state.registry.get("a").expect("a");
    let mut rotated = account("a", &upstream);
    rotated.credential = "sk-rotated".to_string();
    state.registry.replace_all(vec![rotated]).expect("reload");

    release.notify_one();
    while let Ok(Some(_)) = resp.chunk().await {}

    assert!(eventually(|| original.snapshot().health == HealthState::Unreachable).await);
    assert_eq!(original.in_flight(), 0);
    let replacement = state.registry.get("a").expect("a");
    assert!(!Arc::ptr_eq(&original, &replacement));
    assert_eq!(replacement.snapshot().health, HealthState::Healthy);
}
