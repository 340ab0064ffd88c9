//! End-to-end pipeline: middleware resolves an identity, the handler
//! makes an outbound call, and the recorded call carries that identity
//! without any explicit context passing in between.

use bytes::Bytes;
use http::Request;
use http_body_util::Full;
use outboundiq_core::ingest::{IngestClient, IngestError};
use outboundiq_core::{facade, ApiCall, ContextKind};
use outboundiq_http::fetch::{tracked_fetch, FetchRequest};
use outboundiq_http::middleware::{extract_from_header, handler, wrap, InjectorOptions};
use serial_test::serial;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingClient {
    records: Mutex<Vec<ApiCall>>,
}

impl RecordingClient {
    fn records(&self) -> Vec<ApiCall> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl IngestClient for RecordingClient {
    fn track(&self, record: ApiCall) {
        self.records.lock().unwrap().push(record);
    }

    async fn flush(&self) -> Result<(), IngestError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), IngestError> {
        Ok(())
    }
}

fn request(uri: &str, headers: &[(&str, &str)]) -> Request<Bytes> {
    let mut builder = Request::builder().method("GET").uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Bytes::new()).unwrap()
}

#[tokio::test]
#[serial]
async fn outbound_call_inside_handler_carries_request_identity() {
    facade::reset();
    let sink = Arc::new(RecordingClient::default());
    facade::init_with_client(sink.clone());

    // The handler makes an outbound call with no identity plumbing of
    // its own; the unroutable port makes the call fail fast, which is
    // still a tracked outcome.
    let inner = handler(|_req| async {
        let _ = tracked_fetch(FetchRequest::new("http://127.0.0.1:9/downstream")).await;
        Ok(http::Response::builder()
            .status(200)
            .body(Full::new(Bytes::from("done")))
            .unwrap())
    });
    let wrapped = wrap(inner, InjectorOptions::new());

    let response = wrapped(request("/orders", &[("x-user-id", "u-77")]))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // The outbound record picked the middleware-resolved identity up
    // from the ambient scope.
    let records = sink.records();
    assert_eq!(records.len(), 1);
    let attached = records[0].user_context.as_ref().unwrap();
    assert_eq!(attached.user_id.as_deref(), Some("u-77"));
    assert_eq!(attached.kind, ContextKind::Authenticated);

    // The same identity rode the response header out.
    let propagated = extract_from_header(response.headers()).unwrap();
    assert_eq!(propagated.user_id.as_deref(), Some("u-77"));

    facade::reset();
}

#[tokio::test]
#[serial]
async fn concurrent_requests_track_their_own_identities() {
    facade::reset();
    let sink = Arc::new(RecordingClient::default());
    facade::init_with_client(sink.clone());

    let inner = handler(|_req| async {
        tokio::task::yield_now().await;
        let _ = tracked_fetch(FetchRequest::new("http://127.0.0.1:9/downstream")).await;
        Ok(http::Response::builder()
            .status(200)
            .body(Full::new(Bytes::new()))
            .unwrap())
    });
    let wrapped = wrap(inner, InjectorOptions::new());

    let a = wrapped(request("/a", &[("x-user-id", "alice")]));
    let b = wrapped(request("/b", &[("x-user-id", "bob")]));
    let (ra, rb) = tokio::join!(a, b);
    ra.unwrap();
    rb.unwrap();

    let mut seen: Vec<String> = sink
        .records()
        .iter()
        .filter_map(|r| r.user_context.as_ref()?.user_id.clone())
        .collect();
    seen.sort();
    assert_eq!(seen, vec!["alice".to_string(), "bob".to_string()]);

    facade::reset();
}

#[tokio::test]
#[serial]
async fn excluded_requests_produce_untagged_records() {
    facade::reset();
    let sink = Arc::new(RecordingClient::default());
    facade::init_with_client(sink.clone());

    let inner = handler(|_req| async {
        let _ = tracked_fetch(FetchRequest::new("http://127.0.0.1:9/downstream")).await;
        Ok(http::Response::builder()
            .status(200)
            .body(Full::new(Bytes::new()))
            .unwrap())
    });
    let wrapped = wrap(
        inner,
        InjectorOptions::new().exclude_pattern("/internal"),
    );

    let response = wrapped(request("/internal/job", &[("x-user-id", "ignored")]))
        .await
        .unwrap();

    // No scope was established and no header injected.
    assert!(extract_from_header(response.headers()).is_none());
    assert!(sink.records()[0].user_context.is_none());

    facade::reset();
}
