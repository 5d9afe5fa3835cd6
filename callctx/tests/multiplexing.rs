//! End-to-end tests: many calls multiplexed over one simulated connection.

#![allow(missing_docs)]

use callctx::{
    CallError, OpId, PendingCalls, Reply, RequestContext, CID_HEADER, OPID_HEADER,
    TIMEOUT_HEADER,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

/// Installs a subscriber once per test binary; filter with `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_test_writer()
        .try_init();
}

/// A request frame as a transport would put it on the wire.
struct Frame {
    headers: HashMap<String, String>,
    payload: Vec<u8>,
}

/// A responder that echoes payloads back reversed, after a delay taken from
/// the `delay-ms` header. Payloads equal to `b"drop"` are never answered.
fn spawn_responder(
    mut requests: mpsc::UnboundedReceiver<Frame>,
    replies: mpsc::UnboundedSender<Reply>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = requests.recv().await {
            let replies = replies.clone();
            tokio::spawn(async move {
                let inbound = RequestContext::from_request_headers(frame.headers);
                if frame.payload == b"drop" {
                    return;
                }
                let delay = inbound
                    .request_header("delay-ms")
                    .and_then(|ms| ms.parse().ok())
                    .unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(delay)).await;

                // A downstream call keeps the trace but not the operation id.
                let downstream = inbound.clone();
                inbound.add_response_header("downstream-cid", downstream.correlation_id());
                inbound.add_response_header(
                    "downstream-opid",
                    downstream.request_header(OPID_HEADER).unwrap_or_default(),
                );

                let mut body = frame.payload;
                body.reverse();
                let reply = Reply::to(&inbound, body).unwrap();
                let _ = replies.send(reply);
            });
        }
    })
}

/// Reads replies off the connection and routes them to waiting calls.
fn spawn_reader(
    calls: Arc<PendingCalls>,
    mut replies: mpsc::UnboundedReceiver<Reply>,
    unknown: mpsc::UnboundedSender<CallError>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(reply) = replies.recv().await {
            if let Err(e) = calls.dispatch(reply) {
                let _ = unknown.send(e);
            }
        }
    })
}

struct Connection {
    calls: Arc<PendingCalls>,
    requests: mpsc::UnboundedSender<Frame>,
    dispatch_errors: mpsc::UnboundedReceiver<CallError>,
}

impl Connection {
    fn open() -> Self {
        init_tracing();
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let calls = Arc::new(PendingCalls::default());

        spawn_responder(request_rx, reply_tx);
        spawn_reader(Arc::clone(&calls), reply_rx, error_tx);

        Self {
            calls,
            requests: request_tx,
            dispatch_errors: error_rx,
        }
    }

    async fn call(&self, ctx: &RequestContext, payload: &[u8]) -> Result<Vec<u8>, CallError> {
        let pending = self.calls.register(ctx)?;
        self.requests
            .send(Frame {
                headers: ctx.wire_request_headers(),
                payload: payload.to_vec(),
            })
            .map_err(|_| CallError::Abandoned(pending.op_id()))?;
        pending.wait(ctx).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn out_of_order_replies_reach_their_callers() {
    let conn = Arc::new(Connection::open());
    let parent = RequestContext::new("batch");

    let tasks: Vec<_> = (0..50_u64)
        .map(|i| {
            let conn = Arc::clone(&conn);
            let ctx = parent.clone();
            // Later calls answer sooner, so replies arrive in reverse.
            ctx.add_request_header("delay-ms", (100 - i * 2).to_string());
            tokio::spawn(async move {
                let payload = format!("call-{i}");
                let reply = conn.call(&ctx, payload.as_bytes()).await.unwrap();
                (payload, reply, ctx)
            })
        })
        .collect();

    for task in tasks {
        let (payload, reply, ctx) = task.await.unwrap();
        let expected: Vec<u8> = payload.bytes().rev().collect();
        assert_eq!(reply, expected);
        assert_eq!(
            ctx.response_header(OPID_HEADER),
            ctx.request_header(OPID_HEADER)
        );
        assert_eq!(ctx.response_header("downstream-cid").as_deref(), Some("batch"));
        assert_ne!(
            ctx.response_header("downstream-opid"),
            ctx.request_header(OPID_HEADER)
        );
    }
    assert!(conn.calls.is_empty());
}

#[tokio::test(start_paused = true)]
async fn unanswered_call_times_out_without_blocking_others() {
    let conn = Connection::open();

    let silent = RequestContext::new("");
    silent.set_timeout(Duration::from_millis(200));
    let answered = RequestContext::new("");

    let (silent_result, answered_result) =
        tokio::join!(conn.call(&silent, b"drop"), conn.call(&answered, b"abc"));

    assert_eq!(
        silent_result,
        Err(CallError::DeadlineExceeded(Duration::from_millis(200)))
    );
    assert_eq!(answered_result, Ok(b"cba".to_vec()));
    assert!(conn.calls.is_empty());
}

fn op_id_of(ctx: &RequestContext) -> OpId {
    OpId::new(ctx.request_header(OPID_HEADER).unwrap().parse().unwrap())
}

#[tokio::test(start_paused = true)]
async fn late_reply_is_reported_as_unknown() {
    let mut conn = Connection::open();

    let ctx = RequestContext::new("");
    ctx.set_timeout(Duration::from_millis(50))
        .add_request_header("delay-ms", "500");

    assert_eq!(
        conn.call(&ctx, b"slow").await,
        Err(CallError::DeadlineExceeded(Duration::from_millis(50)))
    );
    assert!(conn.calls.is_empty());

    let error = conn.dispatch_errors.recv().await.unwrap();
    assert_eq!(error, CallError::UnknownOpId(op_id_of(&ctx)));
}

#[tokio::test(start_paused = true)]
async fn call_dropped_by_an_outer_timeout_frees_its_slot() {
    let mut conn = Connection::open();

    let ctx = RequestContext::new("");
    ctx.add_request_header("delay-ms", "500");

    let outer = tokio::time::timeout(Duration::from_millis(20), conn.call(&ctx, b"slow")).await;
    assert!(outer.is_err());
    assert!(conn.calls.is_empty());

    let error = conn.dispatch_errors.recv().await.unwrap();
    assert_eq!(error, CallError::UnknownOpId(op_id_of(&ctx)));
}

#[tokio::test]
async fn peer_sees_the_wire_headers_verbatim() {
    let ctx = RequestContext::new("wire-cid");
    ctx.set_timeout(Duration::from_millis(1_234))
        .add_request_header("tenant", "acme")
        .add_ephemeral_property("local-only", "secret");

    let wire = ctx.wire_request_headers();
    let inbound = RequestContext::from_request_headers(wire.clone());

    assert_eq!(inbound.correlation_id(), "wire-cid");
    assert_eq!(inbound.request_header(OPID_HEADER), ctx.request_header(OPID_HEADER));
    assert_eq!(inbound.timeout(), Duration::from_millis(1_234));
    assert_eq!(inbound.request_header("tenant").as_deref(), Some("acme"));
    assert!(inbound.ephemeral_properties().is_empty());
    assert_eq!(wire.len(), 4);
    assert!(wire.contains_key(CID_HEADER));
    assert!(wire.contains_key(TIMEOUT_HEADER));
}
