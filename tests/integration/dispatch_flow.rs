//! End-to-end dispatch over the in-memory transport.
//!
//! These tests verify:
//! - The query frame carries the statement's configuration
//! - Ack re-keys the registry so server-addressed frames route home
//! - Cancel frames are addressed to the server-assigned id
//! - Done deregisters; frames after it are dropped
//! - Delivered errors are not terminal
//! - Orphaned frames reach the default callback
//! - Transport loss completes every open handle

mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{eventually, init_tracing, RecordingCallback};
use serde_json::json;
use sonda::{
    channel_pair, Inbound, QueryCallback, QueryDispatcher, Request, ServerError, Statement,
    SUB_ID_PREFIX,
};

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn subscription_round_trip() {
    init_tracing();
    let (transport, peer) = channel_pair();
    let dispatcher = QueryDispatcher::connect(Arc::new(transport));
    let callback = Arc::new(RecordingCallback::default());

    let handle = dispatcher
        .submit(
            Statement::builder("subscribe to events", callback.clone())
                .date_range("last 2 hours")
                .build(),
        )
        .expect("submit");
    assert!(handle.is_subscribe_query());
    assert!(handle.is_subscribe_id());

    let frame = peer
        .requests
        .recv_timeout(Duration::from_secs(1))
        .expect("query frame");
    let Request::Query { id, date_range, .. } = frame else {
        panic!("expected query frame");
    };
    assert_eq!(id, handle.id());
    assert!(id.starts_with(SUB_ID_PREFIX));
    assert_eq!(date_range, "last 2 hours");

    // Server assigns its own subscription id; later frames use it.
    peer.frames
        .send(Inbound::Ack {
            id: id.clone(),
            msg_id: "srv-1".into(),
        })
        .expect("ack");
    assert!(eventually(WAIT, || handle.last_msg_id() == "srv-1"));

    for n in 0..3 {
        peer.frames
            .send(Inbound::Response {
                msg_id: "srv-1".into(),
                payload: json!({"seq": n}),
            })
            .expect("response");
    }
    assert!(eventually(WAIT, || handle.call_count() == 3));
    assert_eq!(callback.result_count(), 3);

    // Cancellation is advisory and addressed to the server id.
    handle.cancel_async().expect("cancel");
    let cancel = peer
        .requests
        .recv_timeout(Duration::from_secs(1))
        .expect("cancel frame");
    assert_eq!(
        cancel,
        Request::Cancel {
            id: "srv-1".into()
        }
    );

    // A result already in flight at cancellation time still lands.
    peer.frames
        .send(Inbound::Response {
            msg_id: "srv-1".into(),
            payload: json!({"seq": 3}),
        })
        .expect("late response");
    assert!(eventually(WAIT, || handle.call_count() == 4));
    assert!(!handle.is_done());

    peer.frames
        .send(Inbound::Done {
            msg_id: "srv-1".into(),
        })
        .expect("done");
    assert!(eventually(WAIT, || handle.is_done()));
    assert_eq!(callback.done_count(), 1);

    // The registration is gone; frames after done are dropped.
    peer.frames
        .send(Inbound::Response {
            msg_id: "srv-1".into(),
            payload: json!({"seq": 99}),
        })
        .expect("post-done response");
    thread::sleep(Duration::from_millis(100));
    assert_eq!(handle.call_count(), 4);
    assert_eq!(callback.done_count(), 1);
}

#[test]
fn delivered_errors_are_not_terminal() {
    init_tracing();
    let (transport, peer) = channel_pair();
    let dispatcher = QueryDispatcher::connect(Arc::new(transport));
    let callback = Arc::new(RecordingCallback::default());

    let handle = dispatcher
        .submit(Statement::builder("subscribe to events", callback.clone()).build())
        .expect("submit");

    peer.frames
        .send(Inbound::Error {
            msg_id: handle.id().to_owned(),
            error: ServerError::with_code("window overflow", 503),
        })
        .expect("error frame");
    assert!(eventually(WAIT, || callback.error_count() == 1));
    assert_eq!(handle.call_count(), 1);
    assert!(!handle.is_done(), "a delivered error must not complete");

    peer.frames
        .send(Inbound::Response {
            msg_id: handle.id().to_owned(),
            payload: json!({"seq": 0}),
        })
        .expect("response after error");
    assert!(eventually(WAIT, || handle.call_count() == 2));

    peer.frames
        .send(Inbound::Done {
            msg_id: handle.id().to_owned(),
        })
        .expect("done");
    assert!(eventually(WAIT, || handle.is_done()));
}

#[test]
fn orphaned_frames_reach_the_default_callback() {
    init_tracing();
    let (transport, peer) = channel_pair();
    let orphaned = Arc::new(RecordingCallback::default());
    let default_callback: Arc<dyn QueryCallback> = orphaned.clone();
    let _dispatcher = QueryDispatcher::connect_with(Arc::new(transport), Some(default_callback));

    peer.frames
        .send(Inbound::Response {
            msg_id: "nobody-home".into(),
            payload: json!({"stray": true}),
        })
        .expect("stray frame");
    assert!(eventually(WAIT, || orphaned.result_count() == 1));
    assert_eq!(orphaned.done_count(), 0);
}

#[test]
fn transport_loss_completes_every_open_handle() {
    init_tracing();
    let (transport, peer) = channel_pair();
    let dispatcher = QueryDispatcher::connect(Arc::new(transport));
    let callback_a = Arc::new(RecordingCallback::default());
    let callback_b = Arc::new(RecordingCallback::default());

    let first = dispatcher
        .submit(Statement::builder("subscribe to events", callback_a.clone()).build())
        .expect("submit first");
    let second = dispatcher
        .submit(Statement::builder("get events", callback_b.clone()).build())
        .expect("submit second");

    drop(peer);

    assert!(eventually(WAIT, || first.is_done() && second.is_done()));
    assert_eq!(callback_a.done_count(), 1);
    assert_eq!(callback_b.done_count(), 1);
}
