//! Integration tests for request tracking
//!
//! Covers fingerprinting, derived status, ledger idempotence, the
//! request-id cross-reference and progress passthrough, all through the
//! tracking middleware as a host store would drive it.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use chrono::{DateTime, Utc};
use datalayer_core::action::{Action, RequestId};
use datalayer_core::environment::Clock;
use datalayer_core::fingerprint::fingerprint;
use datalayer_core::inspect::{RequestStatus, request_status};
use datalayer_core::pipeline::{Dispatcher, Handler, Layer, handler_fn};
use datalayer_runtime::ledger::RequestLedger;
use datalayer_runtime::tracking::{TrackingEnvironment, track_requests};
use datalayer_testing::properties::{arb_action, arb_json};
use datalayer_testing::{FixedClock, RecordingDispatcher, SequentialIds, init_test_tracing, test_clock};
use proptest::prelude::*;
use serde_json::json;
use std::sync::{Arc, Mutex};

// ============================================================================
// Test Fixtures
// ============================================================================

/// Clock the test can move forward between dispatches.
#[derive(Clone)]
struct ManualClock(Arc<Mutex<DateTime<Utc>>>);

impl ManualClock {
    fn starting_at(time: DateTime<Utc>) -> Self {
        Self(Arc::new(Mutex::new(time)))
    }

    fn advance(&self, seconds: i64) {
        let mut now = self.0.lock().unwrap();
        *now += chrono::Duration::seconds(seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

fn tracked(
    ledger: &RequestLedger,
    env: TrackingEnvironment,
) -> impl Handler<RecordingDispatcher, Output = usize> {
    track_requests(ledger, env).layer(handler_fn(|store: &mut RecordingDispatcher, action: Action| {
        store.dispatch(action)
    }))
}

fn fixed_env() -> TrackingEnvironment {
    TrackingEnvironment::new(test_clock(), SequentialIds::new())
}

// ============================================================================
// Fingerprinting
// ============================================================================

#[test]
fn fingerprint_ignores_key_order() {
    let ab = Action::from_value(json!({ "type": "T", "a": 1, "b": 2 })).unwrap();
    let ba = Action::from_value(json!({ "b": 2, "a": 1, "type": "T" })).unwrap();
    assert_eq!(fingerprint(&ab), fingerprint(&ba));
}

#[test]
fn fingerprint_ignores_metadata() {
    let bare = Action::new("T").with("page", json!(2));
    let decorated = bare
        .clone()
        .with_request_id("r-9")
        .with_data(json!([1, 2]))
        .with_meta("analytics", json!({ "source": "feed" }));
    assert_eq!(fingerprint(&bare), fingerprint(&decorated));
}

proptest! {
    #[test]
    fn metadata_never_changes_the_fingerprint(action in arb_action(), data in arb_json(), id in "[a-z0-9-]{1,12}") {
        let decorated = action.clone().with_data(data).with_request_id(id.as_str());
        prop_assert_eq!(fingerprint(&action), fingerprint(&decorated));
    }
}

// ============================================================================
// Derived status
// ============================================================================

#[test]
fn error_and_data_together_is_failure() {
    let action = Action::new("T").with_data(json!({ "ok": true })).with_error(json!("E"));
    assert_eq!(request_status(&action), RequestStatus::Failure);
}

#[test]
fn falsy_payloads_still_count_as_present() {
    for data in [json!(0), json!(""), json!(false), json!([])] {
        let action = Action::new("T").with_data(data);
        assert_eq!(request_status(&action), RequestStatus::Success);
    }
}

#[test]
fn null_payloads_are_absent() {
    let action = Action::from_value(json!({
        "type": "T",
        "meta": { "dataLayer": { "data": null, "error": null } }
    }))
    .unwrap();
    assert_eq!(request_status(&action), RequestStatus::Pending);
}

// ============================================================================
// Ledger idempotence
// ============================================================================

#[test]
fn replaying_a_terminal_action_leaves_the_entry_unchanged() {
    init_test_tracing();
    let ledger = RequestLedger::new();
    let mut pipeline = tracked(&ledger, fixed_env());
    let mut store = RecordingDispatcher::new();

    let response = Action::new("POSTS_REQUEST")
        .with_request_id("r-1")
        .with_data(json!([{ "id": 1 }]));

    pipeline.handle(&mut store, response.clone());
    let first = ledger.snapshot();

    pipeline.handle(&mut store, response.clone());
    let second = ledger.snapshot();

    assert_eq!(first, second);
    let entry = ledger.get_request_meta(&response).unwrap();
    assert_eq!(entry.status, RequestStatus::Success);
    assert_eq!(entry.request_id, RequestId::from("r-1"));
    assert_eq!(entry.last_updated, Some(test_clock().now()));
}

#[test]
fn last_updated_advances_only_with_later_terminal_events() {
    let clock = ManualClock::starting_at(test_clock().now());
    let ledger = RequestLedger::new();
    let mut pipeline = tracked(&ledger, TrackingEnvironment::new(clock.clone(), SequentialIds::new()));
    let mut store = RecordingDispatcher::new();

    let request = Action::new("FEED_REQUEST");
    pipeline.handle(&mut store, request.clone());
    let id = store.last().unwrap().data_layer().request_id.clone().unwrap();

    clock.advance(5);
    pipeline.handle(&mut store, request.clone().with_request_id(id.clone()).with_data(json!([])));
    let after_success = ledger.get_request_meta(&request).unwrap().last_updated;

    clock.advance(5);
    pipeline.handle(&mut store, request.clone().with_request_id(id));
    let after_refetch = ledger.get_request_meta(&request).unwrap();

    assert_eq!(after_success, Some(test_clock().now() + chrono::Duration::seconds(5)));
    assert_eq!(after_refetch.status, RequestStatus::Pending);
    assert_eq!(after_refetch.last_updated, after_success);
}

// ============================================================================
// Cross-reference
// ============================================================================

#[test]
fn terminal_action_updates_the_originating_fingerprint() {
    init_test_tracing();
    let ledger = RequestLedger::new();
    let mut pipeline = tracked(&ledger, fixed_env());
    let mut store = RecordingDispatcher::new();

    // F1: the initiating action
    let request = Action::new("USER_REQUEST").with("id", json!(7));
    pipeline.handle(&mut store, request.clone());
    let id = store.last().unwrap().data_layer().request_id.clone().unwrap();
    assert_eq!(id, RequestId::from("req-1"));

    // F2: a differently shaped response carrying the same request id
    let response = Action::new("USER_RECEIVE")
        .with_request_id(id.clone())
        .with_error(json!({ "status": 404 }));
    assert_ne!(fingerprint(&request), fingerprint(&response));
    pipeline.handle(&mut store, response.clone());

    let origin = ledger.get_request_meta(&request).unwrap();
    let terminal = ledger.get_request_meta(&response).unwrap();
    assert_eq!(origin.status, RequestStatus::Failure);
    assert_eq!(terminal.status, RequestStatus::Failure);
    assert_eq!(origin.request_id, id);
    assert_eq!(origin, terminal);
    assert_eq!(ledger.origin(&id), Some(fingerprint(&request)));
}

#[test]
fn responses_are_forwarded_with_the_request_id() {
    let ledger = RequestLedger::new();
    let mut pipeline = tracked(&ledger, fixed_env());
    let mut store = RecordingDispatcher::new();

    pipeline.handle(&mut store, Action::new("A"));
    pipeline.handle(&mut store, Action::new("B"));

    let ids: Vec<_> = store
        .actions
        .iter()
        .map(|a| a.data_layer().request_id.clone().unwrap())
        .collect();
    assert_eq!(ids, vec![RequestId::from("req-1"), RequestId::from("req-2")]);
}

// ============================================================================
// Progress passthrough
// ============================================================================

#[test]
fn progress_actions_skip_the_ledger() {
    let ledger = RequestLedger::new();
    let ids = Arc::new(SequentialIds::new());
    let env = TrackingEnvironment {
        clock: Arc::new(FixedClock::new(test_clock().now())),
        ids: ids.clone(),
    };
    let mut pipeline = tracked(&ledger, env);
    let mut store = RecordingDispatcher::new();

    let progress = Action::new("UPLOAD").with_progress(10, 100);
    pipeline.handle(&mut store, progress.clone());

    assert!(ledger.is_empty());
    assert!(ledger.snapshot().request_ids.is_empty());
    assert_eq!(ids.issued(), 0);
    assert_eq!(store.actions, vec![progress]);
}
