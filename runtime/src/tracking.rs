//! Request tracking middleware.
//!
//! [`TrackRequests`] sits in front of a router and keeps the
//! [`RequestLedger`] current. For every action it sees:
//!
//! 1. Progress actions skip bookkeeping and are forwarded unchanged.
//! 2. The action's fingerprint and derived status are computed.
//! 3. The request id is taken from `meta.dataLayer.requestId`, or minted.
//! 4. The entry under the fingerprint is replaced with
//!    `{ requestId, status }`, plus `lastUpdated = now` for terminal statuses.
//! 5. Pending actions register themselves as the origin of the request id.
//!    Terminal actions also overwrite the origin's entry when it lives under a
//!    different fingerprint.
//! 6. The action is forwarded with the request id stamped into its metadata.
//!
//! # Example
//!
//! ```
//! use datalayer_core::action::Action;
//! use datalayer_core::pipeline::{handler_fn, Handler, Layer};
//! use datalayer_runtime::ledger::RequestLedger;
//! use datalayer_runtime::tracking::{track_requests, TrackingEnvironment};
//!
//! let ledger = RequestLedger::new();
//! let layer = track_requests(&ledger, TrackingEnvironment::system());
//! let mut pipeline = layer.layer(handler_fn(|_store: &mut (), action: Action| action));
//!
//! let forwarded = pipeline.handle(&mut (), Action::new("POSTS_REQUEST"));
//!
//! let entry = ledger.get_request_meta(&forwarded).unwrap();
//! assert!(entry.is_pending());
//! assert_eq!(forwarded.data_layer().request_id.as_ref(), Some(&entry.request_id));
//! ```

use crate::ledger::{RequestEntry, RequestLedger};
use crate::metrics::LedgerMetrics;
use datalayer_core::action::{Action, RequestId};
use datalayer_core::environment::{Clock, IdGenerator, SystemClock, UuidGenerator};
use datalayer_core::fingerprint::fingerprint;
use datalayer_core::inspect::{self, request_status};
use datalayer_core::pipeline::{Handler, Layer};
use std::fmt;
use std::sync::Arc;

/// Clock and id source used while tracking.
#[derive(Clone)]
pub struct TrackingEnvironment {
    /// Supplies `lastUpdated`
    pub clock: Arc<dyn Clock>,
    /// Mints request ids
    pub ids: Arc<dyn IdGenerator>,
}

impl TrackingEnvironment {
    /// Custom clock and id generator.
    #[must_use]
    pub fn new<C, G>(clock: C, ids: G) -> Self
    where
        C: Clock + 'static,
        G: IdGenerator + 'static,
    {
        Self {
            clock: Arc::new(clock),
            ids: Arc::new(ids),
        }
    }

    /// Wall clock and random UUIDs.
    #[must_use]
    pub fn system() -> Self {
        Self::new(SystemClock, UuidGenerator)
    }
}

impl Default for TrackingEnvironment {
    fn default() -> Self {
        Self::system()
    }
}

impl fmt::Debug for TrackingEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackingEnvironment").finish_non_exhaustive()
    }
}

/// Layer that wraps a handler in [`TrackRequests`].
#[derive(Debug, Clone)]
pub struct TrackRequestsLayer {
    ledger: RequestLedger,
    env: TrackingEnvironment,
}

/// Build the tracking layer over `ledger`.
#[must_use]
pub fn track_requests(ledger: &RequestLedger, env: TrackingEnvironment) -> TrackRequestsLayer {
    TrackRequestsLayer {
        ledger: ledger.clone(),
        env,
    }
}

impl TrackRequestsLayer {
    /// The ledger this layer writes to.
    #[must_use]
    pub const fn ledger(&self) -> &RequestLedger {
        &self.ledger
    }
}

impl<H> Layer<H> for TrackRequestsLayer {
    type Handler = TrackRequests<H>;

    fn layer(&self, next: H) -> TrackRequests<H> {
        TrackRequests {
            ledger: self.ledger.clone(),
            env: self.env.clone(),
            next,
        }
    }
}

/// The tracking middleware around a `next` handler.
#[derive(Debug, Clone)]
pub struct TrackRequests<H> {
    ledger: RequestLedger,
    env: TrackingEnvironment,
    next: H,
}

impl<H> TrackRequests<H> {
    /// The ledger this middleware writes to.
    #[must_use]
    pub const fn ledger(&self) -> &RequestLedger {
        &self.ledger
    }

    /// The wrapped handler.
    #[must_use]
    pub const fn inner(&self) -> &H {
        &self.next
    }

    /// The wrapped handler, mutably.
    pub fn inner_mut(&mut self) -> &mut H {
        &mut self.next
    }

    /// Update the ledger for a non-progress action and stamp its request id.
    fn record(&self, mut action: Action) -> Action {
        let key = fingerprint(&action);
        let status = request_status(&action);
        let existing = self.ledger.get(&key);
        let previous = existing.as_ref().map(|entry| entry.status);

        let request_id = match inspect::request_id(&action) {
            Some(id) if id.is_usable() => id.clone(),
            _ => {
                LedgerMetrics::record_minted();
                RequestId::new(self.env.ids.next_id())
            },
        };

        let last_updated = if status.is_terminal() {
            Some(self.env.clock.now())
        } else {
            existing.and_then(|entry| entry.last_updated)
        };

        let entry = RequestEntry {
            request_id: request_id.clone(),
            status,
            last_updated,
        };

        tracing::trace!(fingerprint = %key, "Fingerprinted action");
        tracing::debug!(
            request_id = %request_id,
            status = %status,
            action_type = action.action_type().unwrap_or_default(),
            "Ledger entry written"
        );

        self.ledger.set(key.clone(), entry.clone());
        LedgerMetrics::record_write(status, previous);

        if status.is_terminal() {
            let origin = self.ledger.origin(&request_id).filter(|origin| *origin != key);
            if let Some(origin) = origin {
                tracing::debug!(request_id = %request_id, "Originating entry updated");
                self.ledger.set(origin, entry);
                LedgerMetrics::record_origin_update();
            }
        } else {
            self.ledger.set_origin(request_id.clone(), key);
        }

        action.stamp_request_id(request_id);
        action
    }
}

impl<D, H> Handler<D> for TrackRequests<H>
where
    H: Handler<D>,
{
    type Output = H::Output;

    fn handle(&mut self, store: &mut D, action: Action) -> H::Output {
        if inspect::progress(&action).is_some() {
            LedgerMetrics::record_progress_passthrough();
            return self.next.handle(store, action);
        }

        let action = self.record(action);
        self.next.handle(store, action)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use datalayer_core::inspect::RequestStatus;
    use datalayer_core::pipeline::handler_fn;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct StaticClock(DateTime<Utc>);

    impl Clock for StaticClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    #[derive(Default)]
    struct Counter(AtomicU64);

    impl IdGenerator for Counter {
        fn next_id(&self) -> String {
            format!("id-{}", self.0.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    fn pipeline(ledger: &RequestLedger) -> TrackRequests<impl Handler<Vec<Action>, Output = ()>> {
        track_requests(ledger, TrackingEnvironment::new(StaticClock(noon()), Counter::default()))
            .layer(handler_fn(|seen: &mut Vec<Action>, action: Action| seen.push(action)))
    }

    #[test]
    fn first_sight_creates_pending_entry_and_origin() {
        let ledger = RequestLedger::new();
        let mut seen = Vec::new();
        let action = Action::new("FETCH").with("id", json!(1));

        pipeline(&ledger).handle(&mut seen, action.clone());

        let entry = ledger.get_request_meta(&action).unwrap();
        assert_eq!(entry.request_id, RequestId::from("id-1"));
        assert_eq!(entry.status, RequestStatus::Pending);
        assert_eq!(entry.last_updated, None);
        assert_eq!(ledger.origin(&"id-1".into()), Some(fingerprint(&action)));
        assert_eq!(seen[0].data_layer().request_id, Some(RequestId::from("id-1")));
    }

    #[test]
    fn carried_request_id_is_reused() {
        let ledger = RequestLedger::new();
        let mut seen = Vec::new();
        let action = Action::new("FETCH").with_request_id("carried").with_data(json!([]));

        pipeline(&ledger).handle(&mut seen, action.clone());

        let entry = ledger.get_request_meta(&action).unwrap();
        assert_eq!(entry.request_id, RequestId::from("carried"));
        assert_eq!(entry.status, RequestStatus::Success);
        assert_eq!(entry.last_updated, Some(noon()));
    }

    #[test]
    fn blank_request_id_is_replaced() {
        let ledger = RequestLedger::new();
        let mut seen = Vec::new();

        pipeline(&ledger).handle(&mut seen, Action::new("FETCH").with_request_id(" "));

        assert_eq!(seen[0].data_layer().request_id, Some(RequestId::from("id-1")));
    }

    #[test]
    fn progress_skips_bookkeeping() {
        let ledger = RequestLedger::new();
        let mut seen = Vec::new();
        let action = Action::new("UPLOAD").with_progress(10, 100);

        pipeline(&ledger).handle(&mut seen, action.clone());

        assert!(ledger.is_empty());
        assert_eq!(seen, vec![action]);
    }

    #[test]
    fn replayed_response_completes_once() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let ledger = RequestLedger::new();
        let mut seen = Vec::new();
        let response = Action::new("FETCH").with_request_id("r-1").with_data(json!([]));

        metrics::with_local_recorder(&recorder, || {
            let mut pipeline = pipeline(&ledger);
            pipeline.handle(&mut seen, response.clone());
            pipeline.handle(&mut seen, response);
        });

        let rendered = handle.render();
        assert!(rendered.contains("datalayer_ledger_writes_total 2"));
        assert!(rendered.contains("datalayer_requests_completed_total{status=\"success\"} 1"));
    }

    #[test]
    fn terminal_write_keeps_other_meta() {
        let ledger = RequestLedger::new();
        let mut seen = Vec::new();
        let action = Action::new("FETCH").with_meta("analytics", json!("x"));

        pipeline(&ledger).handle(&mut seen, action);

        assert_eq!(seen[0].meta.extra.get("analytics"), Some(&json!("x")));
    }
}
