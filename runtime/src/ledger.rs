//! The request ledger.
//!
//! Two associative stores:
//!
//! - **requests**: [`Fingerprint`] → [`RequestEntry`]
//! - **request ids**: [`RequestId`] → the [`Fingerprint`] of the action that
//!   first minted that id
//!
//! The second store lets a terminal action whose body differs from the
//! initiating action (and so has a different fingerprint) find and update
//! the original entry.
//!
//! Entries are never evicted. The ledger lives as long as the client does and
//! grows with the number of distinct requests issued.
//!
//! # Sharing
//!
//! [`RequestLedger`] is a cheap-clone handle: the tracking middleware writes
//! through one clone while UI code queries through another. The mutex only
//! provides interior mutability; the pipeline still processes one action at
//! a time.

use chrono::{DateTime, Utc};
use datalayer_core::action::{Action, RequestId};
use datalayer_core::fingerprint::{Fingerprint, fingerprint};
use datalayer_core::inspect::RequestStatus;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// What the ledger knows about one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEntry {
    /// Correlation id shared by every action of the request
    pub request_id: RequestId,
    /// Latest known status
    pub status: RequestStatus,
    /// When the status last became terminal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl RequestEntry {
    /// Still waiting for a response
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    /// Response arrived
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == RequestStatus::Success
    }

    /// Error arrived
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status == RequestStatus::Failure
    }
}

/// Storage for fingerprint → entry.
pub trait RequestStore: Send {
    /// Look up an entry
    fn get(&self, key: &Fingerprint) -> Option<RequestEntry>;

    /// Insert or replace an entry
    fn set(&mut self, key: Fingerprint, entry: RequestEntry);

    /// Remove everything
    fn clear(&mut self);

    /// Number of entries
    fn len(&self) -> usize;

    /// Copy out every entry
    fn entries(&self) -> Vec<(Fingerprint, RequestEntry)>;

    /// No entries
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Storage for request id → originating fingerprint.
pub trait RequestIdStore: Send {
    /// Look up the originating fingerprint
    fn get(&self, id: &RequestId) -> Option<Fingerprint>;

    /// Record the originating fingerprint
    fn set(&mut self, id: RequestId, key: Fingerprint);

    /// Remove everything
    fn clear(&mut self);

    /// Number of ids
    fn len(&self) -> usize;

    /// Copy out every mapping
    fn entries(&self) -> Vec<(RequestId, Fingerprint)>;

    /// No ids
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

macro_rules! impl_map_store {
    ($map:ident, $store:ident, $key:ty, $value:ty) => {
        impl $store for $map<$key, $value> {
            fn get(&self, key: &$key) -> Option<$value> {
                $map::get(self, key).cloned()
            }

            fn set(&mut self, key: $key, value: $value) {
                self.insert(key, value);
            }

            fn clear(&mut self) {
                $map::clear(self);
            }

            fn len(&self) -> usize {
                $map::len(self)
            }

            fn entries(&self) -> Vec<($key, $value)> {
                self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
            }
        }
    };
}

impl_map_store!(HashMap, RequestStore, Fingerprint, RequestEntry);
impl_map_store!(BTreeMap, RequestStore, Fingerprint, RequestEntry);
impl_map_store!(HashMap, RequestIdStore, RequestId, Fingerprint);
impl_map_store!(BTreeMap, RequestIdStore, RequestId, Fingerprint);

/// A point-in-time copy of the ledger, ordered for stable output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    /// fingerprint → entry
    pub requests: BTreeMap<Fingerprint, RequestEntry>,
    /// request id → originating fingerprint
    pub request_ids: BTreeMap<RequestId, Fingerprint>,
}

struct LedgerState {
    requests: Box<dyn RequestStore>,
    request_ids: Box<dyn RequestIdStore>,
}

/// Shared handle to the two ledger stores.
///
/// # Example
///
/// ```
/// use datalayer_core::action::Action;
/// use datalayer_core::fingerprint::fingerprint;
/// use datalayer_core::inspect::RequestStatus;
/// use datalayer_runtime::ledger::{RequestEntry, RequestLedger};
///
/// let ledger = RequestLedger::new();
/// let action = Action::new("POSTS_REQUEST");
///
/// ledger.set(
///     fingerprint(&action),
///     RequestEntry { request_id: "r-1".into(), status: RequestStatus::Pending, last_updated: None },
/// );
///
/// assert!(ledger.get_request_meta(&action).is_some_and(|e| e.is_pending()));
/// ```
#[derive(Clone)]
pub struct RequestLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl RequestLedger {
    /// Ledger backed by two `HashMap`s.
    #[must_use]
    pub fn new() -> Self {
        Self::with_stores(
            HashMap::<Fingerprint, RequestEntry>::new(),
            HashMap::<RequestId, Fingerprint>::new(),
        )
    }

    /// Ledger backed by caller-supplied stores.
    #[must_use]
    pub fn with_stores<R, I>(requests: R, request_ids: I) -> Self
    where
        R: RequestStore + 'static,
        I: RequestIdStore + 'static,
    {
        Self {
            state: Arc::new(Mutex::new(LedgerState {
                requests: Box::new(requests),
                request_ids: Box::new(request_ids),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Entry stored under `key`.
    #[must_use]
    pub fn get(&self, key: &Fingerprint) -> Option<RequestEntry> {
        self.lock().requests.get(key)
    }

    /// Store `entry` under `key`.
    pub fn set(&self, key: Fingerprint, entry: RequestEntry) {
        self.lock().requests.set(key, entry);
    }

    /// Fingerprint of the action that minted `id`.
    #[must_use]
    pub fn origin(&self, id: &RequestId) -> Option<Fingerprint> {
        self.lock().request_ids.get(id)
    }

    /// Record the fingerprint of the action that minted `id`.
    pub fn set_origin(&self, id: RequestId, key: Fingerprint) {
        self.lock().request_ids.set(id, key);
    }

    /// Entry for `action`, keyed by the same fingerprint the middleware writes.
    #[must_use]
    pub fn get_request_meta(&self, action: &Action) -> Option<RequestEntry> {
        self.get(&fingerprint(action))
    }

    /// Number of tracked fingerprints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().requests.len()
    }

    /// Nothing tracked yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every entry and every id mapping.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.requests.clear();
        state.request_ids.clear();
        tracing::debug!("Request ledger reset");
    }

    /// Copy out both stores.
    #[must_use]
    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.lock();
        LedgerSnapshot {
            requests: state.requests.entries().into_iter().collect(),
            request_ids: state.request_ids.entries().into_iter().collect(),
        }
    }
}

impl Default for RequestLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RequestLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("RequestLedger")
            .field("requests", &state.requests.len())
            .field("request_ids", &state.request_ids.len())
            .finish()
    }
}
