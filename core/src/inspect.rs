//! Read-only projections of the `meta.dataLayer` envelope.
//!
//! None of these functions fail: a missing envelope, a missing field and a
//! JSON `null` all read as `None`.

use crate::action::{Action, RequestId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Coarse status of a tracked request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Issued, no terminal payload seen yet
    Pending,
    /// Response data arrived
    Success,
    /// An error arrived
    Failure,
}

impl RequestStatus {
    /// `Success` or `Failure`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Lowercase label, as serialized.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upload or download progress.
///
/// Read leniently from whatever the transport attached: fields that are
/// missing or not unsigned integers come back as `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Bytes transferred so far
    pub loaded: Option<u64>,
    /// Total bytes expected
    pub total: Option<u64>,
}

impl Progress {
    /// Extract `{ loaded, total }` from a raw progress payload.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        Self {
            loaded: value.get("loaded").and_then(Value::as_u64),
            total: value.get("total").and_then(Value::as_u64),
        }
    }
}

/// Response payload, if any.
#[must_use]
pub fn data(action: &Action) -> Option<&Value> {
    action.meta.data_layer.data.as_ref()
}

/// Failure payload, if any.
#[must_use]
pub fn error(action: &Action) -> Option<&Value> {
    action.meta.data_layer.error.as_ref()
}

/// Response headers, if any.
#[must_use]
pub fn headers(action: &Action) -> Option<&Map<String, Value>> {
    action.meta.data_layer.headers.as_ref()
}

/// Raw progress payload, if any.
#[must_use]
pub fn progress(action: &Action) -> Option<&Value> {
    action.meta.data_layer.progress.as_ref()
}

/// Correlation id carried by the action, if any.
#[must_use]
pub fn request_id(action: &Action) -> Option<&RequestId> {
    action.meta.data_layer.request_id.as_ref()
}

/// Derive the status an action reports.
///
/// Error wins over data; progress never makes an action terminal.
#[must_use]
pub fn request_status(action: &Action) -> RequestStatus {
    if error(action).is_some() {
        RequestStatus::Failure
    } else if data(action).is_some() {
        RequestStatus::Success
    } else {
        RequestStatus::Pending
    }
}
