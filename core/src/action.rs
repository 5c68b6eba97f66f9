//! Actions and the request metadata envelope.
//!
//! An [`Action`] is a structurally typed record: a free-form JSON body and a
//! metadata envelope. Only one part of the envelope is typed, the
//! `meta.dataLayer` block that the transport fills in with response, error
//! and progress payloads. Everything else under `meta` is kept verbatim.
//!
//! # Wire shape
//!
//! ```json
//! {
//!   "type": "POSTS_REQUEST",
//!   "siteId": 42,
//!   "meta": {
//!     "dataLayer": { "data": { "found": 3 }, "requestId": "2f1c..." },
//!     "analytics": { "source": "reader" }
//!   }
//! }
//! ```
//!
//! # Presence
//!
//! Every envelope field is an `Option`. A field is present exactly when it is
//! `Some`, so `0`, `""` and `false` payloads count as present. A JSON `null`
//! deserializes to absent.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Body key conventionally holding the action type.
pub const ACTION_TYPE_KEY: &str = "type";

/// Top-level key holding the metadata envelope. Never part of the body.
pub const META_KEY: &str = "meta";

/// Errors raised when building an [`Action`] from loose JSON.
#[derive(Error, Debug)]
pub enum ActionError {
    /// The value was not a JSON object.
    #[error("Action must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// The object could not be read as an action (e.g. a malformed envelope).
    #[error("Malformed action: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Identifier correlating every action that belongs to one network operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Wrap an id string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A blank id cannot correlate anything and is treated as missing.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.0.trim().is_empty()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// The `meta.dataLayer` block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataLayerMeta {
    /// Response payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Failure payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,

    /// Response headers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Map<String, Value>>,

    /// Upload/download progress, `{ loaded, total }`. Never validated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Value>,

    /// Correlation id stamped by the tracking middleware
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
}

impl DataLayerMeta {
    /// True when no field is present.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.data.is_none()
            && self.error.is_none()
            && self.headers.is_none()
            && self.progress.is_none()
            && self.request_id.is_none()
    }
}

/// The metadata envelope. Excluded from fingerprints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Request metadata written by the transport and the tracking middleware
    #[serde(
        rename = "dataLayer",
        default,
        skip_serializing_if = "DataLayerMeta::is_empty",
        deserialize_with = "null_as_default"
    )]
    pub data_layer: DataLayerMeta,

    /// Any other metadata, kept as-is
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Meta {
    /// True when neither the data layer block nor any extra key is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data_layer.is_empty() && self.extra.is_empty()
    }
}

/// An application event flowing through the dispatch pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Metadata envelope
    #[serde(
        default,
        skip_serializing_if = "Meta::is_empty",
        deserialize_with = "null_as_default"
    )]
    pub meta: Meta,

    /// Free-form body (every top-level key except `meta`)
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl Action {
    /// Create an action whose body holds only `{ "type": action_type }`.
    #[must_use]
    pub fn new(action_type: impl Into<String>) -> Self {
        let mut body = Map::new();
        body.insert(ACTION_TYPE_KEY.to_string(), Value::String(action_type.into()));
        Self {
            meta: Meta::default(),
            body,
        }
    }

    /// Create an action from an already-built body.
    ///
    /// A `meta` key is taken out of the body and read as the envelope, as
    /// [`Action::from_value`] would; a malformed one is dropped.
    #[must_use]
    pub fn from_body(mut body: Map<String, Value>) -> Self {
        let meta = body.remove(META_KEY).and_then(read_meta).unwrap_or_default();
        Self { meta, body }
    }

    /// Read an action from loose JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::NotAnObject`] for non-object values and
    /// [`ActionError::Malformed`] when `meta` cannot be read.
    pub fn from_value(value: Value) -> Result<Self, ActionError> {
        match value {
            Value::Object(_) => Ok(serde_json::from_value(value)?),
            Value::Null => Err(ActionError::NotAnObject("null")),
            Value::Bool(_) => Err(ActionError::NotAnObject("boolean")),
            Value::Number(_) => Err(ActionError::NotAnObject("number")),
            Value::String(_) => Err(ActionError::NotAnObject("string")),
            Value::Array(_) => Err(ActionError::NotAnObject("array")),
        }
    }

    /// Render the action back to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Malformed`] if serialization fails, which only
    /// happens when a body key collides with `meta` handling.
    pub fn to_value(&self) -> Result<Value, ActionError> {
        Ok(serde_json::to_value(self)?)
    }

    /// The `type` field, if it is a string.
    #[must_use]
    pub fn action_type(&self) -> Option<&str> {
        self.body.get(ACTION_TYPE_KEY).and_then(Value::as_str)
    }

    /// Look up a body field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    /// Set a body field.
    ///
    /// `meta` is reserved: the value replaces the envelope instead, read the
    /// same way [`Action::from_value`] reads it. A value that is not a valid
    /// envelope leaves the action unchanged.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if key == META_KEY {
            if let Some(meta) = read_meta(value) {
                self.meta = meta;
            }
        } else {
            self.body.insert(key, value);
        }
        self
    }

    /// Set a non-data-layer metadata field.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.extra.insert(key.into(), value);
        self
    }

    /// Attach a response payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.meta.data_layer.data = Some(data);
        self
    }

    /// Attach a failure payload.
    #[must_use]
    pub fn with_error(mut self, error: Value) -> Self {
        self.meta.data_layer.error = Some(error);
        self
    }

    /// Attach response headers.
    #[must_use]
    pub fn with_headers(mut self, headers: Map<String, Value>) -> Self {
        self.meta.data_layer.headers = Some(headers);
        self
    }

    /// Attach a `{ loaded, total }` progress payload.
    #[must_use]
    pub fn with_progress(mut self, loaded: u64, total: u64) -> Self {
        self.meta.data_layer.progress = Some(serde_json::json!({
            "loaded": loaded,
            "total": total,
        }));
        self
    }

    /// Attach a correlation id.
    #[must_use]
    pub fn with_request_id(mut self, id: impl Into<RequestId>) -> Self {
        self.stamp_request_id(id.into());
        self
    }

    /// Overwrite the correlation id in place.
    pub fn stamp_request_id(&mut self, id: RequestId) {
        self.meta.data_layer.request_id = Some(id);
    }

    /// Borrow the `meta.dataLayer` block.
    #[must_use]
    pub const fn data_layer(&self) -> &DataLayerMeta {
        &self.meta.data_layer
    }
}

fn read_meta(value: Value) -> Option<Meta> {
    serde_json::from_value::<Option<Meta>>(value)
        .ok()
        .map(Option::unwrap_or_default)
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
