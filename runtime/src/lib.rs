//! # Data Layer Runtime
//!
//! Request tracking and response routing for a client-side dispatch
//! pipeline.
//!
//! ## Core Components
//!
//! - **Request Ledger**: fingerprint → `{ requestId, status, lastUpdated }`,
//!   plus request id → originating fingerprint
//! - **Tracking Middleware**: keeps the ledger current and stamps request ids
//!   onto every action it forwards
//! - **Dispatch Routers**: pick exactly one handler per action (initiate,
//!   success, error, progress), in two flavours
//! - **Schema Parser**: validates, prunes and transforms response payloads
//!   before a success handler sees them
//!
//! ## Example
//!
//! ```
//! use datalayer_core::action::Action;
//! use datalayer_core::pipeline::Handler;
//! use datalayer_runtime::dispatch::RequestOptions;
//! use datalayer_runtime::{DataLayer, DataLayerConfig};
//! use serde_json::{json, Value};
//!
//! #[derive(Default)]
//! struct Posts {
//!     loading: bool,
//!     items: Vec<Value>,
//! }
//!
//! let layer = DataLayer::new(DataLayerConfig::default());
//! let mut router = layer.dispatch_request(
//!     |posts: &mut Posts, _: &Action| posts.loading = true,
//!     |posts: &mut Posts, _: &Action, data: Value| {
//!         posts.loading = false;
//!         posts.items.push(data);
//!     },
//!     |posts: &mut Posts, _: &Action, _error| posts.loading = false,
//!     RequestOptions::new(),
//! );
//!
//! let mut posts = Posts::default();
//! let request = Action::new("POSTS_REQUEST");
//! router.handle(&mut posts, request.clone());
//! assert!(posts.loading);
//!
//! router.handle(&mut posts, request.with_data(json!({ "id": 1 })));
//! assert_eq!(posts.items, vec![json!({ "id": 1 })]);
//! ```

/// Configuration loaded from the process environment
pub mod config;

/// The data layer context object
pub mod data_layer;

/// Dispatch router whose handlers perform dispatches themselves
pub mod dispatch;

/// Dispatch router whose handlers return actions to dispatch
pub mod dispatch_ex;

/// Fingerprint-keyed request ledger
pub mod ledger;

/// Prometheus metrics for observability
pub mod metrics;

/// JSON Schema response parsing
pub mod schema;

/// Request tracking middleware
pub mod tracking;

/// Non-fatal configuration warnings
pub mod warning;

/// Error types handed to `on_error` handlers
pub mod error {
    use crate::schema::ParseError;
    use serde_json::Value;
    use thiserror::Error;

    /// Why a request did not produce a usable response
    #[derive(Error, Debug)]
    pub enum RequestError {
        /// The remote side reported an error
        ///
        /// Carries `meta.dataLayer.error` exactly as it arrived.
        #[error("Request failed: {0}")]
        Remote(Value),

        /// Response data arrived but was rejected by `from_api`
        #[error(transparent)]
        Parse(#[from] ParseError),
    }

    impl RequestError {
        /// Short machine-readable label: `remote`, or the parse error kind.
        #[must_use]
        pub const fn kind(&self) -> &'static str {
            match self {
                Self::Remote(_) => "remote",
                Self::Parse(error) => error.kind(),
            }
        }

        /// The remote error payload, if this is one.
        #[must_use]
        pub const fn remote(&self) -> Option<&Value> {
            match self {
                Self::Remote(value) => Some(value),
                Self::Parse(_) => None,
            }
        }

        /// The parse failure, if this is one.
        #[must_use]
        pub const fn as_parse_error(&self) -> Option<&ParseError> {
            match self {
                Self::Remote(_) => None,
                Self::Parse(error) => Some(error),
            }
        }
    }
}

pub use config::{ConfigError, DataLayerConfig, Environment};
pub use data_layer::DataLayer;
pub use dispatch::{RequestOptions, RequestRouter, dispatch_request};
pub use dispatch_ex::{ActionRouter, RequestHandlers, dispatch_request_ex};
pub use error::RequestError;
pub use ledger::{LedgerSnapshot, RequestEntry, RequestLedger};
pub use schema::{ParseError, ParserOptions, SchemaParser, SchemaViolation, make_json_schema_parser};
pub use tracking::{TrackRequests, TrackRequestsLayer, TrackingEnvironment, track_requests};
pub use warning::ConfigurationWarning;
