//! Dispatch router, handler-performs-dispatch flavour.
//!
//! [`RequestRouter`] looks at one action and runs exactly one handler:
//!
//! | `meta.dataLayer` holds | handler |
//! |------------------------|---------|
//! | `error`                | `on_error(store, action, RequestError::Remote)` |
//! | `data`, parses         | `on_success(store, action, parsed)` |
//! | `data`, fails to parse | `on_error(store, action, RequestError::Parse)` |
//! | `progress`             | `on_progress(store, action, progress)` (no-op by default) |
//! | none of these          | `initiator(store, action)` |
//!
//! The handlers talk to the store themselves. Wrap the router in
//! [`crate::tracking::TrackRequests`] (or any other [`Layer`]) with
//! [`RequestRouter::layered`], or let [`crate::DataLayer::dispatch_request`]
//! do it.
//!
//! # Example
//!
//! ```
//! use datalayer_core::action::Action;
//! use datalayer_core::pipeline::Handler;
//! use datalayer_runtime::dispatch::{dispatch_request, RequestOptions};
//! use serde_json::json;
//!
//! #[derive(Default)]
//! struct Posts { requested: usize, received: Vec<serde_json::Value> }
//!
//! let mut router = dispatch_request(
//!     |posts: &mut Posts, _action: &Action| posts.requested += 1,
//!     |posts: &mut Posts, _action: &Action, data| posts.received.push(data),
//!     |_posts: &mut Posts, _action: &Action, _error| {},
//!     RequestOptions::new(),
//! );
//!
//! let mut posts = Posts::default();
//! router.handle(&mut posts, Action::new("POSTS_REQUEST"));
//! router.handle(&mut posts, Action::new("POSTS_REQUEST").with_data(json!([1, 2])));
//!
//! assert_eq!(posts.requested, 1);
//! assert_eq!(posts.received, vec![json!([1, 2])]);
//! ```

use crate::error::RequestError;
use crate::metrics::RouterMetrics;
use crate::schema::{ParseError, SchemaParser};
use datalayer_core::action::Action;
use datalayer_core::inspect::{self, Progress};
use datalayer_core::pipeline::{Handler, Layer};
use serde_json::Value;
use std::fmt;

/// Converts a raw response payload into the success handler's input.
pub type FromApi<T> = Box<dyn Fn(Value) -> Result<T, ParseError>>;

type InitiatorFn<D> = Box<dyn FnMut(&mut D, &Action)>;
type SuccessFn<D, T> = Box<dyn FnMut(&mut D, &Action, T)>;
type ErrorFn<D> = Box<dyn FnMut(&mut D, &Action, RequestError)>;
type ProgressFn<D> = Box<dyn FnMut(&mut D, &Action, Progress)>;

/// Optional parts of a [`RequestRouter`].
pub struct RequestOptions<D, T = Value> {
    from_api: FromApi<T>,
    on_progress: Option<ProgressFn<D>>,
}

impl<D> RequestOptions<D, Value> {
    /// Identity `from_api`, no progress handler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            from_api: Box::new(Ok::<Value, ParseError>),
            on_progress: None,
        }
    }
}

impl<D> Default for RequestOptions<D, Value> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D, T> RequestOptions<D, T> {
    /// Convert response data with `from_api` before `on_success` sees it.
    #[must_use]
    pub fn with_from_api<U, F>(self, from_api: F) -> RequestOptions<D, U>
    where
        F: Fn(Value) -> Result<U, ParseError> + 'static,
    {
        RequestOptions {
            from_api: Box::new(from_api),
            on_progress: self.on_progress,
        }
    }

    /// Convert response data with a schema parser.
    #[must_use]
    pub fn with_parser<U: 'static>(self, parser: SchemaParser<U>) -> RequestOptions<D, U> {
        RequestOptions {
            from_api: parser_fn(parser),
            on_progress: self.on_progress,
        }
    }

    /// Handle progress actions.
    #[must_use]
    pub fn with_on_progress<F>(mut self, on_progress: F) -> Self
    where
        F: FnMut(&mut D, &Action, Progress) + 'static,
    {
        self.on_progress = Some(Box::new(on_progress));
        self
    }
}

impl<D, T> fmt::Debug for RequestOptions<D, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("on_progress", &self.on_progress.is_some())
            .finish_non_exhaustive()
    }
}

/// Box a schema parser as a [`FromApi`].
#[must_use]
pub fn parser_fn<T: 'static>(parser: SchemaParser<T>) -> FromApi<T> {
    Box::new(move |data| parser.parse(data))
}

/// Routes one action to one handler.
pub struct RequestRouter<D, T = Value> {
    initiator: InitiatorFn<D>,
    on_success: SuccessFn<D, T>,
    on_error: ErrorFn<D>,
    options: RequestOptions<D, T>,
}

/// Build a [`RequestRouter`].
pub fn dispatch_request<D, T, I, S, E>(
    initiator: I,
    on_success: S,
    on_error: E,
    options: RequestOptions<D, T>,
) -> RequestRouter<D, T>
where
    I: FnMut(&mut D, &Action) + 'static,
    S: FnMut(&mut D, &Action, T) + 'static,
    E: FnMut(&mut D, &Action, RequestError) + 'static,
{
    RequestRouter {
        initiator: Box::new(initiator),
        on_success: Box::new(on_success),
        on_error: Box::new(on_error),
        options,
    }
}

impl<D, T> RequestRouter<D, T> {
    /// Wrap this router in a middleware layer.
    pub fn layered<L>(self, layer: &L) -> L::Handler
    where
        L: Layer<Self>,
    {
        layer.layer(self)
    }
}

impl<D, T> Handler<D> for RequestRouter<D, T> {
    type Output = ();

    fn handle(&mut self, store: &mut D, action: Action) {
        if let Some(error) = inspect::error(&action) {
            let error = RequestError::Remote(error.clone());
            RouterMetrics::record_branch("error");
            tracing::debug!(
                action_type = action.action_type().unwrap_or_default(),
                "Routing to on_error"
            );
            (self.on_error)(store, &action, error);
            return;
        }

        if let Some(data) = inspect::data(&action) {
            match (self.options.from_api)(data.clone()) {
                Ok(parsed) => {
                    RouterMetrics::record_branch("success");
                    tracing::debug!(
                        action_type = action.action_type().unwrap_or_default(),
                        "Routing to on_success"
                    );
                    (self.on_success)(store, &action, parsed);
                },
                Err(error) => {
                    RouterMetrics::record_branch("parse_error");
                    tracing::debug!(
                        action_type = action.action_type().unwrap_or_default(),
                        kind = error.kind(),
                        "Response rejected, routing to on_error"
                    );
                    (self.on_error)(store, &action, RequestError::Parse(error));
                },
            }
            return;
        }

        if let Some(progress) = inspect::progress(&action) {
            RouterMetrics::record_branch("progress");
            if let Some(on_progress) = self.options.on_progress.as_mut() {
                on_progress(store, &action, Progress::from_value(progress));
            }
            return;
        }

        RouterMetrics::record_branch("initiate");
        tracing::debug!(
            action_type = action.action_type().unwrap_or_default(),
            "Initiating request"
        );
        (self.initiator)(store, &action);
    }
}

impl<D, T> fmt::Debug for RequestRouter<D, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestRouter")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
