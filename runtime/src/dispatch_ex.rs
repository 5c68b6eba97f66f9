//! Dispatch router, action-creator flavour.
//!
//! [`ActionRouter`] follows the same precedence as
//! [`crate::dispatch::RequestRouter`] (error, then data, then progress, then
//! fetch) but its handlers are action creators: each returns the follow-up
//! action (or thunk) and the router dispatches it. A handler that returns
//! `None` makes the call a no-op.
//!
//! Missing `fetch`, `on_success` or `on_error` handlers are reported as
//! [`ConfigurationWarning`]s when the router is built. The router still runs;
//! the corresponding requests or responses are dropped. A `fetch` that returns
//! nothing is recorded the first time it happens for each action type.
//!
//! # Example
//!
//! ```
//! use datalayer_core::action::Action;
//! use datalayer_core::pipeline::{Dispatcher, Handler};
//! use datalayer_runtime::dispatch_ex::{dispatch_request_ex, RequestHandlers};
//! use serde_json::json;
//!
//! #[derive(Default)]
//! struct Log(Vec<Action>);
//!
//! impl Dispatcher for Log {
//!     type Output = ();
//!     fn dispatch(&mut self, action: Action) {
//!         self.0.push(action);
//!     }
//! }
//!
//! let mut router = dispatch_request_ex(
//!     RequestHandlers::new()
//!         .fetch(|_action: &Action| Some(Action::new("HTTP").into()))
//!         .on_success(|_action: &Action, posts| Some(Action::new("POSTS_RECEIVE").with("posts", posts).into()))
//!         .on_error(|_action: &Action, _error| None),
//! );
//!
//! let mut log = Log::default();
//! router.handle(&mut log, Action::new("POSTS_REQUEST"));
//! router.handle(&mut log, Action::new("POSTS_REQUEST").with_data(json!([1])));
//!
//! assert_eq!(log.0[0].action_type(), Some("HTTP"));
//! assert_eq!(log.0[1].get("posts"), Some(&json!([1])));
//! ```

use crate::dispatch::{FromApi, parser_fn};
use crate::error::RequestError;
use crate::metrics::RouterMetrics;
use crate::schema::{ParseError, SchemaParser};
use crate::warning::ConfigurationWarning;
use datalayer_core::action::Action;
use datalayer_core::inspect::{self, Progress};
use datalayer_core::pipeline::{Dispatchable, Dispatcher, Handler, Layer};
use serde_json::Value;
use std::fmt;

type FetchFn<D> = Box<dyn Fn(&Action) -> Option<Dispatchable<D>>>;
type SuccessFn<D, T> = Box<dyn Fn(&Action, T) -> Option<Dispatchable<D>>>;
type ErrorFn<D> = Box<dyn Fn(&Action, RequestError) -> Option<Dispatchable<D>>>;
type ProgressFn<D> = Box<dyn Fn(&Action, Progress) -> Option<Dispatchable<D>>>;

/// Action creators for an [`ActionRouter`].
pub struct RequestHandlers<D: Dispatcher, T = Value> {
    fetch: Option<FetchFn<D>>,
    on_success: Option<SuccessFn<D, T>>,
    on_error: Option<ErrorFn<D>>,
    on_progress: Option<ProgressFn<D>>,
    from_api: FromApi<T>,
}

impl<D: Dispatcher> RequestHandlers<D, Value> {
    /// No handlers, identity `from_api`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_from_api(Ok::<Value, ParseError>)
    }
}

impl<D: Dispatcher> Default for RequestHandlers<D, Value> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Dispatcher, T> RequestHandlers<D, T> {
    /// No handlers, response data converted by `from_api`.
    #[must_use]
    pub fn with_from_api<F>(from_api: F) -> Self
    where
        F: Fn(Value) -> Result<T, ParseError> + 'static,
    {
        Self {
            fetch: None,
            on_success: None,
            on_error: None,
            on_progress: None,
            from_api: Box::new(from_api),
        }
    }

    /// No handlers, response data converted by a schema parser.
    #[must_use]
    pub fn with_parser(parser: SchemaParser<T>) -> Self
    where
        T: 'static,
    {
        Self {
            fetch: None,
            on_success: None,
            on_error: None,
            on_progress: None,
            from_api: parser_fn(parser),
        }
    }

    /// Build the request for an action that carries no response yet.
    #[must_use]
    pub fn fetch<F>(mut self, fetch: F) -> Self
    where
        F: Fn(&Action) -> Option<Dispatchable<D>> + 'static,
    {
        self.fetch = Some(Box::new(fetch));
        self
    }

    /// Build the follow-up for parsed response data.
    #[must_use]
    pub fn on_success<F>(mut self, on_success: F) -> Self
    where
        F: Fn(&Action, T) -> Option<Dispatchable<D>> + 'static,
    {
        self.on_success = Some(Box::new(on_success));
        self
    }

    /// Build the follow-up for a remote or parse error.
    #[must_use]
    pub fn on_error<F>(mut self, on_error: F) -> Self
    where
        F: Fn(&Action, RequestError) -> Option<Dispatchable<D>> + 'static,
    {
        self.on_error = Some(Box::new(on_error));
        self
    }

    /// Build the follow-up for a progress report.
    #[must_use]
    pub fn on_progress<F>(mut self, on_progress: F) -> Self
    where
        F: Fn(&Action, Progress) -> Option<Dispatchable<D>> + 'static,
    {
        self.on_progress = Some(Box::new(on_progress));
        self
    }

    fn missing(&self) -> Vec<ConfigurationWarning> {
        let mut warnings = Vec::new();
        if self.fetch.is_none() {
            warnings.push(ConfigurationWarning::MissingFetch);
        }
        if self.on_success.is_none() {
            warnings.push(ConfigurationWarning::MissingOnSuccess);
        }
        if self.on_error.is_none() {
            warnings.push(ConfigurationWarning::MissingOnError);
        }
        warnings
    }
}

impl<D: Dispatcher, T> fmt::Debug for RequestHandlers<D, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandlers")
            .field("fetch", &self.fetch.is_some())
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .finish_non_exhaustive()
    }
}

/// Routes one action to one action creator and dispatches the result.
pub struct ActionRouter<D: Dispatcher, T = Value> {
    handlers: RequestHandlers<D, T>,
    warnings: Vec<ConfigurationWarning>,
    report_warnings: bool,
}

/// Build an [`ActionRouter`], reporting configuration warnings in debug builds.
#[must_use]
pub fn dispatch_request_ex<D: Dispatcher, T>(handlers: RequestHandlers<D, T>) -> ActionRouter<D, T> {
    ActionRouter::new(handlers, cfg!(debug_assertions))
}

impl<D: Dispatcher, T> ActionRouter<D, T> {
    /// Build a router; warnings are logged only when `report_warnings` is set.
    #[must_use]
    pub fn new(handlers: RequestHandlers<D, T>, report_warnings: bool) -> Self {
        let warnings = handlers.missing();
        for warning in &warnings {
            warning.report(report_warnings);
        }
        Self {
            handlers,
            warnings,
            report_warnings,
        }
    }

    /// Problems found when the router was built or while it ran.
    #[must_use]
    pub fn warnings(&self) -> &[ConfigurationWarning] {
        &self.warnings
    }

    /// Wrap this router in a middleware layer.
    pub fn layered<L>(self, layer: &L) -> L::Handler
    where
        L: Layer<Self>,
    {
        layer.layer(self)
    }

    /// Pick the branch for `action` and build its follow-up.
    fn follow_up(&mut self, action: &Action) -> Option<Dispatchable<D>> {
        let handlers = &self.handlers;
        let action_type = action.action_type().unwrap_or_default();

        if let Some(error) = inspect::error(action) {
            RouterMetrics::record_branch("error");
            tracing::debug!(
                action_type,
                handled = handlers.on_error.is_some(),
                "Routing to on_error"
            );
            let on_error = handlers.on_error.as_ref()?;
            return on_error(action, RequestError::Remote(error.clone()));
        }

        if let Some(data) = inspect::data(action) {
            return match (handlers.from_api)(data.clone()) {
                Ok(parsed) => {
                    RouterMetrics::record_branch("success");
                    tracing::debug!(
                        action_type,
                        handled = handlers.on_success.is_some(),
                        "Routing to on_success"
                    );
                    let on_success = handlers.on_success.as_ref()?;
                    on_success(action, parsed)
                },
                Err(error) => {
                    RouterMetrics::record_branch("parse_error");
                    tracing::debug!(
                        action_type,
                        kind = error.kind(),
                        handled = handlers.on_error.is_some(),
                        "Response rejected, routing to on_error"
                    );
                    let on_error = handlers.on_error.as_ref()?;
                    on_error(action, RequestError::Parse(error))
                },
            };
        }

        if let Some(progress) = inspect::progress(action) {
            RouterMetrics::record_branch("progress");
            tracing::debug!(
                action_type,
                handled = handlers.on_progress.is_some(),
                "Routing to on_progress"
            );
            let on_progress = handlers.on_progress.as_ref()?;
            return on_progress(action, Progress::from_value(progress));
        }

        RouterMetrics::record_branch("initiate");
        tracing::debug!(action_type, handled = handlers.fetch.is_some(), "Routing to fetch");
        let fetch = handlers.fetch.as_ref()?;
        let request = fetch(action);
        if request.is_none() {
            let warning = ConfigurationWarning::FetchProducedNoAction {
                action_type: action.action_type().map(str::to_string),
            };
            warning.report(self.report_warnings);
            if !self.warnings.contains(&warning) {
                self.warnings.push(warning);
            }
        }
        request
    }
}

impl<D: Dispatcher, T> Handler<D> for ActionRouter<D, T> {
    type Output = Option<D::Output>;

    fn handle(&mut self, store: &mut D, action: Action) -> Option<D::Output> {
        let follow_up = self.follow_up(&action)?;
        tracing::debug!(
            action_type = action.action_type().unwrap_or_default(),
            follow_up = ?follow_up.as_action().and_then(Action::action_type),
            "Dispatching follow-up"
        );
        Some(store.dispatch_any(follow_up))
    }
}

impl<D: Dispatcher, T> fmt::Debug for ActionRouter<D, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRouter")
            .field("handlers", &self.handlers)
            .field("warnings", &self.warnings)
            .finish_non_exhaustive()
    }
}
