//! The data layer context object.
//!
//! [`DataLayer`] owns one [`RequestLedger`] and one [`TrackingEnvironment`]
//! and builds tracked routers over them, so every router built from the same
//! `DataLayer` reports into the same ledger.

use crate::config::DataLayerConfig;
use crate::dispatch::{RequestOptions, RequestRouter, dispatch_request};
use crate::dispatch_ex::{ActionRouter, RequestHandlers};
use crate::error::RequestError;
use crate::ledger::{LedgerSnapshot, RequestEntry, RequestLedger};
use crate::tracking::{TrackRequests, TrackRequestsLayer, TrackingEnvironment, track_requests};
use datalayer_core::action::Action;
use datalayer_core::pipeline::{Dispatcher, Layer};

/// Shared ledger plus the routers that write to it.
///
/// # Example
///
/// ```
/// use datalayer_core::action::Action;
/// use datalayer_core::pipeline::Handler;
/// use datalayer_runtime::config::DataLayerConfig;
/// use datalayer_runtime::dispatch::RequestOptions;
/// use datalayer_runtime::DataLayer;
/// use serde_json::json;
///
/// let layer = DataLayer::new(DataLayerConfig::default());
/// let mut router = layer.dispatch_request(
///     |_: &mut (), _: &Action| {},
///     |_: &mut (), _: &Action, _data| {},
///     |_: &mut (), _: &Action, _error| {},
///     RequestOptions::new(),
/// );
///
/// let request = Action::new("POSTS_REQUEST").with("page", json!(1));
/// router.handle(&mut (), request.clone());
///
/// assert!(layer.get_request_meta(&request).is_some_and(|entry| entry.is_pending()));
/// ```
#[derive(Debug, Clone)]
pub struct DataLayer {
    ledger: RequestLedger,
    env: TrackingEnvironment,
    config: DataLayerConfig,
}

impl DataLayer {
    /// Empty ledger, wall clock, random request ids.
    #[must_use]
    pub fn new(config: DataLayerConfig) -> Self {
        Self::with_environment(config, TrackingEnvironment::system())
    }

    /// Empty ledger with a custom clock and id source.
    #[must_use]
    pub fn with_environment(config: DataLayerConfig, env: TrackingEnvironment) -> Self {
        tracing::debug!(
            environment = %config.environment,
            expose_ledger = config.expose_ledger,
            "Data layer created"
        );
        Self {
            ledger: RequestLedger::new(),
            env,
            config,
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &DataLayerConfig {
        &self.config
    }

    /// Handle on the shared ledger.
    #[must_use]
    pub const fn ledger(&self) -> &RequestLedger {
        &self.ledger
    }

    /// Tracking middleware over the shared ledger, for custom pipelines.
    #[must_use]
    pub fn track_requests_layer(&self) -> TrackRequestsLayer {
        track_requests(&self.ledger, self.env.clone())
    }

    /// A tracked [`RequestRouter`].
    pub fn dispatch_request<D, T, I, S, E>(
        &self,
        initiator: I,
        on_success: S,
        on_error: E,
        options: RequestOptions<D, T>,
    ) -> TrackRequests<RequestRouter<D, T>>
    where
        I: FnMut(&mut D, &Action) + 'static,
        S: FnMut(&mut D, &Action, T) + 'static,
        E: FnMut(&mut D, &Action, RequestError) + 'static,
    {
        self.track_requests_layer()
            .layer(dispatch_request(initiator, on_success, on_error, options))
    }

    /// A tracked [`ActionRouter`]. Configuration warnings are logged outside
    /// production.
    pub fn dispatch_request_ex<D: Dispatcher, T>(
        &self,
        handlers: RequestHandlers<D, T>,
    ) -> TrackRequests<ActionRouter<D, T>> {
        let router = ActionRouter::new(handlers, self.config.reports_warnings());
        self.track_requests_layer().layer(router)
    }

    /// Ledger entry for `action`.
    #[must_use]
    pub fn get_request_meta(&self, action: &Action) -> Option<RequestEntry> {
        self.ledger.get_request_meta(action)
    }

    /// Forget everything tracked so far.
    pub fn reset(&self) {
        self.ledger.reset();
    }

    /// Ledger contents, when `expose_ledger` is set.
    #[must_use]
    pub fn diagnostics(&self) -> Option<LedgerSnapshot> {
        self.config.expose_ledger.then(|| self.ledger.snapshot())
    }
}

impl Default for DataLayer {
    fn default() -> Self {
        Self::new(DataLayerConfig::default())
    }
}
