//! Prometheus metrics for the request pipeline.
//!
//! This module provides metric collection for:
//! - Ledger writes and request id minting
//! - Terminal statuses and cross-reference updates
//! - Router branch selection
//! - Parser failures
//!
//! # Example
//!
//! ```rust,no_run
//! use datalayer_runtime::metrics::PrometheusMetrics;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut metrics = PrometheusMetrics::new();
//! metrics.install()?;
//!
//! // ... dispatch actions ...
//!
//! if let Some(text) = metrics.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use datalayer_core::inspect::RequestStatus;
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to install metrics recorder
    #[error("Failed to install metrics recorder: {0}")]
    Install(String),
}

/// Prometheus recorder with a render handle.
#[derive(Default)]
pub struct PrometheusMetrics {
    handle: Option<PrometheusHandle>,
}

impl PrometheusMetrics {
    /// Create an uninstalled recorder.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Register metric descriptions and install the global recorder.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::Install` if the recorder cannot be installed for
    /// a reason other than one already being present.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., in tests), this logs a warning
    /// and leaves the handle empty; metrics keep flowing to the existing one.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Data layer metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this instance did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

impl std::fmt::Debug for PrometheusMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusMetrics")
            .field("installed", &self.handle.is_some())
            .finish()
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Ledger
    describe_counter!(
        "datalayer_ledger_writes_total",
        "Total number of ledger entries written"
    );
    describe_counter!(
        "datalayer_request_ids_minted_total",
        "Total number of request ids minted by the tracking middleware"
    );
    describe_counter!(
        "datalayer_requests_completed_total",
        "Total number of transitions into a terminal status, by status"
    );
    describe_counter!(
        "datalayer_origin_updates_total",
        "Total number of originating entries updated from a different fingerprint"
    );
    describe_counter!(
        "datalayer_progress_passthrough_total",
        "Total number of progress actions forwarded without bookkeeping"
    );

    // Router
    describe_counter!(
        "datalayer_router_branches_total",
        "Total number of router invocations, by branch taken"
    );

    // Parser
    describe_counter!(
        "datalayer_parse_failures_total",
        "Total number of payloads rejected by a schema parser, by kind"
    );
}

/// Ledger metrics recorder.
pub struct LedgerMetrics;

impl LedgerMetrics {
    /// Record an entry write over an entry that had status `previous`.
    ///
    /// Replaying a response leaves the completion count unchanged.
    pub fn record_write(status: RequestStatus, previous: Option<RequestStatus>) {
        counter!("datalayer_ledger_writes_total").increment(1);
        if completes(status, previous) {
            counter!("datalayer_requests_completed_total", "status" => status.as_str())
                .increment(1);
        }
    }

    /// Record a freshly minted request id.
    pub fn record_minted() {
        counter!("datalayer_request_ids_minted_total").increment(1);
    }

    /// Record an update to the entry that originated a request.
    pub fn record_origin_update() {
        counter!("datalayer_origin_updates_total").increment(1);
    }

    /// Record a progress action that skipped bookkeeping.
    pub fn record_progress_passthrough() {
        counter!("datalayer_progress_passthrough_total").increment(1);
    }
}

fn completes(status: RequestStatus, previous: Option<RequestStatus>) -> bool {
    status.is_terminal() && previous != Some(status)
}

/// Router metrics recorder.
pub struct RouterMetrics;

impl RouterMetrics {
    /// Record which branch a router took.
    pub fn record_branch(branch: &'static str) {
        counter!("datalayer_router_branches_total", "branch" => branch).increment(1);
    }
}

/// Parser metrics recorder.
pub struct ParserMetrics;

impl ParserMetrics {
    /// Record a rejected payload.
    pub fn record_failure(kind: &'static str) {
        counter!("datalayer_parse_failures_total", "kind" => kind).increment(1);
    }
}
