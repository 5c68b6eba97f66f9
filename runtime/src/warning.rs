//! Non-fatal configuration warnings.
//!
//! A router missing a handler still runs; the affected requests or responses
//! are dropped. These warnings are how that gets noticed during development.

use std::fmt;

/// A router was set up in a way that will silently drop work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationWarning {
    /// No `fetch` handler: requests will never be issued
    MissingFetch,
    /// No `on_success` handler: responses will be dropped
    MissingOnSuccess,
    /// No `on_error` handler: errors will be dropped
    MissingOnError,
    /// `fetch` returned nothing for an action
    FetchProducedNoAction {
        /// `type` of the action that was not fetched
        action_type: Option<String>,
    },
}

impl ConfigurationWarning {
    /// Log through `tracing` unless `enabled` is false.
    pub fn report(&self, enabled: bool) {
        if enabled {
            tracing::warn!(warning = %self, "Data layer configuration warning");
        }
    }
}

impl fmt::Display for ConfigurationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingFetch => write!(f, "missing fetch handler; requests will be dropped"),
            Self::MissingOnSuccess => {
                write!(f, "missing on_success handler; responses will be dropped")
            },
            Self::MissingOnError => write!(f, "missing on_error handler; errors will be dropped"),
            Self::FetchProducedNoAction { action_type } => write!(
                f,
                "fetch handler produced no action for {}",
                action_type.as_deref().unwrap_or("<untyped action>")
            ),
        }
    }
}
