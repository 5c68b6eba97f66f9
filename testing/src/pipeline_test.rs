//! Ergonomic testing utilities for dispatch pipelines
//!
//! This module provides a fluent API for testing handlers with readable Given-When-Then syntax.

#![allow(clippy::module_name_repetitions)] // PipelineTest is the natural name

use datalayer_core::action::Action;
use datalayer_core::pipeline::Handler;
use datalayer_runtime::ledger::RequestLedger;

/// Type alias for store assertion functions
type StoreAssertion<D> = Box<dyn FnOnce(&D)>;

/// Type alias for output assertion functions
type OutputAssertion<O> = Box<dyn FnOnce(&[O])>;

/// Type alias for ledger assertion functions
type LedgerAssertion = Box<dyn FnOnce(&RequestLedger)>;

/// Fluent API for testing a pipeline with Given-When-Then syntax
///
/// Every action passed to `when_action` is handled in order against the same
/// store; assertions run once all of them are done.
///
/// # Example
///
/// ```
/// use datalayer_core::action::Action;
/// use datalayer_core::pipeline::handler_fn;
/// use datalayer_testing::PipelineTest;
///
/// PipelineTest::new(handler_fn(|count: &mut usize, _action: Action| {
///     *count += 1;
///     *count
/// }))
/// .given_store(0)
/// .when_action(Action::new("A"))
/// .when_action(Action::new("B"))
/// .then_store(|count| assert_eq!(*count, 2))
/// .then_outputs(|outputs| assert_eq!(outputs, &[1, 2]))
/// .run();
/// ```
pub struct PipelineTest<H, D>
where
    H: Handler<D>,
{
    handler: H,
    store: Option<D>,
    ledger: Option<RequestLedger>,
    actions: Vec<Action>,
    store_assertions: Vec<StoreAssertion<D>>,
    output_assertions: Vec<OutputAssertion<H::Output>>,
    ledger_assertions: Vec<LedgerAssertion>,
}

impl<H, D> PipelineTest<H, D>
where
    H: Handler<D>,
{
    /// Create a new pipeline test around the given handler
    #[must_use]
    pub const fn new(handler: H) -> Self {
        Self {
            handler,
            store: None,
            ledger: None,
            actions: Vec::new(),
            store_assertions: Vec::new(),
            output_assertions: Vec::new(),
            ledger_assertions: Vec::new(),
        }
    }

    /// Set the ledger the pipeline writes to, for `then_ledger`
    #[must_use]
    pub fn with_ledger(mut self, ledger: &RequestLedger) -> Self {
        self.ledger = Some(ledger.clone());
        self
    }

    /// Set the initial store (Given)
    #[must_use]
    pub fn given_store(mut self, store: D) -> Self {
        self.store = Some(store);
        self
    }

    /// Queue an action to handle (When)
    #[must_use]
    pub fn when_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Add an assertion about the resulting store (Then)
    #[must_use]
    pub fn then_store<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&D) + 'static,
    {
        self.store_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the handler outputs, one per action (Then)
    #[must_use]
    pub fn then_outputs<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[H::Output]) + 'static,
    {
        self.output_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the ledger (Then)
    #[must_use]
    pub fn then_ledger<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&RequestLedger) + 'static,
    {
        self.ledger_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if the store is not set, if ledger assertions were added without
    /// a ledger, or if any assertions fail.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(mut self) {
        let mut store = self
            .store
            .take()
            .expect("Store must be set with given_store()");

        let outputs: Vec<H::Output> = self
            .actions
            .drain(..)
            .map(|action| self.handler.handle(&mut store, action))
            .collect();

        for assertion in self.store_assertions {
            assertion(&store);
        }

        for assertion in self.output_assertions {
            assertion(&outputs);
        }

        if !self.ledger_assertions.is_empty() {
            let ledger = self
                .ledger
                .as_ref()
                .expect("Ledger must be set with with_ledger()");
            for assertion in self.ledger_assertions {
                assertion(ledger);
            }
        }
    }
}

impl<H, D> std::fmt::Debug for PipelineTest<H, D>
where
    H: Handler<D>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineTest")
            .field("actions", &self.actions)
            .field("store_assertions", &self.store_assertions.len())
            .field("output_assertions", &self.output_assertions.len())
            .field("ledger_assertions", &self.ledger_assertions.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RecordingDispatcher, test_environment};
    use datalayer_core::pipeline::{Dispatcher, Layer, handler_fn};
    use datalayer_runtime::tracking::track_requests;

    #[test]
    fn tracked_pipeline_forwards_stamped_actions() {
        let ledger = RequestLedger::new();
        let handler = track_requests(&ledger, test_environment())
            .layer(handler_fn(|store: &mut RecordingDispatcher, action: Action| store.dispatch(action)));

        PipelineTest::new(handler)
            .with_ledger(&ledger)
            .given_store(RecordingDispatcher::new())
            .when_action(Action::new("POSTS_REQUEST"))
            .then_store(|store| {
                let stamped = store.last().and_then(|a| a.data_layer().request_id.clone());
                assert_eq!(stamped, Some("req-1".into()));
            })
            .then_outputs(|outputs| assert_eq!(outputs, &[1]))
            .then_ledger(|ledger| assert_eq!(ledger.len(), 1))
            .run();
    }
}
