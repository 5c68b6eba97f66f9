//! # Data Layer Testing
//!
//! Testing utilities and helpers for the data layer.
//!
//! This crate provides:
//! - Deterministic implementations of the tracking environment traits
//! - A dispatcher that records what it is asked to dispatch
//! - A Given-When-Then harness for pipelines ([`PipelineTest`])
//! - proptest strategies for actions and JSON payloads
//! - Tracing initialisation for tests
//!
//! ## Example
//!
//! ```
//! use datalayer_core::action::Action;
//! use datalayer_runtime::DataLayer;
//! use datalayer_runtime::config::DataLayerConfig;
//! use datalayer_testing::test_environment;
//!
//! let layer = DataLayer::with_environment(DataLayerConfig::default(), test_environment());
//! assert!(layer.get_request_meta(&Action::new("POSTS_REQUEST")).is_none());
//! ```

use chrono::{DateTime, Utc};
use datalayer_core::environment::{Clock, IdGenerator};
use datalayer_runtime::tracking::TrackingEnvironment;

mod pipeline_test;

pub use pipeline_test::PipelineTest;

/// Mock implementations of the environment traits.
pub mod mocks {
    use super::{Clock, DateTime, IdGenerator, Utc};
    use datalayer_core::action::Action;
    use datalayer_core::pipeline::Dispatcher;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use datalayer_testing::mocks::FixedClock;
    /// use datalayer_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Predictable request ids: `req-1`, `req-2`, ...
    #[derive(Debug, Default)]
    pub struct SequentialIds {
        next: AtomicU64,
    }

    impl SequentialIds {
        /// Start at `req-1`
        #[must_use]
        pub const fn new() -> Self {
            Self {
                next: AtomicU64::new(0),
            }
        }

        /// How many ids have been handed out
        #[must_use]
        pub fn issued(&self) -> u64 {
            self.next.load(Ordering::SeqCst)
        }
    }

    impl IdGenerator for SequentialIds {
        fn next_id(&self) -> String {
            format!("req-{}", self.next.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }

    /// A host store that only remembers what was dispatched to it.
    ///
    /// `dispatch` returns the number of actions recorded so far.
    #[derive(Debug, Default, Clone, PartialEq)]
    pub struct RecordingDispatcher {
        /// Every dispatched action, in order
        pub actions: Vec<Action>,
    }

    impl RecordingDispatcher {
        /// Empty recorder
        #[must_use]
        pub const fn new() -> Self {
            Self { actions: Vec::new() }
        }

        /// `type` of every recorded action, untyped actions skipped
        #[must_use]
        pub fn action_types(&self) -> Vec<&str> {
            self.actions.iter().filter_map(Action::action_type).collect()
        }

        /// Most recent action
        #[must_use]
        pub fn last(&self) -> Option<&Action> {
            self.actions.last()
        }
    }

    impl Dispatcher for RecordingDispatcher {
        type Output = usize;

        fn dispatch(&mut self, action: Action) -> usize {
            self.actions.push(action);
            self.actions.len()
        }
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use datalayer_core::action::{ACTION_TYPE_KEY, Action, META_KEY};
    use proptest::prelude::*;
    use serde_json::{Map, Value};

    /// Arbitrary JSON, nested up to three levels.
    pub fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[a-z0-9 ]{0,8}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    /// Arbitrary action body: a `type` plus a few extra keys, never `meta`.
    pub fn arb_body() -> impl Strategy<Value = Map<String, Value>> {
        (
            "[A-Z_]{1,12}",
            prop::collection::btree_map("[a-z]{1,6}", arb_json(), 0..4),
        )
            .prop_map(|(action_type, extra)| {
                let mut body: Map<String, Value> =
                    extra.into_iter().filter(|(key, _)| key != META_KEY).collect();
                body.insert(ACTION_TYPE_KEY.to_string(), Value::String(action_type));
                body
            })
    }

    /// Arbitrary action with an empty envelope.
    pub fn arb_action() -> impl Strategy<Value = Action> {
        arb_body().prop_map(Action::from_body)
    }
}

/// Tracing setup for tests.
pub mod logging {
    use std::io;
    use std::sync::{Arc, Mutex, PoisonError};
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::fmt::MakeWriter;
    use tracing_subscriber::util::SubscriberInitExt;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Buffer {
        type Writer = Self;

        fn make_writer(&'a self) -> Self {
            self.clone()
        }
    }

    /// Run `f` with a thread-local subscriber and return what it logged at
    /// `debug` and above, without ANSI colours.
    pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
        let buffer = Buffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(buffer.clone())
            .with_max_level(LevelFilter::DEBUG)
            .with_ansi(false)
            .finish();

        let output = {
            let _guard = subscriber.set_default();
            f()
        };

        let bytes = buffer.0.lock().unwrap_or_else(PoisonError::into_inner);
        (output, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Install a fmt subscriber that writes through the test harness.
    ///
    /// Honours `RUST_LOG`, defaulting to `debug`. Safe to call from every test;
    /// only the first call installs anything.
    pub fn init_test_tracing() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    }
}

/// Fixed clock plus sequential ids, ready for a [`datalayer_runtime::DataLayer`].
#[must_use]
pub fn test_environment() -> TrackingEnvironment {
    TrackingEnvironment::new(test_clock(), SequentialIds::new())
}

// Re-export commonly used items
pub use mocks::{FixedClock, RecordingDispatcher, SequentialIds, test_clock};
pub use logging::{capture_logs, init_test_tracing};
