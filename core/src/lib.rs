//! # Data Layer Core
//!
//! Core types for the data layer request pipeline.
//!
//! This crate provides the pieces every stage of the pipeline agrees on:
//! what an action looks like, how an action is identified, and how the
//! request metadata riding on an action is read.
//!
//! ## Core Concepts
//!
//! - **Action**: A free-form body plus an optional metadata envelope
//! - **Fingerprint**: Canonical, key-order independent serialization of the body
//! - **Inspector**: Read-only projections of `meta.dataLayer` and the derived status
//! - **Pipeline**: `Dispatcher` (host store), `Handler` (one stage), `Layer` (middleware)
//! - **Environment**: Injected clock and id generator
//!
//! ## Example
//!
//! ```
//! use datalayer_core::action::Action;
//! use datalayer_core::fingerprint::fingerprint;
//! use datalayer_core::inspect::{request_status, RequestStatus};
//! use serde_json::json;
//!
//! let pending = Action::new("POSTS_REQUEST").with("site", json!(42));
//! let done = pending.clone().with_data(json!({ "found": 3 }));
//!
//! assert_eq!(fingerprint(&pending), fingerprint(&done));
//! assert_eq!(request_status(&pending), RequestStatus::Pending);
//! assert_eq!(request_status(&done), RequestStatus::Success);
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

/// Action model and the `meta.dataLayer` envelope
pub mod action;

/// Canonical action fingerprints
pub mod fingerprint;

/// Envelope projections and derived request status
pub mod inspect;

/// Dispatcher, handler and layer traits
pub mod pipeline;

/// Environment module - Dependency injection traits
///
/// Time and identity are the two non-deterministic inputs of request
/// tracking. Both are abstracted behind traits so tests can pin them.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock backed by [`Utc::now`]
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Mints process-unique request ids
    pub trait IdGenerator: Send + Sync {
        /// Produce an id that has not been handed out before
        fn next_id(&self) -> String;
    }

    /// Random v4 UUIDs
    #[derive(Debug, Clone, Copy, Default)]
    pub struct UuidGenerator;

    impl IdGenerator for UuidGenerator {
        fn next_id(&self) -> String {
            uuid::Uuid::new_v4().to_string()
        }
    }
}
