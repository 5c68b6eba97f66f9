//! Dispatch pipeline traits.
//!
//! - [`Dispatcher`]: the host store. Owns dispatch of new actions.
//! - [`Handler`]: one stage of the pipeline, `(store, action) -> output`.
//! - [`Layer`]: middleware, `next -> handler`.
//!
//! Everything here is synchronous. A handler runs to completion before the
//! host hands it the next action.

use crate::action::Action;
use std::fmt;

/// The host store that actions are dispatched to.
pub trait Dispatcher {
    /// What a dispatch returns to its caller
    type Output;

    /// Dispatch a plain action.
    fn dispatch(&mut self, action: Action) -> Self::Output;

    /// Dispatch an action or run a thunk against this store.
    fn dispatch_any(&mut self, item: Dispatchable<Self>) -> Self::Output
    where
        Self: Sized,
    {
        match item {
            Dispatchable::Action(action) => self.dispatch(action),
            Dispatchable::Thunk(thunk) => thunk(self),
        }
    }
}

/// Deferred work that receives the store and decides what to dispatch.
pub type Thunk<D> = Box<dyn FnOnce(&mut D) -> <D as Dispatcher>::Output>;

/// Something a [`Dispatcher`] accepts.
pub enum Dispatchable<D: Dispatcher> {
    /// A plain action
    Action(Action),
    /// A function of the store
    Thunk(Thunk<D>),
}

impl<D: Dispatcher> Dispatchable<D> {
    /// Wrap a closure as a thunk.
    #[must_use]
    pub fn thunk<F>(f: F) -> Self
    where
        F: FnOnce(&mut D) -> D::Output + 'static,
    {
        Self::Thunk(Box::new(f))
    }

    /// The action, when this is one.
    #[must_use]
    pub const fn as_action(&self) -> Option<&Action> {
        match self {
            Self::Action(action) => Some(action),
            Self::Thunk(_) => None,
        }
    }
}

impl<D: Dispatcher> From<Action> for Dispatchable<D> {
    fn from(action: Action) -> Self {
        Self::Action(action)
    }
}

// Manual Debug implementation since thunks don't implement Debug
impl<D: Dispatcher> fmt::Debug for Dispatchable<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action(action) => f.debug_tuple("Dispatchable::Action").field(action).finish(),
            Self::Thunk(_) => write!(f, "Dispatchable::Thunk(<fn>)"),
        }
    }
}

/// One stage of the dispatch pipeline.
pub trait Handler<D> {
    /// Result handed back to whoever invoked the stage
    type Output;

    /// Process one action.
    fn handle(&mut self, store: &mut D, action: Action) -> Self::Output;
}

impl<D, H: Handler<D> + ?Sized> Handler<D> for Box<H> {
    type Output = H::Output;

    fn handle(&mut self, store: &mut D, action: Action) -> Self::Output {
        (**self).handle(store, action)
    }
}

/// Adapter returned by [`handler_fn`].
#[derive(Clone, Copy)]
pub struct HandlerFn<F> {
    f: F,
}

impl<F> fmt::Debug for HandlerFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerFn").finish_non_exhaustive()
    }
}

/// Use a closure as a [`Handler`].
///
/// # Example
///
/// ```
/// use datalayer_core::action::Action;
/// use datalayer_core::pipeline::{handler_fn, Handler};
///
/// let mut seen = Vec::new();
/// let mut stage = handler_fn(|log: &mut Vec<String>, action: Action| {
///     log.push(action.action_type().unwrap_or_default().to_string());
/// });
/// stage.handle(&mut seen, Action::new("PING"));
/// assert_eq!(seen, vec!["PING".to_string()]);
/// ```
pub const fn handler_fn<F>(f: F) -> HandlerFn<F> {
    HandlerFn { f }
}

impl<D, F, O> Handler<D> for HandlerFn<F>
where
    F: FnMut(&mut D, Action) -> O,
{
    type Output = O;

    fn handle(&mut self, store: &mut D, action: Action) -> O {
        (self.f)(store, action)
    }
}

/// Middleware: wraps the next stage in a new one.
pub trait Layer<H> {
    /// The wrapped stage
    type Handler;

    /// Wrap `next`.
    fn layer(&self, next: H) -> Self::Handler;
}

/// A layer that adds nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl<H> Layer<H> for Identity {
    type Handler = H;

    fn layer(&self, next: H) -> H {
        next
    }
}
