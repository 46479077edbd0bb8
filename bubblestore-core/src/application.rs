//! Application contract.
//!
//! An [`Application`] owns the domain logic of a bubble: it knows the state a
//! bubble starts in, how to answer a request against the current state, and
//! how an event transforms one state into the next. Everything about storage
//! and concurrency is left to the [`Orchestrator`](crate::orchestrator::Orchestrator).
use std::future::Future;

use serde::{Serialize, de::DeserializeOwned};

/// What a request callback wants done.
///
/// Carrying no event means the request was read-only (or rejected) and nothing
/// is written. Carrying an event asks the orchestrator to apply and persist it
/// before handing the response back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestResult<R, E> {
    pub response: R,
    pub event: Option<E>,
}

impl<R, E> RequestResult<R, E> {
    /// Respond without recording anything.
    #[must_use]
    pub const fn respond(response: R) -> Self {
        Self {
            response,
            event: None,
        }
    }

    /// Respond and record `event`.
    #[must_use]
    pub const fn record(response: R, event: E) -> Self {
        Self {
            response,
            event: Some(event),
        }
    }
}

/// Domain logic driven by the orchestrator.
///
/// `request_callback` may run several times for one request under contention,
/// each time against a fresher state. It must not perform side effects that
/// cannot be repeated.
///
/// ```
/// use std::future::{Future, ready};
///
/// use bubblestore_core::application::{Application, RequestResult};
///
/// struct Counter;
///
/// impl Application for Counter {
///     type State = u64;
///     type Event = u64;
///     type Request = u64;
///     type Response = u64;
///     type Error = std::convert::Infallible;
///
///     fn initial_state(&self) -> u64 {
///         0
///     }
///
///     fn request_callback<'a>(
///         &'a self,
///         state: &'a u64,
///         _session_uuid: &'a str,
///         request: &'a u64,
///     ) -> impl Future<Output = Result<RequestResult<u64, u64>, Self::Error>> + Send + 'a {
///         ready(Ok(RequestResult::record(state + request, *request)))
///     }
///
///     fn apply_event(&self, state: &u64, event: &u64) -> u64 {
///         state + event
///     }
/// }
/// ```
// ANCHOR: application_trait
pub trait Application: Send + Sync {
    /// State held by each bubble. Persisted as JSON.
    type State: Serialize + DeserializeOwned + Send + Sync + 'static;
    /// Event produced by requests. Persisted as JSON.
    type Event: Serialize + Send + Sync + 'static;
    type Request: Sync;
    type Response: Send;
    /// Error a request callback may fail with.
    type Error: std::error::Error + Send + Sync + 'static;

    /// State of a bubble that has never recorded an event.
    fn initial_state(&self) -> Self::State;

    /// Decide how to answer `request` against `state`.
    ///
    /// # Errors
    ///
    /// Application-defined. A failure aborts the execution without writing
    /// anything.
    fn request_callback<'a>(
        &'a self,
        state: &'a Self::State,
        session_uuid: &'a str,
        request: &'a Self::Request,
    ) -> impl Future<Output = Result<RequestResult<Self::Response, Self::Event>, Self::Error>>
    + Send
    + 'a;

    /// Produce the state that follows `state` once `event` has happened.
    ///
    /// Must be pure and deterministic.
    fn apply_event(&self, state: &Self::State, event: &Self::Event) -> Self::State;
}
// ANCHOR_END: application_trait
