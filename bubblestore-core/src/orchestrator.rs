//! Request execution.
//!
//! [`Orchestrator`] runs the read, decide, apply, conditional-write cycle for
//! a single request. Writes are guarded by the bubble's latest event, so two
//! orchestrators racing on the same bubble can never both succeed from the
//! same starting point: the loser sees [`Execution::RetryNeeded`] and, when
//! driven by [`Orchestrator::execute_until_successful`], simply starts over
//! from the fresher state.

use thiserror::Error;

use crate::{
    application::{Application, RequestResult},
    persistence::{Persistence, RecordOutcome},
    uuid::generate_uuid,
};

/// A request addressed to one bubble on behalf of one session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutableRequest<R> {
    pub bubble_uuid: String,
    pub session_uuid: String,
    pub request: R,
}

impl<R> ExecutableRequest<R> {
    pub fn new(bubble_uuid: impl Into<String>, session_uuid: impl Into<String>, request: R) -> Self {
        Self {
            bubble_uuid: bubble_uuid.into(),
            session_uuid: session_uuid.into(),
            request,
        }
    }
}

/// Outcome of a single execution attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub enum Execution<R> {
    /// The request was answered and any event it produced was recorded.
    Completed(R),
    /// Another writer moved the bubble first. Nothing was recorded and the
    /// response was discarded.
    RetryNeeded,
}

impl<R> Execution<R> {
    #[must_use]
    pub const fn is_retry_needed(&self) -> bool {
        matches!(self, Self::RetryNeeded)
    }

    /// The response, if the attempt completed.
    #[must_use]
    pub fn into_response(self) -> Option<R> {
        match self {
            Self::Completed(response) => Some(response),
            Self::RetryNeeded => None,
        }
    }
}

/// Error type for request execution.
///
/// Collisions are never errors; they surface as [`Execution::RetryNeeded`] or
/// are retried internally.
#[derive(Debug, Error)]
pub enum ExecuteError<PersistenceError, ApplicationError>
where
    PersistenceError: std::error::Error + 'static,
    ApplicationError: std::error::Error + 'static,
{
    #[error("persistence operation failed: {0}")]
    Persistence(#[source] PersistenceError),
    #[error("application callback failed: {0}")]
    Application(#[source] ApplicationError),
}

/// Result type alias for request execution.
pub type ExecuteResult<T, P, A> =
    Result<T, ExecuteError<<P as Persistence>::Error, <A as Application>::Error>>;

/// Drives an [`Application`] against a [`Persistence`] backend.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct Orchestrator<P, A> {
    persistence: P,
    application: A,
}

impl<P, A> Orchestrator<P, A> {
    #[must_use]
    pub const fn new(persistence: P, application: A) -> Self {
        Self {
            persistence,
            application,
        }
    }

    #[must_use]
    pub const fn persistence(&self) -> &P {
        &self.persistence
    }

    #[must_use]
    pub const fn application(&self) -> &A {
        &self.application
    }
}

impl<P, A> Orchestrator<P, A>
where
    P: Persistence,
    A: Application,
{
    /// Run one read, decide, write attempt.
    ///
    /// The request callback sees the bubble's current state, or the
    /// application's initial state if the bubble does not exist yet. If it
    /// asks for an event, the event is applied and recorded under a freshly
    /// generated identifier, conditional on the bubble not having moved since
    /// it was read.
    ///
    /// # Errors
    ///
    /// Returns [`ExecuteError::Persistence`] if a backend call fails and
    /// [`ExecuteError::Application`] if the request callback fails. A lost
    /// race is reported as `Ok(Execution::RetryNeeded)`.
    #[tracing::instrument(
        skip(self, request),
        fields(bubble_uuid = %request.bubble_uuid, session_uuid = %request.session_uuid)
    )]
    pub async fn execute_once(
        &self,
        request: &ExecutableRequest<A::Request>,
    ) -> ExecuteResult<Execution<A::Response>, P, A> {
        let existing = self
            .persistence
            .get_bubble::<A::State>(&request.bubble_uuid)
            .await
            .map_err(ExecuteError::Persistence)?;

        let (state, latest_event_uuid) = match existing {
            Some(bubble) => (bubble.current_state, Some(bubble.latest_event_uuid)),
            None => (self.application.initial_state(), None),
        };

        let RequestResult { response, event } = self
            .application
            .request_callback(&state, &request.session_uuid, &request.request)
            .await
            .map_err(ExecuteError::Application)?;

        let Some(event) = event else {
            tracing::trace!("request produced no event");
            return Ok(Execution::Completed(response));
        };

        let next_state = self.application.apply_event(&state, &event);
        let event_uuid = generate_uuid();

        let outcome = match latest_event_uuid.as_deref() {
            None => {
                self.persistence
                    .record_first_event(
                        &request.bubble_uuid,
                        &event_uuid,
                        &request.session_uuid,
                        &event,
                        &next_state,
                    )
                    .await
            }
            Some(previous_event_uuid) => {
                self.persistence
                    .record_subsequent_event(
                        &request.bubble_uuid,
                        previous_event_uuid,
                        &event_uuid,
                        &request.session_uuid,
                        &event,
                        &next_state,
                    )
                    .await
            }
        }
        .map_err(ExecuteError::Persistence)?;

        match outcome {
            RecordOutcome::Successful => {
                tracing::debug!(event_uuid = %event_uuid, "event recorded");
                Ok(Execution::Completed(response))
            }
            RecordOutcome::Collision => {
                tracing::debug!("bubble moved since it was read");
                Ok(Execution::RetryNeeded)
            }
        }
    }

    /// Run [`execute_once`](Self::execute_once) until it completes.
    ///
    /// Each attempt re-reads the bubble and re-invokes the request callback.
    /// There is no backoff and no attempt limit; use
    /// [`execute_with_retry`](Self::execute_with_retry) when latency must be
    /// bounded.
    ///
    /// # Errors
    ///
    /// Returns the first error any attempt fails with. Collisions are never
    /// returned.
    #[tracing::instrument(
        skip(self, request),
        fields(bubble_uuid = %request.bubble_uuid, session_uuid = %request.session_uuid)
    )]
    pub async fn execute_until_successful(
        &self,
        request: &ExecutableRequest<A::Request>,
    ) -> ExecuteResult<A::Response, P, A> {
        let mut attempt: usize = 1;
        loop {
            match self.execute_once(request).await? {
                Execution::Completed(response) => return Ok(response),
                Execution::RetryNeeded => {
                    tracing::debug!(attempt, "collision, retrying");
                    attempt += 1;
                }
            }
        }
    }

    /// Run [`execute_once`](Self::execute_once) at most `max_attempts` times.
    ///
    /// A `max_attempts` of zero is treated as one. Returns
    /// `Ok(Execution::RetryNeeded)` if every attempt collided.
    ///
    /// # Errors
    ///
    /// Returns the first error any attempt fails with.
    #[tracing::instrument(
        skip(self, request),
        fields(bubble_uuid = %request.bubble_uuid, session_uuid = %request.session_uuid)
    )]
    pub async fn execute_with_retry(
        &self,
        request: &ExecutableRequest<A::Request>,
        max_attempts: usize,
    ) -> ExecuteResult<Execution<A::Response>, P, A> {
        for attempt in 1..=max_attempts.max(1) {
            match self.execute_once(request).await? {
                Execution::Completed(response) => return Ok(Execution::Completed(response)),
                Execution::RetryNeeded => tracing::debug!(attempt, "collision"),
            }
        }

        tracing::debug!(max_attempts, "giving up after repeated collisions");
        Ok(Execution::RetryNeeded)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        future::{Future, ready},
        sync::atomic::{AtomicUsize, Ordering},
    };

    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::{
        persistence::inmemory,
        test::{CallCounts, ContendedPersistence, PersistenceTestExt},
        uuid::is_uuid,
    };

    // Test fixtures
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct CounterState {
        count: u64,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Incremented {
        by: u64,
    }

    #[derive(Debug)]
    enum CounterRequest {
        Increment(u64),
        Read,
        Reject,
    }

    #[derive(Debug, Error)]
    #[error("request rejected")]
    struct Rejected;

    #[derive(Default)]
    struct Counter {
        callbacks: AtomicUsize,
    }

    impl Counter {
        fn callbacks(&self) -> usize {
            self.callbacks.load(Ordering::SeqCst)
        }
    }

    impl Application for Counter {
        type State = CounterState;
        type Event = Incremented;
        type Request = CounterRequest;
        type Response = u64;
        type Error = Rejected;

        fn initial_state(&self) -> CounterState {
            CounterState { count: 0 }
        }

        fn request_callback<'a>(
            &'a self,
            state: &'a CounterState,
            _session_uuid: &'a str,
            request: &'a CounterRequest,
        ) -> impl Future<Output = Result<RequestResult<u64, Incremented>, Rejected>> + Send + 'a
        {
            self.callbacks.fetch_add(1, Ordering::SeqCst);
            let result = match request {
                CounterRequest::Increment(by) => Ok(RequestResult::record(
                    state.count + by,
                    Incremented { by: *by },
                )),
                CounterRequest::Read => Ok(RequestResult::respond(state.count)),
                CounterRequest::Reject => Err(Rejected),
            };
            ready(result)
        }

        fn apply_event(&self, state: &CounterState, event: &Incremented) -> CounterState {
            CounterState {
                count: state.count + event.by,
            }
        }
    }

    fn increment(by: u64) -> ExecutableRequest<CounterRequest> {
        ExecutableRequest::new("bubble-a", "session-a", CounterRequest::Increment(by))
    }

    #[test]
    fn execution_accessors() {
        let completed = Execution::Completed(3);
        assert!(!completed.is_retry_needed());
        assert_eq!(completed.into_response(), Some(3));

        let retry: Execution<u64> = Execution::RetryNeeded;
        assert!(retry.is_retry_needed());
        assert_eq!(retry.into_response(), None);
    }

    #[tokio::test]
    async fn first_request_creates_bubble_from_initial_state() {
        let orchestrator = Orchestrator::new(inmemory::Store::new(), Counter::default());

        let execution = orchestrator.execute_once(&increment(3)).await.unwrap();

        assert_eq!(execution, Execution::Completed(3));
        let bubble = orchestrator
            .persistence()
            .get_bubble::<CounterState>("bubble-a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bubble.current_state, CounterState { count: 3 });
        assert!(is_uuid(&bubble.latest_event_uuid));
    }

    #[tokio::test]
    async fn subsequent_request_builds_on_existing_state() {
        let orchestrator = Orchestrator::new(inmemory::Store::new(), Counter::default());
        let first = orchestrator.execute_once(&increment(3)).await.unwrap();
        assert_eq!(first, Execution::Completed(3));
        let root = orchestrator
            .persistence()
            .get_bubble::<CounterState>("bubble-a")
            .await
            .unwrap()
            .unwrap()
            .latest_event_uuid;

        let second = orchestrator.execute_once(&increment(4)).await.unwrap();

        assert_eq!(second, Execution::Completed(7));
        let bubble = orchestrator
            .persistence()
            .get_bubble::<CounterState>("bubble-a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bubble.current_state, CounterState { count: 7 });
        let event = orchestrator
            .persistence()
            .load_event::<Incremented>(&bubble.latest_event_uuid)
            .unwrap()
            .unwrap();
        assert_eq!(event.previous_event_uuid, Some(root));
        assert_eq!(event.session_uuid, "session-a");
        assert_eq!(event.payload, Incremented { by: 4 });
    }

    #[tokio::test]
    async fn read_only_request_writes_nothing() {
        let store = ContendedPersistence::new(inmemory::Store::new());
        let orchestrator = Orchestrator::new(store, Counter::default());
        let read = ExecutableRequest::new("bubble-a", "session-a", CounterRequest::Read);

        let execution = orchestrator.execute_once(&read).await.unwrap();

        assert_eq!(execution, Execution::Completed(0));
        assert_eq!(
            orchestrator.persistence().calls(),
            CallCounts {
                get_bubble: 1,
                record_first_event: 0,
                record_subsequent_event: 0,
            }
        );
        assert_eq!(orchestrator.persistence().inner().event_count(), 0);
    }

    #[tokio::test]
    async fn collision_is_reported_as_retry_needed() {
        let store = ContendedPersistence::with_collisions(inmemory::Store::new(), 1);
        let orchestrator = Orchestrator::new(store, Counter::default());

        let execution = orchestrator.execute_once(&increment(1)).await.unwrap();

        assert!(execution.is_retry_needed());
        assert_eq!(orchestrator.persistence().inner().event_count(), 0);
    }

    #[tokio::test]
    async fn concurrent_writer_forces_retry_against_fresh_state() {
        let orchestrator = Orchestrator::new(inmemory::Store::new(), Counter::default());
        assert_eq!(
            orchestrator.execute_once(&increment(1)).await.unwrap(),
            Execution::Completed(1)
        );
        let store = orchestrator.persistence();

        // Read the bubble, then let another writer move it.
        let stale = store
            .get_bubble::<CounterState>("bubble-a")
            .await
            .unwrap()
            .unwrap();
        store
            .inject_concurrent_event(
                "bubble-a",
                "session-b",
                &Incremented { by: 10 },
                &CounterState { count: 11 },
            )
            .await
            .unwrap();
        let outcome = store
            .record_subsequent_event(
                "bubble-a",
                &stale.latest_event_uuid,
                &generate_uuid(),
                "session-a",
                &Incremented { by: 1 },
                &CounterState { count: 2 },
            )
            .await
            .unwrap();
        assert_eq!(outcome, RecordOutcome::Collision);

        let response = orchestrator
            .execute_until_successful(&increment(1))
            .await
            .unwrap();
        assert_eq!(response, 12);
    }

    #[tokio::test]
    async fn until_successful_retries_each_collision() {
        let store = ContendedPersistence::with_collisions(inmemory::Store::new(), 2);
        let orchestrator = Orchestrator::new(store, Counter::default());

        let response = orchestrator
            .execute_until_successful(&increment(5))
            .await
            .unwrap();

        assert_eq!(response, 5);
        assert_eq!(orchestrator.application().callbacks(), 3);
        assert_eq!(orchestrator.persistence().calls().get_bubble, 3);
        assert_eq!(orchestrator.persistence().inner().event_count(), 1);
    }

    #[tokio::test]
    async fn with_retry_gives_up_after_max_attempts() {
        let store = ContendedPersistence::with_collisions(inmemory::Store::new(), 5);
        let orchestrator = Orchestrator::new(store, Counter::default());

        let execution = orchestrator
            .execute_with_retry(&increment(1), 3)
            .await
            .unwrap();

        assert!(execution.is_retry_needed());
        assert_eq!(orchestrator.application().callbacks(), 3);
        assert_eq!(orchestrator.persistence().collisions_remaining(), 2);
    }

    #[tokio::test]
    async fn with_retry_succeeds_within_budget() {
        let store = ContendedPersistence::with_collisions(inmemory::Store::new(), 2);
        let orchestrator = Orchestrator::new(store, Counter::default());

        let execution = orchestrator
            .execute_with_retry(&increment(1), 3)
            .await
            .unwrap();

        assert_eq!(execution, Execution::Completed(1));
    }

    #[tokio::test]
    async fn with_retry_treats_zero_attempts_as_one() {
        let orchestrator = Orchestrator::new(inmemory::Store::new(), Counter::default());

        let execution = orchestrator
            .execute_with_retry(&increment(1), 0)
            .await
            .unwrap();

        assert_eq!(execution, Execution::Completed(1));
        assert_eq!(orchestrator.application().callbacks(), 1);
    }

    #[tokio::test]
    async fn application_error_is_propagated_without_writing() {
        let store = ContendedPersistence::new(inmemory::Store::new());
        let orchestrator = Orchestrator::new(store, Counter::default());
        let reject = ExecutableRequest::new("bubble-a", "session-a", CounterRequest::Reject);

        let result = orchestrator.execute_until_successful(&reject).await;

        let err = result.unwrap_err();
        assert!(matches!(err, ExecuteError::Application(Rejected)));
        assert_eq!(err.to_string(), "application callback failed: request rejected");
        assert_eq!(orchestrator.application().callbacks(), 1);
        assert_eq!(orchestrator.persistence().calls().record_first_event, 0);
    }

    #[tokio::test]
    async fn persistence_error_is_propagated() {
        let store = inmemory::Store::new();
        let seeded = store
            .record_first_event("bubble-a", "event-a", "session-a", &"not a counter", &"bad")
            .await
            .unwrap();
        assert_eq!(seeded, RecordOutcome::Successful);
        let orchestrator = Orchestrator::new(store, Counter::default());

        let result = orchestrator.execute_once(&increment(1)).await;

        assert!(matches!(
            result,
            Err(ExecuteError::Persistence(inmemory::Error::Deserialization(_)))
        ));
    }
}
