//! Persistence contract.
//!
//! This module describes the storage contract ([`Persistence`]), the shapes it
//! reads and writes ([`Bubble`], [`StoredEvent`]) and the outcome vocabulary
//! of a conditional write ([`RecordOutcome`]). A reference in-memory
//! implementation lives in [`inmemory`].
//!
//! Every backend must give identical externally observable results for the
//! same sequence of calls, even though the mechanics differ: a transactional
//! store can wrap the event insert and the bubble update in one transaction,
//! while a key-value store with conditional writes has to sequence them and
//! clean up after itself.
use std::{
    future::Future,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};

pub mod inmemory;

/// Latest state of a bubble together with the event that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bubble<S> {
    pub current_state: S,
    /// Identifier of the most recently applied event. Pass this back as
    /// `previous_event_uuid` to
    /// [`Persistence::record_subsequent_event`].
    pub latest_event_uuid: String,
}

/// Result of a conditional write.
///
/// A [`Collision`](Self::Collision) is an expected outcome of racing writers,
/// not an error: the bubble was left untouched and the caller should re-read
/// it and try again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use]
pub enum RecordOutcome {
    /// The event was recorded and the bubble now points at it.
    Successful,
    /// Another writer created or advanced the bubble first.
    Collision,
}

impl RecordOutcome {
    #[must_use]
    pub const fn is_successful(self) -> bool {
        matches!(self, Self::Successful)
    }

    #[must_use]
    pub const fn is_collision(self) -> bool {
        matches!(self, Self::Collision)
    }
}

/// Event as held by a backend.
///
/// Events are never part of the [`Persistence`] trait surface; backends expose
/// them through an inherent `load_event` for inspection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredEvent<E> {
    pub event_uuid: String,
    /// `None` for the root event of a bubble.
    pub previous_event_uuid: Option<String>,
    pub bubble_uuid: String,
    pub session_uuid: String,
    pub payload: E,
    /// Milliseconds since the Unix epoch, assigned at write time.
    pub recorded_at: i64,
}

/// Milliseconds since the Unix epoch, used to stamp events as they are
/// written.
#[must_use]
pub fn timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
        })
}

/// Abstraction over the storage of bubbles and their event chains.
///
/// State and event payloads are opaque to the backend: they are serialized on
/// the way in and deserialized on the way out, so any `serde` type (including
/// `serde_json::Value`) can be used.
///
/// # Guarantees
///
/// - [`get_bubble`](Self::get_bubble) is strongly consistent: it observes every
///   write that has already returned [`RecordOutcome::Successful`].
/// - A write that returns [`RecordOutcome::Successful`] is durable and visible.
/// - A write that returns [`RecordOutcome::Collision`] made no visible change
///   to the bubble. An unreachable event record may be left behind by backends
///   without multi-key transactions.
/// - Backend failures are returned as `Err` and are never turned into a
///   collision.
// ANCHOR: persistence_trait
pub trait Persistence: Send + Sync {
    /// Backend-specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Prepare whatever tables or collections the backend needs.
    ///
    /// Idempotent: calling it against an already initialized store succeeds
    /// and never destroys existing data.
    ///
    /// # Errors
    ///
    /// Returns a backend-specific error when the store cannot be prepared.
    fn initialize(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

    /// Read the latest state of a bubble.
    ///
    /// Returns `None` if no bubble with this identity has ever been created.
    ///
    /// # Errors
    ///
    /// Returns a backend-specific error when the read fails or the stored
    /// state cannot be deserialized into `S`.
    fn get_bubble<'a, S>(
        &'a self,
        bubble_uuid: &'a str,
    ) -> impl Future<Output = Result<Option<Bubble<S>>, Self::Error>> + Send + 'a
    where
        S: DeserializeOwned + Send + 'static;

    /// Record the root event of a bubble and create the bubble.
    ///
    /// The bubble is created with `current_state = resulting_state` and
    /// `latest_event_uuid = event_uuid` only if it does not exist yet.
    /// Otherwise the existing bubble is left untouched and the outcome is
    /// [`RecordOutcome::Collision`].
    ///
    /// # Errors
    ///
    /// Returns a backend-specific error when the write fails for any reason
    /// other than the bubble already existing.
    fn record_first_event<'a, E, S>(
        &'a self,
        bubble_uuid: &'a str,
        event_uuid: &'a str,
        session_uuid: &'a str,
        event: &'a E,
        resulting_state: &'a S,
    ) -> impl Future<Output = Result<RecordOutcome, Self::Error>> + Send + 'a
    where
        E: Serialize + Sync,
        S: Serialize + Sync;

    /// Record an event that follows `previous_event_uuid` and advance the
    /// bubble to it.
    ///
    /// The bubble is updated to `current_state = resulting_state` and
    /// `latest_event_uuid = next_event_uuid` only if its `latest_event_uuid`
    /// still equals `previous_event_uuid`. On mismatch (including a bubble
    /// that does not exist) the bubble is left untouched and the outcome is
    /// [`RecordOutcome::Collision`].
    ///
    /// # Errors
    ///
    /// Returns a backend-specific error when the write fails for any reason
    /// other than a stale `previous_event_uuid`.
    fn record_subsequent_event<'a, E, S>(
        &'a self,
        bubble_uuid: &'a str,
        previous_event_uuid: &'a str,
        next_event_uuid: &'a str,
        session_uuid: &'a str,
        event: &'a E,
        resulting_state: &'a S,
    ) -> impl Future<Output = Result<RecordOutcome, Self::Error>> + Send + 'a
    where
        E: Serialize + Sync,
        S: Serialize + Sync;
}
// ANCHOR_END: persistence_trait
