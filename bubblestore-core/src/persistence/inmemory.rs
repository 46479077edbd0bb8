//! In-memory persistence implementation for testing.
//!
//! This module provides [`Store`], a thread-safe in-memory implementation of
//! [`Persistence`](super::Persistence) suitable for unit tests, examples and
//! single-process applications that do not need durability.
//!
//! # Example
//!
//! ```
//! use bubblestore_core::persistence::inmemory;
//!
//! let store = inmemory::Store::new();
//! assert_eq!(store.event_count(), 0);
//! ```

use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, RwLock},
};

use serde::{Serialize, de::DeserializeOwned};

use crate::persistence::{Bubble, Persistence, RecordOutcome, StoredEvent, timestamp_millis};

/// In-memory store that keeps bubbles and events in hash maps.
///
/// The conditional check and both writes happen under a single write lock, so
/// like a transactional backend it never leaves orphaned events behind.
///
/// States and events are held as `serde_json::Value`.
#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    bubbles: HashMap<String, Bubble<serde_json::Value>>,
    events: HashMap<String, StoredEvent<serde_json::Value>>,
}

impl Store {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events held, including any that are not reachable from a
    /// bubble.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.inner
            .read()
            .expect("in-memory store lock poisoned")
            .events
            .len()
    }

    /// Load a single event by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Deserialization`] if the stored payload cannot be
    /// decoded into `E`.
    pub fn load_event<E>(&self, event_uuid: &str) -> Result<Option<StoredEvent<E>>, Error>
    where
        E: DeserializeOwned,
    {
        let inner = self.inner.read().expect("in-memory store lock poisoned");
        let Some(stored) = inner.events.get(event_uuid) else {
            return Ok(None);
        };
        let payload = serde_json::from_value(stored.payload.clone()).map_err(Error::Deserialization)?;
        Ok(Some(StoredEvent {
            event_uuid: stored.event_uuid.clone(),
            previous_event_uuid: stored.previous_event_uuid.clone(),
            bubble_uuid: stored.bubble_uuid.clone(),
            session_uuid: stored.session_uuid.clone(),
            payload,
            recorded_at: stored.recorded_at,
        }))
    }

    fn read_bubble<S>(&self, bubble_uuid: &str) -> Result<Option<Bubble<S>>, Error>
    where
        S: DeserializeOwned,
    {
        let inner = self.inner.read().expect("in-memory store lock poisoned");
        let Some(bubble) = inner.bubbles.get(bubble_uuid) else {
            tracing::trace!("bubble not found");
            return Ok(None);
        };
        let current_state =
            serde_json::from_value(bubble.current_state.clone()).map_err(Error::Deserialization)?;
        Ok(Some(Bubble {
            current_state,
            latest_event_uuid: bubble.latest_event_uuid.clone(),
        }))
    }

    /// Apply a write under the store lock.
    ///
    /// `previous_event_uuid` of `None` means "the bubble must not exist yet";
    /// `Some` means "the bubble must currently point at this event".
    fn write<E, S>(
        &self,
        bubble_uuid: &str,
        previous_event_uuid: Option<&str>,
        event_uuid: &str,
        session_uuid: &str,
        event: &E,
        resulting_state: &S,
    ) -> Result<RecordOutcome, Error>
    where
        E: Serialize,
        S: Serialize,
    {
        let payload = serde_json::to_value(event).map_err(Error::Serialization)?;
        let current_state = serde_json::to_value(resulting_state).map_err(Error::Serialization)?;

        let mut inner = self.inner.write().expect("in-memory store lock poisoned");

        let current = inner
            .bubbles
            .get(bubble_uuid)
            .map(|bubble| bubble.latest_event_uuid.as_str());
        if current != previous_event_uuid {
            tracing::debug!(
                expected = ?previous_event_uuid,
                actual = ?current,
                "latest event mismatch, rejecting write"
            );
            return Ok(RecordOutcome::Collision);
        }

        if inner.events.contains_key(event_uuid) {
            return Err(Error::DuplicateEvent(event_uuid.to_string()));
        }

        inner.events.insert(
            event_uuid.to_string(),
            StoredEvent {
                event_uuid: event_uuid.to_string(),
                previous_event_uuid: previous_event_uuid.map(str::to_string),
                bubble_uuid: bubble_uuid.to_string(),
                session_uuid: session_uuid.to_string(),
                payload,
                recorded_at: timestamp_millis(),
            },
        );
        inner.bubbles.insert(
            bubble_uuid.to_string(),
            Bubble {
                current_state,
                latest_event_uuid: event_uuid.to_string(),
            },
        );
        drop(inner);

        tracing::debug!("event recorded");
        Ok(RecordOutcome::Successful)
    }
}

/// Error type for the in-memory store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[source] serde_json::Error),
    #[error("deserialization error: {0}")]
    Deserialization(#[source] serde_json::Error),
    #[error("event `{0}` has already been recorded")]
    DuplicateEvent(String),
}

impl Persistence for Store {
    type Error = Error;

    fn initialize(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_ {
        std::future::ready(Ok(()))
    }

    #[tracing::instrument(skip(self))]
    fn get_bubble<'a, S>(
        &'a self,
        bubble_uuid: &'a str,
    ) -> impl Future<Output = Result<Option<Bubble<S>>, Self::Error>> + Send + 'a
    where
        S: DeserializeOwned + Send + 'static,
    {
        std::future::ready(self.read_bubble(bubble_uuid))
    }

    #[tracing::instrument(skip(self, event, resulting_state))]
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
        S: Serialize + Sync,
    {
        std::future::ready(self.write(
            bubble_uuid,
            None,
            event_uuid,
            session_uuid,
            event,
            resulting_state,
        ))
    }

    #[tracing::instrument(skip(self, event, resulting_state))]
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
        S: Serialize + Sync,
    {
        std::future::ready(self.write(
            bubble_uuid,
            Some(previous_event_uuid),
            next_event_uuid,
            session_uuid,
            event,
            resulting_state,
        ))
    }
}
