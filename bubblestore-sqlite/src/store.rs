mod commit;

use std::str::FromStr;

use bubblestore_core::persistence::{Bubble, Persistence, RecordOutcome, StoredEvent};
use serde::{Serialize, de::DeserializeOwned};
use sqlx::{
    Row, SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};

use self::commit::NewEvent;
use crate::Error;

/// A SQLite-backed [`Persistence`] implementation.
///
/// States and events are stored as JSON text. Bubble identity is enforced by
/// the primary key on `bubbles`, and the compare-and-swap on
/// `latest_event_uuid` is a conditional `UPDATE` inside the write
/// transaction.
#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Construct a store from an existing connection pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `url` in WAL mode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Database`] if the URL is invalid or the database
    /// cannot be opened.
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Ok(Self::new(pool))
    }

    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Apply the schema (idempotent).
    ///
    /// This uses `CREATE TABLE IF NOT EXISTS` style DDL so it can be run on
    /// startup.
    ///
    /// # Errors
    ///
    /// Returns a `sqlx::Error` if any of the schema creation queries fail.
    #[tracing::instrument(skip(self))]
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS bubbles (
                bubble_uuid        TEXT PRIMARY KEY NOT NULL,
                current_state_json TEXT NOT NULL,
                latest_event_uuid  TEXT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS events (
                event_uuid          TEXT PRIMARY KEY NOT NULL,
                previous_event_uuid TEXT NULL,
                bubble_uuid         TEXT NOT NULL,
                session_uuid        TEXT NOT NULL,
                event_json          TEXT NOT NULL,
                recorded            INTEGER NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(r"CREATE INDEX IF NOT EXISTS events_by_bubble ON events(bubble_uuid)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Load a single event by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Database`] if the query fails and
    /// [`Error::Deserialization`] if the payload cannot be decoded into `E`.
    #[tracing::instrument(skip(self))]
    pub async fn load_event<E>(&self, event_uuid: &str) -> Result<Option<StoredEvent<E>>, Error>
    where
        E: DeserializeOwned,
    {
        let Some(row) = sqlx::query(
            r"
            SELECT event_uuid, previous_event_uuid, bubble_uuid, session_uuid, event_json, recorded
            FROM events
            WHERE event_uuid = ?
            ",
        )
        .bind(event_uuid)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let event_json: String = row.try_get("event_json")?;
        let payload =
            serde_json::from_str(&event_json).map_err(|e| Error::Deserialization(Box::new(e)))?;

        Ok(Some(StoredEvent {
            event_uuid: row.try_get("event_uuid")?,
            previous_event_uuid: row.try_get("previous_event_uuid")?,
            bubble_uuid: row.try_get("bubble_uuid")?,
            session_uuid: row.try_get("session_uuid")?,
            payload,
            recorded_at: row.try_get("recorded")?,
        }))
    }

    /// Number of rows in the `events` table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Database`] if the query fails.
    pub async fn event_count(&self) -> Result<i64, Error> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, Error> {
    serde_json::to_string(value).map_err(|e| Error::Serialization(Box::new(e)))
}

impl Persistence for Store {
    type Error = Error;

    async fn initialize(&self) -> Result<(), Self::Error> {
        self.migrate().await.map_err(Error::from)
    }

    #[tracing::instrument(skip(self))]
    async fn get_bubble<'a, S>(&'a self, bubble_uuid: &'a str) -> Result<Option<Bubble<S>>, Self::Error>
    where
        S: DeserializeOwned + Send + 'static,
    {
        let row: Option<(String, String)> = sqlx::query_as(
            r"
            SELECT current_state_json, latest_event_uuid
            FROM bubbles
            WHERE bubble_uuid = ? AND latest_event_uuid IS NOT NULL
            ",
        )
        .bind(bubble_uuid)
        .fetch_optional(&self.pool)
        .await?;

        let Some((state_json, latest_event_uuid)) = row else {
            tracing::trace!("bubble not found");
            return Ok(None);
        };

        let current_state =
            serde_json::from_str(&state_json).map_err(|e| Error::Deserialization(Box::new(e)))?;

        Ok(Some(Bubble {
            current_state,
            latest_event_uuid,
        }))
    }

    #[tracing::instrument(skip(self, event, resulting_state))]
    async fn record_first_event<'a, E, S>(
        &'a self,
        bubble_uuid: &'a str,
        event_uuid: &'a str,
        session_uuid: &'a str,
        event: &'a E,
        resulting_state: &'a S,
    ) -> Result<RecordOutcome, Self::Error>
    where
        E: Serialize + Sync,
        S: Serialize + Sync,
    {
        let event_json = to_json(event)?;
        let state_json = to_json(resulting_state)?;

        let mut tx = self.pool.begin().await?;

        if !Self::insert_bubble(&mut tx, bubble_uuid, &state_json).await? {
            tx.rollback().await?;
            tracing::debug!("bubble already exists");
            return Ok(RecordOutcome::Collision);
        }

        Self::insert_event(
            &mut tx,
            NewEvent {
                event_uuid,
                previous_event_uuid: None,
                bubble_uuid,
                session_uuid,
                event_json: &event_json,
            },
        )
        .await?;

        if !Self::advance_bubble(&mut tx, bubble_uuid, None, event_uuid, &state_json).await? {
            tx.rollback().await?;
            tracing::debug!("bubble changed inside its creating transaction");
            return Ok(RecordOutcome::Collision);
        }

        tx.commit().await?;
        tracing::debug!("first event recorded");
        Ok(RecordOutcome::Successful)
    }

    #[tracing::instrument(skip(self, event, resulting_state))]
    async fn record_subsequent_event<'a, E, S>(
        &'a self,
        bubble_uuid: &'a str,
        previous_event_uuid: &'a str,
        next_event_uuid: &'a str,
        session_uuid: &'a str,
        event: &'a E,
        resulting_state: &'a S,
    ) -> Result<RecordOutcome, Self::Error>
    where
        E: Serialize + Sync,
        S: Serialize + Sync,
    {
        let event_json = to_json(event)?;
        let state_json = to_json(resulting_state)?;

        let mut tx = self.pool.begin().await?;

        Self::insert_event(
            &mut tx,
            NewEvent {
                event_uuid: next_event_uuid,
                previous_event_uuid: Some(previous_event_uuid),
                bubble_uuid,
                session_uuid,
                event_json: &event_json,
            },
        )
        .await?;

        if !Self::advance_bubble(
            &mut tx,
            bubble_uuid,
            Some(previous_event_uuid),
            next_event_uuid,
            &state_json,
        )
        .await?
        {
            tx.rollback().await?;
            tracing::debug!("latest event mismatch");
            return Ok(RecordOutcome::Collision);
        }

        tx.commit().await?;
        tracing::debug!("event recorded");
        Ok(RecordOutcome::Successful)
    }
}
