use sqlx::Sqlite;

use super::Store;
use crate::Error;

/// Row written to the `events` table.
pub(in crate::store) struct NewEvent<'a> {
    pub event_uuid: &'a str,
    pub previous_event_uuid: Option<&'a str>,
    pub bubble_uuid: &'a str,
    pub session_uuid: &'a str,
    pub event_json: &'a str,
}

impl Store {
    /// Insert a `bubbles` row with no latest event yet.
    ///
    /// Returns `false` if a row for `bubble_uuid` already exists, in which
    /// case nothing was written. Must be called inside an open transaction.
    pub(in crate::store) async fn insert_bubble(
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        bubble_uuid: &str,
        state_json: &str,
    ) -> Result<bool, Error> {
        let result = sqlx::query(
            r"
                INSERT INTO bubbles (bubble_uuid, current_state_json, latest_event_uuid)
                VALUES (?, ?, NULL)
                ON CONFLICT (bubble_uuid) DO NOTHING
                ",
        )
        .bind(bubble_uuid)
        .bind(state_json)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Insert an `events` row stamped with the current time.
    pub(in crate::store) async fn insert_event(
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        event: NewEvent<'_>,
    ) -> Result<(), Error> {
        sqlx::query(
            r"
                INSERT INTO events
                    (event_uuid, previous_event_uuid, bubble_uuid, session_uuid, event_json, recorded)
                VALUES (?, ?, ?, ?, ?, ?)
                ",
        )
        .bind(event.event_uuid)
        .bind(event.previous_event_uuid)
        .bind(event.bubble_uuid)
        .bind(event.session_uuid)
        .bind(event.event_json)
        .bind(bubblestore_core::persistence::timestamp_millis())
        .execute(&mut **tx)
        .await
        .map(|_| ())
        .map_err(Error::from)
    }

    /// Point the bubble at `next_event_uuid`, but only if it currently points
    /// at `expected_event_uuid`.
    ///
    /// `expected_event_uuid` of `None` matches a bubble that was inserted in
    /// the same transaction and has no latest event yet. Returns `false` if no
    /// row matched.
    pub(in crate::store) async fn advance_bubble(
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        bubble_uuid: &str,
        expected_event_uuid: Option<&str>,
        next_event_uuid: &str,
        state_json: &str,
    ) -> Result<bool, Error> {
        let result = sqlx::query(
            r"
                UPDATE bubbles
                SET current_state_json = ?, latest_event_uuid = ?
                WHERE bubble_uuid = ? AND latest_event_uuid IS ?
                ",
        )
        .bind(state_json)
        .bind(next_event_uuid)
        .bind(bubble_uuid)
        .bind(expected_event_uuid)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
