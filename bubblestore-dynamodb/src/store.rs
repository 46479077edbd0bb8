use std::collections::HashMap;

use aws_sdk_dynamodb::{
    Client,
    operation::{create_table::CreateTableError, put_item::PutItemError},
    types::{
        AttributeDefinition, AttributeValue, BillingMode, KeySchemaElement, KeyType,
        ProvisionedThroughput, ScalarAttributeType, Select, SseSpecification, SseType, Tag,
    },
};
use bubblestore_core::persistence::{Bubble, Persistence, RecordOutcome, StoredEvent};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    Error,
    item::{self, EventFields, uuid_attribute},
    settings::{Billing, BubbleTableSettings, Encryption, EventTableSettings, TableSettings},
};

/// A DynamoDB-backed [`Persistence`] implementation.
///
/// DynamoDB has no transactions spanning the two tables here, so a write is
/// sequenced: the event is put unconditionally, then the bubble is put
/// conditionally, and if the bubble put fails the event is deleted again on
/// a best-effort basis. A failed delete leaves an unreachable event behind,
/// which wastes storage but is never observed through [`Persistence`].
///
/// Identifiers must be in canonical lowercase dashed form; they are stored as
/// 16-byte binary attributes.
#[derive(Clone, Debug)]
pub struct Store {
    client: Client,
    bubble_table: BubbleTableSettings,
    event_table: EventTableSettings,
}

impl Store {
    #[must_use]
    pub const fn new(
        client: Client,
        bubble_table: BubbleTableSettings,
        event_table: EventTableSettings,
    ) -> Self {
        Self {
            client,
            bubble_table,
            event_table,
        }
    }

    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }

    /// Load a single event by identifier with a strongly consistent read.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUuid`] for a non-canonical identifier,
    /// [`Error::Request`] if the read fails, and [`Error::MalformedItem`] or
    /// [`Error::Deserialization`] if the stored item cannot be decoded.
    #[tracing::instrument(skip(self))]
    pub async fn load_event<E>(&self, event_uuid: &str) -> Result<Option<StoredEvent<E>>, Error>
    where
        E: DeserializeOwned,
    {
        let table = &self.event_table.table.table_name;
        let output = self
            .client
            .get_item()
            .table_name(table)
            .key(
                &self.event_table.attribute_names.event_uuid,
                uuid_attribute(event_uuid)?,
            )
            .consistent_read(true)
            .send()
            .await
            .map_err(Error::request)?;

        output
            .item()
            .map(|found| item::read_event(&self.event_table.attribute_names, table, found))
            .transpose()
    }

    /// Number of items in the event table, including orphans.
    ///
    /// Scans the whole table; intended for tests and maintenance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Request`] if any scan page fails.
    pub async fn event_count(&self) -> Result<usize, Error> {
        let mut count = 0;
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;
        loop {
            let output = self
                .client
                .scan()
                .table_name(&self.event_table.table.table_name)
                .select(Select::Count)
                .set_exclusive_start_key(start_key)
                .consistent_read(true)
                .send()
                .await
                .map_err(Error::request)?;

            count += usize::try_from(output.count()).unwrap_or_default();
            match output.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => return Ok(count),
            }
        }
    }

    /// Create one table keyed by `key_attribute`, treating an existing table
    /// as success.
    #[tracing::instrument(skip(self, settings), fields(table = %settings.table_name))]
    async fn create_table(&self, settings: &TableSettings, key_attribute: &str) -> Result<(), Error> {
        let mut request = self
            .client
            .create_table()
            .table_name(&settings.table_name)
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name(key_attribute)
                    .attribute_type(ScalarAttributeType::B)
                    .build()?,
            )
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name(key_attribute)
                    .key_type(KeyType::Hash)
                    .build()?,
            );

        request = match &settings.billing {
            Billing::PayPerRequest => request.billing_mode(BillingMode::PayPerRequest),
            Billing::Provisioned {
                read_capacity_units,
                write_capacity_units,
            } => request.billing_mode(BillingMode::Provisioned).provisioned_throughput(
                ProvisionedThroughput::builder()
                    .read_capacity_units(*read_capacity_units)
                    .write_capacity_units(*write_capacity_units)
                    .build()?,
            ),
        };

        if let Encryption::Kms { master_key_id } = &settings.encryption {
            request = request.sse_specification(
                SseSpecification::builder()
                    .enabled(true)
                    .sse_type(SseType::Kms)
                    .kms_master_key_id(master_key_id)
                    .build(),
            );
        }

        for (key, value) in &settings.tags {
            request = request.tags(Tag::builder().key(key).value(value).build()?);
        }

        match request.send().await {
            Ok(_) => {
                tracing::debug!("table created");
                Ok(())
            }
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(CreateTableError::is_resource_in_use_exception) =>
            {
                tracing::debug!("table already exists");
                Ok(())
            }
            Err(err) => Err(Error::request(err)),
        }
    }

    /// Write an event and then conditionally point the bubble at it.
    ///
    /// `previous_event_uuid` of `None` requires that the bubble does not exist
    /// yet; `Some` requires that it currently points at that event.
    async fn record<E, S>(
        &self,
        bubble_uuid: &str,
        previous_event_uuid: Option<&str>,
        event_uuid: &str,
        session_uuid: &str,
        event: &E,
        resulting_state: &S,
    ) -> Result<RecordOutcome, Error>
    where
        E: Serialize + Sync,
        S: Serialize + Sync,
    {
        let bubble_key = uuid_attribute(bubble_uuid)?;
        let event_key = uuid_attribute(event_uuid)?;
        let session = uuid_attribute(session_uuid)?;
        let previous = previous_event_uuid.map(uuid_attribute).transpose()?;
        let event_json =
            serde_json::to_string(event).map_err(|e| Error::Serialization(Box::new(e)))?;
        let state_json =
            serde_json::to_string(resulting_state).map_err(|e| Error::Serialization(Box::new(e)))?;

        let event_names = &self.event_table.attribute_names;
        self.client
            .put_item()
            .table_name(&self.event_table.table.table_name)
            .set_item(Some(item::event_item(
                event_names,
                EventFields {
                    event_uuid: event_key.clone(),
                    previous_event_uuid: previous.clone(),
                    bubble_uuid: bubble_key.clone(),
                    session_uuid: session,
                    event_json: &event_json,
                },
            )))
            .send()
            .await
            .map_err(Error::request)?;

        let bubble_names = &self.bubble_table.attribute_names;
        let mut put_bubble = self
            .client
            .put_item()
            .table_name(&self.bubble_table.table.table_name)
            .set_item(Some(item::bubble_item(
                bubble_names,
                bubble_key,
                &state_json,
                event_key.clone(),
            )));
        put_bubble = match previous {
            None => put_bubble
                .condition_expression("attribute_not_exists(#bubbleUuid)")
                .expression_attribute_names("#bubbleUuid", &bubble_names.bubble_uuid),
            Some(previous) => put_bubble
                .condition_expression("#latestEventUuid = :latestEventUuid")
                .expression_attribute_names("#latestEventUuid", &bubble_names.latest_event_uuid)
                .expression_attribute_values(":latestEventUuid", previous),
        };

        match put_bubble.send().await {
            Ok(_) => {
                tracing::debug!("event recorded");
                Ok(RecordOutcome::Successful)
            }
            Err(err) => {
                self.delete_event(event_key).await;
                if err
                    .as_service_error()
                    .is_some_and(PutItemError::is_conditional_check_failed_exception)
                {
                    tracing::debug!("bubble condition failed");
                    Ok(RecordOutcome::Collision)
                } else {
                    Err(Error::request(err))
                }
            }
        }
    }

    /// Remove an event whose bubble write failed. Failures are logged and
    /// otherwise ignored.
    async fn delete_event(&self, event_key: AttributeValue) {
        let result = self
            .client
            .delete_item()
            .table_name(&self.event_table.table.table_name)
            .key(&self.event_table.attribute_names.event_uuid, event_key)
            .send()
            .await;

        if let Err(err) = result {
            tracing::warn!(error = %err, "failed to delete orphaned event");
        }
    }
}

impl Persistence for Store {
    type Error = Error;

    #[tracing::instrument(skip(self))]
    async fn initialize(&self) -> Result<(), Self::Error> {
        self.create_table(
            &self.bubble_table.table,
            &self.bubble_table.attribute_names.bubble_uuid,
        )
        .await?;
        self.create_table(
            &self.event_table.table,
            &self.event_table.attribute_names.event_uuid,
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn get_bubble<'a, S>(&'a self, bubble_uuid: &'a str) -> Result<Option<Bubble<S>>, Self::Error>
    where
        S: DeserializeOwned + Send + 'static,
    {
        let table = &self.bubble_table.table.table_name;
        let names = &self.bubble_table.attribute_names;
        let output = self
            .client
            .get_item()
            .table_name(table)
            .key(&names.bubble_uuid, uuid_attribute(bubble_uuid)?)
            .consistent_read(true)
            .projection_expression("#currentStateJson, #latestEventUuid")
            .expression_attribute_names("#currentStateJson", &names.current_state_json)
            .expression_attribute_names("#latestEventUuid", &names.latest_event_uuid)
            .send()
            .await
            .map_err(Error::request)?;

        let Some(found) = output.item() else {
            tracing::trace!("bubble not found");
            return Ok(None);
        };

        item::read_bubble(names, table, found).map(Some)
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
        self.record(
            bubble_uuid,
            None,
            event_uuid,
            session_uuid,
            event,
            resulting_state,
        )
        .await
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
        self.record(
            bubble_uuid,
            Some(previous_event_uuid),
            next_event_uuid,
            session_uuid,
            event,
            resulting_state,
        )
        .await
    }
}
