//! Conversion between bubbles/events and DynamoDB items.

use std::collections::HashMap;

use aws_sdk_dynamodb::{primitives::Blob, types::AttributeValue};
use bubblestore_core::{
    persistence::{Bubble, StoredEvent, timestamp_millis},
    uuid::is_uuid,
};
use serde::de::DeserializeOwned;

use crate::{
    Error,
    settings::{BubbleAttributeNames, EventAttributeNames},
};

pub(crate) type Item = HashMap<String, AttributeValue>;

/// Pack a canonical identifier into its 16 raw bytes.
pub(crate) fn uuid_to_blob(value: &str) -> Result<Blob, Error> {
    if !is_uuid(value) {
        return Err(Error::InvalidUuid(value.to_string()));
    }
    let uuid = uuid::Uuid::parse_str(value).map_err(|_| Error::InvalidUuid(value.to_string()))?;
    Ok(Blob::new(uuid.as_bytes().to_vec()))
}

pub(crate) fn uuid_attribute(value: &str) -> Result<AttributeValue, Error> {
    uuid_to_blob(value).map(AttributeValue::B)
}

/// Fields of an event about to be written. Identifiers are already
/// validated.
pub(crate) struct EventFields<'a> {
    pub event_uuid: AttributeValue,
    pub previous_event_uuid: Option<AttributeValue>,
    pub bubble_uuid: AttributeValue,
    pub session_uuid: AttributeValue,
    pub event_json: &'a str,
}

pub(crate) fn event_item(names: &EventAttributeNames, fields: EventFields<'_>) -> Item {
    let mut item = Item::new();
    item.insert(names.event_uuid.clone(), fields.event_uuid);
    if let Some(previous) = fields.previous_event_uuid {
        item.insert(names.previous_event_uuid.clone(), previous);
    }
    item.insert(names.bubble_uuid.clone(), fields.bubble_uuid);
    item.insert(names.session_uuid.clone(), fields.session_uuid);
    item.insert(
        names.event_json.clone(),
        AttributeValue::S(fields.event_json.to_string()),
    );
    item.insert(
        names.recorded.clone(),
        AttributeValue::N(timestamp_millis().to_string()),
    );
    item
}

pub(crate) fn bubble_item(
    names: &BubbleAttributeNames,
    bubble_uuid: AttributeValue,
    state_json: &str,
    latest_event_uuid: AttributeValue,
) -> Item {
    let mut item = Item::new();
    item.insert(names.bubble_uuid.clone(), bubble_uuid);
    item.insert(
        names.current_state_json.clone(),
        AttributeValue::S(state_json.to_string()),
    );
    item.insert(names.latest_event_uuid.clone(), latest_event_uuid);
    item
}

/// Typed access to the attributes of one item, reporting which table a
/// malformed item came from.
struct Reader<'a> {
    table: &'a str,
    item: &'a Item,
}

impl<'a> Reader<'a> {
    fn attribute(&self, name: &str) -> Result<&'a AttributeValue, Error> {
        self.item
            .get(name)
            .ok_or_else(|| Error::malformed(self.table, format!("missing attribute `{name}`")))
    }

    fn string(&self, name: &str) -> Result<&'a str, Error> {
        self.attribute(name)?
            .as_s()
            .map(String::as_str)
            .map_err(|_| Error::malformed(self.table, format!("attribute `{name}` is not a string")))
    }

    fn number(&self, name: &str) -> Result<i64, Error> {
        self.attribute(name)?
            .as_n()
            .ok()
            .and_then(|number| number.parse().ok())
            .ok_or_else(|| Error::malformed(self.table, format!("attribute `{name}` is not an integer")))
    }

    fn uuid(&self, name: &str) -> Result<String, Error> {
        let blob = self
            .attribute(name)?
            .as_b()
            .map_err(|_| Error::malformed(self.table, format!("attribute `{name}` is not binary")))?;
        uuid::Uuid::from_slice(blob.as_ref())
            .map(|uuid| uuid.hyphenated().to_string())
            .map_err(|_| Error::malformed(self.table, format!("attribute `{name}` is not 16 bytes")))
    }

    fn optional_uuid(&self, name: &str) -> Result<Option<String>, Error> {
        if self.item.contains_key(name) {
            self.uuid(name).map(Some)
        } else {
            Ok(None)
        }
    }
}

pub(crate) fn read_bubble<S>(
    names: &BubbleAttributeNames,
    table: &str,
    item: &Item,
) -> Result<Bubble<S>, Error>
where
    S: DeserializeOwned,
{
    let reader = Reader { table, item };
    let state_json = reader.string(&names.current_state_json)?;
    let current_state =
        serde_json::from_str(state_json).map_err(|e| Error::Deserialization(Box::new(e)))?;

    Ok(Bubble {
        current_state,
        latest_event_uuid: reader.uuid(&names.latest_event_uuid)?,
    })
}

pub(crate) fn read_event<E>(
    names: &EventAttributeNames,
    table: &str,
    item: &Item,
) -> Result<StoredEvent<E>, Error>
where
    E: DeserializeOwned,
{
    let reader = Reader { table, item };
    let event_json = reader.string(&names.event_json)?;
    let payload =
        serde_json::from_str(event_json).map_err(|e| Error::Deserialization(Box::new(e)))?;

    Ok(StoredEvent {
        event_uuid: reader.uuid(&names.event_uuid)?,
        previous_event_uuid: reader.optional_uuid(&names.previous_event_uuid)?,
        bubble_uuid: reader.uuid(&names.bubble_uuid)?,
        session_uuid: reader.uuid(&names.session_uuid)?,
        payload,
        recorded_at: reader.number(&names.recorded)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUBBLE: &str = "91a7b5af-52c6-46b0-a565-c01cd3b8c193";
    const EVENT: &str = "0f5c2a6e-3d1b-4c7a-9e8f-1a2b3c4d5e6f";

    #[test]
    fn uuid_is_stored_as_sixteen_bytes() {
        let blob = uuid_to_blob(BUBBLE).unwrap();

        assert_eq!(blob.as_ref().len(), 16);
        assert_eq!(blob.as_ref()[0], 0x91);
        assert_eq!(blob.as_ref()[15], 0x93);
    }

    #[test]
    fn non_canonical_uuids_are_rejected() {
        for candidate in [
            "",
            "not-a-uuid",
            "91A7B5AF-52C6-46B0-A565-C01CD3B8C193",
            "91a7b5af52c646b0a565c01cd3b8c193",
            "{91a7b5af-52c6-46b0-a565-c01cd3b8c193}",
        ] {
            assert!(
                matches!(uuid_to_blob(candidate), Err(Error::InvalidUuid(value)) if value == candidate),
                "accepted {candidate:?}"
            );
        }
    }

    #[test]
    fn bubble_item_reads_back() {
        let names = BubbleAttributeNames::default();
        let item = bubble_item(
            &names,
            uuid_attribute(BUBBLE).unwrap(),
            r#"{"count":3}"#,
            uuid_attribute(EVENT).unwrap(),
        );

        let bubble: Bubble<serde_json::Value> = read_bubble(&names, "bubbles", &item).unwrap();

        assert_eq!(bubble.current_state["count"], 3);
        assert_eq!(bubble.latest_event_uuid, EVENT);
    }

    #[test]
    fn root_event_item_has_no_previous_event() {
        let names = EventAttributeNames::default();
        let item = event_item(
            &names,
            EventFields {
                event_uuid: uuid_attribute(EVENT).unwrap(),
                previous_event_uuid: None,
                bubble_uuid: uuid_attribute(BUBBLE).unwrap(),
                session_uuid: uuid_attribute(BUBBLE).unwrap(),
                event_json: r#""created""#,
            },
        );

        assert!(!item.contains_key("previousEventUuid"));
        let event: StoredEvent<String> = read_event(&names, "events", &item).unwrap();
        assert_eq!(event.event_uuid, EVENT);
        assert_eq!(event.previous_event_uuid, None);
        assert_eq!(event.payload, "created");
        assert!(event.recorded_at > 0);
    }

    #[test]
    fn missing_attribute_is_malformed() {
        let names = BubbleAttributeNames::default();
        let mut item = bubble_item(
            &names,
            uuid_attribute(BUBBLE).unwrap(),
            "{}",
            uuid_attribute(EVENT).unwrap(),
        );
        item.remove("latestEventUuid");

        let result = read_bubble::<serde_json::Value>(&names, "bubbles", &item);

        assert!(matches!(
            result,
            Err(Error::MalformedItem { table, reason })
                if table == "bubbles" && reason.contains("latestEventUuid")
        ));
    }

    #[test]
    fn wrongly_typed_attribute_is_malformed() {
        let names = BubbleAttributeNames::default();
        let mut item = bubble_item(
            &names,
            uuid_attribute(BUBBLE).unwrap(),
            "{}",
            uuid_attribute(EVENT).unwrap(),
        );
        item.insert(
            "latestEventUuid".to_string(),
            AttributeValue::S(EVENT.to_string()),
        );

        let result = read_bubble::<serde_json::Value>(&names, "bubbles", &item);

        assert!(matches!(result, Err(Error::MalformedItem { .. })));
    }
}
