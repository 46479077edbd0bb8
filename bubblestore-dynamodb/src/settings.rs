//! Table configuration.
//!
//! Both tables are created by [`Store::initialize`](crate::Store) from these
//! settings, and every attribute name the store reads or writes can be
//! overridden. All settings deserialize with `serde`, so they can be loaded
//! from a configuration file:
//!
//! ```
//! use bubblestore_dynamodb::{Billing, BubbleTableSettings};
//!
//! let settings: BubbleTableSettings = serde_json::from_str(
//!     r#"{
//!         "table_name": "bubbles",
//!         "billing": { "type": "provisioned", "read_capacity_units": 5, "write_capacity_units": 2 },
//!         "tags": { "team": "platform" }
//!     }"#,
//! )
//! .unwrap();
//!
//! assert_eq!(settings.table.table_name, "bubbles");
//! assert_eq!(settings.attribute_names.bubble_uuid, "bubbleUuid");
//! assert!(matches!(settings.table.billing, Billing::Provisioned { .. }));
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Capacity mode used when creating a table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Billing {
    #[default]
    PayPerRequest,
    Provisioned {
        read_capacity_units: i64,
        write_capacity_units: i64,
    },
}

/// Server-side encryption used when creating a table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Encryption {
    /// The table's default encryption.
    #[default]
    None,
    /// Customer-managed KMS key.
    Kms { master_key_id: String },
}

/// Settings shared by both tables.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSettings {
    pub table_name: String,
    #[serde(default)]
    pub billing: Billing,
    #[serde(default)]
    pub encryption: Encryption,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl TableSettings {
    /// Pay-per-request table with default encryption and no tags.
    #[must_use]
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            billing: Billing::default(),
            encryption: Encryption::default(),
            tags: BTreeMap::new(),
        }
    }
}

/// Attribute names of a bubble item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BubbleAttributeNames {
    /// Hash key.
    pub bubble_uuid: String,
    pub current_state_json: String,
    pub latest_event_uuid: String,
}

impl Default for BubbleAttributeNames {
    fn default() -> Self {
        Self {
            bubble_uuid: "bubbleUuid".to_string(),
            current_state_json: "currentStateJson".to_string(),
            latest_event_uuid: "latestEventUuid".to_string(),
        }
    }
}

/// Attribute names of an event item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventAttributeNames {
    /// Hash key.
    pub event_uuid: String,
    /// Absent on the root event of a bubble.
    pub previous_event_uuid: String,
    pub bubble_uuid: String,
    pub session_uuid: String,
    pub event_json: String,
    pub recorded: String,
}

impl Default for EventAttributeNames {
    fn default() -> Self {
        Self {
            event_uuid: "eventUuid".to_string(),
            previous_event_uuid: "previousEventUuid".to_string(),
            bubble_uuid: "bubbleUuid".to_string(),
            session_uuid: "sessionUuid".to_string(),
            event_json: "eventJson".to_string(),
            recorded: "recorded".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BubbleTableSettings {
    #[serde(flatten)]
    pub table: TableSettings,
    #[serde(default)]
    pub attribute_names: BubbleAttributeNames,
}

impl BubbleTableSettings {
    #[must_use]
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table: TableSettings::new(table_name),
            attribute_names: BubbleAttributeNames::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTableSettings {
    #[serde(flatten)]
    pub table: TableSettings,
    #[serde(default)]
    pub attribute_names: EventAttributeNames,
}

impl EventTableSettings {
    #[must_use]
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table: TableSettings::new(table_name),
            attribute_names: EventAttributeNames::default(),
        }
    }
}
