//! DynamoDB-backed bubble persistence.
//!
//! This crate provides [`Store`], an implementation of
//! [`bubblestore_core::persistence::Persistence`] on two DynamoDB tables: one
//! holding the latest state of each bubble and one holding events. Optimistic
//! concurrency relies on conditional `PutItem` requests against the bubble
//! table.
//!
//! The store never builds its own client. Pass in an
//! [`aws_sdk_dynamodb::Client`] configured however the application sees fit,
//! together with [`BubbleTableSettings`] and [`EventTableSettings`].

mod error;
mod item;
pub mod settings;
mod store;

pub use error::Error;
pub use settings::{
    Billing, BubbleAttributeNames, BubbleTableSettings, Encryption, EventAttributeNames,
    EventTableSettings, TableSettings,
};
pub use store::Store;
