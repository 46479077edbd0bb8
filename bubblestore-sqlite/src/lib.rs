//! SQLite-backed bubble persistence.
//!
//! This crate provides [`Store`], an implementation of
//! [`bubblestore_core::persistence::Persistence`] on top of a `sqlx` SQLite
//! pool. Each write runs in a single transaction, so a collision rolls the
//! event insert back along with the bubble update and no orphaned events are
//! ever left behind.

mod error;
mod store;

pub use error::Error;
pub use store::Store;
