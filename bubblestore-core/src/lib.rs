//! Core traits and types for the bubblestore event-sourcing library.
//!
//! A *bubble* is an aggregate identified by a UUID. Its state only changes by
//! appending events to a per-bubble chain, and every append is conditional on
//! the bubble not having moved since it was read.
//!
//! - [`application`] - Domain logic contract (`Application`, `RequestResult`)
//! - [`orchestrator`] - Request execution with optimistic retries (`Orchestrator`)
//! - [`persistence`] - Storage contract (`Persistence`) and an in-memory backend
//! - [`uuid`] - Identifier generation and validation
//!
//! # Example
//!
//! ```
//! use std::future::{Future, ready};
//!
//! use bubblestore_core::{
//!     application::{Application, RequestResult},
//!     orchestrator::{ExecutableRequest, Orchestrator},
//!     persistence::{Persistence, inmemory},
//!     uuid::generate_uuid,
//! };
//!
//! struct Tally;
//!
//! impl Application for Tally {
//!     type State = u64;
//!     type Event = u64;
//!     type Request = u64;
//!     type Response = u64;
//!     type Error = std::convert::Infallible;
//!
//!     fn initial_state(&self) -> u64 {
//!         0
//!     }
//!
//!     fn request_callback<'a>(
//!         &'a self,
//!         state: &'a u64,
//!         _session_uuid: &'a str,
//!         request: &'a u64,
//!     ) -> impl Future<Output = Result<RequestResult<u64, u64>, Self::Error>> + Send + 'a {
//!         ready(Ok(RequestResult::record(state + request, *request)))
//!     }
//!
//!     fn apply_event(&self, state: &u64, event: &u64) -> u64 {
//!         state + event
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let orchestrator = Orchestrator::new(inmemory::Store::new(), Tally);
//! let bubble = generate_uuid();
//!
//! for amount in [2, 3] {
//!     let request = ExecutableRequest::new(bubble.as_str(), generate_uuid(), amount);
//!     orchestrator.execute_until_successful(&request).await.unwrap();
//! }
//!
//! let stored = orchestrator
//!     .persistence()
//!     .get_bubble::<u64>(&bubble)
//!     .await
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(stored.current_state, 5);
//! assert_eq!(orchestrator.persistence().event_count(), 2);
//! # }
//! ```
//!
//! Most users should depend on the [`bubblestore`](https://docs.rs/bubblestore)
//! crate, which re-exports these types together with the storage backends.

pub mod application;
pub mod orchestrator;
pub mod persistence;
pub mod uuid;
