//! A shared to-do list, driven by several sessions at once.
//!
//! Run with `cargo run --example quickstart --features test-util`.
//!
//! Each session adds items concurrently. Some of their writes collide and
//! are retried against the fresher list; a bounded `execute_with_retry` call
//! shows what a caller sees when it gives up.

use std::{
    future::{Future, ready},
    sync::Arc,
};

use bubblestore::{
    Application, ExecutableRequest, Execution, Orchestrator, RequestResult, generate_uuid,
    persistence::{Persistence, inmemory},
    test::ContendedPersistence,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TodoList {
    items: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum TodoEvent {
    Added { item: String },
}

enum TodoRequest {
    Add(String),
    Count,
}

#[derive(Debug, Error)]
enum TodoError {
    #[error("item `{0}` is already on the list")]
    Duplicate(String),
}

struct Todos;

impl Application for Todos {
    type State = TodoList;
    type Event = TodoEvent;
    type Request = TodoRequest;
    type Response = usize;
    type Error = TodoError;

    fn initial_state(&self) -> TodoList {
        TodoList::default()
    }

    fn request_callback<'a>(
        &'a self,
        state: &'a TodoList,
        _session_uuid: &'a str,
        request: &'a TodoRequest,
    ) -> impl Future<Output = Result<RequestResult<usize, TodoEvent>, TodoError>> + Send + 'a {
        let result = match request {
            TodoRequest::Add(item) if state.items.contains(item) => {
                Err(TodoError::Duplicate(item.clone()))
            }
            TodoRequest::Add(item) => Ok(RequestResult::record(
                state.items.len() + 1,
                TodoEvent::Added { item: item.clone() },
            )),
            TodoRequest::Count => Ok(RequestResult::respond(state.items.len())),
        };
        ready(result)
    }

    fn apply_event(&self, state: &TodoList, event: &TodoEvent) -> TodoList {
        let mut next = state.clone();
        match event {
            TodoEvent::Added { item } => next.items.push(item.clone()),
        }
        next
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let store = inmemory::Store::new();
    store.initialize().await?;
    let orchestrator = Arc::new(Orchestrator::new(store.clone(), Todos));
    let list = generate_uuid();

    let mut handles = Vec::new();
    for item in ["milk", "bread", "eggs", "coffee"] {
        let orchestrator = Arc::clone(&orchestrator);
        let request = ExecutableRequest::new(
            list.as_str(),
            generate_uuid(),
            TodoRequest::Add(item.to_string()),
        );
        handles.push(tokio::spawn(async move {
            orchestrator.execute_until_successful(&request).await
        }));
    }
    for handle in handles {
        let position = handle.await??;
        println!("added item, list now has {position} entries");
    }

    let duplicate = ExecutableRequest::new(
        list.as_str(),
        generate_uuid(),
        TodoRequest::Add("milk".to_string()),
    );
    match orchestrator.execute_until_successful(&duplicate).await {
        Ok(_) => println!("unexpectedly added a duplicate"),
        Err(err) => println!("rejected: {err}"),
    }

    let contended = Orchestrator::new(
        ContendedPersistence::with_collisions(store.clone(), 5),
        Todos,
    );
    let tea = ExecutableRequest::new(
        list.as_str(),
        generate_uuid(),
        TodoRequest::Add("tea".to_string()),
    );
    match contended.execute_with_retry(&tea, 3).await? {
        Execution::Completed(position) => println!("added tea at position {position}"),
        Execution::RetryNeeded => println!("gave up on tea after 3 contended attempts"),
    }

    let count = ExecutableRequest::new(list.as_str(), generate_uuid(), TodoRequest::Count);
    let total = orchestrator.execute_until_successful(&count).await?;
    let bubble = store.get_bubble::<TodoList>(&list).await?;
    println!("final list ({total} items): {:?}", bubble.map(|b| b.current_state.items));

    Ok(())
}
