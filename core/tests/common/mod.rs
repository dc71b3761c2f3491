//! Scripted in-memory transport and fixtures shared by the cache tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use serde::Serialize;
use tokio::sync::oneshot;
use uuid::Uuid;

use todo_core::types::Paginated;
use todo_core::{
    ApiClient, CacheStore, HttpRequest, HttpResponse, MutationCoordinator, Pagination, Priority,
    RetryPolicy, Todo, TodoClient, TodoFilter, TodoList, TodoStats, Transport, TransportError,
};

pub const BASE_URL: &str = "http://todo.test";

enum Step {
    Respond(u16, String),
    Fail(String),
    Gate(oneshot::Receiver<(u16, String)>),
    Hang,
}

#[derive(Default)]
struct Script {
    steps: VecDeque<Step>,
    requests: Vec<HttpRequest>,
}

/// Answers requests from a queue of scripted steps and records every
/// request it saw. Clones share the same script.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, step: Step) {
        self.script.lock().unwrap().steps.push_back(step);
    }

    pub fn respond(&self, status: u16, body: impl Into<String>) {
        self.push(Step::Respond(status, body.into()));
    }

    pub fn respond_json<T: Serialize>(&self, status: u16, value: &T) {
        self.respond(status, serde_json::to_string(value).unwrap());
    }

    pub fn fail(&self, message: &str) {
        self.push(Step::Fail(message.to_string()));
    }

    /// The next request waits until the returned sender supplies a response.
    pub fn gate(&self) -> oneshot::Sender<(u16, String)> {
        let (tx, rx) = oneshot::channel();
        self.push(Step::Gate(rx));
        tx
    }

    /// The next request never completes.
    pub fn hang(&self) {
        self.push(Step::Hang);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.script.lock().unwrap().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.script.lock().unwrap().requests.len()
    }

    /// Yield until at least `n` requests have been issued.
    pub async fn wait_for_requests(&self, n: usize) {
        while self.request_count() < n {
            tokio::task::yield_now().await;
        }
    }
}

impl Transport for ScriptedTransport {
    fn execute(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send {
        let step = {
            let mut script = self.script.lock().unwrap();
            script.requests.push(request);
            script.steps.pop_front()
        };
        async move {
            match step {
                None => Err(TransportError::new("no scripted response")),
                Some(Step::Respond(status, body)) => Ok(response(status, body)),
                Some(Step::Fail(message)) => Err(TransportError::new(message)),
                Some(Step::Gate(rx)) => match rx.await {
                    Ok((status, body)) => Ok(response(status, body)),
                    Err(_) => Err(TransportError::new("gate dropped")),
                },
                Some(Step::Hang) => std::future::pending().await,
            }
        }
    }
}

fn response(status: u16, body: String) -> HttpResponse {
    HttpResponse {
        status,
        headers: Vec::new(),
        body,
    }
}

pub fn coordinator(
    transport: &ScriptedTransport,
    cache: &CacheStore,
    retry: RetryPolicy,
) -> MutationCoordinator<ScriptedTransport> {
    let api = ApiClient::new(TodoClient::new(BASE_URL), transport.clone(), retry);
    MutationCoordinator::new(api, cache.clone())
}

pub fn todo(title: &str) -> Todo {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    Todo {
        id: Uuid::new_v4(),
        title: title.to_string(),
        description: None,
        completed: false,
        priority: Priority::Medium,
        due_date: None,
        created_at: at,
        updated_at: at,
    }
}

pub fn page(filter: &TodoFilter, data: Vec<Todo>, total: u64) -> TodoList {
    Paginated {
        data,
        pagination: Pagination::new(filter.page, filter.limit, total),
    }
}

pub fn stats(total: u64, completed: u64) -> TodoStats {
    TodoStats::from_counts(total, completed, Vec::new(), 0)
}

pub fn error_body(status: u16, message: &str) -> String {
    serde_json::json!({
        "error": "Error",
        "message": message,
        "statusCode": status,
    })
    .to_string()
}
