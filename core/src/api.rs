//! Async executor: build → transport → parse, with the retry policy.
//!
//! Reads are retried on 5xx responses and on transport failures; writes are
//! retried at most once and only when no response came back, so a write the
//! server rejected is never replayed. There is no application-level timeout:
//! whatever the transport reports is final.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::client::TodoClient;
use crate::error::ApiClientError;
use crate::http::{HttpRequest, HttpResponse, Transport};
use crate::types::{
    CreateTodo, DeletedCount, Health, Todo, TodoFilter, TodoList, TodoStats, UpdateTodo,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts for GET requests.
    pub read_retries: u32,
    /// Extra attempts for writes; anything above 1 is treated as 1.
    pub write_retries: u32,
    /// Base delay, multiplied by the attempt number.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            read_retries: 2,
            write_retries: 1,
            delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            read_retries: 0,
            write_retries: 0,
            delay: Duration::ZERO,
        }
    }
}

/// `TodoClient` bound to a `Transport`.
pub struct ApiClient<T> {
    client: TodoClient,
    transport: Arc<T>,
    retry: RetryPolicy,
}

impl<T> Clone for ApiClient<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            transport: Arc::clone(&self.transport),
            retry: self.retry,
        }
    }
}

impl<T: Transport> ApiClient<T> {
    pub fn new(client: TodoClient, transport: T, retry: RetryPolicy) -> Self {
        Self {
            client,
            transport: Arc::new(transport),
            retry,
        }
    }

    pub fn client(&self) -> &TodoClient {
        &self.client
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn health(&self) -> Result<Health, ApiClientError> {
        let response = self.send(self.client.build_health()).await?;
        self.client.parse_health(response)
    }

    pub async fn list_todos(&self, filter: &TodoFilter) -> Result<TodoList, ApiClientError> {
        let response = self.send(self.client.build_list_todos(filter)?).await?;
        self.client.parse_list_todos(response)
    }

    pub async fn get_todo(&self, id: Uuid) -> Result<Todo, ApiClientError> {
        let response = self.send(self.client.build_get_todo(id)).await?;
        self.client.parse_get_todo(response)
    }

    pub async fn create_todo(&self, input: &CreateTodo) -> Result<Todo, ApiClientError> {
        let response = self.send(self.client.build_create_todo(input)?).await?;
        self.client.parse_create_todo(response)
    }

    pub async fn update_todo(&self, id: Uuid, input: &UpdateTodo) -> Result<Todo, ApiClientError> {
        let response = self.send(self.client.build_update_todo(id, input)?).await?;
        self.client.parse_update_todo(response)
    }

    pub async fn delete_todo(&self, id: Uuid) -> Result<(), ApiClientError> {
        let response = self.send(self.client.build_delete_todo(id)).await?;
        self.client.parse_delete_todo(response)
    }

    pub async fn toggle_todo(&self, id: Uuid) -> Result<Todo, ApiClientError> {
        let response = self.send(self.client.build_toggle_todo(id)).await?;
        self.client.parse_toggle_todo(response)
    }

    pub async fn clear_completed(&self) -> Result<DeletedCount, ApiClientError> {
        let response = self.send(self.client.build_clear_completed()).await?;
        self.client.parse_clear_completed(response)
    }

    pub async fn stats(&self) -> Result<TodoStats, ApiClientError> {
        let response = self.send(self.client.build_stats()).await?;
        self.client.parse_stats(response)
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiClientError> {
        let is_read = request.method.is_read();
        let retries = if is_read {
            self.retry.read_retries
        } else {
            self.retry.write_retries.min(1)
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let last_attempt = attempt > retries;
            match self.transport.execute(request.clone()).await {
                Ok(response) if is_read && response.status >= 500 && !last_attempt => {
                    tracing::warn!(
                        method = request.method.as_str(),
                        path = %request.path,
                        status = response.status,
                        attempt,
                        "server error on read, retrying"
                    );
                }
                Ok(response) => return Ok(response),
                Err(error) if !last_attempt => {
                    tracing::warn!(
                        method = request.method.as_str(),
                        path = %request.path,
                        %error,
                        attempt,
                        "transport failure, retrying"
                    );
                }
                Err(error) => {
                    tracing::debug!(method = request.method.as_str(), path = %request.path, %error, "giving up");
                    return Err(ApiClientError::network(error.0));
                }
            }
            if !self.retry.delay.is_zero() {
                tokio::time::sleep(self.retry.delay * attempt).await;
            }
        }
    }
}
