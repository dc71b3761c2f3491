//! Stateless HTTP request builder and response parser for the todo API.
//!
//! # Design
//! `TodoClient` holds only a `base_url` and carries no mutable state between
//! calls. Each API operation is split into a `build_*` method that produces
//! an `HttpRequest` and a `parse_*` method that consumes an `HttpResponse`.
//! The caller executes the actual HTTP round-trip, keeping the core
//! deterministic and free of I/O dependencies.

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::error::ApiClientError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{
    CreateTodo, DeletedCount, Health, Todo, TodoFilter, TodoList, TodoStats, UpdateTodo,
};

/// Synchronous, stateless client for the todo API.
///
/// Builds `HttpRequest` values and parses `HttpResponse` values without
/// touching the network. The caller is responsible for executing the HTTP
/// round-trip between `build_*` and `parse_*`.
#[derive(Debug, Clone)]
pub struct TodoClient {
    base_url: String,
}

impl TodoClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_health(&self) -> HttpRequest {
        self.empty(HttpMethod::Get, "/health".to_string())
    }

    /// `None` filter members are left out of the query string.
    pub fn build_list_todos(&self, filter: &TodoFilter) -> Result<HttpRequest, ApiClientError> {
        let query = serde_urlencoded::to_string(filter)
            .map_err(|e| ApiClientError::new(format!("failed to encode query: {e}"), 0))?;
        let path = if query.is_empty() {
            "/todos".to_string()
        } else {
            format!("/todos?{query}")
        };
        Ok(self.empty(HttpMethod::Get, path))
    }

    pub fn build_get_todo(&self, id: Uuid) -> HttpRequest {
        self.empty(HttpMethod::Get, format!("/todos/{id}"))
    }

    pub fn build_create_todo(&self, input: &CreateTodo) -> Result<HttpRequest, ApiClientError> {
        self.json(HttpMethod::Post, "/todos".to_string(), input)
    }

    pub fn build_update_todo(&self, id: Uuid, input: &UpdateTodo) -> Result<HttpRequest, ApiClientError> {
        self.json(HttpMethod::Patch, format!("/todos/{id}"), input)
    }

    pub fn build_delete_todo(&self, id: Uuid) -> HttpRequest {
        self.empty(HttpMethod::Delete, format!("/todos/{id}"))
    }

    pub fn build_toggle_todo(&self, id: Uuid) -> HttpRequest {
        self.empty(HttpMethod::Post, format!("/todos/{id}/toggle"))
    }

    pub fn build_clear_completed(&self) -> HttpRequest {
        self.empty(HttpMethod::Delete, "/todos".to_string())
    }

    pub fn build_stats(&self) -> HttpRequest {
        self.empty(HttpMethod::Get, "/stats".to_string())
    }

    /// 503 still carries a health body describing what is down.
    pub fn parse_health(&self, response: HttpResponse) -> Result<Health, ApiClientError> {
        match response.status {
            200 | 503 => decode(&response),
            _ => Err(ApiClientError::from_response(&response)),
        }
    }

    pub fn parse_list_todos(&self, response: HttpResponse) -> Result<TodoList, ApiClientError> {
        check_status(&response, 200)?;
        decode(&response)
    }

    pub fn parse_get_todo(&self, response: HttpResponse) -> Result<Todo, ApiClientError> {
        check_status(&response, 200)?;
        decode(&response)
    }

    pub fn parse_create_todo(&self, response: HttpResponse) -> Result<Todo, ApiClientError> {
        check_status(&response, 201)?;
        decode(&response)
    }

    pub fn parse_update_todo(&self, response: HttpResponse) -> Result<Todo, ApiClientError> {
        check_status(&response, 200)?;
        decode(&response)
    }

    /// 204 carries no body, so nothing is parsed.
    pub fn parse_delete_todo(&self, response: HttpResponse) -> Result<(), ApiClientError> {
        check_status(&response, 204)?;
        Ok(())
    }

    pub fn parse_toggle_todo(&self, response: HttpResponse) -> Result<Todo, ApiClientError> {
        check_status(&response, 200)?;
        decode(&response)
    }

    pub fn parse_clear_completed(&self, response: HttpResponse) -> Result<DeletedCount, ApiClientError> {
        check_status(&response, 200)?;
        decode(&response)
    }

    pub fn parse_stats(&self, response: HttpResponse) -> Result<TodoStats, ApiClientError> {
        check_status(&response, 200)?;
        decode(&response)
    }

    fn empty(&self, method: HttpMethod, path: String) -> HttpRequest {
        HttpRequest {
            method,
            path: format!("{}{path}", self.base_url),
            headers: Vec::new(),
            body: None,
        }
    }

    fn json<T: Serialize>(&self, method: HttpMethod, path: String, input: &T) -> Result<HttpRequest, ApiClientError> {
        let body = serde_json::to_string(input)
            .map_err(|e| ApiClientError::new(format!("failed to serialize request: {e}"), 0))?;
        Ok(HttpRequest {
            method,
            path: format!("{}{path}", self.base_url),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Some(body),
        })
    }
}

/// Map any status other than `expected` to an `ApiClientError`.
fn check_status(response: &HttpResponse, expected: u16) -> Result<(), ApiClientError> {
    if response.status == expected {
        return Ok(());
    }
    Err(ApiClientError::from_response(response))
}

fn decode<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, ApiClientError> {
    serde_json::from_str(&response.body).map_err(|e| {
        ApiClientError::new(format!("invalid response body: {e}"), response.status)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Priority;

    const TODO_JSON: &str = r#"{"id":"00000000-0000-0000-0000-000000000001","title":"Test","description":null,"completed":false,"priority":"medium","due_date":null,"created_at":"2024-05-01T12:00:00Z","updated_at":"2024-05-01T12:00:00Z"}"#;

    fn client() -> TodoClient {
        TodoClient::new("http://localhost:3000")
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn build_list_todos_with_default_filter() {
        let req = client().build_list_todos(&TodoFilter::default()).unwrap();
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.path, "http://localhost:3000/todos?page=1&limit=50");
        assert!(req.body.is_none());
        assert!(req.headers.is_empty());
    }

    #[test]
    fn build_list_todos_encodes_filter_members() {
        let filter = TodoFilter::default()
            .completed(true)
            .priority(Priority::High)
            .search("milk & eggs");
        let req = client().build_list_todos(&filter).unwrap();
        assert_eq!(
            req.path,
            "http://localhost:3000/todos?completed=true&priority=high&search=milk+%26+eggs&page=1&limit=50"
        );
    }

    #[test]
    fn build_get_todo_produces_correct_request() {
        let req = client().build_get_todo(Uuid::nil());
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(
            req.path,
            "http://localhost:3000/todos/00000000-0000-0000-0000-000000000000"
        );
        assert!(req.body.is_none());
    }

    #[test]
    fn build_create_todo_produces_correct_request() {
        let input = CreateTodo::new("Buy milk").with_priority(Priority::High);
        let req = client().build_create_todo(&input).unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.path, "http://localhost:3000/todos");
        assert_eq!(
            req.headers,
            vec![("content-type".to_string(), "application/json".to_string())]
        );
        let body: serde_json::Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["title"], "Buy milk");
        assert_eq!(body["priority"], "high");
        assert_eq!(body["completed"], false);
        assert!(body.get("description").is_none());
    }

    #[test]
    fn build_update_todo_uses_patch_and_sends_only_present_fields() {
        let input = UpdateTodo {
            title: Some("Updated".to_string()),
            due_date: Some(None),
            ..UpdateTodo::default()
        };
        let req = client().build_update_todo(Uuid::nil(), &input).unwrap();
        assert_eq!(req.method, HttpMethod::Patch);
        let body: serde_json::Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["title"], "Updated");
        assert!(body["due_date"].is_null());
        assert!(body.get("completed").is_none());
        assert!(body.get("description").is_none());
    }

    #[test]
    fn build_toggle_and_clear_and_stats() {
        let c = client();
        let toggle = c.build_toggle_todo(Uuid::nil());
        assert_eq!(toggle.method, HttpMethod::Post);
        assert!(toggle.path.ends_with("/todos/00000000-0000-0000-0000-000000000000/toggle"));

        let clear = c.build_clear_completed();
        assert_eq!(clear.method, HttpMethod::Delete);
        assert_eq!(clear.path, "http://localhost:3000/todos");

        assert_eq!(c.build_stats().path, "http://localhost:3000/stats");
        assert_eq!(c.build_health().path, "http://localhost:3000/health");
    }

    #[test]
    fn parse_list_todos_success() {
        let body = format!(
            r#"{{"data":[{TODO_JSON}],"pagination":{{"page":1,"limit":50,"total":1,"totalPages":1}}}}"#
        );
        let list = client().parse_list_todos(response(200, &body)).unwrap();
        assert_eq!(list.data.len(), 1);
        assert_eq!(list.data[0].title, "Test");
        assert_eq!(list.pagination.total_pages, 1);
    }

    #[test]
    fn parse_get_todo_not_found() {
        let err = client()
            .parse_get_todo(response(404, r#"{"error":"Not Found","message":"todo not found","statusCode":404}"#))
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.message, "todo not found");
    }

    #[test]
    fn parse_create_todo_success() {
        let todo = client().parse_create_todo(response(201, TODO_JSON)).unwrap();
        assert_eq!(todo.title, "Test");
        assert_eq!(todo.priority, Priority::Medium);
    }

    #[test]
    fn parse_create_todo_wrong_status() {
        let err = client()
            .parse_create_todo(response(500, "internal error"))
            .unwrap_err();
        assert_eq!(err.status_code, 500);
        assert!(err.is_server_error());
    }

    #[test]
    fn parse_delete_todo_ignores_body_on_204() {
        assert!(client().parse_delete_todo(response(204, "")).is_ok());
    }

    #[test]
    fn parse_delete_todo_not_found() {
        let err = client().parse_delete_todo(response(404, "")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn parse_health_accepts_503_body() {
        let body = r#"{"status":"error","timestamp":"2024-05-01T12:00:00Z","uptime":1.5,"database":"disconnected"}"#;
        let health = client().parse_health(response(503, body)).unwrap();
        assert_eq!(health.database, crate::types::DatabaseState::Disconnected);
    }

    #[test]
    fn parse_clear_completed_reads_count() {
        let deleted = client()
            .parse_clear_completed(response(200, r#"{"deleted":3}"#))
            .unwrap();
        assert_eq!(deleted.deleted, 3);
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let client = TodoClient::new("http://localhost:3000/");
        assert_eq!(client.build_stats().path, "http://localhost:3000/stats");
    }

    #[test]
    fn parse_bad_json_keeps_status() {
        let err = client().parse_stats(response(200, "not json")).unwrap_err();
        assert_eq!(err.status_code, 200);
        assert!(err.message.starts_with("invalid response body"));
    }
}
