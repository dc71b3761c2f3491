//! Route handlers. Each one validates its raw input with
//! `todo_core::validation`, calls the repository once and maps the result.

use std::collections::HashMap;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde_json::Value;

use todo_core::types::{DatabaseState, HealthState, Paginated};
use todo_core::validation::{parse_todo_id, validate_create, validate_list_query, validate_update};
use todo_core::{DeletedCount, Health, Pagination, Todo, TodoList, TodoStats};

use crate::error::ApiErrorResponse;
use crate::AppState;

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Health>) {
    let (status, code, database) = match state.repository.ping().await {
        Ok(()) => (HealthState::Ok, StatusCode::OK, DatabaseState::Connected),
        Err(error) => {
            tracing::warn!(%error, "health check could not reach the database");
            (HealthState::Error, StatusCode::SERVICE_UNAVAILABLE, DatabaseState::Disconnected)
        }
    };
    let health = Health {
        status,
        timestamp: Utc::now(),
        uptime: state.started_at.elapsed().as_secs_f64(),
        database,
    };
    (code, Json(health))
}

pub async fn list_todos(
    State(state): State<AppState>,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> Result<Json<TodoList>, ApiErrorResponse> {
    let Query(params) = query?;
    let filter = validate_list_query(&params)?;
    let (data, total) = state.repository.list(&filter).await?;
    tracing::debug!(?filter, total, returned = data.len(), "listed todos");
    Ok(Json(Paginated {
        data,
        pagination: Pagination::new(filter.page, filter.limit, total),
    }))
}

pub async fn create_todo(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Todo>), ApiErrorResponse> {
    let Json(payload) = payload?;
    let input = validate_create(&payload)?;
    let todo = state.repository.insert(input).await?;
    tracing::info!(id = %todo.id, "created todo");
    Ok((StatusCode::CREATED, Json(todo)))
}

pub async fn get_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Todo>, ApiErrorResponse> {
    let id = parse_todo_id(&id)?;
    Ok(Json(state.repository.get(id).await?))
}

pub async fn update_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Todo>, ApiErrorResponse> {
    let id = parse_todo_id(&id)?;
    let Json(payload) = payload?;
    let patch = validate_update(&payload)?;
    let todo = state.repository.update(id, patch).await?;
    tracing::info!(%id, "updated todo");
    Ok(Json(todo))
}

pub async fn delete_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiErrorResponse> {
    let id = parse_todo_id(&id)?;
    state.repository.remove(id).await?;
    tracing::info!(%id, "deleted todo");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn toggle_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Todo>, ApiErrorResponse> {
    let id = parse_todo_id(&id)?;
    let todo = state.repository.toggle(id).await?;
    tracing::info!(%id, completed = todo.completed, "toggled todo");
    Ok(Json(todo))
}

pub async fn clear_completed(
    State(state): State<AppState>,
) -> Result<Json<DeletedCount>, ApiErrorResponse> {
    let deleted = state.repository.delete_completed().await?;
    tracing::info!(deleted, "cleared completed todos");
    Ok(Json(DeletedCount { deleted }))
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<TodoStats>, ApiErrorResponse> {
    Ok(Json(state.repository.stats().await?))
}

pub async fn not_found() -> ApiErrorResponse {
    ApiErrorResponse::not_found("Route not found")
}
