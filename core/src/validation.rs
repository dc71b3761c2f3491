//! Boundary validation for raw request payloads.
//!
//! Each function takes the loosely-typed input as it arrived (a JSON value or
//! query-string pairs), checks every field, and either returns the typed
//! input variant or a `ValidationError` listing every problem at once.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{FieldError, ValidationError};
use crate::types::{
    CreateTodo, Priority, TodoFilter, UpdateTodo, DESCRIPTION_MAX_LEN, MAX_LIMIT, TITLE_MAX_LEN,
};

pub const NOTHING_TO_UPDATE: &str = "nothing to update";

const UPDATE_FIELDS: [&str; 5] = ["title", "description", "completed", "priority", "due_date"];

pub fn validate_create(input: &Value) -> Result<CreateTodo, ValidationError> {
    let object = as_object(input)?;
    let mut errors = Vec::new();

    let title = match object.get("title") {
        None | Some(Value::Null) => {
            errors.push(FieldError::new("title", "is required"));
            None
        }
        Some(value) => collect(&mut errors, parse_title(value)),
    };
    let description = optional(object, "description")
        .and_then(|value| collect(&mut errors, parse_description(value)));
    let completed = optional(object, "completed")
        .and_then(|value| collect(&mut errors, parse_boolean("completed", value)))
        .unwrap_or(false);
    let priority = optional(object, "priority")
        .and_then(|value| collect(&mut errors, parse_priority(value)))
        .unwrap_or_default();
    let due_date = optional(object, "due_date")
        .and_then(|value| collect(&mut errors, parse_timestamp("due_date", value)));

    match title {
        Some(title) if errors.is_empty() => Ok(CreateTodo {
            title,
            description,
            completed,
            priority,
            due_date,
        }),
        _ => Err(ValidationError::new(errors)),
    }
}

/// Unknown keys are ignored; a payload with none of the known keys is
/// rejected with [`NOTHING_TO_UPDATE`].
pub fn validate_update(input: &Value) -> Result<UpdateTodo, ValidationError> {
    let object = as_object(input)?;
    if !UPDATE_FIELDS.iter().any(|field| object.contains_key(*field)) {
        return Err(ValidationError::single("", NOTHING_TO_UPDATE));
    }

    let mut errors = Vec::new();
    let mut patch = UpdateTodo::default();

    if let Some(value) = object.get("title") {
        patch.title = collect(&mut errors, parse_title(value));
    }
    if let Some(value) = object.get("description") {
        patch.description = match value {
            Value::Null => Some(None),
            value => collect(&mut errors, parse_description(value)).map(Some),
        };
    }
    if let Some(value) = object.get("completed") {
        patch.completed = collect(&mut errors, parse_boolean("completed", value));
    }
    if let Some(value) = object.get("priority") {
        patch.priority = collect(&mut errors, parse_priority(value));
    }
    if let Some(value) = object.get("due_date") {
        patch.due_date = match value {
            Value::Null => Some(None),
            value => collect(&mut errors, parse_timestamp("due_date", value)).map(Some),
        };
    }

    if errors.is_empty() {
        Ok(patch)
    } else {
        Err(ValidationError::new(errors))
    }
}

/// Parse `GET /todos` query parameters into a normalized filter.
pub fn validate_list_query(params: &HashMap<String, String>) -> Result<TodoFilter, ValidationError> {
    let mut errors = Vec::new();
    let mut filter = TodoFilter::default();

    if let Some(raw) = params.get("completed") {
        filter.completed = match raw.as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => {
                errors.push(FieldError::new("completed", "must be true or false"));
                None
            }
        };
    }
    if let Some(raw) = params.get("priority") {
        filter.priority = collect(
            &mut errors,
            raw.parse::<Priority>().map_err(|msg| FieldError::new("priority", msg)),
        );
    }
    if let Some(raw) = params.get("search") {
        filter.search = Some(raw.clone());
    }
    if let Some(raw) = params.get("page") {
        if let Some(page) = collect(&mut errors, parse_positive("page", raw)) {
            filter.page = page;
        }
    }
    if let Some(raw) = params.get("limit") {
        match parse_positive("limit", raw) {
            Ok(limit) if limit <= MAX_LIMIT => filter.limit = limit,
            Ok(_) => errors.push(FieldError::new(
                "limit",
                format!("must be at most {MAX_LIMIT}"),
            )),
            Err(error) => errors.push(error),
        }
    }

    if errors.is_empty() {
        Ok(filter.normalized())
    } else {
        Err(ValidationError::new(errors))
    }
}

pub fn parse_todo_id(raw: &str) -> Result<Uuid, ValidationError> {
    Uuid::parse_str(raw).map_err(|_| ValidationError::single("id", "must be a valid UUID"))
}

fn as_object(input: &Value) -> Result<&Map<String, Value>, ValidationError> {
    input
        .as_object()
        .ok_or_else(|| ValidationError::single("", "expected a JSON object"))
}

/// A present, non-null field.
fn optional<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object.get(key).filter(|value| !value.is_null())
}

fn collect<T>(errors: &mut Vec<FieldError>, result: Result<T, FieldError>) -> Option<T> {
    result.map_err(|error| errors.push(error)).ok()
}

fn parse_title(value: &Value) -> Result<String, FieldError> {
    let Value::String(raw) = value else {
        return Err(FieldError::new("title", "must be a string"));
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(FieldError::new("title", "must not be empty"));
    }
    if trimmed.chars().count() > TITLE_MAX_LEN {
        return Err(FieldError::new(
            "title",
            format!("must be at most {TITLE_MAX_LEN} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

fn parse_description(value: &Value) -> Result<String, FieldError> {
    let Value::String(raw) = value else {
        return Err(FieldError::new("description", "must be a string or null"));
    };
    if raw.chars().count() > DESCRIPTION_MAX_LEN {
        return Err(FieldError::new(
            "description",
            format!("must be at most {DESCRIPTION_MAX_LEN} characters"),
        ));
    }
    Ok(raw.clone())
}

fn parse_boolean(path: &str, value: &Value) -> Result<bool, FieldError> {
    value
        .as_bool()
        .ok_or_else(|| FieldError::new(path, "must be a boolean"))
}

fn parse_priority(value: &Value) -> Result<Priority, FieldError> {
    value
        .as_str()
        .ok_or_else(|| "must be a string".to_string())
        .and_then(|raw| raw.parse::<Priority>())
        .map_err(|msg| FieldError::new("priority", msg))
}

fn parse_timestamp(path: &str, value: &Value) -> Result<DateTime<Utc>, FieldError> {
    value
        .as_str()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|parsed| parsed.with_timezone(&Utc))
        .ok_or_else(|| FieldError::new(path, "must be an RFC 3339 timestamp"))
}

fn parse_positive(path: &str, raw: &str) -> Result<u32, FieldError> {
    raw.parse::<u32>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| FieldError::new(path, "must be a positive integer"))
}
