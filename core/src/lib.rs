//! Shared core of the todo service: wire types, validation, the HTTP
//! client and the client-side cache.
//!
//! # Overview
//! `TodoClient` builds `HttpRequest` values and parses `HttpResponse` values
//! without touching the network (host-does-IO pattern). `ApiClient` pairs it
//! with a `Transport` and a retry policy. On top of that, `TodoSession`
//! keeps a `CacheStore` of list pages, details and stats, serves reads
//! stale-while-revalidate, and runs writes optimistically through the
//! `MutationCoordinator`.
//!
//! # Design
//! - `TodoClient` is stateless: it holds only `base_url`.
//! - Each operation is split into `build_*` (produces request) and
//!   `parse_*` (consumes response), so the I/O boundary is explicit.
//! - The server validates request bodies with the same `validation` module
//!   the client types come from, so both sides agree on the rules.

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod mutation;
pub mod session;
pub mod types;
pub mod validation;

pub use api::{ApiClient, RetryPolicy};
pub use cache::{CacheConfig, CacheEvent, CacheKey, CacheStore, CacheValue, KeyPrefix};
pub use client::TodoClient;
pub use config::{ClientConfig, ConfigError};
pub use error::{ApiClientError, ErrorBody, ErrorKind, FieldError, ValidationError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, TransportError};
pub use mutation::{MutationCoordinator, MutationKind, MutationPhase};
pub use session::{QueryState, TodoSession};
pub use types::{
    CreateTodo, DeletedCount, Health, Pagination, Priority, Todo, TodoFilter, TodoList, TodoStats,
    UpdateTodo,
};
