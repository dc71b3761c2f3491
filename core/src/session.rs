//! Stale-while-revalidate reads plus optimistic writes behind one handle.
//!
//! # Design
//! A `TodoSession` owns the cache, the async API client and the mutation
//! coordinator. Non-blocking reads (`list`, `detail`, `stats`) answer from
//! the cache immediately and, when the entry is absent or stale, start a
//! background refetch on the session's `JoinSet`. Subscribers learn about
//! the outcome through `CacheEvent`s. Awaiting reads (`fetch_*`) return the
//! cached value while it is fresh and otherwise go to the server.
//!
//! Each key's error is kept on its own entry, so one failing list variant
//! never marks another key as failed.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::api::ApiClient;
use crate::cache::{CacheEvent, CacheKey, CacheStore, CacheValue, EntryState};
use crate::client::TodoClient;
use crate::config::ClientConfig;
use crate::error::ApiClientError;
use crate::http::Transport;
use crate::mutation::MutationCoordinator;
use crate::types::{CreateTodo, Health, Todo, TodoFilter, TodoList, TodoStats, UpdateTodo};

/// What a non-blocking read hands back.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<V> {
    pub data: Option<V>,
    pub is_stale: bool,
    pub is_fetching: bool,
    pub error: Option<ApiClientError>,
}

pub struct TodoSession<T> {
    api: ApiClient<T>,
    cache: CacheStore,
    mutations: MutationCoordinator<T>,
    tasks: Mutex<JoinSet<()>>,
}

impl<T: Transport> TodoSession<T> {
    /// Must be called inside a tokio runtime: the garbage collector is
    /// spawned right away.
    pub fn new(transport: T, config: &ClientConfig) -> Self {
        let api = ApiClient::new(TodoClient::new(&config.base_url), transport, config.retry_policy());
        let cache = CacheStore::new(config.cache_config());
        let mutations = MutationCoordinator::new(api.clone(), cache.clone());

        let mut tasks = JoinSet::new();
        let gc_every = cache.config().gc_time;
        if !gc_every.is_zero() {
            let gc_cache = cache.clone();
            tasks.spawn(async move {
                let mut interval = tokio::time::interval(gc_every);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    gc_cache.collect_garbage();
                }
            });
        }

        Self {
            api,
            cache,
            mutations,
            tasks: Mutex::new(tasks),
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn mutations(&self) -> &MutationCoordinator<T> {
        &self.mutations
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.cache.subscribe()
    }

    pub fn list(&self, filter: TodoFilter) -> QueryState<TodoList> {
        self.query(CacheKey::list(filter), |value| match value {
            CacheValue::List(page) => Some(page),
            _ => None,
        })
    }

    /// `data` is `Some(None)` once the server has said the id does not exist.
    pub fn detail(&self, id: Uuid) -> QueryState<Option<Todo>> {
        self.query(CacheKey::Detail(id), |value| match value {
            CacheValue::Detail(todo) => Some(todo),
            _ => None,
        })
    }

    pub fn stats(&self) -> QueryState<TodoStats> {
        self.query(CacheKey::Stats, |value| match value {
            CacheValue::Stats(stats) => Some(stats),
            _ => None,
        })
    }

    pub async fn fetch_list(&self, filter: TodoFilter) -> Result<TodoList, ApiClientError> {
        match self.fetch_value(CacheKey::list(filter)).await? {
            CacheValue::List(page) => Ok(page),
            other => Err(mismatch(&other)),
        }
    }

    pub async fn fetch_detail(&self, id: Uuid) -> Result<Option<Todo>, ApiClientError> {
        match self.fetch_value(CacheKey::Detail(id)).await? {
            CacheValue::Detail(todo) => Ok(todo),
            other => Err(mismatch(&other)),
        }
    }

    pub async fn fetch_stats(&self) -> Result<TodoStats, ApiClientError> {
        match self.fetch_value(CacheKey::Stats).await? {
            CacheValue::Stats(stats) => Ok(stats),
            other => Err(mismatch(&other)),
        }
    }

    /// Start a refetch of `key` regardless of freshness. Returns `false` if
    /// one is already running.
    pub fn retry(&self, key: CacheKey) -> bool {
        self.spawn_refetch(key)
    }

    pub async fn health(&self) -> Result<Health, ApiClientError> {
        self.api.health().await
    }

    pub async fn create(&self, input: CreateTodo) -> Result<Todo, ApiClientError> {
        self.mutations.create(input).await
    }

    pub async fn update(&self, id: Uuid, patch: UpdateTodo) -> Result<Todo, ApiClientError> {
        self.mutations.update(id, patch).await
    }

    pub async fn toggle(&self, id: Uuid) -> Result<Todo, ApiClientError> {
        self.mutations.toggle(id).await
    }

    pub async fn remove(&self, id: Uuid) -> Result<(), ApiClientError> {
        self.mutations.remove(id).await
    }

    pub async fn clear_completed(&self) -> Result<u64, ApiClientError> {
        self.mutations.clear_completed().await
    }

    /// Abort background work and drop every cached entry.
    pub async fn shutdown(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks());
        tasks.shutdown().await;
        self.cache.clear();
    }

    fn query<V>(&self, key: CacheKey, project: fn(CacheValue) -> Option<V>) -> QueryState<V> {
        let EntryState {
            value,
            is_stale,
            is_fetching,
            error,
        } = self.cache.state(&key);
        let started = (value.is_none() || is_stale) && !is_fetching && self.spawn_refetch(key);
        QueryState {
            data: value.and_then(project),
            is_stale,
            is_fetching: is_fetching || started,
            error,
        }
    }

    async fn fetch_value(&self, key: CacheKey) -> Result<CacheValue, ApiClientError> {
        let state = self.cache.state(&key);
        if let (Some(value), false) = (state.value, state.is_stale) {
            return Ok(value);
        }
        match self.cache.begin_fetch(&key) {
            Some(ticket) => {
                let outcome = fetch(&self.api, &key).await;
                if self.cache.finish_fetch(ticket, outcome.clone()) {
                    return outcome;
                }
                // A write landed while the request was out; its value is newer.
                match (outcome, self.cache.read(&key)) {
                    (Ok(_), Some(current)) => Ok(current),
                    (outcome, _) => outcome,
                }
            }
            // A background refetch owns the entry; answer this caller directly.
            None => fetch(&self.api, &key).await,
        }
    }

    fn spawn_refetch(&self, key: CacheKey) -> bool {
        let Some(ticket) = self.cache.begin_fetch(&key) else {
            return false;
        };
        let api = self.api.clone();
        let cache = self.cache.clone();
        let mut tasks = self.tasks();
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            let outcome = fetch(&api, &ticket.key).await;
            if let Err(error) = &outcome {
                tracing::warn!(key = ?ticket.key, %error, "background refetch failed");
            }
            cache.finish_fetch(ticket, outcome);
        });
        true
    }

    fn tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn fetch<T: Transport>(api: &ApiClient<T>, key: &CacheKey) -> Result<CacheValue, ApiClientError> {
    match key {
        CacheKey::List(filter) => api.list_todos(filter).await.map(CacheValue::List),
        CacheKey::Detail(id) => match api.get_todo(*id).await {
            Ok(todo) => Ok(CacheValue::Detail(Some(todo))),
            Err(error) if error.is_not_found() => Ok(CacheValue::Detail(None)),
            Err(error) => Err(error),
        },
        CacheKey::Stats => api.stats().await.map(CacheValue::Stats),
    }
}

fn mismatch(value: &CacheValue) -> ApiClientError {
    ApiClientError::new(format!("cache entry holds unexpected value: {value:?}"), 0)
}
