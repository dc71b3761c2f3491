//! Client-side cache of list pages, todo details and stats.
//!
//! # Design
//! Keys are hierarchical: every list variant lives under `KeyPrefix::Lists`
//! regardless of its filter tuple, so one invalidation reaches all of them.
//! Entries carry their own freshness metadata: an entry is stale once it is
//! older than the stale window or has been invalidated, and it is dropped by
//! `collect_garbage` after the GC window without any read or write.
//!
//! Refetches are tracked with a per-entry generation counter.
//! `begin_fetch` hands out a `FetchTicket` stamped with the current
//! generation; `cancel_fetches` bumps it, so the late response is discarded
//! by `finish_fetch` instead of overwriting an optimistic value.
//!
//! The lock is never held across an `.await`; every method is a short
//! synchronous critical section.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::ApiClientError;
use crate::types::{Todo, TodoFilter, TodoList, TodoStats};

pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_GC_TIME: Duration = Duration::from_secs(10 * 60);
const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    List(TodoFilter),
    Detail(Uuid),
    Stats,
}

impl CacheKey {
    /// List key for the canonical form of `filter`.
    pub fn list(filter: TodoFilter) -> Self {
        CacheKey::List(filter.normalized())
    }
}

/// Selects a group of keys for bulk reads, invalidation and cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPrefix {
    All,
    Lists,
    Details,
    Detail(Uuid),
    Stats,
    Exact(CacheKey),
}

impl KeyPrefix {
    pub fn matches(&self, key: &CacheKey) -> bool {
        match (self, key) {
            (KeyPrefix::All, _) => true,
            (KeyPrefix::Lists, CacheKey::List(_)) => true,
            (KeyPrefix::Details, CacheKey::Detail(_)) => true,
            (KeyPrefix::Detail(id), CacheKey::Detail(other)) => id == other,
            (KeyPrefix::Stats, CacheKey::Stats) => true,
            (KeyPrefix::Exact(exact), key) => exact == key,
            _ => false,
        }
    }

    /// The one key this prefix names, if it names exactly one.
    pub fn single_key(&self) -> Option<CacheKey> {
        match self {
            KeyPrefix::Detail(id) => Some(CacheKey::Detail(*id)),
            KeyPrefix::Stats => Some(CacheKey::Stats),
            KeyPrefix::Exact(key) => Some(key.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    List(TodoList),
    /// `None` once the server has answered 404 for the id.
    Detail(Option<Todo>),
    Stats(TodoStats),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    Updated(CacheKey),
    Invalidated(CacheKey),
    Removed(CacheKey),
    FetchFailed(CacheKey, ApiClientError),
}

/// Point-in-time view of one entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryState {
    pub value: Option<CacheValue>,
    pub is_stale: bool,
    pub is_fetching: bool,
    pub error: Option<ApiClientError>,
}

impl EntryState {
    fn missing() -> Self {
        Self {
            value: None,
            is_stale: true,
            is_fetching: false,
            error: None,
        }
    }

    /// Absent or stale, and nobody is fetching it yet.
    pub fn needs_fetch(&self) -> bool {
        (self.value.is_none() || self.is_stale) && !self.is_fetching
    }
}

/// Everything needed to put an entry back exactly as it was.
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySnapshot {
    pub key: CacheKey,
    /// `None` when the key was absent; restoring removes it again.
    value: Option<CacheValue>,
    updated_at: Instant,
    invalidated: bool,
}

impl EntrySnapshot {
    pub fn value(&self) -> Option<&CacheValue> {
        self.value.as_ref()
    }
}

/// Permission to write the result of one refetch. Dropping an unfinished
/// ticket releases the key so another fetch can start.
pub struct FetchTicket {
    pub key: CacheKey,
    generation: u64,
    entries: Arc<Mutex<HashMap<CacheKey, Entry>>>,
    finished: bool,
}

impl Drop for FetchTicket {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.get_mut(&self.key) {
            if entry.generation == self.generation {
                entry.fetching = false;
            }
        }
    }
}

#[derive(Debug)]
struct Entry {
    value: Option<CacheValue>,
    updated_at: Instant,
    last_accessed: Instant,
    invalidated: bool,
    fetching: bool,
    generation: u64,
    error: Option<ApiClientError>,
}

impl Entry {
    fn empty(now: Instant) -> Self {
        Self {
            value: None,
            updated_at: now,
            last_accessed: now,
            invalidated: false,
            fetching: false,
            generation: 0,
            error: None,
        }
    }

    fn is_stale(&self, now: Instant, stale_time: Duration) -> bool {
        self.value.is_none() || self.invalidated || now.duration_since(self.updated_at) >= stale_time
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub stale_time: Duration,
    pub gc_time: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time: DEFAULT_STALE_TIME,
            gc_time: DEFAULT_GC_TIME,
        }
    }
}

/// Shared handle to the cache. Cloning is cheap and every clone sees the
/// same entries.
#[derive(Clone)]
pub struct CacheStore {
    entries: Arc<Mutex<HashMap<CacheKey, Entry>>>,
    events: broadcast::Sender<CacheEvent>,
    config: CacheConfig,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl CacheStore {
    pub fn new(config: CacheConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            events,
            config,
        }
    }

    pub fn config(&self) -> CacheConfig {
        self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    pub fn read(&self, key: &CacheKey) -> Option<CacheValue> {
        let mut entries = self.lock();
        let entry = entries.get_mut(key)?;
        entry.last_accessed = Instant::now();
        entry.value.clone()
    }

    pub fn state(&self, key: &CacheKey) -> EntryState {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.get_mut(key) {
            None => EntryState::missing(),
            Some(entry) => {
                entry.last_accessed = now;
                EntryState {
                    value: entry.value.clone(),
                    is_stale: entry.is_stale(now, self.config.stale_time),
                    is_fetching: entry.fetching,
                    error: entry.error.clone(),
                }
            }
        }
    }

    /// Store a fresh value. Pending fetches for the key are left alone.
    pub fn write(&self, key: CacheKey, value: CacheValue) {
        let now = Instant::now();
        {
            let mut entries = self.lock();
            let entry = entries.entry(key.clone()).or_insert_with(|| Entry::empty(now));
            entry.value = Some(value);
            entry.updated_at = now;
            entry.last_accessed = now;
            entry.invalidated = false;
            entry.error = None;
        }
        self.emit(CacheEvent::Updated(key));
    }

    pub fn remove(&self, key: &CacheKey) -> bool {
        let removed = self.lock().remove(key).is_some();
        if removed {
            self.emit(CacheEvent::Removed(key.clone()));
        }
        removed
    }

    /// Every populated entry under `prefix`, in no particular order.
    pub fn read_many(&self, prefix: &KeyPrefix) -> Vec<(CacheKey, CacheValue)> {
        let now = Instant::now();
        let mut entries = self.lock();
        entries
            .iter_mut()
            .filter(|(key, _)| prefix.matches(key))
            .filter_map(|(key, entry)| {
                entry.last_accessed = now;
                entry.value.clone().map(|value| (key.clone(), value))
            })
            .collect()
    }

    /// Mark every populated entry under `prefix` stale. Returns how many
    /// entries were marked. Nothing is refetched here; the next read does it.
    ///
    /// A fetch still in flight under `prefix` may carry data from before the
    /// change that caused the invalidation, so its outcome is discarded.
    pub fn invalidate(&self, prefix: &KeyPrefix) -> usize {
        let keys: Vec<CacheKey> = {
            let mut entries = self.lock();
            let mut keys = Vec::new();
            for (key, entry) in entries.iter_mut().filter(|(key, _)| prefix.matches(key)) {
                entry.generation += 1;
                entry.fetching = false;
                if entry.value.is_some() {
                    entry.invalidated = true;
                    keys.push(key.clone());
                }
            }
            keys
        };
        tracing::debug!(?prefix, count = keys.len(), "invalidated cache entries");
        let count = keys.len();
        for key in keys {
            self.emit(CacheEvent::Invalidated(key));
        }
        count
    }

    /// Discard the outcome of any fetch under `prefix` that is still in flight.
    pub fn cancel_fetches(&self, prefix: &KeyPrefix) -> usize {
        let mut entries = self.lock();
        let mut cancelled = 0;
        for (key, entry) in entries.iter_mut().filter(|(key, _)| prefix.matches(key)) {
            entry.generation += 1;
            if entry.fetching {
                entry.fetching = false;
                cancelled += 1;
                tracing::debug!(?key, "cancelled in-flight fetch");
            }
        }
        cancelled
    }

    /// Claim the right to refetch `key`. `None` if a fetch is already running.
    pub fn begin_fetch(&self, key: &CacheKey) -> Option<FetchTicket> {
        let now = Instant::now();
        let mut entries = self.lock();
        let entry = entries.entry(key.clone()).or_insert_with(|| Entry::empty(now));
        if entry.fetching {
            return None;
        }
        entry.fetching = true;
        entry.last_accessed = now;
        Some(FetchTicket {
            key: key.clone(),
            generation: entry.generation,
            entries: Arc::clone(&self.entries),
            finished: false,
        })
    }

    /// Record the outcome of a fetch. Returns `false` when the fetch was
    /// cancelled (or the entry dropped) in the meantime and the outcome was
    /// discarded. A failed fetch keeps the previous value.
    pub fn finish_fetch(&self, mut ticket: FetchTicket, outcome: Result<CacheValue, ApiClientError>) -> bool {
        ticket.finished = true;
        let now = Instant::now();
        let key = ticket.key.clone();
        let event = {
            let mut entries = self.lock();
            let Some(entry) = entries.get_mut(&key) else {
                return false;
            };
            if entry.generation != ticket.generation {
                tracing::debug!(?key, "discarding result of cancelled fetch");
                return false;
            }
            entry.fetching = false;
            entry.last_accessed = now;
            match outcome {
                Ok(value) => {
                    entry.value = Some(value);
                    entry.updated_at = now;
                    entry.invalidated = false;
                    entry.error = None;
                    CacheEvent::Updated(key)
                }
                Err(error) => {
                    entry.error = Some(error.clone());
                    CacheEvent::FetchFailed(key, error)
                }
            }
        };
        self.emit(event);
        true
    }

    /// Copy every populated entry under each prefix, keys deduplicated.
    /// Prefixes naming a single key also record that key when it is absent,
    /// so a restore can remove whatever was written there in between.
    pub fn snapshot(&self, prefixes: &[KeyPrefix]) -> Vec<EntrySnapshot> {
        let entries = self.lock();
        let mut snapshot: Vec<EntrySnapshot> = entries
            .iter()
            .filter(|(key, _)| prefixes.iter().any(|prefix| prefix.matches(key)))
            .filter_map(|(key, entry)| {
                entry.value.clone().map(|value| EntrySnapshot {
                    key: key.clone(),
                    value: Some(value),
                    updated_at: entry.updated_at,
                    invalidated: entry.invalidated,
                })
            })
            .collect();
        let now = Instant::now();
        for key in prefixes.iter().filter_map(KeyPrefix::single_key) {
            let absent = !entries.get(&key).is_some_and(|entry| entry.value.is_some());
            if absent && !snapshot.iter().any(|entry| entry.key == key) {
                snapshot.push(EntrySnapshot {
                    key,
                    value: None,
                    updated_at: now,
                    invalidated: false,
                });
            }
        }
        snapshot
    }

    /// Put a snapshotted entry back verbatim, freshness included. A key that
    /// was absent when snapshotted is removed.
    pub fn restore(&self, snapshot: EntrySnapshot) {
        let now = Instant::now();
        let key = snapshot.key;
        let Some(value) = snapshot.value else {
            self.remove(&key);
            return;
        };
        {
            let mut entries = self.lock();
            let entry = entries.entry(key.clone()).or_insert_with(|| Entry::empty(now));
            entry.value = Some(value);
            entry.updated_at = snapshot.updated_at;
            entry.invalidated = snapshot.invalidated;
            entry.last_accessed = now;
        }
        self.emit(CacheEvent::Updated(key));
    }

    /// Drop entries untouched for the GC window. In-flight fetches are kept.
    pub fn collect_garbage(&self) -> usize {
        let now = Instant::now();
        let gc_time = self.config.gc_time;
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.fetching || now.duration_since(entry.last_accessed) < gc_time);
        let dropped = before - entries.len();
        if dropped > 0 {
            tracing::debug!(dropped, "collected unused cache entries");
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: CacheEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}
