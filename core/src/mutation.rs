//! Optimistic writes against the cache.
//!
//! # Design
//! Every write runs the same sequence, as plain sequential code:
//!
//! 1. **Applying**: cancel in-flight refetches of the keys about to change,
//!    snapshot those keys into a `PendingMutation`, write the predicted value.
//! 2. **Committed** (server accepted): drop the snapshot and invalidate the
//!    list, stats and detail keys so the next read reconciles with the server.
//!    **RolledBack** (server or network refused): restore every snapshotted
//!    key verbatim. No invalidation, the restored state is already right.
//! 3. **Settling → Done**: the record is discarded. This happens exactly once
//!    per mutation; if the caller drops the future mid-flight the record's
//!    `Drop` rolls back and settles instead.
//!
//! Two overlapping mutations on one id each hold their own snapshot; a late
//! rollback can overwrite the other's optimistic value. The invalidation
//! that follows every commit brings the cache back to server truth.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::api::ApiClient;
use crate::cache::{CacheKey, CacheStore, CacheValue, EntrySnapshot, KeyPrefix};
use crate::error::ApiClientError;
use crate::http::Transport;
use crate::types::{CreateTodo, Todo, TodoList, UpdateTodo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
    Toggle,
    Delete,
    ClearCompleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationTarget {
    New,
    Existing(Uuid),
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
    Idle,
    Applying,
    Committed,
    RolledBack,
    Settling,
    Done,
}

/// Runs writes through the API with optimistic cache updates.
pub struct MutationCoordinator<T> {
    api: ApiClient<T>,
    cache: CacheStore,
    in_flight: Arc<AtomicUsize>,
}

impl<T> Clone for MutationCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            cache: self.cache.clone(),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<T: Transport> MutationCoordinator<T> {
    pub fn new(api: ApiClient<T>, cache: CacheStore) -> Self {
        Self {
            api,
            cache,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Mutations that have started but not settled.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub async fn create(&self, input: CreateTodo) -> Result<Todo, ApiClientError> {
        let mut pending = self.begin(
            MutationKind::Create,
            MutationTarget::New,
            vec![KeyPrefix::Lists, KeyPrefix::Stats],
        );
        let optimistic = Todo::placeholder(&input, Utc::now());
        for (key, page) in self.cached_lists() {
            if let Some(page) = prepend(&key, page, &optimistic) {
                self.cache.write(key, CacheValue::List(page));
            }
        }
        pending.optimistic = Some(optimistic);

        match self.api.create_todo(&input).await {
            Ok(todo) => {
                pending.commit(&[KeyPrefix::Lists, KeyPrefix::Stats]);
                self.cache
                    .write(CacheKey::Detail(todo.id), CacheValue::Detail(Some(todo.clone())));
                Ok(todo)
            }
            Err(error) => {
                pending.roll_back(&error);
                Err(error)
            }
        }
    }

    pub async fn update(&self, id: Uuid, patch: UpdateTodo) -> Result<Todo, ApiClientError> {
        let mut pending = self.begin_for(MutationKind::Update, id);
        let now = Utc::now();
        pending.optimistic = self.patch_everywhere(id, |todo| patch.apply_to(todo, now));

        let outcome = self.api.update_todo(id, &patch).await;
        self.settle_for(pending, id, outcome)
    }

    pub async fn toggle(&self, id: Uuid) -> Result<Todo, ApiClientError> {
        let mut pending = self.begin_for(MutationKind::Toggle, id);
        let now = Utc::now();
        pending.optimistic = self.patch_everywhere(id, |todo| {
            todo.completed = !todo.completed;
            todo.updated_at = now.max(todo.created_at);
        });

        let outcome = self.api.toggle_todo(id).await;
        self.settle_for(pending, id, outcome)
    }

    /// The detail entry is left in place until the server confirms.
    pub async fn remove(&self, id: Uuid) -> Result<(), ApiClientError> {
        let pending = self.begin_for(MutationKind::Delete, id);
        for (key, mut page) in self.cached_lists() {
            let before = page.data.len();
            page.data.retain(|todo| todo.id != id);
            if page.data.len() != before {
                let total = page.pagination.total.saturating_sub(1);
                page.pagination.set_total(total);
                self.cache.write(key, CacheValue::List(page));
            }
        }

        let outcome = self.api.delete_todo(id).await;
        self.settle_for(pending, id, outcome)
    }

    /// No optimistic phase: which rows go away is only known to the server.
    pub async fn clear_completed(&self) -> Result<u64, ApiClientError> {
        let pending = self.begin(MutationKind::ClearCompleted, MutationTarget::Completed, Vec::new());
        match self.api.clear_completed().await {
            Ok(deleted) => {
                pending.commit(&[KeyPrefix::Lists, KeyPrefix::Stats, KeyPrefix::Details]);
                Ok(deleted.deleted)
            }
            Err(error) => {
                pending.roll_back(&error);
                Err(error)
            }
        }
    }

    fn begin_for(&self, kind: MutationKind, id: Uuid) -> PendingMutation<'_> {
        self.begin(
            kind,
            MutationTarget::Existing(id),
            vec![KeyPrefix::Lists, KeyPrefix::Detail(id), KeyPrefix::Stats],
        )
    }

    fn begin(&self, kind: MutationKind, target: MutationTarget, affected: Vec<KeyPrefix>) -> PendingMutation<'_> {
        for prefix in &affected {
            self.cache.cancel_fetches(prefix);
        }
        let snapshot = self.cache.snapshot(&affected);
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let pending = PendingMutation {
            cache: &self.cache,
            in_flight: &self.in_flight,
            kind,
            target,
            snapshot,
            optimistic: None,
            phase: MutationPhase::Idle,
        };
        pending.transition(MutationPhase::Applying)
    }

    fn settle_for<V>(
        &self,
        pending: PendingMutation<'_>,
        id: Uuid,
        outcome: Result<V, ApiClientError>,
    ) -> Result<V, ApiClientError> {
        match outcome {
            Ok(value) => {
                pending.commit(&[KeyPrefix::Lists, KeyPrefix::Stats, KeyPrefix::Detail(id)]);
                Ok(value)
            }
            Err(error) => {
                pending.roll_back(&error);
                Err(error)
            }
        }
    }

    fn cached_lists(&self) -> Vec<(CacheKey, TodoList)> {
        self.cache
            .read_many(&KeyPrefix::Lists)
            .into_iter()
            .filter_map(|(key, value)| match value {
                CacheValue::List(page) => Some((key, page)),
                _ => None,
            })
            .collect()
    }

    /// Apply `change` to the detail entry and every list occurrence of `id`.
    /// Returns the patched todo, if any copy of it was cached.
    fn patch_everywhere(&self, id: Uuid, change: impl Fn(&mut Todo)) -> Option<Todo> {
        let mut patched = None;
        let detail_key = CacheKey::Detail(id);
        if let Some(CacheValue::Detail(Some(mut todo))) = self.cache.read(&detail_key) {
            change(&mut todo);
            patched = Some(todo.clone());
            self.cache.write(detail_key, CacheValue::Detail(Some(todo)));
        }
        for (key, mut page) in self.cached_lists() {
            let mut touched = false;
            for todo in page.data.iter_mut().filter(|todo| todo.id == id) {
                change(todo);
                patched.get_or_insert_with(|| todo.clone());
                touched = true;
            }
            if touched {
                self.cache.write(key, CacheValue::List(page));
            }
        }
        patched
    }
}

/// Count `todo` in every list variant it belongs to. Only the first page
/// shows it; later pages keep their rows until the post-commit refetch.
fn prepend(key: &CacheKey, mut page: TodoList, todo: &Todo) -> Option<TodoList> {
    let CacheKey::List(filter) = key else {
        return None;
    };
    if !filter.matches(todo) {
        return None;
    }
    if filter.page == 1 {
        page.data.insert(0, todo.clone());
        page.data.truncate(filter.limit as usize);
    }
    let total = page.pagination.total + 1;
    page.pagination.set_total(total);
    Some(page)
}

/// One in-flight mutation: its snapshot and where it is in its lifecycle.
struct PendingMutation<'a> {
    cache: &'a CacheStore,
    in_flight: &'a AtomicUsize,
    kind: MutationKind,
    target: MutationTarget,
    snapshot: Vec<EntrySnapshot>,
    optimistic: Option<Todo>,
    phase: MutationPhase,
}

impl PendingMutation<'_> {
    fn transition(mut self, phase: MutationPhase) -> Self {
        self.set_phase(phase);
        self
    }

    fn set_phase(&mut self, phase: MutationPhase) {
        tracing::debug!(
            kind = ?self.kind,
            target = ?self.target,
            from = ?self.phase,
            to = ?phase,
            optimistic_id = ?self.optimistic.as_ref().map(|t| t.id),
            "mutation phase"
        );
        self.phase = phase;
    }

    fn commit(mut self, invalidate: &[KeyPrefix]) {
        self.set_phase(MutationPhase::Committed);
        self.snapshot.clear();
        for prefix in invalidate {
            self.cache.invalidate(prefix);
        }
        self.settle();
    }

    fn roll_back(mut self, error: &ApiClientError) {
        tracing::warn!(kind = ?self.kind, target = ?self.target, %error, "mutation failed, rolling back");
        self.restore();
        self.settle();
    }

    fn restore(&mut self) {
        self.set_phase(MutationPhase::RolledBack);
        for entry in self.snapshot.drain(..) {
            self.cache.restore(entry);
        }
    }

    fn settle(&mut self) {
        if self.phase == MutationPhase::Done {
            return;
        }
        self.set_phase(MutationPhase::Settling);
        self.optimistic = None;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.set_phase(MutationPhase::Done);
    }
}

impl Drop for PendingMutation<'_> {
    fn drop(&mut self) {
        if self.phase != MutationPhase::Done {
            tracing::debug!(kind = ?self.kind, target = ?self.target, "mutation dropped before settling");
            self.restore();
            self.settle();
        }
    }
}
