//! Persistence for todos over a SQLite pool.
//!
//! # Design
//! Inputs arrive already validated (`CreateTodo`, `UpdateTodo`, a normalized
//! `TodoFilter`) and are never re-checked here. Every write is a single
//! autocommit statement with `RETURNING *`, so the row the caller gets back
//! is exactly what was stored.
//!
//! `title_folded` and `description_folded` hold the case-folded text that
//! search runs against. SQLite's own `LIKE` folds ASCII only.
//!
//! Timestamps are stored as fixed-width RFC 3339 text in UTC (microsecond
//! precision, `Z` suffix) so that ordering and `due_date < now` comparisons
//! work lexically.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use thiserror::Error;
use uuid::Uuid;

use todo_core::types::{fold_case, PriorityCount};
use todo_core::{CreateTodo, Priority, Todo, TodoFilter, TodoStats, UpdateTodo};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("todo {0} not found")]
    NotFound(Uuid),
    #[error("nothing to update")]
    NothingToUpdate,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid reference: {0}")]
    InvalidReference(String),
    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(error: sqlx::Error) -> Self {
        if let Some(db) = error.as_database_error() {
            if db.is_unique_violation() {
                return RepositoryError::Conflict(db.message().to_string());
            }
            if db.is_foreign_key_violation() {
                return RepositoryError::InvalidReference(db.message().to_string());
            }
        }
        RepositoryError::Database(error.to_string())
    }
}

#[derive(Debug, FromRow)]
struct TodoRow {
    id: String,
    title: String,
    description: Option<String>,
    completed: bool,
    priority: String,
    due_date: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<TodoRow> for Todo {
    type Error = RepositoryError;

    fn try_from(row: TodoRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| RepositoryError::Database(format!("bad id {:?}: {e}", row.id)))?;
        let priority = row.priority.parse::<Priority>().map_err(RepositoryError::Database)?;
        Ok(Todo {
            id,
            title: row.title,
            description: row.description,
            completed: row.completed,
            priority,
            due_date: row.due_date.as_deref().map(parse_timestamp).transpose()?,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Database(format!("bad timestamp {raw:?}: {e}")))
}

/// `%`, `_` and the escape character itself match literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn push_filter(query: &mut QueryBuilder<'_, Sqlite>, filter: &TodoFilter) {
    query.push(" WHERE 1=1");
    if let Some(completed) = filter.completed {
        query.push(" AND completed = ").push_bind(completed);
    }
    if let Some(priority) = filter.priority {
        query.push(" AND priority = ").push_bind(priority.as_str());
    }
    if let Some(search) = &filter.search {
        let pattern = format!("%{}%", escape_like(&fold_case(search)));
        query
            .push(" AND (title_folded LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR description_folded LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
}

#[derive(Debug, Clone)]
pub struct TodoRepository {
    pool: SqlitePool,
}

impl TodoRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// One page of matching rows, newest first, plus the total match count.
    pub async fn list(&self, filter: &TodoFilter) -> Result<(Vec<Todo>, u64), RepositoryError> {
        let filter = filter.clone().normalized();

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM todos");
        push_filter(&mut count, &filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;
        if total == 0 {
            return Ok((Vec::new(), 0));
        }

        let mut select = QueryBuilder::<Sqlite>::new("SELECT * FROM todos");
        push_filter(&mut select, &filter);
        select
            .push(" ORDER BY created_at DESC, rowid DESC LIMIT ")
            .push_bind(i64::from(filter.limit))
            .push(" OFFSET ")
            .push_bind(filter.offset() as i64);
        let rows: Vec<TodoRow> = select.build_query_as().fetch_all(&self.pool).await?;

        let todos = rows.into_iter().map(Todo::try_from).collect::<Result<Vec<_>, _>>()?;
        Ok((todos, total as u64))
    }

    pub async fn get(&self, id: Uuid) -> Result<Todo, RepositoryError> {
        let row: Option<TodoRow> = sqlx::query_as("SELECT * FROM todos WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.ok_or(RepositoryError::NotFound(id))?.try_into()
    }

    pub async fn insert(&self, input: CreateTodo) -> Result<Todo, RepositoryError> {
        let now = timestamp(Utc::now());
        let row: TodoRow = sqlx::query_as(
            "INSERT INTO todos (id, title_folded, description_folded, title, description,
                                completed, priority, due_date, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(fold_case(&input.title))
        .bind(input.description.as_deref().map(fold_case))
        .bind(input.title)
        .bind(input.description)
        .bind(input.completed)
        .bind(input.priority.as_str())
        .bind(input.due_date.map(timestamp))
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    /// Apply the present fields of `patch`. An empty patch is rejected
    /// before touching the database.
    pub async fn update(&self, id: Uuid, patch: UpdateTodo) -> Result<Todo, RepositoryError> {
        if patch.is_empty() {
            return Err(RepositoryError::NothingToUpdate);
        }

        let mut query = QueryBuilder::<Sqlite>::new("UPDATE todos SET ");
        let mut set = query.separated(", ");
        if let Some(title) = patch.title {
            set.push("title_folded = ").push_bind_unseparated(fold_case(&title));
            set.push("title = ").push_bind_unseparated(title);
        }
        if let Some(description) = patch.description {
            set.push("description_folded = ")
                .push_bind_unseparated(description.as_deref().map(fold_case));
            set.push("description = ").push_bind_unseparated(description);
        }
        if let Some(completed) = patch.completed {
            set.push("completed = ").push_bind_unseparated(completed);
        }
        if let Some(priority) = patch.priority {
            set.push("priority = ").push_bind_unseparated(priority.as_str());
        }
        if let Some(due_date) = patch.due_date {
            set.push("due_date = ").push_bind_unseparated(due_date.map(timestamp));
        }
        set.push("updated_at = MAX(created_at, ")
            .push_bind_unseparated(timestamp(Utc::now()))
            .push_unseparated(")");
        query
            .push(" WHERE id = ")
            .push_bind(id.to_string())
            .push(" RETURNING *");

        let row: Option<TodoRow> = query.build_query_as().fetch_optional(&self.pool).await?;
        row.ok_or(RepositoryError::NotFound(id))?.try_into()
    }

    pub async fn toggle(&self, id: Uuid) -> Result<Todo, RepositoryError> {
        let row: Option<TodoRow> = sqlx::query_as(
            "UPDATE todos SET completed = NOT completed, updated_at = MAX(created_at, ?)
             WHERE id = ?
             RETURNING *",
        )
        .bind(timestamp(Utc::now()))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or(RepositoryError::NotFound(id))?.try_into()
    }

    pub async fn remove(&self, id: Uuid) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM todos WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(id));
        }
        Ok(())
    }

    pub async fn delete_completed(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM todos WHERE completed = 1")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn stats(&self) -> Result<TodoStats, RepositoryError> {
        let (total, completed, overdue): (i64, i64, i64) = sqlx::query_as(
            "SELECT COUNT(*),
                    COALESCE(SUM(completed), 0),
                    COALESCE(SUM(CASE WHEN completed = 0 AND due_date IS NOT NULL AND due_date < ? THEN 1 ELSE 0 END), 0)
             FROM todos",
        )
        .bind(timestamp(Utc::now()))
        .fetch_one(&self.pool)
        .await?;

        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT priority, COUNT(*) FROM todos GROUP BY priority")
                .fetch_all(&self.pool)
                .await?;
        let by_priority = rows
            .into_iter()
            .map(|(priority, count)| {
                Ok(PriorityCount {
                    priority: priority.parse().map_err(RepositoryError::Database)?,
                    count: count as u64,
                })
            })
            .collect::<Result<Vec<_>, RepositoryError>>()?;

        Ok(TodoStats::from_counts(
            total as u64,
            completed as u64,
            by_priority,
            overdue as u64,
        ))
    }

    pub async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::db;
    use chrono::Duration;

    async fn repository() -> TodoRepository {
        let pool = db::connect(&ServerConfig::default()).await.unwrap();
        db::migrate(&pool).await.unwrap();
        TodoRepository::new(pool)
    }

    #[test]
    fn escape_like_escapes_wildcards() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn timestamps_are_fixed_width() {
        let at = DateTime::parse_from_rfc3339("2024-05-01T12:00:00+02:00")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(timestamp(at), "2024-05-01T10:00:00.000000Z");
        assert_eq!(parse_timestamp(&timestamp(at)).unwrap(), at);
    }

    #[tokio::test]
    async fn insert_applies_defaults_and_get_round_trips() {
        let repo = repository().await;
        let created = repo.insert(CreateTodo::new("Buy milk")).await.unwrap();
        assert_eq!(created.priority, Priority::Medium);
        assert!(!created.completed);
        assert!(created.description.is_none());
        assert_eq!(created.created_at, created.updated_at);

        let fetched = repo.get(created.id).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn get_unknown_id_is_not_found() {
        let repo = repository().await;
        let id = Uuid::new_v4();
        assert!(matches!(repo.get(id).await, Err(RepositoryError::NotFound(missing)) if missing == id));
    }

    #[tokio::test]
    async fn list_filters_and_orders_newest_first() {
        let repo = repository().await;
        repo.insert(CreateTodo::new("Buy milk").with_priority(Priority::High))
            .await
            .unwrap();
        repo.insert(CreateTodo::new("Walk dog").with_priority(Priority::High).completed(true))
            .await
            .unwrap();
        repo.insert(CreateTodo::new("Read book").with_description("about MILK"))
            .await
            .unwrap();
        repo.insert(CreateTodo::new("Pay rent").with_priority(Priority::Low))
            .await
            .unwrap();

        let (all, total) = repo.list(&TodoFilter::default()).await.unwrap();
        assert_eq!(total, 4);
        let titles: Vec<_> = all.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["Pay rent", "Read book", "Walk dog", "Buy milk"]);

        let (high, total) = repo
            .list(&TodoFilter::default().priority(Priority::High))
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert!(high.iter().all(|t| t.priority == Priority::High));

        let (open_high, total) = repo
            .list(&TodoFilter::default().priority(Priority::High).completed(false))
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(open_high[0].title, "Buy milk");

        let (milk, total) = repo.list(&TodoFilter::default().search("milk")).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(milk.len(), 2);
    }

    #[tokio::test]
    async fn search_treats_wildcards_literally() {
        let repo = repository().await;
        repo.insert(CreateTodo::new("50% off")).await.unwrap();
        repo.insert(CreateTodo::new("500 items")).await.unwrap();

        let (rows, total) = repo.list(&TodoFilter::default().search("50%")).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].title, "50% off");
    }

    #[tokio::test]
    async fn list_paginates() {
        let repo = repository().await;
        for i in 0..5 {
            repo.insert(CreateTodo::new(format!("todo {i}"))).await.unwrap();
        }
        let (page, total) = repo
            .list(&TodoFilter::default().page(3).limit(2))
            .await
            .unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].title, "todo 0");

        let (past_end, total) = repo
            .list(&TodoFilter::default().page(9).limit(2))
            .await
            .unwrap();
        assert_eq!(total, 5);
        assert!(past_end.is_empty());
    }

    #[tokio::test]
    async fn update_changes_only_present_fields() {
        let repo = repository().await;
        let due = Utc::now() + Duration::days(1);
        let created = repo
            .insert(CreateTodo::new("Draft").with_description("notes").with_due_date(due))
            .await
            .unwrap();

        let patch = UpdateTodo {
            title: Some("Final".to_string()),
            description: Some(None),
            ..UpdateTodo::default()
        };
        let updated = repo.update(created.id, patch).await.unwrap();
        assert_eq!(updated.title, "Final");
        assert!(updated.description.is_none());
        assert_eq!(updated.priority, created.priority);
        assert!(updated.due_date.is_some());
        assert!(updated.updated_at >= created.created_at);
    }

    #[tokio::test]
    async fn empty_update_writes_nothing() {
        let repo = repository().await;
        let created = repo.insert(CreateTodo::new("Keep")).await.unwrap();
        let result = repo.update(created.id, UpdateTodo::default()).await;
        assert!(matches!(result, Err(RepositoryError::NothingToUpdate)));
        assert_eq!(repo.get(created.id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn update_unknown_id_is_not_found() {
        let repo = repository().await;
        let patch = UpdateTodo {
            completed: Some(true),
            ..UpdateTodo::default()
        };
        assert!(matches!(
            repo.update(Uuid::new_v4(), patch).await,
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn toggle_twice_restores_completed() {
        let repo = repository().await;
        let created = repo.insert(CreateTodo::new("Flip")).await.unwrap();
        let once = repo.toggle(created.id).await.unwrap();
        assert!(once.completed);
        let twice = repo.toggle(created.id).await.unwrap();
        assert!(!twice.completed);
        assert!(twice.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn remove_and_delete_completed() {
        let repo = repository().await;
        let keep = repo.insert(CreateTodo::new("keep")).await.unwrap();
        repo.insert(CreateTodo::new("done 1").completed(true)).await.unwrap();
        repo.insert(CreateTodo::new("done 2").completed(true)).await.unwrap();

        assert_eq!(repo.delete_completed().await.unwrap(), 2);
        assert_eq!(repo.delete_completed().await.unwrap(), 0);

        repo.remove(keep.id).await.unwrap();
        assert!(matches!(repo.remove(keep.id).await, Err(RepositoryError::NotFound(_))));
        assert_eq!(repo.list(&TodoFilter::default()).await.unwrap().1, 0);
    }

    #[tokio::test]
    async fn stats_counts_overdue_only_for_open_todos() {
        let repo = repository().await;
        let past = Utc::now() - Duration::days(2);
        let future = Utc::now() + Duration::days(2);
        repo.insert(CreateTodo::new("late").with_due_date(past).with_priority(Priority::High))
            .await
            .unwrap();
        repo.insert(CreateTodo::new("late but done").with_due_date(past).completed(true))
            .await
            .unwrap();
        repo.insert(CreateTodo::new("upcoming").with_due_date(future))
            .await
            .unwrap();

        let stats = repo.stats().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.incomplete, 2);
        assert_eq!(stats.completion_rate, 33);
        assert_eq!(stats.overdue, 1);
        assert_eq!(
            stats.by_priority,
            vec![
                PriorityCount { priority: Priority::High, count: 1 },
                PriorityCount { priority: Priority::Medium, count: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn stats_on_empty_table() {
        let repo = repository().await;
        let stats = repo.stats().await.unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.completion_rate, 0);
        assert!(stats.by_priority.is_empty());
    }

    #[tokio::test]
    async fn duplicate_id_is_a_conflict() {
        let repo = repository().await;
        let created = repo.insert(CreateTodo::new("one")).await.unwrap();
        let err = sqlx::query(
            "INSERT INTO todos (id, title, completed, priority, created_at, updated_at)
             VALUES (?, 'two', 0, 'low', ?, ?)",
        )
        .bind(created.id.to_string())
        .bind(timestamp(Utc::now()))
        .bind(timestamp(Utc::now()))
        .execute(repo.pool())
        .await
        .unwrap_err();
        assert!(matches!(RepositoryError::from(err), RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn ping_succeeds_on_open_pool() {
        let repo = repository().await;
        repo.ping().await.unwrap();
        repo.pool().close().await;
        assert!(repo.ping().await.is_err());
    }
}
