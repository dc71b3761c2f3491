//! Human and JSON rendering of command results.

use serde::Serialize;
use todo_core::types::HealthState;
use todo_core::{Health, Todo, TodoList, TodoStats};

pub fn json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn todo_line(todo: &Todo) -> String {
    let mark = if todo.completed { "[x]" } else { "[ ]" };
    let mut line = format!("{mark} {}  {:<6}  {}", todo.id, todo.priority.as_str(), todo.title);
    if let Some(due) = todo.due_date {
        line.push_str(&format!("  (due {})", due.format("%Y-%m-%d")));
    }
    line
}

pub fn todo(todo: &Todo) {
    println!("{}", todo_line(todo));
    if let Some(description) = &todo.description {
        println!("    {description}");
    }
    println!(
        "    created {}  updated {}",
        todo.created_at.format("%Y-%m-%d %H:%M"),
        todo.updated_at.format("%Y-%m-%d %H:%M")
    );
}

pub fn list(page: &TodoList) {
    if page.data.is_empty() {
        println!("No todos.");
    }
    for todo in &page.data {
        println!("{}", todo_line(todo));
    }
    let p = &page.pagination;
    if p.total_pages > 1 {
        println!("page {} of {} ({} todos)", p.page, p.total_pages, p.total);
    }
}

pub fn stats(stats: &TodoStats) {
    println!(
        "{} todos, {} completed, {} open ({}% done)",
        stats.total, stats.completed, stats.incomplete, stats.completion_rate
    );
    for bucket in &stats.by_priority {
        println!("  {:<6} {}", bucket.priority.as_str(), bucket.count);
    }
    if stats.overdue > 0 {
        println!("  {} overdue", stats.overdue);
    }
}

pub fn health(health: &Health) {
    let status = match health.status {
        HealthState::Ok => "ok",
        HealthState::Error => "unhealthy",
    };
    println!(
        "{status}: database {:?}, up {:.0}s",
        health.database, health.uptime
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use todo_core::Priority;
    use uuid::Uuid;

    #[test]
    fn todo_line_shows_mark_priority_and_due_date() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let todo = Todo {
            id: Uuid::nil(),
            title: "Buy milk".to_string(),
            description: None,
            completed: true,
            priority: Priority::High,
            due_date: Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()),
            created_at: at,
            updated_at: at,
        };
        assert_eq!(
            todo_line(&todo),
            "[x] 00000000-0000-0000-0000-000000000000  high    Buy milk  (due 2024-06-01)"
        );
    }
}
