//! Command-line interface for the todo API.
//!
//! Every command runs against a fresh `TodoSession`, so reads go through the
//! cache and writes through the optimistic mutation path exactly as a
//! long-lived UI would drive them.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Map, Value};
use todo_core::validation::{validate_create, validate_list_query, validate_update};
use todo_core::{ApiClientError, ClientConfig, Priority, TodoSession, Transport};
use uuid::Uuid;

use crate::output;
use crate::transport::ReqwestTransport;

/// todo - manage todos on a todo API server
#[derive(Parser, Debug)]
#[command(name = "todo")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Base URL of the API (overrides the config file)
    #[arg(long, global = true, env = "TODO_API_URL")]
    pub api_url: Option<String>,

    /// Client config file (TOML)
    #[arg(long, global = true, env = "TODO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List todos, newest first
    #[command(alias = "ls")]
    List(ListArgs),

    /// Show one todo
    Show { id: Uuid },

    /// Create a todo
    Add {
        title: String,

        #[arg(short, long)]
        description: Option<String>,

        /// low, medium or high
        #[arg(short, long)]
        priority: Option<Priority>,

        /// RFC 3339 timestamp, e.g. 2024-06-01T17:00:00Z
        #[arg(long)]
        due: Option<DateTime<Utc>>,
    },

    /// Change fields of a todo; fields not given are left alone
    Edit(EditArgs),

    /// Flip a todo between open and completed
    Toggle { id: Uuid },

    /// Delete a todo
    #[command(alias = "remove")]
    Rm { id: Uuid },

    /// Delete every completed todo
    Clear,

    /// Counts by status and priority
    Stats,

    /// Server and database health
    Health,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only completed (true) or open (false) todos
    #[arg(long)]
    pub completed: Option<bool>,

    #[arg(long)]
    pub priority: Option<Priority>,

    /// Case-insensitive match on title or description
    #[arg(short, long)]
    pub search: Option<String>,

    #[arg(long)]
    pub page: Option<u32>,

    #[arg(long)]
    pub limit: Option<u32>,
}

#[derive(Args, Debug)]
pub struct EditArgs {
    pub id: Uuid,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(short, long, conflicts_with = "clear_description")]
    pub description: Option<String>,

    /// Remove the description
    #[arg(long)]
    pub clear_description: bool,

    #[arg(long)]
    pub completed: Option<bool>,

    #[arg(short, long)]
    pub priority: Option<Priority>,

    #[arg(long, conflicts_with = "clear_due")]
    pub due: Option<DateTime<Utc>>,

    /// Remove the due date
    #[arg(long)]
    pub clear_due: bool,
}

impl ListArgs {
    /// Query parameters as the server would receive them.
    fn params(&self) -> HashMap<String, String> {
        let mut params = HashMap::new();
        if let Some(completed) = self.completed {
            params.insert("completed".to_string(), completed.to_string());
        }
        if let Some(priority) = self.priority {
            params.insert("priority".to_string(), priority.to_string());
        }
        if let Some(search) = &self.search {
            params.insert("search".to_string(), search.clone());
        }
        if let Some(page) = self.page {
            params.insert("page".to_string(), page.to_string());
        }
        if let Some(limit) = self.limit {
            params.insert("limit".to_string(), limit.to_string());
        }
        params
    }
}

impl EditArgs {
    fn patch(&self) -> Value {
        let mut patch = Map::new();
        if let Some(title) = &self.title {
            patch.insert("title".to_string(), json!(title));
        }
        if let Some(description) = &self.description {
            patch.insert("description".to_string(), json!(description));
        } else if self.clear_description {
            patch.insert("description".to_string(), Value::Null);
        }
        if let Some(completed) = self.completed {
            patch.insert("completed".to_string(), json!(completed));
        }
        if let Some(priority) = self.priority {
            patch.insert("priority".to_string(), json!(priority));
        }
        if let Some(due) = self.due {
            patch.insert("due_date".to_string(), json!(due));
        } else if self.clear_due {
            patch.insert("due_date".to_string(), Value::Null);
        }
        Value::Object(patch)
    }
}

impl Cli {
    pub fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::load(path)?,
            None => ClientConfig::default(),
        };
        if let Some(url) = &self.api_url {
            config.base_url = url.clone();
        }
        Ok(config)
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let config = self.client_config()?;
        tracing::debug!(base_url = %config.base_url, "starting session");
        let session = TodoSession::new(ReqwestTransport::new()?, &config);
        let result = self.command.execute(&session, self.json).await;
        session.shutdown().await;
        result
    }
}

impl Commands {
    async fn execute<T: Transport>(self, session: &TodoSession<T>, json: bool) -> anyhow::Result<()> {
        match self {
            Commands::List(args) => {
                let filter = validate_list_query(&args.params())?;
                let page = session.fetch_list(filter).await?;
                if json {
                    return output::json(&page);
                }
                output::list(&page);
            }
            Commands::Show { id } => {
                let todo = session
                    .fetch_detail(id)
                    .await?
                    .ok_or_else(|| ApiClientError::new(format!("todo {id} not found"), 404))?;
                if json {
                    return output::json(&todo);
                }
                output::todo(&todo);
            }
            Commands::Add {
                title,
                description,
                priority,
                due,
            } => {
                let raw = json!({
                    "title": title,
                    "description": description,
                    "priority": priority.unwrap_or_default(),
                    "due_date": due,
                });
                let input = validate_create(&raw)?;
                let todo = session.create(input).await?;
                if json {
                    return output::json(&todo);
                }
                println!("Created {}", output::todo_line(&todo));
            }
            Commands::Edit(args) => {
                let patch = validate_update(&args.patch())?;
                let todo = session.update(args.id, patch).await?;
                if json {
                    return output::json(&todo);
                }
                println!("Updated {}", output::todo_line(&todo));
            }
            Commands::Toggle { id } => {
                let todo = session.toggle(id).await?;
                if json {
                    return output::json(&todo);
                }
                println!("{}", output::todo_line(&todo));
            }
            Commands::Rm { id } => {
                session.remove(id).await?;
                if json {
                    return output::json(&json!({ "deleted": 1 }));
                }
                println!("Deleted {id}");
            }
            Commands::Clear => {
                let deleted = session.clear_completed().await?;
                if json {
                    return output::json(&json!({ "deleted": deleted }));
                }
                println!("Deleted {deleted} completed todo(s)");
            }
            Commands::Stats => {
                let stats = session.fetch_stats().await?;
                if json {
                    return output::json(&stats);
                }
                output::stats(&stats);
            }
            Commands::Health => {
                let health = session.health().await?;
                if json {
                    return output::json(&health);
                }
                output::health(&health);
            }
        }
        Ok(())
    }
}
