// Branchnote - offline-first notes and folders
// Entry point and command-line surface

use anyhow::{Context, Result};
use branchnote::app::AppState;
use branchnote::commands;
use branchnote::database::{Entity, EntityChanges, EntityType};
use branchnote::services::{KeyringCredentials, SortOrder};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "branchnote", version, about = "Offline-first notes and folders")]
struct Cli {
    /// Directory holding the local cache and settings
    #[arg(long, env = "BRANCHNOTE_DATA_DIR", default_value = ".branchnote", global = true)]
    data_dir: PathBuf,

    /// Work against the local cache only
    #[arg(long, global = true)]
    offline: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Credential store account
    #[arg(long, default_value = "default", global = true)]
    account: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List one page of a folder (root by default)
    List {
        #[arg(long)]
        parent: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = SortOrder::Recent)]
        sort: SortOrder,
    },
    /// Show one note or folder
    Show { id: String },
    /// Create a note (`file`) or a folder
    Create {
        kind: EntityType,
        #[arg(long)]
        parent: Option<String>,
        #[arg(long)]
        title: Option<String>,
    },
    /// Edit a note or folder
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,
        /// Move into this folder
        #[arg(long, conflicts_with = "root")]
        parent: Option<String>,
        /// Move to the root level
        #[arg(long)]
        root: bool,
        /// Reminder time, RFC 3339
        #[arg(long, conflicts_with = "clear_reminder")]
        reminder: Option<DateTime<Utc>>,
        #[arg(long)]
        clear_reminder: bool,
    },
    /// Delete a note, or a folder and everything in it
    Remove { id: String },
    /// Push changes made offline
    Sync,
    /// Show connectivity and pending changes
    Status,
    /// Poll reminders until interrupted
    Watch,
    /// Store an access token in the OS credential store
    Login {
        #[arg(long)]
        token: String,
    },
    /// Remove the stored access token
    Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "branchnote=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let credentials = KeyringCredentials::new(cli.account.clone());

    match cli.command {
        Command::Login { token } => {
            credentials.store(&token)?;
            println!("Signed in");
            return Ok(());
        }
        Command::Logout => {
            credentials.clear()?;
            println!("Signed out");
            return Ok(());
        }
        _ => {}
    }

    let state = AppState::open(&cli.data_dir, Arc::new(credentials), !cli.offline)
        .await
        .with_context(|| format!("Failed to open data directory {:?}", cli.data_dir))?;

    let pending = commands::sync_status(&state).await.pending;
    if !cli.offline && pending > 0 && !matches!(cli.command, Command::Sync) {
        // Connectivity is back since the last offline session
        if let Err(e) = commands::on_reconnect(&state).await {
            tracing::warn!("Sync on startup failed: {}", e);
        }
    }

    let result = run(&state, cli.command, cli.json).await;
    state.shutdown().await;
    result
}

async fn run(state: &AppState, command: Command, json: bool) -> Result<()> {
    match command {
        Command::List {
            parent,
            page,
            search,
            sort,
        } => {
            let view =
                commands::list_view(state, parent.as_deref(), page, search.as_deref(), sort)
                    .await?;
            if json {
                return print_json(&view);
            }
            if view.items.is_empty() {
                println!("(empty)");
            }
            for entity in &view.items {
                println!("{}", entity_line(entity));
            }
            println!(
                "page {}/{} ({} total)",
                view.page, view.page_count, view.total_count
            );
        }
        Command::Show { id } => {
            let entity = commands::get(state, &id).await?;
            if json {
                return print_json(&entity);
            }
            println!("{}", entity_line(&entity));
            if !entity.tags.is_empty() {
                println!("tags: {}", entity.tags.join(", "));
            }
            if let Some(reminder) = entity.reminder_date {
                println!("reminder: {}", reminder.to_rfc3339());
            }
            if !entity.content.is_empty() {
                println!("\n{}", entity.content);
            }
        }
        Command::Create {
            kind,
            parent,
            title,
        } => {
            let entity = commands::create(state, kind, parent, title).await?;
            print_entity(&entity, json)?;
        }
        Command::Edit {
            id,
            title,
            content,
            tags,
            parent,
            root,
            reminder,
            clear_reminder,
        } => {
            let changes = EntityChanges {
                title,
                content,
                tags,
                parent_id: if root { Some(None) } else { parent.map(Some) },
                reminder_date: if clear_reminder {
                    Some(None)
                } else {
                    reminder.map(Some)
                },
            };
            let entity = commands::edit(state, &id, changes).await?;
            print_entity(&entity, json)?;
        }
        Command::Remove { id } => {
            commands::remove(state, &id).await?;
            println!("Deleted {}", id);
        }
        Command::Sync => {
            let report = commands::on_reconnect(state).await?;
            if json {
                return print_json(&report);
            }
            println!(
                "{} created, {} updated, {} deleted",
                report.created, report.updated, report.deleted
            );
            for (id, reason) in &report.failed {
                println!("pending {}: {}", id, reason);
            }
        }
        Command::Status => {
            let status = commands::sync_status(state).await;
            if json {
                return print_json(&status);
            }
            let info = commands::get_app_info(state).await;
            println!("branchnote {} ({})", info.version, info.server_url);
            println!(
                "{}, {} pending",
                if status.online { "online" } else { "offline" },
                status.pending
            );
        }
        Command::Watch => {
            if state.start_reminders().await {
                println!("Watching reminders, press Ctrl+C to stop");
                tokio::signal::ctrl_c().await?;
            } else {
                println!("Reminders are disabled in settings");
            }
        }
        Command::Login { .. } | Command::Logout => {}
    }

    Ok(())
}

fn entity_line(entity: &Entity) -> String {
    let kind = if entity.is_folder() { "[folder]" } else { "[note]  " };
    let marker = if entity.synced { "" } else { " (saved offline)" };
    format!("{} {}  {}{}", kind, entity.id, entity.title, marker)
}

fn print_entity(entity: &Entity, json: bool) -> Result<()> {
    if json {
        return print_json(entity);
    }
    println!("{}", entity_line(entity));
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
