//! dendrite - operational CLI for the chat backend
//!
//! Thin wrapper over `dendrite-core` for inspecting and exercising the
//! conversation store: database init, thread and message listings,
//! search, tool discovery, health probing, and tool-call decisions.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/dendrite/threads.db
//! - Logs: $XDG_STATE_HOME/dendrite/dendrite.log
//! - Config: $XDG_CONFIG_HOME/dendrite/config.toml

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dendrite_core::types::{Decision, RequestContext, ScopeFilter};
use dendrite_core::{ChatService, Config, Database, ToolRegistry};

#[derive(Parser)]
#[command(name = "dendrite")]
#[command(about = "Inspect and exercise the dendrite chat backend")]
#[command(version)]
struct Args {
    /// Acting user id
    #[arg(short, long, default_value = "local")]
    user: String,

    /// Tenant scope: virtual lab id
    #[arg(long)]
    lab: Option<String>,

    /// Tenant scope: project id
    #[arg(long)]
    project: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create or migrate the database
    Init,
    /// List the acting user's threads, one page at a time
    Threads {
        /// 1-based page number
        #[arg(short, long, default_value = "1")]
        page: u32,
        #[arg(long)]
        page_size: Option<u32>,
    },
    /// Page backward through a thread's messages
    Messages {
        thread_id: String,
        /// Resume from this message id (the oldest already seen)
        #[arg(long)]
        cursor: Option<String>,
        #[arg(long, default_value = "25")]
        page_size: u32,
    },
    /// Ranked full-text search over the user's threads
    Search {
        query: String,
        #[arg(long, default_value = "10")]
        limit: u32,
    },
    /// List registered tools
    Tools,
    /// Probe each tool's backing service
    Probe,
    /// Accept or reject a pending tool call
    Decide {
        thread_id: String,
        call_id: String,
        /// Accept the call (default is reject)
        #[arg(long, conflicts_with = "feedback")]
        accept: bool,
        /// Rejection feedback
        #[arg(long)]
        feedback: Option<String>,
    },
    /// Stop every in-flight tool call of a thread
    Cancel { thread_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;
    let _log_guard =
        dendrite_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("dendrite CLI starting");

    let db_path = Config::database_path();
    let db = Arc::new(Database::open(&db_path).context("failed to open database")?);
    db.migrate().context("failed to run database migrations")?;

    let registry = Arc::new(ToolRegistry::with_default_tools());
    let service =
        ChatService::new(db, registry, &config).context("failed to build chat service")?;

    let ctx = RequestContext::new(args.user.clone());
    let scope = ScopeFilter {
        virtual_lab_id: args.lab.clone(),
        project_id: args.project.clone(),
    };

    match args.command {
        Command::Init => {
            println!("Database ready: {}", db_path.display());
        }
        Command::Threads { page, page_size } => {
            let listing = service.list_threads(&ctx, scope, page, page_size)?;
            println!("Page {}/{}", listing.page, listing.total_pages);
            for thread in listing.threads {
                println!(
                    "  {}  {}  {}",
                    thread.id,
                    thread.updated_at.format("%Y-%m-%d %H:%M"),
                    thread.title
                );
            }
        }
        Command::Messages {
            thread_id,
            cursor,
            page_size,
        } => {
            let page = service.list_messages(&ctx, &thread_id, cursor.as_deref(), page_size)?;
            // Fetched newest-first; print oldest-first like a transcript
            for message in page.messages.iter().rev() {
                println!(
                    "[{}] {:<10} {}",
                    message.created_at.format("%H:%M:%S"),
                    message.entity.as_str(),
                    message.content
                );
            }
            if page.has_more {
                if let Some(cursor) = page.next_cursor {
                    println!("-- older messages remain; resume with --cursor {}", cursor);
                }
            }
        }
        Command::Search { query, limit } => {
            let hits = service.search(&ctx, &query, scope, limit)?;
            if hits.is_empty() {
                println!("No matches");
            }
            for hit in hits {
                println!("{}  {}", hit.thread_id, hit.title);
                println!("    {}", hit.content);
            }
        }
        Command::Tools => {
            for tool in service.list_tools() {
                println!("{:<24} {}", tool.name, tool.name_frontend);
            }
        }
        Command::Probe => {
            for health in service.probe_tools().await? {
                let state = if health.online { "online" } else { "offline" };
                println!("{:<24} {}", health.name, state);
            }
        }
        Command::Decide {
            thread_id,
            call_id,
            accept,
            feedback,
        } => {
            let decision = if accept {
                Decision::Accepted { args: None }
            } else {
                Decision::Rejected { feedback }
            };
            service.decide_tool_call(&ctx, &thread_id, &call_id, decision)?;
            println!("Decision recorded for call {}", call_id);
        }
        Command::Cancel { thread_id } => {
            let stopped = service.cancel_turn(&ctx, &thread_id)?;
            println!("Stopped {} tool call(s)", stopped);
        }
    }

    Ok(())
}
