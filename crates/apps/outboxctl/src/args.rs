use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use outbox::OperationKind;

#[derive(Parser)]
#[command(name = "outboxctl")]
#[command(about = "Inspect and drive an offline mutation queue")]
#[command(long_about = "outboxctl - offline mutation queue tool

Mutations are stored in a local SQLite database and delivered to the
configured remote with `sync` or `watch`.

QUICK START:
  outboxctl enqueue create todo '{\"title\": \"Buy milk\"}'
  outboxctl status
  outboxctl sync

The remote is configured in the settings file or with OUTBOX_REMOTE_URL
and OUTBOX_AUTH_TOKEN.")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// SQLite database holding the queue
    ///
    /// Defaults to outbox.db in the platform data directory.
    #[arg(long, env = "OUTBOX_DB", global = true)]
    pub db: Option<PathBuf>,

    /// Settings file to use instead of the default one
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Output format for command results
    #[arg(short, long, value_enum, default_value = "pretty", global = true)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format for command results.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output.
    #[default]
    Pretty,
    /// Machine-readable JSON output.
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationArg {
    Create,
    Update,
    Delete,
}

impl From<OperationArg> for OperationKind {
    fn from(op: OperationArg) -> Self {
        match op {
            OperationArg::Create => OperationKind::Create,
            OperationArg::Update => OperationKind::Update,
            OperationArg::Delete => OperationKind::Delete,
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Queue a mutation without sending it
    ///
    /// # Examples
    ///
    ///   outboxctl enqueue create todo '{"title": "Buy milk"}'
    ///   outboxctl enqueue delete todo '{"id": 42}'
    #[command(alias = "add")]
    Enqueue {
        #[arg(value_enum)]
        operation: OperationArg,
        /// Remote entity type, e.g. "todo"
        entity_kind: String,
        /// JSON payload passed verbatim to the remote
        payload: String,
    },

    /// Show pending, failed and exhausted counts
    Status,

    /// List queued items, oldest first
    #[command(alias = "ls")]
    List,

    /// Remove one item by id
    #[command(alias = "rm")]
    Remove { id: String },

    /// Remove every queued item
    Clear {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Run one delivery pass against the remote
    ///
    /// Exits with status 1 if any item is still failed afterwards.
    Sync {
        /// How long to wait when checking that the remote is reachable
        #[arg(long, default_value_t = 3000)]
        connect_timeout_ms: u64,
    },

    /// Keep delivering as connectivity allows until interrupted
    Watch {
        /// How often to probe the remote and retry failed items
        #[arg(long, default_value_t = 5000)]
        interval_ms: u64,
    },

    /// Show the resolved settings
    Config {
        /// Write a settings file with the current values if none exists
        #[arg(long)]
        init: bool,
    },
}
