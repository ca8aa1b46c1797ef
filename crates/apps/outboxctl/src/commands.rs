use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use log::{info, warn};
use outbox::{
    DispatchError, FnDispatcher, HttpDispatcher, ItemId, ManualNetworkMonitor, MutationDispatcher,
    NetworkMonitor, OperationKind, OutboxSettings, PassStats, ProbeNetworkMonitor, SqliteKvStore, SyncEngine,
    SyncQueueItem, SyncStatus,
};
use serde_json::json;

use crate::args::{Cli, Command, OutputFormat};

const DB_FILE: &str = "outbox.db";

/// Everything a command needs besides its own arguments
struct Env {
    settings: OutboxSettings,
    db_path: PathBuf,
    output: OutputFormat,
}

pub fn run(cli: Cli) -> Result<ExitCode> {
    let settings = match &cli.settings {
        Some(path) => OutboxSettings::from_file(path)?,
        None => OutboxSettings::load()?,
    };
    let db_path = match cli.db {
        Some(path) => path,
        None => config::data_path(DB_FILE).context("Could not determine data directory")?,
    };
    let env = Env {
        settings,
        db_path,
        output: cli.output,
    };

    match cli.command {
        Command::Enqueue {
            operation,
            entity_kind,
            payload,
        } => {
            let payload: serde_json::Value =
                serde_json::from_str(&payload).context("Payload is not valid JSON")?;
            let operation = OperationKind::from(operation);
            let engine = env.open_offline()?;
            let id = engine.enqueue(operation, &entity_kind, payload)?;
            match env.output {
                OutputFormat::Pretty => println!("Queued {} {} as {}", entity_kind, operation, id),
                OutputFormat::Json => println!("{}", json!({ "id": id })),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Status => {
            let engine = env.open_offline()?;
            env.print_status(&engine.status())?;
            Ok(ExitCode::SUCCESS)
        }
        Command::List => {
            let engine = env.open_offline()?;
            env.print_items(&engine.items(), engine.config().max_retries)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Remove { id } => {
            let engine = env.open_offline()?;
            if engine.remove_item(&ItemId::new(id.clone())) {
                println!("Removed {}", id);
                Ok(ExitCode::SUCCESS)
            } else {
                eprintln!("No queued item with id {}", id);
                Ok(ExitCode::FAILURE)
            }
        }
        Command::Clear { yes } => {
            let engine = env.open_offline()?;
            let count = engine.items().len();
            if count == 0 {
                println!("Queue is already empty");
                return Ok(ExitCode::SUCCESS);
            }
            if !yes && !confirm(&format!("Remove all {} queued mutations?", count))? {
                println!("Aborted");
                return Ok(ExitCode::FAILURE);
            }
            engine.clear_queue();
            println!("Removed {} items", count);
            Ok(ExitCode::SUCCESS)
        }
        Command::Sync { connect_timeout_ms } => env.sync_once(Duration::from_millis(connect_timeout_ms)),
        Command::Watch { interval_ms } => env.watch(Duration::from_millis(interval_ms)),
        Command::Config { init } => env.show_config(init),
    }
}

impl Env {
    fn open(
        &self,
        dispatcher: Arc<dyn MutationDispatcher>,
        network: Arc<dyn NetworkMonitor>,
    ) -> Result<SyncEngine> {
        // The store refuses a second opener, so a running `watch` owns the queue
        let store = SqliteKvStore::new(&self.db_path).with_context(|| {
            format!(
                "Failed to open queue database {} (is `outboxctl watch` running?)",
                self.db_path.display()
            )
        })?;
        let engine = SyncEngine::new(self.settings.engine.clone(), Arc::new(store), dispatcher, network)?;
        Ok(engine)
    }

    /// Engine that never dispatches, for commands that only touch the queue
    fn open_offline(&self) -> Result<SyncEngine> {
        let dispatcher = FnDispatcher::new(|_: &SyncQueueItem| {
            Err(DispatchError::other("Delivery is disabled for this command"))
        });
        self.open(
            Arc::new(dispatcher),
            Arc::new(ManualNetworkMonitor::new(false)),
        )
    }

    fn http_dispatcher(&self) -> Result<HttpDispatcher> {
        let Some(remote) = &self.settings.remote else {
            let hint = OutboxSettings::default_settings_path()
                .map(|p| format!(" or remote_url in {}", p.display()))
                .unwrap_or_default();
            bail!("No remote configured: set OUTBOX_REMOTE_URL{}", hint);
        };
        HttpDispatcher::new(remote)
    }

    fn sync_once(&self, connect_timeout: Duration) -> Result<ExitCode> {
        let dispatcher = self.http_dispatcher()?;
        let probe = ProbeNetworkMonitor::for_url(
            dispatcher.base_url(),
            Duration::from_secs(60),
            connect_timeout,
        )?;
        if !probe.is_usable() {
            bail!("{} is unreachable, nothing was sent", dispatcher.base_url());
        }

        let engine = self.open(Arc::new(dispatcher), Arc::new(probe))?;
        let stats = engine
            .sync_now()
            .context("Could not start a sync pass (remote went away or another pass is running)")?;
        let pruned = engine.prune_synced();
        let status = engine.status();

        self.print_pass(&stats, pruned, &status)?;
        if status.failed_count > 0 {
            Ok(ExitCode::FAILURE)
        } else {
            Ok(ExitCode::SUCCESS)
        }
    }

    fn watch(&self, interval: Duration) -> Result<ExitCode> {
        let dispatcher = self.http_dispatcher()?;
        let probe =
            ProbeNetworkMonitor::for_url(dispatcher.base_url(), interval, Duration::from_secs(3))?;
        info!(
            "Watching {} (remote {})",
            self.db_path.display(),
            dispatcher.base_url()
        );

        let engine = self.open(Arc::new(dispatcher), Arc::new(probe))?;
        let _subscription = engine.subscribe_status(|status| {
            info!(
                "pending={} failed={} exhausted={} syncing={}",
                status.pending_count, status.failed_count, status.terminal_count, status.is_syncing
            );
        });

        // Failed items are only retried by a new pass, so keep poking
        let mut exhausted = ChangeTracker::default();
        loop {
            engine.trigger_sync();
            thread::sleep(interval);
            let status = engine.status();
            if exhausted.update(status.terminal_count) && status.terminal_count > 0 {
                warn!(
                    "{} items gave up after {} attempts; remove them with `outboxctl remove`",
                    status.terminal_count,
                    engine.config().max_retries
                );
            }
        }
    }

    fn show_config(&self, init: bool) -> Result<ExitCode> {
        if init {
            match OutboxSettings::default_settings_path() {
                Some(path) if path.exists() => println!("Settings file already exists: {}", path.display()),
                _ => {
                    let path = self.settings.save()?;
                    println!("Wrote {}", path.display());
                }
            }
        }

        let file = self.settings.to_settings_file();
        match self.output {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&file)?),
            OutputFormat::Pretty => {
                let engine = &self.settings.engine;
                println!("database:          {}", self.db_path.display());
                println!("max retries:       {}", engine.max_retries);
                println!("grace delay:       {:?}", engine.grace_delay);
                match engine.dispatch_timeout {
                    Some(timeout) => println!("dispatch timeout:  {:?}", timeout),
                    None => println!("dispatch timeout:  none"),
                }
                println!("storage key:       {}", engine.storage_key);
                match &self.settings.remote {
                    Some(remote) => {
                        println!("remote:            {}", remote.base_url);
                        println!(
                            "auth token:        {}",
                            if remote.auth_token.is_some() { "set" } else { "not set" }
                        );
                    }
                    None => println!("remote:            not configured"),
                }
            }
        }
        Ok(ExitCode::SUCCESS)
    }

    fn print_status(&self, status: &SyncStatus) -> Result<()> {
        match self.output {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(status)?),
            OutputFormat::Pretty => {
                println!("pending:   {}", status.pending_count);
                println!("failed:    {}", status.failed_count);
                println!("exhausted: {}", status.terminal_count);
            }
        }
        Ok(())
    }

    fn print_items(&self, items: &[SyncQueueItem], max_retries: u32) -> Result<()> {
        match self.output {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(items)?),
            OutputFormat::Pretty => {
                if items.is_empty() {
                    println!("Queue is empty");
                }
                for item in items {
                    let exhausted = if item.is_terminal(max_retries) { " (gave up)" } else { "" };
                    println!(
                        "{}  {:<7} {:<6} {:<16} retries={}{}  {}",
                        item.id,
                        item.status,
                        item.operation,
                        item.entity_kind,
                        item.retry_count,
                        exhausted,
                        item.enqueued_at.format("%Y-%m-%d %H:%M:%S")
                    );
                    if let Some(error) = &item.last_error {
                        println!("    last error: {}", error);
                    }
                }
            }
        }
        Ok(())
    }

    fn print_pass(&self, stats: &PassStats, pruned: usize, status: &SyncStatus) -> Result<()> {
        match self.output {
            OutputFormat::Json => {
                let report = json!({
                    "attempted": stats.attempted,
                    "succeeded": stats.succeeded,
                    "failed": stats.failed,
                    "exhausted": stats.exhausted,
                    "interrupted": stats.interrupted,
                    "duration_ms": stats.duration_ms,
                    "pruned": pruned,
                    "status": status,
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            OutputFormat::Pretty => {
                println!(
                    "Sent {} of {} mutations in {}ms ({} failed)",
                    stats.succeeded, stats.attempted, stats.duration_ms, stats.failed
                );
                if stats.interrupted {
                    println!("Connection lost during the pass; remaining items stay queued");
                }
                if status.failed_count > 0 || status.pending_count > 0 {
                    println!(
                        "Still queued: {} pending, {} failed ({} exhausted)",
                        status.pending_count, status.failed_count, status.terminal_count
                    );
                }
            }
        }
        Ok(())
    }
}

/// Remembers the last value seen and reports changes
#[derive(Default)]
struct ChangeTracker {
    last: usize,
}

impl ChangeTracker {
    fn update(&mut self, value: usize) -> bool {
        std::mem::replace(&mut self.last, value) != value
    }
}

fn confirm(question: &str) -> Result<bool> {
    eprint!("{} [y/N] ", question);
    io::stderr().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
