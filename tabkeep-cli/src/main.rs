/*!
Tabkeep CLI - inspect and edit a file-backed tab snapshot.

Every command restores the registry from the snapshot directory, applies
its change through the registry (so capacity, eviction and validation rules
hold exactly as they do in-process) and writes the result back.
*/

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tabkeep_core::{
    FileStore, NewTab, PersistenceAdapter, RemovalStrategy, StorageInfo, SyncHandle, SyncOptions,
    Synchronizer, Tab, TabRegistry, TabkeepConfig,
};
use tabled::{Table, Tabled};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "tabkeep")]
#[command(about = "CLI for Tabkeep tab snapshots")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Directory holding the snapshot files
    #[arg(short, long, global = true, env = "TABKEEP_DIR", default_value = ".tabkeep")]
    dir: PathBuf,

    /// JSON config file with `registry` and `persistence` sections
    #[arg(short, long, global = true, env = "TABKEEP_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured tab capacity
    #[arg(long, global = true)]
    max_tabs: Option<usize>,

    /// Override the configured eviction strategy (lru, oldest, temporary, manual)
    #[arg(long, global = true)]
    strategy: Option<RemovalStrategy>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Describe the stored snapshot
    Info,
    /// List stored tabs in order
    List,
    /// Open a tab
    Add {
        title: String,
        route: String,
        /// Route parameter as key=value; values are parsed as JSON when possible
        #[arg(short, long = "param", value_parser = parse_key_val)]
        params: Vec<(String, serde_json::Value)>,
        /// Query parameter as key=value
        #[arg(short, long = "query", value_parser = parse_key_val)]
        query: Vec<(String, serde_json::Value)>,
        /// Mark the tab as temporary
        #[arg(long)]
        temporary: bool,
        /// Prevent the tab from being closed by eviction or bulk close
        #[arg(long)]
        pinned: bool,
        /// Do not make the new tab active
        #[arg(long)]
        background: bool,
    },
    /// Make a tab active
    Activate { id: String },
    /// Close a tab
    Remove { id: String },
    /// Empty the snapshot
    Clear {
        /// Delete the snapshot file instead of writing an empty snapshot
        #[arg(long)]
        purge: bool,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Tabled)]
struct TabRow {
    #[tabled(rename = "")]
    active: &'static str,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Route")]
    route: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Flags")]
    flags: String,
    #[tabled(rename = "Last accessed")]
    last_accessed: String,
}

impl TabRow {
    fn new(tab: &Tab, active_id: Option<&str>) -> Self {
        let mut flags = Vec::new();
        if !tab.closable {
            flags.push("pinned");
        }
        if tab.temporary {
            flags.push("temporary");
        }

        Self {
            active: if active_id == Some(tab.id.as_str()) { "*" } else { "" },
            id: tab.id.clone(),
            title: tab.title.clone(),
            route: tab.route.clone(),
            status: format!("{:?}", tab.status).to_lowercase(),
            flags: flags.join(","),
            last_accessed: format_timestamp(tab.last_accessed.timestamp()),
        }
    }
}

/// Registry plus file-backed persistence, hydrated from disk.
struct Session {
    registry: Arc<TabRegistry>,
    adapter: Arc<PersistenceAdapter<FileStore>>,
    sync: SyncHandle<FileStore>,
}

impl Session {
    async fn open(cli: &Cli) -> Result<Self, anyhow::Error> {
        let config = load_config(cli)?;
        let store = FileStore::new(&cli.dir);
        debug!(path = %store.path_for(&config.persistence.storage_key).display(), "Using snapshot file");

        let adapter = Arc::new(PersistenceAdapter::new(store, config.persistence)?);
        let registry = Arc::new(TabRegistry::new(config.registry)?);
        let sync =
            Synchronizer::start(Arc::clone(&registry), Arc::clone(&adapter), SyncOptions::default())
                .await;

        Ok(Self {
            registry,
            adapter,
            sync,
        })
    }

    /// Write the registry back and stop synchronizing.
    fn commit(self) -> Result<(), anyhow::Error> {
        let saved = self.sync.flush();
        self.sync.dispose();
        if !saved {
            let reason = self
                .adapter
                .sync_errors()
                .pop()
                .map(|e| e.message)
                .unwrap_or_else(|| "unknown error".to_string());
            bail!("Failed to write snapshot: {reason}");
        }
        Ok(())
    }

    /// The most recent rejection reason, for reporting a failed mutation.
    fn rejection(&self, fallback: &str) -> anyhow::Error {
        match self.registry.last_error() {
            Some(e) => anyhow!("{fallback}: {e}"),
            None => anyhow!("{fallback}"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    if cli.log_json {
        tabkeep_core::observability::init_observability(true)?;
    } else {
        init_logging(cli.verbose);
    }

    match &cli.command {
        Commands::Info => show_info(&cli).await?,
        Commands::List => list_tabs(&cli).await?,
        Commands::Add {
            title,
            route,
            params,
            query,
            temporary,
            pinned,
            background,
        } => {
            let mut data = NewTab::new(title.as_str(), route.as_str())
                .temporary(*temporary)
                .closable(!*pinned);
            for (key, value) in params {
                data = data.with_param(key.as_str(), value.clone());
            }
            for (key, value) in query {
                data = data.with_query(key.as_str(), value.clone());
            }
            add_tab(&cli, data, !*background).await?
        }
        Commands::Activate { id } => activate_tab(&cli, id).await?,
        Commands::Remove { id } => remove_tab(&cli, id).await?,
        Commands::Clear { purge, force } => clear_snapshot(&cli, *purge, *force).await?,
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"))
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<TabkeepConfig, anyhow::Error> {
    let mut config = match &cli.config {
        Some(path) => TabkeepConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => TabkeepConfig::default(),
    };

    if let Some(max_tabs) = cli.max_tabs {
        config.registry.max_tabs = max_tabs;
    }
    if let Some(strategy) = cli.strategy {
        config.registry.removal_strategy = strategy;
    }
    config.validate()?;
    Ok(config)
}

async fn show_info(cli: &Cli) -> Result<(), anyhow::Error> {
    let config = load_config(cli)?;
    let store = FileStore::new(&cli.dir);
    let path = store.path_for(&config.persistence.storage_key);
    let adapter = PersistenceAdapter::new(store, config.persistence)?;

    print_info(&adapter.storage_info(), &path);
    Ok(())
}

fn print_info(info: &StorageInfo, path: &std::path::Path) {
    println!("Snapshot Details:");
    println!("  Key: {}", info.key);
    println!("  File: {}", path.display());
    println!("  Size: {}", format_size(info.size_bytes as u64));
    println!("  Entries: {}", info.entry_count);
    println!(
        "  Version: {} (expected {})",
        info.stored_version.as_deref().unwrap_or("-"),
        info.version
    );
    match info.saved_at {
        Some(saved_at) => println!("  Saved: {}", format_timestamp(saved_at.timestamp())),
        None => println!("  Saved: never"),
    }

    if info.has_valid_data {
        println!("✓ Snapshot is valid");
    } else if info.is_expired {
        println!("✗ Snapshot has expired and will be ignored");
    } else if info.size_bytes > 0 {
        println!("✗ Snapshot could not be parsed");
    } else {
        println!("No snapshot stored");
    }
}

async fn list_tabs(cli: &Cli) -> Result<(), anyhow::Error> {
    let session = Session::open(cli).await?;
    let state = session.registry.snapshot();
    session.sync.dispose();

    if state.is_empty() {
        println!("No tabs stored");
        return Ok(());
    }

    let rows: Vec<TabRow> = state
        .tabs
        .iter()
        .map(|t| TabRow::new(t, state.active_id.as_deref()))
        .collect();
    println!("{}", Table::new(rows));
    Ok(())
}

async fn add_tab(cli: &Cli, data: NewTab, activate: bool) -> Result<(), anyhow::Error> {
    let session = Session::open(cli).await?;
    let before: Vec<String> = session.registry.tabs().into_iter().map(|t| t.id).collect();

    let Some(tab) = session.registry.add_tab(data, activate).await else {
        return Err(session.rejection("Tab not added"));
    };

    for evicted in before.iter().filter(|id| !session.registry.has_tab(id)) {
        println!("Evicted tab {evicted}");
    }
    info!(id = %tab.id, route = %tab.route, "Tab added");
    println!("✓ Added tab {} ({})", tab.id, tab.route);
    session.commit()
}

async fn activate_tab(cli: &Cli, id: &str) -> Result<(), anyhow::Error> {
    let session = Session::open(cli).await?;
    if !session.registry.activate_tab(id).await {
        return Err(session.rejection("Tab not activated"));
    }
    println!("✓ Activated tab {id}");
    session.commit()
}

async fn remove_tab(cli: &Cli, id: &str) -> Result<(), anyhow::Error> {
    let session = Session::open(cli).await?;
    if !session.registry.has_tab(id) {
        bail!("No tab with id {id}");
    }
    if !session.registry.remove_tab(id).await {
        return Err(session.rejection("Tab not removed"));
    }
    match session.registry.active_id() {
        Some(active) => println!("✓ Removed tab {id}, active tab is now {active}"),
        None => println!("✓ Removed tab {id}"),
    }
    session.commit()
}

async fn clear_snapshot(cli: &Cli, purge: bool, force: bool) -> Result<(), anyhow::Error> {
    if !force {
        print!("Are you sure you want to clear all stored tabs? (y/N): ");
        use std::io::{self, Write};
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().to_lowercase().starts_with('y') {
            println!("Clear cancelled");
            return Ok(());
        }
    }

    let config = load_config(cli)?;
    let adapter = PersistenceAdapter::new(FileStore::new(&cli.dir), config.persistence)?;
    let done = if purge {
        adapter.remove_state()
    } else {
        adapter.clear_state()
    };
    if !done {
        bail!("Failed to clear snapshot");
    }

    println!("✓ Snapshot cleared");
    Ok(())
}

fn parse_key_val(s: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{s}`"))?;
    if key.is_empty() {
        return Err(format!("empty key in `{s}`"));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

fn format_timestamp(timestamp: i64) -> String {
    use chrono::{Local, TimeZone};

    match Local.timestamp_opt(timestamp, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => timestamp.to_string(),
    }
}
