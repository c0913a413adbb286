//! Binary entrypoint for the Roomkeeper CLI.
//!
//! Commands:
//! - `init` - create a starter `roomkeeper.toml` and the data directory
//! - `seed --handle <h> [--animal <a>] [--can-edit] [--item id:qty ...]` - enrol a student
//! - `show --handle <h>` - print the stored avatar, room and inventory as JSON
//! - `apply --handle <h> --script <file.json>` - run scripted edits through an
//!   editing session and save them
//!
//! See the library crate docs for module-level details: `roomkeeper::`.
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use tokio::sync::{mpsc, Mutex};

use roomkeeper::config::Config;
use roomkeeper::editor::commands::parse_script;
use roomkeeper::editor::driver::start_autosave;
use roomkeeper::editor::types::{
    AnimalType, InventoryItem, ItemCategory, ItemDescriptor, Rarity, ServerSnapshot,
};
use roomkeeper::editor::{EditorError, EditorSession, SyncEvent, SystemClock};
use roomkeeper::metrics;
use roomkeeper::storage::{PersistenceApi, SledBackend};
use roomkeeper::validation::{validate_handle, validate_item_id};

#[derive(Parser)]
#[command(name = "roomkeeper")]
#[command(about = "Draft/commit avatar and room editing with debounced saves")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "roomkeeper.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// Create (or reset) a student's stored avatar, room and inventory
    Seed {
        #[arg(long)]
        handle: String,
        #[arg(long, default_value = "cat")]
        animal: String,
        /// Grant edit permission
        #[arg(long)]
        can_edit: bool,
        /// Starting stock as `item_id:quantity`; repeatable
        #[arg(long = "item")]
        items: Vec<String>,
    },
    /// Print stored state for a student
    Show {
        #[arg(long)]
        handle: String,
    },
    /// Apply a JSON edit script and save the result
    Apply {
        #[arg(long)]
        handle: String,
        #[arg(long)]
        script: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Init => {
            info!("Initializing new roomkeeper configuration");
            Config::create_default(&cli.config).await?;
            let cfg = Config::default();
            tokio::fs::create_dir_all(&cfg.storage.data_dir).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Seed {
            handle,
            animal,
            can_edit,
            items,
        } => {
            let config = load_config(pre_config, &cli.config).await?;
            let handle = validate_handle(&handle)?;
            let animal = AnimalType::parse(&animal)
                .ok_or_else(|| anyhow!("unknown animal type: {}", animal))?;

            let mut snapshot = ServerSnapshot::starter(animal, can_edit);
            for entry in &items {
                snapshot.inventory.push(parse_stock(entry)?);
            }
            let backend = SledBackend::open(config.database_path())?;
            backend.seed(&handle, &snapshot)?;
            info!(
                "seeded {} ({:?}, can_edit={}, {} stock entries)",
                handle,
                animal,
                can_edit,
                snapshot.inventory.len()
            );
        }
        Commands::Show { handle } => {
            let config = load_config(pre_config, &cli.config).await?;
            let handle = validate_handle(&handle)?;
            let backend = SledBackend::open(config.database_path())?;
            let snapshot = backend.fetch_initial_state(&handle).await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Commands::Apply { handle, script } => {
            let config = load_config(pre_config, &cli.config).await?;
            let handle = validate_handle(&handle)?;
            let content = tokio::fs::read_to_string(&script)
                .await
                .with_context(|| format!("reading script {}", script))?;
            let commands = parse_script(&content, config.storage.max_script_bytes)?;

            let backend: Arc<dyn PersistenceApi> =
                Arc::new(SledBackend::open(config.database_path())?);
            let mut session =
                EditorSession::load(&handle, backend.as_ref(), &config.editor, Arc::new(SystemClock))
                    .await?;
            let (events_tx, mut events_rx) = mpsc::unbounded_channel();
            session.set_event_sink(events_tx);

            let session = Arc::new(Mutex::new(session));
            let autosave = start_autosave(session.clone(), backend.clone()).await;

            for (i, command) in commands.iter().enumerate() {
                let mut guard = session.lock().await;
                match command.apply(&mut guard) {
                    Ok(line) => println!("[{}] {}", i, line),
                    Err(e) => warn!("step {} rejected: {}", i, e),
                }
            }
            autosave.shutdown().await;

            while let Ok(event) = events_rx.try_recv() {
                match event {
                    SyncEvent::Saved { entities, .. } => info!("saved {:?}", entities),
                    SyncEvent::Failed { message, .. } => warn!("save failed: {}", message),
                    SyncEvent::Invalidate(_) => {}
                }
            }

            let status = session.lock().await.sync_status();
            let stats = metrics::snapshot();
            info!(
                "saves issued={} succeeded={} failed={} denied_edits={}",
                stats.saves_issued, stats.saves_succeeded, stats.saves_failed, stats.denied_edits
            );
            println!("{}", serde_json::to_string_pretty(&status)?);
            if let Some(message) = status.last_error {
                return Err(EditorError::SaveFailed(message).into());
            }
        }
    }

    Ok(())
}

async fn load_config(pre_config: Option<Config>, path: &str) -> Result<Config> {
    match pre_config {
        Some(config) => Ok(config),
        None => Config::load(path).await,
    }
}

/// `desk:3` -> three desks; `top_hat_01` -> one equip-only hat.
fn parse_stock(entry: &str) -> Result<InventoryItem> {
    let (id, quantity) = match entry.split_once(':') {
        Some((id, qty)) => (id, Some(qty.parse::<u32>().context("stock quantity")?)),
        None => (entry, None),
    };
    let id = validate_item_id(id)?;
    let descriptor = ItemDescriptor {
        display_name: id.replace('_', " "),
        item_id: id,
        category: if quantity.is_some() {
            ItemCategory::Furniture
        } else {
            ItemCategory::Other
        },
        unit_cost: 0,
        rarity: Rarity::Common,
    };
    Ok(match quantity {
        Some(qty) => InventoryItem::new(descriptor, qty),
        None => InventoryItem::equip_only(descriptor),
    })
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    let configured = config
        .as_ref()
        .and_then(|cfg| cfg.logging.level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);
    // CLI verbosity overrides config
    let base_level = match verbosity {
        0 => configured,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|cfg| cfg.logging.file.as_ref())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        });
    let security_path = config.as_ref().and_then(|cfg| cfg.logging.security_file.clone());

    match log_file {
        Some(f) => {
            let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
            let is_tty = atty::is(atty::Stream::Stdout);

            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());

                if let Ok(mut guard) = write_mutex.lock() {
                    let _ = writeln!(guard, "{}", line);
                }

                // Denied edits and permission changes also go to the security log
                if record.target() == "security" {
                    if let Some(ref sec_path) = security_path {
                        if let Ok(mut sf) = std::fs::OpenOptions::new()
                            .create(true)
                            .append(true)
                            .open(sec_path)
                        {
                            let _ = writeln!(sf, "{}", line);
                        }
                    }
                }

                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None => {
            builder.format(|fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
            });
        }
    }
    let _ = builder.try_init();
}
