//! ledgermirror CLI: replay ledger event batches and inspect mirrored state.
//!
//! Usage:
//! ```bash
//! ledgermirror replay  --input batches.jsonl --db ./mirror.db
//! ledgermirror state   --kind election --key e1 --at 120
//! ledgermirror history --kind voter --key 02abcd...
//! ledgermirror info
//! ```

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use ledgermirror_core::address::{AddressSpace, FAMILY_NAME, FAMILY_VERSION, NAMESPACE};
use ledgermirror_core::{EntityKind, MirrorBuilder, MirrorStore, UNBOUNDED};
use ledgermirror_storage::SqliteStorage;

mod cmd_replay;
mod logging;
mod settings;

use settings::Settings;

#[derive(Parser)]
#[command(
    name = "ledgermirror",
    about = "Mirror ledger state-change events into block-ranged relational rows",
    version
)]
struct Cli {
    /// YAML config file with `mirror` and `log` sections
    #[arg(short, long, global = true, env = "LEDGERMIRROR_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Database location (overrides `mirror.database_url`)
    #[arg(long, global = true, env = "LEDGERMIRROR_DB")]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON-lines file of event batches into the store
    Replay {
        /// One JSON array of events per line
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Print the version of an entity visible at a block height
    State {
        /// election | voting_option | poll_registration | voter | vote
        #[arg(long)]
        kind: String,
        /// Natural key of the entity
        #[arg(long)]
        key: String,
        /// Block height (default: current version)
        #[arg(long)]
        at: Option<u64>,
    },

    /// Print every version of an entity, oldest first
    History {
        #[arg(long)]
        kind: String,
        #[arg(long)]
        key: String,
    },

    /// Show namespace and address layout
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?.with_overrides(cli.db.clone(), cli.verbose);
    logging::init_tracing(&settings.log);

    if let Commands::Info = cli.command {
        cmd_info(&settings);
        return Ok(());
    }

    let url = settings.mirror.database_url.clone();
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        #[cfg(feature = "postgres")]
        {
            use ledgermirror_storage::postgres::{PostgresOptions, PostgresStorage};
            let opts = PostgresOptions {
                max_connections: settings.mirror.max_connections,
                ..PostgresOptions::default()
            };
            let store = PostgresStorage::connect_with_options(&url, opts).await?;
            return execute(cli.command, settings, store).await;
        }
        #[cfg(not(feature = "postgres"))]
        {
            return Err(anyhow!("{url}: rebuild with `--features postgres` for PostgreSQL"));
        }
    }

    let store = SqliteStorage::open_with(&url, settings.mirror.max_connections)
        .await
        .with_context(|| format!("opening {url}"))?;
    execute(cli.command, settings, store).await
}

async fn execute<S: MirrorStore>(command: Commands, settings: Settings, store: S) -> Result<()> {
    match command {
        Commands::Replay { input } => {
            let file = File::open(&input).with_context(|| format!("opening {}", input.display()))?;
            let reconciler = MirrorBuilder::from_config(settings.mirror).build(store)?;
            let summary = cmd_replay::replay(&reconciler, BufReader::new(file)).await?;
            println!("{summary}");
            Ok(())
        }
        Commands::State { kind, key, at } => {
            let kind: EntityKind = kind.parse()?;
            let version = match at {
                Some(height) => store.version_at(kind, &key, height).await?,
                None => store.current_version(kind, &key).await?,
            };
            let version = version.ok_or_else(|| match at {
                Some(height) => anyhow!("no {kind} {key:?} visible at block {height}"),
                None => anyhow!("no current {kind} {key:?}"),
            })?;
            println!("{}", serde_json::to_string_pretty(&version)?);
            Ok(())
        }
        Commands::History { kind, key } => {
            let kind: EntityKind = kind.parse()?;
            let history = store.history(kind, &key).await?;
            println!("{}", serde_json::to_string_pretty(&history)?);
            Ok(())
        }
        Commands::Info => {
            cmd_info(&settings);
            Ok(())
        }
    }
}

fn cmd_info(settings: &Settings) {
    println!("LedgerMirror v{}", env!("CARGO_PKG_VERSION"));
    println!("  Family:    {FAMILY_NAME} {FAMILY_VERSION}");
    println!("  Namespace: {NAMESPACE} (mirroring {})", settings.mirror.namespace);
    println!("  Address spaces:");
    for space in [
        AddressSpace::Election,
        AddressSpace::VotingOption,
        AddressSpace::PollRegistration,
        AddressSpace::Voter,
        AddressSpace::Vote,
    ] {
        let infix = space.infix().unwrap_or("--");
        let table = EntityKind::try_from(space).map(|k| k.table_name()).unwrap_or("-");
        println!("    {infix}  {:<18} -> {table}", space.to_string());
    }
    println!("  Open-ended versions end at {UNBOUNDED}");
    println!("  Database:  {}", settings.mirror.database_url);
    println!("  Storage backends: memory, SQLite, PostgreSQL (feature: postgres)");
}
