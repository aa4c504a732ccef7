//! `territory` - operator CLI for the territorial matching engine.
//!
//! Every command prints its result as JSON on stdout; logs go to stderr.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde::de::DeserializeOwned;
use territory::{
    ArtifactKind, FamilyAddressRecord, NewGazetteerEntry, RefreshOptions, Territory,
    TerritoryConfig,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "territory")]
#[command(about = "Match registry families to gazetteer territories")]
struct Cli {
    /// YAML configuration file.
    #[arg(long, short = 'c', env = "TERRITORY_CONFIG")]
    config: Option<PathBuf>,

    /// redb database file; overrides `store` from the config.
    #[arg(long, env = "TERRITORY_STORE")]
    store: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replace the registry snapshot with a JSON-lines file of family records.
    LoadFamilies { path: PathBuf },
    /// Append gazetteer rows from a JSON-lines file.
    LoadGazetteer { path: PathBuf },
    /// Build one artifact by name, or `all` in dependency order.
    Create { artifact: String },
    /// Refresh a batch of artifacts: all, geo, base or territory.
    Refresh {
        action: String,
        /// Attach match statistics to the report.
        #[arg(long)]
        stats: bool,
        /// Also attach the windowed analysis over this many days.
        #[arg(long)]
        days: Option<u32>,
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Look up postal codes the gazetteer lacks and stage the answers.
    Enrich {
        #[arg(long, short = 'l')]
        limit: Option<usize>,
    },
    /// Move staged lookups into the gazetteer.
    MergeStaging,
    /// List artifacts and their build state.
    Status,
    /// Families per match tier.
    Stats,
    /// Breakdown of families updated within a recent window.
    Analyze {
        #[arg(long)]
        days: Option<u32>,
        /// Window end, YYYY-MM-DD; today when omitted.
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Families no tier matched, for manual review.
    Unmatched {
        #[arg(long, short = 'l')]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = match &cli.config {
        Some(path) => TerritoryConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TerritoryConfig::default(),
    };
    if let Some(path) = &cli.store {
        config.store.backend = "redb".to_string();
        config.store.path = Some(path.clone());
    }

    let territory = Territory::open(config)?;
    run(&territory, cli.command).await?;
    territory.store().flush()?;
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(territory: &Territory, command: Command) -> anyhow::Result<()> {
    match command {
        Command::LoadFamilies { path } => {
            let records: Vec<FamilyAddressRecord> = read_jsonl(&path)?;
            let loaded = territory.load_families(&records)?;
            tracing::info!(loaded, "families_loaded");
            print_json(&serde_json::json!({ "loaded": loaded }))
        }
        Command::LoadGazetteer { path } => {
            let entries: Vec<NewGazetteerEntry> = read_jsonl(&path)?;
            let appended = territory.load_gazetteer(entries)?;
            tracing::info!(appended, "gazetteer_loaded");
            print_json(&serde_json::json!({ "appended": appended }))
        }
        Command::Create { artifact } => {
            let manager = territory.manager();
            if artifact == "all" {
                print_json(&manager.create_all()?)
            } else {
                let kind: ArtifactKind = artifact.parse()?;
                print_json(&manager.create(kind)?)
            }
        }
        Command::Refresh {
            action,
            stats,
            days,
            as_of,
        } => {
            let options = RefreshOptions {
                include_stats: stats || days.is_some(),
                window_days: days,
                as_of,
            };
            print_json(&territory.manager().refresh(&action, &options)?)
        }
        Command::Enrich { limit } => {
            let result = territory.enricher()?.run(limit).await?;
            print_json(&result)
        }
        Command::MergeStaging => print_json(&territory.merge_staging()?),
        Command::Status => print_json(&territory.manager().status()?),
        Command::Stats => print_json(&territory.reporter().match_stats()?),
        Command::Analyze { days, as_of } => {
            let days = days.unwrap_or(territory.config().stats.window_days);
            let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());
            print_json(&territory.reporter().windowed(days, as_of)?)
        }
        Command::Unmatched { limit } => {
            print_json(&territory.reporter().unmatched_families(limit)?)
        }
    }
}

fn read_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut rows = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}", path.display(), n + 1))?;
        rows.push(row);
    }
    Ok(rows)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
