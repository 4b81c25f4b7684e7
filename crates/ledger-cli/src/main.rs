// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ledger_config::LedgerConfig;
use ledger_core::{CodePayload, ConfigPayload, EnvironmentPayload, MutationPayload, RecordKind};
use ledger_error::ErrorCatalog;
use ledger_store::RecordStore;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Exit code for runtime errors.
const EXIT_RUNTIME_ERROR: i32 = 1;
/// Exit code for usage / argument errors (clap exits with 2 automatically).
#[allow(dead_code)]
const EXIT_USAGE_ERROR: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "ledger", version, about = "Append-only, hash-chained provenance ledger")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Root directory the store and blob root live under.
    #[arg(long, global = true, default_value = ".ledger")]
    root: PathBuf,

    /// Path to a TOML config file. Defaults to `<root>/ledger.toml` if it
    /// exists; absent entirely is not an error.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the store and blob root.
    Init,

    /// Ingest a raw record of a given kind.
    Append {
        /// Record kind.
        #[arg(long, value_enum)]
        kind: RecordKindArg,
        /// Origin tag. Falls back to the config file's `default_source`
        /// when omitted.
        #[arg(long)]
        source: Option<String>,
        /// Path to the raw payload JSON, or `-` for stdin.
        #[arg(long)]
        payload: String,
        /// Seconds since epoch; omitted or zero assigns wall clock at commit.
        #[arg(long, default_value_t = 0)]
        timestamp: i64,
    },

    /// Validate a typed payload for `kind` and ingest it.
    Collect {
        /// Record kind.
        #[arg(value_enum)]
        kind: RecordKindArg,
        /// Origin tag. Falls back to the config file's `default_source`
        /// when omitted.
        #[arg(long)]
        source: Option<String>,
        /// Path to the typed payload JSON, or `-` for stdin.
        #[arg(long)]
        payload: String,
        /// Seconds since epoch; omitted or zero assigns wall clock at commit.
        #[arg(long, default_value_t = 0)]
        timestamp: i64,
    },

    /// Query records, emitting one JSON object per line.
    Query {
        /// Fetch a single record by id.
        #[arg(long)]
        id: Option<u64>,
        /// Lower bound on timestamp (inclusive); zero is unbounded.
        #[arg(long, default_value_t = 0)]
        since: i64,
        /// Upper bound on timestamp (inclusive); zero is unbounded.
        #[arg(long, default_value_t = 0)]
        until: i64,
        /// Maximum records to return; zero uses the store's default.
        #[arg(long, default_value_t = 0)]
        limit: i64,
    },

    /// Verify the whole chain and print the result as JSON.
    Verify,

    /// Print the reconstruction report for a target time.
    Snapshot {
        /// Target time (seconds since epoch).
        #[arg(long)]
        time: i64,
    },

    /// Print the determinism report and its failure explanation.
    Advisory {
        /// Target time (seconds since epoch).
        #[arg(long)]
        time: i64,
    },

    /// Write an audit bundle for a target time.
    Audit {
        /// Target time (seconds since epoch).
        #[arg(long)]
        time: i64,
        /// File to write the bundle to.
        #[arg(long)]
        out: PathBuf,
    },

    /// Blob store operations.
    Artifact {
        #[command(subcommand)]
        command: ArtifactCommands,
    },

    /// Print the JSON schema for a payload kind.
    Schema {
        /// Record kind to print the payload schema for.
        #[arg(value_enum)]
        kind: RecordKindArg,
    },

    /// List the error taxonomy, optionally filtered by category.
    Errors {
        /// Restrict to one category (e.g. `validation`, `integrity`).
        #[arg(long)]
        category: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ArtifactCommands {
    /// Put a file into the blob store, printing its descriptor.
    Put {
        /// File to store.
        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RecordKindArg {
    Code,
    Config,
    Environment,
    Mutation,
}

impl From<RecordKindArg> for RecordKind {
    fn from(v: RecordKindArg) -> Self {
        match v {
            RecordKindArg::Code => RecordKind::Code,
            RecordKindArg::Config => RecordKind::Config,
            RecordKindArg::Environment => RecordKind::Environment,
            RecordKindArg::Mutation => RecordKind::Mutation,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("ledger=debug")
    } else {
        EnvFilter::new("ledger=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = run(cli).await;

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(EXIT_RUNTIME_ERROR);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli.root, cli.config.as_deref())?;

    match cli.command {
        Commands::Init => cmd_init(&cli.root, config.as_ref()).await,
        Commands::Append { kind, source, payload, timestamp } => {
            let source = resolve_source(source, config.as_ref())?;
            cmd_append(&cli.root, config.as_ref(), kind.into(), &source, &payload, timestamp).await
        }
        Commands::Collect { kind, source, payload, timestamp } => {
            let source = resolve_source(source, config.as_ref())?;
            cmd_append(&cli.root, config.as_ref(), kind.into(), &source, &payload, timestamp).await
        }
        Commands::Query { id, since, until, limit } => {
            cmd_query(&cli.root, config.as_ref(), id, since, until, limit).await
        }
        Commands::Verify => cmd_verify(&cli.root, config.as_ref()).await,
        Commands::Snapshot { time } => cmd_snapshot(&cli.root, config.as_ref(), time).await,
        Commands::Advisory { time } => cmd_advisory(&cli.root, config.as_ref(), time).await,
        Commands::Audit { time, out } => cmd_audit(&cli.root, config.as_ref(), time, &out).await,
        Commands::Artifact { command: ArtifactCommands::Put { file } } => {
            cmd_artifact_put(&cli.root, &file).await
        }
        Commands::Schema { kind } => cmd_schema(kind.into()),
        Commands::Errors { category } => cmd_errors(category.as_deref()),
    }
}

/// Load and validate the config file named on `--config`, or fall back to
/// `<root>/ledger.toml` when present. Absent entirely is not an error
/// (spec's ambient configuration is optional at the CLI boundary); an
/// explicitly-named but unreadable or invalid file is.
fn resolve_config(root: &Path, explicit: Option<&Path>) -> Result<Option<LedgerConfig>> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => {
            let default = root.join("ledger.toml");
            if !default.exists() {
                return Ok(None);
            }
            default
        }
    };

    let config = ledger_config::load_config(&path)
        .with_context(|| format!("load config file '{}'", path.display()))?;
    ledger_config::validate_config(&config).map_err(|errors| {
        anyhow::anyhow!(
            "invalid config file '{}': {}",
            path.display(),
            errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
        )
    })?;
    Ok(Some(config))
}

fn resolve_source(explicit: Option<String>, config: Option<&LedgerConfig>) -> Result<String> {
    if let Some(source) = explicit {
        return Ok(source);
    }
    match config {
        Some(config) => Ok(config.default_source.clone()),
        None => anyhow::bail!("--source is required when no config file supplies default_source"),
    }
}

async fn open_store(root: &Path, config: Option<&LedgerConfig>) -> Result<RecordStore> {
    let pool_size = config.and_then(|c| c.read_pool_size).unwrap_or(0);
    RecordStore::open_with_read_pool_size(db_path(root), pool_size)
        .await
        .context("open record store")
}

async fn cmd_init(root: &Path, config: Option<&LedgerConfig>) -> Result<()> {
    let store = open_store(root, config).await.context("initialize record store")?;
    store.close().await;
    tokio::fs::create_dir_all(blob_root(root))
        .await
        .context("initialize blob root")?;
    println!("initialized ledger at {}", root.display());
    Ok(())
}

async fn cmd_append(
    root: &Path,
    config: Option<&LedgerConfig>,
    kind: RecordKind,
    source: &str,
    payload_path: &str,
    timestamp: i64,
) -> Result<()> {
    let raw = read_payload(payload_path)?;
    let store = open_store(root, config).await?;
    let record = ledger_ingest::ingest(&store, kind, &raw, source, timestamp)
        .await
        .context("ingest record")?;
    println!("{}", serde_json::to_string(&record)?);
    Ok(())
}

fn read_payload(payload_path: &str) -> Result<Vec<u8>> {
    if payload_path == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("read payload from stdin")?;
        Ok(buf)
    } else {
        std::fs::read(payload_path)
            .with_context(|| format!("read payload file '{payload_path}'"))
    }
}

async fn cmd_query(
    root: &Path,
    config: Option<&LedgerConfig>,
    id: Option<u64>,
    since: i64,
    until: i64,
    limit: i64,
) -> Result<()> {
    let store = open_store(root, config).await?;
    if let Some(id) = id {
        let record = store.get_by_id(id).await.context("get record by id")?;
        println!("{}", serde_json::to_string(&record)?);
        return Ok(());
    }
    let records = store.list(since, until, limit).await.context("list records")?;
    for record in records {
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}

async fn cmd_verify(root: &Path, config: Option<&LedgerConfig>) -> Result<()> {
    let store = open_store(root, config).await?;
    let proof = ledger_verify::verify_all(&store).await.context("verify chain")?;
    println!("{}", serde_json::to_string(&proof)?);
    Ok(())
}

async fn cmd_snapshot(root: &Path, config: Option<&LedgerConfig>, time: i64) -> Result<()> {
    let store = open_store(root, config).await?;
    let report = ledger_reconstruct::reconstruct(&store, time)
        .await
        .context("reconstruct snapshot")?;
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

async fn cmd_advisory(root: &Path, config: Option<&LedgerConfig>, time: i64) -> Result<()> {
    let store = open_store(root, config).await?;
    let report = ledger_reconstruct::reconstruct(&store, time)
        .await
        .context("reconstruct snapshot")?;
    println!("{}", serde_json::to_string(&report)?);
    println!("{}", ledger_reconstruct::explain_failure(&report));
    Ok(())
}

async fn cmd_audit(root: &Path, config: Option<&LedgerConfig>, time: i64, out: &Path) -> Result<()> {
    let store = open_store(root, config).await?;
    let bundle = ledger_audit::export(&store, time).await.context("export audit bundle")?;
    let json = ledger_audit::to_pretty_json(&bundle).context("serialize audit bundle")?;
    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.context("create audit output directory")?;
        }
    }
    tokio::fs::write(out, json).await.context("write audit bundle")?;
    println!("wrote audit bundle to {}", out.display());
    Ok(())
}

async fn cmd_artifact_put(root: &Path, file: &Path) -> Result<()> {
    let store = ledger_blobstore::BlobStore::new(blob_root(root));
    let descriptor = store.put(file).await.context("put blob")?;
    println!(
        "{}",
        serde_json::json!({
            "digest": descriptor.digest,
            "stored_path": descriptor.stored_path,
            "size": descriptor.size,
        })
    );
    Ok(())
}

/// Print the JSON schema for a payload kind's typed representation, so a
/// collector can validate its payload shape before calling `collect`
/// without reading this crate's source.
fn cmd_schema(kind: RecordKind) -> Result<()> {
    let value = match kind {
        RecordKind::Code => serde_json::to_value(schemars::schema_for!(CodePayload))?,
        RecordKind::Config => serde_json::to_value(schemars::schema_for!(ConfigPayload))?,
        RecordKind::Environment => serde_json::to_value(schemars::schema_for!(EnvironmentPayload))?,
        RecordKind::Mutation => serde_json::to_value(schemars::schema_for!(MutationPayload))?,
    };
    println!("{}", serde_json::to_string_pretty(&value).context("serialize schema")?);
    Ok(())
}

/// List the error taxonomy (spec §7), one JSON object per code.
fn cmd_errors(category: Option<&str>) -> Result<()> {
    let codes = match category {
        Some(category) => ErrorCatalog::by_category(category),
        None => ErrorCatalog::all(),
    };
    for code in codes {
        println!(
            "{}",
            serde_json::json!({
                "code": code.code(),
                "category": code.category(),
                "description": code.description(),
            })
        );
    }
    Ok(())
}

fn db_path(root: &Path) -> PathBuf {
    root.join("ledger.db")
}

fn blob_root(root: &Path) -> PathBuf {
    root.join("artifacts")
}
