//! `aifs`: operator tool for a local AIFS storage root.
//!
//! Reads `aifs.toml` (or the path given with `--config`) plus `AIFS__*`
//! environment overrides, opens the engine, runs one command, and prints the
//! result as JSON on stdout. Logs go to stderr.
//!
//! # Usage
//!
//! ```text
//! aifs keygen
//! aifs put notes.txt --kind artifact --meta lang=en
//! aifs snapshot create release <asset-id> <asset-id>
//! aifs snapshot verify <snapshot-id>
//! ```

use std::{
  io::{self, Read as _, Write as _},
  path::{Path, PathBuf},
};

use aifs_core::{
  AssetId, AssetKind, LineageDirection, Metadata, NewAsset, ParentLink, RelationshipKind,
  Transform, store::AssetQuery,
};
use aifs_engine::{AssetManager, EngineConfig, crypto, vector::FilterFields};
use aifs_store_sqlite::SqliteStore;
use anyhow::Context as _;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "aifs", author, version, about = "AIFS storage core operator tool")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "aifs.toml")]
  config: PathBuf,

  /// Storage root; overrides `storage_root` from configuration.
  #[arg(long, value_name = "DIR")]
  root: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Create the Ed25519 signing key. Refuses to overwrite an existing one.
  Keygen,

  #[command(flatten)]
  Engine(EngineCommand),
}

/// Commands that run against an opened engine.
#[derive(Subcommand)]
enum EngineCommand {
  /// Store a file (or stdin with `-`) as an asset.
  Put {
    file:      PathBuf,
    #[arg(long, default_value = "blob")]
    kind:      String,
    /// JSON array of floats.
    #[arg(long)]
    embedding: Option<String>,
    /// `key=value`; values that parse as JSON are stored as JSON.
    #[arg(long = "meta", value_parser = parse_pair)]
    metadata:  Vec<(String, String)>,
    /// `asset-id[:transform-name[:transform-digest]]`
    #[arg(long = "parent", value_parser = parse_parent)]
    parents:   Vec<ParentLink>,
  },

  /// Print an asset record, or write its content with `--out`.
  Get {
    id:  AssetId,
    /// Write content here (`-` for stdout) instead of printing the record.
    #[arg(long)]
    out: Option<PathBuf>,
  },

  /// List assets, newest first.
  List {
    #[arg(long)]
    kind:   Option<String>,
    #[arg(long)]
    limit:  Option<usize>,
    #[arg(long)]
    offset: Option<usize>,
  },

  /// Nearest-neighbour search.
  Search {
    /// JSON array of floats.
    vector: String,
    #[arg(short, default_value_t = 10)]
    k:      usize,
    /// `key=value` that every hit must carry.
    #[arg(long = "filter", value_parser = parse_pair)]
    filter: Vec<(String, String)>,
  },

  /// Delete an asset.
  Delete { id: AssetId },

  /// Record that `child` was derived from `parent`.
  Link {
    parent:    AssetId,
    child:     AssetId,
    #[arg(long)]
    transform: String,
    #[arg(long, default_value = "")]
    digest:    String,
    #[arg(long, default_value = "derived")]
    kind:      RelationshipKind,
  },

  /// Walk the provenance graph from an asset.
  Lineage {
    id:        AssetId,
    #[arg(long, default_value = "ancestors")]
    direction: LineageDirection,
    #[arg(long, default_value_t = 3)]
    depth:     usize,
  },

  #[command(subcommand)]
  Snapshot(SnapshotCommand),

  /// Engine and index statistics.
  Stats,
}

#[derive(Subcommand)]
enum SnapshotCommand {
  /// Sign a Merkle root over the given assets.
  Create {
    namespace:        String,
    #[arg(required = true)]
    ids:              Vec<AssetId>,
    /// Stop protecting the assets from hard deletion after this many hours.
    #[arg(long)]
    expires_in_hours: Option<i64>,
  },
  /// Check a snapshot's signature and root.
  Verify {
    id:         Uuid,
    /// Hex public key; defaults to this store's signing key.
    #[arg(long)]
    public_key: Option<String>,
  },
  /// Inclusion proof for one asset.
  Proof { id: Uuid, asset: AssetId },
  List {
    #[arg(long)]
    namespace: Option<String>,
  },
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing; stdout is reserved for command output.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(io::stderr)
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let mut config =
    EngineConfig::load(Some(&cli.config)).context("failed to load configuration")?;
  if let Some(root) = cli.root {
    config.storage_root = root;
  }
  config.storage_root = expand_tilde(&config.storage_root);
  if let Some(key_path) = &config.signing.key_path {
    config.signing.key_path = Some(expand_tilde(key_path));
  }

  let command = match cli.command {
    Command::Keygen => return keygen(&config),
    Command::Engine(command) => command,
  };

  let root = config.storage_root.clone();
  let manager = AssetManager::open(config)
    .await
    .with_context(|| format!("failed to open storage root {}", root.display()))?;
  run(&manager, command).await
}

fn keygen(config: &EngineConfig) -> anyhow::Result<()> {
  let path = config.signing_key_path();
  let public = crypto::generate_signing_key(&path)
    .with_context(|| format!("failed to create signing key at {}", path.display()))?;
  print_json(&serde_json::json!({
    "path": path,
    "public_key": hex::encode(public.to_bytes()),
  }))
}

async fn run(manager: &AssetManager<SqliteStore>, command: EngineCommand) -> anyhow::Result<()> {
  match command {
    EngineCommand::Put { file, kind, embedding, metadata, parents } => {
      let data = read_input(&file).await?;
      let mut new = NewAsset::new(data, AssetKind::from(kind));
      if let Some(raw) = embedding {
        new = new.with_embedding(parse_vector(&raw)?);
      }
      new.metadata = metadata_from_pairs(metadata);
      new.parents = parents;
      let asset = manager.put_asset(new).await?;
      manager.flush().await?;
      print_json(&asset)
    }

    EngineCommand::Get { id, out: None } => print_json(&manager.get_asset_record(&id).await?),
    EngineCommand::Get { id, out: Some(out) } => {
      let (_, data) = manager.get_asset(&id).await?;
      if out.as_os_str() == "-" {
        io::stdout().write_all(&data)?;
      } else {
        tokio::fs::write(&out, &data)
          .await
          .with_context(|| format!("failed to write {}", out.display()))?;
      }
      Ok(())
    }

    EngineCommand::List { kind, limit, offset } => {
      let query = AssetQuery { kind: kind.map(AssetKind::from), limit, offset };
      print_json(&manager.list_assets(query).await?)
    }

    EngineCommand::Search { vector, k, filter } => {
      let query = parse_vector(&vector)?;
      let filter: FilterFields = filter.into_iter().collect();
      let filter = (!filter.is_empty()).then_some(&filter);
      print_json(&manager.vector_search(&query, k, filter).await?)
    }

    EngineCommand::Delete { id } => {
      let outcome = manager.delete_asset(&id).await?;
      manager.flush().await?;
      print_json(&serde_json::json!({ "asset_id": id, "outcome": outcome }))
    }

    EngineCommand::Link { parent, child, transform, digest, kind } => {
      let edge = manager
        .add_relationship_of_kind(&parent, &child, kind, Transform::new(transform, digest))
        .await?;
      print_json(&edge)
    }

    EngineCommand::Lineage { id, direction, depth } => {
      print_json(&manager.get_lineage(&id, direction, depth).await?)
    }

    EngineCommand::Snapshot(SnapshotCommand::Create { namespace, ids, expires_in_hours }) => {
      let expires_at =
        expires_in_hours.map(|h| chrono::Utc::now() + chrono::Duration::hours(h));
      print_json(&manager.create_snapshot(&namespace, &ids, None, expires_at).await?)
    }

    EngineCommand::Snapshot(SnapshotCommand::Verify { id, public_key }) => {
      let key = match public_key {
        Some(hex_key) => crypto::parse_public_key(&hex_key)?,
        None => manager.public_key(),
      };
      let verified = manager.verify_snapshot(id, &key).await?;
      print_json(&serde_json::json!({ "snapshot_id": id, "verified": verified }))
    }

    EngineCommand::Snapshot(SnapshotCommand::Proof { id, asset }) => {
      print_json(&manager.snapshot_proof(id, &asset).await?)
    }

    EngineCommand::Snapshot(SnapshotCommand::List { namespace }) => {
      print_json(&manager.list_snapshots(namespace.as_deref()).await?)
    }

    EngineCommand::Stats => print_json(&manager.stats().await?),
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
  let mut stdout = io::stdout().lock();
  serde_json::to_writer_pretty(&mut stdout, value)?;
  writeln!(stdout)?;
  Ok(())
}

async fn read_input(path: &Path) -> anyhow::Result<Bytes> {
  if path.as_os_str() == "-" {
    let mut buf = Vec::new();
    io::stdin().read_to_end(&mut buf).context("failed to read stdin")?;
    return Ok(buf.into());
  }
  let data = tokio::fs::read(path)
    .await
    .with_context(|| format!("failed to read {}", path.display()))?;
  Ok(data.into())
}

fn parse_vector(raw: &str) -> anyhow::Result<Vec<f32>> {
  serde_json::from_str(raw).context("vector must be a JSON array of numbers")
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
  match raw.split_once('=') {
    Some((k, v)) if !k.is_empty() => Ok((k.to_owned(), v.to_owned())),
    _ => Err(format!("expected key=value, got {raw:?}")),
  }
}

fn parse_parent(raw: &str) -> Result<ParentLink, String> {
  let mut parts = raw.splitn(3, ':');
  let id = parts.next().unwrap_or_default();
  let id = AssetId::parse(id).map_err(|e| e.to_string())?;
  let name = parts.next().unwrap_or_default();
  let digest = parts.next().unwrap_or_default();
  Ok(ParentLink::new(id, Transform::new(name, digest)))
}

fn metadata_from_pairs(pairs: Vec<(String, String)>) -> Metadata {
  pairs
    .into_iter()
    .map(|(k, v)| {
      let value = serde_json::from_str(&v).unwrap_or(serde_json::Value::String(v));
      (k, value)
    })
    .collect()
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_parent_links() {
    let id = "a".repeat(64);
    let link = parse_parent(&format!("{id}:resize:sha256:00")).unwrap();
    assert_eq!(link.asset_id.as_str(), id);
    assert_eq!(link.transform, Transform::new("resize", "sha256:00"));
    assert!(parse_parent("nope").is_err());
  }

  #[test]
  fn metadata_values_prefer_json() {
    let pairs = vec![("pages".into(), "3".into()), ("lang".into(), "en".into())];
    let m = metadata_from_pairs(pairs);
    assert_eq!(m["pages"], serde_json::json!(3));
    assert_eq!(m["lang"], serde_json::json!("en"));
  }

  #[test]
  fn cli_parses_subcommands() {
    let id = "b".repeat(64);
    let cli = Cli::try_parse_from(["aifs", "--root", "/tmp/x", "lineage", &id]).unwrap();
    assert!(matches!(cli.command, Command::Engine(EngineCommand::Lineage { depth: 3, .. })));
    assert!(matches!(Cli::try_parse_from(["aifs", "keygen"]).unwrap().command, Command::Keygen));
    assert!(Cli::try_parse_from(["aifs", "snapshot", "create", "ns"]).is_err());
  }

  #[test]
  fn absolute_paths_are_untouched() {
    assert_eq!(expand_tilde(Path::new("/abs/data")), PathBuf::from("/abs/data"));
  }
}
