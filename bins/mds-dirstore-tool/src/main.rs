use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use mds_dirstore::mem::{MemCache, MemObjectStore};
use mds_dirstore::{
    DirRecord, DirStore, DirStoreConfig, DirectoryCodec, HashPlacement, InodeAttr, Placement,
};
use mds_logging::LogConfig;
use mds_types::InodeId;

/// Directory store tool
///
/// Runs the directory fetch/commit pipeline against in-memory collaborators.
#[derive(Parser, Debug)]
#[command(name = "mds-dirstore-tool", version, about)]
struct Cli {
    /// Enable debug logging, overriding the configured level.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Commit an unloaded directory whose object holds two entries, then
    /// mutate and commit it again.
    Demo {
        /// Path to a TOML configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the default configuration as TOML and exit.
    DumpDefaultConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct ToolConfig {
    /// Number of storage nodes directory objects are spread over.
    placement_nodes: u32,
    log: LogConfig,
    store: DirStoreConfig,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            placement_nodes: 4,
            log: LogConfig::default(),
            store: DirStoreConfig::default(),
        }
    }
}

impl ToolConfig {
    fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: ToolConfig =
            toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        anyhow::ensure!(config.placement_nodes > 0, "placement_nodes must be positive");
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::DumpDefaultConfig => {
            print!("{}", toml::to_string_pretty(&ToolConfig::default())?);
            Ok(())
        }
        Command::Demo { config } => {
            let mut config = ToolConfig::load(config.as_deref())?;
            if cli.verbose {
                config.log.level = "debug".to_string();
            }
            let _guard = mds_logging::init_logging(&config.log)?;
            run_demo(config).await
        }
    }
}

async fn run_demo(config: ToolConfig) -> anyhow::Result<()> {
    let objects = Arc::new(MemObjectStore::new());
    let cache = Arc::new(MemCache::new());
    let placement = Arc::new(HashPlacement::new(config.placement_nodes));
    let dir = InodeId(100);

    let seed = DirectoryCodec::new(config.store.max_object_size).encode(&[
        DirRecord::inode("a", InodeAttr::file(InodeId(101), 0).into()),
        DirRecord::inode("b", InodeAttr::file(InodeId(102), 0).into()),
    ])?;
    let location = placement.resolve(dir);
    objects.put(location, seed);
    tracing::info!(dir = %dir, %location, "seeded directory object");

    let store = DirStore::new(
        config.store,
        objects.clone(),
        placement,
        cache.clone(),
        cache.clone(),
    )?;

    store.commit_and_wait(dir).await?;
    report(&store, dir);

    store.add_entry(dir, "c", InodeAttr::directory(InodeId(103)).into())?;
    store.remove_entry(dir, "a")?;
    report(&store, dir);

    store.commit_and_wait(dir).await?;
    report(&store, dir);

    println!(
        "reads={} writes={} cached_inodes={} trims={}",
        objects.read_count(),
        objects.write_count(),
        cache.len(),
        cache.trim_count()
    );
    Ok(())
}

fn report(store: &DirStore, dir: InodeId) {
    let Some(info) = store.info(dir) else {
        println!("directory {} not cached", dir);
        return;
    };
    let names: Vec<String> = store
        .entries(dir)
        .unwrap_or_default()
        .into_iter()
        .map(|(name, entry)| format!("{}={}", name, entry.inode_id))
        .collect();
    println!(
        "dir={} version={} dirty={} state={:?} entries=[{}]",
        info.id,
        info.version,
        info.dirty,
        info.completeness,
        names.join(", ")
    );
}
