//! Agent Arena CLI
//!
//! The `arena` command drives the arena components from a shell.
//!
//! ## Commands
//!
//! - `validate`: run one validation in a disposable environment
//! - `run`: run a tournament from a JSON fixture with scripted engines
//! - `personalities`: list the agent roster

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::{info, Level};

use arena_core::{
    telemetry, ArenaConfig, ArenaServices, HttpSponsorDocs, ProjectCatalog, ScriptedEngineFactory,
    SponsorCatalog, StaticCatalog, TournamentCoordinator, TournamentSpan, PERSONALITIES,
};
use arena_sandbox::{
    DockerProvider, EnvironmentProvider, ExecutionEnvironmentManager, FileChange, LocalProvider,
    ValidationRequest,
};
use arena_state::{MemoryTournamentStore, SurrealTournamentStore, TournamentStore};

#[derive(Parser)]
#[command(name = "arena")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Concurrent coding-agent tournaments", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Arena configuration file (TOML)
    #[arg(long, global = true, env = "ARENA_CONFIG", default_value = "arena.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a set of files against a repository
    Validate {
        /// Repository to clone
        #[arg(long)]
        repo: String,

        /// Directory whose files are written into the clone
        #[arg(long)]
        files: PathBuf,

        /// Verification command
        #[arg(long, default_value = "npm run build")]
        command: String,

        /// Run inside a container instead of a host directory
        #[arg(long)]
        docker: bool,
    },

    /// Run a tournament from a fixture
    Run {
        /// Fixture file (JSON): hackathon id, catalog and engine scripts
        #[arg(long)]
        fixture: PathBuf,

        /// `memory` or a SurrealDB endpoint (`mem://`, `surrealkv://path`, `ws://host:port`)
        #[arg(long, default_value = "memory")]
        store: String,

        /// Validate inside containers instead of host directories
        #[arg(long)]
        docker: bool,

        /// Fetch sponsor documentation from each sponsor's doc URLs
        #[arg(long)]
        fetch_docs: bool,
    },

    /// List the agent personalities in roster order
    Personalities,
}

/// `arena run` input.
#[derive(Debug, Deserialize)]
struct RunFixture {
    hackathon_id: String,
    #[serde(default)]
    catalog: StaticCatalog,
    #[serde(default)]
    engines: ScriptedEngineFactory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProviderKind {
    Local,
    Docker,
}

impl ProviderKind {
    fn from_flag(docker: bool) -> Self {
        if docker {
            Self::Docker
        } else {
            Self::Local
        }
    }

    fn build(self) -> Arc<dyn EnvironmentProvider> {
        match self {
            Self::Local => Arc::new(LocalProvider::new()),
            Self::Docker => Arc::new(DockerProvider::new()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    telemetry::init_tracing(cli.json, level);

    let config = ArenaConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    match cli.command {
        Commands::Validate {
            repo,
            files,
            command,
            docker,
        } => cmd_validate(&config, &repo, &files, &command, ProviderKind::from_flag(docker)).await,
        Commands::Run {
            fixture,
            store,
            docker,
            fetch_docs,
        } => {
            cmd_run(
                config,
                &fixture,
                &store,
                ProviderKind::from_flag(docker),
                fetch_docs,
            )
            .await
        }
        Commands::Personalities => cmd_personalities(),
    }
}

async fn cmd_validate(
    config: &ArenaConfig,
    repo: &str,
    files_dir: &Path,
    command: &str,
    provider: ProviderKind,
) -> Result<()> {
    let files = collect_files(files_dir)?;
    if files.is_empty() {
        bail!("No files found under {}", files_dir.display());
    }

    let manager = ExecutionEnvironmentManager::new(provider.build(), config.environment.clone());
    let result = manager
        .validate(ValidationRequest {
            source_url: repo.to_string(),
            files,
            command: command.to_string(),
        })
        .await
        .context("Validation could not run")?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn cmd_run(
    config: ArenaConfig,
    fixture: &Path,
    store: &str,
    provider: ProviderKind,
    fetch_docs: bool,
) -> Result<()> {
    let raw = std::fs::read_to_string(fixture)
        .with_context(|| format!("Failed to read fixture {}", fixture.display()))?;
    let fixture: RunFixture = serde_json::from_str(&raw).context("Invalid fixture")?;

    let store = open_store(store).await?;
    let catalog = Arc::new(fixture.catalog);
    let sponsors: Arc<dyn SponsorCatalog> = if fetch_docs {
        Arc::new(HttpSponsorDocs::new(catalog.clone())?)
    } else {
        catalog.clone()
    };
    let projects: Arc<dyn ProjectCatalog> = catalog;

    let environments = Arc::new(ExecutionEnvironmentManager::new(
        provider.build(),
        config.environment.clone(),
    ));
    let coordinator = TournamentCoordinator::new(
        ArenaServices {
            store,
            projects,
            sponsors,
            engines: Arc::new(fixture.engines),
            environments,
        },
        config,
    );

    let launch = coordinator.start_tournament(&fixture.hackathon_id).await?;
    let _span = TournamentSpan::enter(&launch.tournament_id.0);
    info!(hackathon_id = %fixture.hackathon_id, "tournament launched");

    let summary = launch.join.await.context("Tournament task failed")??;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn open_store(store: &str) -> Result<Arc<dyn TournamentStore>> {
    if store == "memory" {
        return Ok(Arc::new(MemoryTournamentStore::new()));
    }
    let surreal = SurrealTournamentStore::connect(store)
        .await
        .with_context(|| format!("Failed to connect to store {store}"))?;
    Ok(Arc::new(surreal))
}

fn cmd_personalities() -> Result<()> {
    for personality in PERSONALITIES.iter() {
        println!(
            "{:>2}  {:<14} {}",
            personality.number, personality.name, personality.strategy
        );
    }
    Ok(())
}

/// Every regular file under `root`, keyed by its `/`-separated relative path.
fn collect_files(root: &Path) -> Result<Vec<FileChange>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir)
            .with_context(|| format!("Failed to read directory {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            let relative = path
                .strip_prefix(root)
                .with_context(|| format!("{} is outside {}", path.display(), root.display()))?;
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            files.push(FileChange {
                path: relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/"),
                content,
            });
        }
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_files_walks_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/lib")).unwrap();
        std::fs::write(dir.path().join("index.js"), "main").unwrap();
        std::fs::write(dir.path().join("src/lib/util.js"), "util").unwrap();

        let files = collect_files(dir.path()).unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["index.js", "src/lib/util.js"]);
        assert_eq!(files[1].content, "util");
    }

    #[test]
    fn fixture_defaults_catalog_and_engines() {
        let fixture: RunFixture = serde_json::from_str(r#"{"hackathon_id": "h1"}"#).unwrap();
        assert_eq!(fixture.hackathon_id, "h1");
        assert!(fixture.catalog.hackathons.is_empty());
        assert!(fixture.engines.default_script.is_empty());
    }

    #[test]
    fn demo_fixture_parses() {
        let raw = include_str!("../../../demos/tournament.json");
        let fixture: RunFixture = serde_json::from_str(raw).unwrap();
        assert_eq!(fixture.catalog.hackathons.len(), 1);
        assert!(!fixture.engines.default_script.is_empty());
    }

    #[test]
    fn cli_parses_run_with_store() {
        let cli = Cli::try_parse_from([
            "arena",
            "--json",
            "run",
            "--fixture",
            "f.json",
            "--store",
            "mem://",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Run { store, docker, .. } => {
                assert_eq!(store, "mem://");
                assert!(!docker);
            }
            _ => panic!("expected run"),
        }
    }
}
