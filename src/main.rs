use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use hermitcrab::config::{self, ServerConfig, StoreConfig};
use hermitcrab::logging::{self, LogOptions};
use hermitcrab::version::Series;
use hermitcrab::{manifest, server, version};

#[derive(Parser)]
#[command(name = "hermitcrab")]
#[command(version, about = "Release artifact catalog and on-demand archive cache")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inspect and maintain the version manifest
    Versions {
        #[command(subcommand)]
        action: VersionsAction,
    },
    /// Serve versions over HTTP, fetching archives on first request
    Serve(ServeArgs),
}

#[derive(Subcommand)]
enum VersionsAction {
    /// Add a new version to a manifest
    Add {
        /// Path to the previous manifest
        #[arg(short = 'p', long = "prev-manifest")]
        prev_manifest: PathBuf,
        /// Path or URL of the new version's archive
        #[arg(short = 'v', long = "version-path")]
        version_path: String,
        /// Path to write the updated manifest to
        #[arg(short = 'o', long = "output-path")]
        output_path: PathBuf,
    },
    /// Check that an artifact identifier carries a valid version
    Validate {
        /// Path or URL of the version's archive
        #[arg(short = 'p', long = "version-path")]
        version_path: String,
    },
    /// Print the newest version in a manifest
    Latest {
        #[arg(long)]
        manifest: PathBuf,
        /// Restrict to a release series such as 24 or 24.1
        #[arg(long)]
        series: Option<Series>,
    },
}

#[derive(Args)]
struct ServeArgs {
    /// JSON configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    listen: Option<String>,
    #[arg(long)]
    cache_dir: Option<PathBuf>,
    /// Bucket URL publishing manifest.json and the archives
    #[arg(long, conflicts_with = "archive_dir")]
    base_url: Option<String>,
    /// Local directory of archives
    #[arg(long)]
    archive_dir: Option<PathBuf>,
    /// Release series `latest` is restricted to
    #[arg(long)]
    series: Option<String>,
    #[arg(long)]
    fetch_timeout_ms: Option<u64>,
    /// Write the log file as JSON lines
    #[arg(long)]
    log_json: bool,
}

impl ServeArgs {
    fn into_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)
                .with_context(|| format!("Failed to read config {:?}", path))?,
            None => ServerConfig::default(),
        };

        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(cache_dir) = self.cache_dir {
            config.cache_dir = Some(cache_dir);
        }
        if let Some(base_url) = self.base_url {
            config.store = StoreConfig::Http { base_url };
        }
        if let Some(path) = self.archive_dir {
            config.store = StoreConfig::Directory { path };
        }
        if let Some(series) = self.series {
            config.series = Some(series);
        }
        if let Some(timeout) = self.fetch_timeout_ms {
            config.fetch_timeout_ms = timeout;
        }

        config.series().context("Invalid --series")?;
        Ok(config)
    }
}

fn run_versions(action: VersionsAction) -> anyhow::Result<()> {
    match action {
        VersionsAction::Add {
            prev_manifest,
            version_path,
            output_path,
        } => {
            let manifest =
                manifest::merge_new_version(&prev_manifest, &output_path, &version_path)
                    .with_context(|| format!("Failed to add {} to manifest", version_path))?;
            println!(
                "Wrote {} versions to {}",
                manifest.versions.len(),
                output_path.display()
            );
        }
        VersionsAction::Validate { version_path } => {
            println!("{}", validated(&version_path)?);
        }
        VersionsAction::Latest { manifest, series } => {
            let catalog = manifest::load(&manifest)?;
            let latest = catalog
                .latest_in(series)
                .with_context(|| format!("No versions in {:?}", manifest))?;
            println!("{}", latest);
        }
    }

    Ok(())
}

fn validated(version_path: &str) -> anyhow::Result<version::Version> {
    version::parse(version_path).with_context(|| format!("Invalid version in {}", version_path))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let json = matches!(&cli.command, Command::Serve(args) if args.log_json);
    let _guard = logging::init_logging(&config::log_path(), LogOptions { stderr: true, json });

    match cli.command {
        Command::Versions { action } => run_versions(action),
        Command::Serve(args) => {
            let config = args.into_config()?;
            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?
                .block_on(server::run_server(config))
        }
    }
}
