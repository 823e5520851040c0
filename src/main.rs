use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use brawl_stats::api::{self, state::AppState};
use brawl_stats::config::{AppConfig, StatsConfig};
use brawl_stats::models::PartitionBy;
use brawl_stats::pipeline::{self, RunSummary, StatKind};

#[derive(Parser)]
#[command(name = "brawl-stats")]
#[command(about = "Shrunk win-rate statistics for ranked matches")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "./config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error); defaults to the config value
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Window and estimator overrides shared by every aggregation command.
#[derive(Args, Debug, Clone, Default)]
struct WindowArgs {
    /// Confidence level of the lower bound, strictly between 0 and 1
    #[arg(long)]
    confidence: Option<f64>,

    /// Days of match groups to include
    #[arg(long)]
    retention_days: Option<u32>,

    /// Lowest rank id to include
    #[arg(long)]
    min_rank: Option<u32>,

    /// Partitioning: map or map-and-rank
    #[arg(long)]
    partition_by: Option<PartitionBy>,
}

impl WindowArgs {
    fn apply(&self, stats: &mut StatsConfig) {
        if let Some(confidence) = self.confidence {
            stats.confidence = confidence;
        }
        if let Some(days) = self.retention_days {
            stats.retention_days = days;
        }
        if let Some(rank) = self.min_rank {
            stats.min_rank = rank;
        }
        if let Some(by) = self.partition_by {
            stats.partition_by = by;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Per-character win rates
    WinRates {
        #[command(flatten)]
        window: WindowArgs,

        /// Output file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Drop characters with fewer games
        #[arg(long)]
        min_games: Option<u64>,
    },

    /// Per-character star and usage rates
    StarRates {
        #[command(flatten)]
        window: WindowArgs,

        /// Output file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Matchup and synergy rates for character pairs
    PairStats {
        #[command(flatten)]
        window: WindowArgs,

        /// Output directory
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Drop pairs with fewer games
        #[arg(long)]
        min_games: Option<u64>,
    },

    /// Win rates for three-character teams
    TrioStats {
        #[command(flatten)]
        window: WindowArgs,

        /// Output directory
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Drop teams with fewer games
        #[arg(long)]
        min_games: Option<u64>,
    },

    /// Win rates for team-vs-team pairings
    ThreeVsThree {
        #[command(flatten)]
        window: WindowArgs,

        /// Output directory
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Drop pairings with fewer combined games (default and minimum 4)
        #[arg(long)]
        min_games: Option<u64>,
    },

    /// Total match groups per rank
    RankMatchCounts {
        #[command(flatten)]
        window: WindowArgs,

        /// Output file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Compute every statistic and publish them together
    ExportAll {
        #[command(flatten)]
        window: WindowArgs,

        /// Output root directory
        #[arg(long)]
        output_root: Option<PathBuf>,
    },

    /// Serve published statistics over HTTP
    Serve {
        /// Bind address
        #[arg(long)]
        host: Option<String>,

        /// Port number
        #[arg(long)]
        port: Option<u16>,

        /// Output root directory
        #[arg(long)]
        output_root: Option<PathBuf>,
    },
}

/// Split an artifact path into its output root and plain name.
fn split_output(path: &Path) -> Result<(PathBuf, String)> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("Output path has no file name: {}", path.display()))?;
    let root = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((root, name.to_string()))
}

fn print_summary(summary: &RunSummary) {
    println!("\n=== Export Results ===");
    let kinds: Vec<&str> = summary.kinds.iter().map(StatKind::as_str).collect();
    println!("Statistics:     {}", kinds.join(", "));
    println!("Match groups:   {}", summary.dataset.match_groups);
    println!("Matches:        {}", summary.dataset.matches);
    println!("Characters:     {}", summary.dataset.characters);
    println!("Files written:  {}", summary.files_written);
    if summary.quality.anomalies() > 0 {
        println!(
            "Data issues:    {} unresolved, {} overlapping, {} missing ids, {} one-sided, {} duplicates",
            summary.quality.unresolved_matches,
            summary.quality.overlapping_teams,
            summary.quality.missing_character_ids,
            summary.quality.one_sided_matches,
            summary.quality.duplicate_matches
        );
    }
    for artifact in &summary.artifacts {
        println!("  {}", artifact.display());
    }
    println!("Elapsed:        {:.2?}", summary.elapsed);
}

async fn export(config: AppConfig, window: &WindowArgs, kinds: &[StatKind]) -> Result<()> {
    let mut config = config;
    window.apply(&mut config.stats);
    config.validate()?;

    let summary = pipeline::run(&config, kinds, chrono::Utc::now()).await?;
    print_summary(&summary);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, config_found) = AppConfig::load_or_default(Path::new(&cli.config))
        .with_context(|| format!("Failed to load config from {}", cli.config))?;
    config.apply_env_overrides(|key| std::env::var(key).ok())?;

    // Initialize tracing
    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting brawl-stats v{}", env!("CARGO_PKG_VERSION"));
    if !config_found {
        tracing::warn!("Config file {} not found, using defaults", cli.config);
    }

    match cli.command {
        Commands::WinRates {
            window,
            output,
            min_games,
        } => {
            if let Some(path) = output {
                let (root, name) = split_output(&path)?;
                config.output.root = root;
                config.output.win_rate_filename = name;
            }
            if let Some(n) = min_games {
                config.stats.win_rate_min_games = n;
            }
            export(config, &window, &[StatKind::WinRates]).await?;
        }
        Commands::StarRates { window, output } => {
            if let Some(path) = output {
                let (root, name) = split_output(&path)?;
                config.output.root = root;
                config.output.star_rate_filename = name;
            }
            export(config, &window, &[StatKind::StarRates]).await?;
        }
        Commands::PairStats {
            window,
            output_dir,
            min_games,
        } => {
            if let Some(path) = output_dir {
                let (root, name) = split_output(&path)?;
                config.output.root = root;
                config.output.pair_dir_name = name;
            }
            if let Some(n) = min_games {
                config.stats.pair_min_games = n;
            }
            export(config, &window, &[StatKind::PairStats]).await?;
        }
        Commands::TrioStats {
            window,
            output_dir,
            min_games,
        } => {
            if let Some(path) = output_dir {
                let (root, name) = split_output(&path)?;
                config.output.root = root;
                config.output.trio_dir_name = name;
            }
            if let Some(n) = min_games {
                config.stats.trio_min_games = n;
            }
            export(config, &window, &[StatKind::TrioStats]).await?;
        }
        Commands::ThreeVsThree {
            window,
            output_dir,
            min_games,
        } => {
            if let Some(path) = output_dir {
                let (root, name) = split_output(&path)?;
                config.output.root = root;
                config.output.three_vs_three_dir_name = name;
            }
            if let Some(n) = min_games {
                config.stats.three_vs_three_min_games = n;
            }
            export(config, &window, &[StatKind::ThreeVsThree]).await?;
        }
        Commands::RankMatchCounts { window, output } => {
            if let Some(path) = output {
                let (root, name) = split_output(&path)?;
                config.output.root = root;
                config.output.rank_match_count_filename = name;
            }
            export(config, &window, &[StatKind::RankMatchCounts]).await?;
        }
        Commands::ExportAll {
            window,
            output_root,
        } => {
            if let Some(root) = output_root {
                config.output.root = root;
            }
            export(config, &window, &StatKind::ALL).await?;
        }
        Commands::Serve {
            host,
            port,
            output_root,
        } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(root) = output_root {
                config.output.root = root;
            }
            config.validate()?;

            let state = AppState::new(config.output.root.clone(), config.output.layout());
            let app = api::build_router(state).layer(api::cors_layer(&config.server.cors_origin)?);
            let addr = format!("{}:{}", config.server.host, config.server.port);
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!(
                "Serving {} on http://{}",
                config.output.root.display(),
                addr
            );
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_output() {
        assert_eq!(
            split_output(Path::new("out/win_rates.json")).unwrap(),
            (PathBuf::from("out"), "win_rates.json".to_string())
        );
        assert_eq!(
            split_output(Path::new("trio_stats")).unwrap(),
            (PathBuf::from("."), "trio_stats".to_string())
        );
        assert!(split_output(Path::new("/")).is_err());
    }

    #[test]
    fn test_cli_parses_window_flags() {
        let cli = Cli::try_parse_from([
            "brawl-stats",
            "three-vs-three",
            "--confidence",
            "0.9",
            "--partition-by",
            "map-and-rank",
            "--min-games",
            "6",
        ])
        .unwrap();

        match cli.command {
            Commands::ThreeVsThree {
                window, min_games, ..
            } => {
                let mut stats = StatsConfig::default();
                window.apply(&mut stats);
                assert_eq!(stats.confidence, 0.9);
                assert_eq!(stats.partition_by, PartitionBy::MapAndRank);
                assert_eq!(min_games, Some(6));
            }
            _ => panic!("expected three-vs-three"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_partitioning() {
        assert!(Cli::try_parse_from(["brawl-stats", "win-rates", "--partition-by", "mode"]).is_err());
    }
}
