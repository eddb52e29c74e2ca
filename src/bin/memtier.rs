use clap::{Parser, Subcommand};
use memtier::cli::{self as prog_cli, OutputMode};
use memtier::utils::num::secs_f64_to_limit;
use memtier::{CacheConfig, CacheError};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "memtier", version, about = "Run synthetic workloads against a memtier cache", long_about = None)]
struct Cli {
    /// Path to a config file (TOML). Defaults to the platform config dir's memtier.toml if present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, help = "Maximum number of entries (overrides config and env)")]
    count_limit: Option<usize>,
    #[arg(long, help = "Maximum aggregate cost (overrides config and env)")]
    cost_limit: Option<u64>,
    #[arg(long, help = "Maximum entry age in seconds; <= 0 trims everything")]
    age_limit_secs: Option<f64>,
    #[arg(long, help = "Auto-trim period in seconds; 0 disables")]
    auto_trim_secs: Option<f64>,
    /// Release evicted values on the calling thread.
    #[arg(long)]
    sync_release: bool,
    /// Emit machine-readable JSON.
    #[arg(long)]
    json: bool,
    #[arg(long, help = "Write logs under this directory (see also MEMTIER_LOG_DIR)")]
    log_dir: Option<PathBuf>,
    #[arg(long, help = "error|warn|info|debug|trace")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Sequentially fill a cache and report timing and metrics")]
    Bench {
        #[arg(long, default_value_t = 100_000)]
        count: usize,
        #[arg(long, default_value_t = 64)]
        value_len: usize,
    },
    #[command(about = "Concurrent upsert/get/remove on overlapping keys, then validate")]
    Stress {
        #[arg(long, default_value_t = 8)]
        threads: usize,
        #[arg(long, default_value_t = 10_000)]
        ops: usize,
        #[arg(long, default_value_t = 256)]
        keys: usize,
    },
    #[command(about = "Print the effective configuration")]
    Config,
}

/// Precedence: flags > env > config file > defaults.
fn effective_config(cli: &Cli) -> Result<CacheConfig, CacheError> {
    let mut cfg = match &cli.config {
        Some(path) => CacheConfig::load(path)?,
        None => match CacheConfig::default_path().filter(|p| p.exists()) {
            Some(path) => CacheConfig::load(path)?,
            None => CacheConfig::named("memtier-cli"),
        },
    };
    cfg.apply_env()?;
    if let Some(v) = cli.count_limit {
        cfg.count_limit = v;
    }
    if let Some(v) = cli.cost_limit {
        cfg.cost_limit = v;
    }
    if let Some(v) = cli.age_limit_secs {
        cfg.age_limit = secs_f64_to_limit(v);
    }
    if let Some(v) = cli.auto_trim_secs {
        let interval = secs_f64_to_limit(v);
        cfg.auto_trim_interval = if interval.is_zero() { std::time::Duration::MAX } else { interval };
    }
    if cli.sync_release {
        cfg.release_asynchronously = false;
    }
    Ok(cfg)
}

fn main() {
    let cli = Cli::parse();
    let logging = if cli.log_dir.is_some() || cli.log_level.is_some() {
        memtier::logger::configure_logging(cli.log_dir.as_deref(), cli.log_level.as_deref(), None)
    } else if std::env::var_os("MEMTIER_LOG_DIR").is_some() {
        memtier::logger::configure_from_env()
    } else {
        Ok(())
    };
    if let Err(e) = logging {
        eprintln!("warning: logging disabled: {e}");
    }

    let cfg = match effective_config(&cli) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(2);
        }
    };
    let cmd = match cli.command {
        Commands::Bench { count, value_len } => prog_cli::Command::Bench { count, value_len },
        Commands::Stress { threads, ops, keys } => prog_cli::Command::Stress { threads, ops, keys },
        Commands::Config => prog_cli::Command::Config,
    };
    let mode = if cli.json { OutputMode::Json } else { OutputMode::Human };
    let stdout = std::io::stdout();
    if let Err(e) = prog_cli::run_with_format(cfg, cmd, mode, &mut stdout.lock()) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
