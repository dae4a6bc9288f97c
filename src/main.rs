//! nodemap - node to package index builder
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use nodemap::cli::{Cli, Commands};
use nodemap::config::{Config, ConfigManager};
use nodemap::error::NodemapResult;
use nodemap::ui::UiContext;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> NodemapResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let mut config = config_manager.load().await?;
    if let Some(ref dir) = cli.data_dir {
        config.paths.data_dir = Some(dir.clone());
    }

    init_logging(cli.verbose, &config);
    debug!("Using config {}", config_manager.path().display());

    let ctx = UiContext::detect().with_quiet(cli.quiet);
    let stop = stop_on_ctrl_c();

    match cli.command {
        Commands::Update(args) => nodemap::cli::commands::update(args, &config, ctx, stop).await,
        Commands::Fetch(args) => nodemap::cli::commands::fetch(args, &config, ctx, stop).await,
        Commands::Community(args) => nodemap::cli::commands::community(args, &config, ctx).await,
        Commands::Build(args) => nodemap::cli::commands::build(args, &config, ctx).await,
        Commands::Validate(args) => nodemap::cli::commands::validate(args, &config, ctx).await,
        Commands::Config(args) => {
            nodemap::cli::commands::config(args, &config, &config_manager, ctx).await
        }
    }
}

/// 0 = warn, 1 = info, 2+ = debug; `RUST_LOG` wins when set
fn init_logging(verbose: u8, config: &Config) {
    let default = match verbose {
        0 => "nodemap=warn",
        1 => "nodemap=info",
        _ => "nodemap=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}

/// Flag set on the first Ctrl-C; workers finish in-flight requests and
/// checkpoint before returning
fn stop_on_ctrl_c() -> Arc<AtomicBool> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after in-flight requests");
            eprintln!("{} stopping after in-flight requests...", style("Interrupted:").yellow());
            flag.store(true, Ordering::SeqCst);
        }
    });
    stop
}
