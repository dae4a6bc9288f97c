//! Fetch command - update the registry cache

use super::{fetch_options, report_fetch};
use crate::cli::args::FetchArgs;
use crate::config::{Config, ConfigManager};
use crate::error::NodemapResult;
use crate::pipeline::Pipeline;
use crate::registry::HttpRegistry;
use crate::ui::{self, UiContext};
use chrono::Utc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Execute the fetch command
pub async fn execute(
    args: FetchArgs,
    config: &Config,
    ctx: UiContext,
    stop: Arc<AtomicBool>,
) -> NodemapResult<()> {
    ConfigManager::ensure_data_dir(config).await?;
    let registry = Arc::new(HttpRegistry::from_config(&config.registry)?);
    let options = fetch_options(&args, &config.registry);

    ui::section(&ctx, "Fetching registry");
    ui::key_value(&ctx, "registry", &config.registry.base_url);
    ui::key_value(&ctx, "cache", &config.paths.cache_path().display().to_string());

    let pipeline = Pipeline::new(config.clone(), ctx, stop);
    let report = pipeline.fetch(registry, options, Utc::now()).await?;

    report_fetch(&ctx, &report);
    if report.cancelled() {
        ui::outro_warn(&ctx, "Interrupted; run again to resume from the checkpoint");
    } else if report.failed_count() > 0 {
        ui::outro_warn(&ctx, "Cache updated with failures; failed items are retried next run");
    } else {
        ui::outro_success(&ctx, "Cache up to date");
    }
    Ok(())
}
