//! Update command - the full pipeline

use super::{fetch_options, report_fetch, report_mappings};
use crate::cli::args::UpdateArgs;
use crate::community::RefreshOutcome;
use crate::config::{Config, ConfigManager};
use crate::error::NodemapResult;
use crate::pipeline::{Pipeline, UpdateOptions};
use crate::registry::HttpRegistry;
use crate::ui::{self, UiContext};
use chrono::Utc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Execute the update command
pub async fn execute(
    args: UpdateArgs,
    config: &Config,
    ctx: UiContext,
    stop: Arc<AtomicBool>,
) -> NodemapResult<()> {
    ConfigManager::ensure_data_dir(config).await?;
    let registry = Arc::new(HttpRegistry::from_config(&config.registry)?);
    let options = UpdateOptions {
        fetch: Some(fetch_options(&args.fetch, &config.registry)),
        community: config.community.enabled && !args.no_community,
        force_community: args.force_community,
    };

    ui::section(&ctx, "Updating node mappings");
    let pipeline = Pipeline::new(config.clone(), ctx, stop);
    let outcome = pipeline.update(registry, options, Utc::now()).await?;

    report_fetch(&ctx, &outcome.fetch);
    match &outcome.community {
        Some(RefreshOutcome::Reused { age_hours }) => {
            ui::key_value(&ctx, "community data", &format!("reused ({}h old)", age_hours));
        }
        Some(RefreshOutcome::Downloaded { extensions }) => {
            ui::key_value(&ctx, "community data", &format!("downloaded ({} extensions)", extensions));
        }
        None => {}
    }

    let Some(build) = outcome.build else {
        ui::outro_warn(&ctx, "Interrupted; run again to resume from the checkpoint");
        return Ok(());
    };
    report_mappings(&ctx, &build.stats);

    if outcome.fetch.failed_count() > 0 {
        ui::outro_warn(
            &ctx,
            &format!("Mappings written to {} with fetch failures", build.output.display()),
        );
    } else {
        ui::outro_success(&ctx, &format!("Mappings written to {}", build.output.display()));
    }
    Ok(())
}
