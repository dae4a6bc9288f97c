//! Community command - refresh the extension map

use crate::cli::args::CommunityArgs;
use crate::community::RefreshOutcome;
use crate::config::{Config, ConfigManager};
use crate::error::NodemapResult;
use crate::pipeline::Pipeline;
use crate::ui::{self, TaskSpinner, UiContext};
use chrono::Utc;
use std::sync::Arc;

/// Execute the community command
pub async fn execute(args: CommunityArgs, config: &Config, ctx: UiContext) -> NodemapResult<()> {
    ConfigManager::ensure_data_dir(config).await?;
    let pipeline = Pipeline::new(config.clone(), ctx, Arc::default());

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start("Refreshing community data...");
    match pipeline.refresh_community(args.force, Utc::now()).await {
        Ok(RefreshOutcome::Reused { age_hours }) => {
            spinner.stop(&format!("Local copy is {}h old, kept", age_hours));
            ui::step_warn_hint(&ctx, "Download skipped", "Use --force to download anyway");
        }
        Ok(RefreshOutcome::Downloaded { extensions }) => {
            spinner.stop(&format!("Downloaded {} extensions", extensions));
        }
        Err(e) => {
            spinner.stop_error("Community data refresh failed");
            return Err(e);
        }
    }

    ui::key_value(&ctx, "path", &config.paths.community_path().display().to_string());
    Ok(())
}
