//! Build command - derive mappings from the local cache

use super::report_mappings;
use crate::cli::args::BuildArgs;
use crate::config::Config;
use crate::error::NodemapResult;
use crate::pipeline::{BuildInputs, Pipeline};
use crate::ui::{self, UiContext};
use chrono::Utc;
use std::sync::Arc;

/// Execute the build command
pub async fn execute(args: BuildArgs, config: &Config, ctx: UiContext) -> NodemapResult<()> {
    let inputs = resolve_inputs(args, config);

    ui::section(&ctx, "Building node mappings");
    ui::key_value(&ctx, "cache", &inputs.cache.display().to_string());
    if let Some(community) = &inputs.community {
        ui::key_value(&ctx, "community", &community.display().to_string());
    }

    let pipeline = Pipeline::new(config.clone(), ctx, Arc::default());
    let outcome = pipeline.build(&inputs, Utc::now()).await?;

    report_mappings(&ctx, &outcome.stats);
    ui::outro_success(&ctx, &format!("Mappings written to {}", outcome.output.display()));
    Ok(())
}

fn resolve_inputs(args: BuildArgs, config: &Config) -> BuildInputs {
    let defaults = BuildInputs::from_config(config);
    let community = if args.no_augment {
        None
    } else {
        match args.community {
            Some(path) => Some(path),
            // The default snapshot is optional
            None => defaults.community.filter(|p| p.exists()),
        }
    };

    BuildInputs {
        cache: args.cache.unwrap_or(defaults.cache),
        community,
        output: args.output.unwrap_or(defaults.output),
        schema: args.schema.or(defaults.schema),
    }
}
