//! CLI command implementations

pub mod build;
pub mod community;
pub mod config;
pub mod fetch;
pub mod update;
pub mod validate;

pub use build::execute as build;
pub use community::execute as community;
pub use config::execute as config;
pub use fetch::execute as fetch;
pub use update::execute as update;
pub use validate::execute as validate;

use crate::cli::args::FetchArgs;
use crate::config::RegistryConfig;
use crate::fetch::{FetchMode, FetchOptions, FetchReport};
use crate::mapping::MappingStats;
use crate::ui::{self, UiContext};

/// Registry fetch settings for this run: config values overridden by flags
pub(crate) fn fetch_options(args: &FetchArgs, registry: &RegistryConfig) -> FetchOptions {
    let mut options = FetchOptions::from_config(registry);
    if args.full {
        options.mode = FetchMode::Full;
    }
    options.refresh_metadata = args.refresh_metadata;
    if let Some(concurrency) = args.concurrency {
        options.concurrency = concurrency as usize;
    }
    if args.pages.is_some() {
        options.max_pages = args.pages;
    }
    options
}

pub(crate) fn report_fetch(ctx: &UiContext, report: &FetchReport) {
    for phase in report.phases() {
        let mut line = format!("{} ok", phase.succeeded());
        if !phase.failed.is_empty() {
            line.push_str(&format!(", {} failed", phase.failed.len()));
        }
        if phase.skipped_resumed > 0 {
            line.push_str(&format!(", {} resumed past", phase.skipped_resumed));
        }
        ui::key_value_status(ctx, &phase.phase.to_string(), &line, phase.failed.is_empty());
    }

    // Show a handful; the rest are in the logs
    for failure in report.failures().take(5) {
        ui::step_warn(ctx, &failure.to_string());
    }
    if report.failed_count() > 5 {
        ui::step_warn(ctx, &format!("... and {} more", report.failed_count() - 5));
    }
}

pub(crate) fn report_mappings(ctx: &UiContext, stats: &MappingStats) {
    ui::key_value(ctx, "packages", &stats.packages.to_string());
    ui::key_value(ctx, "signatures", &stats.signatures.to_string());
    ui::key_value(ctx, "mappings", &stats.total_mappings.to_string());
    if let Some(augmentation) = &stats.augmentation {
        ui::key_value(
            ctx,
            "community",
            &format!(
                "{} entries added, {} synthetic packages, {} packages augmented",
                augmentation.entries_added,
                augmentation.synthetic_packages,
                augmentation.packages_augmented
            ),
        );
    }
}
