//! Validate command - check the cache and mapping documents

use crate::cache::CacheStore;
use crate::cli::args::ValidateArgs;
use crate::config::Config;
use crate::error::{NodemapError, NodemapResult};
use crate::mapping::MappingDocument;
use crate::ui::{self, UiContext};
use crate::validate::{validate_cache, validate_mappings, ValidationReport};
use std::path::PathBuf;

/// Execute the validate command
pub async fn execute(args: ValidateArgs, config: &Config, ctx: UiContext) -> NodemapResult<()> {
    let mut report = ValidationReport::default();
    let mut checked = 0;

    let (cache_path, cache_explicit) = pick(args.cache, config.paths.cache_path());
    if cache_explicit || cache_path.exists() {
        let store = CacheStore::load(&cache_path).await?;
        let cache_report = validate_cache(store.document());
        summarize(&ctx, "cache", &cache_path, &cache_report);
        report.merge(cache_report);
        checked += 1;
    } else {
        ui::step_warn(&ctx, &format!("No cache at {}, skipped", cache_path.display()));
    }

    let (mappings_path, mappings_explicit) = pick(args.mappings, config.paths.mappings_path());
    if mappings_explicit || mappings_path.exists() || checked == 0 {
        let doc = MappingDocument::load(&mappings_path).await?;
        let mappings_report = validate_mappings(&doc, &config.scoring);
        summarize(&ctx, "mappings", &mappings_path, &mappings_report);
        report.merge(mappings_report);
    } else {
        ui::step_warn(&ctx, &format!("No mappings at {}, skipped", mappings_path.display()));
    }

    for issue in &report.errors {
        ui::step_error_detail(&ctx, "error", &issue.to_string());
    }
    for issue in &report.warnings {
        ui::step_warn(&ctx, &issue.to_string());
    }

    let failing = report.errors.len() + if args.strict { report.warnings.len() } else { 0 };
    if failing > 0 {
        return Err(NodemapError::ValidationFailed(failing));
    }
    ui::outro_success(&ctx, "All checks passed");
    Ok(())
}

fn pick(explicit: Option<PathBuf>, default: PathBuf) -> (PathBuf, bool) {
    match explicit {
        Some(path) => (path, true),
        None => (default, false),
    }
}

fn summarize(ctx: &UiContext, what: &str, path: &std::path::Path, report: &ValidationReport) {
    let status = format!(
        "{} ({} errors, {} warnings)",
        path.display(),
        report.errors.len(),
        report.warnings.len()
    );
    ui::key_value_status(ctx, what, &status, report.is_valid());
}
