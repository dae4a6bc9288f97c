//! UI module for consistent CLI output
//!
//! Draws spinners and progress bars with `indicatif` on interactive
//! terminals, with automatic fallback to plain `[OK]`/`[WARN]` lines in CI
//! and when output is piped.
//!
//! # Example
//!
//! ```rust,ignore
//! use nodemap::ui::{self, UiContext, TaskSpinner};
//!
//! let ctx = UiContext::detect();
//!
//! let mut spinner = TaskSpinner::new(&ctx);
//! spinner.start("Refreshing community map...");
//! // ... do work ...
//! spinner.stop("Community map up to date");
//!
//! ui::key_value(&ctx, "packages", "1843");
//! ui::outro_success(&ctx, "Mappings written");
//! ```

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{
    key_value, key_value_status, outro_success, outro_warn, section, step_error_detail, step_ok,
    step_warn, step_warn_hint,
};
pub use progress::{BatchProgress, TaskSpinner};
