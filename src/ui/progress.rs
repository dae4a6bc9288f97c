//! Progress indicators with CI fallback

use super::context::UiContext;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::info;

/// A task spinner with CI fallback
pub struct TaskSpinner {
    spinner: Option<ProgressBar>,
    interactive: bool,
    quiet: bool,
}

impl TaskSpinner {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            interactive: ctx.use_fancy_output(),
            quiet: ctx.is_quiet(),
        }
    }

    /// Start the spinner with a message
    pub fn start(&mut self, message: &str) {
        if self.interactive {
            let spinner = ProgressBar::new_spinner();
            if let Ok(template) = ProgressStyle::default_spinner().template("  {spinner:.cyan} {msg}")
            {
                spinner.set_style(template.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
            }
            spinner.set_message(message.to_string());
            spinner.enable_steady_tick(Duration::from_millis(120));
            self.spinner = Some(spinner);
        } else if !self.quiet {
            println!("{} {}", style("...").dim(), message);
        }
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        self.finish(style("✓").green(), style("[OK]").green(), message);
    }

    /// Stop with warning message
    pub fn stop_warn(&mut self, message: &str) {
        self.finish(style("!").yellow(), style("[WARN]").yellow(), message);
    }

    /// Stop with error message
    pub fn stop_error(&mut self, message: &str) {
        self.finish(style("✗").red(), style("[FAIL]").red(), message);
    }

    fn finish(
        &mut self,
        fancy: console::StyledObject<&str>,
        plain: console::StyledObject<&str>,
        message: &str,
    ) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
            println!("  {} {}", fancy, message);
        } else if !self.quiet {
            println!("{} {}", plain, message);
        }
    }
}

/// Item counter for one fetch phase
///
/// Draws an indicatif bar on interactive terminals. Elsewhere it logs a
/// line every tenth of the batch.
pub struct BatchProgress {
    bar: Option<ProgressBar>,
    label: String,
    total: u64,
    done: u64,
    next_report: u64,
}

impl BatchProgress {
    pub fn new(ctx: &UiContext, label: &str, total: u64) -> Self {
        let bar = if ctx.use_fancy_output() && total > 0 {
            let bar = ProgressBar::new(total);
            if let Ok(template) = ProgressStyle::default_bar().template(
                "  {spinner:.cyan} {prefix}  {bar:24.cyan/dim} {pos}/{len} {msg:.dim}  {elapsed:.dim}",
            ) {
                bar.set_style(template.progress_chars("━╸─"));
            }
            bar.set_prefix(label.to_string());
            bar.enable_steady_tick(Duration::from_millis(120));
            Some(bar)
        } else {
            None
        };

        Self {
            bar,
            label: label.to_string(),
            total,
            done: 0,
            next_report: report_step(total),
        }
    }

    /// Count one completed item
    pub fn inc(&mut self, item: &str) {
        self.done += 1;
        match self.bar {
            Some(ref bar) => {
                bar.inc(1);
                bar.set_message(item.to_string());
            }
            None => {
                if self.done >= self.next_report || self.done == self.total {
                    info!("{}: {}/{}", self.label, self.done, self.total);
                    self.next_report = self.done + report_step(self.total);
                }
            }
        }
    }

    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

fn report_step(total: u64) -> u64 {
    (total / 10).max(1)
}
