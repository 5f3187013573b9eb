//! Progress reporting and confirmation for reconcile runs

use crate::ui;
use anyhow::Result;
use colored::Colorize;
use converge::{Action, ConfirmCallback, ProgressCallback, TaskKey, TaskStatus};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner while discovery waves run, one line per rendered task
pub struct Spinner {
    bar: Option<ProgressBar>,
    quiet: bool,
    discovered: usize,
}

impl Spinner {
    pub fn new(quiet: bool) -> Self {
        Self {
            bar: None,
            quiet,
            discovered: 0,
        }
    }
}

impl ProgressCallback for Spinner {
    fn on_discovery_start(&mut self, count: usize) {
        if self.quiet {
            return;
        }
        let bar = self.bar.get_or_insert_with(|| {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        });
        self.discovered += count;
        bar.set_message(format!("Discovering live state ({} tasks)", self.discovered));
    }

    fn on_discovery_complete(&mut self) {
        if let Some(bar) = &self.bar {
            bar.set_message(format!("Discovered {} tasks", self.discovered));
        }
    }

    fn on_render_start(&mut self, key: &TaskKey, action: Action) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
        if !self.quiet {
            println!("  {} {key} {}", ui::symbol(action), format!("({action})").dimmed());
        }
    }

    fn on_render_complete(&mut self, key: &TaskKey, status: &TaskStatus) {
        if !self.quiet {
            ui::rendered(&key.to_string(), status);
        }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

/// Interactive yes/no prompt
pub struct Prompt;

impl ConfirmCallback for Prompt {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        let confirmed = Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()?;
        Ok(confirmed)
    }
}
