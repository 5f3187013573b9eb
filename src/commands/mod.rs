//! Subcommand implementations
//!
//! - `plan` - preview what apply would change
//! - `apply` - converge the live provider
//! - `render` - write a Terraform or CloudFormation document
//! - `validate` - fail if anything is not converged

pub mod apply;
pub mod plan;
pub mod render;
pub mod validate;

use crate::Context;
use crate::cloud::Cloud;
use crate::config::ClusterConfig;
use crate::progress::Spinner;
use crate::tasks;
use crate::ui;
use anyhow::{Context as _, Result, bail};
use cloudkit::MemoryCloud;
use converge::{BoxedTask, DryRunTarget, Reconciler, RunError, RunReport};
use std::path::PathBuf;
use std::sync::Arc;

/// Discovery workers when neither the CLI nor the config sets them
pub const DEFAULT_JOBS: usize = 4;

/// A loaded config and the tasks it declares
pub struct Session {
    pub config: ClusterConfig,
    pub tasks: Vec<BoxedTask<Cloud>>,
}

impl Session {
    pub fn load(ctx: &Context) -> Result<Self> {
        let config = ClusterConfig::load(&ctx.config)?;
        let tasks = config.build_tasks(&tasks::registry()?)?;
        log::info!(
            "loaded {} tasks for cluster {}",
            tasks.len(),
            config.cluster.name
        );
        Ok(Self { config, tasks })
    }

    /// State file from `--state`, falling back to `[cluster] state`, if any
    pub fn configured_state(&self, ctx: &Context) -> Result<Option<PathBuf>> {
        match &ctx.state {
            Some(path) => Ok(Some(path.clone())),
            None => self.config.state_path(),
        }
    }

    /// State file the run must use
    pub fn state_path(&self, ctx: &Context) -> Result<PathBuf> {
        match self.configured_state(ctx)? {
            Some(path) => Ok(path),
            None => bail!("No provider state file: pass --state or set `state` under [cluster]"),
        }
    }

    /// Provider clients backed by the state file
    pub fn cloud(&self, ctx: &Context) -> Result<Cloud> {
        let path = self.state_path(ctx)?;
        let memory = MemoryCloud::open(&path)
            .with_context(|| format!("Could not open provider state {}", path.display()))?;
        Ok(self.with_retry(Cloud::memory(Arc::new(memory))))
    }

    /// Provider clients for rendering: the state file when one is configured,
    /// otherwise an empty cloud
    pub fn render_cloud(&self, ctx: &Context) -> Result<Cloud> {
        match self.configured_state(ctx)? {
            Some(_) => self.cloud(ctx),
            None => Ok(self.with_retry(Cloud::memory(Arc::new(MemoryCloud::new())))),
        }
    }

    fn with_retry(&self, cloud: Cloud) -> Cloud {
        match &self.config.cluster.retry {
            Some(retry) => cloud.with_retry(retry.clone()),
            None => cloud,
        }
    }

    /// Run context with `jobs` discovery workers
    pub fn run_context(&self, ctx: &Context, jobs: Option<usize>) -> Result<converge::Context<Cloud>> {
        let jobs = jobs.or(self.config.cluster.jobs).unwrap_or(DEFAULT_JOBS);
        Ok(self.cloud(ctx)?.into_context().with_jobs(jobs))
    }
}

/// Dry run against live state
///
/// A failed run still prints the plan it got to, so validation failures are
/// visible next to the error.
pub fn preview(
    ctx: &Context,
    run_ctx: &converge::Context<Cloud>,
    tasks: &[BoxedTask<Cloud>],
) -> Result<RunReport> {
    let result = Reconciler::new(run_ctx)
        .with_progress(Spinner::new(ctx.quiet))
        .run(tasks, &mut DryRunTarget::new());
    match result {
        Ok(report) => Ok(report),
        Err(err) => Err(report_failure(err, ui::plan)),
    }
}

/// Print what a failed run left behind and turn it into an error
pub fn report_failure(err: RunError, show: fn(&RunReport)) -> anyhow::Error {
    show(&err.report);
    if let Some(task) = err.error.task() {
        log::debug!("run failed at {task}");
    }
    anyhow::Error::new(err.error)
}
