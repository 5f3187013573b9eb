//! `clusterup validate` - succeed only when the cluster is converged

use super::{Session, preview};
use crate::Context;
use crate::cli::PlanArgs;
use crate::ui;
use anyhow::{Result, bail};

pub fn run(ctx: &Context, args: PlanArgs) -> Result<()> {
    let session = Session::load(ctx)?;
    let run_ctx = session.run_context(ctx, args.jobs)?;

    let report = preview(ctx, &run_ctx, &session.tasks)?;
    let pending = report.changes().count();
    if pending > 0 {
        ui::plan(&report);
        bail!("{pending} task(s) differ from the configuration");
    }

    ui::success(&format!(
        "Cluster {} matches its configuration ({} tasks)",
        session.config.cluster.name,
        session.tasks.len()
    ));
    Ok(())
}
