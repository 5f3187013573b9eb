//! `clusterup plan`

use super::{Session, preview};
use crate::Context;
use crate::cli::PlanArgs;
use crate::ui;
use anyhow::Result;

pub fn run(ctx: &Context, args: PlanArgs) -> Result<()> {
    let session = Session::load(ctx)?;
    let run_ctx = session.run_context(ctx, args.jobs)?;

    let report = preview(ctx, &run_ctx, &session.tasks)?;
    ui::plan(&report);
    if report.has_changes() && !ctx.quiet {
        ui::info("Run `clusterup apply` to make these changes.");
    }
    Ok(())
}
