//! `clusterup apply` - converge the live provider

use super::{Session, preview, report_failure};
use crate::Context;
use crate::cli::ApplyArgs;
use crate::progress::{Prompt, Spinner};
use crate::ui;
use anyhow::Result;
use converge::{ApiTarget, AutoConfirm, ConfirmCallback, Reconciler};

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let session = Session::load(ctx)?;
    let run_ctx = session.run_context(ctx, args.jobs)?;

    let plan = preview(ctx, &run_ctx, &session.tasks)?;
    ui::plan(&plan);
    if !plan.has_changes() {
        return Ok(());
    }
    println!();

    let mut confirm: Box<dyn ConfirmCallback> = if args.yes {
        Box::new(AutoConfirm)
    } else {
        Box::new(Prompt)
    };
    let result = Reconciler::new(&run_ctx)
        .with_progress(Spinner::new(ctx.quiet))
        .with_confirm(&mut *confirm)
        .run(&session.tasks, &mut ApiTarget::new());

    let report = match result {
        Ok(report) => report,
        Err(err) => {
            ui::summary(&err.report.summary());
            return Err(report_failure(err, ui::failures));
        }
    };

    let summary = report.summary();
    if summary.total_changes() == 0 && summary.skipped > 0 {
        ui::warn("Apply cancelled; nothing was changed");
        return Ok(());
    }
    ui::summary(&summary);
    Ok(())
}
