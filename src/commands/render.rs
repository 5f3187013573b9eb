//! `clusterup render` - generate a declarative document instead of calling APIs

use super::{Session, report_failure};
use crate::Context;
use crate::cli::RenderArgs;
use crate::ui;
use anyhow::{Context as _, Result};
use converge::{DocumentTarget, Reconciler, TaskStatus};

pub fn run(ctx: &Context, args: RenderArgs) -> Result<()> {
    let session = Session::load(ctx)?;
    let format = args.format.into();

    // Only tasks the document leaves out but others reference are read.
    let run_ctx = session.render_cloud(ctx)?.into_context();
    let mut target = match &args.out {
        Some(path) => DocumentTarget::to_file(format, path),
        None => DocumentTarget::new(format),
    };

    let report = Reconciler::new(&run_ctx)
        .run(&session.tasks, &mut target)
        .map_err(|err| report_failure(err, ui::failures))?;
    let text = target
        .rendered()
        .context("Document was not rendered")?;

    let Some(path) = &args.out else {
        print!("{text}");
        return Ok(());
    };

    ui::success(&format!(
        "Wrote {} {format} resources to {}",
        target.len(),
        path.display()
    ));
    ui::kv("blake3", blake3::hash(text.as_bytes()).to_hex().as_str());
    for outcome in report.outcomes() {
        if let TaskStatus::Skipped { reason } = &outcome.status {
            ui::dim(&format!("skipped {}: {reason}", outcome.key));
        }
    }
    Ok(())
}
