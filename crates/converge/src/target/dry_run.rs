//! Dry-run / validation target

use super::{Target, TargetKind};
use crate::context::Context;
use crate::error::Result;
use crate::task::{Change, Task};
use crate::value::Fields;

/// Computes change sets without mutating or emitting anything
///
/// The executor never calls `render` on this target; planned changes are
/// read from the run report.
#[derive(Debug, Default)]
pub struct DryRunTarget;

impl DryRunTarget {
    pub fn new() -> Self {
        Self
    }
}

impl<C> Target<C> for DryRunTarget {
    fn kind(&self) -> TargetKind {
        TargetKind::DryRun
    }

    fn render(&mut self, _ctx: &Context<C>, _task: &dyn Task<C>, _change: &Change) -> Result<Fields> {
        Ok(Fields::new())
    }
}
