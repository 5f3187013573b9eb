//! Rendering targets
//!
//! Exactly one target is active per run. The executor hands it every decided
//! mutation in dependency order and calls [`Target::finalize`] once at the end.
//!
//! - [`ApiTarget`]: acts immediately through the task's live API render
//! - [`DocumentTarget`]: accumulates resource blocks and writes one document
//! - [`DryRunTarget`]: never renders; the run report is the preview

mod api;
mod document;
mod dry_run;

pub use api::ApiTarget;
pub use document::{DocumentFormat, DocumentTarget, ResourceBlock};
pub use dry_run::DryRunTarget;

use crate::context::Context;
use crate::error::Result;
use crate::task::{Change, Task};
use crate::value::Fields;

/// What kind of sink a target is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// Live provider API
    Api,
    /// Declarative document for an external apply tool
    Document(DocumentFormat),
    /// Preview only
    DryRun,
}

impl TargetKind {
    /// Whether live state is discovered for the tasks this target renders
    ///
    /// Documents always describe the full desired state, so they only read
    /// tasks they skip but others reference.
    pub fn discovers(self) -> bool {
        !matches!(self, Self::Document(_))
    }

    /// Whether references are resolved to concrete values
    ///
    /// Documents keep them symbolic for the downstream tool to resolve.
    pub fn resolves_references(self) -> bool {
        !matches!(self, Self::Document(_))
    }

    /// Whether `render` is invoked at all
    pub fn renders(self) -> bool {
        !matches!(self, Self::DryRun)
    }
}

/// A pluggable rendering sink
pub trait Target<C> {
    fn kind(&self) -> TargetKind;

    /// Render one decided change
    ///
    /// Returns attributes produced by the render, made available to
    /// dependent tasks.
    fn render(&mut self, ctx: &Context<C>, task: &dyn Task<C>, change: &Change) -> Result<Fields>;

    /// Called once after every task was processed successfully
    fn finalize(&mut self, _ctx: &Context<C>) -> Result<()> {
        Ok(())
    }
}
