//! # Converge
//!
//! A task reconciliation engine for declarative infrastructure.
//!
//! Given a set of tasks, each describing one provider resource, the engine
//! discovers what exists, computes the minimal set of changes and renders
//! them through exactly one target: the live provider API, a declarative
//! document for an external apply tool, or a dry-run preview.
//!
//! ## Core Concepts
//!
//! - **Task**: one managed resource with a key, desired fields and a lifecycle
//! - **Value**: a field value; a literal, a reference to another task's
//!   attribute, or unknown until that task is applied
//! - **TaskGraph**: dependency order derived from references
//! - **ChangeSet**: sparse diff over the fields the desired state sets
//! - **Target**: where decided changes go
//! - **Reconciler**: discovery, planning, validation and serialized rendering
//!
//! ## Example
//!
//! ```ignore
//! use converge::{ApiTarget, Context, execute_simple};
//!
//! let ctx = Context::new(cloud).with_jobs(8);
//! let tasks = config.build_tasks(&registry)?;
//! let report = execute_simple(&ctx, &tasks, &mut ApiTarget::new())?;
//! println!("{} changes", report.summary().total_changes());
//! ```
//!
//! ## Provider Traits
//!
//! The engine never talks to a cloud itself. It is generic over a provider
//! handle `C` that tasks use for discovery and rendering:
//!
//! - [`Provider`]: classifies "not found" errors for idempotent deletes
//! - [`ProgressCallback`]: receives progress updates
//! - [`ConfirmCallback`]: handles the confirmation before live changes

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod graph;
pub mod lifecycle;
pub mod registry;
pub mod target;
pub mod task;
pub mod types;
pub mod value;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use context::{
    AutoConfirm, AutoDecline, CancelToken, ConfirmCallback, Context, NoProgress, ProgressCallback,
    Provider,
};
pub use diff::{ChangeSet, Comparator, DiffSummary, FieldChange, compare, diff};
pub use error::{Error, Result, RunError};
pub use executor::{Reconciler, execute, execute_simple};
pub use graph::TaskGraph;
pub use lifecycle::{Action, Lifecycle, decide};
pub use registry::TaskRegistry;
pub use target::{
    ApiTarget, DocumentFormat, DocumentTarget, DryRunTarget, ResourceBlock, Target, TargetKind,
};
pub use task::{BoxedTask, Change, Task};
pub use types::{RunReport, RunSummary, TaskOutcome, TaskStatus};
pub use value::{Desired, Fields, Link, TaskKey, TaskRef, Value};
