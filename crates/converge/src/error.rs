//! Engine error types
//!
//! Plan-time errors (cycle, unresolved reference, duplicate task) are raised
//! before any discovery or rendering happens. Everything else is a runtime
//! error that stops the run without compensating actions.

use crate::types::RunReport;
use crate::value::TaskKey;
use thiserror::Error;

/// Errors raised by the reconciliation engine
#[derive(Debug, Error)]
pub enum Error {
    /// The dependency graph contains a cycle; keys are listed in cycle order
    /// with the first key repeated at the end
    #[error("dependency cycle: {}", join_keys(.0, " -> "))]
    Cycle(Vec<TaskKey>),

    /// A task depends on a task that was never declared
    #[error("task {from} references undeclared task {to}")]
    UnresolvedReference {
        /// The referencing task
        from: TaskKey,
        /// The missing dependency
        to: TaskKey,
    },

    /// Two tasks share the same key
    #[error("task {0} is declared more than once")]
    DuplicateTask(TaskKey),

    /// A task's desired state could not be computed
    #[error("cannot compute desired state of {key}: {source}")]
    Desired {
        key: TaskKey,
        #[source]
        source: anyhow::Error,
    },

    /// A validate-only task does not match its desired state
    #[error("task {key} failed validation; differing fields: {}", .fields.join(", "))]
    Validation {
        key: TaskKey,
        /// Differing field names, or `(missing)` / `(exists)` for presence
        fields: Vec<String>,
    },

    /// A task's desired state violates a provider constraint
    #[error("task {key} violates a constraint: {source}")]
    Constraint {
        key: TaskKey,
        #[source]
        source: anyhow::Error,
    },

    /// Discovery failed for a reason other than "not found"
    #[error("discovery of {key} failed: {source}")]
    Discovery {
        key: TaskKey,
        #[source]
        source: anyhow::Error,
    },

    /// Rendering (API call or document emission) failed
    #[error("render of {key} failed: {source}")]
    Render {
        key: TaskKey,
        #[source]
        source: anyhow::Error,
    },

    /// A field still has no concrete value where one is required
    #[error("task {key}: field `{field}` is unresolved ({detail})")]
    UnresolvedValue {
        key: TaskKey,
        field: String,
        /// What the field refers to
        detail: String,
    },

    /// The task cannot be expressed in the requested document format
    #[error("task {key} cannot be rendered as {format}")]
    Unsupported { key: TaskKey, format: String },

    /// The run was cancelled through its context
    #[error("run cancelled")]
    Cancelled,

    /// Generated document could not be assembled
    #[error("document error: {0}")]
    Document(String),

    /// Task registry misuse (unknown kind, duplicate registration, bad table)
    #[error("registry error: {0}")]
    Registry(String),

    /// Confirmation prompt failed
    #[error("confirmation failed: {0}")]
    Confirm(#[source] anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// The task this error is attributed to, if any
    pub fn task(&self) -> Option<&TaskKey> {
        match self {
            Self::UnresolvedReference { from, .. } => Some(from),
            Self::DuplicateTask(key)
            | Self::Desired { key, .. }
            | Self::Validation { key, .. }
            | Self::Constraint { key, .. }
            | Self::Discovery { key, .. }
            | Self::Render { key, .. }
            | Self::UnresolvedValue { key, .. }
            | Self::Unsupported { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Whether the error was raised while building the plan, before any side effect
    pub fn is_plan_time(&self) -> bool {
        matches!(
            self,
            Self::Cycle(_) | Self::UnresolvedReference { .. } | Self::DuplicateTask(_)
        )
    }

    /// Whether the error is a cancellation rather than a provider failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Wrap a task failure, keeping cancellation and engine errors intact
    ///
    /// Tasks return `anyhow::Error`; when that error is itself an engine
    /// error (for example a cancellation observed inside a task) it is
    /// surfaced as-is instead of being reported as a provider failure.
    pub(crate) fn from_task(
        err: anyhow::Error,
        wrap: impl FnOnce(anyhow::Error) -> Self,
    ) -> Self {
        match err.downcast::<Self>() {
            Ok(engine) => engine,
            Err(other) => wrap(other),
        }
    }
}

fn join_keys(keys: &[TaskKey], sep: &str) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(sep)
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// A failed run: the fatal error plus everything that happened before it
///
/// Partial progress is kept so a re-run can be read as incremental.
#[derive(Debug, Error)]
#[error("reconcile failed")]
pub struct RunError {
    #[source]
    pub error: Error,
    pub report: RunReport,
}

impl RunError {
    pub fn new(error: Error, report: RunReport) -> Self {
        Self { error, report }
    }
}
