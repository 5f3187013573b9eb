//! Run report types

use crate::diff::{ChangeSet, DiffSummary};
use crate::lifecycle::Action;
use crate::value::TaskKey;
use serde::Serialize;
use std::fmt;

/// Where a task ended up in a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TaskStatus {
    /// Not processed yet
    Pending,
    /// Change rendered to the target
    Applied,
    /// Change computed but not rendered (dry run)
    Planned,
    /// Nothing to do
    Unchanged,
    /// Deliberately left alone
    Skipped { reason: String },
    /// Render or validation failed
    Failed(String),
    /// An earlier failure stopped the run before this task
    NotAttempted,
}

impl TaskStatus {
    /// Check if the status represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Applied => f.write_str("applied"),
            Self::Planned => f.write_str("planned"),
            Self::Unchanged => f.write_str("unchanged"),
            Self::Skipped { reason } => write!(f, "skipped ({reason})"),
            Self::Failed(msg) => write!(f, "failed: {msg}"),
            Self::NotAttempted => f.write_str("not attempted"),
        }
    }
}

/// Per-task entry of a [`RunReport`]
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub key: TaskKey,
    /// Decided action, `None` until planned
    pub action: Option<Action>,
    pub status: TaskStatus,
    pub changes: ChangeSet,
}

impl TaskOutcome {
    pub fn new(key: TaskKey) -> Self {
        Self {
            key,
            action: None,
            status: TaskStatus::Pending,
            changes: ChangeSet::default(),
        }
    }

    /// Whether the decided action mutates the resource
    pub fn is_mutation(&self) -> bool {
        self.action.is_some_and(Action::is_mutation)
    }
}

/// Everything that happened in one run, in execution order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    outcomes: Vec<TaskOutcome>,
}

impl RunReport {
    pub fn new(keys: impl IntoIterator<Item = TaskKey>) -> Self {
        Self {
            outcomes: keys.into_iter().map(TaskOutcome::new).collect(),
        }
    }

    pub fn outcomes(&self) -> &[TaskOutcome] {
        &self.outcomes
    }

    pub fn get(&self, key: &TaskKey) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|o| &o.key == key)
    }

    pub(crate) fn get_mut(&mut self, key: &TaskKey) -> Option<&mut TaskOutcome> {
        self.outcomes.iter_mut().find(|o| &o.key == key)
    }

    pub(crate) fn set_status(&mut self, key: &TaskKey, status: TaskStatus) {
        if let Some(outcome) = self.get_mut(key) {
            outcome.status = status;
        }
    }

    /// Mark every task still pending as not attempted
    pub(crate) fn abort_pending(&mut self) {
        for outcome in &mut self.outcomes {
            if outcome.status == TaskStatus::Pending {
                outcome.status = TaskStatus::NotAttempted;
            }
        }
    }

    /// Outcomes whose decided action mutates something
    pub fn changes(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.outcomes.iter().filter(|o| o.is_mutation())
    }

    pub fn has_changes(&self) -> bool {
        self.changes().next().is_some()
    }

    /// Planned or applied changes by kind of action
    pub fn diff_summary(&self) -> DiffSummary {
        let mut summary = DiffSummary::default();
        for outcome in self.changes() {
            match outcome.action {
                Some(Action::Create) => summary.additions += 1,
                Some(Action::Delete) => summary.removals += 1,
                Some(Action::Update) => summary.modifications += 1,
                _ => {}
            }
        }
        summary
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for outcome in &self.outcomes {
            summary.add_outcome(outcome);
        }
        summary
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub planned: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub not_attempted: usize,
}

impl RunSummary {
    /// Total number of changes actually rendered
    pub fn total_changes(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.not_attempted == 0
    }

    /// Total number of tasks in the run
    pub fn total(&self) -> usize {
        self.total_changes()
            + self.planned
            + self.unchanged
            + self.skipped
            + self.failed
            + self.not_attempted
    }

    /// Add an outcome to the summary
    pub fn add_outcome(&mut self, outcome: &TaskOutcome) {
        match (&outcome.status, outcome.action) {
            (TaskStatus::Applied, Some(Action::Create)) => self.created += 1,
            (TaskStatus::Applied, Some(Action::Update)) => self.updated += 1,
            (TaskStatus::Applied, Some(Action::Delete)) => self.deleted += 1,
            (TaskStatus::Applied | TaskStatus::Unchanged, _) => self.unchanged += 1,
            (TaskStatus::Planned, _) => self.planned += 1,
            (TaskStatus::Skipped { .. }, _) => self.skipped += 1,
            (TaskStatus::Failed(_), _) => self.failed += 1,
            (TaskStatus::NotAttempted | TaskStatus::Pending, _) => self.not_attempted += 1,
        }
    }
}
