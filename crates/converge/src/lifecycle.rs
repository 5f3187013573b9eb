//! Lifecycle policy: which action a task gets
//!
//! The decision depends only on whether the resource exists, what the task
//! wants, the task's lifecycle and whether the change set is empty.

use crate::diff::ChangeSet;
use crate::value::Desired;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-task policy constraining which actions are permitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// Create, update and delete as needed
    #[default]
    Sync,
    /// Never planned or rendered; discovered read-only only when another
    /// task references it
    Ignore,
    /// Validate-only: any difference is a validation failure, never mutate
    ExistsAndValidates,
    /// Log differences as warnings, never mutate
    ExistsAndWarnIfChanges,
}

impl Lifecycle {
    /// Whether tasks with this lifecycle may ever be mutated
    pub fn may_mutate(self) -> bool {
        matches!(self, Self::Sync)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sync => "sync",
            Self::Ignore => "ignore",
            Self::ExistsAndValidates => "exists_and_validates",
            Self::ExistsAndWarnIfChanges => "exists_and_warn_if_changes",
        };
        f.write_str(name)
    }
}

/// Terminal action decided for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Create,
    Update,
    Delete,
    NoOp,
    ValidationFailed,
}

impl Action {
    /// Whether the action changes the resource
    pub fn is_mutation(self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Delete)
    }

    /// One-character marker used in previews
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Create => "+",
            Self::Update => "~",
            Self::Delete => "-",
            Self::NoOp => "=",
            Self::ValidationFailed => "!",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::NoOp => "no-op",
            Self::ValidationFailed => "validation failed",
        };
        f.write_str(name)
    }
}

/// The action a `Sync` task would take
pub fn sync_action(actual_present: bool, desired: &Desired, changes: &ChangeSet) -> Action {
    match (actual_present, desired) {
        (false, Desired::Present(_)) => Action::Create,
        (true, Desired::Present(_)) if changes.is_empty() => Action::NoOp,
        (true, Desired::Present(_)) => Action::Update,
        (true, Desired::Absent) => Action::Delete,
        (false, Desired::Absent) => Action::NoOp,
    }
}

/// Decide the action for a task
pub fn decide(
    actual_present: bool,
    desired: &Desired,
    lifecycle: Lifecycle,
    changes: &ChangeSet,
) -> Action {
    let action = sync_action(actual_present, desired, changes);
    match lifecycle {
        Lifecycle::Sync => action,
        Lifecycle::ExistsAndValidates if action.is_mutation() => Action::ValidationFailed,
        Lifecycle::ExistsAndValidates
        | Lifecycle::ExistsAndWarnIfChanges
        | Lifecycle::Ignore => Action::NoOp,
    }
}
