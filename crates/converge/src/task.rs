//! Task trait for declarative infrastructure state
//!
//! A Task is one managed provider resource: it knows its identity, what it
//! should look like, how to find what exists today and how to render a
//! decided change into each kind of target.

use crate::context::Context;
use crate::diff::{ChangeSet, Comparator};
use crate::error::Error;
use crate::lifecycle::{Action, Lifecycle};
use crate::target::{DocumentFormat, ResourceBlock};
use crate::value::{Desired, Fields, TaskKey};
use anyhow::Result;
use std::fmt;

/// A decided change for one task, handed to targets and task renderers
#[derive(Debug, Clone)]
pub struct Change {
    pub key: TaskKey,
    pub action: Action,
    /// Discovered state, `None` when the resource does not exist (or was not
    /// discovered because the target does not discover)
    pub actual: Option<Fields>,
    /// Desired state with references resolved as far as the target allows
    pub desired: Desired,
    pub changes: ChangeSet,
}

impl Change {
    /// Desired fields, `None` for a deletion marker
    pub fn desired_fields(&self) -> Option<&Fields> {
        self.desired.fields()
    }

    /// Whether `field` is part of the change set
    pub fn changed(&self, field: &str) -> bool {
        self.changes.contains(field)
    }

    /// Desired string field, resolved
    pub fn desired_str(&self, field: &str) -> Option<&str> {
        self.desired_fields().and_then(|f| f.str(field))
    }

    /// Actual string field
    pub fn actual_str(&self, field: &str) -> Option<&str> {
        self.actual.as_ref().and_then(|f| f.str(field))
    }
}

/// Core trait for declarative tasks
///
/// `C` is the provider handle carried by the [`Context`]. Every task type
/// plugged into the engine implements this trait:
/// - Identity (`key`) and policy (`lifecycle`)
/// - Desired state and the tasks it depends on
/// - Read-only discovery of the live resource
/// - Rendering into the live API or into a generated document
///
/// # Example
///
/// ```ignore
/// #[derive(Debug)]
/// struct Bucket { name: String }
///
/// impl Task<Cloud> for Bucket {
///     fn key(&self) -> TaskKey { TaskKey::new("bucket", &self.name) }
///
///     fn desired(&self) -> anyhow::Result<Desired> {
///         Ok(Desired::Present(Fields::new().with("name", &self.name)))
///     }
///
///     fn discover(&self, ctx: &Context<Cloud>) -> anyhow::Result<Option<Fields>> {
///         Ok(ctx.provider().find_bucket(&self.name)?.map(|b| {
///             Fields::new().with("name", b.name).with("id", b.id)
///         }))
///     }
///
///     fn apply(&self, ctx: &Context<Cloud>, change: &Change) -> anyhow::Result<Fields> {
///         let id = ctx.provider().create_bucket(&self.name)?;
///         Ok(Fields::new().with("id", id))
///     }
/// }
/// ```
pub trait Task<C>: Send + Sync + fmt::Debug {
    /// Stable identity, unique within a run
    fn key(&self) -> TaskKey;

    /// Lifecycle policy; immutable once the task is built
    fn lifecycle(&self) -> Lifecycle {
        Lifecycle::Sync
    }

    /// Desired state, or [`Desired::Absent`] when the resource should not exist
    fn desired(&self) -> Result<Desired>;

    /// Dependencies that do not show up as references in the desired fields
    fn extra_dependencies(&self) -> Vec<TaskKey> {
        Vec::new()
    }

    /// Tasks that must render before this one
    ///
    /// Defaults to every task referenced from the desired fields plus
    /// [`Task::extra_dependencies`].
    fn dependencies(&self) -> Result<Vec<TaskKey>> {
        let desired = self.desired()?;
        let mut deps: Vec<TaskKey> = desired.references().map(|r| r.task.clone()).collect();
        deps.extend(self.extra_dependencies());
        deps.sort();
        deps.dedup();
        Ok(deps)
    }

    /// Find the live resource
    ///
    /// Must not mutate anything and must return equal results when called
    /// twice without external change. `Ok(None)` means "not found"; any
    /// error aborts the run. Attributes other tasks may reference (`id`,
    /// `arn`, ...) should be included in the returned fields.
    fn discover(&self, ctx: &Context<C>) -> Result<Option<Fields>>;

    /// Custom comparator for a field where literal equality is wrong
    fn comparator(&self, _field: &str) -> Option<Comparator> {
        None
    }

    /// Validate provider constraints before any API call for this task
    fn check(&self, _change: &Change) -> Result<()> {
        Ok(())
    }

    /// Render the change against the live provider API
    ///
    /// Returns the attributes the provider produced (e.g. a new `id`), which
    /// become available to dependent tasks. Deletes must remove any child
    /// objects before the parent.
    fn apply(&self, ctx: &Context<C>, change: &Change) -> Result<Fields>;

    /// Render the change as resource blocks of a declarative document
    ///
    /// References in the desired fields are still symbolic here and should be
    /// copied into the block attributes as-is.
    fn document(&self, format: DocumentFormat, _change: &Change) -> Result<Vec<ResourceBlock>> {
        Err(Error::Unsupported {
            key: self.key(),
            format: format.to_string(),
        }
        .into())
    }
}

/// A boxed task for type-erased storage
pub type BoxedTask<C> = Box<dyn Task<C>>;
