//! Explicit registry of task kinds
//!
//! Built once at startup and passed to whoever turns configuration into
//! tasks. Registration order never affects behaviour: kinds are kept sorted.

use crate::error::{Error, Result};
use crate::task::{BoxedTask, Task};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;

type Constructor<C> = Box<dyn Fn(serde_json::Value) -> anyhow::Result<BoxedTask<C>> + Send + Sync>;

/// Maps a task kind name to a constructor from a configuration table
pub struct TaskRegistry<C> {
    constructors: BTreeMap<String, Constructor<C>>,
}

impl<C: 'static> TaskRegistry<C> {
    pub fn new() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Register a task type deserialized straight from its table
    pub fn register<T>(&mut self, kind: &str) -> Result<()>
    where
        T: Task<C> + DeserializeOwned + 'static,
    {
        self.register_with(kind, |table| {
            let task: T = serde_json::from_value(table)?;
            Ok(Box::new(task) as BoxedTask<C>)
        })
    }

    /// Register a custom constructor
    pub fn register_with<F>(&mut self, kind: &str, constructor: F) -> Result<()>
    where
        F: Fn(serde_json::Value) -> anyhow::Result<BoxedTask<C>> + Send + Sync + 'static,
    {
        if self.constructors.contains_key(kind) {
            return Err(Error::Registry(format!("kind `{kind}` registered twice")));
        }
        self.constructors
            .insert(kind.to_string(), Box::new(constructor));
        Ok(())
    }

    /// Build a task of `kind` from its configuration table
    pub fn build(&self, kind: &str, table: serde_json::Value) -> Result<BoxedTask<C>> {
        let constructor = self.constructors.get(kind).ok_or_else(|| {
            Error::Registry(format!(
                "unknown task kind `{kind}` (known: {})",
                self.kinds().collect::<Vec<_>>().join(", ")
            ))
        })?;
        let task = constructor(table).map_err(|e| Error::Registry(format!("invalid {kind}: {e:#}")))?;
        if task.key().kind != kind {
            return Err(Error::Registry(format!(
                "constructor for `{kind}` built a `{}` task",
                task.key().kind
            )));
        }
        Ok(task)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }
}

impl<C: 'static> Default for TaskRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
