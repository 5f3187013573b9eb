//! Recording mock provider and task used by the engine's unit tests

use crate::context::{CancelToken, Context, Provider};
use crate::lifecycle::{Action, Lifecycle};
use crate::target::{DocumentFormat, ResourceBlock};
use crate::task::{BoxedTask, Change, Task};
use crate::value::{Desired, Fields, TaskKey, Value};
use anyhow::{Result, bail};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// In-memory provider that records every call
#[derive(Debug, Default)]
pub struct MockProvider {
    resources: Mutex<BTreeMap<TaskKey, Fields>>,
    calls: Mutex<Vec<String>>,
    failing_renders: BTreeSet<TaskKey>,
    failing_discoveries: BTreeSet<TaskKey>,
    cancel_after: Option<(TaskKey, CancelToken)>,
    cancel_during: Option<(TaskKey, CancelToken)>,
    discovery_delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a live resource
    pub fn with_resource(self, key: &TaskKey, fields: Fields) -> Self {
        self.resources
            .lock()
            .unwrap()
            .insert(key.clone(), fields.with("id", format!("id-{}", key.name)));
        self
    }

    pub fn fail_render(mut self, key: &TaskKey) -> Self {
        self.failing_renders.insert(key.clone());
        self
    }

    pub fn fail_discovery(mut self, key: &TaskKey) -> Self {
        self.failing_discoveries.insert(key.clone());
        self
    }

    /// Cancel `token` right after `key` is rendered
    pub fn cancel_after(mut self, key: &TaskKey, token: CancelToken) -> Self {
        self.cancel_after = Some((key.clone(), token));
        self
    }

    /// Cancel `token` while `key` renders, failing that render the way an
    /// abandoned provider call does
    pub fn cancel_during(mut self, key: &TaskKey, token: CancelToken) -> Self {
        self.cancel_during = Some((key.clone(), token));
        self
    }

    pub fn with_discovery_delay(mut self, delay: Duration) -> Self {
        self.discovery_delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn resource(&self, key: &TaskKey) -> Option<Fields> {
        self.resources.lock().unwrap().get(key).cloned()
    }

    /// Highest number of discoveries observed running at once
    pub fn max_parallel_discoveries(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn discover(&self, key: &TaskKey) -> Result<Option<Fields>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        thread::sleep(self.discovery_delay);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.record(format!("discover {key}"));
        if self.failing_discoveries.contains(key) {
            bail!("access denied reading {key}");
        }
        Ok(self.resource(key))
    }

    pub fn apply(&self, change: &Change) -> Result<Fields> {
        let key = &change.key;
        self.record(format!("{} {key}", change.action));
        if self.failing_renders.contains(key) {
            bail!("injected failure for {key}");
        }
        if let Some((during, token)) = &self.cancel_during
            && during == key
        {
            token.cancel();
            bail!("request for {key} abandoned");
        }

        let mut resources = self.resources.lock().unwrap();
        let produced = match change.action {
            Action::Create | Action::Update => {
                let mut fields = resources.remove(key).unwrap_or_default();
                for (name, value) in change.desired_fields().cloned().unwrap_or_default() {
                    if !matches!(value, Value::Literal(_)) {
                        bail!("{key}: field {name} is unresolved");
                    }
                    fields.insert(name, value);
                }
                let id = format!("id-{}", key.name);
                fields.insert("id", id.as_str());
                resources.insert(key.clone(), fields);
                Fields::new().with("id", id)
            }
            Action::Delete => {
                if resources.remove(key).is_none() {
                    bail!("{key} not found");
                }
                Fields::new()
            }
            Action::NoOp | Action::ValidationFailed => Fields::new(),
        };
        drop(resources);

        if let Some((after, token)) = &self.cancel_after
            && after == key
        {
            token.cancel();
        }
        Ok(produced)
    }
}

impl Provider for MockProvider {
    fn is_not_found(&self, err: &anyhow::Error) -> bool {
        err.to_string().contains("not found")
    }
}

/// Task whose desired state is a fixed field set
#[derive(Debug, Clone)]
pub struct MockTask {
    pub key: TaskKey,
    pub fields: Fields,
    pub absent: bool,
    pub lifecycle: Lifecycle,
    pub extra: Vec<TaskKey>,
}

impl MockTask {
    pub fn new(name: &str) -> Self {
        Self::kind("mock", name)
    }

    pub fn kind(kind: &str, name: &str) -> Self {
        Self {
            key: TaskKey::new(kind, name),
            fields: Fields::new().with("name", name),
            absent: false,
            lifecycle: Lifecycle::Sync,
            extra: Vec::new(),
        }
    }

    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(field, value);
        self
    }

    /// Desire the resource gone
    pub fn absent(mut self) -> Self {
        self.absent = true;
        self
    }

    pub fn lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Order after `key` without referencing it
    pub fn after(mut self, key: &TaskKey) -> Self {
        self.extra.push(key.clone());
        self
    }

    pub fn boxed(self) -> BoxedTask<MockProvider> {
        Box::new(self)
    }
}

impl Task<MockProvider> for MockTask {
    fn key(&self) -> TaskKey {
        self.key.clone()
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn desired(&self) -> Result<Desired> {
        if self.absent {
            return Ok(Desired::Absent);
        }
        Ok(Desired::Present(self.fields.clone()))
    }

    fn extra_dependencies(&self) -> Vec<TaskKey> {
        self.extra.clone()
    }

    fn discover(&self, ctx: &Context<MockProvider>) -> Result<Option<Fields>> {
        ctx.provider().discover(&self.key)
    }

    fn apply(&self, ctx: &Context<MockProvider>, change: &Change) -> Result<Fields> {
        ctx.provider().apply(change)
    }

    fn document(&self, _format: DocumentFormat, change: &Change) -> Result<Vec<ResourceBlock>> {
        let mut block = ResourceBlock::new("mock_resource", &self.key.name);
        block.attributes = change.desired_fields().cloned().unwrap_or_default();
        Ok(vec![block])
    }
}
