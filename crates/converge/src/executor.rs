//! Reconciler - discovers, plans and renders a task set

use crate::context::{AutoConfirm, ConfirmCallback, Context, NoProgress, ProgressCallback};
use crate::diff::{ChangeSet, diff};
use crate::error::{Error, Result, RunError};
use crate::graph::TaskGraph;
use crate::lifecycle::{Action, Lifecycle, decide};
use crate::target::{Target, TargetKind};
use crate::task::{BoxedTask, Change, Task};
use crate::types::{RunReport, TaskStatus};
use crate::value::{Desired, Fields, TaskKey, Value};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Drives one reconcile run against a single target
///
/// Phases: build the graph, discover in parallel waves, plan every task,
/// gate on validation failures, render serially in dependency order and
/// finalize the target.
pub struct Reconciler<'a, C> {
    ctx: &'a Context<C>,
    progress: Box<dyn ProgressCallback + 'a>,
    confirm: Box<dyn ConfirmCallback + 'a>,
}

/// A planned task waiting for the render phase
struct Planned {
    key: TaskKey,
    /// Desired state before reference resolution
    raw: Desired,
    change: Change,
}

type Outputs = BTreeMap<TaskKey, Fields>;

impl<'a, C: Sync> Reconciler<'a, C> {
    /// Reconciler with no progress reporting that never asks for confirmation
    pub fn new(ctx: &'a Context<C>) -> Self {
        Self {
            ctx,
            progress: Box::new(NoProgress),
            confirm: Box::new(AutoConfirm),
        }
    }

    pub fn with_progress(mut self, progress: impl ProgressCallback + 'a) -> Self {
        self.progress = Box::new(progress);
        self
    }

    /// Ask `confirm` once before a live run mutates anything
    pub fn with_confirm(mut self, confirm: impl ConfirmCallback + 'a) -> Self {
        self.confirm = Box::new(confirm);
        self
    }

    /// Reconcile `tasks` through `target`
    ///
    /// On failure the returned [`RunError`] carries the partial report: tasks
    /// rendered before the failure stay `Applied`, the failing task is
    /// `Failed` and everything after it is `NotAttempted`.
    pub fn run(
        &mut self,
        tasks: &[BoxedTask<C>],
        target: &mut dyn Target<C>,
    ) -> std::result::Result<RunReport, RunError> {
        let graph = TaskGraph::build(tasks).map_err(|e| RunError::new(e, RunReport::default()))?;
        let by_key: BTreeMap<TaskKey, &dyn Task<C>> =
            tasks.iter().map(|t| (t.key(), t.as_ref())).collect();
        let mut report = RunReport::new(graph.order().iter().cloned());
        let kind = target.kind();
        // Tasks this target never plans; references to them resolve to discovered values
        let unrendered: BTreeSet<TaskKey> = by_key
            .iter()
            .filter(|(_, task)| skip_reason(kind, task.lifecycle()).is_some())
            .map(|(key, _)| key.clone())
            .collect();

        macro_rules! bail_run {
            ($err:expr) => {{
                report.abort_pending();
                return Err(RunError::new($err, report));
            }};
        }

        let mut discovered = match self.discover(&graph, &by_key, kind) {
            Ok(found) => found,
            Err(e) => bail_run!(e),
        };
        let mut outputs: Outputs = discovered
            .iter()
            .filter_map(|(k, f)| f.clone().map(|f| (k.clone(), f)))
            .collect();

        // Plan
        let mut planned = Vec::new();
        for key in graph.order() {
            let task = by_key[key];
            let lifecycle = task.lifecycle();
            if let Some(reason) = skip_reason(kind, lifecycle) {
                debug!("{key}: skipped ({reason})");
                if let Some(outcome) = report.get_mut(key) {
                    outcome.action = Some(Action::NoOp);
                    outcome.status = TaskStatus::Skipped { reason };
                }
                continue;
            }

            let raw = match task.desired() {
                Ok(desired) => desired,
                Err(source) => bail_run!(Error::Desired {
                    key: key.clone(),
                    source
                }),
            };
            let actual = discovered.remove(key).flatten();
            let change = match plan_task(task, kind, raw.clone(), actual, &outputs, &unrendered) {
                Ok(change) => change,
                Err(e) => bail_run!(e),
            };

            if let Some(outcome) = report.get_mut(key) {
                outcome.action = Some(change.action);
                outcome.changes = change.changes.clone();
            }
            planned.push(Planned {
                key: key.clone(),
                raw,
                change,
            });
        }

        // Validation gate
        if let Some(failed) = planned
            .iter()
            .find(|p| p.change.action == Action::ValidationFailed)
        {
            let err = Error::Validation {
                key: failed.key.clone(),
                fields: validation_fields(&failed.change),
            };
            report.set_status(&failed.key, TaskStatus::Failed(err.to_string()));
            bail_run!(err);
        }

        if !kind.renders() {
            for p in &planned {
                let status = if p.change.action.is_mutation() {
                    TaskStatus::Planned
                } else {
                    TaskStatus::Unchanged
                };
                report.set_status(&p.key, status);
            }
            if let Err(e) = target.finalize(self.ctx) {
                bail_run!(e);
            }
            return Ok(report);
        }

        let mutations = planned.iter().filter(|p| p.change.action.is_mutation()).count();
        if kind == TargetKind::Api && mutations > 0 {
            let prompt = format!("Apply {mutations} change(s)?");
            match self.confirm.confirm(&prompt) {
                Ok(true) => {}
                Ok(false) => {
                    info!("declined; nothing applied");
                    for p in &planned {
                        let status = if p.change.action.is_mutation() {
                            TaskStatus::Skipped {
                                reason: "declined".into(),
                            }
                        } else {
                            TaskStatus::Unchanged
                        };
                        report.set_status(&p.key, status);
                    }
                    return Ok(report);
                }
                Err(e) => bail_run!(Error::Confirm(e)),
            }
        }

        // Render
        for Planned { key, raw, change } in planned {
            let task = by_key[&key];
            let change = if kind.resolves_references() {
                match replan(task, kind, raw, change, &outputs, &unrendered) {
                    Ok(change) => change,
                    Err(e) => bail_run!(e),
                }
            } else {
                change
            };
            if let Some(outcome) = report.get_mut(&key) {
                outcome.action = Some(change.action);
                outcome.changes = change.changes.clone();
            }

            if !change.action.is_mutation() {
                report.set_status(&key, TaskStatus::Unchanged);
                continue;
            }
            if let Err(e) = self.ctx.check_cancelled() {
                bail_run!(e);
            }

            self.progress.on_render_start(&key, change.action);
            match target.render(self.ctx, task, &change) {
                Ok(produced) => {
                    if change.action == Action::Delete {
                        outputs.remove(&key);
                    } else {
                        outputs.entry(key.clone()).or_default().merge(produced);
                    }
                    report.set_status(&key, TaskStatus::Applied);
                    self.progress.on_render_complete(&key, &TaskStatus::Applied);
                }
                Err(e) => {
                    let e = self.ctx.cancelled_or(e);
                    let status = TaskStatus::Failed(e.to_string());
                    self.progress.on_render_complete(&key, &status);
                    report.set_status(&key, status);
                    bail_run!(e);
                }
            }
        }

        if let Err(e) = target.finalize(self.ctx) {
            bail_run!(e);
        }
        let summary = report.summary();
        info!(
            "reconciled {} task(s): {} created, {} updated, {} deleted",
            summary.total(),
            summary.created,
            summary.updated,
            summary.deleted
        );
        Ok(report)
    }

    /// Discover every task the run needs live state for, one dependency level at a time
    fn discover(
        &mut self,
        graph: &TaskGraph,
        by_key: &BTreeMap<TaskKey, &dyn Task<C>>,
        kind: TargetKind,
    ) -> Result<BTreeMap<TaskKey, Option<Fields>>> {
        let mut found = BTreeMap::new();
        let ctx = self.ctx;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(ctx.jobs())
            .build()
            .map_err(std::io::Error::other)?;

        for level in graph.levels() {
            let wave: Vec<&TaskKey> = level
                .iter()
                .filter(|k| {
                    let referenced = graph.dependents(k).next().is_some();
                    needs_discovery(kind, by_key[*k].lifecycle(), referenced)
                })
                .collect();
            if wave.is_empty() {
                continue;
            }

            self.progress.on_discovery_start(wave.len());
            let results: Vec<(TaskKey, Result<Option<Fields>>)> = pool.install(|| {
                wave.par_iter()
                    .map(|key| ((*key).clone(), discover_one(ctx, by_key[*key])))
                    .collect()
            });
            self.progress.on_discovery_complete();

            for (key, result) in results {
                found.insert(key, result?);
            }
        }
        Ok(found)
    }
}

fn discover_one<C>(ctx: &Context<C>, task: &dyn Task<C>) -> Result<Option<Fields>> {
    ctx.check_cancelled()?;
    let key = task.key();
    let found = task.discover(ctx).map_err(|err| {
        ctx.cancelled_or(Error::from_task(err, |source| Error::Discovery {
            key: key.clone(),
            source,
        }))
    })?;
    debug!(
        "discovered {key}: {}",
        if found.is_some() { "present" } else { "absent" }
    );
    Ok(found)
}

/// Whether a run against `kind` reads the live state of a task
///
/// Tasks the target plans are discovered whenever the target discovers.
/// Tasks it skips are still discovered, read-only, when another task depends
/// on them, so references to them resolve to live values.
fn needs_discovery(kind: TargetKind, lifecycle: Lifecycle, referenced: bool) -> bool {
    if skip_reason(kind, lifecycle).is_some() {
        return referenced;
    }
    kind.discovers()
}

fn skip_reason(kind: TargetKind, lifecycle: Lifecycle) -> Option<String> {
    match (kind, lifecycle) {
        (_, Lifecycle::Ignore) => Some("lifecycle ignore".into()),
        (TargetKind::Document(format), l) if !l.may_mutate() => {
            Some(format!("lifecycle {l} is not rendered to {format}"))
        }
        _ => None,
    }
}

/// Substitute references with known outputs
///
/// Live and dry-run targets resolve every reference; one whose output is not
/// known yet becomes [`Value::Unknown`]. Document targets keep references
/// symbolic except those to `unrendered` tasks, which must resolve to a
/// discovered literal.
fn resolve(
    key: &TaskKey,
    desired: Desired,
    kind: TargetKind,
    outputs: &Outputs,
    unrendered: &BTreeSet<TaskKey>,
) -> Result<Desired> {
    let Desired::Present(mut fields) = desired else {
        return Ok(Desired::Absent);
    };
    for (name, value) in fields.iter_mut() {
        let Value::Ref(reference) = &*value else {
            continue;
        };
        let known = outputs
            .get(&reference.task)
            .and_then(|f| f.get(&reference.attr))
            .filter(|v| matches!(v, Value::Literal(_)))
            .cloned();
        let resolved = if kind.resolves_references() {
            known.unwrap_or(Value::Unknown)
        } else if unrendered.contains(&reference.task) {
            known.ok_or_else(|| Error::UnresolvedValue {
                key: key.clone(),
                field: name.to_string(),
                detail: format!("{reference} is not rendered here and has no live value"),
            })?
        } else {
            continue;
        };
        *value = resolved;
    }
    Ok(Desired::Present(fields))
}

fn plan_task<C>(
    task: &dyn Task<C>,
    kind: TargetKind,
    raw: Desired,
    actual: Option<Fields>,
    outputs: &Outputs,
    unrendered: &BTreeSet<TaskKey>,
) -> Result<Change> {
    let key = task.key();
    let lifecycle = task.lifecycle();
    let desired = resolve(&key, raw, kind, outputs, unrendered)?;

    let changes = match desired.fields() {
        Some(fields) => diff(actual.as_ref(), fields, |field| task.comparator(field)),
        None => ChangeSet::default(),
    };
    let action = decide(actual.is_some(), &desired, lifecycle, &changes);

    if lifecycle == Lifecycle::ExistsAndWarnIfChanges
        && decide(actual.is_some(), &desired, Lifecycle::Sync, &changes).is_mutation()
    {
        warn!(
            "{key} differs from its desired state ({}); leaving it unchanged",
            describe_drift(actual.is_some(), &desired, &changes)
        );
    }
    if !changes.is_empty() {
        debug!("{key}: {action}, changed fields: {}", changes.fields().join(", "));
    }

    let change = Change {
        key,
        action,
        actual,
        desired,
        changes,
    };
    if action.is_mutation() {
        task.check(&change).map_err(|source| Error::Constraint {
            key: change.key.clone(),
            source,
        })?;
    }
    Ok(change)
}

/// Recompute a planned change with the outputs rendered so far
///
/// A mutation about to be rendered live must have every field resolved; a
/// reference still without a value would be written as nothing.
fn replan<C>(
    task: &dyn Task<C>,
    kind: TargetKind,
    raw: Desired,
    planned: Change,
    outputs: &Outputs,
    unrendered: &BTreeSet<TaskKey>,
) -> Result<Change> {
    let change = plan_task(task, kind, raw.clone(), planned.actual, outputs, unrendered)?;
    if change.action == Action::ValidationFailed {
        return Err(Error::Validation {
            fields: validation_fields(&change),
            key: change.key,
        });
    }
    if change.action.is_mutation()
        && let Some(fields) = change.desired_fields()
        && let Some((field, _)) = fields.iter().find(|(_, v)| !matches!(v, Value::Literal(_)))
    {
        let detail = match raw.fields().and_then(|f| f.get(field)) {
            Some(Value::Ref(reference)) => format!("{reference} has no value"),
            _ => "value is not known".to_string(),
        };
        return Err(Error::UnresolvedValue {
            key: change.key.clone(),
            field: field.to_string(),
            detail,
        });
    }
    Ok(change)
}

fn validation_fields(change: &Change) -> Vec<String> {
    match (&change.actual, &change.desired) {
        (None, Desired::Present(_)) => vec!["(missing)".into()],
        (Some(_), Desired::Absent) => vec!["(exists)".into()],
        _ => change.changes.fields(),
    }
}

fn describe_drift(actual_present: bool, desired: &Desired, changes: &ChangeSet) -> String {
    match (actual_present, desired) {
        (false, _) => "missing".into(),
        (true, Desired::Absent) => "should not exist".into(),
        (true, Desired::Present(_)) => format!("fields: {}", changes.fields().join(", ")),
    }
}

/// Reconcile with callbacks
///
/// # Arguments
/// * `ctx` - Run context (provider, cancellation, discovery workers)
/// * `tasks` - The full desired task set
/// * `target` - Where decided changes are rendered
/// * `progress` - Progress callback
/// * `confirm` - Confirmation callback, asked once before live mutations
pub fn execute<C, P, F>(
    ctx: &Context<C>,
    tasks: &[BoxedTask<C>],
    target: &mut dyn Target<C>,
    progress: &mut P,
    confirm: &mut F,
) -> std::result::Result<RunReport, RunError>
where
    C: Sync,
    P: ProgressCallback,
    F: ConfirmCallback,
{
    Reconciler::new(ctx)
        .with_progress(progress)
        .with_confirm(confirm)
        .run(tasks, target)
}

/// Simple execution without callbacks
///
/// For basic use cases where you don't need progress or confirmation.
pub fn execute_simple<C: Sync>(
    ctx: &Context<C>,
    tasks: &[BoxedTask<C>],
    target: &mut dyn Target<C>,
) -> std::result::Result<RunReport, RunError> {
    Reconciler::new(ctx).run(tasks, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AutoDecline, CancelToken};
    use crate::diff::{Comparator, compare};
    use crate::target::{ApiTarget, DocumentFormat, DocumentTarget, DryRunTarget};
    use crate::testing::{MockProvider, MockTask};
    use std::time::Duration;

    fn key(name: &str) -> TaskKey {
        TaskKey::new("mock", name)
    }

    fn run_api(
        ctx: &Context<MockProvider>,
        tasks: &[BoxedTask<MockProvider>],
    ) -> std::result::Result<RunReport, RunError> {
        execute_simple(ctx, tasks, &mut ApiTarget::new())
    }

    fn statuses(report: &RunReport) -> Vec<(String, TaskStatus)> {
        report
            .outcomes()
            .iter()
            .map(|o| (o.key.name.clone(), o.status.clone()))
            .collect()
    }

    #[test]
    fn test_cycle_aborts_before_discovery() {
        let ctx = Context::new(MockProvider::new());
        let tasks = vec![
            MockTask::new("a").with("x", key("b").attr("id")).boxed(),
            MockTask::new("b").with("x", key("a").attr("id")).boxed(),
        ];

        let err = run_api(&ctx, &tasks).unwrap_err();
        assert!(matches!(err.error, Error::Cycle(_)));
        assert!(ctx.provider().calls().is_empty());
    }

    #[test]
    fn test_create_renders_once_without_actual() {
        let ctx = Context::new(MockProvider::new());
        let tasks = vec![MockTask::new("a").with("size", 3u32).boxed()];

        let report = run_api(&ctx, &tasks).unwrap();
        assert_eq!(ctx.provider().calls(), ["discover mock/a", "create mock/a"]);
        let outcome = report.get(&key("a")).unwrap();
        assert_eq!(outcome.action, Some(Action::Create));
        assert_eq!(outcome.status, TaskStatus::Applied);
        assert_eq!(outcome.changes.fields(), ["name", "size"]);
    }

    #[test]
    fn test_second_run_is_all_noop() {
        let ctx = Context::new(MockProvider::new());
        let tasks = vec![
            MockTask::new("role").boxed(),
            MockTask::new("template")
                .with("service_account", key("role").attr("id"))
                .boxed(),
        ];

        run_api(&ctx, &tasks).unwrap();
        let renders_before = ctx.provider().count("create");
        let report = run_api(&ctx, &tasks).unwrap();

        assert_eq!(ctx.provider().count("create"), renders_before);
        assert_eq!(ctx.provider().count("update"), 0);
        for outcome in report.outcomes() {
            assert_eq!(outcome.action, Some(Action::NoOp), "{}", outcome.key);
            assert_eq!(outcome.status, TaskStatus::Unchanged);
        }
    }

    #[test]
    fn test_reference_resolved_from_render_output() {
        let ctx = Context::new(MockProvider::new());
        let tasks = vec![
            MockTask::new("template")
                .with("service_account", key("role").attr("id"))
                .boxed(),
            MockTask::new("role").boxed(),
        ];

        let report = run_api(&ctx, &tasks).unwrap();
        let template = ctx.provider().resource(&key("template")).unwrap();
        assert_eq!(template.str("service_account"), Some("id-role"));
        let order: Vec<_> = report.outcomes().iter().map(|o| o.key.name.as_str()).collect();
        assert_eq!(order, ["role", "template"]);
    }

    #[test]
    fn test_partial_failure_marks_rest_not_attempted() {
        let ctx = Context::new(MockProvider::new().fail_render(&key("t2")));
        let tasks = vec![
            MockTask::new("t1").boxed(),
            MockTask::new("t2").after(&key("t1")).boxed(),
            MockTask::new("t3").after(&key("t2")).boxed(),
        ];

        let err = run_api(&ctx, &tasks).unwrap_err();
        assert!(matches!(err.error, Error::Render { ref key, .. } if key.name == "t2"));
        let got = statuses(&err.report);
        assert_eq!(got[0], ("t1".into(), TaskStatus::Applied));
        assert!(matches!(got[1].1, TaskStatus::Failed(ref m) if m.contains("injected failure")));
        assert_eq!(got[2], ("t3".into(), TaskStatus::NotAttempted));
        assert!(ctx.provider().resource(&key("t1")).is_some());
        assert_eq!(ctx.provider().count("create mock/t3"), 0);
    }

    #[test]
    fn test_validate_only_never_mutates() {
        let existing = Fields::new().with("name", "shared").with("size", 1u32);
        let ctx = Context::new(
            MockProvider::new().with_resource(&key("shared"), existing),
        );
        let tasks = vec![
            MockTask::new("shared")
                .with("size", 2u32)
                .lifecycle(Lifecycle::ExistsAndValidates)
                .boxed(),
            MockTask::new("other").boxed(),
        ];

        let err = run_api(&ctx, &tasks).unwrap_err();
        match &err.error {
            Error::Validation { key, fields } => {
                assert_eq!(key.name, "shared");
                assert_eq!(fields, &["size"]);
            }
            other => panic!("expected validation error, got {other}"),
        }
        assert_eq!(ctx.provider().count("create"), 0);
        assert_eq!(ctx.provider().count("update"), 0);
        assert_eq!(ctx.provider().count("delete"), 0);
    }

    #[test]
    fn test_validate_only_missing_resource() {
        let ctx = Context::new(MockProvider::new());
        let tasks = vec![
            MockTask::new("shared")
                .lifecycle(Lifecycle::ExistsAndValidates)
                .boxed(),
        ];

        let err = run_api(&ctx, &tasks).unwrap_err();
        assert!(matches!(err.error, Error::Validation { ref fields, .. } if fields == &["(missing)"]));
    }

    #[test]
    fn test_warn_lifecycle_leaves_drift() {
        let existing = Fields::new().with("name", "legacy").with("size", 1u32);
        let ctx = Context::new(MockProvider::new().with_resource(&key("legacy"), existing));
        let tasks = vec![
            MockTask::new("legacy")
                .with("size", 2u32)
                .lifecycle(Lifecycle::ExistsAndWarnIfChanges)
                .boxed(),
        ];

        let report = run_api(&ctx, &tasks).unwrap();
        assert_eq!(report.get(&key("legacy")).unwrap().action, Some(Action::NoOp));
        assert_eq!(ctx.provider().count("update"), 0);
    }

    #[test]
    fn test_unreferenced_ignore_task_is_not_discovered() {
        let ctx = Context::new(MockProvider::new());
        let tasks = vec![MockTask::new("a").lifecycle(Lifecycle::Ignore).boxed()];

        let report = run_api(&ctx, &tasks).unwrap();
        assert!(ctx.provider().calls().is_empty());
        assert!(matches!(
            report.get(&key("a")).unwrap().status,
            TaskStatus::Skipped { .. }
        ));
    }

    #[test]
    fn test_delete_of_missing_resource_is_success() {
        let existing = Fields::new().with("name", "old");
        let ctx = Context::new(MockProvider::new().with_resource(&key("old"), existing));
        let tasks = vec![MockTask::new("old").absent().boxed()];

        run_api(&ctx, &tasks).unwrap();
        assert!(ctx.provider().resource(&key("old")).is_none());

        // Discovered present but removed out of band before the render
        let target_ctx = Context::new(MockProvider::new());
        let change = Change {
            key: key("old"),
            action: Action::Delete,
            actual: Some(Fields::new()),
            desired: Desired::Absent,
            changes: ChangeSet::default(),
        };
        let produced = ApiTarget::new()
            .render(&target_ctx, &MockTask::new("old"), &change)
            .unwrap();
        assert!(produced.is_empty());
    }

    #[test]
    fn test_discovery_error_aborts_without_render() {
        let ctx = Context::new(MockProvider::new().fail_discovery(&key("b")));
        let tasks = vec![MockTask::new("a").boxed(), MockTask::new("b").boxed()];

        let err = run_api(&ctx, &tasks).unwrap_err();
        assert!(matches!(err.error, Error::Discovery { ref key, .. } if key.name == "b"));
        assert_eq!(ctx.provider().count("create"), 0);
        assert!(err.report.outcomes().iter().all(|o| o.status == TaskStatus::NotAttempted));
    }

    #[test]
    fn test_cancelled_before_start() {
        let token = CancelToken::new();
        token.cancel();
        let ctx = Context::new(MockProvider::new()).with_cancel(token);
        let tasks = vec![MockTask::new("a").boxed()];

        let err = run_api(&ctx, &tasks).unwrap_err();
        assert!(err.error.is_cancelled());
        assert_eq!(ctx.provider().count("create"), 0);
    }

    #[test]
    fn test_cancelled_between_renders() {
        let token = CancelToken::new();
        let ctx = Context::new(MockProvider::new().cancel_after(&key("a"), token.clone()))
            .with_cancel(token);
        let tasks = vec![MockTask::new("a").boxed(), MockTask::new("b").boxed()];

        let err = run_api(&ctx, &tasks).unwrap_err();
        assert!(err.error.is_cancelled());
        let got = statuses(&err.report);
        assert_eq!(got[0].1, TaskStatus::Applied);
        assert_eq!(got[1].1, TaskStatus::NotAttempted);
    }

    #[test]
    fn test_cancel_during_render_reports_cancelled() {
        let token = CancelToken::new();
        let ctx = Context::new(MockProvider::new().cancel_during(&key("a"), token.clone()))
            .with_cancel(token);
        let tasks = vec![MockTask::new("a").boxed(), MockTask::new("b").boxed()];

        let err = run_api(&ctx, &tasks).unwrap_err();
        assert!(err.error.is_cancelled());
        let got = statuses(&err.report);
        assert_eq!(got[0].1, TaskStatus::Failed("run cancelled".into()));
        assert_eq!(got[1].1, TaskStatus::NotAttempted);
    }

    #[test]
    fn test_referenced_ignore_task_is_discovered_read_only() {
        let existing = Fields::new().with("name", "shared");
        let ctx = Context::new(MockProvider::new().with_resource(&key("shared"), existing));
        let tasks = vec![
            MockTask::new("shared")
                .with("size", 9u32)
                .lifecycle(Lifecycle::Ignore)
                .boxed(),
            MockTask::new("template")
                .with("service_account", key("shared").attr("id"))
                .boxed(),
        ];

        let first = run_api(&ctx, &tasks).unwrap();
        assert!(matches!(
            first.get(&key("shared")).unwrap().status,
            TaskStatus::Skipped { .. }
        ));
        let template = ctx.provider().resource(&key("template")).unwrap();
        assert_eq!(template.str("service_account"), Some("id-shared"));
        assert_eq!(ctx.provider().count("update"), 0);

        let second = run_api(&ctx, &tasks).unwrap();
        assert!(!second.has_changes());
        assert_eq!(ctx.provider().count("create"), 1);
    }

    #[test]
    fn test_reference_without_live_value_fails_before_render() {
        let ctx = Context::new(MockProvider::new());
        let tasks = vec![
            MockTask::new("shared").lifecycle(Lifecycle::Ignore).boxed(),
            MockTask::new("template")
                .with("service_account", key("shared").attr("id"))
                .boxed(),
        ];

        let err = run_api(&ctx, &tasks).unwrap_err();
        match &err.error {
            Error::UnresolvedValue { key, field, detail } => {
                assert_eq!(key.name, "template");
                assert_eq!(field, "service_account");
                assert!(detail.contains("mock/shared"), "{detail}");
            }
            other => panic!("expected unresolved value, got {other}"),
        }
        assert_eq!(ctx.provider().count("create"), 0);
    }

    #[test]
    fn test_document_inlines_validate_only_reference() {
        let existing = Fields::new().with("name", "nodes");
        let ctx = Context::new(MockProvider::new().with_resource(&key("nodes"), existing));
        let tasks = vec![
            MockTask::new("nodes")
                .lifecycle(Lifecycle::ExistsAndValidates)
                .boxed(),
            MockTask::new("template")
                .with("service_account", key("nodes").attr("id"))
                .boxed(),
        ];

        let mut target = DocumentTarget::new(DocumentFormat::Terraform);
        execute_simple(&ctx, &tasks, &mut target).unwrap();

        assert_eq!(ctx.provider().calls(), ["discover mock/nodes"]);
        let doc: serde_json::Value = serde_json::from_str(target.rendered().unwrap()).unwrap();
        let blocks = &doc["resource"]["mock_resource"];
        assert_eq!(blocks["template"]["service_account"], "id-nodes");
        assert!(blocks.get("nodes").is_none());
    }

    #[test]
    fn test_document_reference_to_missing_validate_only_task() {
        let ctx = Context::new(MockProvider::new());
        let tasks = vec![
            MockTask::new("nodes")
                .lifecycle(Lifecycle::ExistsAndValidates)
                .boxed(),
            MockTask::new("template")
                .with("service_account", key("nodes").attr("id"))
                .boxed(),
        ];

        let mut target = DocumentTarget::new(DocumentFormat::Terraform);
        let err = execute_simple(&ctx, &tasks, &mut target).unwrap_err();
        assert!(matches!(
            err.error,
            Error::UnresolvedValue { ref key, .. } if key.name == "template"
        ));
        assert!(target.rendered().is_none());
    }

    #[test]
    fn test_dry_run_plans_without_rendering() {
        let existing = Fields::new().with("name", "b").with("size", 1u32);
        let ctx = Context::new(MockProvider::new().with_resource(&key("b"), existing));
        let tasks = vec![
            MockTask::new("a").boxed(),
            MockTask::new("b").with("size", 2u32).boxed(),
            MockTask::new("c")
                .with("parent", key("a").attr("id"))
                .boxed(),
        ];

        let report = execute_simple(&ctx, &tasks, &mut DryRunTarget::new()).unwrap();
        assert_eq!(ctx.provider().count("discover"), 3);
        assert_eq!(ctx.provider().count("create") + ctx.provider().count("update"), 0);

        let c = report.get(&key("c")).unwrap();
        assert_eq!(c.status, TaskStatus::Planned);
        assert_eq!(c.changes.get("parent").unwrap().desired, Value::Unknown);
        assert_eq!(report.get(&key("b")).unwrap().action, Some(Action::Update));
        let summary = report.diff_summary();
        assert_eq!((summary.additions, summary.modifications), (2, 1));
    }

    #[test]
    fn test_declined_confirmation_applies_nothing() {
        let ctx = Context::new(MockProvider::new());
        let tasks = vec![MockTask::new("a").boxed()];

        let report = execute(
            &ctx,
            &tasks,
            &mut ApiTarget::new(),
            &mut NoProgress,
            &mut AutoDecline,
        )
        .unwrap();
        assert_eq!(ctx.provider().count("create"), 0);
        assert!(matches!(
            report.get(&key("a")).unwrap().status,
            TaskStatus::Skipped { .. }
        ));
    }

    #[test]
    fn test_parallel_discovery_is_bounded() {
        let provider = MockProvider::new().with_discovery_delay(Duration::from_millis(30));
        let ctx = Context::new(provider).with_jobs(2);
        let tasks: Vec<_> = (0..6).map(|i| MockTask::new(&format!("t{i}")).boxed()).collect();

        run_api(&ctx, &tasks).unwrap();
        let max = ctx.provider().max_parallel_discoveries();
        assert!((1..=2).contains(&max), "observed {max} concurrent discoveries");
        assert_eq!(ctx.provider().count("discover"), 6);
    }

    #[test]
    fn test_document_run_skips_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.tf.json");
        let ctx = Context::new(MockProvider::new());
        let tasks = vec![
            MockTask::new("template")
                .with("role", key("role").attr("arn"))
                .boxed(),
            MockTask::new("role").boxed(),
        ];

        let mut target = DocumentTarget::to_file(DocumentFormat::Terraform, &path);
        let report = execute_simple(&ctx, &tasks, &mut target).unwrap();

        assert!(ctx.provider().calls().is_empty());
        assert!(report.outcomes().iter().all(|o| o.status == TaskStatus::Applied));
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("${mock_resource.role.arn}"));
    }

    #[derive(Debug)]
    struct PolicyTask;

    impl Task<MockProvider> for PolicyTask {
        fn key(&self) -> TaskKey {
            key("policy")
        }

        fn desired(&self) -> anyhow::Result<Desired> {
            Ok(Desired::Present(
                Fields::new().with("document", r#"{"a": 1, "b": [1, 2]}"#),
            ))
        }

        fn discover(&self, ctx: &Context<MockProvider>) -> anyhow::Result<Option<Fields>> {
            ctx.provider().discover(&self.key())
        }

        fn comparator(&self, field: &str) -> Option<Comparator> {
            (field == "document").then_some(compare::json_document as Comparator)
        }

        fn check(&self, _change: &Change) -> anyhow::Result<()> {
            anyhow::bail!("name too long")
        }

        fn apply(&self, _ctx: &Context<MockProvider>, _change: &Change) -> anyhow::Result<Fields> {
            Ok(Fields::new())
        }
    }

    #[test]
    fn test_custom_comparator_suppresses_update() {
        let existing = Fields::new().with("document", r#"{"b":[1,2],"a":1}"#);
        let ctx = Context::new(MockProvider::new().with_resource(&key("policy"), existing));
        let tasks: Vec<BoxedTask<MockProvider>> = vec![Box::new(PolicyTask)];

        // check() would fail for any mutation, so success means NoOp
        let report = run_api(&ctx, &tasks).unwrap();
        assert_eq!(report.get(&key("policy")).unwrap().action, Some(Action::NoOp));
    }

    #[test]
    fn test_constraint_violation_aborts_before_render() {
        let ctx = Context::new(MockProvider::new());
        let tasks: Vec<BoxedTask<MockProvider>> = vec![Box::new(PolicyTask)];

        let err = run_api(&ctx, &tasks).unwrap_err();
        assert!(matches!(err.error, Error::Constraint { .. }));
        assert!(err.error.to_string().contains("name too long"));
    }
}
