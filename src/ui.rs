//! Terminal output

use colored::{ColoredString, Colorize};
use converge::{Action, FieldChange, RunReport, RunSummary, TaskOutcome, TaskStatus, Value};
use similar::{ChangeTag, TextDiff};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

pub fn symbol(action: Action) -> ColoredString {
    match action {
        Action::Create => action.symbol().green(),
        Action::Update => action.symbol().yellow(),
        Action::Delete => action.symbol().red(),
        Action::ValidationFailed => action.symbol().red().bold(),
        Action::NoOp => action.symbol().dimmed(),
    }
}

/// Print every task that would change or failed validation, with its field changes
pub fn plan(report: &RunReport) {
    let shown: Vec<&TaskOutcome> = report
        .outcomes()
        .iter()
        .filter(|o| matches!(o.action, Some(a) if a != Action::NoOp))
        .collect();

    if shown.is_empty() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    header("Plan");
    for outcome in shown {
        let Some(action) = outcome.action else {
            continue;
        };
        println!("  {} {} {}", symbol(action), outcome.key, format!("({action})").dimmed());
        if action == Action::Delete {
            continue;
        }
        for (name, change) in outcome.changes.iter() {
            field(name, change);
        }
    }

    let diff = report.diff_summary();
    println!();
    println!(
        "  {} to create, {} to update, {} to delete",
        diff.additions.to_string().green(),
        diff.modifications.to_string().yellow(),
        diff.removals.to_string().red()
    );
}

fn field(name: &str, change: &FieldChange) {
    let desired = value_text(&change.desired);
    let actual = change.actual.as_ref().map(json_text);

    match (actual.as_deref(), desired.lines().count() > 1) {
        (Some(old), true) => {
            println!("      {}:", name.bold());
            for line in document_diff(old, &desired) {
                let colored = match line.chars().next() {
                    Some('+') => line.green(),
                    Some('-') => line.red(),
                    _ => line.dimmed(),
                };
                println!("        {colored}");
            }
        }
        (Some(old), false) => {
            println!("      {}: {} → {}", name.bold(), old.red(), desired.green());
        }
        (None, _) => {
            println!("      {}: {}", name.bold(), desired.green());
        }
    }
}

/// Text of a desired value; JSON documents held as strings are pretty-printed
fn value_text(value: &Value) -> String {
    match value {
        Value::Literal(v) => json_text(v),
        other => other.to_string(),
    }
}

fn json_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => serde_json::from_str::<serde_json::Value>(text)
            .ok()
            .filter(|parsed| parsed.is_object() || parsed.is_array())
            .and_then(|parsed| serde_json::to_string_pretty(&parsed).ok())
            .unwrap_or_else(|| text.clone()),
        serde_json::Value::Null => "(none)".to_string(),
        other => other.to_string(),
    }
}

/// Line diff of two documents, unchanged lines included with a blank marker
pub fn document_diff(old: &str, new: &str) -> Vec<String> {
    TextDiff::from_lines(old, new)
        .iter_all_changes()
        .map(|change| {
            let marker = match change.tag() {
                ChangeTag::Delete => '-',
                ChangeTag::Insert => '+',
                ChangeTag::Equal => ' ',
            };
            format!("{marker} {}", change.value().trim_end_matches('\n'))
        })
        .collect()
}

/// One line per rendered task, as the run progresses
pub fn rendered(outcome_key: &str, status: &TaskStatus) {
    match status {
        TaskStatus::Applied => println!("  {} {outcome_key}", "✓".green()),
        TaskStatus::Failed(msg) => println!("  {} {outcome_key}: {}", "✗".red(), msg.red()),
        other => println!("  {} {outcome_key} {}", "•".dimmed(), format!("({other})").dimmed()),
    }
}

/// Print final summary
pub fn summary(summary: &RunSummary) {
    println!();
    if summary.is_success() {
        println!("  {} Cluster converged", "✓".green().bold());
    } else {
        println!("  {} Cluster converged with errors", "⚠".yellow().bold());
    }

    if summary.created > 0 {
        println!("    • {} resources created", summary.created);
    }
    if summary.updated > 0 {
        println!("    • {} resources updated", summary.updated);
    }
    if summary.deleted > 0 {
        println!("    • {} resources deleted", summary.deleted);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
    if summary.not_attempted > 0 {
        println!("    • {} resources not attempted", summary.not_attempted);
    }
}

/// Print the tasks left in a bad state by a failed run
pub fn failures(report: &RunReport) {
    for outcome in report.outcomes() {
        match &outcome.status {
            TaskStatus::Failed(msg) => {
                println!("  {} {}: {}", "✗".red(), outcome.key, msg);
            }
            TaskStatus::NotAttempted => {
                println!("  {} {} {}", "•".dimmed(), outcome.key, "(not attempted)".dimmed());
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_diff_marks_lines() {
        let lines = document_diff("a\nb\n", "a\nc\n");
        assert_eq!(lines, ["  a", "- b", "+ c"]);
    }

    #[test]
    fn test_json_text_pretty_prints_documents() {
        let doc = serde_json::json!(r#"{"Version":"2012-10-17"}"#);
        assert_eq!(json_text(&doc), "{\n  \"Version\": \"2012-10-17\"\n}");
        assert_eq!(json_text(&serde_json::json!("plain")), "plain");
        assert_eq!(json_text(&serde_json::json!(60)), "60");
    }

    #[test]
    fn test_value_text_of_unknown() {
        assert_eq!(value_text(&Value::Unknown), "(known after apply)");
    }
}
