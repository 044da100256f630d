// src/reporting.rs
//! Console output for runs, transitions, and cache statistics.

use crate::memory::MemoryStats;
use crate::pipeline::{OutcomeStatus, RunReport, TaskOutcome, TaskState};
use anyhow::Result;
use colored::Colorize;
use std::fmt::Write;

/// Prints one line per task, then the summary.
pub fn print_report(report: &RunReport) {
    print!("{}", format_report_string(report));
    print_summary(report);
}

/// Plain-text rendering of every outcome, without colour.
#[must_use]
pub fn format_report_string(report: &RunReport) -> String {
    let mut out = String::new();
    for outcome in &report.outcomes {
        let _ = writeln!(out, "{}", outcome_line(outcome));
    }
    for path in &report.not_dispatched {
        let _ = writeln!(out, "[--] {path} (not dispatched)");
    }
    out
}

fn outcome_line(o: &TaskOutcome) -> String {
    match o.status {
        OutcomeStatus::Done => {
            let mut notes = vec![format!("+{} -{}", o.lines_added, o.lines_removed)];
            if o.cache_hit {
                notes.push("from memory".to_string());
            }
            if o.dry_run {
                notes.push("dry_run".to_string());
            }
            if let Some(r) = &o.receipt {
                notes.push(r.reference.clone());
            }
            format!("[OK] {} ({})", o.path, notes.join(", "))
        }
        OutcomeStatus::Skipped => format!("[--] {} (no issues)", o.path),
        OutcomeStatus::Failed => format!(
            "[X] {} {}: {}",
            o.path,
            o.reason.as_deref().unwrap_or("failed"),
            o.detail.as_deref().unwrap_or("")
        ),
    }
}

fn print_summary(report: &RunReport) {
    println!();
    let summary = format!(
        "{} done, {} skipped, {} failed, {} not dispatched ({} from memory)",
        report.done(),
        report.skipped(),
        report.failed(),
        report.not_dispatched.len(),
        report.cache_hits()
    );
    match (&report.aborted, report.failed()) {
        (Some(reason), _) => println!("{} Run {} aborted: {reason}", "X".red().bold(), report.run_id),
        (None, 0) => println!("{} Run {}: {summary}", "OK".green().bold(), report.run_id),
        (None, _) => println!("{} Run {}: {summary}", "WARN".yellow().bold(), report.run_id),
    }
    if report.cancelled {
        println!("{}", "Run was cancelled; pending files were not dispatched.".yellow());
    }
    if let Some(url) = &report.pull_request {
        println!("   {} {url}", "PR:".cyan());
    }
    if let Some(err) = &report.publish_error {
        println!("   {} {err}", "publish:".yellow());
    }
    if report.done() > 0 && !report.outcomes.iter().any(|o| o.dry_run) {
        println!(
            "   {} forgefix rollback --run {}",
            "undo:".dimmed(),
            report.run_id
        );
    }
}

pub fn print_transition(path: &str, from: TaskState, to: TaskState) {
    let line = format!("  {path}: {from} -> {to}");
    match to {
        TaskState::Failed => eprintln!("{}", line.red()),
        TaskState::Done => eprintln!("{}", line.green()),
        _ => eprintln!("{}", line.dimmed()),
    }
}

pub fn print_memory_stats(stats: &MemoryStats) {
    println!(
        "{} {} / {}",
        "memory records:".cyan(),
        stats.records,
        stats.capacity
    );
    if let Some(reason) = &stats.degraded {
        println!("{} {reason}", "[WARN] degraded:".yellow());
    }
}

pub fn ok(message: &str) {
    println!("{} {message}", "[OK]".green());
}

pub fn warn(message: &str) {
    eprintln!("{} {message}", "[WARN]".yellow());
}

pub fn error(message: &str) {
    eprintln!("{} {message}", "[X]".red().bold());
}

#[must_use]
pub fn pluralize(word: &str, count: usize) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{word}s")
    }
}

/// Prints any serializable value as pretty JSON.
///
/// # Errors
/// Returns error if serialization fails.
pub fn print_json<T: serde::Serialize>(data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)?;
    println!("{json}");
    Ok(())
}
