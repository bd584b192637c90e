use doctor_core::audit::ToolAuditReport;
use doctor_core::permissions::PatternSuggestion;
use doctor_core::registry::CheckOutcome;
use doctor_core::report::DiagnosticReport;
use doctor_core::types::CheckStatus;
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

// ---------------------------------------------------------------------------
// Table rendering
// ---------------------------------------------------------------------------

pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let render_row = |cells: &[String]| -> String {
        cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                let pad = w.saturating_sub(cell.chars().count());
                format!("{}{}", cell, " ".repeat(pad))
            })
            .collect::<Vec<_>>()
            .join("  ")
    };

    let header_cells: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    println!("{}", render_row(&header_cells));
    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep.join("  "));
    for row in rows {
        println!("{}", render_row(row));
    }
}

// ---------------------------------------------------------------------------
// Diagnostic report
// ---------------------------------------------------------------------------

fn status_label(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "PASS",
        CheckStatus::Warn => "WARN",
        CheckStatus::Fail => "FAIL",
        CheckStatus::Skip => "SKIP",
    }
}

/// Display name within a category table: the bare check name, with
/// sub-findings indented under their parent.
fn display_name(full: &str) -> String {
    let short = full.split_once('.').map(|(_, rest)| rest).unwrap_or(full);
    match short.split_once(':') {
        Some((_, sub)) => format!("  \u{21b3} {sub}"),
        None => short.to_string(),
    }
}

pub fn render_report(report: &DiagnosticReport) {
    println!("Claude Code Diagnostic Report");
    println!("Timestamp: {}", report.timestamp.to_rfc3339());
    println!("Checks run: {}", report.checks_run);

    let mut summary: Vec<String> = Vec::new();
    if report.passed > 0 {
        summary.push(format!("{} passed", report.passed));
    }
    if report.warned > 0 {
        summary.push(format!("{} warnings", report.warned));
    }
    if report.failed > 0 {
        summary.push(format!("{} failed", report.failed));
    }
    if report.skipped > 0 {
        summary.push(format!("{} skipped", report.skipped));
    }
    println!("Results: {}\n", summary.join(", "));

    // Group outcomes by category, preserving production order.
    let mut categories: Vec<&str> = Vec::new();
    for outcome in &report.outcomes {
        let category = outcome.name.split('.').next().unwrap_or("unknown");
        if !categories.contains(&category) {
            categories.push(category);
        }
    }

    for category in categories {
        let rows: Vec<Vec<String>> = report
            .outcomes
            .iter()
            .filter(|o| o.name.split('.').next().unwrap_or("unknown") == category)
            .map(|o| {
                vec![
                    display_name(&o.name),
                    status_label(o.status).to_string(),
                    o.message.clone(),
                ]
            })
            .collect();
        let mut title: String = category.to_string();
        if let Some(first) = title.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        println!("{title} checks");
        print_table(&["CHECK", "STATUS", "MESSAGE"], &rows);
        println!();
    }
}

/// List outcomes that carry a fix, most severe first, with the hint to
/// re-run with `--fix`.
pub fn render_fix_hints(outcomes: &[CheckOutcome]) {
    let mut fixable: Vec<(&CheckOutcome, String)> = outcomes
        .iter()
        .filter(|o| matches!(o.status, CheckStatus::Fail | CheckStatus::Warn))
        .filter_map(|o| o.fix.as_ref().map(|fix| (o, fix.describe())))
        .collect();
    if fixable.is_empty() {
        return;
    }
    fixable.sort_by(|a, b| b.0.severity.weight().cmp(&a.0.severity.weight()));

    println!("Suggested fixes:");
    for (outcome, fix) in fixable {
        println!("  {}: {fix}", outcome.name);
    }
    println!("\nRun with --fix to apply fixes automatically\n");
}

// ---------------------------------------------------------------------------
// Audit report
// ---------------------------------------------------------------------------

const AUDIT_ROW_LIMIT: usize = 50;

fn date_of(timestamp: &str) -> &str {
    timestamp.split_once('T').map(|(d, _)| d).unwrap_or(timestamp)
}

fn clip(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max - 3).collect::<String>() + "..."
    }
}

pub fn render_audit(report: &ToolAuditReport) {
    println!("Claude Code Tool Audit Report");
    if let Some(start) = &report.start_date {
        println!(
            "Date range: {start} to {}",
            report.end_date.as_deref().unwrap_or("now")
        );
    }
    println!("Conversations scanned: {}", report.total_conversations);
    println!("Approved tool calls: {}", report.total_tool_calls);
    println!("Unique tool calls: {}\n", report.unique_tool_calls);

    if report.tool_calls.is_empty() {
        println!("No approved tool calls found in date range");
        return;
    }

    let rows: Vec<Vec<String>> = report
        .tool_calls
        .iter()
        .take(AUDIT_ROW_LIMIT)
        .map(|call| {
            vec![
                call.tool_name.clone(),
                clip(&call.key_params, 60),
                call.count.to_string(),
                call.session_count.to_string(),
                date_of(&call.first_seen).to_string(),
                date_of(&call.last_seen).to_string(),
            ]
        })
        .collect();
    print_table(
        &["TOOL", "PARAMETERS", "COUNT", "SESSIONS", "FIRST SEEN", "LAST SEEN"],
        &rows,
    );

    if report.tool_calls.len() > AUDIT_ROW_LIMIT {
        println!(
            "\nShowing top {AUDIT_ROW_LIMIT} of {} unique tool calls",
            report.tool_calls.len()
        );
    }
}

// ---------------------------------------------------------------------------
// Permission suggestions
// ---------------------------------------------------------------------------

pub fn render_suggestions(existing_count: usize, suggestions: &[PatternSuggestion]) {
    println!("Permission Pattern Suggestions");
    println!("Existing patterns in allow list: {existing_count}");
    println!("New patterns to consider: {}\n", suggestions.len());

    if suggestions.is_empty() {
        println!("All approved tool calls are already permitted");
        return;
    }

    let rows: Vec<Vec<String>> = suggestions
        .iter()
        .map(|s| vec![s.pattern.clone(), s.usage_count.to_string()])
        .collect();
    print_table(&["PATTERN", "USAGE COUNT"], &rows);
    println!("\nAdd these patterns to permissions.allow in settings.json");
}
