use crate::error::Result;
use crate::paths::ClaudePaths;
use crate::registry::{CheckBody, CheckDescriptor, CheckOutcome, Registry};
use crate::types::Severity;
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;

pub fn register(registry: &mut Registry, paths: &ClaudePaths) -> Result<()> {
    registry.register(
        CheckDescriptor::new(
            "debug.recent_errors",
            "debug",
            Severity::Medium,
            "Scan recent debug logs for errors",
        ),
        recent_errors_body(paths.debug_dir()),
    )?;
    Ok(())
}

static ERROR_PREFIX_RE: OnceLock<Regex> = OnceLock::new();
static SESSION_TS_RE: OnceLock<Regex> = OnceLock::new();

fn error_prefix_re() -> &'static Regex {
    ERROR_PREFIX_RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}T[\d:Z.+-]+ \[ERROR\] ").unwrap())
}

fn session_ts_re() -> &'static Regex {
    SESSION_TS_RE.get_or_init(|| Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}").unwrap())
}

const LOGS_TO_SCAN: usize = 5;
const TOP_ERRORS: usize = 5;

/// Scans the newest debug logs and reports each distinct error message as
/// a sub-finding under the summary outcome.
fn recent_errors_body(debug_dir: PathBuf) -> CheckBody {
    Box::new(move || {
        const NAME: &str = "debug.recent_errors";
        if !debug_dir.exists() {
            return Ok(vec![CheckOutcome::skip(
                NAME,
                "debug directory not found",
                Severity::Medium,
            )
            .with_detail("path", serde_json::json!(debug_dir.display().to_string()))]);
        }

        let files = newest_logs(&debug_dir, LOGS_TO_SCAN)?;
        if files.is_empty() {
            return Ok(vec![CheckOutcome::skip(
                NAME,
                "no debug log files found",
                Severity::Medium,
            )]);
        }

        let last_session = std::fs::read_to_string(&files[0])
            .ok()
            .and_then(|content| {
                let first_line = content.lines().next()?;
                Some(session_ts_re().find(first_line)?.as_str().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string());

        let mut error_counts: HashMap<String, u64> = HashMap::new();
        let mut total_errors: u64 = 0;
        for file in &files {
            let Ok(content) = std::fs::read_to_string(file) else {
                continue;
            };
            for line in content.lines() {
                if !line.contains("[ERROR]") {
                    continue;
                }
                total_errors += 1;
                let message = error_prefix_re().replace(line.trim(), "").into_owned();
                *error_counts.entry(message).or_default() += 1;
            }
        }

        if error_counts.is_empty() {
            return Ok(vec![CheckOutcome::pass(
                NAME,
                format!("no errors in recent debug logs (last session: {last_session})"),
                Severity::Medium,
            )
            .with_detail("last_session", serde_json::json!(last_session))
            .with_detail("logs_checked", serde_json::json!(files.len()))]);
        }

        let mut top: Vec<(String, u64)> = error_counts.into_iter().collect();
        top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let unique_errors = top.len();
        top.truncate(TOP_ERRORS);

        let mut outcomes = vec![CheckOutcome::warn(
            NAME,
            format!(
                "found {total_errors} errors, {unique_errors} types, last: {last_session}"
            ),
            Severity::Medium,
        )
        .with_detail("last_session", serde_json::json!(last_session))
        .with_detail("logs_checked", serde_json::json!(files.len()))
        .with_detail("total_errors", serde_json::json!(total_errors))
        .with_detail("unique_errors", serde_json::json!(unique_errors))];

        for (idx, (message, count)) in top.iter().enumerate() {
            let mut display = format!("{count}\u{00d7} {message}");
            if display.chars().count() > 100 {
                display = display.chars().take(97).collect::<String>() + "...";
            }
            outcomes.push(CheckOutcome::warn(
                format!("{NAME}:error{}", idx + 1),
                display,
                Severity::Medium,
            ));
        }

        Ok(outcomes)
    })
}

/// The `limit` most recently modified `*.txt` logs, newest first.
fn newest_logs(dir: &std::path::Path, limit: usize) -> anyhow::Result<Vec<PathBuf>> {
    let mut files: Vec<(std::time::SystemTime, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("txt") {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        files.push((modified, path));
    }
    files.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(files.into_iter().take(limit).map(|(_, p)| p).collect())
}
