use crate::error::{DoctorError, Result};
use chrono::{Months, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// ToolCall / ToolCallRecord / ToolAuditReport
// ---------------------------------------------------------------------------

/// One tool invocation recovered from a conversation transcript.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCall {
    pub tool_name: String,
    pub timestamp: String,
    pub key_params: String,
    pub session_id: String,
    pub was_approved: bool,
}

/// Deduplicated, aggregated view of one distinct invocation shape.
/// Consumed read-only by the permission-pattern engine.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub key_params: String,
    pub count: u64,
    pub first_seen: String,
    pub last_seen: String,
    pub session_count: usize,
}

#[derive(Debug, Serialize)]
pub struct ToolAuditReport {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub total_conversations: usize,
    pub total_tool_calls: usize,
    pub unique_tool_calls: usize,
    pub tool_calls: Vec<ToolCallRecord>,
}

// ---------------------------------------------------------------------------
// Key-parameter extraction
// ---------------------------------------------------------------------------

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

/// Reduce a tool's input to the one parameter that identifies the
/// invocation shape.
pub fn extract_key_params(tool_name: &str, input: &Value) -> String {
    let str_field = |key: &str| {
        input
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string()
    };
    match tool_name {
        "Bash" => truncate(&str_field("command"), 100),
        "Edit" | "Write" | "Read" => str_field("file_path"),
        "Glob" | "Grep" => str_field("pattern"),
        "Task" => str_field("subagent_type"),
        "Skill" => str_field("skill"),
        _ => {
            let Some(obj) = input.as_object() else {
                return String::new();
            };
            let Some((key, value)) = obj.iter().next() else {
                return String::new();
            };
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            truncate(&format!("{key}={value}"), 50)
        }
    }
}

// ---------------------------------------------------------------------------
// Transcript parsing
// ---------------------------------------------------------------------------

struct PendingUse {
    name: String,
    input: Value,
    timestamp: String,
    session_id: String,
}

fn content_items(entry: &Value) -> Vec<&serde_json::Map<String, Value>> {
    // Legacy transcripts store content as a plain string; those carry no
    // tool blocks and are skipped.
    entry
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_object).collect())
        .unwrap_or_default()
}

/// Parse one JSONL conversation transcript into tool calls. Malformed
/// lines are skipped; an unreadable file logs a warning and yields
/// nothing.
pub fn parse_transcript(path: &Path) -> Vec<ToolCall> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(file = %path.display(), error = %e, "cannot read transcript");
            return Vec::new();
        }
    };

    let mut calls = Vec::new();
    let mut pending: HashMap<String, PendingUse> = HashMap::new();

    for line in content.lines() {
        let Ok(entry) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        match entry.get("type").and_then(Value::as_str) {
            Some("assistant") => {
                let timestamp = entry
                    .get("timestamp")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                let session_id = entry
                    .get("sessionId")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                for item in content_items(&entry) {
                    if item.get("type").and_then(Value::as_str) != Some("tool_use") {
                        continue;
                    }
                    let (Some(id), Some(name)) = (
                        item.get("id").and_then(Value::as_str),
                        item.get("name").and_then(Value::as_str),
                    ) else {
                        continue;
                    };
                    pending.insert(
                        id.to_string(),
                        PendingUse {
                            name: name.to_string(),
                            input: item.get("input").cloned().unwrap_or(Value::Null),
                            timestamp: timestamp.clone(),
                            session_id: session_id.clone(),
                        },
                    );
                }
            }
            Some("user") => {
                for item in content_items(&entry) {
                    if item.get("type").and_then(Value::as_str) != Some("tool_result") {
                        continue;
                    }
                    let Some(use_id) = item.get("tool_use_id").and_then(Value::as_str) else {
                        continue;
                    };
                    // A call counts as approved unless the result failed and
                    // its content names a user refusal.
                    let success = entry
                        .get("toolUseResult")
                        .and_then(|r| r.get("success"))
                        .and_then(Value::as_bool)
                        .unwrap_or(true);
                    let mut was_approved = true;
                    if !success {
                        let text = item.get("content").map(Value::to_string).unwrap_or_default();
                        if text.contains("doesn't want to proceed")
                            || text.to_lowercase().contains("denied")
                        {
                            was_approved = false;
                        }
                    }
                    if let Some(info) = pending.get(use_id) {
                        calls.push(ToolCall {
                            tool_name: info.name.clone(),
                            timestamp: info.timestamp.clone(),
                            key_params: extract_key_params(&info.name, &info.input),
                            session_id: info.session_id.clone(),
                            was_approved,
                        });
                    }
                }
            }
            _ => {}
        }
    }

    calls
}

fn collect_transcripts(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_transcripts(&path, out);
        } else if path.extension().is_some_and(|e| e == "jsonl") {
            out.push(path);
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Walk every `*.jsonl` transcript under `projects_dir`, keep approved
/// calls inside the date window, and aggregate them into distinct
/// invocation shapes sorted by descending count.
///
/// Dates are `YYYY-MM-DD` strings compared against the date prefix of each
/// call's timestamp.
pub fn audit_tool_calls(
    projects_dir: &Path,
    start_date: Option<&str>,
    end_date: Option<&str>,
) -> ToolAuditReport {
    let mut files = Vec::new();
    collect_transcripts(projects_dir, &mut files);
    files.sort();

    let mut kept: Vec<ToolCall> = Vec::new();
    for file in &files {
        for call in parse_transcript(file) {
            if !call.was_approved {
                continue;
            }
            if start_date.is_some() || end_date.is_some() {
                let call_date = match call.timestamp.split_once('T') {
                    Some((date, _)) => date,
                    None => "",
                };
                if start_date.is_some_and(|s| call_date < s) {
                    continue;
                }
                if end_date.is_some_and(|e| call_date > e) {
                    continue;
                }
            }
            kept.push(call);
        }
    }

    struct Accum {
        record: ToolCallRecord,
        sessions: HashSet<String>,
    }

    let mut order: Vec<String> = Vec::new();
    let mut unique: HashMap<String, Accum> = HashMap::new();
    for call in &kept {
        let key = format!("{}:{}", call.tool_name, call.key_params);
        match unique.get_mut(&key) {
            Some(acc) => {
                acc.record.count += 1;
                acc.sessions.insert(call.session_id.clone());
                if call.timestamp < acc.record.first_seen {
                    acc.record.first_seen = call.timestamp.clone();
                }
                if call.timestamp > acc.record.last_seen {
                    acc.record.last_seen = call.timestamp.clone();
                }
            }
            None => {
                order.push(key.clone());
                unique.insert(
                    key,
                    Accum {
                        record: ToolCallRecord {
                            tool_name: call.tool_name.clone(),
                            key_params: call.key_params.clone(),
                            count: 1,
                            first_seen: call.timestamp.clone(),
                            last_seen: call.timestamp.clone(),
                            session_count: 0,
                        },
                        sessions: HashSet::from([call.session_id.clone()]),
                    },
                );
            }
        }
    }

    let mut records: Vec<ToolCallRecord> = order
        .iter()
        .filter_map(|key| unique.remove(key))
        .map(|acc| {
            let mut record = acc.record;
            record.session_count = acc.sessions.len();
            record
        })
        .collect();
    records.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.tool_name.cmp(&b.tool_name))
            .then_with(|| a.key_params.cmp(&b.key_params))
    });

    ToolAuditReport {
        start_date: start_date.map(str::to_string),
        end_date: end_date.map(str::to_string),
        total_conversations: files.len(),
        total_tool_calls: kept.len(),
        unique_tool_calls: records.len(),
        tool_calls: records,
    }
}

// ---------------------------------------------------------------------------
// Relative date parsing
// ---------------------------------------------------------------------------

static ABSOLUTE_RE: OnceLock<Regex> = OnceLock::new();
static RELATIVE_RE: OnceLock<Regex> = OnceLock::new();

fn absolute_re() -> &'static Regex {
    ABSOLUTE_RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap())
}

fn relative_re() -> &'static Regex {
    RELATIVE_RE.get_or_init(|| Regex::new(r"^-(\d+)([MhDdwmy])$").unwrap())
}

/// Resolve a date argument to `YYYY-MM-DD`.
///
/// Absolute dates pass through. Relative offsets count back from now:
/// `-30M` (minutes), `-12h`, `-7d`, `-2w`, `-1m` (months), `-1y`.
pub fn parse_relative_date(expr: &str) -> Result<String> {
    if absolute_re().is_match(expr) {
        return Ok(expr.to_string());
    }
    let caps = relative_re()
        .captures(expr)
        .ok_or_else(|| DoctorError::InvalidDateExpr(expr.to_string()))?;
    let amount: u32 = caps[1]
        .parse()
        .map_err(|_| DoctorError::InvalidDateExpr(expr.to_string()))?;

    let now = Utc::now();
    let target = match &caps[2] {
        "M" => now - chrono::Duration::minutes(i64::from(amount)),
        "h" => now - chrono::Duration::hours(i64::from(amount)),
        "d" | "D" => now - chrono::Duration::days(i64::from(amount)),
        "w" => now - chrono::Duration::weeks(i64::from(amount)),
        "m" => now
            .checked_sub_months(Months::new(amount))
            .ok_or_else(|| DoctorError::InvalidDateExpr(expr.to_string()))?,
        "y" => now
            .checked_sub_months(Months::new(amount.saturating_mul(12)))
            .ok_or_else(|| DoctorError::InvalidDateExpr(expr.to_string()))?,
        _ => unreachable!("unit constrained by regex"),
    };
    Ok(target.format("%Y-%m-%d").to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
