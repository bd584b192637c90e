use crate::output;
use doctor_core::audit::{audit_tool_calls, parse_relative_date};
use doctor_core::paths::ClaudePaths;
use doctor_core::permissions::{load_allow_list, suggest_for_records, PatternSuggestion};
use std::path::Path;

#[derive(serde::Serialize)]
struct SuggestionOutput {
    existing_patterns_count: usize,
    new_patterns_count: usize,
    suggestions: Vec<PatternSuggestion>,
}

pub fn run(
    paths: &ClaudePaths,
    start_date: Option<&str>,
    end_date: Option<&str>,
    projects: Option<&Path>,
    suggest_permissions: bool,
    json: bool,
) -> anyhow::Result<()> {
    let start_date = start_date.map(parse_relative_date).transpose()?;
    let end_date = end_date.map(parse_relative_date).transpose()?;

    let projects_dir = projects
        .map(Path::to_path_buf)
        .unwrap_or_else(|| paths.projects_dir());
    let report = audit_tool_calls(&projects_dir, start_date.as_deref(), end_date.as_deref());

    if suggest_permissions {
        let existing = load_allow_list(&paths.settings());
        let suggestions = suggest_for_records(&report.tool_calls, &existing);
        if json {
            output::print_json(&SuggestionOutput {
                existing_patterns_count: existing.len(),
                new_patterns_count: suggestions.len(),
                suggestions,
            })?;
        } else {
            output::render_suggestions(existing.len(), &suggestions);
        }
    } else if json {
        output::print_json(&report)?;
    } else {
        output::render_audit(&report);
    }

    Ok(())
}
