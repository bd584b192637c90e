use crate::audit::ToolCallRecord;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

// ---------------------------------------------------------------------------
// Allow-list loading
// ---------------------------------------------------------------------------

/// Read `permissions.allow` from the settings document. A missing file,
/// malformed JSON, or an unexpected shape all degrade to an empty set;
/// the matcher then simply permits nothing.
pub fn load_allow_list(settings_path: &Path) -> HashSet<String> {
    let Ok(raw) = fs::read_to_string(settings_path) else {
        return HashSet::new();
    };
    let Ok(settings) = serde_json::from_str::<Value>(&raw) else {
        tracing::warn!(file = %settings_path.display(), "settings file is not valid JSON");
        return HashSet::new();
    };
    settings
        .get("permissions")
        .and_then(|p| p.get("allow"))
        .and_then(Value::as_array)
        .map(|patterns| {
            patterns
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Wildcard matching
// ---------------------------------------------------------------------------

/// Anchored match where `*` is the only metacharacter and matches any
/// substring. Deliberately not a regex: command text flows in here
/// unescaped, and the grammar must stay closed.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == text;
    }
    let segments: Vec<&str> = pattern.split('*').collect();
    let first = segments[0];
    let last = segments[segments.len() - 1];

    if !text.starts_with(first) {
        return false;
    }
    let mut pos = first.len();
    for seg in &segments[1..segments.len() - 1] {
        if seg.is_empty() {
            continue;
        }
        match text[pos..].find(seg) {
            Some(i) => pos = pos + i + seg.len(),
            None => return false,
        }
    }
    if last.is_empty() {
        // Trailing '*' swallows the rest.
        return true;
    }
    text.len() >= pos + last.len() && text.ends_with(last)
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

fn pattern_inner<'a>(pattern: &'a str, tool_name: &str) -> Option<&'a str> {
    pattern
        .strip_prefix(tool_name)?
        .strip_prefix('(')?
        .strip_suffix(')')
}

/// Decide whether an existing allow-list already covers a tool call.
pub fn is_permitted(tool_name: &str, key_params: &str, patterns: &HashSet<String>) -> bool {
    if patterns.contains(tool_name) {
        return true;
    }

    if tool_name == "Bash" && !key_params.is_empty() {
        for pattern in patterns {
            let Some(expr) = pattern_inner(pattern, "Bash") else {
                continue;
            };
            if let Some(prefix) = expr.strip_suffix(":*") {
                if key_params == prefix || key_params.starts_with(&format!("{prefix} ")) {
                    return true;
                }
            } else if expr.contains('*') {
                if wildcard_match(expr, key_params) {
                    return true;
                }
            } else if expr == key_params {
                return true;
            }
        }
    } else if matches!(tool_name, "Read" | "Write" | "Edit") && !key_params.is_empty() {
        for pattern in patterns {
            let Some(inner) = pattern_inner(pattern, tool_name) else {
                continue;
            };
            if let Some(base) = inner.strip_suffix("/**") {
                // Patterns spell absolute paths with a doubled slash
                // (`Read(//Users/alice/**)`); collapse it before comparing.
                let base = if base.starts_with("//") {
                    &base[1..]
                } else {
                    base
                };
                if key_params == base || key_params.starts_with(&format!("{base}/")) {
                    return true;
                }
            } else if inner == key_params {
                return true;
            }
        }
    } else if tool_name.starts_with("mcp__") {
        let parts: Vec<&str> = tool_name.split("__").collect();
        if parts.len() >= 2 && patterns.contains(&format!("{}__{}__*", parts[0], parts[1])) {
            return true;
        }
    }

    false
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Commands too generic, too destructive, or too environment-specific to
/// template into an allow-list pattern.
const SKIP_COMMANDS: &[&str] = &[
    "python3", "npx", "for", "mv", "rm", "cp", "pkill", "cd", "curl", "chmod", "source",
];

/// Git subcommands that rewrite or discard state; never suggested.
const SKIP_GIT_SUBCOMMANDS: &[&str] = &["revert", "restore", "push", "checkout", "reset"];

const SKIP_GH_SUBCOMMANDS: &[&str] = &["pr"];

/// Tools whose bare name is the right pattern.
const SIMPLE_TOOLS: &[&str] = &[
    "Glob",
    "Grep",
    "Task",
    "Skill",
    "TodoWrite",
    "WebFetch",
    "WebSearch",
    "AskUserQuestion",
    "NotebookEdit",
];

/// Propose the minimal general pattern covering a not-yet-permitted call,
/// or `None` when the call is too specific or too risky to generalize.
///
/// When fine-grained patterns for a command already exist (say
/// `Bash(git add:*)`), the suggestion stays at subcommand granularity
/// rather than widening to the whole command.
pub fn suggest_pattern(
    tool_name: &str,
    key_params: &str,
    existing_patterns: &HashSet<String>,
) -> Option<String> {
    match tool_name {
        "Bash" => {
            let parts: Vec<&str> = key_params.split_whitespace().collect();
            let Some(&cmd) = parts.first() else {
                return Some("Bash".to_string());
            };
            // Path invocations and variable assignments are one-offs.
            if cmd.contains('/') {
                return None;
            }
            if key_params.contains('=') {
                return None;
            }
            if SKIP_COMMANDS.contains(&cmd) {
                return None;
            }

            let fine_grained_prefix = format!("Bash({cmd} ");
            let has_fine_grained = existing_patterns
                .iter()
                .any(|p| p.starts_with(&fine_grained_prefix));
            if has_fine_grained && parts.len() > 1 {
                // First non-flag token after the command is the subcommand.
                if let Some(&sub) = parts[1..].iter().find(|p| !p.starts_with('-')) {
                    if cmd == "git" && SKIP_GIT_SUBCOMMANDS.contains(&sub) {
                        return None;
                    }
                    if cmd == "gh" && SKIP_GH_SUBCOMMANDS.contains(&sub) {
                        return None;
                    }
                    return Some(format!("Bash({cmd} {sub}:*)"));
                }
            }

            Some(format!("Bash({cmd}:*)"))
        }
        // Edits are always file-specific; templating them is too risky.
        "Edit" => None,
        "Read" | "Write" => {
            if key_params.starts_with("/Users/") {
                let parts: Vec<&str> = key_params.split('/').collect();
                if parts.len() >= 4 {
                    let base = parts[1..4].join("/");
                    return Some(format!("{tool_name}(//{base}/**)"));
                }
            }
            Some(tool_name.to_string())
        }
        t if SIMPLE_TOOLS.contains(&t) => Some(t.to_string()),
        t if t.starts_with("mcp__") => {
            let parts: Vec<&str> = t.split("__").collect();
            if parts.len() >= 2 {
                Some(format!("{}__{}__*", parts[0], parts[1]))
            } else {
                Some(t.to_string())
            }
        }
        t => Some(t.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatternSuggestion {
    pub pattern: String,
    pub usage_count: u64,
}

/// For each record not covered by the existing allow-list, synthesize a
/// pattern and accumulate usage counts per pattern. Suggestions come back
/// sorted by descending count (pattern name breaks ties).
pub fn suggest_for_records(
    records: &[ToolCallRecord],
    existing_patterns: &HashSet<String>,
) -> Vec<PatternSuggestion> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for record in records {
        if is_permitted(&record.tool_name, &record.key_params, existing_patterns) {
            continue;
        }
        let Some(pattern) = suggest_pattern(&record.tool_name, &record.key_params, existing_patterns)
        else {
            continue;
        };
        *counts.entry(pattern).or_default() += record.count;
    }

    let mut suggestions: Vec<PatternSuggestion> = counts
        .into_iter()
        .map(|(pattern, usage_count)| PatternSuggestion {
            pattern,
            usage_count,
        })
        .collect();
    suggestions.sort_by(|a, b| {
        b.usage_count
            .cmp(&a.usage_count)
            .then_with(|| a.pattern.cmp(&b.pattern))
    });
    suggestions
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn patterns(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn record(tool: &str, params: &str, count: u64) -> ToolCallRecord {
        ToolCallRecord {
            tool_name: tool.to_string(),
            key_params: params.to_string(),
            count,
            first_seen: "2026-07-01T00:00:00Z".to_string(),
            last_seen: "2026-07-01T00:00:00Z".to_string(),
            session_count: 1,
        }
    }

    // -- wildcard matcher ----------------------------------------------------

    #[test]
    fn wildcard_exact_without_star() {
        assert!(wildcard_match("git status", "git status"));
        assert!(!wildcard_match("git status", "git status --short"));
    }

    #[test]
    fn wildcard_embedded_star() {
        assert!(wildcard_match("git * --cached", "git diff --cached"));
        assert!(!wildcard_match("git * --cached", "git diff"));
    }

    #[test]
    fn wildcard_is_anchored() {
        assert!(!wildcard_match("npm *", "run npm install"));
        assert!(wildcard_match("npm *", "npm install"));
    }

    #[test]
    fn wildcard_leading_and_multiple_stars() {
        assert!(wildcard_match("*install*", "npm install --save"));
        assert!(wildcard_match("a*b*c", "aXbYc"));
        assert!(!wildcard_match("a*b*c", "acb"));
    }

    #[test]
    fn wildcard_star_matches_empty() {
        assert!(wildcard_match("git*", "git"));
        assert!(wildcard_match("a*c", "ac"));
    }

    #[test]
    fn wildcard_suffix_must_not_overlap_prefix() {
        // "ab" cannot satisfy both the "ab" prefix and "ba" suffix.
        assert!(!wildcard_match("ab*ba", "ab"));
        assert!(wildcard_match("ab*ba", "abba"));
    }

    // -- matcher -------------------------------------------------------------

    #[test]
    fn bare_tool_name_permits_any_params() {
        let pats = patterns(&["Glob"]);
        assert!(is_permitted("Glob", "**/*.rs", &pats));
        assert!(!is_permitted("Grep", "foo", &pats));
    }

    #[test]
    fn bash_prefix_pattern() {
        let pats = patterns(&["Bash(git:*)"]);
        assert!(is_permitted("Bash", "git", &pats));
        assert!(is_permitted("Bash", "git status", &pats));
        // Prefix must stop at a word boundary.
        assert!(!is_permitted("Bash", "gitk", &pats));
    }

    #[test]
    fn bash_subcommand_prefix_pattern() {
        let pats = patterns(&["Bash(git add:*)"]);
        assert!(is_permitted("Bash", "git add", &pats));
        assert!(is_permitted("Bash", "git add -A", &pats));
        assert!(!is_permitted("Bash", "git commit -m x", &pats));
    }

    #[test]
    fn bash_embedded_wildcard_pattern() {
        let pats = patterns(&["Bash(npm run *)"]);
        assert!(is_permitted("Bash", "npm run build", &pats));
        assert!(!is_permitted("Bash", "npm install", &pats));
    }

    #[test]
    fn bash_exact_pattern() {
        let pats = patterns(&["Bash(ls -la)"]);
        assert!(is_permitted("Bash", "ls -la", &pats));
        assert!(!is_permitted("Bash", "ls -l", &pats));
    }

    #[test]
    fn bash_empty_params_only_matches_bare_name() {
        assert!(!is_permitted("Bash", "", &patterns(&["Bash(git:*)"])));
        assert!(is_permitted("Bash", "", &patterns(&["Bash"])));
    }

    #[test]
    fn path_prefix_pattern_for_file_tools() {
        let pats = patterns(&["Write(//Users/alice/projects/**)"]);
        assert!(is_permitted("Write", "/Users/alice/projects", &pats));
        assert!(is_permitted("Write", "/Users/alice/projects/app/main.go", &pats));
        assert!(!is_permitted("Write", "/Users/alice/other/file", &pats));
        assert!(!is_permitted("Write", "/Users/alice/projectsX", &pats));
        // Pattern is tool-specific.
        assert!(!is_permitted("Read", "/Users/alice/projects/app/main.go", &pats));
    }

    #[test]
    fn exact_path_pattern_for_file_tools() {
        let pats = patterns(&["Read(/etc/hosts)"]);
        assert!(is_permitted("Read", "/etc/hosts", &pats));
        assert!(!is_permitted("Read", "/etc/hostname", &pats));
    }

    #[test]
    fn mcp_namespace_pattern() {
        let pats = patterns(&["mcp__linear__*"]);
        assert!(is_permitted("mcp__linear__create_issue", "", &pats));
        assert!(is_permitted("mcp__linear__list_teams", "x", &pats));
        assert!(!is_permitted("mcp__github__create_issue", "", &pats));
    }

    #[test]
    fn unknown_tool_requires_bare_name() {
        assert!(!is_permitted("CustomTool", "anything", &patterns(&["Other"])));
        assert!(is_permitted("CustomTool", "anything", &patterns(&["CustomTool"])));
    }

    // -- generator -----------------------------------------------------------

    #[test]
    fn bash_plain_command_gets_prefix_pattern() {
        assert_eq!(
            suggest_pattern("Bash", "git status", &HashSet::new()),
            Some("Bash(git:*)".to_string())
        );
    }

    #[test]
    fn bash_empty_command_gets_bare_name() {
        assert_eq!(
            suggest_pattern("Bash", "", &HashSet::new()),
            Some("Bash".to_string())
        );
    }

    #[test]
    fn bash_path_commands_skipped() {
        for cmd in ["/usr/bin/foo x", "./run.sh", "~/bin/tool --opt", "scripts/build arg"] {
            assert_eq!(suggest_pattern("Bash", cmd, &HashSet::new()), None, "{cmd}");
        }
    }

    #[test]
    fn bash_assignment_skipped() {
        assert_eq!(suggest_pattern("Bash", "FOO=bar make", &HashSet::new()), None);
        assert_eq!(
            suggest_pattern("Bash", "git config user.name=x", &HashSet::new()),
            None
        );
    }

    #[test]
    fn bash_deny_listed_commands_skipped() {
        for cmd in ["curl https://example.com", "rm -rf target", "cd /tmp", "source env.sh"] {
            assert_eq!(suggest_pattern("Bash", cmd, &HashSet::new()), None, "{cmd}");
        }
    }

    #[test]
    fn bash_fine_grained_escalates_to_subcommand() {
        let existing = patterns(&["Bash(git add:*)"]);
        assert_eq!(
            suggest_pattern("Bash", "git commit -m msg", &existing),
            Some("Bash(git commit:*)".to_string())
        );
    }

    #[test]
    fn bash_subcommand_skips_leading_flags() {
        let existing = patterns(&["Bash(git add:*)"]);
        assert_eq!(
            suggest_pattern("Bash", "git --no-pager log", &existing),
            Some("Bash(git log:*)".to_string())
        );
    }

    #[test]
    fn bash_sensitive_git_subcommands_skipped() {
        let existing = patterns(&["Bash(git add:*)"]);
        for sub in ["push", "reset", "checkout", "revert", "restore"] {
            assert_eq!(
                suggest_pattern("Bash", &format!("git {sub} origin"), &existing),
                None,
                "{sub}"
            );
        }
    }

    #[test]
    fn bash_gh_pr_skipped() {
        let existing = patterns(&["Bash(gh issue:*)"]);
        assert_eq!(suggest_pattern("Bash", "gh pr create", &existing), None);
        assert_eq!(
            suggest_pattern("Bash", "gh api /repos", &existing),
            Some("Bash(gh api:*)".to_string())
        );
    }

    #[test]
    fn bash_without_fine_grained_stays_coarse() {
        let existing = patterns(&["Bash(npm:*)"]);
        assert_eq!(
            suggest_pattern("Bash", "git commit -m msg", &existing),
            Some("Bash(git:*)".to_string())
        );
    }

    #[test]
    fn bash_fine_grained_but_only_flags_falls_back_to_coarse() {
        let existing = patterns(&["Bash(git add:*)"]);
        assert_eq!(
            suggest_pattern("Bash", "git --version", &existing),
            Some("Bash(git:*)".to_string())
        );
    }

    #[test]
    fn edit_never_suggested() {
        assert_eq!(
            suggest_pattern("Edit", "/Users/alice/projects/app/main.go", &HashSet::new()),
            None
        );
    }

    #[test]
    fn write_home_path_gets_three_segment_prefix() {
        assert_eq!(
            suggest_pattern("Write", "/Users/alice/projects/app/main.go", &HashSet::new()),
            Some("Write(//Users/alice/projects/**)".to_string())
        );
    }

    #[test]
    fn read_non_home_path_gets_bare_name() {
        assert_eq!(
            suggest_pattern("Read", "/etc/hosts", &HashSet::new()),
            Some("Read".to_string())
        );
    }

    #[test]
    fn read_short_home_path_gets_bare_name() {
        assert_eq!(
            suggest_pattern("Read", "/Users/alice", &HashSet::new()),
            Some("Read".to_string())
        );
    }

    #[test]
    fn simple_tools_map_to_bare_names() {
        for tool in SIMPLE_TOOLS {
            assert_eq!(
                suggest_pattern(tool, "whatever", &HashSet::new()),
                Some(tool.to_string())
            );
        }
    }

    #[test]
    fn mcp_tools_map_to_namespace_wildcard() {
        assert_eq!(
            suggest_pattern("mcp__linear__create_issue", "", &HashSet::new()),
            Some("mcp__linear__*".to_string())
        );
    }

    #[test]
    fn unknown_tool_maps_to_bare_name() {
        assert_eq!(
            suggest_pattern("SomeNewTool", "x", &HashSet::new()),
            Some("SomeNewTool".to_string())
        );
    }

    // -- matcher/generator consistency ---------------------------------------

    #[test]
    fn suggested_pattern_permits_the_call() {
        let cases: &[(&str, &str)] = &[
            ("Bash", "git status"),
            ("Bash", "cargo build --release"),
            ("Write", "/Users/alice/projects/app/main.go"),
            ("Read", "/etc/hosts"),
            ("Glob", "**/*.rs"),
            ("mcp__linear__create_issue", ""),
            ("SomeNewTool", "x"),
        ];
        for (tool, params) in cases {
            let existing = HashSet::new();
            let Some(pattern) = suggest_pattern(tool, params, &existing) else {
                panic!("expected a suggestion for {tool} {params}");
            };
            let updated = patterns(&[pattern.as_str()]);
            assert!(
                is_permitted(tool, params, &updated),
                "{tool} {params} not permitted by suggested {pattern}"
            );
        }
    }

    #[test]
    fn subcommand_suggestion_permits_the_call() {
        let existing = patterns(&["Bash(git add:*)"]);
        let pattern = suggest_pattern("Bash", "git commit -m msg", &existing).unwrap();
        assert_eq!(pattern, "Bash(git commit:*)");
        let mut updated = existing.clone();
        updated.insert(pattern);
        assert!(is_permitted("Bash", "git commit -m msg", &updated));
    }

    // -- aggregation ---------------------------------------------------------

    #[test]
    fn aggregation_accumulates_counts_per_pattern() {
        let records = vec![
            record("Bash", "git status", 10),
            record("Bash", "git log --oneline", 5),
            record("Bash", "cargo build", 3),
            record("Glob", "**/*.rs", 2),
        ];
        let suggestions = suggest_for_records(&records, &HashSet::new());
        assert_eq!(
            suggestions,
            vec![
                PatternSuggestion {
                    pattern: "Bash(git:*)".to_string(),
                    usage_count: 15
                },
                PatternSuggestion {
                    pattern: "Bash(cargo:*)".to_string(),
                    usage_count: 3
                },
                PatternSuggestion {
                    pattern: "Glob".to_string(),
                    usage_count: 2
                },
            ]
        );
    }

    #[test]
    fn aggregation_skips_permitted_and_unsuggestable_calls() {
        let existing = patterns(&["Bash(git:*)"]);
        let records = vec![
            record("Bash", "git status", 10),              // already permitted
            record("Bash", "curl https://example.com", 9), // deny-listed
            record("Bash", "cargo build", 1),
        ];
        let suggestions = suggest_for_records(&records, &existing);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].pattern, "Bash(cargo:*)");
    }

    #[test]
    fn aggregation_ties_break_by_pattern_name() {
        let records = vec![record("Grep", "x", 2), record("Glob", "y", 2)];
        let suggestions = suggest_for_records(&records, &HashSet::new());
        assert_eq!(suggestions[0].pattern, "Glob");
        assert_eq!(suggestions[1].pattern, "Grep");
    }

    // -- allow-list loading --------------------------------------------------

    #[test]
    fn load_allow_list_reads_patterns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"permissions": {"allow": ["Bash(git:*)", "Glob"]}}"#,
        )
        .unwrap();
        let allow = load_allow_list(&path);
        assert_eq!(allow, patterns(&["Bash(git:*)", "Glob"]));
    }

    #[test]
    fn load_allow_list_degrades_to_empty() {
        let dir = TempDir::new().unwrap();

        // Missing file
        assert!(load_allow_list(&dir.path().join("absent.json")).is_empty());

        // Malformed JSON
        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{not json").unwrap();
        assert!(load_allow_list(&bad).is_empty());

        // Wrong shape
        let shape = dir.path().join("shape.json");
        fs::write(&shape, r#"{"permissions": {"allow": "oops"}}"#).unwrap();
        assert!(load_allow_list(&shape).is_empty());
    }
}
