use crate::registry::{CheckOutcome, FixAction, RegisteredCheck};
use crate::types::{CheckStatus, Severity};
use serde::Serialize;
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::process::Command;

pub const FIXED_MARKER: &str = " (automatically fixed)";

// ---------------------------------------------------------------------------
// Run pass
// ---------------------------------------------------------------------------

/// Run `checks` in resolved order and collect every outcome produced.
///
/// A check whose dependency sits in the skipped set is not invoked; it gets
/// a synthetic `skip` outcome and itself joins the skipped set. A check
/// joins the skipped set after running only when the outcome named exactly
/// like its descriptor failed *and* the descriptor severity is `Critical`.
/// Failures at any other severity leave dependents free to run.
pub fn run(checks: &[&RegisteredCheck]) -> Vec<CheckOutcome> {
    let mut outcomes: Vec<CheckOutcome> = Vec::new();
    let mut skipped: HashSet<&str> = HashSet::new();

    for check in checks {
        let desc = &check.descriptor;
        if desc
            .depends_on
            .iter()
            .any(|dep| skipped.contains(dep.as_str()))
        {
            tracing::debug!(check = %desc.name, "skipping: dependency failed");
            outcomes.push(CheckOutcome::skip(
                &desc.name,
                "skipped due to failed dependency",
                desc.severity,
            ));
            skipped.insert(desc.name.as_str());
            continue;
        }

        tracing::debug!(check = %desc.name, "running check");
        let results = invoke(check);

        let own_failure = results
            .iter()
            .any(|o| o.status == CheckStatus::Fail && o.name == desc.name);
        if own_failure && desc.severity == Severity::Critical {
            skipped.insert(desc.name.as_str());
        }

        outcomes.extend(results);
    }

    outcomes
}

/// Invoke a check body behind a failure boundary. Errors and panics become
/// `fail` outcomes; a single misbehaving check never aborts the run.
fn invoke(check: &RegisteredCheck) -> Vec<CheckOutcome> {
    let desc = &check.descriptor;
    match catch_unwind(AssertUnwindSafe(|| (check.body)())) {
        Ok(Ok(results)) => results,
        Ok(Err(err)) => {
            tracing::warn!(check = %desc.name, error = %err, "check raised error");
            vec![CheckOutcome::fail(
                &desc.name,
                format!("check raised error: {err:#}"),
                desc.severity,
            )
            .with_detail("error", serde_json::json!(format!("{err:#}")))]
        }
        Err(panic) => {
            let msg = panic_message(&panic);
            tracing::warn!(check = %desc.name, panic = %msg, "check panicked");
            vec![CheckOutcome::fail(
                &desc.name,
                format!("check panicked: {msg}"),
                desc.severity,
            )
            .with_detail("panic", serde_json::json!(msg))]
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(inner) = panic.downcast_ref::<Box<dyn std::any::Any + Send>>() {
        panic_message(inner.as_ref())
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Apply-fixes pass
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixMode {
    /// Report what would be done; outcomes are left untouched.
    DryRun,
    /// Execute fixes and flip successfully fixed outcomes to `pass`.
    Apply,
}

#[derive(Debug, Clone, Serialize)]
pub struct FixFailure {
    pub name: String,
    pub reason: String,
}

/// Diagnostic record of a fix pass. The report shape is unaffected by
/// fixes; failures are surfaced here and through logging only.
#[derive(Debug, Default, Serialize)]
pub struct FixSummary {
    pub planned: Vec<String>,
    pub fixed: Vec<String>,
    pub failed: Vec<FixFailure>,
}

/// Apply fixes to every `fail`/`warn` outcome that carries one, in
/// severity order (critical first). Runs strictly after the dependency-
/// ordered pass; nothing here re-enters resolution. Already-passing
/// outcomes are never touched, so a second pass is a no-op.
pub fn apply_fixes(outcomes: &mut [CheckOutcome], mode: FixMode) -> FixSummary {
    let mut summary = FixSummary::default();

    let mut candidates: Vec<usize> = outcomes
        .iter()
        .enumerate()
        .filter(|(_, o)| {
            matches!(o.status, CheckStatus::Fail | CheckStatus::Warn) && o.fix.is_some()
        })
        .map(|(i, _)| i)
        .collect();
    // Stable sort: severity weight descending, production order within a tier.
    candidates.sort_by(|&a, &b| {
        outcomes[b]
            .severity
            .weight()
            .cmp(&outcomes[a].severity.weight())
    });

    for i in candidates {
        let Some(fix) = outcomes[i].fix.as_ref() else {
            continue;
        };

        if mode == FixMode::DryRun {
            tracing::info!(check = %outcomes[i].name, fix = %fix.describe(), "would apply fix");
            summary.planned.push(outcomes[i].name.clone());
            continue;
        }

        tracing::info!(check = %outcomes[i].name, fix = %fix.describe(), "applying fix");
        match execute_fix(fix) {
            Ok(()) => {
                let outcome = &mut outcomes[i];
                outcome.status = CheckStatus::Pass;
                outcome.message.push_str(FIXED_MARKER);
                summary.fixed.push(outcome.name.clone());
            }
            Err(reason) => {
                tracing::warn!(check = %outcomes[i].name, reason = %reason, "fix failed");
                summary.failed.push(FixFailure {
                    name: outcomes[i].name.clone(),
                    reason,
                });
            }
        }
    }

    summary
}

fn execute_fix(fix: &FixAction) -> std::result::Result<(), String> {
    match fix {
        FixAction::Command(argv) => {
            let Some((program, args)) = argv.split_first() else {
                return Err("empty fix argv".to_string());
            };
            // Direct argv execution, never through a shell.
            match Command::new(program).args(args).output() {
                Ok(output) if output.status.success() => Ok(()),
                Ok(output) => {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    Err(format!(
                        "exit status {}: {}",
                        output.status,
                        stderr.trim().chars().take(200).collect::<String>()
                    ))
                }
                Err(e) => Err(format!("failed to spawn '{program}': {e}")),
            }
        }
        FixAction::Callback(callback) => {
            match catch_unwind(AssertUnwindSafe(callback)) {
                Ok(true) => Ok(()),
                Ok(false) => Err("fix callback returned false".to_string()),
                Err(_) => Err("fix callback panicked".to_string()),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{CheckBody, CheckDescriptor, Registry};
    use crate::resolver;

    fn outcome_body(status: CheckStatus, name: &str, severity: Severity) -> CheckBody {
        let name = name.to_string();
        Box::new(move || Ok(vec![CheckOutcome::new(&name, status, "test", severity)]))
    }

    fn run_registry(reg: &Registry) -> Vec<CheckOutcome> {
        let filtered = reg.filter(None).unwrap();
        let ordered = resolver::resolve(&filtered).unwrap();
        run(&ordered)
    }

    fn status_of<'a>(outcomes: &'a [CheckOutcome], name: &str) -> &'a CheckOutcome {
        outcomes.iter().find(|o| o.name == name).unwrap()
    }

    #[test]
    fn critical_failure_skips_dependents() {
        let mut reg = Registry::new();
        reg.register(
            CheckDescriptor::new("t.a", "t", Severity::Critical, ""),
            outcome_body(CheckStatus::Fail, "t.a", Severity::Critical),
        )
        .unwrap();
        reg.register(
            CheckDescriptor::new("t.b", "t", Severity::Low, "").depends_on(["t.a"]),
            outcome_body(CheckStatus::Pass, "t.b", Severity::Low),
        )
        .unwrap();

        let outcomes = run_registry(&reg);
        assert_eq!(status_of(&outcomes, "t.a").status, CheckStatus::Fail);
        let b = status_of(&outcomes, "t.b");
        assert_eq!(b.status, CheckStatus::Skip);
        assert_eq!(b.message, "skipped due to failed dependency");
    }

    #[test]
    fn high_severity_failure_does_not_skip_dependents() {
        let mut reg = Registry::new();
        reg.register(
            CheckDescriptor::new("t.a", "t", Severity::High, ""),
            outcome_body(CheckStatus::Fail, "t.a", Severity::High),
        )
        .unwrap();
        reg.register(
            CheckDescriptor::new("t.b", "t", Severity::Critical, "").depends_on(["t.a"]),
            outcome_body(CheckStatus::Pass, "t.b", Severity::Critical),
        )
        .unwrap();

        let outcomes = run_registry(&reg);
        assert_eq!(status_of(&outcomes, "t.b").status, CheckStatus::Pass);
    }

    #[test]
    fn skip_propagates_transitively() {
        let mut reg = Registry::new();
        reg.register(
            CheckDescriptor::new("t.a", "t", Severity::Critical, ""),
            outcome_body(CheckStatus::Fail, "t.a", Severity::Critical),
        )
        .unwrap();
        reg.register(
            CheckDescriptor::new("t.b", "t", Severity::Medium, "").depends_on(["t.a"]),
            outcome_body(CheckStatus::Pass, "t.b", Severity::Medium),
        )
        .unwrap();
        reg.register(
            CheckDescriptor::new("t.c", "t", Severity::Medium, "").depends_on(["t.b"]),
            outcome_body(CheckStatus::Pass, "t.c", Severity::Medium),
        )
        .unwrap();

        let outcomes = run_registry(&reg);
        assert_eq!(status_of(&outcomes, "t.b").status, CheckStatus::Skip);
        assert_eq!(status_of(&outcomes, "t.c").status, CheckStatus::Skip);
    }

    #[test]
    fn critical_warn_does_not_skip_dependents() {
        let mut reg = Registry::new();
        reg.register(
            CheckDescriptor::new("t.a", "t", Severity::Critical, ""),
            outcome_body(CheckStatus::Warn, "t.a", Severity::Critical),
        )
        .unwrap();
        reg.register(
            CheckDescriptor::new("t.b", "t", Severity::Medium, "").depends_on(["t.a"]),
            outcome_body(CheckStatus::Pass, "t.b", Severity::Medium),
        )
        .unwrap();

        let outcomes = run_registry(&reg);
        assert_eq!(status_of(&outcomes, "t.b").status, CheckStatus::Pass);
    }

    #[test]
    fn sub_finding_failure_does_not_propagate() {
        // Only the outcome named after the descriptor counts; a failing
        // sub-finding from a critical check must not suppress dependents.
        let mut reg = Registry::new();
        reg.register(
            CheckDescriptor::new("t.a", "t", Severity::Critical, ""),
            Box::new(|| {
                Ok(vec![
                    CheckOutcome::pass("t.a", "ok overall", Severity::Critical),
                    CheckOutcome::fail("t.a:sub1", "one finding", Severity::Critical),
                ])
            }),
        )
        .unwrap();
        reg.register(
            CheckDescriptor::new("t.b", "t", Severity::Medium, "").depends_on(["t.a"]),
            outcome_body(CheckStatus::Pass, "t.b", Severity::Medium),
        )
        .unwrap();

        let outcomes = run_registry(&reg);
        assert_eq!(outcomes.len(), 3);
        assert_eq!(status_of(&outcomes, "t.b").status, CheckStatus::Pass);
    }

    #[test]
    fn body_error_becomes_fail_outcome() {
        let mut reg = Registry::new();
        reg.register(
            CheckDescriptor::new("t.a", "t", Severity::High, ""),
            Box::new(|| anyhow::bail!("disk on fire")),
        )
        .unwrap();
        reg.register(
            CheckDescriptor::new("t.b", "t", Severity::Low, ""),
            outcome_body(CheckStatus::Pass, "t.b", Severity::Low),
        )
        .unwrap();

        let outcomes = run_registry(&reg);
        let a = status_of(&outcomes, "t.a");
        assert_eq!(a.status, CheckStatus::Fail);
        assert!(a.message.contains("disk on fire"));
        assert!(a.details.contains_key("error"));
        // The run continued past the fault.
        assert_eq!(status_of(&outcomes, "t.b").status, CheckStatus::Pass);
    }

    #[test]
    fn body_panic_becomes_fail_outcome() {
        let mut reg = Registry::new();
        reg.register(
            CheckDescriptor::new("t.a", "t", Severity::Medium, ""),
            Box::new(|| panic!("boom")),
        )
        .unwrap();

        let outcomes = run_registry(&reg);
        let a = status_of(&outcomes, "t.a");
        assert_eq!(a.status, CheckStatus::Fail);
        assert!(a.message.contains("boom"));
    }

    #[test]
    fn erroring_critical_check_skips_dependents() {
        let mut reg = Registry::new();
        reg.register(
            CheckDescriptor::new("t.a", "t", Severity::Critical, ""),
            Box::new(|| anyhow::bail!("nope")),
        )
        .unwrap();
        reg.register(
            CheckDescriptor::new("t.b", "t", Severity::Low, "").depends_on(["t.a"]),
            outcome_body(CheckStatus::Pass, "t.b", Severity::Low),
        )
        .unwrap();

        let outcomes = run_registry(&reg);
        assert_eq!(status_of(&outcomes, "t.b").status, CheckStatus::Skip);
    }

    // -- apply_fixes --------------------------------------------------------

    #[test]
    fn dry_run_reports_without_modifying() {
        let mut outcomes = vec![
            CheckOutcome::fail("t.a", "bad", Severity::High).with_fix(FixAction::command(["true"])),
        ];
        let summary = apply_fixes(&mut outcomes, FixMode::DryRun);
        assert_eq!(summary.planned, vec!["t.a"]);
        assert!(summary.fixed.is_empty());
        assert_eq!(outcomes[0].status, CheckStatus::Fail);
        assert_eq!(outcomes[0].message, "bad");
    }

    #[test]
    fn command_fix_success_flips_to_pass() {
        let mut outcomes = vec![
            CheckOutcome::fail("t.a", "bad", Severity::High).with_fix(FixAction::command(["true"])),
        ];
        let summary = apply_fixes(&mut outcomes, FixMode::Apply);
        assert_eq!(summary.fixed, vec!["t.a"]);
        assert_eq!(outcomes[0].status, CheckStatus::Pass);
        assert!(outcomes[0].message.ends_with(FIXED_MARKER));
    }

    #[test]
    fn command_fix_failure_leaves_outcome_unchanged() {
        let mut outcomes = vec![
            CheckOutcome::warn("t.a", "iffy", Severity::Medium)
                .with_fix(FixAction::command(["false"])),
        ];
        let summary = apply_fixes(&mut outcomes, FixMode::Apply);
        assert!(summary.fixed.is_empty());
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].name, "t.a");
        assert_eq!(outcomes[0].status, CheckStatus::Warn);
        assert_eq!(outcomes[0].message, "iffy");
    }

    #[test]
    fn callback_fix_success_and_failure() {
        let mut outcomes = vec![
            CheckOutcome::fail("t.yes", "bad", Severity::Low)
                .with_fix(FixAction::Callback(Box::new(|| true))),
            CheckOutcome::fail("t.no", "bad", Severity::Low)
                .with_fix(FixAction::Callback(Box::new(|| false))),
        ];
        let summary = apply_fixes(&mut outcomes, FixMode::Apply);
        assert_eq!(summary.fixed, vec!["t.yes"]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(outcomes[0].status, CheckStatus::Pass);
        assert_eq!(outcomes[1].status, CheckStatus::Fail);
    }

    #[test]
    fn fix_pass_is_idempotent() {
        let mut outcomes = vec![
            CheckOutcome::fail("t.a", "bad", Severity::High).with_fix(FixAction::command(["true"])),
        ];
        apply_fixes(&mut outcomes, FixMode::Apply);
        let message_after_first = outcomes[0].message.clone();

        let second = apply_fixes(&mut outcomes, FixMode::Apply);
        assert!(second.planned.is_empty());
        assert!(second.fixed.is_empty());
        assert!(second.failed.is_empty());
        assert_eq!(outcomes[0].message, message_after_first);
    }

    #[test]
    fn pass_and_skip_outcomes_are_never_fixed() {
        let mut outcomes = vec![
            CheckOutcome::pass("t.a", "fine", Severity::High)
                .with_fix(FixAction::command(["false"])),
            CheckOutcome::skip("t.b", "skipped", Severity::High)
                .with_fix(FixAction::command(["false"])),
        ];
        let summary = apply_fixes(&mut outcomes, FixMode::Apply);
        assert!(summary.planned.is_empty() && summary.fixed.is_empty() && summary.failed.is_empty());
    }

    #[test]
    fn fixes_apply_in_severity_order() {
        let mut outcomes = vec![
            CheckOutcome::fail("t.low", "bad", Severity::Low).with_fix(FixAction::command(["true"])),
            CheckOutcome::fail("t.crit", "bad", Severity::Critical)
                .with_fix(FixAction::command(["true"])),
        ];
        let summary = apply_fixes(&mut outcomes, FixMode::Apply);
        assert_eq!(summary.fixed, vec!["t.crit", "t.low"]);
    }

    #[test]
    fn empty_argv_is_a_recorded_failure() {
        let mut outcomes = vec![
            CheckOutcome::fail("t.a", "bad", Severity::Low)
                .with_fix(FixAction::Command(Vec::new())),
        ];
        let summary = apply_fixes(&mut outcomes, FixMode::Apply);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(outcomes[0].status, CheckStatus::Fail);
    }
}
