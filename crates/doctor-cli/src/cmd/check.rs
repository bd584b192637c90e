use crate::output;
use doctor_core::engine::{self, FixMode};
use doctor_core::paths::ClaudePaths;
use doctor_core::registry::Registry;
use doctor_core::report::DiagnosticReport;
use doctor_core::{builtin, resolver};

pub fn run(
    paths: &ClaudePaths,
    filter: Option<&str>,
    fix: bool,
    dry_run: bool,
    json: bool,
) -> anyhow::Result<()> {
    let mut registry = Registry::new();
    builtin::register_all(&mut registry, paths)?;

    let selected = registry.filter(filter)?;
    if selected.is_empty() {
        match filter {
            Some(pattern) => anyhow::bail!("no checks match filter: {pattern}"),
            None => anyhow::bail!("no checks registered"),
        }
    }

    let ordered = resolver::resolve(&selected)?;
    let mut outcomes = engine::run(&ordered);

    let fix_summary = if fix {
        let mode = if dry_run { FixMode::DryRun } else { FixMode::Apply };
        Some(engine::apply_fixes(&mut outcomes, mode))
    } else {
        None
    };

    let report = DiagnosticReport::new(outcomes);

    if json {
        output::print_json(&report)?;
    } else {
        output::render_report(&report);
        if let Some(summary) = &fix_summary {
            for name in &summary.planned {
                let fix = report
                    .outcomes
                    .iter()
                    .find(|o| &o.name == name)
                    .and_then(|o| o.fix.as_ref());
                if let Some(fix) = fix {
                    println!("Would fix {name}: {}", fix.describe());
                }
            }
            for name in &summary.fixed {
                println!("Fixed: {name}");
            }
            for failure in &summary.failed {
                println!("Fix failed for {}: {}", failure.name, failure.reason);
            }
        } else {
            output::render_fix_hints(&report.outcomes);
        }
    }

    // Exit-status contract: non-zero when any check failed.
    if !report.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}
