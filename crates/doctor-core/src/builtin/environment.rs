use crate::error::Result;
use crate::registry::{CheckDescriptor, CheckOutcome, FixAction, Registry};
use crate::types::Severity;
use std::process::Command;

pub fn register(registry: &mut Registry) -> Result<()> {
    registry.register(
        CheckDescriptor::new(
            "environment.claude_installed",
            "environment",
            Severity::Critical,
            "Verify the claude binary is on PATH",
        ),
        Box::new(claude_installed),
    )?;
    registry.register(
        CheckDescriptor::new(
            "environment.claude_version",
            "environment",
            Severity::Medium,
            "Report the installed Claude Code version",
        )
        .depends_on(["environment.claude_installed"]),
        Box::new(claude_version),
    )?;
    registry.register(
        CheckDescriptor::new(
            "environment.node_version",
            "environment",
            Severity::High,
            "Verify a Node.js runtime is available",
        ),
        Box::new(node_version),
    )?;
    Ok(())
}

fn claude_installed() -> anyhow::Result<Vec<CheckOutcome>> {
    const NAME: &str = "environment.claude_installed";
    Ok(vec![match which::which("claude") {
        Ok(path) => CheckOutcome::pass(
            NAME,
            format!("claude found at {}", path.display()),
            Severity::Critical,
        )
        .with_detail("path", serde_json::json!(path.display().to_string())),
        Err(_) => CheckOutcome::fail(NAME, "claude not found in PATH", Severity::Critical)
            .with_fix(FixAction::command([
                "npm",
                "install",
                "-g",
                "@anthropic-ai/claude-code",
            ])),
    }])
}

fn claude_version() -> anyhow::Result<Vec<CheckOutcome>> {
    const NAME: &str = "environment.claude_version";
    let output = Command::new("claude").arg("--version").output()?;
    Ok(vec![if output.status.success() {
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        CheckOutcome::pass(NAME, format!("Claude Code version: {version}"), Severity::Medium)
            .with_detail("version", serde_json::json!(version))
    } else {
        CheckOutcome::fail(
            NAME,
            format!("could not determine version ({})", output.status),
            Severity::Medium,
        )
    }])
}

fn node_version() -> anyhow::Result<Vec<CheckOutcome>> {
    const NAME: &str = "environment.node_version";
    Ok(vec![match Command::new("node").arg("--version").output() {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
            CheckOutcome::pass(NAME, format!("Node.js version: {version}"), Severity::High)
                .with_detail("version", serde_json::json!(version))
        }
        _ => CheckOutcome::fail(
            NAME,
            "Node.js not found; install it via your package manager",
            Severity::High,
        ),
    }])
}
