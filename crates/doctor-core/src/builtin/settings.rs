use crate::error::Result;
use crate::paths::ClaudePaths;
use crate::registry::{CheckBody, CheckDescriptor, CheckOutcome, FixAction, Registry};
use crate::types::Severity;
use std::path::PathBuf;

pub fn register(registry: &mut Registry, paths: &ClaudePaths) -> Result<()> {
    registry.register(
        CheckDescriptor::new(
            "config.settings_file",
            "config",
            Severity::Critical,
            "Verify settings.json exists and is valid JSON",
        ),
        settings_file_body(paths.settings()),
    )?;
    registry.register(
        CheckDescriptor::new(
            "config.settings_writable",
            "config",
            Severity::High,
            "Verify settings.json is a writable regular file",
        )
        .depends_on(["config.settings_file"]),
        settings_writable_body(paths.settings()),
    )?;
    registry.register(
        CheckDescriptor::new(
            "config.memory_file",
            "config",
            Severity::Medium,
            "Verify the CLAUDE.md memory file exists",
        ),
        memory_file_body(paths.memory()),
    )?;
    Ok(())
}

fn settings_file_body(path: PathBuf) -> CheckBody {
    Box::new(move || {
        const NAME: &str = "config.settings_file";
        let path_detail = serde_json::json!(path.display().to_string());
        if !path.exists() {
            return Ok(vec![CheckOutcome::fail(
                NAME,
                "settings.json does not exist",
                Severity::Critical,
            )
            .with_detail("path", path_detail)]);
        }
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                return Ok(vec![CheckOutcome::fail(
                    NAME,
                    format!("cannot read settings.json: {e}"),
                    Severity::Critical,
                )
                .with_detail("path", path_detail)]);
            }
        };
        Ok(vec![
            match serde_json::from_str::<serde_json::Value>(&raw) {
                Ok(_) => CheckOutcome::pass(NAME, "settings.json is valid JSON", Severity::Critical)
                    .with_detail("path", path_detail),
                Err(e) => CheckOutcome::fail(
                    NAME,
                    format!("settings.json is not valid JSON: {e}"),
                    Severity::Critical,
                )
                .with_detail("path", path_detail)
                .with_detail("error", serde_json::json!(e.to_string())),
            },
        ])
    })
}

fn settings_writable_body(path: PathBuf) -> CheckBody {
    Box::new(move || {
        const NAME: &str = "config.settings_writable";

        if let Ok(meta) = std::fs::symlink_metadata(&path) {
            if meta.file_type().is_symlink() {
                let target = std::fs::read_link(&path)
                    .map(|t| t.display().to_string())
                    .unwrap_or_default();
                // exists() follows the link, so a broken target reads false.
                if !path.exists() {
                    return Ok(vec![CheckOutcome::fail(
                        NAME,
                        "settings.json is a broken symlink",
                        Severity::Critical,
                    )
                    .with_detail("target", serde_json::json!(target))
                    .with_detail("broken", serde_json::json!(true))
                    .with_fix(materialize_fix(path.clone()))]);
                }
                return Ok(vec![CheckOutcome::fail(
                    NAME,
                    "settings.json is a symlink (should be a mutable file)",
                    Severity::High,
                )
                .with_detail("target", serde_json::json!(target))
                .with_fix(materialize_fix(path.clone()))]);
            }
        }

        let readonly = std::fs::metadata(&path)
            .map(|m| m.permissions().readonly())
            .unwrap_or(true);
        Ok(vec![if readonly {
            CheckOutcome::fail(NAME, "settings.json is not writable", Severity::High).with_fix(
                FixAction::Command(vec![
                    "chmod".to_string(),
                    "u+w".to_string(),
                    path.display().to_string(),
                ]),
            )
        } else {
            CheckOutcome::pass(NAME, "settings.json is writable", Severity::High)
        }])
    })
}

/// Replace a symlinked settings file with a regular file holding the
/// linked content (or an empty document when the link is broken).
fn materialize_fix(path: PathBuf) -> FixAction {
    FixAction::Callback(Box::new(move || {
        let content = std::fs::read(&path).unwrap_or_else(|_| b"{}".to_vec());
        std::fs::remove_file(&path).is_ok() && std::fs::write(&path, content).is_ok()
    }))
}

fn memory_file_body(path: PathBuf) -> CheckBody {
    Box::new(move || {
        const NAME: &str = "config.memory_file";
        let path_detail = serde_json::json!(path.display().to_string());
        Ok(vec![if path.exists() {
            CheckOutcome::pass(NAME, "CLAUDE.md found", Severity::Medium)
                .with_detail("path", path_detail)
        } else {
            CheckOutcome::warn(
                NAME,
                "CLAUDE.md not found (optional but recommended)",
                Severity::Medium,
            )
            .with_detail("path", path_detail)
        }])
    })
}
