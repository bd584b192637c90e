use crate::error::Result;
use crate::paths::ClaudePaths;
use crate::registry::{CheckBody, CheckDescriptor, CheckOutcome, FixAction, Registry};
use crate::types::Severity;
use std::path::{Path, PathBuf};

pub fn register(registry: &mut Registry, paths: &ClaudePaths) -> Result<()> {
    registry.register(
        CheckDescriptor::new(
            "plugin.marketplace_dir",
            "plugin",
            Severity::Medium,
            "Verify the plugin marketplaces directory exists",
        ),
        marketplace_dir_body(paths.marketplaces_dir()),
    )?;
    registry.register(
        CheckDescriptor::new(
            "plugin.cache_dir",
            "plugin",
            Severity::Medium,
            "Verify the plugin cache directory exists and is accessible",
        ),
        cache_dir_body(paths.plugin_cache_dir()),
    )?;
    registry.register(
        CheckDescriptor::new(
            "plugin.broken_symlinks",
            "plugin",
            Severity::Medium,
            "Scan plugin directories for broken symlinks",
        ),
        broken_symlinks_body(paths.marketplaces_dir(), paths.plugin_cache_dir()),
    )?;
    Ok(())
}

fn mkdir_fix(dir: &Path) -> FixAction {
    FixAction::Command(vec![
        "mkdir".to_string(),
        "-p".to_string(),
        dir.display().to_string(),
    ])
}

fn marketplace_dir_body(dir: PathBuf) -> CheckBody {
    Box::new(move || {
        const NAME: &str = "plugin.marketplace_dir";
        let path_detail = serde_json::json!(dir.display().to_string());
        Ok(vec![if dir.exists() {
            CheckOutcome::pass(NAME, "marketplaces directory exists", Severity::Medium)
                .with_detail("path", path_detail)
        } else {
            CheckOutcome::warn(NAME, "marketplaces directory does not exist", Severity::Medium)
                .with_detail("path", path_detail)
                .with_fix(mkdir_fix(&dir))
        }])
    })
}

fn cache_dir_body(dir: PathBuf) -> CheckBody {
    Box::new(move || {
        const NAME: &str = "plugin.cache_dir";
        let path_detail = serde_json::json!(dir.display().to_string());
        if !dir.exists() {
            return Ok(vec![CheckOutcome::warn(
                NAME,
                "plugin cache directory does not exist",
                Severity::Medium,
            )
            .with_detail("path", path_detail)
            .with_fix(mkdir_fix(&dir))]);
        }
        let readonly = std::fs::metadata(&dir)
            .map(|m| m.permissions().readonly())
            .unwrap_or(true);
        Ok(vec![if readonly {
            CheckOutcome::fail(
                NAME,
                "plugin cache directory is not accessible",
                Severity::Medium,
            )
            .with_detail("path", path_detail)
            .with_fix(FixAction::Command(vec![
                "chmod".to_string(),
                "u+rw".to_string(),
                dir.display().to_string(),
            ]))
        } else {
            CheckOutcome::pass(NAME, "plugin cache directory accessible", Severity::Medium)
                .with_detail("path", path_detail)
        }])
    })
}

fn broken_symlinks_body(marketplaces: PathBuf, cache: PathBuf) -> CheckBody {
    Box::new(move || {
        const NAME: &str = "plugin.broken_symlinks";
        let mut broken: Vec<PathBuf> = Vec::new();
        for dir in [&marketplaces, &cache] {
            scan_broken(dir, &mut broken);
        }
        broken.sort();

        if broken.is_empty() {
            return Ok(vec![CheckOutcome::pass(
                NAME,
                "no broken symlinks found",
                Severity::Medium,
            )]);
        }

        let shown: Vec<String> = broken
            .iter()
            .take(5)
            .map(|p| p.display().to_string())
            .collect();
        let message = if broken.len() <= 5 {
            format!("found {} broken symlink(s)", broken.len())
        } else {
            format!(
                "found {} broken symlinks (showing first {})",
                broken.len(),
                shown.len()
            )
        };
        let mut argv = vec!["rm".to_string()];
        argv.extend(shown.iter().cloned());
        Ok(vec![CheckOutcome::warn(NAME, message, Severity::Medium)
            .with_detail("broken_links", serde_json::json!(shown))
            .with_fix(FixAction::Command(argv))])
    })
}

fn scan_broken(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let is_symlink = std::fs::symlink_metadata(&path)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
        if is_symlink {
            // exists() follows the link; false means the target is gone.
            if !path.exists() {
                out.push(path);
            }
        } else if path.is_dir() {
            scan_broken(&path, out);
        }
    }
}
