//! Built-in diagnostic checks, registered at process start.
//!
//! Bodies capture the resolved [`ClaudePaths`] at registration time, so a
//! synthetic home directory can stand in for the real one under test.

mod environment;
mod logs;
mod plugins;
mod settings;

use crate::error::Result;
use crate::paths::ClaudePaths;
use crate::registry::Registry;

pub fn register_all(registry: &mut Registry, paths: &ClaudePaths) -> Result<()> {
    environment::register(registry)?;
    settings::register(registry, paths)?;
    plugins::register(registry, paths)?;
    logs::register(registry, paths)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_checks_register_once() {
        let paths = ClaudePaths {
            home: std::path::PathBuf::from("/tmp/claude-home"),
        };
        let mut registry = Registry::new();
        register_all(&mut registry, &paths).unwrap();
        assert!(registry.len() >= 9);
        assert!(registry.get("environment.claude_installed").is_some());
        assert!(registry.get("config.settings_file").is_some());
        assert!(registry.get("plugin.broken_symlinks").is_some());
        assert!(registry.get("debug.recent_errors").is_some());
    }

    #[test]
    fn dependency_names_refer_to_registered_checks() {
        let paths = ClaudePaths {
            home: std::path::PathBuf::from("/tmp/claude-home"),
        };
        let mut registry = Registry::new();
        register_all(&mut registry, &paths).unwrap();
        for check in registry.all() {
            for dep in &check.descriptor.depends_on {
                assert!(
                    registry.get(dep).is_some(),
                    "{} depends on unregistered {dep}",
                    check.descriptor.name
                );
            }
        }
    }
}
