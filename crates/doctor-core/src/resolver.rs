use crate::error::{DoctorError, Result};
use crate::registry::RegisteredCheck;
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Dependency resolution
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq)]
enum Color {
    Unvisited,
    InProgress,
    Done,
}

/// Order `checks` so that every dependency present in the subset precedes
/// its dependents.
///
/// Dependencies naming a check absent from the subset are ignored: a
/// filtered run must not be rejected for dependencies the filter
/// intentionally excluded. The outer traversal follows the input
/// (registration) order, so the result is reproducible for a given
/// registry and filter.
pub fn resolve<'a>(checks: &[&'a RegisteredCheck]) -> Result<Vec<&'a RegisteredCheck>> {
    let by_name: HashMap<&str, &RegisteredCheck> = checks
        .iter()
        .map(|c| (c.descriptor.name.as_str(), *c))
        .collect();

    let mut walk = Walk {
        by_name,
        color: HashMap::new(),
        stack: Vec::new(),
        order: Vec::with_capacity(checks.len()),
    };
    for check in checks {
        walk.visit(&check.descriptor.name)?;
    }
    Ok(walk.order)
}

struct Walk<'a> {
    by_name: HashMap<&'a str, &'a RegisteredCheck>,
    color: HashMap<&'a str, Color>,
    stack: Vec<&'a str>,
    order: Vec<&'a RegisteredCheck>,
}

impl<'a> Walk<'a> {
    fn visit(&mut self, name: &str) -> Result<()> {
        // Deps filtered out of the subset are not an error.
        let Some(&check) = self.by_name.get(name) else {
            return Ok(());
        };
        let name: &'a str = check.descriptor.name.as_str();

        match self.color.get(name).copied().unwrap_or(Color::Unvisited) {
            Color::Done => return Ok(()),
            Color::InProgress => {
                // Re-entered a node on the current DFS stack: the cycle is
                // the stack from that node onward, closed with the node.
                let start = self.stack.iter().position(|&n| n == name).unwrap_or(0);
                let mut path: Vec<String> =
                    self.stack[start..].iter().map(|n| n.to_string()).collect();
                path.push(name.to_string());
                return Err(DoctorError::CircularDependency(path));
            }
            Color::Unvisited => {}
        }

        self.color.insert(name, Color::InProgress);
        self.stack.push(name);
        for dep in &check.descriptor.depends_on {
            self.visit(dep)?;
        }
        self.stack.pop();
        self.color.insert(name, Color::Done);
        self.order.push(check);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
