use crate::error::{DoctorError, Result};
use crate::types::{CheckStatus, Severity};
use regex::Regex;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// CheckDescriptor
// ---------------------------------------------------------------------------

/// Static metadata for a registered check. Immutable once registered.
#[derive(Debug, Clone, Serialize)]
pub struct CheckDescriptor {
    /// Dot-namespaced registry key, e.g. `"settings.writable"`.
    pub name: String,
    pub category: String,
    pub severity: Severity,
    pub depends_on: Vec<String>,
    pub description: String,
}

impl CheckDescriptor {
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            severity,
            depends_on: Vec::new(),
            description: description.into(),
        }
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }
}

// ---------------------------------------------------------------------------
// FixAction
// ---------------------------------------------------------------------------

/// An explicit, typed remediation attached to a failing or warning outcome.
///
/// `Command` is a literal argv, executed directly and never through a
/// shell, and serializes as its argument vector. `Callback` is a
/// zero-argument closure returning success; it cannot be serialized and
/// JSON output renders only a marker for it.
pub enum FixAction {
    Command(Vec<String>),
    Callback(Box<dyn Fn() -> bool>),
}

impl FixAction {
    pub fn command<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FixAction::Command(argv.into_iter().map(Into::into).collect())
    }

    /// One-line rendering for tables and fix previews.
    pub fn describe(&self) -> String {
        match self {
            FixAction::Command(argv) => argv.join(" "),
            FixAction::Callback(_) => "<callback>".to_string(),
        }
    }
}

impl fmt::Debug for FixAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixAction::Command(argv) => f.debug_tuple("Command").field(argv).finish(),
            FixAction::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

impl Serialize for FixAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            FixAction::Command(argv) => map.serialize_entry("command", argv)?,
            FixAction::Callback(_) => map.serialize_entry("callback", &true)?,
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// CheckOutcome
// ---------------------------------------------------------------------------

/// One finding produced by a check invocation.
///
/// A body usually returns a single outcome named after its descriptor; it
/// may append sub-findings under synthetic names (`"parent:child1"`), which
/// are reported but never participate in skip-propagation.
#[derive(Debug, Serialize)]
pub struct CheckOutcome {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub details: serde_json::Map<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix: Option<FixAction>,
    pub severity: Severity,
}

impl CheckOutcome {
    pub fn new(
        name: impl Into<String>,
        status: CheckStatus,
        message: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            name: name.into(),
            status,
            message: message.into(),
            details: serde_json::Map::new(),
            fix: None,
            severity,
        }
    }

    pub fn pass(name: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self::new(name, CheckStatus::Pass, message, severity)
    }

    pub fn warn(name: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self::new(name, CheckStatus::Warn, message, severity)
    }

    pub fn fail(name: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self::new(name, CheckStatus::Fail, message, severity)
    }

    pub fn skip(name: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self::new(name, CheckStatus::Skip, message, severity)
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    pub fn with_fix(mut self, fix: FixAction) -> Self {
        self.fix = Some(fix);
        self
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Executable body of a check. Any `Err` is caught by the engine and
/// converted to a `fail` outcome; it never aborts the run.
pub type CheckBody = Box<dyn Fn() -> anyhow::Result<Vec<CheckOutcome>>>;

pub struct RegisteredCheck {
    pub descriptor: CheckDescriptor,
    pub body: CheckBody,
}

impl std::fmt::Debug for RegisteredCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredCheck")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Registration-ordered collection of checks.
///
/// Built once at process start by explicit `register` calls and read-only
/// afterwards. Iteration follows registration order so filtered and
/// resolved sequences are reproducible.
#[derive(Default)]
pub struct Registry {
    checks: Vec<RegisteredCheck>,
    index: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: CheckDescriptor, body: CheckBody) -> Result<()> {
        if self.index.contains_key(&descriptor.name) {
            return Err(DoctorError::DuplicateCheckName(descriptor.name));
        }
        self.index
            .insert(descriptor.name.clone(), self.checks.len());
        self.checks.push(RegisteredCheck { descriptor, body });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn all(&self) -> Vec<&RegisteredCheck> {
        self.checks.iter().collect()
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredCheck> {
        self.index.get(name).map(|&i| &self.checks[i])
    }

    /// Checks whose names match `pattern` (unanchored regex search), in
    /// registration order. `None` selects everything.
    pub fn filter(&self, pattern: Option<&str>) -> Result<Vec<&RegisteredCheck>> {
        let Some(pattern) = pattern else {
            return Ok(self.all());
        };
        let re = Regex::new(pattern).map_err(|source| DoctorError::InvalidFilterPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(self
            .checks
            .iter()
            .filter(|c| re.is_match(&c.descriptor.name))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
