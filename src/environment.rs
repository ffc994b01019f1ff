use std::collections::HashMap;

use tokio::process::Command;

/// Extra environment variables handed to a subject process on top of the
/// harness' own environment.
///
/// Uses `set` rather than `insert` so call sites read as configuration:
///
/// ```
/// use faleproxy::Environment;
///
/// let mut env = Environment::new();
/// env.set("RUST_LOG", "faleproxy=debug");
/// assert_eq!(env.get("RUST_LOG"), Some("faleproxy=debug"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Environment(HashMap<String, String>);

impl Environment {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Sets a variable, replacing any previous value for the same key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder form of [`Environment::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Merges `other` into this set. Keys present in both take `other`'s value.
    pub fn extend(&mut self, other: Environment) {
        self.0.extend(other.0);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Exports every variable onto `command`. The inherited environment is left intact.
    pub fn apply(&self, command: &mut Command) {
        for (key, value) in &self.0 {
            command.env(key, value);
        }
    }
}

impl From<HashMap<String, String>> for Environment {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map)
    }
}
