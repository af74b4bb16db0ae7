//! Global configuration of a compilation.
//!
//! A plain string map, deliberately not process-global. Keys recognised
//! by the middle-end: `suppress-warnings` (comma list of relation names,
//! `*` for all), `magic-transform` (comma list, `*` for all), and
//! `engine` (dropped when record types are found, see
//! `TranslationUnit::disable_subprogram_engine`).

use std::collections::BTreeMap;

#[derive(Clone, Debug, Default)]
pub struct Config {
    values: BTreeMap<String, String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn unset(&mut self, key: &str) {
        self.values.remove(key);
    }

    /// The comma-separated list stored under `key`; empty if unset.
    pub fn list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(value) => value
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_string)
                .collect(),
            None => Vec::new(),
        }
    }
}
