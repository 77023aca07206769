//! Fixture loading.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::HarnessError;

const BUILTIN: &str = include_str!("../fixtures/core.json");

/// A single runtime call and its expected rendered outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureCase {
    /// Case identifier.
    pub name: String,
    /// Runtime operation exercised (see [`crate::exec`]).
    pub function: String,
    /// Operation arguments.
    pub inputs: serde_json::Value,
    /// Rendered outcome; failures render as `error:<KindName>`.
    pub expected_output: String,
}

/// A named collection of cases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureSet {
    /// Schema version.
    pub version: String,
    /// Operation family (`slice`, `bridge`, `memory`, ...).
    pub family: String,
    pub cases: Vec<FixtureCase>,
}

impl FixtureSet {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_file(path: &Path) -> Result<Self, HarnessError> {
        let content = std::fs::read_to_string(path).map_err(|source| HarnessError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content).map_err(|source| HarnessError::Json {
            origin: path.display().to_string(),
            source,
        })
    }

    /// The fixture set compiled into the harness.
    pub fn builtin() -> Result<Self, HarnessError> {
        Self::from_json(BUILTIN).map_err(|source| HarnessError::Json {
            origin: String::from("<builtin>"),
            source,
        })
    }

    /// Raw JSON of the builtin set, for digesting.
    #[must_use]
    pub fn builtin_source() -> &'static str {
        BUILTIN
    }
}

/// `*.json` files under `path` (sorted), or `path` itself when it is a file.
pub fn fixture_paths(path: &Path) -> Result<Vec<PathBuf>, HarnessError> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let entries = std::fs::read_dir(path).map_err(|source| HarnessError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    paths.sort();
    if paths.is_empty() {
        return Err(HarnessError::NoFixtures(path.to_path_buf()));
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_set_parses() {
        let set = FixtureSet::builtin().expect("builtin fixtures");
        assert_eq!(set.version, "v1");
        assert!(set.cases.len() > 20);
        assert!(set.cases.iter().all(|c| !c.expected_output.is_empty()));
    }

    #[test]
    fn json_round_trip_keeps_cases() {
        let set = FixtureSet::builtin().unwrap();
        let again = FixtureSet::from_json(&set.to_json().unwrap()).unwrap();
        assert_eq!(again.cases.len(), set.cases.len());
        assert_eq!(again.cases[0].name, set.cases[0].name);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = FixtureSet::from_file(Path::new("/nonexistent/pyrt.json")).unwrap_err();
        assert!(matches!(err, HarnessError::Io { .. }));
    }
}
