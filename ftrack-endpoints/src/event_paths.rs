/*!
Resolution of the directories the event workers load their handlers from
*/

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use crate::error::EndpointError;

/// Event directories split into the ones that exist and the ones that do not
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPaths {
    found: Vec<PathBuf>,
    missing: Vec<PathBuf>,
}

impl EventPaths {
    /// Each value may hold several paths joined with the platform separator
    /// (`:` on Unix, `;` on Windows).
    pub fn resolve<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut paths = Self::default();
        for value in values {
            for path in std::env::split_paths(value.as_ref()) {
                if path.as_os_str().is_empty() {
                    continue;
                }
                if path.exists() {
                    paths.found.push(path);
                } else {
                    paths.missing.push(path);
                }
            }
        }
        paths
    }

    pub fn found(&self) -> &[PathBuf] {
        &self.found
    }

    pub fn missing(&self) -> &[PathBuf] {
        &self.missing
    }

    /// True when no usable directory remains
    pub fn is_empty(&self) -> bool {
        self.found.is_empty()
    }

    /// Existing paths joined back into a single environment value
    pub fn joined(&self) -> Result<OsString, EndpointError> {
        Ok(std::env::join_paths(self.found.iter().map(PathBuf::as_path))?)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.found.iter().any(|p| p == path)
    }
}
