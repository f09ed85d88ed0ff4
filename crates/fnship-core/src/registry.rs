//! Function discovery.
//!
//! A directory is a deployable function when it directly contains the
//! entry-point marker file. Helper directories without the marker are never
//! treated as functions, even when they hold source files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{CoreError, CoreResult};
use crate::types::FunctionUnit;

/// Discovers [`FunctionUnit`]s below a base directory.
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    base_dir: PathBuf,
    entry_point: String,
}

impl FunctionRegistry {
    pub fn new(base_dir: impl Into<PathBuf>, entry_point: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            entry_point: entry_point.into(),
        }
    }

    /// Walk the base directory (any depth) and return every function unit,
    /// sorted by source path. A missing base directory yields no units.
    pub fn discover(&self) -> CoreResult<Vec<FunctionUnit>> {
        if !self.base_dir.is_dir() {
            warn!(path = ?self.base_dir, "function base directory does not exist");
            return Ok(Vec::new());
        }

        let mut units = Vec::new();
        let mut seen: HashMap<String, PathBuf> = HashMap::new();

        for entry in WalkDir::new(&self.base_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| CoreError::Discovery {
                path: self.base_dir.clone(),
                reason: e.to_string(),
            })?;
            if !entry.file_type().is_file() || entry.file_name() != self.entry_point.as_str() {
                continue;
            }
            let Some(dir) = entry.path().parent() else {
                continue;
            };

            let unit = self.unit_for(dir);
            if let Some(first) = seen.get(&unit.name) {
                return Err(CoreError::DuplicateFunction {
                    name: unit.name,
                    first: first.clone(),
                    second: dir.to_path_buf(),
                });
            }
            debug!(function = %unit.name, domain = %unit.domain, path = ?dir, "discovered function");
            seen.insert(unit.name.clone(), dir.to_path_buf());
            units.push(unit);
        }

        info!(count = units.len(), base = ?self.base_dir, "function discovery complete");
        Ok(units)
    }

    fn unit_for(&self, dir: &Path) -> FunctionUnit {
        let name = file_name_of(dir);
        let domain = dir
            .strip_prefix(&self.base_dir)
            .ok()
            .and_then(|rel| rel.components().next())
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .unwrap_or_else(|| name.clone());
        FunctionUnit {
            name,
            domain,
            source_path: dir.to_path_buf(),
        }
    }
}

fn file_name_of(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const MARKER: &str = "lambda_function.py";

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "def lambda_handler(event, context):\n    return {}\n").unwrap();
    }

    #[test]
    fn discovers_nested_units_with_domains() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("lambdas");
        touch(&base.join("payments/charge").join(MARKER));
        touch(&base.join("payments/refund").join(MARKER));
        touch(&base.join("users/deep/signup").join(MARKER));

        let units = FunctionRegistry::new(&base, MARKER).discover().unwrap();
        let names: Vec<_> = units.iter().map(|u| (u.name.as_str(), u.domain.as_str())).collect();
        assert_eq!(
            names,
            vec![
                ("charge", "payments"),
                ("refund", "payments"),
                ("signup", "users"),
            ]
        );
    }

    #[test]
    fn helper_directories_without_marker_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("lambdas");
        touch(&base.join("shared/utils.py"));
        touch(&base.join("orders/create").join(MARKER));
        touch(&base.join("orders/create/helpers.py"));

        let units = FunctionRegistry::new(&base, MARKER).discover().unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].name, "create");
    }

    #[test]
    fn unit_directly_under_base_uses_own_name_as_domain() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("lambda-a").join(MARKER));

        let units = FunctionRegistry::new(dir.path(), MARKER).discover().unwrap();
        assert_eq!(units[0].name, "lambda-a");
        assert_eq!(units[0].domain, "lambda-a");
    }

    #[test]
    fn missing_base_dir_yields_nothing() {
        let units = FunctionRegistry::new("/nonexistent/lambdas", MARKER)
            .discover()
            .unwrap();
        assert!(units.is_empty());
    }

    #[test]
    fn duplicate_names_across_domains_rejected() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a/notify").join(MARKER));
        touch(&dir.path().join("b/notify").join(MARKER));

        let err = FunctionRegistry::new(dir.path(), MARKER).discover().unwrap_err();
        assert!(matches!(err, CoreError::DuplicateFunction { ref name, .. } if name == "notify"));
    }

    #[test]
    fn discovery_is_restartable() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("x/f1").join(MARKER));
        let registry = FunctionRegistry::new(dir.path(), MARKER);
        assert_eq!(registry.discover().unwrap(), registry.discover().unwrap());
    }
}
