//! Target snapshots and target loading.

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::errors::{HardenError, Result};

/// Immutable source snapshot of the unit under hardening.
///
/// The controller holds two of these: the original target (never discarded)
/// and the current target (replaced only on strict robustness improvement).
#[derive(Debug, Clone)]
pub struct TargetSnapshot {
    source: String,
}

impl TargetSnapshot {
    pub fn new(source: impl Into<String>) -> Self {
        Self { source: source.into() }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }
}

/// Loads target source from a file, or from a directory probed for the
/// conventional entry points.
pub fn load_target(path: &Path) -> Result<(String, PathBuf)> {
    if path.is_file() {
        let source = std::fs::read_to_string(path)?;
        return Ok((source, path.to_path_buf()));
    }

    if path.is_dir() {
        for name in ["target.py", "main.py", "__init__.py"] {
            let candidate = path.join(name);
            if candidate.is_file() {
                let source = std::fs::read_to_string(&candidate)?;
                return Ok((source, candidate));
            }
        }

        // Fall back to the first Python file in the directory.
        let mut py_files: Vec<PathBuf> = std::fs::read_dir(path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().map(|ext| ext == "py").unwrap_or(false))
            .collect();
        py_files.sort();

        if let Some(first) = py_files.first() {
            let source = std::fs::read_to_string(first)?;
            return Ok((source, first.clone()));
        }

        return Err(HardenError::Target(format!(
            "no Python files found in {}",
            path.display()
        )));
    }

    Err(HardenError::Target(format!("target not found: {}", path.display())))
}

/// Extracts the callable surface of a Python target: top-level and method
/// `def` names, dunders excluded. Used to steer attack prompts across the
/// whole function surface instead of one favorite entry point.
pub fn extract_functions(source: &str) -> Vec<String> {
    let def_re = Regex::new(r"(?m)^\s*(?:async\s+)?def\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap();

    let mut functions = Vec::new();
    for caps in def_re.captures_iter(source) {
        let name = caps[1].to_string();
        if name.starts_with("__") && name.ends_with("__") {
            continue;
        }
        if !functions.contains(&name) {
            functions.push(name);
        }
    }
    functions
}
