//! Machine discovery.
//!
//! Scans gear directories for native machine libraries. Windows builds
//! (`.dll`) show up in most gear collections; they cannot be loaded here and
//! are only reported.

use std::path::{Path, PathBuf};

use crate::error::{LoaderError, Result};

/// A machine library found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineEntry {
    /// File name without extension, as machines are listed in song files.
    pub name: String,
    pub path: PathBuf,
}

fn is_machine_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("so"))
}

fn is_windows_machine(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("dll"))
}

/// Lists loadable machine libraries in `dir`, sorted by name.
pub fn scan_directory<P: AsRef<Path>>(dir: P, blacklist: &[String]) -> Result<Vec<MachineEntry>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(LoaderError::NotADirectory(dir.to_path_buf()));
    }

    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(file_name) = path.file_name().and_then(|f| f.to_str()) else {
            continue;
        };

        if is_windows_machine(&path) {
            tracing::debug!("Skipping Windows machine {}", path.display());
            continue;
        }
        if !is_machine_file(&path) {
            continue;
        }
        if blacklist.iter().any(|b| b.eq_ignore_ascii_case(file_name)) {
            tracing::info!("Skipping blacklisted machine {}", path.display());
            continue;
        }

        if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
            found.push(MachineEntry {
                name: name.to_string(),
                path: path.clone(),
            });
        }
    }

    found.sort_by(|a, b| a.name.cmp(&b.name));
    tracing::info!("Found {} machines in {}", found.len(), dir.display());
    Ok(found)
}

/// Scans every directory of a search path. Missing directories are skipped
/// with a warning.
pub fn scan_search_path(dirs: &[PathBuf], blacklist: &[String]) -> Vec<MachineEntry> {
    let mut found = Vec::new();
    for dir in dirs {
        match scan_directory(dir, blacklist) {
            Ok(entries) => found.extend(entries),
            Err(e) => tracing::warn!("Failed to scan {}: {}", dir.display(), e),
        }
    }
    found
}
