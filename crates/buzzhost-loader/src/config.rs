//! Loader configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::master::Tempo;

/// Directory searched when `BML_PATH` is unset.
pub const DEFAULT_GEAR_DIR: &str = "/usr/lib/buzzhost/Gear";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderConfig {
    #[serde(default)]
    pub tempo: Tempo,
    /// Create and initialize one instance while opening, to learn whether the
    /// machine uses the MDK helper.
    pub probe_on_open: bool,
    pub search_path: Vec<PathBuf>,
    /// Library file names never loaded. Compared case-insensitively.
    #[serde(default)]
    pub blacklist: Vec<String>,
    /// Machine names whose parameters must be written before `Init`.
    #[serde(default)]
    pub params_before_init: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            tempo: Tempo::default(),
            probe_on_open: true,
            search_path: search_path_from_env(),
            blacklist: Vec::new(),
            params_before_init: Vec::new(),
        }
    }
}

impl LoaderConfig {
    pub fn is_blacklisted(&self, file_name: &str) -> bool {
        self.blacklist
            .iter()
            .any(|b| b.eq_ignore_ascii_case(file_name))
    }

    pub fn wants_params_before_init(&self, machine_name: &str) -> bool {
        self.params_before_init.iter().any(|n| n == machine_name)
    }
}

/// `BML_PATH`, colon separated, or the default gear directory.
pub fn search_path_from_env() -> Vec<PathBuf> {
    parse_search_path(std::env::var("BML_PATH").ok().as_deref())
}

fn parse_search_path(value: Option<&str>) -> Vec<PathBuf> {
    let dirs: Vec<PathBuf> = value
        .unwrap_or_default()
        .split(':')
        .filter(|d| !d.is_empty())
        .map(PathBuf::from)
        .collect();
    if dirs.is_empty() {
        vec![PathBuf::from(DEFAULT_GEAR_DIR)]
    } else {
        dirs
    }
}
