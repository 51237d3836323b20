//! Error types for the machine loader

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    Opening,
    EntryPoints,
    Metadata,
    Instantiation,
}

impl std::fmt::Display for LoadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadStage::Opening => write!(f, "opening library"),
            LoadStage::EntryPoints => write!(f, "resolving entry points"),
            LoadStage::Metadata => write!(f, "reading machine info"),
            LoadStage::Instantiation => write!(f, "creating instance"),
        }
    }
}

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Machine load failed at {stage} stage: {}\n  Reason: {reason}", path.display())]
    LoadFailed {
        path: PathBuf,
        stage: LoadStage,
        reason: String,
    },

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoaderError {
    pub(crate) fn load_failed(
        path: &std::path::Path,
        stage: LoadStage,
        reason: impl Into<String>,
    ) -> Self {
        LoaderError::LoadFailed {
            path: path.to_path_buf(),
            stage,
            reason: reason.into(),
        }
    }

    /// The stage a load failure happened at, if this is one.
    pub fn stage(&self) -> Option<LoadStage> {
        match self {
            LoaderError::LoadFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, LoaderError>;
