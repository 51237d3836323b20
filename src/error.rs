//! Centralized error type for the buzzhost umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Loader(#[from] buzzhost_loader::LoaderError),

    #[error("DSP: {0}")]
    Dsp(#[from] buzzhost_dsp::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_missing() -> Result<usize> {
        let found = buzzhost_loader::scan_directory("/nonexistent/buzzhost/gear", &[])?;
        Ok(found.len())
    }

    #[test]
    fn test_loader_error_propagates() {
        let err = scan_missing().unwrap_err();
        assert!(matches!(err, Error::Loader(_)));
        assert!(err.to_string().starts_with("Not a directory"));
    }

    #[test]
    fn test_dsp_error_display() {
        let err: Error = buzzhost_dsp::Error::InvalidChannelCount(3).into();
        assert_eq!(err.to_string(), "DSP: Invalid channel count: 3");
    }
}
