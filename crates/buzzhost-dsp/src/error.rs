//! Error types for buzzhost-dsp

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid channel count: {0}")]
    InvalidChannelCount(i32),
}

pub type Result<T> = std::result::Result<T, Error>;
