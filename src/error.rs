//! Central error type.
//!
//! Every fallible operation in this crate returns [`Error`]. The top-level
//! CLI handler (see `main.rs`) is the only place that converts an `Error`
//! into process exit behavior; every other layer just propagates `?`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed ETF or manifest bytes.
    #[error("parse error: {0}")]
    Parse(String),

    /// A term could not be encoded (oversized atom, non-byte list, etc).
    #[error("output error: {0}")]
    Output(String),

    /// CRC mismatch, bad magic/version, or leftover bytes in a framed value.
    #[error("{0}")]
    Integrity(String),

    /// Manifest or object absent where presence was required.
    #[error("{0}")]
    NotFound(String),

    /// Missing/invalid config key, bad tag, bad URL.
    #[error("config error: {0}")]
    Config(String),

    /// Disk or network propagation.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn parse(msg: impl Into<String>) -> Self {
        Error::Parse(msg.into())
    }

    pub fn output(msg: impl Into<String>) -> Self {
        Error::Output(msg.into())
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        Error::Integrity(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }
}
