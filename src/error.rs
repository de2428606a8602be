use std::io;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum HisdbError {
    #[error("download of {url} failed: {message}")]
    Transfer { url: String, message: String },

    #[error("download of {url} returned status {status}")]
    TransferStatus { url: String, status: u16 },

    #[error("archive {path} could not be read: {message}")]
    Archive { path: PathBuf, message: String },

    #[error("archive {archive} has no member {member}")]
    MissingMember { archive: PathBuf, member: String },

    #[error("layout error: {0}")]
    #[diagnostic(help("the archive does not follow the expected HisDB naming scheme"))]
    Layout(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("invalid collection identifier: {0}")]
    InvalidCollection(String),

    #[error("invalid partition: {0}")]
    InvalidPartition(String),

    #[error("csv error: {0}")]
    Csv(String),

    #[error("image error: {0}")]
    Image(String),
}

impl HisdbError {
    /// Process exit code used by the binaries.
    pub fn exit_code(&self) -> u8 {
        match self {
            HisdbError::Transfer { .. } | HisdbError::TransferStatus { .. } => 3,
            HisdbError::Archive { .. } | HisdbError::MissingMember { .. } => 4,
            HisdbError::Layout(_) | HisdbError::InvalidCollection(_) => 5,
            _ => 1,
        }
    }
}

pub(crate) fn fs_error(path: &Path, err: io::Error) -> HisdbError {
    HisdbError::Filesystem(format!("{}: {err}", path.display()))
}
