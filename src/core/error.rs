//! Error types for the converter

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the converter
#[derive(Debug, Error)]
pub enum Error {
    #[error("could not open source file {path}: {source}")]
    SourceOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not create output file {path}: {source}")]
    OutputOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed source: {0}")]
    MalformedSource(String),

    #[error("unsupported input format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("output directory is not empty: {0}")]
    OutputDirNotEmpty(PathBuf),

    #[error("node '{0}' finalized with zero points")]
    EmptyNode(String),

    #[error("a worker job failed, build aborted")]
    WorkerFailed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Process exit code for this failure class.
    ///
    /// Stable so scripts can tell an argument problem from a disk
    /// problem from a build abort.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::SourceOpen { .. } | Error::UnsupportedFormat(_) => 2,
            Error::OutputDirNotEmpty(_) => 3,
            Error::OutputOpen { .. } => 4,
            Error::MalformedSource(_) => 5,
            Error::EmptyNode(_) => 6,
            Error::WorkerFailed => 7,
            Error::Io(_) => 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_distinct_per_class() {
        let errors = [
            Error::SourceOpen {
                path: PathBuf::from("a.las"),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
            },
            Error::OutputDirNotEmpty(PathBuf::from("out")),
            Error::OutputOpen {
                path: PathBuf::from("out/octree.bin"),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            },
            Error::MalformedSource("truncated record".into()),
            Error::EmptyNode("04".into()),
            Error::WorkerFailed,
        ];

        let mut codes: Vec<i32> = errors.iter().map(|e| e.exit_code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert!(codes.iter().all(|&c| c != 0));
    }
}
