#![forbid(unsafe_code)]
//! Error types for the VSFS checker.
//!
//! Defines `VsfsError` and a `Result<T>` alias used throughout the
//! workspace. Every variant here is fatal to a run: recoverable
//! structural findings (bad pointers, bitmap mismatches) are report
//! lines, never errors.

use std::path::PathBuf;
use thiserror::Error;

/// Unified fatal error type for all checker operations.
#[derive(Debug, Error)]
pub enum VsfsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot open image {path}: {source}")]
    ImageUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("short read at offset {offset}: expected {expected} bytes, got {got}")]
    ShortRead {
        offset: u64,
        expected: usize,
        got: usize,
    },

    #[error("short write at offset {offset}: expected {expected} bytes, got {got}")]
    ShortWrite {
        offset: u64,
        expected: usize,
        got: usize,
    },

    #[error("invalid on-disk format: {0}")]
    Format(String),
}

/// Result alias using `VsfsError`.
pub type Result<T> = std::result::Result<T, VsfsError>;
