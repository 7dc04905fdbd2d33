// src/error.rs

//! Error taxonomy for the installation engine
//!
//! Classification and skip decisions never raise; they return options.
//! `Capacity` and filesystem errors during file writing are fatal and
//! abort an install before the manifest is committed. App-hook and
//! post-install failures are logged by the orchestrator, never surfaced
//! through this type.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by bundle access, patching, and installation.
#[derive(Debug, Error)]
pub enum Error {
    /// A bundle member or manifest that was expected to exist does not.
    #[error("not found: {0}")]
    NotFound(String),

    /// Unreadable archive or malformed binary container.
    #[error("format error: {0}")]
    Format(String),

    /// A placeholder replacement does not fit its reserved span.
    ///
    /// Fatal: the install aborts before any manifest is written.
    #[error(
        "placeholder span too short in {path}: {needed} bytes needed, {available} available (paths: {targets})"
    )]
    Capacity {
        path: PathBuf,
        needed: usize,
        available: usize,
        targets: String,
    },

    /// Filesystem failure (permissions, collisions, disk errors).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed manifest or metadata document.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed declaration in package metadata.
    ///
    /// Logged and skipped at parse sites; only surfaced when a caller
    /// asks for strict parsing.
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
