// src/patch/mod.rs

//! Object-code patcher
//!
//! Rewrites compile-time placeholder search-path data embedded in a
//! binary so that, once installed at its final prefix, the binary's
//! dynamic loader finds its dependencies without relinking. Two
//! strategies sit behind one interface:
//!
//! - structured: the platform's native load-command container (Mach-O),
//!   handled by a pluggable [`StructuredStrategy`]
//! - raw: any other binary embedding the reserved placeholder marker,
//!   rewritten in place with exact length preservation
//!
//! Files matching neither are left untouched. There is no validation
//! that a patched binary still loads; this is a targeted substitution,
//! not a linker.

mod macho;
mod placeholder;

pub use macho::MachORpath;
pub use placeholder::{MIN_REPEATS, PLACEHOLD};

use crate::error::Result;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// A format-specific rewriter for structured binary containers.
///
/// `patch` returns `Ok(None)` when the file is recognized but cannot be
/// rewritten safely; the patcher then leaves it untouched.
pub trait StructuredStrategy {
    fn name(&self) -> &'static str;

    /// Whether the leading bytes identify this strategy's container.
    fn applies(&self, data: &[u8]) -> bool;

    /// Produce a rewritten image of identical length, or `None`.
    fn patch(&self, path: &Path, data: &[u8], targets: &[String]) -> Result<Option<Vec<u8>>>;
}

/// Format-aware binary rewriter for embedded search-path data.
pub struct ObjectCodePatcher {
    strategies: Vec<Box<dyn StructuredStrategy>>,
}

impl Default for ObjectCodePatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectCodePatcher {
    /// A patcher with the stock structured strategies.
    pub fn new() -> Self {
        Self {
            strategies: vec![Box::new(MachORpath)],
        }
    }

    /// A patcher with caller-supplied structured strategies.
    pub fn with_strategies(strategies: Vec<Box<dyn StructuredStrategy>>) -> Self {
        Self { strategies }
    }

    /// Rewrite embedded search paths in an in-memory image.
    ///
    /// Returns the patched image, or `None` when the bytes are neither a
    /// recognized container nor carry a placeholder span. The returned
    /// image always has the same length as the input.
    pub fn patch_bytes(
        &self,
        path: &Path,
        data: &[u8],
        targets: &[String],
    ) -> Result<Option<Vec<u8>>> {
        for strategy in &self.strategies {
            if strategy.applies(data) {
                debug!(
                    "Patching {} with {} strategy",
                    path.display(),
                    strategy.name()
                );
                return strategy.patch(path, data, targets);
            }
        }
        placeholder::apply(path, data, targets)
    }

    /// Patch one file in place. Returns whether the file was rewritten.
    ///
    /// Capacity failures are fatal; unrecognized files are silently left
    /// alone.
    pub fn patch_file(&self, path: &Path, targets: &[String]) -> Result<bool> {
        let data = fs::read(path)?;
        match self.patch_bytes(path, &data, targets)? {
            Some(patched) => {
                debug_assert_eq!(patched.len(), data.len());
                fs::write(path, patched)?;
                info!("Patched search paths in {}", path.display());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
