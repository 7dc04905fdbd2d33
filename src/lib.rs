// src/lib.rs

//! Eggbox Package Installer
//!
//! Transactional installation engine for self-contained egg bundles:
//! materializes an archive into a target prefix, rewrites embedded
//! placeholder search paths inside compiled binaries, and records an
//! authoritative manifest enabling exact later removal.
//!
//! # Architecture
//!
//! - Manifest-first: the per-package `egginst.json` is the sole signal of
//!   "installed"; it is the last write of install and the first delete of
//!   uninstall, and uninstall trusts nothing else
//! - Classified placement: bundle members map to destination categories
//!   through an explicit, ordered rule list
//! - Length-preserving patching: placeholder search-path spans inside
//!   binaries are rewritten in place, never grown or truncated
//! - Explicit capabilities: platform conventions (bin dir, interpreters,
//!   link primitives) are passed down, never looked up ambiently

pub mod bundle;
mod error;
pub mod hooks;
pub mod install;
pub mod manifest;
pub mod metadata;
pub mod patch;
pub mod path;
pub mod placement;
pub mod platform;
pub mod progress;

pub use bundle::{Bundle, MemoryBundle, TarBundle};
pub use error::{Error, Result};
pub use hooks::{AppHooks, ExternalAppHooks, NoopAppHooks};
pub use install::{InstallPhase, Installation};
pub use manifest::{Manifest, PackageInfo};
pub use metadata::{EggMetadata, EntryPoint, ScriptKind};
pub use patch::{ObjectCodePatcher, StructuredStrategy};
pub use path::FilePath;
pub use placement::{Category, Placement, PlacementClassifier};
pub use platform::{Platform, Posix, Windows};
pub use progress::{LogProgress, ProgressTracker, SilentProgress};
