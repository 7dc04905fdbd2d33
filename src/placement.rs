// src/placement.rs

//! Placement classification for bundle members
//!
//! Pure decision logic mapping a bundle member to a destination category
//! and relative path, a skip/keep decision, and an executable flag.
//! Classification rules are an explicit, ordered list evaluated in a
//! fixed priority order; the first rule returning a destination wins.
//! Extending classification means appending a rule, never introspecting.

use crate::bundle::Bundle;
use crate::metadata::EggMetadata;
use crate::path::FilePath;
use crate::platform::Platform;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static PYTHON_SOURCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+)\.py[co]?$").unwrap());

static NAMESPACE_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^\s*__import__\(['"]pkg_resources['"]\)\.declare_namespace\(__name__\)\s*$"#,
    )
    .unwrap()
});

/// Destination categories, in rule priority order (`Default` is the
/// fallback and has no rule).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// The package-info descriptor, renamed into site-packages.
    PkgInfo,
    /// Members placed relative to the prefix root.
    Prefix,
    /// Raw executable scripts, placed in the platform bin directory.
    Script,
    /// Package metadata, placed under the per-package metadata directory.
    Metadata,
    /// Everything else: the package's primary code tree.
    Default,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PkgInfo => "pkg_info",
            Self::Prefix => "prefix",
            Self::Script => "script",
            Self::Metadata => "metadata",
            Self::Default => "default",
        }
    }
}

/// The classification outcome for one bundle member.
#[derive(Debug, Clone)]
pub struct Placement {
    pub category: Category,
    /// Destination path relative to the install prefix.
    pub dest: FilePath,
    /// Whether the orchestrator must set the executable bit after writing.
    pub executable: bool,
}

/// Maps bundle members to destinations. Pure: never raises, never
/// touches the filesystem.
pub struct PlacementClassifier<'a> {
    metadata: &'a EggMetadata,
    platform: &'a dyn Platform,
}

/// Rule evaluation order: first non-empty relative path wins.
const RULES: [Category; 4] = [
    Category::PkgInfo,
    Category::Prefix,
    Category::Script,
    Category::Metadata,
];

impl<'a> PlacementClassifier<'a> {
    pub fn new(metadata: &'a EggMetadata, platform: &'a dyn Platform) -> Self {
        Self { metadata, platform }
    }

    /// Classify a member into its destination category and path.
    pub fn classify(&self, path: &FilePath) -> Placement {
        for category in RULES {
            let rule: fn(&EggMetadata, &FilePath, &dyn Platform) -> Option<FilePath> =
                match category {
                    Category::PkgInfo => EggMetadata::is_pkg_info,
                    Category::Prefix => EggMetadata::is_prefix,
                    Category::Script => EggMetadata::is_script,
                    Category::Metadata => EggMetadata::is_metadata,
                    Category::Default => unreachable!(),
                };
            if let Some(rel) = rule(self.metadata, path, self.platform) {
                return Placement {
                    category,
                    dest: self.destination(category, &rel),
                    executable: self.metadata.is_executable(path),
                };
            }
        }
        Placement {
            category: Category::Default,
            dest: self.destination(Category::Default, path),
            executable: self.metadata.is_executable(path),
        }
    }

    fn destination(&self, category: Category, rel: &FilePath) -> FilePath {
        let root: Vec<&str> = match category {
            Category::PkgInfo | Category::Default => {
                self.platform.site_packages().iter().map(String::as_str).collect()
            }
            Category::Prefix => Vec::new(),
            Category::Script => self.platform.bin_dir().iter().map(String::as_str).collect(),
            Category::Metadata => vec!["EGG-INFO", &self.metadata.cname],
        };
        rel.prefixed(&root)
    }

    /// Skip policy, evaluated before classification. Advisory: never
    /// raises.
    ///
    /// Skips members marked unused, bytecode shadowed by a compiled
    /// extension of the same stem, and compiled `__init__` artifacts of
    /// namespace-package declarations.
    pub fn should_skip(&self, bundle: &dyn Bundle, path: &FilePath) -> bool {
        if path.first().starts_with(".unused") {
            return true;
        }

        // .py/.pyc/.pyo shadowed by a compiled extension with the same stem
        if let Some(caps) = PYTHON_SOURCE.captures(path.last()) {
            let stem = &caps[1];
            let sibling = path.with_last(format!("{}{}", stem, self.platform.pylib_ext()));
            if bundle.contains(&sibling) {
                debug!("Skipping {} (shadowed by {})", path, sibling.last());
                return true;
            }
        }

        // __init__.pyc whose source is only a namespace declaration
        if path.last() == "__init__.pyc" {
            let source = path.with_last("__init__.py");
            if bundle.contains(&source) {
                if let Ok(data) = bundle.get_bytes(&source) {
                    if is_namespace(&data) {
                        debug!("Skipping {} (namespace package)", path);
                        return true;
                    }
                }
            }
        }

        false
    }
}

/// Whether file content matches the canonical one-line namespace-package
/// declaration idiom.
pub fn is_namespace(data: &[u8]) -> bool {
    let text = String::from_utf8_lossy(data);
    NAMESPACE_DECLARATION.is_match(&text)
}
