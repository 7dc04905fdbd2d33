// src/path.rs

//! Segment-sequence paths for bundle members and install destinations
//!
//! A [`FilePath`] is the universal identity for a bundle member and for a
//! destination file: an ordered, non-empty sequence of path segments.
//! Equality and hashing use the full segment sequence; there is no
//! normalization across separators. Conversion to a native [`PathBuf`]
//! happens only at the filesystem boundary.

use crate::error::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};

/// An ordered, non-empty sequence of path segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilePath {
    segments: Vec<String>,
}

impl FilePath {
    /// Build a path from segments. Empty segment lists and empty segments
    /// are rejected.
    pub fn new<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() || segments.iter().any(|s| s.is_empty()) {
            return Err(Error::Format(format!(
                "invalid path segments: {:?}",
                segments
            )));
        }
        Ok(Self { segments })
    }

    /// Parse a `/`-separated path string. Trailing separators (archive
    /// directory entries) and empty strings are rejected.
    pub fn parse(s: &str) -> Result<Self> {
        Self::new(s.split('/').filter(|seg| !seg.is_empty()))
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn first(&self) -> &str {
        &self.segments[0]
    }

    pub fn last(&self) -> &str {
        &self.segments[self.segments.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether the leading segments equal `prefix`, segment for segment.
    pub fn starts_with(&self, prefix: &[&str]) -> bool {
        self.segments.len() >= prefix.len()
            && self.segments.iter().zip(prefix).all(|(a, b)| a == b)
    }

    /// The segments after a matched prefix, as a new path. Returns `None`
    /// when the prefix does not match or nothing would remain.
    pub fn strip_prefix(&self, prefix: &[&str]) -> Option<FilePath> {
        if !self.starts_with(prefix) || self.segments.len() == prefix.len() {
            return None;
        }
        Some(Self {
            segments: self.segments[prefix.len()..].to_vec(),
        })
    }

    /// A new path with `last` replaced.
    pub fn with_last(&self, last: impl Into<String>) -> FilePath {
        let mut segments = self.segments.clone();
        let n = segments.len();
        segments[n - 1] = last.into();
        Self { segments }
    }

    /// Concatenate two segment sequences.
    pub fn join(&self, other: &FilePath) -> FilePath {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    /// Prepend root segments to this path.
    pub fn prefixed(&self, root: &[&str]) -> FilePath {
        let mut segments: Vec<String> = root.iter().map(|s| s.to_string()).collect();
        segments.extend(self.segments.iter().cloned());
        Self { segments }
    }

    /// Resolve to a native path under an absolute prefix.
    pub fn to_native(&self, prefix: &Path) -> PathBuf {
        let mut path = prefix.to_path_buf();
        for segment in &self.segments {
            path.push(segment);
        }
        path
    }
}

impl fmt::Display for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let p = FilePath::parse("EGG-INFO/scripts/run").unwrap();
        assert_eq!(p.segments(), &["EGG-INFO", "scripts", "run"]);
        assert_eq!(p.to_string(), "EGG-INFO/scripts/run");
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(FilePath::parse("").is_err());
        assert!(FilePath::parse("///").is_err());
    }

    #[test]
    fn test_parse_skips_trailing_separator() {
        let p = FilePath::parse("pkg/sub/").unwrap();
        assert_eq!(p.segments(), &["pkg", "sub"]);
    }

    #[test]
    fn test_starts_with_and_strip() {
        let p = FilePath::parse("EGG-INFO/usr/bin/tool").unwrap();
        assert!(p.starts_with(&["EGG-INFO", "usr"]));
        assert!(!p.starts_with(&["EGG-INFO", "scripts"]));

        let rest = p.strip_prefix(&["EGG-INFO", "usr"]).unwrap();
        assert_eq!(rest.to_string(), "bin/tool");

        // nothing left after the prefix
        assert!(p.strip_prefix(&["EGG-INFO", "usr", "bin", "tool"]).is_none());
    }

    #[test]
    fn test_equality_is_exact() {
        let a = FilePath::parse("a/b").unwrap();
        let b = FilePath::parse("a/b").unwrap();
        let c = FilePath::parse("a/b/c").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_to_native() {
        let p = FilePath::parse("lib/libfoo.so").unwrap();
        let native = p.to_native(Path::new("/opt/prefix"));
        assert_eq!(native, PathBuf::from("/opt/prefix/lib/libfoo.so"));
    }

    #[test]
    fn test_with_last() {
        let p = FilePath::parse("pkg/__init__.pyc").unwrap();
        assert_eq!(p.with_last("__init__.py").to_string(), "pkg/__init__.py");
    }
}
