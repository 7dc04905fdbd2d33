// src/bundle/mod.rs

//! Read-only, addressable views over a package's files
//!
//! A [`Bundle`] is the file source backing one install call: an eagerly
//! indexed, immutable collection of members addressed by [`FilePath`].
//! The archive-backed [`TarBundle`] is the production implementation;
//! [`MemoryBundle`] serves tests and any collaborator that already holds
//! the member bytes.

mod memory;
mod tar;

pub use memory::MemoryBundle;
pub use tar::TarBundle;

use crate::error::Result;
use crate::path::FilePath;
use std::io::Read;

/// A read-only, addressable view over an archive's members.
///
/// Implementations index the member list and total size once at
/// construction; queries never re-scan the backing store. Iteration via
/// [`Bundle::paths`] yields all non-directory members in a stable,
/// restartable order.
pub trait Bundle {
    /// Sum of all member sizes, computed once at construction.
    ///
    /// Used for progress accounting only; it never affects control flow.
    fn installed_size(&self) -> u64;

    /// All non-directory members in stable construction order.
    fn paths(&self) -> &[FilePath];

    /// Membership test by exact path-segment match.
    fn contains(&self, path: &FilePath) -> bool;

    /// Open a member as a scoped readable byte stream.
    ///
    /// The stream is closed on every exit path (dropped with the handle).
    /// Missing members yield [`crate::Error::NotFound`].
    fn open<'a>(&'a self, path: &FilePath) -> Result<Box<dyn Read + 'a>>;

    /// Read a member fully into memory.
    fn get_bytes(&self, path: &FilePath) -> Result<Vec<u8>>;

    /// Size in bytes of a single member.
    fn get_size(&self, path: &FilePath) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_bundle_contract() {
        let bundle = MemoryBundle::new(vec![
            ("pkg/__init__.py", b"".to_vec()),
            ("pkg/module.py", b"x = 1\n".to_vec()),
        ])
        .unwrap();

        assert_eq!(bundle.installed_size(), 6);
        assert_eq!(bundle.paths().len(), 2);

        let path = FilePath::parse("pkg/module.py").unwrap();
        assert!(bundle.contains(&path));
        assert_eq!(bundle.get_size(&path).unwrap(), 6);
        assert_eq!(bundle.get_bytes(&path).unwrap(), b"x = 1\n");

        let missing = FilePath::parse("pkg/other.py").unwrap();
        assert!(!bundle.contains(&missing));
        assert!(bundle.get_bytes(&missing).is_err());
    }

    #[test]
    fn test_iteration_order_is_stable() {
        let bundle = MemoryBundle::new(vec![
            ("z.txt", b"z".to_vec()),
            ("a.txt", b"a".to_vec()),
            ("m.txt", b"m".to_vec()),
        ])
        .unwrap();

        let order: Vec<String> = bundle.paths().iter().map(|p| p.to_string()).collect();
        assert_eq!(order, vec!["z.txt", "a.txt", "m.txt"]);
        // restartable: a second pass sees the same order
        let again: Vec<String> = bundle.paths().iter().map(|p| p.to_string()).collect();
        assert_eq!(order, again);
    }

    #[test]
    fn test_open_reads_member_bytes() {
        let bundle = MemoryBundle::new(vec![("data.bin", vec![1u8, 2, 3, 4])]).unwrap();
        let path = FilePath::parse("data.bin").unwrap();

        let mut reader = bundle.open(&path).unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, vec![1, 2, 3, 4]);
    }
}
