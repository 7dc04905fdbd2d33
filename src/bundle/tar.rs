// src/bundle/tar.rs

//! Archive-backed bundle
//!
//! Indexes a tar or gzip-compressed tar archive eagerly at construction:
//! every regular-file entry is read into memory once, so member queries
//! and repeated iteration never touch the archive again.

use super::Bundle;
use crate::error::{Error, Result};
use crate::path::FilePath;
use flate2::read::GzDecoder;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use tar::{Archive, EntryType};
use tracing::debug;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A bundle backed by a tar (optionally gzip-compressed) archive.
pub struct TarBundle {
    path: PathBuf,
    paths: Vec<FilePath>,
    members: HashMap<FilePath, Vec<u8>>,
    installed_size: u64,
}

impl TarBundle {
    /// Open and index an archive. Unreadable or malformed archives fail
    /// here with [`Error::Format`]; later queries cannot.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)
            .map_err(|e| Error::Format(format!("cannot open archive {}: {}", path.display(), e)))?;

        let mut magic = [0u8; 2];
        let compressed = match std::io::Read::read(&mut file, &mut magic) {
            Ok(2) => magic == GZIP_MAGIC,
            _ => false,
        };
        let file = File::open(&path)
            .map_err(|e| Error::Format(format!("cannot open archive {}: {}", path.display(), e)))?;

        let reader: Box<dyn Read> = if compressed {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };

        let mut archive = Archive::new(reader);
        let mut paths = Vec::new();
        let mut members = HashMap::new();
        let mut installed_size = 0u64;

        let entries = archive
            .entries()
            .map_err(|e| Error::Format(format!("unreadable archive {}: {}", path.display(), e)))?;
        for entry in entries {
            let mut entry = entry.map_err(|e| {
                Error::Format(format!("unreadable archive {}: {}", path.display(), e))
            })?;

            // directories carry no bytes and are never members
            if entry.header().entry_type() != EntryType::Regular {
                continue;
            }

            let entry_path = entry
                .path()
                .map_err(|e| Error::Format(format!("bad entry path: {}", e)))?
                .to_string_lossy()
                .into_owned();
            let member_path = FilePath::parse(&entry_path)?;

            let mut data = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut data)
                .map_err(|e| Error::Format(format!("truncated entry {}: {}", entry_path, e)))?;

            installed_size += data.len() as u64;
            if let Some(old) = members.insert(member_path.clone(), data) {
                // archives can repeat a path; the later entry wins
                installed_size -= old.len() as u64;
                debug!("Duplicate member {}, keeping later bytes", member_path);
            } else {
                paths.push(member_path);
            }
        }

        debug!(
            "Indexed bundle {}: {} members, {} bytes",
            path.display(),
            paths.len(),
            installed_size
        );

        Ok(Self {
            path,
            paths,
            members,
            installed_size,
        })
    }

    /// The archive file this bundle was indexed from.
    pub fn archive_path(&self) -> &Path {
        &self.path
    }

    /// The archive's file name, e.g. `dummy-1.0.1-1.egg`.
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .map(|n| n.to_str().unwrap_or(""))
            .unwrap_or("")
    }

    fn member(&self, path: &FilePath) -> Result<&Vec<u8>> {
        self.members
            .get(path)
            .ok_or_else(|| Error::NotFound(format!("bundle member {}", path)))
    }
}

impl Bundle for TarBundle {
    fn installed_size(&self) -> u64 {
        self.installed_size
    }

    fn paths(&self) -> &[FilePath] {
        &self.paths
    }

    fn contains(&self, path: &FilePath) -> bool {
        self.members.contains_key(path)
    }

    fn open<'a>(&'a self, path: &FilePath) -> Result<Box<dyn Read + 'a>> {
        Ok(Box::new(Cursor::new(self.member(path)?.as_slice())))
    }

    fn get_bytes(&self, path: &FilePath) -> Result<Vec<u8>> {
        Ok(self.member(path)?.clone())
    }

    fn get_size(&self, path: &FilePath) -> Result<u64> {
        Ok(self.member(path)?.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn write_tar(path: &Path, entries: &[(&str, &[u8])], gzip: bool) {
        let file = File::create(path).unwrap();
        let writer: Box<dyn Write> = if gzip {
            Box::new(GzEncoder::new(file, Compression::default()))
        } else {
            Box::new(file)
        };
        let mut builder = tar::Builder::new(writer);
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().flush().unwrap();
    }

    #[test]
    fn test_plain_tar_indexing() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("pkg-1.0-1.egg");
        write_tar(
            &archive,
            &[("EGG-INFO/PKG-INFO", b"Name: pkg"), ("pkg/mod.py", b"y = 2\n")],
            false,
        );

        let bundle = TarBundle::open(&archive).unwrap();
        assert_eq!(bundle.file_name(), "pkg-1.0-1.egg");
        assert_eq!(bundle.paths().len(), 2);
        assert_eq!(bundle.installed_size(), 9 + 6);

        let path = FilePath::parse("EGG-INFO/PKG-INFO").unwrap();
        assert_eq!(bundle.get_bytes(&path).unwrap(), b"Name: pkg");
    }

    #[test]
    fn test_gzip_tar_indexing() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("pkg-1.0-1.egg");
        write_tar(&archive, &[("pkg/mod.py", b"data")], true);

        let bundle = TarBundle::open(&archive).unwrap();
        assert_eq!(bundle.installed_size(), 4);
        let path = FilePath::parse("pkg/mod.py").unwrap();
        assert!(bundle.contains(&path));
    }

    #[test]
    fn test_duplicate_entries_keep_later_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("pkg-1.0-1.egg");
        write_tar(
            &archive,
            &[
                ("pkg/mod.py", b"first version"),
                ("pkg/other.py", b"x"),
                ("pkg/mod.py", b"second"),
            ],
            false,
        );

        let bundle = TarBundle::open(&archive).unwrap();
        assert_eq!(bundle.paths().len(), 2, "duplicate path indexed once");
        assert_eq!(bundle.installed_size(), 6 + 1);

        let path = FilePath::parse("pkg/mod.py").unwrap();
        assert_eq!(bundle.get_bytes(&path).unwrap(), b"second");
    }

    #[test]
    fn test_unreadable_archive_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.egg");
        std::fs::write(&bogus, b"this is not a tar archive").unwrap();

        match TarBundle::open(&bogus) {
            Err(Error::Format(_)) => {}
            other => panic!("expected Format error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_missing_archive_is_format_error() {
        match TarBundle::open("/nonexistent/path.egg") {
            Err(Error::Format(_)) => {}
            other => panic!("expected Format error, got {:?}", other.map(|_| ())),
        }
    }
}
