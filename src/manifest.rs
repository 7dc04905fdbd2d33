// src/manifest.rs

//! Install manifests and descriptive metadata documents
//!
//! The manifest (`egginst.json`) is the authoritative record of every
//! path an install wrote, and the sole signal of "installed": it is
//! committed as the last write of install and deleted as the first step
//! of uninstall. The secondary `_info.json` holds descriptive fields for
//! tooling and is never consulted by uninstall.

use crate::error::{Error, Result};
use crate::path::FilePath;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Per-package metadata directory under the prefix.
pub const META_DIR: &str = "EGG-INFO";

/// Manifest file name inside the per-package metadata directory.
pub const MANIFEST_NAME: &str = "egginst.json";

/// Secondary descriptive document name.
pub const INFO_NAME: &str = "_info.json";

/// Authoritative record of one installed package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Original bundle file name.
    pub egg_name: String,
    /// Absolute install prefix.
    pub prefix: String,
    /// Total bundle byte count.
    pub installed_size: u64,
    /// Every destination path written, `./`-relative to the prefix, in
    /// write order, with the manifest's own path last.
    pub files: Vec<String>,
}

impl Manifest {
    /// The per-package metadata directory for a canonical name.
    pub fn meta_dir(prefix: &Path, cname: &str) -> PathBuf {
        prefix.join(META_DIR).join(cname)
    }

    /// The fixed per-package manifest location.
    pub fn path_for(prefix: &Path, cname: &str) -> PathBuf {
        Self::meta_dir(prefix, cname).join(MANIFEST_NAME)
    }

    /// Build a manifest from the recorded destination list. The
    /// manifest's own path is appended last.
    pub fn new(egg_name: &str, prefix: &Path, cname: &str, installed_size: u64,
               written: &[FilePath]) -> Self {
        let mut files: Vec<String> =
            written.iter().map(|path| format!("./{}", path)).collect();
        files.push(format!("./{}/{}/{}", META_DIR, cname, MANIFEST_NAME));
        Self {
            egg_name: egg_name.to_string(),
            prefix: prefix.display().to_string(),
            installed_size,
            files,
        }
    }

    /// Load a manifest. Missing file is [`Error::NotFound`].
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(format!("manifest {}", path.display()))
            } else {
                Error::Io(e)
            }
        })?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Persist atomically: fully written or not present. The write goes
    /// to a temporary file in the target directory, then renames over.
    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }

    /// The recorded file list with the `./` markers stripped.
    pub fn relative_files(&self) -> impl Iterator<Item = &str> {
        self.files
            .iter()
            .map(|f| f.strip_prefix("./").unwrap_or(f))
    }
}

/// Descriptive, non-authoritative install metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageInfo {
    /// Original bundle file name.
    pub key: String,
    /// Install timestamp.
    pub ctime: DateTime<Utc>,
    /// Install-mode flag (hook-style installs are not supported here).
    pub hook: bool,
    pub installed_size: u64,
    /// Descriptive fields: name, version, build, arch, platform,
    /// declared dependencies, and anything the bundle's descriptors
    /// carried.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl PackageInfo {
    pub fn new(key: &str, installed_size: u64, mut fields: Map<String, Value>) -> Self {
        // struct fields win over whatever the bundle's descriptors carried
        for reserved in ["key", "ctime", "hook", "installed_size"] {
            fields.remove(reserved);
        }
        Self {
            key: key.to_string(),
            ctime: Utc::now(),
            hook: false,
            installed_size,
            fields,
        }
    }

    pub fn path_for(prefix: &Path, cname: &str) -> PathBuf {
        Manifest::meta_dir(prefix, cname).join(INFO_NAME)
    }

    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Format(format!("no parent directory for {}", path.display())))?;
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Enumerate installed packages under a prefix by scanning for
/// manifests. Returns bundle file names, sorted.
pub fn installed_packages(prefix: &Path) -> Result<Vec<String>> {
    let meta_root = prefix.join(META_DIR);
    if !meta_root.is_dir() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in WalkDir::new(&meta_root).min_depth(2).max_depth(2) {
        let entry = entry.map_err(|e| Error::Format(format!("unreadable metadata: {}", e)))?;
        if entry.file_name() == MANIFEST_NAME {
            let manifest = Manifest::load(entry.path())?;
            names.push(manifest.egg_name);
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_lists_itself_last() {
        let written = vec![
            FilePath::parse("lib/python3.11/site-packages/dummy.py").unwrap(),
            FilePath::parse("EGG-INFO/dummy/_info.json").unwrap(),
        ];
        let manifest = Manifest::new(
            "dummy-1.0.1-1.egg",
            Path::new("/opt/prefix"),
            "dummy",
            42,
            &written,
        );

        assert_eq!(manifest.files.len(), 3);
        assert_eq!(
            manifest.files.last().unwrap(),
            "./EGG-INFO/dummy/egginst.json"
        );
        assert_eq!(manifest.files[0], "./lib/python3.11/site-packages/dummy.py");
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = Manifest::path_for(dir.path(), "dummy");

        let manifest = Manifest::new("dummy-1.0.1-1.egg", dir.path(), "dummy", 7, &[]);
        manifest.write_atomic(&path).unwrap();

        let loaded = Manifest::load(&path).unwrap();
        assert_eq!(loaded.egg_name, "dummy-1.0.1-1.egg");
        assert_eq!(loaded.installed_size, 7);
        assert_eq!(loaded.files, manifest.files);
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        match Manifest::load(&Manifest::path_for(dir.path(), "ghost")) {
            Err(Error::NotFound(_)) => {}
            other => panic!("expected NotFound, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_installed_packages_scan() {
        let dir = tempfile::tempdir().unwrap();
        assert!(installed_packages(dir.path()).unwrap().is_empty());

        for name in ["zeta-2.0-1.egg", "alpha-1.0-1.egg"] {
            let cname = name.split('-').next().unwrap();
            let manifest = Manifest::new(name, dir.path(), cname, 0, &[]);
            manifest
                .write_atomic(&Manifest::path_for(dir.path(), cname))
                .unwrap();
        }

        assert_eq!(
            installed_packages(dir.path()).unwrap(),
            vec!["alpha-1.0-1.egg", "zeta-2.0-1.egg"]
        );
    }

    #[test]
    fn test_relative_files() {
        let manifest = Manifest::new(
            "d-1.egg",
            Path::new("/p"),
            "d",
            0,
            &[FilePath::parse("bin/tool").unwrap()],
        );
        let rels: Vec<&str> = manifest.relative_files().collect();
        assert_eq!(rels, vec!["bin/tool", "EGG-INFO/d/egginst.json"]);
    }
}
