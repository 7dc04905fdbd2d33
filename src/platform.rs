// src/platform.rs

//! Platform capability for install conventions
//!
//! Everything the orchestrator needs to know about the host convention is
//! behind the [`Platform`] trait: executable-search directory, package
//! code directory, per-script-kind interpreters, link/unlink primitives,
//! script naming, and sibling-artifact synthesis. A concrete variant is
//! chosen once at startup and passed down explicitly; nothing here is
//! looked up ambiently.

use crate::error::Result;
use crate::metadata::ScriptKind;
use crate::path::FilePath;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Host conventions consumed by the installation orchestrator.
pub trait Platform {
    fn name(&self) -> &'static str;

    fn is_windows(&self) -> bool;

    /// Executable-search directory, relative to the prefix.
    fn bin_dir(&self) -> &[String];

    /// Package code directory (site-packages), relative to the prefix.
    fn site_packages(&self) -> &[String];

    /// Suffix of a compiled extension module (`.so`, `.pyd`).
    fn pylib_ext(&self) -> &'static str;

    /// Interpreter to embed in launcher scripts of the given kind.
    fn interpreter(&self, kind: ScriptKind) -> &Path;

    /// File name of the launcher script for an entry point.
    fn script_name(&self, name: &str, kind: ScriptKind) -> String;

    /// Write any platform-specific sibling artifacts for a launcher
    /// script and return their destination paths.
    fn script_extras(
        &self,
        prefix: &Path,
        name: &str,
        kind: ScriptKind,
    ) -> Result<Vec<FilePath>>;

    /// Create the platform's link artifact next to an installed file.
    ///
    /// `source` is the installed destination path (relative to the
    /// prefix); `link_name` is the sibling name to create. Returns every
    /// artifact path created. A `link_name` of `False` is a declared
    /// no-op.
    fn link_executable(
        &self,
        prefix: &Path,
        source: &FilePath,
        link_name: &str,
    ) -> Result<Vec<FilePath>>;

    /// Remove a file, symlink, or directory tree. Absent paths are fine.
    fn remove_file(&self, path: &Path) -> Result<()> {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(_) => return Ok(()),
        };
        if meta.is_dir() {
            fs::remove_dir_all(path)?;
        } else {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// POSIX-like conventions: `bin/`, versioned site-packages, symlinks.
pub struct Posix {
    bin_dir: Vec<String>,
    site_packages: Vec<String>,
    interpreter: PathBuf,
}

impl Posix {
    /// `python_version` selects the versioned site-packages directory,
    /// e.g. (3, 11) -> `lib/python3.11/site-packages`.
    pub fn new(interpreter: PathBuf, python_version: (u32, u32)) -> Self {
        Self {
            bin_dir: vec!["bin".to_string()],
            site_packages: vec![
                "lib".to_string(),
                format!("python{}.{}", python_version.0, python_version.1),
                "site-packages".to_string(),
            ],
            interpreter,
        }
    }
}

impl Platform for Posix {
    fn name(&self) -> &'static str {
        "posix"
    }

    fn is_windows(&self) -> bool {
        false
    }

    fn bin_dir(&self) -> &[String] {
        &self.bin_dir
    }

    fn site_packages(&self) -> &[String] {
        &self.site_packages
    }

    fn pylib_ext(&self) -> &'static str {
        ".so"
    }

    fn interpreter(&self, _kind: ScriptKind) -> &Path {
        // gui and console scripts share one interpreter on posix
        &self.interpreter
    }

    fn script_name(&self, name: &str, _kind: ScriptKind) -> String {
        name.to_string()
    }

    fn script_extras(
        &self,
        _prefix: &Path,
        _name: &str,
        _kind: ScriptKind,
    ) -> Result<Vec<FilePath>> {
        Ok(Vec::new())
    }

    fn link_executable(
        &self,
        prefix: &Path,
        source: &FilePath,
        link_name: &str,
    ) -> Result<Vec<FilePath>> {
        if link_name == "False" {
            return Ok(Vec::new());
        }

        let link_rel = source.with_last(link_name);
        let link_path = link_rel.to_native(prefix);
        if let Some(parent) = link_path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.remove_file(&link_path)?;

        #[cfg(unix)]
        std::os::unix::fs::symlink(source.last(), &link_path)?;
        #[cfg(not(unix))]
        fs::copy(source.to_native(prefix), &link_path)?;

        debug!("Linked {} -> {}", link_rel, source.last());
        Ok(vec![link_rel])
    }
}

/// Windows-like conventions: `Scripts/`, flat site-packages, copies
/// instead of symlinks, a `.bat` shim next to each launcher script.
pub struct Windows {
    bin_dir: Vec<String>,
    site_packages: Vec<String>,
    interpreter: PathBuf,
    gui_interpreter: PathBuf,
}

impl Windows {
    pub fn new(interpreter: PathBuf, gui_interpreter: PathBuf) -> Self {
        Self {
            bin_dir: vec!["Scripts".to_string()],
            site_packages: vec!["Lib".to_string(), "site-packages".to_string()],
            interpreter,
            gui_interpreter,
        }
    }
}

impl Platform for Windows {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn is_windows(&self) -> bool {
        true
    }

    fn bin_dir(&self) -> &[String] {
        &self.bin_dir
    }

    fn site_packages(&self) -> &[String] {
        &self.site_packages
    }

    fn pylib_ext(&self) -> &'static str {
        ".pyd"
    }

    fn interpreter(&self, kind: ScriptKind) -> &Path {
        match kind {
            ScriptKind::Console => &self.interpreter,
            ScriptKind::Gui => &self.gui_interpreter,
        }
    }

    fn script_name(&self, name: &str, _kind: ScriptKind) -> String {
        format!("{}-script.py", name)
    }

    fn script_extras(
        &self,
        prefix: &Path,
        name: &str,
        kind: ScriptKind,
    ) -> Result<Vec<FilePath>> {
        // a directly runnable sibling next to the launcher script
        let shim_rel = FilePath::new(
            self.bin_dir
                .iter()
                .cloned()
                .chain([format!("{}.bat", name)]),
        )?;
        let shim_path = shim_rel.to_native(prefix);
        if let Some(parent) = shim_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let interpreter = self.interpreter(kind).display().to_string();
        let script = self.script_name(name, kind);
        let shim = format!("@echo off\r\n\"{}\" \"%~dp0{}\" %*\r\n", interpreter, script);
        fs::write(&shim_path, shim)?;

        Ok(vec![shim_rel])
    }

    fn link_executable(
        &self,
        prefix: &Path,
        source: &FilePath,
        link_name: &str,
    ) -> Result<Vec<FilePath>> {
        if link_name == "False" {
            return Ok(Vec::new());
        }

        // no symlinks: copy the installed file under the sibling name
        let link_rel = source.with_last(link_name);
        let link_path = link_rel.to_native(prefix);
        if let Some(parent) = link_path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.remove_file(&link_path)?;
        fs::copy(source.to_native(prefix), &link_path)?;

        debug!("Copied {} -> {}", source, link_rel);
        Ok(vec![link_rel])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posix() -> Posix {
        Posix::new(PathBuf::from("/opt/prefix/bin/python"), (3, 11))
    }

    #[test]
    fn test_posix_layout() {
        let p = posix();
        assert_eq!(p.bin_dir(), &["bin".to_string()]);
        assert_eq!(
            p.site_packages(),
            &[
                "lib".to_string(),
                "python3.11".to_string(),
                "site-packages".to_string()
            ]
        );
        assert_eq!(p.pylib_ext(), ".so");
        assert_eq!(p.script_name("runme", ScriptKind::Console), "runme");
    }

    #[test]
    fn test_windows_layout() {
        let w = Windows::new(
            PathBuf::from("C:\\py\\python.exe"),
            PathBuf::from("C:\\py\\pythonw.exe"),
        );
        assert_eq!(w.bin_dir(), &["Scripts".to_string()]);
        assert_eq!(
            w.site_packages(),
            &["Lib".to_string(), "site-packages".to_string()]
        );
        assert_eq!(w.pylib_ext(), ".pyd");
        assert_eq!(
            w.script_name("runme", ScriptKind::Gui),
            "runme-script.py"
        );
        assert_eq!(
            w.interpreter(ScriptKind::Gui),
            Path::new("C:\\py\\pythonw.exe")
        );
    }

    #[test]
    fn test_false_link_target_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let p = posix();
        let source = FilePath::parse("lib/libfoo.so.1.2").unwrap();
        let written = p.link_executable(dir.path(), &source, "False").unwrap();
        assert!(written.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_posix_link_creates_relative_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let lib_dir = dir.path().join("lib");
        fs::create_dir_all(&lib_dir).unwrap();
        fs::write(lib_dir.join("libfoo.so.1.2"), b"elf").unwrap();

        let p = posix();
        let source = FilePath::parse("lib/libfoo.so.1.2").unwrap();
        let written = p.link_executable(dir.path(), &source, "libfoo.so.1").unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].to_string(), "lib/libfoo.so.1");

        let link = lib_dir.join("libfoo.so.1");
        let target = fs::read_link(&link).unwrap();
        assert_eq!(target, PathBuf::from("libfoo.so.1.2"));
    }

    #[test]
    fn test_remove_file_tolerates_absent() {
        let p = posix();
        assert!(p.remove_file(Path::new("/nonexistent/nothing")).is_ok());
    }
}
