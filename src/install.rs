// src/install.rs

//! Installation orchestrator
//!
//! Composes the bundle, classifier, patcher, and platform capability
//! into the transactional install/uninstall state machine. The phases
//! are linear with no branching back:
//!
//! ```text
//! NotInstalled -> RemovingOldMetadata -> WritingFiles -> LinkingExecutables
//!   -> PatchingObjectCode -> InstallingScripts -> RunningAppHooks
//!   -> RunningPostInstall -> CommittingManifest -> Installed
//! ```
//!
//! The manifest commit is the single last write of an install: a crash
//! at any earlier point leaves the package observably "not installed".
//! Uninstall is the dual, driven entirely by the manifest, and deletes
//! the manifest before any file so a crash mid-removal leaves "not
//! installed" rather than a ghost entry. The engine assumes exclusive
//! access to the prefix for the duration of one call; callers serialize
//! concurrent operations.

use crate::bundle::Bundle;
use crate::error::{Error, Result};
use crate::hooks::{self, AppHooks, NoopAppHooks};
use crate::manifest::{self, Manifest, PackageInfo, META_DIR};
use crate::metadata::{EggMetadata, ScriptKind};
use crate::patch::ObjectCodePatcher;
use crate::path::FilePath;
use crate::placement::{is_namespace, Category, PlacementClassifier};
use crate::platform::Platform;
use crate::progress::ProgressTracker;
use std::collections::BTreeSet;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Copy granularity for streaming bundle members to disk.
const CHUNK_SIZE: usize = 1 << 20;

/// Linear install phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPhase {
    NotInstalled,
    /// Stale manifest deleted so no observer sees a mixed file set as
    /// "installed".
    RemovingOldMetadata,
    /// Bundle members classified and written in stable order.
    WritingFiles,
    /// Declared (source, target) link artifacts created.
    LinkingExecutables,
    /// Placeholder search paths rewritten in written binaries.
    PatchingObjectCode,
    /// Entry-point launcher scripts synthesized.
    InstallingScripts,
    /// Desktop-integration registration (non-fatal).
    RunningAppHooks,
    /// Package-supplied post-install program (non-fatal).
    RunningPostInstall,
    /// Manifest written atomically - the point the package becomes
    /// "installed".
    CommittingManifest,
    Installed,
}

impl InstallPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotInstalled => "not-installed",
            Self::RemovingOldMetadata => "removing-old-metadata",
            Self::WritingFiles => "writing-files",
            Self::LinkingExecutables => "linking-executables",
            Self::PatchingObjectCode => "patching-object-code",
            Self::InstallingScripts => "installing-scripts",
            Self::RunningAppHooks => "running-app-hooks",
            Self::RunningPostInstall => "running-post-install",
            Self::CommittingManifest => "committing-manifest",
            Self::Installed => "installed",
        }
    }
}

impl std::fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A target prefix plus the capabilities needed to install into it.
pub struct Installation {
    prefix: PathBuf,
    platform: Box<dyn Platform>,
    hooks: Box<dyn AppHooks>,
    patcher: ObjectCodePatcher,
}

impl Installation {
    pub fn new(prefix: impl Into<PathBuf>, platform: Box<dyn Platform>) -> Self {
        Self {
            prefix: prefix.into(),
            platform,
            hooks: Box::new(NoopAppHooks),
            patcher: ObjectCodePatcher::new(),
        }
    }

    pub fn with_hooks(mut self, hooks: Box<dyn AppHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_patcher(mut self, patcher: ObjectCodePatcher) -> Self {
        self.patcher = patcher;
        self
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// Install a bundle. Re-running after a failed attempt is safe:
    /// stale metadata removal plus clobber-on-write make re-entry
    /// idempotent.
    pub fn install(
        &self,
        bundle: &dyn Bundle,
        metadata: &EggMetadata,
        progress: &dyn ProgressTracker,
    ) -> Result<()> {
        info!(
            "Installing {} into {}",
            metadata.filename,
            self.prefix.display()
        );

        // finish() fires whether the install commits or aborts
        let result = self.run_phases(bundle, metadata, progress);
        progress.finish();
        result?;

        self.enter(InstallPhase::Installed);
        info!("Installed {}", metadata.filename);
        Ok(())
    }

    fn run_phases(
        &self,
        bundle: &dyn Bundle,
        metadata: &EggMetadata,
        progress: &dyn ProgressTracker,
    ) -> Result<()> {
        self.enter(InstallPhase::RemovingOldMetadata);
        self.remove_old(metadata)?;

        self.enter(InstallPhase::WritingFiles);
        progress.begin(bundle.installed_size());
        let mut written = self.write_files(bundle, metadata, progress)?;

        self.enter(InstallPhase::LinkingExecutables);
        written.extend(self.link_executables(bundle, metadata)?);

        self.enter(InstallPhase::PatchingObjectCode);
        self.patch_object_code(bundle, metadata, &written)?;

        self.enter(InstallPhase::InstallingScripts);
        written.extend(self.install_scripts(bundle, metadata)?);

        self.enter(InstallPhase::RunningAppHooks);
        self.run_app_hooks(metadata);

        self.enter(InstallPhase::RunningPostInstall);
        self.run_post_install(metadata);

        self.enter(InstallPhase::CommittingManifest);
        self.commit(bundle, metadata, written)
    }

    /// Remove a package by canonical name. A missing manifest means
    /// "not installed" and succeeds trivially.
    pub fn uninstall(&self, cname: &str) -> Result<()> {
        let manifest_path = Manifest::path_for(&self.prefix, cname);
        let manifest = match Manifest::load(&manifest_path) {
            Ok(manifest) => manifest,
            Err(Error::NotFound(_)) => {
                debug!("No manifest for {}, nothing to uninstall", cname);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        info!("Uninstalling {}", manifest.egg_name);

        // the manifest goes first: a crash from here on leaves "not
        // installed", never a ghost entry
        fs::remove_file(&manifest_path)?;

        let meta_dir = Manifest::meta_dir(&self.prefix, cname);
        let dat = meta_dir.join("inst").join("appinst.dat");
        if dat.is_file() {
            if let Err(e) = self.hooks.uninstall_app(&dat, &self.prefix) {
                warn!("App unregistration failed: {}", e);
            }
        }

        let mut dirs = BTreeSet::new();
        for rel in manifest.relative_files() {
            let abs = self.prefix.join(rel);
            if let Err(e) = self.platform.remove_file(&abs) {
                warn!("Could not remove {}: {}", abs.display(), e);
            }
            // compiled siblings of source files
            if rel.ends_with(".py") {
                for ext in ["c", "o"] {
                    let _ = fs::remove_file(abs.with_extension(format!("py{}", ext)));
                }
            }
            let mut parent = abs.parent();
            while let Some(dir) = parent {
                if dir == self.prefix || !dir.starts_with(&self.prefix) {
                    break;
                }
                dirs.insert(dir.to_path_buf());
                parent = dir.parent();
            }
        }

        // bottom-up, best effort: a non-empty directory is not an error
        let mut dirs: Vec<PathBuf> = dirs.into_iter().collect();
        dirs.sort_by_key(|dir| std::cmp::Reverse(dir.components().count()));
        for dir in dirs {
            let _ = fs::remove_dir(&dir);
        }

        let _ = fs::remove_dir_all(&meta_dir);
        info!("Uninstalled {}", manifest.egg_name);
        Ok(())
    }

    /// Bundle file names of every package installed under this prefix.
    pub fn installed(&self) -> Result<Vec<String>> {
        manifest::installed_packages(&self.prefix)
    }

    /// Load the manifest for an installed package.
    pub fn manifest(&self, cname: &str) -> Result<Manifest> {
        Manifest::load(&Manifest::path_for(&self.prefix, cname))
    }

    fn enter(&self, phase: InstallPhase) {
        debug!("Phase: {}", phase);
    }

    /// Delete any stale manifest for this package name so a concurrent
    /// observer never sees a half-old, half-new file set as "installed".
    fn remove_old(&self, metadata: &EggMetadata) -> Result<()> {
        let manifest_path = Manifest::path_for(&self.prefix, &metadata.cname);
        if manifest_path.is_file() {
            debug!("Removing stale manifest {}", manifest_path.display());
            fs::remove_file(&manifest_path)?;
        }
        Ok(())
    }

    /// Write every kept bundle member to its classified destination.
    fn write_files(
        &self,
        bundle: &dyn Bundle,
        metadata: &EggMetadata,
        progress: &dyn ProgressTracker,
    ) -> Result<Vec<FilePath>> {
        let classifier = PlacementClassifier::new(metadata, self.platform.as_ref());
        let mut written = Vec::new();

        for path in bundle.paths() {
            if classifier.should_skip(bundle, path) {
                continue;
            }
            let placement = classifier.classify(path);
            let dest = placement.dest.to_native(&self.prefix);

            if let Some(parent) = dest.parent() {
                // a file squatting on the parent path must go
                if parent.exists() && !parent.is_dir() {
                    self.platform.remove_file(parent)?;
                }
                fs::create_dir_all(parent)?;
            }
            self.platform.remove_file(&dest)?;

            // a namespace declaration keeps its import-time marker but
            // carries no code
            let namespace = path.last() == "__init__.py" && {
                let data = bundle.get_bytes(path)?;
                is_namespace(&data)
            };
            if namespace {
                fs::File::create(&dest)?;
            } else {
                let mut reader = bundle.open(path)?;
                let mut file = fs::File::create(&dest)?;
                let mut buf = vec![0u8; CHUNK_SIZE];
                loop {
                    let n = reader.read(&mut buf)?;
                    if n == 0 {
                        break;
                    }
                    file.write_all(&buf[..n])?;
                }
            }

            if placement.category == Category::Script {
                fix_interpreter_line(&dest, self.platform.interpreter(ScriptKind::Console))?;
            }
            if placement.executable {
                set_executable(&dest)?;
            }

            progress.advance(bundle.get_size(path)?);
            written.push(placement.dest);
        }

        debug!("Wrote {} files", written.len());
        Ok(written)
    }

    /// Create the declared link artifacts next to their installed
    /// sources.
    fn link_executables(
        &self,
        bundle: &dyn Bundle,
        metadata: &EggMetadata,
    ) -> Result<Vec<FilePath>> {
        let classifier = PlacementClassifier::new(metadata, self.platform.as_ref());
        let mut written = Vec::new();
        for (source, link_name) in metadata.executables(bundle)? {
            let dest = classifier.classify(&source).dest;
            written.extend(
                self.platform
                    .link_executable(&self.prefix, &dest, &link_name)?,
            );
        }
        Ok(written)
    }

    /// Offer every written regular file to the patcher, with the
    /// default plus package-declared search directories as targets.
    fn patch_object_code(
        &self,
        bundle: &dyn Bundle,
        metadata: &EggMetadata,
        written: &[FilePath],
    ) -> Result<()> {
        let targets: Vec<String> = metadata
            .library_dirs(bundle)?
            .iter()
            .map(|dir| self.prefix.join(dir).display().to_string())
            .collect();

        for path in written {
            let abs = path.to_native(&self.prefix);
            // symlinks point at files patched under their own name
            let is_regular = fs::symlink_metadata(&abs)
                .map(|meta| meta.is_file())
                .unwrap_or(false);
            if is_regular {
                self.patcher.patch_file(&abs, &targets)?;
            }
        }
        Ok(())
    }

    /// Synthesize launcher scripts for declared entry points.
    fn install_scripts(
        &self,
        bundle: &dyn Bundle,
        metadata: &EggMetadata,
    ) -> Result<Vec<FilePath>> {
        let mut written = Vec::new();
        for (kind, entry_point) in metadata.scripts(bundle)? {
            let Some(attr) = entry_point.attr else {
                warn!(
                    "Skipping entry point {} without a callable attribute",
                    entry_point.name
                );
                continue;
            };

            let file_name = self.platform.script_name(&entry_point.name, kind);
            let rel = FilePath::new(
                self.platform
                    .bin_dir()
                    .iter()
                    .cloned()
                    .chain([file_name]),
            )?;
            let dest = rel.to_native(&self.prefix);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }

            let interpreter = self.platform.interpreter(kind);
            let import = attr.split('.').next().unwrap_or(&attr);
            let script = format!(
                "#!{}\n\
                 # This launcher script was created when installing:\n\
                 #\n\
                 #   {}\n\
                 #\n\
                 if __name__ == '__main__':\n\
                 \x20   import sys\n\
                 \x20   from {} import {}\n\
                 \n\
                 \x20   sys.exit({}())\n",
                interpreter.display(),
                metadata.filename,
                entry_point.module,
                import,
                attr,
            );
            fs::write(&dest, script)?;
            set_executable(&dest)?;
            debug!("Installed entry point script {}", rel);

            written.push(rel);
            written.extend(
                self.platform
                    .script_extras(&self.prefix, &entry_point.name, kind)?,
            );
        }
        Ok(written)
    }

    /// Desktop-integration registration. Failures are logged, never
    /// fatal.
    fn run_app_hooks(&self, metadata: &EggMetadata) {
        let dat = Manifest::meta_dir(&self.prefix, &metadata.cname)
            .join("inst")
            .join("appinst.dat");
        if !dat.is_file() {
            return;
        }
        if let Err(e) = self.hooks.install_app(&dat, &self.prefix) {
            warn!("App registration failed: {}", e);
        }
    }

    /// Package-supplied post-install program. Failures are logged,
    /// never fatal.
    fn run_post_install(&self, metadata: &EggMetadata) {
        let script =
            Manifest::meta_dir(&self.prefix, &metadata.cname).join("post_egginst.py");
        if !script.is_file() {
            return;
        }
        let interpreter = self.platform.interpreter(ScriptKind::Console);
        if let Err(e) = hooks::run_post_install(interpreter, &script, &self.prefix) {
            warn!("Post-install script failed: {}", e);
        }
    }

    /// Persist the descriptive document and then the manifest - the
    /// single last write of the install.
    fn commit(
        &self,
        bundle: &dyn Bundle,
        metadata: &EggMetadata,
        mut written: Vec<FilePath>,
    ) -> Result<()> {
        let info = PackageInfo::new(
            &metadata.filename,
            bundle.installed_size(),
            metadata.info(bundle)?,
        );
        info.write_atomic(&PackageInfo::path_for(&self.prefix, &metadata.cname))?;
        written.push(FilePath::new([
            META_DIR.to_string(),
            metadata.cname.clone(),
            crate::manifest::INFO_NAME.to_string(),
        ])?);

        let manifest = Manifest::new(
            &metadata.filename,
            &self.prefix,
            &metadata.cname,
            bundle.installed_size(),
            &written,
        );
        manifest.write_atomic(&Manifest::path_for(&self.prefix, &metadata.cname))?;
        Ok(())
    }
}

/// Rewrite a `#!...python...` interpreter line in a raw script so it
/// points at the installed interpreter.
fn fix_interpreter_line(path: &Path, interpreter: &Path) -> Result<()> {
    let data = fs::read(path)?;
    if !data.starts_with(b"#!") {
        return Ok(());
    }
    let line_end = data.iter().position(|&b| b == b'\n').unwrap_or(data.len());
    let first_line = String::from_utf8_lossy(&data[..line_end]);
    if !first_line.contains("python") {
        return Ok(());
    }

    let mut fixed = format!("#!{}", interpreter.display()).into_bytes();
    fixed.extend_from_slice(&data[line_end..]);
    fs::write(path, fixed)?;
    debug!("Fixed interpreter line in {}", path.display());
    Ok(())
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}
