// src/hooks.rs

//! External collaborators: app-hook registration and post-install
//!
//! Desktop-integration registration and the package-supplied
//! post-install program are opaque external calls taking a path
//! argument. Their failures are observed and logged by the orchestrator,
//! never propagated as fatal. Subprocesses run with stdin nullified and
//! a timeout so a wedged hook cannot hang an install.

use crate::error::{Error, Result};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info};
use wait_timeout::ChildExt;

/// Default timeout for hook and post-install programs.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Desktop-integration (application menu) registration.
pub trait AppHooks {
    /// Register applications declared by `dat` for a package installed
    /// at `prefix`.
    fn install_app(&self, dat: &Path, prefix: &Path) -> Result<()>;

    /// Unregister applications declared by `dat`.
    fn uninstall_app(&self, dat: &Path, prefix: &Path) -> Result<()>;
}

/// Hook implementation for systems without desktop integration.
#[derive(Debug, Default)]
pub struct NoopAppHooks;

impl AppHooks for NoopAppHooks {
    fn install_app(&self, dat: &Path, _prefix: &Path) -> Result<()> {
        debug!("No app hooks configured, skipping {}", dat.display());
        Ok(())
    }

    fn uninstall_app(&self, dat: &Path, _prefix: &Path) -> Result<()> {
        debug!("No app hooks configured, skipping {}", dat.display());
        Ok(())
    }
}

/// Hooks that delegate to external registration programs, each invoked
/// as `<program> <dat> --prefix <prefix>`.
pub struct ExternalAppHooks {
    install_program: std::path::PathBuf,
    uninstall_program: std::path::PathBuf,
    timeout: Duration,
}

impl ExternalAppHooks {
    pub fn new(
        install_program: impl Into<std::path::PathBuf>,
        uninstall_program: impl Into<std::path::PathBuf>,
    ) -> Self {
        Self {
            install_program: install_program.into(),
            uninstall_program: uninstall_program.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl AppHooks for ExternalAppHooks {
    fn install_app(&self, dat: &Path, prefix: &Path) -> Result<()> {
        run_checked(
            Command::new(&self.install_program)
                .arg(dat)
                .arg("--prefix")
                .arg(prefix),
            self.timeout,
        )
    }

    fn uninstall_app(&self, dat: &Path, prefix: &Path) -> Result<()> {
        run_checked(
            Command::new(&self.uninstall_program)
                .arg(dat)
                .arg("--prefix")
                .arg(prefix),
            self.timeout,
        )
    }
}

/// Run the package-supplied post-install program:
/// `<interpreter> <script> --prefix <prefix>`, from the script's
/// directory. The caller decides whether a failure matters.
pub fn run_post_install(interpreter: &Path, script: &Path, prefix: &Path) -> Result<()> {
    let cwd = script.parent().unwrap_or(prefix);
    info!("Running post-install script {}", script.display());
    run_checked(
        Command::new(interpreter)
            .arg(script)
            .arg("--prefix")
            .arg(prefix)
            .current_dir(cwd),
        DEFAULT_TIMEOUT,
    )
}

/// Spawn, bound by a timeout, and surface a non-zero exit as an error.
fn run_checked(command: &mut Command, timeout: Duration) -> Result<()> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    match child.wait_timeout(timeout)? {
        Some(status) if status.success() => Ok(()),
        Some(status) => Err(Error::Config(format!(
            "external program exited with {}",
            status
        ))),
        None => {
            child.kill()?;
            child.wait()?;
            Err(Error::Config(format!(
                "external program timed out after {:?}",
                timeout
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_hooks_accept_anything() {
        let hooks = NoopAppHooks;
        assert!(hooks
            .install_app(Path::new("/nonexistent/appinst.dat"), Path::new("/p"))
            .is_ok());
        assert!(hooks
            .uninstall_app(Path::new("/nonexistent/appinst.dat"), Path::new("/p"))
            .is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_external_hook_success_and_failure() {
        let ok = ExternalAppHooks::new("/bin/true", "/bin/false");
        assert!(ok.install_app(Path::new("x.dat"), Path::new("/tmp")).is_ok());
        assert!(ok
            .uninstall_app(Path::new("x.dat"), Path::new("/tmp"))
            .is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_program_is_an_error() {
        let hooks = ExternalAppHooks::new("/nonexistent/prog", "/nonexistent/prog");
        assert!(hooks
            .install_app(Path::new("x.dat"), Path::new("/tmp"))
            .is_err());
    }
}
