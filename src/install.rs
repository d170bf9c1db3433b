//! Placement of rendered job definitions in a job directory.
use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use crate::{config::load_manifest, error::InstallError, job::JobBuilder};

/// Directory Upstart reads system job definitions from.
pub const SYSTEM_JOB_DIR: &str = "/etc/init";

/// Writes, removes and overrides `<name>.conf` files in a job directory.
#[derive(Clone, Debug)]
pub struct JobInstaller {
    dir: PathBuf,
}

impl JobInstaller {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Installer for the system job directory.
    pub fn system() -> Self {
        Self::new(SYSTEM_JOB_DIR)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the definition for `name`.
    pub fn job_path(&self, name: &str) -> Result<PathBuf, InstallError> {
        validate_job_name(name)?;
        Ok(self.dir.join(format!("{name}.conf")))
    }

    /// Path of the override file for `name`.
    pub fn override_path(&self, name: &str) -> Result<PathBuf, InstallError> {
        validate_job_name(name)?;
        Ok(self.dir.join(format!("{name}.override")))
    }

    pub fn is_installed(&self, name: &str) -> Result<bool, InstallError> {
        Ok(self.job_path(name)?.exists())
    }

    /// Renders `job` and writes it as `<name>.conf`, replacing any previous definition.
    pub fn install(&self, name: &str, job: &JobBuilder) -> Result<PathBuf, InstallError> {
        let path = self.job_path(name)?;
        let rendered = job.render()?;

        fs::create_dir_all(&self.dir)?;
        fs::write(&path, rendered)?;
        info!("Installed job '{name}' at {}", path.display());
        Ok(path)
    }

    /// Loads a YAML manifest and installs it under its name (or file stem).
    pub fn install_manifest(&self, manifest_path: &Path) -> Result<PathBuf, InstallError> {
        let manifest = load_manifest(manifest_path)?;
        let name = manifest
            .name
            .clone()
            .ok_or_else(|| InstallError::InvalidJobName(manifest_path.display().to_string()))?;
        let job = manifest.to_builder()?;
        self.install(&name, &job)
    }

    /// Removes the definition and any override file for `name`.
    pub fn uninstall(&self, name: &str) -> Result<(), InstallError> {
        let path = self.job_path(name)?;
        if !path.exists() {
            return Err(InstallError::NotInstalled(name.to_string()));
        }

        fs::remove_file(&path)?;
        let override_path = self.override_path(name)?;
        if override_path.exists() {
            fs::remove_file(&override_path)?;
        }
        info!("Removed job '{name}' from {}", self.dir.display());
        Ok(())
    }

    /// Toggles the `manual` override, which stops the job starting on its events.
    pub fn set_manual(&self, name: &str, manual: bool) -> Result<(), InstallError> {
        let override_path = self.override_path(name)?;
        if manual {
            fs::create_dir_all(&self.dir)?;
            fs::write(&override_path, "manual\n")?;
            debug!("Wrote manual override for '{name}'");
        } else if override_path.exists() {
            fs::remove_file(&override_path)?;
            debug!("Removed manual override for '{name}'");
        }
        Ok(())
    }
}

/// Job names map directly to file names, so they cannot contain path separators.
pub fn validate_job_name(name: &str) -> Result<(), InstallError> {
    if name.is_empty() || name.contains('/') || name.starts_with('.') {
        return Err(InstallError::InvalidJobName(name.to_string()));
    }
    Ok(())
}
