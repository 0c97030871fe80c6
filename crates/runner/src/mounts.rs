//! Named library directories made visible inside the sandbox.
//!
//! Tasks request libraries by name (`auxiliaryMounts`); the worker maps each
//! name to a host directory and links it as `<workdir>/<name>`, so
//! `include <BOSL2/std.scad>` resolves relative to the model.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::SandboxError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryMounts {
    dirs: BTreeMap<String, PathBuf>,
}

impl LibraryMounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `dir` under `name`, replacing any previous entry.
    pub fn with_mount(mut self, name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        self.dirs.insert(name.into(), dir.into());
        self
    }

    /// Parse a comma-separated `name=/host/dir` list.
    ///
    /// Blank entries are ignored, so an empty string yields no mounts.
    pub fn parse(spec: &str) -> Result<Self, SandboxError> {
        let mut mounts = Self::new();
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, dir) = entry
                .split_once('=')
                .ok_or_else(|| SandboxError::InvalidMountSpec(entry.to_string()))?;
            let name = name.trim();
            let dir = dir.trim();
            if !is_valid_name(name) || dir.is_empty() {
                return Err(SandboxError::InvalidMountSpec(entry.to_string()));
            }
            mounts = mounts.with_mount(name, dir);
        }
        Ok(mounts)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.dirs.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    /// Link every requested mount into `workdir`.
    pub async fn link_into(&self, workdir: &Path, requested: &[String]) -> Result<(), SandboxError> {
        for name in requested {
            let dir = self
                .dirs
                .get(name)
                .ok_or_else(|| SandboxError::UnknownMount(name.clone()))?;
            let link = workdir.join(name);
            link_dir(dir, &link).await?;
            tracing::debug!(mount = %name, dir = %dir.display(), "Linked library mount");
        }
        Ok(())
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

#[cfg(unix)]
async fn link_dir(dir: &Path, link: &Path) -> Result<(), SandboxError> {
    tokio::fs::symlink(dir, link).await?;
    Ok(())
}

#[cfg(windows)]
async fn link_dir(dir: &Path, link: &Path) -> Result<(), SandboxError> {
    tokio::fs::symlink_dir(dir, link).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
