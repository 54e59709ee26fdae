//! Shared helpers for catalogue tests

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary directory holding a `clouds.yaml`.
pub struct CatalogueDir {
    dir: TempDir,
}

impl CatalogueDir {
    pub fn new(content: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("clouds.yaml"), content).unwrap();
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn catalogue_path(&self) -> PathBuf {
        self.dir.path().join("clouds.yaml")
    }

    pub fn write_secure(&self, content: &str) {
        fs::write(self.dir.path().join("secure.yaml"), content).unwrap();
    }
}

/// Runs `f` with every `OS_*` variable unset and the catalogue pointing at `dir`.
pub fn without_os_env<F: FnOnce()>(dir: &CatalogueDir, f: F) {
    let mut vars: Vec<(&str, Option<String>)> = stratoform_config::env::ALL
        .iter()
        .map(|name| (*name, None))
        .collect();
    vars.retain(|(name, _)| *name != "OS_CLIENT_CONFIG_FILE");
    vars.push((
        "OS_CLIENT_CONFIG_FILE",
        Some(dir.catalogue_path().display().to_string()),
    ));
    temp_env::with_vars(vars, f);
}
