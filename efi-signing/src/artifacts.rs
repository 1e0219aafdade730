// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Layout of the working folder holding generated artifacts. */

use {
    crate::error::{EfiSignError, Result, Step},
    std::path::{Path, PathBuf},
};

pub const REQUEST_CONFIG_FILENAME: &str = "openssl.cnf";
pub const PRIVATE_KEY_FILENAME: &str = "mycert.key";
pub const CERTIFICATE_FILENAME: &str = "mycert.crt";
pub const ARCHIVE_FILENAME: &str = "mycert.pfx";
pub const DER_CERTIFICATE_FILENAME: &str = "mycert.der";

/// Default name of the binary to sign, relative to the working folder.
pub const DEFAULT_TARGET_FILENAME: &str = "loader.efi";

/// An absolute path to the directory all artifacts are written to.
///
/// Tools are always handed absolute paths derived from this. The process
/// working directory is never changed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WorkingFolder {
    root: PathBuf,
}

impl WorkingFolder {
    /// Resolve a folder to an absolute path without touching the filesystem.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let root = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        Ok(Self { root })
    }

    /// Resolve a folder and create it if it does not exist.
    pub fn prepare(path: impl AsRef<Path>) -> Result<Self> {
        let folder = Self::new(path)?;

        if !folder.root.is_dir() {
            log::info!("creating working folder {}", folder.root.display());
            std::fs::create_dir_all(&folder.root)?;
        }

        Ok(folder)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn request_config_path(&self) -> PathBuf {
        self.root.join(REQUEST_CONFIG_FILENAME)
    }

    pub fn private_key_path(&self) -> PathBuf {
        self.root.join(PRIVATE_KEY_FILENAME)
    }

    pub fn certificate_path(&self) -> PathBuf {
        self.root.join(CERTIFICATE_FILENAME)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.root.join(ARCHIVE_FILENAME)
    }

    pub fn der_certificate_path(&self) -> PathBuf {
        self.root.join(DER_CERTIFICATE_FILENAME)
    }

    pub fn default_target_path(&self) -> PathBuf {
        self.root.join(DEFAULT_TARGET_FILENAME)
    }
}

/// Fail with [EfiSignError::MissingArtifact] if a file a step consumes is absent.
pub fn require_artifact(step: Step, path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(EfiSignError::MissingArtifact {
            step,
            path: path.to_path_buf(),
        })
    }
}
