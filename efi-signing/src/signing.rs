// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Signing certificates and signable binaries. */

use {
    crate::error::{EfiSignError, Result},
    std::{
        fs::File,
        io::{ErrorKind, Read},
        path::{Path, PathBuf},
    },
};

/// Represents a code signing certificate backed by a file.
///
/// Here always the `.pfx` archive produced by `openssl pkcs12 -export`.
#[derive(Clone, Debug)]
pub struct FileBasedCodeSigningCertificate {
    /// Path to the certificate file.
    path: PathBuf,
    /// Password used to unlock the certificate.
    password: Option<String>,
}

impl FileBasedCodeSigningCertificate {
    /// Construct an instance from a path.
    ///
    /// No validation is done that the path exists.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            password: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn password(&self) -> &Option<String> {
        &self.password
    }

    pub fn set_password(&mut self, password: impl ToString) {
        self.password = Some(password.to_string());
    }
}

/// Leading bytes of a PE image (the DOS stub).
const DOS_MAGIC: &[u8] = b"MZ";

/// Leading bytes of a compound file binary, the container format of MSI.
const CFB_MAGIC: &[u8] = &[0xd0, 0xcf, 0x11, 0xe0, 0xa1, 0xb1, 0x1a, 0xe1];

/// Bytes read from the target when sniffing its format.
const HEADER_LEN: usize = 16;

/// Ensure `path` is an existing regular file that `signtool` can sign.
///
/// Only the leading bytes are inspected: EFI applications are PE images,
/// and MSI packages are accepted as well. Files shorter than a header are
/// rejected.
pub fn validate_sign_target(path: &Path) -> Result<()> {
    let not_signable = || EfiSignError::TargetNotSignable(path.to_path_buf());

    if !path.is_file() {
        return Err(not_signable());
    }

    let mut header = [0u8; HEADER_LEN];
    match File::open(path)?.read_exact(&mut header) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Err(not_signable()),
        Err(e) => return Err(e.into()),
    }

    if header.starts_with(DOS_MAGIC) || header.starts_with(CFB_MAGIC) {
        Ok(())
    } else {
        Err(not_signable())
    }
}
