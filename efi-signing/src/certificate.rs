// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Certificate generation and conversion via `openssl`. */

use {
    crate::{
        artifacts::{require_artifact, WorkingFolder},
        error::{EfiSignError, Result, Step},
        tool::{resolve_tool, ToolInvocation},
    },
    std::path::{Path, PathBuf},
};

pub const DEFAULT_KEY_BITS: u32 = 2048;
pub const DEFAULT_VALIDITY_DAYS: u32 = 3650;

/// Parameters of the generated key pair and certificate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct KeyParameters {
    /// RSA modulus size.
    pub bits: u32,
    /// Days until the self-signed certificate expires.
    pub validity_days: u32,
}

impl Default for KeyParameters {
    fn default() -> Self {
        Self {
            bits: DEFAULT_KEY_BITS,
            validity_days: DEFAULT_VALIDITY_DAYS,
        }
    }
}

/// Interface to the `openssl` executable.
#[derive(Clone, Debug)]
pub struct Openssl {
    program: PathBuf,
}

impl Openssl {
    /// Use a specific `openssl` executable.
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
        }
    }

    /// Locate `openssl`, preferring an explicitly configured path.
    pub fn find(configured: Option<&Path>) -> Result<Self> {
        Ok(Self::new(resolve_tool(configured, "openssl")?))
    }

    /// `openssl req` creating a new key and a self-signed certificate from `openssl.cnf`.
    pub fn self_signed_certificate_command(
        &self,
        folder: &WorkingFolder,
        params: KeyParameters,
    ) -> ToolInvocation {
        let mut invocation = ToolInvocation::new(Step::GenerateCertificate, &self.program);
        invocation
            .arg("req")
            .arg("-new")
            .arg("-newkey")
            .arg(format!("rsa:{}", params.bits))
            .arg("-days")
            .arg(params.validity_days)
            .arg("-nodes")
            .arg("-x509")
            .arg("-keyout")
            .path_arg(folder.private_key_path())
            .arg("-out")
            .path_arg(folder.certificate_path())
            .arg("-config")
            .path_arg(folder.request_config_path());

        invocation
    }

    /// `openssl pkcs12 -export` bundling the key and certificate under `password`.
    pub fn export_archive_command(&self, folder: &WorkingFolder, password: &str) -> ToolInvocation {
        let mut invocation = ToolInvocation::new(Step::ExportArchive, &self.program);
        invocation
            .arg("pkcs12")
            .arg("-export")
            .arg("-out")
            .path_arg(folder.archive_path())
            .arg("-inkey")
            .path_arg(folder.private_key_path())
            .arg("-in")
            .path_arg(folder.certificate_path())
            .arg("-password")
            .secret_arg(format!("pass:{}", password), password);

        invocation
    }

    /// `openssl x509` transcoding the PEM certificate to DER.
    pub fn convert_to_der_command(&self, folder: &WorkingFolder) -> ToolInvocation {
        let mut invocation = ToolInvocation::new(Step::ConvertToDer, &self.program);
        invocation
            .arg("x509")
            .arg("-in")
            .path_arg(folder.certificate_path())
            .arg("-outform")
            .arg("DER")
            .arg("-out")
            .path_arg(folder.der_certificate_path());

        invocation
    }
}

/// Generate `mycert.key`, `mycert.crt` and the password protected `mycert.pfx`.
///
/// Requires `openssl.cnf` to exist in the working folder.
pub fn generate_certificates(
    openssl: &Openssl,
    folder: &WorkingFolder,
    password: &str,
    params: KeyParameters,
) -> Result<()> {
    if password.is_empty() {
        return Err(EfiSignError::EmptyPassword);
    }
    require_artifact(Step::GenerateCertificate, &folder.request_config_path())?;

    openssl
        .self_signed_certificate_command(folder, params)
        .run()?;
    openssl.export_archive_command(folder, password).run()?;

    log::info!("Certificates created: mycert.key, mycert.crt, mycert.pfx");

    Ok(())
}

/// Write `mycert.der` from the existing `mycert.crt`.
pub fn convert_to_der(openssl: &Openssl, folder: &WorkingFolder) -> Result<PathBuf> {
    require_artifact(Step::ConvertToDer, &folder.certificate_path())?;

    openssl.convert_to_der_command(folder).run()?;

    let path = folder.der_certificate_path();
    log::info!("DER format certificate created: {}", path.display());

    Ok(path)
}
