// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Interface to `signtool.exe`. */

use {
    crate::{
        artifacts::{require_artifact, WorkingFolder},
        error::{EfiSignError, Result, Step},
        signing::{validate_sign_target, FileBasedCodeSigningCertificate},
        tool::{resolve_tool, ToolInvocation},
    },
    std::path::{Path, PathBuf},
};

pub const DEFAULT_FILE_DIGEST_ALGORITHM: &str = "sha256";
pub const DEFAULT_TIMESTAMP_URL: &str = "http://timestamp.digicert.com";
pub const DEFAULT_TIMESTAMP_DIGEST_ALGORITHM: &str = "sha256";

/// RFC 3161 timestamp server to use during signing.
///
/// Corresponds to the signtool flags `/tr` and `/td`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TimestampServer {
    pub url: String,
    pub digest_algorithm: String,
}

impl TimestampServer {
    pub fn new(url: impl ToString, digest_algorithm: impl ToString) -> Self {
        Self {
            url: url.to_string(),
            digest_algorithm: digest_algorithm.to_string(),
        }
    }
}

impl Default for TimestampServer {
    fn default() -> Self {
        Self::new(DEFAULT_TIMESTAMP_URL, DEFAULT_TIMESTAMP_DIGEST_ALGORITHM)
    }
}

/// Locate `signtool`, preferring an explicitly configured path.
pub fn find_signtool(configured: Option<&Path>) -> Result<PathBuf> {
    resolve_tool(configured, "signtool")
}

/// Represents an invocation of `signtool.exe sign` to sign some files.
#[derive(Clone, Debug)]
pub struct SigntoolSign {
    certificate: FileBasedCodeSigningCertificate,
    verbose: bool,
    description: Option<String>,
    file_digest_algorithm: Option<String>,
    timestamp_server: Option<TimestampServer>,
    sign_files: Vec<PathBuf>,
}

impl SigntoolSign {
    /// Construct a new instance using a specified signing certificate.
    pub fn new(certificate: FileBasedCodeSigningCertificate) -> Self {
        Self {
            certificate,
            verbose: false,
            description: None,
            file_digest_algorithm: None,
            timestamp_server: None,
            sign_files: vec![],
        }
    }

    /// Run signtool in verbose mode.
    ///
    /// Activates the `/v` flag.
    pub fn verbose(&mut self) -> &mut Self {
        self.verbose = true;
        self
    }

    /// Set the description of the content to be signed.
    ///
    /// This is passed into the `/d` argument.
    pub fn description(&mut self, description: impl ToString) -> &mut Self {
        self.description = Some(description.to_string());
        self
    }

    /// Set the file digest algorithm to use.
    ///
    /// This is passed into the `/fd` argument.
    pub fn file_digest_algorithm(&mut self, algorithm: impl ToString) -> &mut Self {
        self.file_digest_algorithm = Some(algorithm.to_string());
        self
    }

    /// Set the timestamp server to use when signing.
    pub fn timestamp_server(&mut self, server: TimestampServer) -> &mut Self {
        self.timestamp_server = Some(server);
        self
    }

    /// Mark a file path as to be signed.
    pub fn sign_file(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.sign_files.push(path.as_ref().to_path_buf());
        self
    }

    /// Build the `signtool sign` invocation with requested options.
    pub fn command(&self, signtool: &Path) -> ToolInvocation {
        let mut invocation = ToolInvocation::new(Step::Sign, signtool);
        invocation.arg("sign");

        if self.verbose {
            invocation.arg("/v");
        }

        if let Some(algorithm) = &self.file_digest_algorithm {
            invocation.arg("/fd").arg(algorithm);
        }

        invocation.arg("/f").path_arg(self.certificate.path());
        if let Some(password) = self.certificate.password() {
            invocation.arg("/p").secret_arg(password, password);
        }

        if let Some(description) = &self.description {
            invocation.arg("/d").arg(description);
        }

        if let Some(server) = &self.timestamp_server {
            invocation
                .arg("/tr")
                .arg(&server.url)
                .arg("/td")
                .arg(&server.digest_algorithm);
        }

        for path in &self.sign_files {
            invocation.path_arg(path);
        }

        invocation
    }

    /// Run `signtool sign` with requested options.
    pub fn run(&self, signtool: &Path) -> Result<()> {
        self.command(signtool).run()
    }
}

/// Options for signing a binary with the archive from the working folder.
#[derive(Clone, Debug)]
pub struct SignOptions {
    pub file_digest_algorithm: String,
    pub timestamp_server: TimestampServer,
    pub description: Option<String>,
    pub verbose: bool,
}

impl Default for SignOptions {
    fn default() -> Self {
        Self {
            file_digest_algorithm: DEFAULT_FILE_DIGEST_ALGORITHM.to_string(),
            timestamp_server: TimestampServer::default(),
            description: None,
            verbose: false,
        }
    }
}

/// Sign `target` in place using `mycert.pfx` from the working folder.
pub fn sign_efi_file(
    signtool: &Path,
    folder: &WorkingFolder,
    password: &str,
    target: &Path,
    options: &SignOptions,
) -> Result<()> {
    if password.is_empty() {
        return Err(EfiSignError::EmptyPassword);
    }
    let archive = folder.archive_path();
    require_artifact(Step::Sign, &archive)?;
    validate_sign_target(target)?;

    let mut certificate = FileBasedCodeSigningCertificate::new(&archive);
    certificate.set_password(password);

    let mut sign = SigntoolSign::new(certificate);
    sign.file_digest_algorithm(&options.file_digest_algorithm)
        .timestamp_server(options.timestamp_server.clone())
        .sign_file(target);
    if let Some(description) = &options.description {
        sign.description(description);
    }
    if options.verbose {
        sign.verbose();
    }

    sign.run(signtool)?;
    log::info!("Signed the EFI bootloader: {}", target.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_signtool() {
        let res = find_signtool(None);

        // Only Windows SDK installs put signtool on PATH.
        if cfg!(target_family = "unix") {
            assert!(res.is_err());
        }
    }

    #[cfg(unix)]
    #[test]
    fn sign_arguments() {
        let mut certificate = FileBasedCodeSigningCertificate::new("/tmp/zk/mycert.pfx");
        certificate.set_password("Linus");

        let mut sign = SigntoolSign::new(certificate);
        sign.file_digest_algorithm(DEFAULT_FILE_DIGEST_ALGORITHM)
            .timestamp_server(TimestampServer::default())
            .sign_file("/tmp/zk/loader.efi");

        let invocation = sign.command(Path::new("signtool"));
        assert_eq!(
            invocation.args().join(" "),
            "sign /fd sha256 /f /tmp/zk/mycert.pfx /p Linus \
             /tr http://timestamp.digicert.com /td sha256 /tmp/zk/loader.efi"
        );
        assert_eq!(
            invocation.redacted_command_line(),
            "signtool sign /fd sha256 /f /tmp/zk/mycert.pfx /p ******** \
             /tr http://timestamp.digicert.com /td sha256 /tmp/zk/loader.efi"
        );
    }

    #[test]
    fn optional_flags() {
        let mut sign = SigntoolSign::new(FileBasedCodeSigningCertificate::new("cert.pfx"));
        sign.verbose().description("bootloader").sign_file("a.efi");

        let args = sign.command(Path::new("signtool")).args().to_vec();
        assert_eq!(args, vec!["sign", "/v", "/f", "cert.pfx", "/d", "bootloader", "a.efi"]);
    }
}
