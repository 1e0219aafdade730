// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The end to end certificate generation and signing pipeline.

Stages run strictly in order and the first failure aborts the run:

1. Write `openssl.cnf`.
2. Generate the key, self-signed certificate and PKCS #12 archive.
3. Convert the certificate to DER.
4. Sign the target binary.
5. Generate a random GUID.

Artifacts produced before a failure are left in place.
*/

use {
    crate::{
        artifacts::WorkingFolder,
        certificate::{convert_to_der, generate_certificates, KeyParameters, Openssl},
        error::{EfiSignError, Result},
        guid::generate_guid,
        identity::IdentityFields,
        request_config::write_request_config,
        signing::validate_sign_target,
        signtool::{find_signtool, sign_efi_file, SignOptions},
    },
    std::path::PathBuf,
    uuid::Uuid,
};

/// Everything needed to run the full pipeline.
#[derive(Clone, Debug)]
pub struct PipelineSettings {
    /// Directory receiving all artifacts. Created if missing.
    pub folder: PathBuf,
    pub identity: IdentityFields,
    /// Password protecting the PKCS #12 archive.
    pub password: String,
    /// Binary to sign. Defaults to `loader.efi` in the working folder.
    pub target: Option<PathBuf>,
    pub openssl_path: Option<PathBuf>,
    pub signtool_path: Option<PathBuf>,
    pub key: KeyParameters,
    pub sign: SignOptions,
}

impl PipelineSettings {
    pub fn new(
        folder: impl Into<PathBuf>,
        identity: IdentityFields,
        password: impl ToString,
    ) -> Self {
        Self {
            folder: folder.into(),
            identity,
            password: password.to_string(),
            target: None,
            openssl_path: None,
            signtool_path: None,
            key: KeyParameters::default(),
            sign: SignOptions::default(),
        }
    }
}

/// Paths of everything a successful run produced.
#[derive(Clone, Debug)]
pub struct PipelineOutcome {
    pub request_config: PathBuf,
    pub private_key: PathBuf,
    pub certificate: PathBuf,
    pub archive: PathBuf,
    pub der_certificate: PathBuf,
    pub signed_target: PathBuf,
    pub guid: Uuid,
}

/// Orchestrates the five pipeline stages.
#[derive(Clone, Debug)]
pub struct SigningPipeline {
    settings: PipelineSettings,
}

impl SigningPipeline {
    pub fn new(settings: PipelineSettings) -> Self {
        Self { settings }
    }

    fn target_path(&self, folder: &WorkingFolder) -> PathBuf {
        match &self.settings.target {
            Some(target) if target.is_absolute() => target.clone(),
            Some(target) => folder.path().join(target),
            None => folder.default_target_path(),
        }
    }

    /// Check inputs before anything is written.
    ///
    /// Relative targets resolve against the working folder, which must
    /// already contain the file to sign.
    pub fn validate(&self) -> Result<()> {
        self.settings.identity.validate()?;

        if self.settings.password.is_empty() {
            return Err(EfiSignError::EmptyPassword);
        }

        let folder = WorkingFolder::new(&self.settings.folder)?;
        validate_sign_target(&self.target_path(&folder))?;

        Ok(())
    }

    /// Run every stage, stopping at the first error.
    pub fn run(&self) -> Result<PipelineOutcome> {
        self.validate()?;

        // Tools are resolved before any stage runs.
        let openssl = Openssl::find(self.settings.openssl_path.as_deref())?;
        let signtool = find_signtool(self.settings.signtool_path.as_deref())?;

        let folder = WorkingFolder::prepare(&self.settings.folder)?;
        let target = self.target_path(&folder);

        let request_config =
            write_request_config(&folder, &self.settings.identity, self.settings.key.bits)?;
        generate_certificates(
            &openssl,
            &folder,
            &self.settings.password,
            self.settings.key,
        )?;
        let der_certificate = convert_to_der(&openssl, &folder)?;
        sign_efi_file(
            &signtool,
            &folder,
            &self.settings.password,
            &target,
            &self.settings.sign,
        )?;
        let guid = generate_guid();

        Ok(PipelineOutcome {
            request_config,
            private_key: folder.private_key_path(),
            certificate: folder.certificate_path(),
            archive: folder.archive_path(),
            der_certificate,
            signed_target: target,
            guid,
        })
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::testutil::*};

    fn settings(folder: PathBuf) -> PipelineSettings {
        PipelineSettings::new(
            folder,
            IdentityFields::new("UK", "London", "London", "Linus Media Group", "Linus"),
            "Linus",
        )
    }

    #[test]
    fn validation_failure_writes_nothing() -> Result<()> {
        let folder = DEFAULT_TEMP_DIR.path().join("validation_failure_writes_nothing");

        let mut s = settings(folder.clone());
        s.identity.country = "United Kingdom".to_string();

        let res = SigningPipeline::new(s).run();
        assert!(matches!(res, Err(EfiSignError::InvalidIdentity { .. })));
        assert!(!folder.exists());

        Ok(())
    }

    #[test]
    fn missing_target_rejected() {
        let folder = DEFAULT_TEMP_DIR.path().join("missing_target_rejected");

        let res = SigningPipeline::new(settings(folder.clone())).validate();
        assert!(matches!(
            res,
            Err(EfiSignError::TargetNotSignable(p)) if p == folder.join("loader.efi")
        ));
    }

    #[test]
    fn empty_password_rejected() -> Result<()> {
        let folder = DEFAULT_TEMP_DIR.path().join("pipeline_empty_password");
        std::fs::create_dir(&folder)?;
        write_fake_efi(&folder)?;

        let mut s = settings(folder.clone());
        s.password.clear();

        assert!(matches!(
            SigningPipeline::new(s).validate(),
            Err(EfiSignError::EmptyPassword)
        ));
        assert!(!folder.join("openssl.cnf").exists());

        Ok(())
    }

    #[test]
    fn relative_target_resolves_in_folder() -> Result<()> {
        let folder = DEFAULT_TEMP_DIR.path().join("relative_target");
        std::fs::create_dir(&folder)?;
        std::fs::write(folder.join("boot.efi"), PE_STUB)?;

        let mut s = settings(folder);
        s.target = Some(PathBuf::from("boot.efi"));
        SigningPipeline::new(s).validate()?;

        Ok(())
    }
}
