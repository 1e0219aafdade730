// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Stub tools are shell scripts. Tests run sequentially from main() because
// exec'ing a script another thread just wrote can fail with ETXTBSY.

#![cfg_attr(not(unix), allow(unused_imports))]

use {
    anyhow::Result,
    efi_signing::{
        testutil::*, EfiSignError, IdentityFields, PipelineSettings, SigningPipeline, Step,
    },
    std::path::{Path, PathBuf},
};

#[cfg(unix)]
struct Fixture {
    folder: PathBuf,
    log: PathBuf,
    openssl: PathBuf,
    signtool: PathBuf,
}

#[cfg(unix)]
fn fixture(
    name: &str,
    openssl_fail_on: Option<&str>,
    signtool_fail_on: Option<&str>,
) -> Result<Fixture> {
    let root = DEFAULT_TEMP_DIR.path().join(name);
    let tools = root.join("tools");
    std::fs::create_dir_all(&tools)?;

    let folder = root.join("zk");
    let log = root.join("invocations.log");

    Ok(Fixture {
        openssl: write_stub_tool(&tools, "openssl", &log, openssl_fail_on)?,
        signtool: write_stub_tool(&tools, "signtool", &log, signtool_fail_on)?,
        folder,
        log,
    })
}

#[cfg(unix)]
fn settings(fixture: &Fixture) -> PipelineSettings {
    let mut settings = PipelineSettings::new(
        &fixture.folder,
        IdentityFields::new("UK", "London", "London", "Linus Media Group", "Linus"),
        "Linus",
    );
    settings.openssl_path = Some(fixture.openssl.clone());
    settings.signtool_path = Some(fixture.signtool.clone());

    settings
}

#[cfg(unix)]
fn p(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(unix)]
fn end_to_end() -> Result<()> {
    let fixture = fixture("end_to_end", None, None)?;
    std::fs::create_dir_all(&fixture.folder)?;
    let target = write_fake_efi(&fixture.folder)?;

    let outcome = SigningPipeline::new(settings(&fixture)).run()?;
    let zk = &fixture.folder;

    let config = std::fs::read_to_string(zk.join("openssl.cnf"))?;
    assert!(config.contains("CN = Linus\n"));
    assert_eq!(outcome.request_config, zk.join("openssl.cnf"));

    let invocations = read_invocations(&fixture.log)?;
    assert_eq!(
        invocations,
        vec![
            format!(
                "openssl req -new -newkey rsa:2048 -days 3650 -nodes -x509 -keyout {} -out {} -config {}",
                p(&zk.join("mycert.key")),
                p(&zk.join("mycert.crt")),
                p(&zk.join("openssl.cnf"))
            ),
            format!(
                "openssl pkcs12 -export -out {} -inkey {} -in {} -password pass:Linus",
                p(&zk.join("mycert.pfx")),
                p(&zk.join("mycert.key")),
                p(&zk.join("mycert.crt"))
            ),
            format!(
                "openssl x509 -in {} -outform DER -out {}",
                p(&zk.join("mycert.crt")),
                p(&zk.join("mycert.der"))
            ),
            format!(
                "signtool sign /fd sha256 /f {} /p Linus /tr http://timestamp.digicert.com /td sha256 {}",
                p(&zk.join("mycert.pfx")),
                p(&target)
            ),
        ]
    );

    for name in ["mycert.key", "mycert.crt", "mycert.pfx", "mycert.der"] {
        assert!(zk.join(name).is_file(), "{} created", name);
    }

    assert_eq!(outcome.signed_target, target);
    assert!(std::fs::read(&target)?.ends_with(b"signature"));
    assert_eq!(outcome.guid.get_version_num(), 4);

    Ok(())
}

#[cfg(unix)]
fn aborts_on_first_failure() -> Result<()> {
    let fixture = fixture("aborts_on_first_failure", Some("pkcs12"), None)?;
    std::fs::create_dir_all(&fixture.folder)?;
    write_fake_efi(&fixture.folder)?;

    let err = SigningPipeline::new(settings(&fixture)).run().unwrap_err();
    assert_eq!(err.step(), Some(Step::ExportArchive));
    assert!(matches!(err, EfiSignError::ToolFailed { status, .. } if status.code() == Some(3)));

    let invocations = read_invocations(&fixture.log)?;
    assert_eq!(invocations.len(), 2);
    assert!(invocations[0].starts_with("openssl req "));
    assert!(invocations[1].starts_with("openssl pkcs12 "));

    // Earlier artifacts stay; nothing later is produced.
    assert!(fixture.folder.join("mycert.crt").is_file());
    assert!(!fixture.folder.join("mycert.pfx").exists());
    assert!(!fixture.folder.join("mycert.der").exists());

    Ok(())
}

#[cfg(unix)]
fn signing_failure_reported() -> Result<()> {
    let fixture = fixture("signing_failure_reported", None, Some("sign"))?;
    std::fs::create_dir_all(&fixture.folder)?;
    let target = write_fake_efi(&fixture.folder)?;

    let err = SigningPipeline::new(settings(&fixture)).run().unwrap_err();
    assert_eq!(err.step(), Some(Step::Sign));
    assert_eq!(std::fs::read(&target)?, PE_STUB);
    assert!(fixture.folder.join("mycert.der").is_file());

    Ok(())
}

#[cfg(unix)]
fn creates_folder_for_external_target() -> Result<()> {
    let fixture = fixture("creates_folder_for_external_target", None, None)?;
    let elsewhere = DEFAULT_TEMP_DIR.path().join("creates_folder_for_external_target");
    let target = write_fake_efi(&elsewhere)?;
    assert!(!fixture.folder.exists());

    let mut settings = settings(&fixture);
    settings.target = Some(target.clone());
    settings.sign.description = Some("test loader".to_string());

    SigningPipeline::new(settings).run()?;
    assert!(fixture.folder.join("openssl.cnf").is_file());

    let invocations = read_invocations(&fixture.log)?;
    assert!(invocations[3].contains(" /d test loader "));
    assert!(invocations[3].ends_with(&p(&target)));

    Ok(())
}

#[cfg(unix)]
fn run() -> Result<()> {
    end_to_end()?;
    aborts_on_first_failure()?;
    signing_failure_reported()?;
    creates_folder_for_external_target()?;

    Ok(())
}

#[cfg(not(unix))]
fn run() -> Result<()> {
    eprintln!("skipping tests because stub tools require a POSIX shell");
    Ok(())
}

fn main() {
    run().expect("all tests should pass");
}
