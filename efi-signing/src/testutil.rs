// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Helpers for tests exercising the pipeline against stand-in tools. */

use {
    once_cell::sync::Lazy,
    std::path::{Path, PathBuf},
};

pub static DEFAULT_TEMP_DIR: Lazy<tempfile::TempDir> = Lazy::new(|| {
    tempfile::Builder::new()
        .prefix("efi-signing-test")
        .tempdir()
        .expect("unable to create temporary directory")
});

/// Minimal bytes carrying a DOS header.
pub const PE_STUB: &[u8] = b"MZ\x90\0\x03\0\0\0\x04\0\0\0\xff\xff\0\0fake efi image";

/// Write a `loader.efi` that passes signability checks.
pub fn write_fake_efi(dir: &Path) -> std::io::Result<PathBuf> {
    let path = dir.join("loader.efi");
    std::fs::write(&path, PE_STUB)?;

    Ok(path)
}

/// Write a shell script standing in for `openssl` or `signtool`.
///
/// Every invocation appends `<script name> <args>` as one line to `log_path`.
/// Files following `-out` or `-keyout` are created. For `sign` the last
/// argument gets bytes appended. If the first argument equals `fail_on`, the
/// script exits 3 without creating anything.
///
/// Executing a freshly written script while another thread forks can fail
/// with `ETXTBSY`, so callers should write stubs before running tests
/// concurrently.
#[cfg(unix)]
pub fn write_stub_tool(
    dir: &Path,
    name: &str,
    log_path: &Path,
    fail_on: Option<&str>,
) -> std::io::Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let script = format!(
        "#!/bin/sh\n\
         printf '%s %s\\n' '{name}' \"$*\" >> '{log}'\n\
         if [ \"$1\" = '{fail}' ]; then\n\
         \x20 echo \"{name}: stub failure\" >&2\n\
         \x20 exit 3\n\
         fi\n\
         prev=\n\
         last=\n\
         for arg in \"$@\"; do\n\
         \x20 case \"$prev\" in\n\
         \x20   -out|-keyout) printf 'stub output\\n' > \"$arg\" ;;\n\
         \x20 esac\n\
         \x20 prev=$arg\n\
         \x20 last=$arg\n\
         done\n\
         if [ \"$1\" = 'sign' ]; then\n\
         \x20 printf 'signature' >> \"$last\"\n\
         fi\n\
         exit 0\n",
        name = name,
        log = log_path.display(),
        fail = fail_on.unwrap_or("<never>"),
    );

    let path = dir.join(name);
    std::fs::write(&path, script)?;
    let mut permissions = std::fs::metadata(&path)?.permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(&path, permissions)?;

    Ok(path)
}

/// Lines recorded by stub tools, in invocation order.
pub fn read_invocations(log_path: &Path) -> std::io::Result<Vec<String>> {
    if !log_path.exists() {
        return Ok(vec![]);
    }

    Ok(std::fs::read_to_string(log_path)?
        .lines()
        .map(|l| l.to_string())
        .collect())
}
