// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Rendering of the `openssl req` configuration file. */

use {
    crate::{artifacts::WorkingFolder, error::Result, identity::IdentityFields},
    handlebars::Handlebars,
    once_cell::sync::Lazy,
    std::{collections::BTreeMap, path::PathBuf},
};

/// Extension block restricting the certificate to code signing.
pub const CODE_SIGNING_EXTENSIONS: &str = "\
[ v3_req ]
keyUsage = critical, digitalSignature
extendedKeyUsage = codeSigning
basicConstraints = critical, CA:FALSE
";

static HANDLEBARS: Lazy<Handlebars<'static>> = Lazy::new(|| {
    let mut handlebars = Handlebars::new();
    // Output is an INI-style config, not HTML.
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("openssl.cnf", include_str!("templates/openssl.cnf.hbs"))
        .unwrap();

    handlebars
});

/// Render the request config for a subject identity.
///
/// `key_bits` is advertised as `default_bits`. The `req` invocation passes
/// the key size explicitly as well.
pub fn render_request_config(identity: &IdentityFields, key_bits: u32) -> Result<String> {
    let mut data = BTreeMap::new();
    data.insert("key_bits", key_bits.to_string());
    data.insert("country", identity.country.clone());
    data.insert("state", identity.state.clone());
    data.insert("locality", identity.locality.clone());
    data.insert("organization", identity.organization.clone());
    if let Some(unit) = &identity.organizational_unit {
        data.insert("organizational_unit", unit.clone());
    }
    data.insert("common_name", identity.common_name.clone());

    Ok(HANDLEBARS.render("openssl.cnf", &data)?)
}

/// Write `openssl.cnf` into the working folder, replacing any existing file.
pub fn write_request_config(
    folder: &WorkingFolder,
    identity: &IdentityFields,
    key_bits: u32,
) -> Result<PathBuf> {
    let config = render_request_config(identity, key_bits)?;

    let path = folder.request_config_path();
    std::fs::write(&path, config)?;
    log::info!("openssl.cnf file created at {}", path.display());

    Ok(path)
}
