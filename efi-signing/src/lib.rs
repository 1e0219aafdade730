// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Code signing of EFI binaries with a self-signed certificate.

This crate drives external tools. `openssl` generates a self-signed code
signing certificate, bundles it into a PKCS #12 archive and converts it to
DER. `signtool` then signs an EFI binary with the archive, requesting an
RFC 3161 timestamp.

[SigningPipeline] runs all stages in order. The individual stages are
exposed for callers wanting a subset.
*/

pub mod artifacts;
pub mod certificate;
pub mod error;
pub mod guid;
pub mod identity;
pub mod pipeline;
pub mod request_config;
pub mod signing;
pub mod signtool;
pub mod testutil;
pub mod tool;

pub use {
    artifacts::WorkingFolder,
    certificate::{convert_to_der, generate_certificates, KeyParameters, Openssl},
    error::{EfiSignError, Step},
    guid::generate_guid,
    identity::IdentityFields,
    pipeline::{PipelineOutcome, PipelineSettings, SigningPipeline},
    request_config::{render_request_config, write_request_config},
    signtool::{find_signtool, sign_efi_file, SignOptions, SigntoolSign, TimestampServer},
};
