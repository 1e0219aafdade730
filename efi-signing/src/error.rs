// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use {
    std::{fmt, path::PathBuf, process::ExitStatus},
    thiserror::Error,
};

/// A stage of the signing pipeline.
///
/// Used to attribute failures to the step that produced them.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Step {
    WriteRequestConfig,
    GenerateCertificate,
    ExportArchive,
    ConvertToDer,
    Sign,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::WriteRequestConfig => "writing certificate request config",
            Self::GenerateCertificate => "generating key and self-signed certificate",
            Self::ExportArchive => "exporting PKCS #12 archive",
            Self::ConvertToDer => "converting certificate to DER",
            Self::Sign => "signing target binary",
        })
    }
}

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum EfiSignError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("template rendering error: {0}")]
    Template(#[from] handlebars::RenderError),

    #[error("unable to locate {tool}: {source}")]
    ToolNotFound { tool: String, source: which::Error },

    #[error("{step}: unable to launch {program}: {source}")]
    ToolSpawn {
        step: Step,
        program: String,
        source: std::io::Error,
    },

    #[error("{step}: {program} exited with {status}")]
    ToolFailed {
        step: Step,
        program: String,
        status: ExitStatus,
    },

    #[error("{step}: required file {} does not exist", .path.display())]
    MissingArtifact { step: Step, path: PathBuf },

    #[error("invalid {field}: {reason}")]
    InvalidIdentity { field: &'static str, reason: String },

    #[error("password must not be empty")]
    EmptyPassword,

    #[error("{} is not a signable PE or MSI file", .0.display())]
    TargetNotSignable(PathBuf),
}

impl EfiSignError {
    /// The pipeline step this error is attributed to, if any.
    pub fn step(&self) -> Option<Step> {
        match self {
            Self::ToolSpawn { step, .. }
            | Self::ToolFailed { step, .. }
            | Self::MissingArtifact { step, .. } => Some(*step),
            _ => None,
        }
    }
}

pub type Result<T, E = EfiSignError> = std::result::Result<T, E>;
