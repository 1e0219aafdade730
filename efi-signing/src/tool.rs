// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Running external tools. */

use {
    crate::error::{EfiSignError, Result, Step},
    std::{
        io::{BufRead, BufReader},
        path::{Path, PathBuf},
    },
};

/// Resolve the executable for an external tool.
///
/// A configured value containing a directory component is used as is. A
/// bare program name (the configured one or `default_name`) is looked up
/// on `PATH`.
pub fn resolve_tool(configured: Option<&Path>, default_name: &str) -> Result<PathBuf> {
    let program = configured.unwrap_or_else(|| Path::new(default_name));

    if program.components().count() > 1 {
        return Ok(program.to_path_buf());
    }

    which::which(program).map_err(|source| EfiSignError::ToolNotFound {
        tool: program.display().to_string(),
        source,
    })
}

/// A single invocation of an external tool on behalf of a pipeline step.
#[derive(Clone, Debug)]
pub struct ToolInvocation {
    step: Step,
    program: PathBuf,
    args: Vec<String>,
    /// Index into `args` and the sensitive text it carries.
    secrets: Vec<(usize, String)>,
}

impl ToolInvocation {
    pub fn new(step: Step, program: impl AsRef<Path>) -> Self {
        Self {
            step,
            program: program.as_ref().to_path_buf(),
            args: vec![],
            secrets: vec![],
        }
    }

    pub fn arg(&mut self, arg: impl ToString) -> &mut Self {
        self.args.push(arg.to_string());
        self
    }

    pub fn path_arg(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.args.push(path.as_ref().display().to_string());
        self
    }

    /// Add an argument containing sensitive data.
    ///
    /// `secret` is masked within this argument when the command line is
    /// logged. Other arguments are never altered.
    pub fn secret_arg(&mut self, arg: impl ToString, secret: impl ToString) -> &mut Self {
        self.secrets.push((self.args.len(), secret.to_string()));
        self.args.push(arg.to_string());
        self
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The command line suitable for logging, with secrets masked.
    pub fn redacted_command_line(&self) -> String {
        let mut line = self.program.display().to_string();

        for (index, arg) in self.args.iter().enumerate() {
            line.push(' ');

            match self.secrets.iter().find(|(i, _)| *i == index) {
                Some((_, secret)) if !secret.is_empty() => {
                    line.push_str(&arg.replace(secret.as_str(), "********"))
                }
                _ => line.push_str(arg),
            }
        }

        line
    }

    /// Run the tool to completion.
    ///
    /// Combined stdout and stderr of the tool is forwarded to the log line by
    /// line. A non-zero exit is reported as [EfiSignError::ToolFailed].
    pub fn run(&self) -> Result<()> {
        let program = self.program.display().to_string();
        log::debug!("{}: running {}", self.step, self.redacted_command_line());

        let command = duct::cmd(&self.program, &self.args)
            .stderr_to_stdout()
            .unchecked()
            .reader()
            .map_err(|source| EfiSignError::ToolSpawn {
                step: self.step,
                program: program.clone(),
                source,
            })?;
        {
            let reader = BufReader::new(&command);
            for line in reader.lines() {
                log::warn!("{}", line?);
            }
        }

        let output = command.try_wait()?.ok_or_else(|| {
            EfiSignError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "unable to wait on command",
            ))
        })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(EfiSignError::ToolFailed {
                step: self.step,
                program,
                status: output.status,
            })
        }
    }
}
