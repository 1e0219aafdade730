// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    clap::{value_parser, Arg, ArgAction, ArgMatches, Command},
    efi_signing::{
        convert_to_der, generate_certificates, generate_guid, sign_efi_file, write_request_config,
        EfiSignError, IdentityFields, KeyParameters, Openssl, PipelineSettings, SignOptions,
        SigningPipeline, TimestampServer, WorkingFolder,
    },
    log::LevelFilter,
    serde::Deserialize,
    std::path::{Path, PathBuf},
    thiserror::Error,
};

const RUN_ABOUT: &str = "\
Create a code signing certificate and sign an EFI binary with it.

The following steps run in order. The first failure aborts the run and
leaves files created by earlier steps in place.

1. Write openssl.cnf into the working folder (created if missing).
2. Run `openssl req` to create mycert.key and a self-signed mycert.crt.
3. Run `openssl pkcs12 -export` to bundle both into password protected
   mycert.pfx.
4. Run `openssl x509` to write mycert.der.
5. Run `signtool sign` with mycert.pfx against the target binary
   (loader.efi in the working folder by default), requesting an RFC 3161
   timestamp.
6. Print a freshly generated random GUID.

Inputs are validated before anything is written. The target binary must
already exist and look like a PE image.
";

const CONFIG_FILE_ABOUT: &str = "\
Configuration Files

Commands accept a `--config` argument naming a YAML file. Values given on
the command line take precedence over values in the file. Values that
remain unset are prompted for interactively unless `--no-prompt` is given.

The file is a single mapping. All keys are optional:

folder (string)
   Working folder receiving generated files. Defaults to the current
   directory.

target (string)
   Binary to sign. Relative paths resolve against the working folder.
   Defaults to `loader.efi`.

password (string)
   Password protecting mycert.pfx.

country, state, locality, organization, organizational_unit, common_name
(string)
   Subject of the generated certificate. `country` must be a two letter
   code. `organizational_unit` is omitted from the subject if unset.

openssl_path, signtool_path (string)
   Executables to run. Bare names are searched for on PATH.

file_digest (string)
   Digest algorithm for the signature. Defaults to `sha256`.

timestamp_url (string)
   RFC 3161 timestamp server. Defaults to `http://timestamp.digicert.com`.

timestamp_digest (string)
   Digest algorithm requested from the timestamp server. Defaults to
   `sha256`.

key_bits (integer)
   RSA key size. Defaults to 2048.

validity_days (integer)
   Certificate lifetime. Defaults to 3650.

description (string)
   Description embedded in the signature.
";

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    EfiSign(#[from] EfiSignError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),

    #[error("no value for {0}: pass it as an argument, set it in the config file or allow prompting")]
    MissingValue(&'static str),

    #[error("invalid sub-command: {0}")]
    InvalidSubCommand(String),
}

pub type Result<T> = std::result::Result<T, CliError>;

/// Settings read from a `--config` YAML file.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub folder: Option<PathBuf>,
    pub target: Option<PathBuf>,
    pub password: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub locality: Option<String>,
    pub organization: Option<String>,
    pub organizational_unit: Option<String>,
    pub common_name: Option<String>,
    pub openssl_path: Option<PathBuf>,
    pub signtool_path: Option<PathBuf>,
    pub file_digest: Option<String>,
    pub timestamp_url: Option<String>,
    pub timestamp_digest: Option<String>,
    pub key_bits: Option<u32>,
    pub validity_days: Option<u32>,
    pub description: Option<String>,
}

impl ConfigFile {
    pub fn from_path(path: &Path) -> Result<Self> {
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }

    /// Parse a YAML document. A document with no content is an empty config.
    pub fn from_yaml(data: &str) -> Result<Self> {
        let blank = data.lines().all(|line| {
            let line = line.trim();
            line.is_empty() || line.starts_with('#') || line == "---"
        });
        if blank {
            return Ok(Self::default());
        }

        match serde_yaml::from_str::<serde_yaml::Value>(data)? {
            serde_yaml::Value::Null => Ok(Self::default()),
            value => Ok(serde_yaml::from_value(value)?),
        }
    }
}

/// Resolves values from arguments, the config file, defaults and prompts, in that order.
struct Settings<'a> {
    args: &'a ArgMatches,
    file: ConfigFile,
    prompt: bool,
}

impl<'a> Settings<'a> {
    fn new(args: &'a ArgMatches) -> Result<Self> {
        let file = if let Some(path) = args.get_one::<PathBuf>("config") {
            ConfigFile::from_path(path)?
        } else {
            ConfigFile::default()
        };

        Ok(Self {
            args,
            file,
            prompt: !args.get_flag("no_prompt"),
        })
    }

    fn string(&self, id: &str, from_file: &Option<String>) -> Option<String> {
        self.args
            .get_one::<String>(id)
            .cloned()
            .or_else(|| from_file.clone())
    }

    fn path(&self, id: &str, from_file: &Option<PathBuf>) -> Option<PathBuf> {
        self.args
            .get_one::<PathBuf>(id)
            .cloned()
            .or_else(|| from_file.clone())
    }

    fn number(&self, id: &str, from_file: Option<u32>, default: u32) -> u32 {
        self.args
            .get_one::<u32>(id)
            .copied()
            .or(from_file)
            .unwrap_or(default)
    }

    fn required(
        &self,
        id: &'static str,
        from_file: &Option<String>,
        prompt: &str,
    ) -> Result<String> {
        if let Some(value) = self.string(id, from_file) {
            Ok(value)
        } else if self.prompt {
            Ok(dialoguer::Input::<String>::new()
                .with_prompt(prompt)
                .interact_text()?)
        } else {
            Err(CliError::MissingValue(id))
        }
    }

    fn folder(&self) -> PathBuf {
        self.path("folder", &self.file.folder)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn identity(&self) -> Result<IdentityFields> {
        let mut identity = IdentityFields::new(
            self.required("country", &self.file.country, "Country (two letter code)")?,
            self.required("state", &self.file.state, "State or province")?,
            self.required("locality", &self.file.locality, "Locality (city)")?,
            self.required("organization", &self.file.organization, "Organization")?,
            self.required("common_name", &self.file.common_name, "Common name")?,
        );
        if let Some(unit) = self.string("organizational_unit", &self.file.organizational_unit) {
            identity.set_organizational_unit(unit);
        }

        Ok(identity)
    }

    /// Password for the PKCS #12 archive.
    ///
    /// `confirm` asks twice when prompting, for passwords that are being set.
    fn password(&self, confirm: bool) -> Result<String> {
        if let Some(password) = self.string("password", &self.file.password) {
            Ok(password)
        } else if self.prompt {
            let mut prompt = dialoguer::Password::new();
            prompt.with_prompt("Password for mycert.pfx");
            if confirm {
                prompt.with_confirmation("Confirm password", "passwords do not match");
            }

            Ok(prompt.interact()?)
        } else {
            Err(CliError::MissingValue("password"))
        }
    }

    fn key_parameters(&self) -> KeyParameters {
        let defaults = KeyParameters::default();

        KeyParameters {
            bits: self.number("key_bits", self.file.key_bits, defaults.bits),
            validity_days: self.number(
                "validity_days",
                self.file.validity_days,
                defaults.validity_days,
            ),
        }
    }

    fn openssl_path(&self) -> Option<PathBuf> {
        self.path("openssl", &self.file.openssl_path)
    }

    fn signtool_path(&self) -> Option<PathBuf> {
        self.path("signtool", &self.file.signtool_path)
    }

    fn target(&self) -> Option<PathBuf> {
        self.path("target", &self.file.target)
    }

    fn sign_options(&self) -> SignOptions {
        let defaults = SignOptions::default();

        SignOptions {
            file_digest_algorithm: self
                .string("file_digest", &self.file.file_digest)
                .unwrap_or(defaults.file_digest_algorithm),
            timestamp_server: TimestampServer::new(
                self.string("timestamp_url", &self.file.timestamp_url)
                    .unwrap_or(defaults.timestamp_server.url),
                self.string("timestamp_digest", &self.file.timestamp_digest)
                    .unwrap_or(defaults.timestamp_server.digest_algorithm),
            ),
            description: self.string("description", &self.file.description),
            verbose: self.args.get_flag("signtool_verbose"),
        }
    }
}

fn add_identity_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("country")
                .long("country")
                .action(ArgAction::Set)
                .help("Two letter country code (C) of the certificate subject"),
        )
        .arg(
            Arg::new("state")
                .long("state")
                .action(ArgAction::Set)
                .help("State or province (ST) of the certificate subject"),
        )
        .arg(
            Arg::new("locality")
                .long("locality")
                .visible_alias("city")
                .action(ArgAction::Set)
                .help("Locality (L) of the certificate subject"),
        )
        .arg(
            Arg::new("organization")
                .long("organization")
                .action(ArgAction::Set)
                .help("Organization (O) of the certificate subject"),
        )
        .arg(
            Arg::new("organizational_unit")
                .long("organizational-unit")
                .action(ArgAction::Set)
                .help("Organizational unit (OU) of the certificate subject"),
        )
        .arg(
            Arg::new("common_name")
                .long("common-name")
                .action(ArgAction::Set)
                .help("Common name (CN) of the certificate subject"),
        )
        .arg(
            Arg::new("key_bits")
                .long("key-bits")
                .action(ArgAction::Set)
                .value_parser(value_parser!(u32))
                .help("RSA key size [default: 2048]"),
        )
        .arg(
            Arg::new("validity_days")
                .long("validity-days")
                .action(ArgAction::Set)
                .value_parser(value_parser!(u32))
                .help("Days the certificate is valid for [default: 3650]"),
        )
}

fn add_password_arg(command: Command) -> Command {
    command.arg(
        Arg::new("password")
            .long("password")
            .action(ArgAction::Set)
            .env("EFISIGN_PASSWORD")
            .hide_env_values(true)
            .help("Password protecting mycert.pfx"),
    )
}

fn add_openssl_arg(command: Command) -> Command {
    command.arg(
        Arg::new("openssl")
            .long("openssl")
            .action(ArgAction::Set)
            .value_parser(value_parser!(PathBuf))
            .help("openssl executable to run"),
    )
}

fn add_signing_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("target")
                .long("target")
                .action(ArgAction::Set)
                .value_parser(value_parser!(PathBuf))
                .help("Binary to sign [default: <folder>/loader.efi]"),
        )
        .arg(
            Arg::new("signtool")
                .long("signtool")
                .action(ArgAction::Set)
                .value_parser(value_parser!(PathBuf))
                .help("signtool executable to run"),
        )
        .arg(
            Arg::new("file_digest")
                .long("file-digest")
                .action(ArgAction::Set)
                .help("Digest algorithm of the signature [default: sha256]"),
        )
        .arg(
            Arg::new("timestamp_url")
                .long("timestamp-url")
                .action(ArgAction::Set)
                .help("RFC 3161 timestamp server [default: http://timestamp.digicert.com]"),
        )
        .arg(
            Arg::new("timestamp_digest")
                .long("timestamp-digest")
                .action(ArgAction::Set)
                .help("Digest algorithm requested from the timestamp server [default: sha256]"),
        )
        .arg(
            Arg::new("description")
                .long("description")
                .action(ArgAction::Set)
                .help("Description embedded in the signature"),
        )
        .arg(
            Arg::new("signtool_verbose")
                .long("signtool-verbose")
                .action(ArgAction::SetTrue)
                .help("Run signtool with verbose output"),
        )
}

fn init_logging(matches: &ArgMatches) {
    let log_level = match matches.get_count("verbose") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level.as_str()),
    );

    // Disable log context except at higher log levels.
    if log_level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    builder.init();
}

pub fn run_cli() -> Result<()> {
    let app = Command::new("efisign")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Create a self-signed code signing certificate and sign EFI binaries")
        .arg_required_else_help(true)
        .subcommand_required(true);

    let app = app
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::Count)
                .help("Increase logging verbosity. Can be specified multiple times."),
        )
        .arg(
            Arg::new("folder")
                .long("folder")
                .global(true)
                .action(ArgAction::Set)
                .value_parser(value_parser!(PathBuf))
                .help("Working folder holding generated files [default: .]"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .action(ArgAction::Set)
                .value_parser(value_parser!(PathBuf))
                .help("YAML file providing settings (see `config-file` command)"),
        )
        .arg(
            Arg::new("no_prompt")
                .long("no-prompt")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Fail instead of prompting for missing values"),
        );

    let app = app.subcommand(add_signing_args(add_openssl_arg(add_password_arg(
        add_identity_args(
            Command::new("run")
                .about("Create a certificate and sign a binary with it")
                .long_about(RUN_ABOUT),
        ),
    ))));

    let app = app.subcommand(add_identity_args(
        Command::new("write-config").about("Write openssl.cnf into the working folder"),
    ));

    let app = app.subcommand(add_openssl_arg(add_password_arg(add_identity_args(
        Command::new("generate-certificate")
            .about("Write openssl.cnf and create mycert.key, mycert.crt and mycert.pfx"),
    ))));

    let app = app.subcommand(add_openssl_arg(
        Command::new("convert-der").about("Convert mycert.crt to mycert.der"),
    ));

    let app = app.subcommand(add_signing_args(add_password_arg(
        Command::new("sign").about("Sign a binary with mycert.pfx"),
    )));

    let app = app.subcommand(Command::new("generate-guid").about("Print a random GUID"));

    let app = app.subcommand(
        Command::new("config-file").about("Print documentation about configuration files"),
    );

    let matches = app.get_matches();

    init_logging(&matches);

    match matches.subcommand() {
        Some(("run", args)) => command_run(args),
        Some(("write-config", args)) => command_write_config(args),
        Some(("generate-certificate", args)) => command_generate_certificate(args),
        Some(("convert-der", args)) => command_convert_der(args),
        Some(("sign", args)) => command_sign(args),
        Some(("generate-guid", _)) => command_generate_guid(),
        Some(("config-file", _)) => {
            println!("{}", CONFIG_FILE_ABOUT);
            Ok(())
        }
        Some((command, _)) => Err(CliError::InvalidSubCommand(command.to_string())),
        None => Err(CliError::InvalidSubCommand(String::new())),
    }
}

fn command_run(args: &ArgMatches) -> Result<()> {
    let settings = Settings::new(args)?;

    let mut pipeline = PipelineSettings::new(
        settings.folder(),
        settings.identity()?,
        settings.password(true)?,
    );
    pipeline.target = settings.target();
    pipeline.openssl_path = settings.openssl_path();
    pipeline.signtool_path = settings.signtool_path();
    pipeline.key = settings.key_parameters();
    pipeline.sign = settings.sign_options();

    let outcome = SigningPipeline::new(pipeline).run()?;

    println!("Generated GUID: {}", outcome.guid);

    Ok(())
}

fn command_write_config(args: &ArgMatches) -> Result<()> {
    let settings = Settings::new(args)?;

    let identity = settings.identity()?;
    identity.validate()?;

    let folder = WorkingFolder::prepare(settings.folder())?;
    write_request_config(&folder, &identity, settings.key_parameters().bits)?;

    Ok(())
}

fn command_generate_certificate(args: &ArgMatches) -> Result<()> {
    let settings = Settings::new(args)?;

    let identity = settings.identity()?;
    identity.validate()?;
    let password = settings.password(true)?;
    if password.is_empty() {
        return Err(EfiSignError::EmptyPassword.into());
    }
    let openssl = Openssl::find(settings.openssl_path().as_deref())?;
    let params = settings.key_parameters();

    let folder = WorkingFolder::prepare(settings.folder())?;
    write_request_config(&folder, &identity, params.bits)?;
    generate_certificates(&openssl, &folder, &password, params)?;

    Ok(())
}

fn command_convert_der(args: &ArgMatches) -> Result<()> {
    let settings = Settings::new(args)?;

    let openssl = Openssl::find(settings.openssl_path().as_deref())?;
    let folder = WorkingFolder::new(settings.folder())?;
    convert_to_der(&openssl, &folder)?;

    Ok(())
}

fn command_sign(args: &ArgMatches) -> Result<()> {
    let settings = Settings::new(args)?;

    let password = settings.password(false)?;
    let signtool = efi_signing::find_signtool(settings.signtool_path().as_deref())?;
    let folder = WorkingFolder::new(settings.folder())?;
    let target = match settings.target() {
        Some(target) => folder.path().join(target),
        None => folder.default_target_path(),
    };

    sign_efi_file(
        &signtool,
        &folder,
        &password,
        &target,
        &settings.sign_options(),
    )?;

    Ok(())
}

fn command_generate_guid() -> Result<()> {
    println!("Generated GUID: {}", generate_guid());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_without_content() -> Result<()> {
        for data in ["", "  \n\n", "# efisign settings\n\n  # none yet\n", "---\n", "~\n"] {
            let config = ConfigFile::from_yaml(data)?;
            assert!(config.folder.is_none(), "{:?}", data);
            assert!(config.country.is_none(), "{:?}", data);
        }

        Ok(())
    }

    #[test]
    fn config_values() -> Result<()> {
        let config = ConfigFile::from_yaml(
            "# identity\ncountry: UK\ncommon_name: Linus # trailing\nkey_bits: 4096\n",
        )?;

        assert_eq!(config.country.as_deref(), Some("UK"));
        assert_eq!(config.common_name.as_deref(), Some("Linus"));
        assert_eq!(config.key_bits, Some(4096));

        Ok(())
    }

    #[test]
    fn unknown_config_key_rejected() {
        assert!(matches!(
            ConfigFile::from_yaml("colour: blue\n"),
            Err(CliError::SerdeYaml(_))
        ));
    }
}
