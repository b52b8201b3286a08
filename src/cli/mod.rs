//! Command line surface: `ev <vault> <verb>`.

use std::{path::PathBuf, str::FromStr};

use clap::{CommandFactory, Parser, ValueEnum};

use crate::{
    config::Config,
    logging::{ConsoleReporter, LogFormat},
    vault::{validate_name, Collaborators, Vault},
    Error, Result,
};

pub mod about;
pub mod backup;
pub mod dismount;
pub mod mount;
pub mod restore;

/// Operations a vault supports. Verbs are matched case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Mount,
    Attach,
    Dismount,
    Backup,
    Restore,
    About,
}

impl FromStr for Verb {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mount" => Ok(Self::Mount),
            "attach" => Ok(Self::Attach),
            "dismount" | "eject" | "detach" => Ok(Self::Dismount),
            "backup" => Ok(Self::Backup),
            "restore" => Ok(Self::Restore),
            "about" | "status" => Ok(Self::About),
            _ => Err(Error::UnknownVerb(s.to_string())),
        }
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Verb::Mount => "mount",
            Verb::Attach => "attach",
            Verb::Dismount => "dismount",
            Verb::Backup => "backup",
            Verb::Restore => "restore",
            Verb::About => "about",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum StatusFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub vault: String,
    pub verb: Verb,
    pub config: Option<PathBuf>,
    pub log_format: LogFormat,
    pub format: StatusFormat,
}

#[derive(Parser, Debug)]
#[command(name = "ev", version, about = "Encrypted vault management console")]
struct Cli {
    /// Vault name (the directory under the local and remote roots)
    vault: Option<String>,

    /// One of: mount, attach, dismount (eject, detach), backup, restore, about (status)
    verb: Option<String>,

    /// Path to a TOML config file (defaults to $EV_CONFIG or ~/.config/ev/config.toml)
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Log output format (logs go to stderr)
    #[arg(long = "log-format", value_enum, default_value = "human")]
    log_format: LogFormat,

    /// Output format for `about`
    #[arg(long = "format", value_enum, default_value = "text")]
    format: StatusFormat,
}

/// Parse CLI arguments into internal representation.
pub fn parse_args<I, S>(args: I) -> Result<CliArgs>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let argv: Vec<String> = args.into_iter().map(Into::into).collect();
    let cli = Cli::parse_from(argv);

    let vault = cli
        .vault
        .ok_or_else(|| Error::Cli("vault name is required".into()))?;
    validate_name(&vault)?;
    let verb = cli
        .verb
        .ok_or_else(|| Error::Cli("verb is required".into()))?
        .parse::<Verb>()?;

    Ok(CliArgs {
        vault,
        verb,
        config: cli.config,
        log_format: cli.log_format,
        format: cli.format,
    })
}

pub fn dispatch(args: CliArgs) -> Result<()> {
    let config = Config::discover(args.config.as_deref())?;
    // JSON status output owns stdout; keep the narrative out of it.
    let quiet = args.verb == Verb::About && args.format == StatusFormat::Json;
    let mut tools = Collaborators::from_config(&config);
    if !quiet {
        tools = tools.with_reporter(Box::new(ConsoleReporter::default()));
    }
    let vault = Vault::open(&args.vault, &config, tools);

    match args.verb {
        Verb::Mount => mount::execute(&vault, false),
        Verb::Attach => mount::execute(&vault, true),
        Verb::Dismount => dismount::execute(&vault),
        Verb::Backup => backup::execute(&vault),
        Verb::Restore => restore::execute(&vault),
        Verb::About => about::execute(&vault, args.format),
    }
}

/// Build the underlying clap `Command` (useful for help/usage contract tests).
pub fn clap_command() -> clap::Command {
    Cli::command()
}
