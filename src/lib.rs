use thiserror::Error;

pub mod cli;
pub mod config;
pub mod logging;
pub mod replica;
pub mod state;
pub mod vault;

pub type Result<T> = anyhow::Result<T>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("vault path is not a directory: {0}")]
    MissingReplicaDir(String),
    #[error("sparse bundle path is not a directory: {0}")]
    MissingContainer(String),
    #[error("missing bundle metadata file, this does not look like a sparse bundle: {0}")]
    MissingMetadata(String),
    #[error("invalid vault name {0:?}: must be a single path component")]
    InvalidVaultName(String),
    #[error("vault {vault} is invalid: {reason}")]
    VaultInvalid { vault: String, reason: String },
    #[error("vault {vault} is already mounted by {owner}")]
    AlreadyMounted { vault: String, owner: String },
    #[error("state record {path}: {reason}")]
    Persistence { path: String, reason: String },
    #[error("mount failed with exit code {code}")]
    MountFailed { code: i32 },
    #[error("unmount failed with exit code {code}")]
    UnmountFailed { code: i32 },
    #[error("copy failed with exit code {code}")]
    CopyFailed { code: i32 },
    #[error("refusing operation: {0}")]
    UnsafeOperation(String),
    #[error("bands directory not found: {0}")]
    BandsDirMissing(String),
    #[error("bands not loaded for replica: {0}")]
    BandsNotLoaded(String),
    #[error("unknown verb: {0}")]
    UnknownVerb(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("serialization error")]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("cli error: {0}")]
    Cli(String),
}

impl Error {
    /// Numeric code reported to the operator, stable across releases.
    pub fn code(&self) -> i32 {
        match self {
            Error::MissingReplicaDir(_) => 1,
            Error::MissingContainer(_) => 2,
            Error::MissingMetadata(_) => 3,
            Error::VaultInvalid { .. } => 4,
            Error::AlreadyMounted { .. } => 5,
            Error::MountFailed { code }
            | Error::UnmountFailed { code }
            | Error::CopyFailed { code } => *code,
            _ => 1,
        }
    }
}

/// Entry point for the library, called by the CLI thin wrapper.
pub fn run<I, S>(args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let cli_args = cli::parse_args(args.into_iter().map(Into::into))?;
    logging::init_logging(cli_args.log_format)?;
    cli::dispatch(cli_args)
}
