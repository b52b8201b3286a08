//! Logging initialization using `tracing` and `tracing-subscriber`, plus the
//! operator-facing message sink.

use tracing::{info, warn};
use tracing_subscriber::{fmt, util::SubscriberInitExt, EnvFilter};

use crate::{replica::StalenessReport, Result};

pub mod reporter;

pub use reporter::{ConsoleReporter, NullReporter, Reporter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

/// Initialize global tracing subscriber. Safe to call multiple times; subsequent
/// calls will no-op.
///
/// Logs go to stderr so they never interleave with the narrative the
/// reporter prints on stdout.
pub fn init_logging(format: LogFormat) -> Result<()> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Human => {
            let _ = builder.finish().try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().finish().try_init();
        }
    };

    Ok(())
}

/// Emit the band comparison counts for a vault. Diverged replicas are logged
/// at warn level since they need an operator decision.
pub fn log_staleness_report(vault: &str, report: &StalenessReport) {
    if report.is_diverged() {
        warn!(
            target = "ev::staleness",
            vault,
            local_count = report.local_count,
            remote_count = report.remote_count,
            same_count = report.same_count,
            older_bands = report.older_bands,
            newer_bands = report.newer_bands,
            same_bands = report.same_bands,
            "replicas_diverged"
        );
    } else {
        info!(
            target = "ev::staleness",
            vault,
            local_count = report.local_count,
            remote_count = report.remote_count,
            same_count = report.same_count,
            older_bands = report.older_bands,
            newer_bands = report.newer_bands,
            same_bands = report.same_bands,
            "staleness_report"
        );
    }
}
