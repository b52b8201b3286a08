//! Read-only vault report ("about").

use std::time::SystemTime;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::{
    logging::log_staleness_report,
    replica::{analyze, interpret, BandDirection, ReplicaSide, StalenessReport, Verdict},
    state::VaultState,
    Result,
};

use super::{Validity, Vault, VaultPhase};

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub vault: String,
    pub computer_name: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<VaultPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_modified: Option<DateTime<Local>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_modified: Option<DateTime<Local>>,
    /// Side whose bands directory changed last, if they differ.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub most_recent: Option<ReplicaSide>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staleness: Option<StalenessReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<VaultState>,
    pub narrative: Vec<String>,
}

impl StatusReport {
    fn new(vault: &Vault) -> Self {
        Self {
            vault: vault.name().to_string(),
            computer_name: vault.computer_name().to_string(),
            valid: vault.is_valid(),
            invalid_reason: None,
            phase: None,
            local_modified: None,
            remote_modified: None,
            most_recent: None,
            staleness: None,
            verdict: None,
            record: None,
            narrative: Vec::new(),
        }
    }

    fn say(&mut self, vault: &Vault, line: impl Into<String>) {
        let line = line.into();
        vault.report(&line);
        self.narrative.push(line);
    }
}

impl Vault {
    /// Describe both replicas and recommend an action. Never writes the
    /// state record. Sub-steps that fail are noted in the narrative instead
    /// of aborting the report.
    pub fn status(&self) -> Result<StatusReport> {
        let mut report = StatusReport::new(self);

        if let Validity::Invalid { reason, .. } = self.validity() {
            report.invalid_reason = Some(reason.clone());
            report.phase = Some(VaultPhase::Invalid);
            report.say(self, format!("vault {} is invalid: {reason}", self.name()));
            report.say(self, "Not to be a negative nancy, but I see no reason to continue...");
            return Ok(report);
        }

        match self.load_record() {
            Ok(record) => {
                let state = record.state();
                if state.mounted_writable {
                    report.say(
                        self,
                        format!(
                            "state record: mounted read-write by {}",
                            state.owner_computer_name
                        ),
                    );
                } else {
                    report.say(self, "state record: not mounted read-write");
                }
                if state.needs_backup {
                    report.say(self, "state record: a backup is pending");
                }
                report.record = Some(state.clone());
            }
            Err(err) => report.say(self, format!("could not read the state record: {err:#}")),
        }

        match self.phase() {
            Ok(phase) => report.phase = Some(phase),
            Err(err) => report.say(self, format!("could not query attached volumes: {err:#}")),
        }

        report.local_modified = modified_local(self.local().modified_time());
        report.remote_modified = modified_local(self.remote().modified_time());
        if let Some(t) = report.local_modified {
            report.say(self, format!("LOCAL was last modified on {}", asctime(t)));
        }
        if let Some(t) = report.remote_modified {
            report.say(self, format!("REMOTE was last modified on {}", asctime(t)));
        }
        report.most_recent = match (report.local_modified, report.remote_modified) {
            (Some(l), Some(r)) if l > r => Some(ReplicaSide::Local),
            (Some(l), Some(r)) if l < r => Some(ReplicaSide::Remote),
            _ => None,
        };
        if let Some(side) = report.most_recent {
            report.say(
                self,
                format!("{side} version was likely the most recently mounted version"),
            );
        }

        match self.compare_bands() {
            Ok(staleness) => {
                log_staleness_report(self.name(), &staleness);
                for delta in &staleness.differences {
                    let line = match (delta.direction, delta.remote) {
                        (BandDirection::LocalOnly, _) => {
                            format!("local[{}:{}] missing from remote", delta.band, delta.local)
                        }
                        (BandDirection::Older, Some(r)) => {
                            format!("local[{}:{}] < remote[{}:{}]", delta.band, delta.local, delta.band, r)
                        }
                        (_, r) => format!(
                            "local[{}:{}] > remote[{}:{}]",
                            delta.band,
                            delta.local,
                            delta.band,
                            r.unwrap_or_default()
                        ),
                    };
                    report.say(self, line);
                }

                let verdict = interpret(&staleness);
                report.say(self, verdict.describe());
                report.say(
                    self,
                    format!(
                        "bands: local={} remote={} same={} older={} newer={}",
                        staleness.local_count,
                        staleness.remote_count,
                        staleness.same_bands,
                        staleness.older_bands,
                        staleness.newer_bands
                    ),
                );
                report.verdict = Some(verdict);
                report.staleness = Some(staleness);
            }
            Err(err) => report.say(self, format!("could not compare bands: {err:#}")),
        }

        Ok(report)
    }

    /// Load both band sets into scratch copies and compare them.
    pub fn compare_bands(&self) -> Result<StalenessReport> {
        let mut local = self.local().clone();
        let mut remote = self.remote().clone();
        local.load_bands(self.granularity_secs)?;
        remote.load_bands(self.granularity_secs)?;
        analyze(&local, &remote)
    }
}

fn modified_local(time: Result<SystemTime>) -> Option<DateTime<Local>> {
    time.ok().map(DateTime::<Local>::from)
}

fn asctime(time: DateTime<Local>) -> String {
    time.format("%a %b %e %H:%M:%S %Y").to_string()
}
