use serde::Serialize;

use crate::Result;

use super::store::{BandMap, ReplicaStore};

/// How one local band compares with its remote counterpart.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BandDirection {
    /// Local copy is older than the remote one.
    Older,
    /// Local copy is newer than the remote one.
    Newer,
    /// Remote has no band with this identifier.
    LocalOnly,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BandDelta {
    pub band: String,
    pub local: u64,
    pub remote: Option<u64>,
    pub direction: BandDirection,
}

/// Raw per-band comparison counts, keyed on the local band set.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct StalenessReport {
    pub local_count: usize,
    pub remote_count: usize,
    pub same_count: bool,
    pub older_bands: usize,
    pub newer_bands: usize,
    pub same_bands: usize,
    /// Every band that is not identical on both sides, in sorted order.
    pub differences: Vec<BandDelta>,
}

impl StalenessReport {
    pub fn is_diverged(&self) -> bool {
        self.older_bands != 0 && self.newer_bands != 0
    }
}

/// What the counts suggest the operator should do.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Identical,
    /// Local is behind remote; restore.
    LocalStale,
    /// Local is ahead of remote; back up.
    LocalAhead,
    /// Both sides have bands newer than the other. Needs a human.
    Diverged,
}

impl Verdict {
    pub fn describe(&self) -> &'static str {
        match self {
            Verdict::Identical => "It appears that the two vaults are identical",
            Verdict::LocalStale => {
                "It looks like the LOCAL vault is older than the REMOTE vault. Do a RESTORE."
            }
            Verdict::LocalAhead => {
                "It looks like the LOCAL vault is newer than the REMOTE vault. Do a BACKUP."
            }
            Verdict::Diverged => {
                "The LOCAL vault has some older bands and some newer bands. Resolve this manually!"
            }
        }
    }
}

/// Compare two loaded replicas. Fails if either side has not been loaded.
pub fn analyze(local: &ReplicaStore, remote: &ReplicaStore) -> Result<StalenessReport> {
    Ok(analyze_bands(local.bands()?, remote.bands()?))
}

/// Walk the local bands in sorted order and classify each against remote.
/// Bands only present remotely are not visited; they show up only through
/// `remote_count`/`same_count`.
pub fn analyze_bands(local: &BandMap, remote: &BandMap) -> StalenessReport {
    let mut report = StalenessReport {
        local_count: local.len(),
        remote_count: remote.len(),
        same_count: local.len() == remote.len(),
        ..StalenessReport::default()
    };

    for (band, &local_time) in local {
        let remote_time = remote.get(band).copied();
        let direction = match remote_time {
            None => BandDirection::LocalOnly,
            Some(r) if local_time == r => {
                report.same_bands += 1;
                continue;
            }
            Some(r) if local_time < r => BandDirection::Older,
            Some(_) => BandDirection::Newer,
        };

        match direction {
            BandDirection::Older => report.older_bands += 1,
            BandDirection::Newer | BandDirection::LocalOnly => report.newer_bands += 1,
        }
        report.differences.push(BandDelta {
            band: band.clone(),
            local: local_time,
            remote: remote_time,
            direction,
        });
    }

    report
}

/// Apply the recommendation rules in order. Every local band is counted
/// exactly once, so when neither one-directional rule holds both older and
/// newer bands exist and the replicas have diverged.
pub fn interpret(report: &StalenessReport) -> Verdict {
    if report.same_count && report.same_bands == report.local_count {
        Verdict::Identical
    } else if report.older_bands + report.same_bands == report.local_count {
        Verdict::LocalStale
    } else if report.newer_bands + report.same_bands == report.local_count {
        Verdict::LocalAhead
    } else {
        Verdict::Diverged
    }
}
