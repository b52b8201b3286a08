//! Replica domain module.
//!
//! Describes the on-disk layout of a vault replica and compares the band
//! sets of the local and remote copies.

pub mod staleness;
pub mod store;

pub use staleness::{
    analyze, analyze_bands, interpret, BandDelta, BandDirection, StalenessReport, Verdict,
};
pub use store::{BandMap, Bands, ReplicaSide, ReplicaStore, BANDS_DIR, BUNDLE_EXT, METADATA_FILE};
