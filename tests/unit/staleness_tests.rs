use ev::replica::{
    analyze, analyze_bands, interpret, BandDirection, BandMap, ReplicaSide, ReplicaStore, Verdict,
};
use proptest::prelude::*;

fn bands(entries: &[(&str, u64)]) -> BandMap {
    entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

#[test]
fn identical_maps_are_all_same() {
    let local = bands(&[("0", 100), ("1", 200), ("2", 300)]);
    let report = analyze_bands(&local, &local.clone());

    assert_eq!(3, report.local_count);
    assert_eq!(3, report.remote_count);
    assert!(report.same_count);
    assert_eq!(3, report.same_bands);
    assert_eq!(0, report.older_bands);
    assert_eq!(0, report.newer_bands);
    assert!(report.differences.is_empty());
    assert_eq!(Verdict::Identical, interpret(&report));
}

#[test]
fn newer_local_band_recommends_backup() {
    let report = analyze_bands(&bands(&[("a", 100), ("b", 200)]), &bands(&[("a", 100), ("b", 150)]));

    assert_eq!(1, report.same_bands);
    assert_eq!(1, report.newer_bands);
    assert_eq!(0, report.older_bands);
    assert_eq!(1, report.differences.len());
    assert_eq!("b", report.differences[0].band);
    assert_eq!(BandDirection::Newer, report.differences[0].direction);
    assert_eq!(Some(150), report.differences[0].remote);
    assert_eq!(Verdict::LocalAhead, interpret(&report));
}

#[test]
fn older_local_band_recommends_restore() {
    let report = analyze_bands(&bands(&[("a", 100), ("b", 100)]), &bands(&[("a", 100), ("b", 150)]));

    assert_eq!(1, report.older_bands);
    assert_eq!(Verdict::LocalStale, interpret(&report));
}

#[test]
fn remote_only_band_blocks_identical_verdict() {
    let report = analyze_bands(&bands(&[("a", 100)]), &bands(&[("a", 100), ("b", 50)]));

    assert_eq!(1, report.local_count);
    assert_eq!(2, report.remote_count);
    assert!(!report.same_count);
    assert_eq!(1, report.same_bands);
    assert_ne!(Verdict::Identical, interpret(&report));
    assert_eq!(Verdict::LocalStale, interpret(&report));
}

#[test]
fn local_only_band_counts_as_newer() {
    let report = analyze_bands(&bands(&[("a", 100), ("z", 10)]), &bands(&[("a", 100)]));

    assert_eq!(1, report.newer_bands);
    assert_eq!(BandDirection::LocalOnly, report.differences[0].direction);
    assert_eq!(None, report.differences[0].remote);
    assert_eq!(Verdict::LocalAhead, interpret(&report));
}

#[test]
fn mixed_directions_are_diverged() {
    let report = analyze_bands(
        &bands(&[("a", 100), ("b", 300), ("c", 50)]),
        &bands(&[("a", 200), ("b", 200), ("c", 50)]),
    );

    assert_eq!(1, report.older_bands);
    assert_eq!(1, report.newer_bands);
    assert_eq!(1, report.same_bands);
    assert!(report.is_diverged());
    assert_eq!(Verdict::Diverged, interpret(&report));
}

#[test]
fn differences_follow_sorted_band_order() {
    let report = analyze_bands(
        &bands(&[("c", 1), ("a", 1), ("b", 1)]),
        &bands(&[("a", 2), ("b", 2), ("c", 2)]),
    );
    let order: Vec<_> = report.differences.iter().map(|d| d.band.as_str()).collect();
    assert_eq!(vec!["a", "b", "c"], order);
}

#[test]
fn empty_replicas_are_identical() {
    let report = analyze_bands(&BandMap::new(), &BandMap::new());
    assert_eq!(Verdict::Identical, interpret(&report));
}

#[test]
fn analyze_requires_loaded_stores() {
    let mut local = ReplicaStore::new(ReplicaSide::Local, "/nowhere/local", "cv4gb");
    let mut remote = ReplicaStore::new(ReplicaSide::Remote, "/nowhere/remote", "cv4gb");
    local.set_bands(bands(&[("a", 1)]));

    let err = analyze(&local, &remote).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ev::Error>(),
        Some(ev::Error::BandsNotLoaded(_))
    ));

    remote.set_bands(bands(&[("a", 1)]));
    let report = analyze(&local, &remote).unwrap();
    assert_eq!(1, report.same_bands);
}

fn band_map_strategy() -> impl Strategy<Value = BandMap> {
    prop::collection::btree_map("[0-9a-f]{1,3}", 0u64..1_000, 0..24)
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn counts_cover_every_local_band(local in band_map_strategy(), remote in band_map_strategy()) {
        let report = analyze_bands(&local, &remote);
        prop_assert_eq!(report.local_count, local.len());
        prop_assert_eq!(
            report.older_bands + report.newer_bands + report.same_bands,
            report.local_count
        );
        prop_assert_eq!(report.differences.len(), report.older_bands + report.newer_bands);
    }

    #[test]
    fn superset_remote_keeps_count_invariant(
        local in band_map_strategy(),
        extra in band_map_strategy(),
        shift in -5i64..5,
    ) {
        // Every local key also exists remotely, with a shifted timestamp.
        let mut remote = extra;
        for (band, time) in &local {
            remote.insert(band.clone(), (*time as i64 + shift).max(0) as u64);
        }
        let report = analyze_bands(&local, &remote);
        prop_assert_eq!(
            report.older_bands + report.newer_bands + report.same_bands,
            local.len()
        );
        prop_assert!(report.differences.iter().all(|d| d.direction != BandDirection::LocalOnly));
    }

    #[test]
    fn self_comparison_is_identical(local in band_map_strategy()) {
        let report = analyze_bands(&local, &local);
        prop_assert_eq!(report.same_bands, report.local_count);
        prop_assert_eq!(report.older_bands, 0);
        prop_assert_eq!(report.newer_bands, 0);
        prop_assert_eq!(interpret(&report), Verdict::Identical);
    }
}
