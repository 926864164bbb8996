//! Property-Based Tests for srvupgrade
//!
//! These tests verify:
//! - Version ordering is a total order consistent with equality
//! - Tracker position strictly increases across committed steps
//! - A failing step leaves the tracker at the previous step and a re-run
//!   resumes exactly there

mod common;

use std::fs;

use proptest::prelude::*;

use common::{events, recording_catalog, tracker_position, upgrader, v, FailAt};
use srvupgrade::{Backup, Position, Version};

// =============================================================================
// Version Ordering
// =============================================================================

fn version_strategy() -> impl Strategy<Value = Version> {
    prop::collection::vec(0u64..20, 1..4).prop_map(|parts| {
        let raw = parts
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(".");
        Version::parse(&raw).expect("generated version parses")
    })
}

proptest! {
    /// Version: cmp is antisymmetric and agrees with ==
    #[test]
    fn version_order_is_consistent(a in version_strategy(), b in version_strategy()) {
        prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
        prop_assert_eq!(a == b, a.cmp(&b) == std::cmp::Ordering::Equal);
    }

    /// Version: appending zero components does not change the version
    #[test]
    fn version_trailing_zero_is_equal(a in version_strategy()) {
        let padded = Version::parse(&format!("{a}.0")).unwrap();
        prop_assert_eq!(a, padded);
    }
}

// =============================================================================
// Upgrade Runs
// =============================================================================

/// Catalog layout: number of steps in each of versions 1, 2, 3 and the
/// target 4.
fn layout_strategy() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec(1u32..4, 4)
}

fn steps_for(counts: &[u32]) -> Vec<(String, u32)> {
    counts
        .iter()
        .enumerate()
        .flat_map(|(i, count)| (0..*count).map(move |index| (format!("{}", i + 1), index)))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Every committed step snapshots a strictly larger tracker position and
    /// the run ends at the target.
    #[test]
    fn tracker_position_strictly_increases(counts in layout_strategy()) {
        let root = tempfile::tempdir().unwrap();
        let owned = steps_for(&counts);
        let steps: Vec<(&str, u32)> = owned.iter().map(|(ver, i)| (ver.as_str(), *i)).collect();

        let ev = events();
        let catalog = recording_catalog("4", &steps, &ev, None);
        let mut u = upgrader(root.path(), &["ca"], catalog, &ev);
        u.set_tracker(&v("1")).unwrap();

        prop_assert_eq!(u.run().unwrap(), steps.len());
        prop_assert_eq!(tracker_position(&u), (v("4"), None));

        // snapshot taken at each commit = position before that step
        let tracker_file = u.tracker().filename().to_path_buf();
        let mut previous: Option<(Version, i64)> = None;
        for (ver, index) in &steps {
            let backup = Backup::new(&root.path().join("backup"), &Position::new(v(ver), *index));
            let text = fs::read_to_string(backup.target_for(&tracker_file)).unwrap();

            let mut snap_version = None;
            let mut snap_index = -1i64;
            for line in text.lines() {
                if let Some(value) = line.strip_prefix("SERVER_VERSION=") {
                    snap_version = Some(v(value));
                }
                if let Some(value) = line.strip_prefix("SERVER_UPGRADE_INDEX=") {
                    snap_index = value.parse().unwrap();
                }
            }
            let current = (snap_version.unwrap(), snap_index);
            if let Some(prev) = &previous {
                prop_assert!(current > *prev, "{:?} should follow {:?}", current, prev);
            }
            previous = Some(current);
        }
    }

    /// Failing step k keeps the tracker at step k-1; the next run resumes at k.
    #[test]
    fn failure_is_resumable(counts in layout_strategy(), pick in any::<prop::sample::Index>()) {
        let root = tempfile::tempdir().unwrap();
        let owned = steps_for(&counts);
        let steps: Vec<(&str, u32)> = owned.iter().map(|(ver, i)| (ver.as_str(), *i)).collect();
        let k = pick.index(steps.len());
        let (fail_version, fail_index) = steps[k];

        let ev = events();
        let catalog = recording_catalog("4", &steps, &ev, Some((fail_version, fail_index, FailAt::Instance)));
        let mut u = upgrader(root.path(), &[], catalog, &ev);
        u.set_tracker(&v("1")).unwrap();

        prop_assert!(u.run().is_err());

        let expected = if k == 0 {
            (v("1"), None)
        } else {
            let (prev_version, prev_index) = steps[k - 1];
            if prev_version == fail_version {
                (v(prev_version), Some(prev_index))
            } else {
                (v(fail_version), None)
            }
        };
        prop_assert_eq!(tracker_position(&u), expected);

        let ev = events();
        let catalog = recording_catalog("4", &steps, &ev, None);
        let mut u = upgrader(root.path(), &[], catalog, &ev);
        prop_assert_eq!(u.run().unwrap(), steps.len() - k);

        let first = ev.borrow().first().cloned().unwrap();
        prop_assert_eq!(first, format!("{fail_version}/{fail_index}:instance:pki-tomcat"));
        prop_assert_eq!(tracker_position(&u), (v("4"), None));
    }
}
