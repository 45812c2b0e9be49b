//! The scan reconstructor.
//!
//! The feed is cumulative: it says when each finding was discovered and
//! retested, not what a scan looked like on a given day. This module
//! walks the union of all observation dates in ascending order and
//! rebuilds the point-in-time snapshots, one per distinct calendar day.
//!
//! The whole pass is pure: the timelines and cut points go in, the
//! snapshots come out, there is no shared state with the caller.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use log::{debug, trace, warn};

use crate::feed::identity::FindingMaterializer;
use crate::models::{FindingStatus, FindingTimeline, ScanSnapshot};

/// Rebuilds the ordered sequence of scan snapshots.
///
/// The open set persists across the whole walk, it is not reset between
/// snapshots: a finding stays open until an observation explicitly
/// closes it. A snapshot is emitted before the first cut point of each
/// new calendar day, dated at the last cut point of the previous day,
/// and one final snapshot is emitted at the last cut point. No cut
/// points means no snapshots.
pub fn reconstruct_scans(
    timelines: &[FindingTimeline],
    cut_points: &BTreeSet<DateTime<Utc>>,
) -> Vec<ScanSnapshot> {
    trace!("Running reconstruct_scans()");
    let mut snapshots: Vec<ScanSnapshot> = Vec::new();
    if cut_points.is_empty() {
        warn!("No observation date was collected, there is nothing to reconstruct");
        return snapshots;
    }

    // Normalize each timeline once: sorted ascending, same-instant
    // duplicates merged, undated observations dropped
    let mut histories: Vec<(usize, Vec<(DateTime<Utc>, FindingStatus)>)> = Vec::new();
    for (position, timeline) in timelines.iter().enumerate() {
        let undated = timeline.undated_entries();
        if undated > 0 {
            warn!(
                "{} observation(s) of finding \"{}\" at {} have no usable date and were ignored",
                undated, timeline.key.vuln_class, timeline.key.path
            );
        }
        let history = timeline.normalized_entries();
        if history.is_empty() {
            warn!(
                "Finding \"{}\" at {} has no dated observation at all, it cannot appear in any snapshot",
                timeline.key.vuln_class, timeline.key.path
            );
            continue;
        }
        histories.push((position, history));
    }

    let mut open: BTreeSet<usize> = BTreeSet::new();
    let mut materializer = FindingMaterializer::new();
    let mut previous: Option<DateTime<Utc>> = None;

    for &cut in cut_points {
        // The snapshot boundary separates calendar days, not individual
        // cut points within the same day. It is dated at the last cut
        // point of the day it closes, and the very first cut point never
        // closes anything.
        if let Some(last_processed) = previous {
            if cut.date_naive() != last_processed.date_naive() {
                snapshots.push(build_snapshot(
                    last_processed,
                    &open,
                    timelines,
                    &mut materializer,
                ));
            }
        }

        for (position, history) in &histories {
            match status_as_of(history, cut) {
                Some(FindingStatus::Open) => {
                    open.insert(*position);
                }
                Some(FindingStatus::NotOpen) => {
                    open.remove(position);
                }
                // The finding is not known yet at this point
                None => {}
            }
        }

        previous = Some(cut);
    }

    // The walk always ends with the state as of the last cut point
    if let Some(last_processed) = previous {
        snapshots.push(build_snapshot(
            last_processed,
            &open,
            timelines,
            &mut materializer,
        ));
    }

    debug!("{} snapshot(s) reconstructed", snapshots.len());
    snapshots
}

/// Determines the status of a finding as of a cut point.
///
/// Before the first observation the finding is unknown. At or after the
/// last observation, the last observed status applies. Strictly inside
/// the observed span the finding is open: the model only records the
/// discrete transition points, so any point between two observations is
/// open unless a transition closed it by then.
fn status_as_of(
    history: &[(DateTime<Utc>, FindingStatus)],
    cut: DateTime<Utc>,
) -> Option<FindingStatus> {
    let (first_seen, _) = history.first()?;
    let (last_seen, last_status) = history.last()?;
    if cut < *first_seen {
        return None;
    }
    if cut >= *last_seen {
        return Some(*last_status);
    }
    Some(FindingStatus::Open)
}

/// Captures the open set into a snapshot.
/// Every finding goes through the materializer so that no finding
/// object is ever shared between two snapshots.
fn build_snapshot(
    import_time: DateTime<Utc>,
    open: &BTreeSet<usize>,
    timelines: &[FindingTimeline],
    materializer: &mut FindingMaterializer,
) -> ScanSnapshot {
    let findings = open
        .iter()
        .map(|&position| materializer.materialize(&timelines[position]))
        .collect::<Vec<_>>();

    if findings.is_empty() {
        warn!("The snapshot at {} contains no open finding", import_time);
    } else {
        debug!(
            "Snapshot at {} captured with {} open finding(s)",
            import_time,
            findings.len()
        );
    }

    ScanSnapshot {
        import_time,
        findings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::parser::{FeedParser, ParseStrategy};
    use crate::models::{FindingKey, TimelineEntry};
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn timeline(
        vuln_class: &str,
        path: &str,
        observations: &[(Option<DateTime<Utc>>, FindingStatus)],
    ) -> FindingTimeline {
        let mut timeline = FindingTimeline::new(
            FindingKey::new(vuln_class, path, None),
            Some("4".to_string()),
            Some("1".to_string()),
            None,
            String::new(),
        );
        for (ts, status) in observations {
            timeline.entries.push(TimelineEntry::new(*ts, *status));
        }
        timeline
    }

    fn cut_points(dates: &[DateTime<Utc>]) -> BTreeSet<DateTime<Utc>> {
        dates.iter().copied().collect()
    }

    #[test]
    fn no_cut_points_means_no_snapshots() {
        let snapshots = reconstruct_scans(&[], &BTreeSet::new());
        assert!(snapshots.is_empty());
    }

    #[test]
    fn a_never_closed_finding_appears_in_every_snapshot() {
        let t1 = utc(2020, 1, 1, 0, 0, 0);
        let t2 = utc(2020, 1, 5, 0, 0, 0);
        let timelines = vec![timeline(
            "SQLi",
            "/login",
            &[(Some(t1), FindingStatus::Open), (Some(t2), FindingStatus::Open)],
        )];

        let snapshots = reconstruct_scans(&timelines, &cut_points(&[t1, t2]));
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].import_time, t1);
        assert_eq!(snapshots[1].import_time, t2);
        assert_eq!(snapshots[0].findings.len(), 1);
        assert_eq!(snapshots[1].findings.len(), 1);
    }

    #[test]
    fn same_day_observations_produce_a_single_snapshot() {
        let t1 = utc(2020, 1, 1, 8, 0, 0);
        let t2 = utc(2020, 1, 1, 17, 0, 0);
        let timelines = vec![timeline(
            "SQLi",
            "/login",
            &[(Some(t1), FindingStatus::Open), (Some(t2), FindingStatus::Open)],
        )];

        let snapshots = reconstruct_scans(&timelines, &cut_points(&[t1, t2]));
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].import_time, t2);
        assert_eq!(snapshots[0].findings.len(), 1);
    }

    #[test]
    fn a_closed_finding_leaves_the_snapshots_from_its_closure_day() {
        let t1 = utc(2020, 3, 1, 0, 0, 0);
        let t2 = utc(2020, 3, 4, 0, 0, 0);
        let t3 = utc(2020, 3, 9, 0, 0, 0);
        let timelines = vec![
            timeline(
                "XSS",
                "/search",
                &[(Some(t1), FindingStatus::Open), (Some(t3), FindingStatus::NotOpen)],
            ),
            // A second finding keeps the middle cut point alive
            timeline(
                "SQLi",
                "/login",
                &[(Some(t2), FindingStatus::Open)],
            ),
        ];

        let snapshots = reconstruct_scans(&timelines, &cut_points(&[t1, t2, t3]));
        assert_eq!(snapshots.len(), 3);

        // Open strictly between discovery and closure
        let ids_at = |i: usize| {
            snapshots[i]
                .findings
                .iter()
                .map(|f| f.native_id().to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(snapshots[0].findings.len(), 1);
        assert_eq!(snapshots[1].findings.len(), 2);
        // From the closure day on, the XSS finding is gone
        assert_eq!(snapshots[2].findings.len(), 1);
        assert!(!ids_at(2).contains(&ids_at(0)[0]));
    }

    #[test]
    fn a_finding_is_unknown_before_its_first_observation() {
        let t1 = utc(2020, 5, 1, 0, 0, 0);
        let t2 = utc(2020, 5, 10, 0, 0, 0);
        let timelines = vec![
            timeline("SQLi", "/a", &[(Some(t1), FindingStatus::Open)]),
            timeline("XSS", "/b", &[(Some(t2), FindingStatus::Open)]),
        ];

        let snapshots = reconstruct_scans(&timelines, &cut_points(&[t1, t2]));
        assert_eq!(snapshots.len(), 2);
        // The late finding is neither added nor removed on the first day
        assert_eq!(snapshots[0].findings.len(), 1);
        assert_eq!(snapshots[1].findings.len(), 2);
    }

    #[test]
    fn one_snapshot_per_distinct_day_on_strictly_ascending_cut_points() {
        // Characterization of the day-bucket boundary: several cut
        // points per day across several days must retrigger the
        // boundary on every change of day, not only on the first one
        let cuts = [
            utc(2021, 1, 1, 9, 0, 0),
            utc(2021, 1, 1, 18, 0, 0),
            utc(2021, 1, 2, 9, 0, 0),
            utc(2021, 1, 2, 18, 0, 0),
            utc(2021, 1, 3, 9, 0, 0),
            utc(2021, 1, 3, 18, 0, 0),
        ];
        let timelines = vec![timeline(
            "SQLi",
            "/login",
            &[
                (Some(cuts[0]), FindingStatus::Open),
                (Some(cuts[5]), FindingStatus::Open),
            ],
        )];

        let snapshots = reconstruct_scans(&timelines, &cut_points(&cuts));
        assert_eq!(snapshots.len(), 3);
        // Each snapshot is dated at the last cut point of its day
        assert_eq!(snapshots[0].import_time, cuts[1]);
        assert_eq!(snapshots[1].import_time, cuts[3]);
        assert_eq!(snapshots[2].import_time, cuts[5]);
        for snapshot in &snapshots {
            assert_eq!(snapshot.findings.len(), 1);
        }
    }

    #[test]
    fn a_recurring_finding_is_one_full_record_then_references() {
        let days: Vec<DateTime<Utc>> = (1..=5).map(|d| utc(2022, 7, d, 0, 0, 0)).collect();
        let timelines = vec![timeline(
            "SQLi",
            "/login",
            &[
                (Some(days[0]), FindingStatus::Open),
                (Some(days[4]), FindingStatus::Open),
            ],
        )];

        let snapshots = reconstruct_scans(&timelines, &cut_points(&days));
        assert_eq!(snapshots.len(), 5);

        let full = snapshots
            .iter()
            .flat_map(|s| &s.findings)
            .filter(|f| f.is_full())
            .count();
        let references = snapshots
            .iter()
            .flat_map(|s| &s.findings)
            .filter(|f| !f.is_full())
            .count();
        // Present in 5 snapshots: 1 full record, 4 references
        assert_eq!(full, 1);
        assert_eq!(references, 4);
    }

    #[test]
    fn undated_observations_do_not_affect_the_walk() {
        let t1 = utc(2020, 1, 1, 0, 0, 0);
        let timelines = vec![
            timeline(
                "SQLi",
                "/login",
                &[(None, FindingStatus::NotOpen), (Some(t1), FindingStatus::Open)],
            ),
            // Only undated observations: never appears anywhere
            timeline("XSS", "/x", &[(None, FindingStatus::Open)]),
        ];

        let snapshots = reconstruct_scans(&timelines, &cut_points(&[t1]));
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].findings.len(), 1);
    }

    #[test]
    fn feed_to_snapshots_end_to_end() {
        // One finding discovered 2020-01-01 open and retested open
        // 2020-01-05: two cut points on two distinct days, so two
        // snapshots, both containing the finding
        let feed = r#"<vulnerabilities>
            <vulnerability id="100" class="SQLi" severity="5" site="42">
                <attack_vector tested="2020-01-05T00:00:00Z" state="open" found="2020-01-01T00:00:00Z">
                    <request url="http://example.com/login"/>
                    <param name="user"/>
                </attack_vector>
            </vulnerability>
        </vulnerabilities>"#;

        let parser = FeedParser::new(ParseStrategy::Independent, "https://sentinel.example.com");
        let parsed = parser.parse(feed.as_bytes()).unwrap();
        let snapshots = reconstruct_scans(&parsed.timelines, &parsed.cut_points);

        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].import_time, utc(2020, 1, 1, 0, 0, 0));
        assert_eq!(snapshots[1].import_time, utc(2020, 1, 5, 0, 0, 0));
        assert_eq!(snapshots[0].findings.len(), 1);
        assert_eq!(snapshots[1].findings.len(), 1);
        assert!(snapshots[0].findings[0].is_full());
        assert!(!snapshots[1].findings[0].is_full());
        assert_eq!(
            snapshots[0].findings[0].native_id(),
            snapshots[1].findings[0].native_id()
        );
    }
}
