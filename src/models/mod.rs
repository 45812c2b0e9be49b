//! In this module are declared the entities manipulated by this program

pub mod reqres;

use chrono::{DateTime, Utc};
use clap::{builder::PossibleValue, ValueEnum};
use serde::Serialize;

/// Represents one monitored site listed in the remote catalog.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CatalogEntry {
    /// The identifier of the site on the provider side
    pub external_id: String,
    /// The human-readable name of the site
    pub display_name: String,
}

impl CatalogEntry {
    /// Creates a new catalog entry
    pub fn new(external_id: &str, display_name: &str) -> Self {
        CatalogEntry {
            external_id: external_id.to_string(),
            display_name: display_name.to_string(),
        }
    }
}

/// Represents the state of a finding at one observation.
/// The provider reports free-form status strings, they are normalized
/// to these two values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FindingStatus {
    /// The finding was open at the observation
    Open,
    /// The finding was anything but open (closed, accepted, invalid...)
    NotOpen,
}

impl FindingStatus {
    /// Normalizes a provider status string.
    /// Only "open" (case-insensitive) maps to Open, everything else is
    /// considered not open.
    pub fn from_provider(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("open") {
            FindingStatus::Open
        } else {
            FindingStatus::NotOpen
        }
    }
}

/// Represents one observation of a finding's state.
#[derive(Clone, Debug, PartialEq)]
pub struct TimelineEntry {
    /// When the observation was made.
    /// None means the provider date was missing or unparseable, such an
    /// observation is excluded from comparisons.
    pub timestamp: Option<DateTime<Utc>>,
    /// The state observed
    pub status: FindingStatus,
}

impl TimelineEntry {
    /// Creates a new timeline entry
    pub fn new(timestamp: Option<DateTime<Utc>>, status: FindingStatus) -> Self {
        TimelineEntry { timestamp, status }
    }
}

/// Represents the identity of a finding.
/// Two findings with the same class, path and parameter are the same
/// underlying vulnerability, whatever the provider identifier says.
/// The key is fully built before being used for any lookup and is never
/// modified afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FindingKey {
    /// The class of vulnerability
    /// Example: Cross Site Scripting
    pub vuln_class: String,
    /// The path component of the attacked URL
    pub path: String,
    /// The name of the attacked parameter
    /// Optional since some findings target the whole page
    pub parameter: Option<String>,
}

impl FindingKey {
    /// Creates a new finding key
    pub fn new(vuln_class: &str, path: &str, parameter: Option<&str>) -> Self {
        FindingKey {
            vuln_class: vuln_class.to_string(),
            path: path.to_string(),
            parameter: parameter.map(|p| p.to_string()),
        }
    }
}

/// Represents the full observed history of one finding.
/// It is owned by a single reconstruction pass and dropped with it.
#[derive(Clone, Debug)]
pub struct FindingTimeline {
    /// The identity of the finding
    pub key: FindingKey,
    /// The severity reported by the provider
    pub severity: Option<String>,
    /// The provider's own identifier, kept for display only
    pub display_id: Option<String>,
    /// A link back to the finding on the provider side
    pub url_reference: Option<String>,
    /// The markup of the feed entry, kept verbatim for audit
    pub raw_fragment: String,
    /// The observations, in feed order
    pub entries: Vec<TimelineEntry>,
}

impl FindingTimeline {
    /// Creates a new timeline for a finding
    pub fn new(
        key: FindingKey,
        severity: Option<String>,
        display_id: Option<String>,
        url_reference: Option<String>,
        raw_fragment: String,
    ) -> Self {
        FindingTimeline {
            key,
            severity,
            display_id,
            url_reference,
            raw_fragment,
            entries: Vec::new(),
        }
    }

    /// Returns the dated observations, sorted ascending.
    /// Observations without a usable date are left out. Several
    /// observations at the same instant collapse into one, the last
    /// one seen in the feed wins.
    pub fn normalized_entries(&self) -> Vec<(DateTime<Utc>, FindingStatus)> {
        let mut dated: Vec<(DateTime<Utc>, FindingStatus)> = self
            .entries
            .iter()
            .filter_map(|e| e.timestamp.map(|ts| (ts, e.status)))
            .collect();
        // The sort must be stable so that the feed order decides between
        // observations made at the same instant
        dated.sort_by_key(|(ts, _)| *ts);

        let mut merged: Vec<(DateTime<Utc>, FindingStatus)> = Vec::with_capacity(dated.len());
        for (ts, status) in dated {
            match merged.last_mut() {
                Some(last) if last.0 == ts => last.1 = status,
                _ => merged.push((ts, status)),
            }
        }
        merged
    }

    /// Counts the observations whose date could not be parsed
    pub fn undated_entries(&self) -> usize {
        self.entries.iter().filter(|e| e.timestamp.is_none()).count()
    }
}

/// Represents a fully materialized finding, as handed to the caller.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Finding {
    /// The deterministic identity hash of the finding.
    /// Stable across imports so a re-import updates instead of duplicating.
    pub native_id: String,
    /// The provider's own identifier, for human display only
    pub display_id: Option<String>,
    /// The class of vulnerability
    pub vuln_class: String,
    /// The path component of the attacked URL
    pub path: String,
    /// The name of the attacked parameter
    pub parameter: Option<String>,
    /// The severity reported by the provider
    pub severity: Option<String>,
    /// A link back to the finding on the provider side
    pub url_reference: Option<String>,
    /// The markup of the feed entry, kept verbatim for audit
    pub raw_fragment: String,
}

/// Represents a finding as stored in a snapshot.
/// The first snapshot containing a finding carries the full record,
/// every following one only carries the native id, to bound memory when
/// a long history repeats the same open findings.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SnapshotFinding {
    /// The full record, attached once
    Full(Finding),
    /// A lightweight reference to an already materialized finding
    Reference {
        /// The deterministic identity hash of the finding
        native_id: String,
    },
}

impl SnapshotFinding {
    /// Returns the native id, whatever the materialization
    pub fn native_id(&self) -> &str {
        match self {
            SnapshotFinding::Full(finding) => &finding.native_id,
            SnapshotFinding::Reference { native_id } => native_id,
        }
    }

    /// Whether this is the full record
    pub fn is_full(&self) -> bool {
        matches!(self, SnapshotFinding::Full(_))
    }
}

/// Represents one reconstructed historical scan.
#[derive(Clone, Debug, Serialize)]
pub struct ScanSnapshot {
    /// The date the snapshot stands for
    pub import_time: DateTime<Utc>,
    /// The findings open as of the import time
    pub findings: Vec<SnapshotFinding>,
}

/// An enum to match the available writers
#[derive(Clone, Debug)]
pub enum Writers {
    /// StdoutWriter
    TextStdout,
    /// JsonWriter
    Json,
}

impl ValueEnum for Writers {
    /// Lists the variants available for clap
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::TextStdout, Self::Json]
    }

    /// Map each value to a possible value in clap
    fn to_possible_value(&self) -> Option<PossibleValue> {
        match &self {
            Self::TextStdout => Some(PossibleValue::new("textstdout")),
            Self::Json => Some(PossibleValue::new("json")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn status_normalization_only_accepts_open() {
        assert_eq!(FindingStatus::from_provider("open"), FindingStatus::Open);
        assert_eq!(FindingStatus::from_provider(" Open "), FindingStatus::Open);
        assert_eq!(FindingStatus::from_provider("OPEN"), FindingStatus::Open);
        assert_eq!(
            FindingStatus::from_provider("closed"),
            FindingStatus::NotOpen
        );
        assert_eq!(
            FindingStatus::from_provider("accepted"),
            FindingStatus::NotOpen
        );
        assert_eq!(FindingStatus::from_provider(""), FindingStatus::NotOpen);
    }

    #[test]
    fn normalized_entries_sorts_and_drops_undated() {
        let mut timeline = FindingTimeline::new(
            FindingKey::new("SQL Injection", "/login", Some("user")),
            Some("5".to_string()),
            None,
            None,
            String::new(),
        );
        let t1 = Utc.with_ymd_and_hms(2020, 3, 2, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2020, 3, 5, 0, 0, 0).unwrap();
        timeline
            .entries
            .push(TimelineEntry::new(Some(t2), FindingStatus::NotOpen));
        timeline
            .entries
            .push(TimelineEntry::new(None, FindingStatus::Open));
        timeline
            .entries
            .push(TimelineEntry::new(Some(t1), FindingStatus::Open));

        let normalized = timeline.normalized_entries();
        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized[0], (t1, FindingStatus::Open));
        assert_eq!(normalized[1], (t2, FindingStatus::NotOpen));
        assert_eq!(timeline.undated_entries(), 1);
    }

    #[test]
    fn normalized_entries_merges_same_instant_last_wins() {
        let mut timeline = FindingTimeline::new(
            FindingKey::new("XSS", "/", None),
            None,
            None,
            None,
            String::new(),
        );
        let t1 = Utc.with_ymd_and_hms(2021, 6, 1, 12, 0, 0).unwrap();
        timeline
            .entries
            .push(TimelineEntry::new(Some(t1), FindingStatus::Open));
        timeline
            .entries
            .push(TimelineEntry::new(Some(t1), FindingStatus::NotOpen));

        let normalized = timeline.normalized_entries();
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0], (t1, FindingStatus::NotOpen));
    }

    #[test]
    fn finding_keys_compare_on_identity_attributes() {
        let a = FindingKey::new("XSS", "/search", Some("q"));
        let b = FindingKey::new("XSS", "/search", Some("q"));
        let c = FindingKey::new("XSS", "/search", None);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
