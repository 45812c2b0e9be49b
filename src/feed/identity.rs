//! The identity of findings.
//! This module computes the deterministic hash identifying a finding
//! across imports, and decides whether a snapshot receives the full
//! record of a finding or only a reference to it.

use std::collections::HashSet;

use log::trace;
use sha2::{Digest, Sha256};

use crate::models::{Finding, FindingTimeline, SnapshotFinding};

/// Computes the native id of a finding.
/// The hash is a pure function of the class, path and parameter, so the
/// same underlying vulnerability gets the same id on every import and a
/// re-import updates stored records instead of duplicating them.
/// Components are trimmed and lowercased before hashing.
pub fn native_id(vuln_class: &str, path: &str, parameter: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(vuln_class.trim().to_lowercase().as_bytes());
    hasher.update(path.trim().to_lowercase().as_bytes());
    if let Some(parameter) = parameter {
        hasher.update(parameter.trim().to_lowercase().as_bytes());
    }
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

/// Materializes findings into snapshots.
/// The first snapshot containing a finding gets the full record, every
/// later one gets a native-id-only reference. This bounds memory when a
/// long reconstructed history repeats the same open findings across
/// many snapshots.
pub struct FindingMaterializer {
    /// The native ids already attached in full somewhere
    materialized: HashSet<String>,
}

impl FindingMaterializer {
    /// Creates a new FindingMaterializer
    pub fn new() -> Self {
        FindingMaterializer {
            materialized: HashSet::new(),
        }
    }

    /// Turns a timeline into the finding to store in a snapshot,
    /// applying the copy-vs-attach rule.
    pub fn materialize(&mut self, timeline: &FindingTimeline) -> SnapshotFinding {
        trace!("Running FindingMaterializer::materialize()");
        let native_id = native_id(
            &timeline.key.vuln_class,
            &timeline.key.path,
            timeline.key.parameter.as_deref(),
        );
        if self.materialized.contains(&native_id) {
            return SnapshotFinding::Reference { native_id };
        }
        self.materialized.insert(native_id.clone());
        SnapshotFinding::Full(Finding {
            native_id,
            display_id: timeline.display_id.clone(),
            vuln_class: timeline.key.vuln_class.clone(),
            path: timeline.key.path.clone(),
            parameter: timeline.key.parameter.clone(),
            severity: timeline.severity.clone(),
            url_reference: timeline.url_reference.clone(),
            raw_fragment: timeline.raw_fragment.clone(),
        })
    }
}
