//! Write the [`ScanSnapshot`]s to standard output
//! It is the default writer, it presents the reconstructed scans in a
//! text format and prints it on STDOUT.

use super::Writer;
use crate::models::{ScanSnapshot, SnapshotFinding};

/// A writer to print the reconstructed scans in the terminal.
pub struct TextStdoutWriter {
    /// The display name of the site the scans belong to
    site: String,
}

impl TextStdoutWriter {
    /// Create a new TextStdoutWriter
    pub fn new(site: &str) -> Self {
        Self {
            site: site.to_string(),
        }
    }
}

impl Writer for TextStdoutWriter {
    /// Prints the snapshots on STDOUT
    fn write(&self, snapshots: &[ScanSnapshot]) {
        println!("----------{}----------\n", self.site);
        for snapshot in snapshots {
            println!(
                "Scan of {} ({} open finding(s))",
                snapshot.import_time.format("%Y-%m-%d %H:%M:%S"),
                snapshot.findings.len()
            );
            for finding in &snapshot.findings {
                match finding {
                    SnapshotFinding::Full(full) => {
                        let mut severity = "unknown";
                        if full.severity.is_some() {
                            severity = full.severity.as_ref().unwrap();
                        }
                        println!(
                            "  [severity {}] {} at {} (parameter: {})",
                            severity,
                            full.vuln_class,
                            full.path,
                            full.parameter.as_deref().unwrap_or("-"),
                        );
                    }
                    SnapshotFinding::Reference { native_id } => {
                        println!("  [already reported] {}", native_id);
                    }
                }
            }
            println!();
        }
    }
}
