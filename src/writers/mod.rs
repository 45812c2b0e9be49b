//! Writing reconstructed scans
//!
//! After the reconstruction finishes, it's up to a writer to handle the
//! [`ScanSnapshot`]s. It provides a common interface, allowing to work
//! on the snapshots without affecting the execution of the application.

pub mod json;
pub mod textstdout;

use crate::models::ScanSnapshot;

/// A trait to have a common interface between writers.
/// A writer has the responsibility to present the [`ScanSnapshot`]s in
/// a way, be it on standard output as text or as JSON.
pub trait Writer {
    /// Write the snapshots
    /// What is done with the [`ScanSnapshot`]s is totally up to the
    /// writer. They could be written to stdout, to a file, sent to an
    /// API, etc.
    fn write(&self, snapshots: &[ScanSnapshot]);
}
