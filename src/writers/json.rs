//! Write the [`ScanSnapshot`]s as JSON
//! It presents the reconstructed scans in a JSON format and prints it
//! on STDOUT.

use log::error;
use serde_json::value::Value;
use serde_json::Map;

use super::Writer;
use crate::models::ScanSnapshot;

/// A writer to print the reconstructed scans as JSON.
pub struct JsonWriter {
    /// The display name of the site the scans belong to
    site: String,
}

impl JsonWriter {
    /// Create a new JsonWriter
    pub fn new(site: &str) -> Self {
        Self {
            site: site.to_string(),
        }
    }
}

impl Writer for JsonWriter {
    /// Writes the snapshots
    fn write(&self, snapshots: &[ScanSnapshot]) {
        let scans = match serde_json::to_value(snapshots) {
            Ok(value) => value,
            Err(e) => {
                error!("Unable to serialize the snapshots: {}", e);
                return;
            }
        };

        let mut map = Map::new();
        map.insert("site".to_string(), Value::String(self.site.clone()));
        map.insert("scans".to_string(), scans);

        let output = Value::Object(map);
        println!("{}", output);
    }
}
