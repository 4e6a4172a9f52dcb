use super::types::{HAR_VERSION, Har};
use crate::{Error, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub struct HarReader;

impl HarReader {
    /// Read and parse a HAR file from the given path
    pub fn from_file(path: &Path) -> Result<Har> {
        tracing::debug!("Reading HAR file from: {}", path.display());

        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let har: Har = serde_json::from_reader(reader)?;

        tracing::debug!("Parsed HAR file with {} entries", har.log.entries.len());

        Ok(har)
    }

    /// Parse a HAR document from a JSON string
    pub fn from_str(content: &str) -> Result<Har> {
        let har: Har = serde_json::from_str(content)?;
        Ok(har)
    }

    /// Check the invariants every converted document must hold.
    pub fn validate(har: &Har) -> Result<()> {
        tracing::debug!("Validating HAR structure");

        if har.log.version != HAR_VERSION {
            return Err(Error::InvalidStructure(format!(
                "expected HAR version {}, found '{}'",
                HAR_VERSION, har.log.version
            )));
        }

        for (idx, entry) in har.log.entries.iter().enumerate() {
            if entry.request.method.is_empty() {
                return Err(Error::InvalidStructure(format!(
                    "Entry {} has empty request method",
                    idx
                )));
            }
            if entry.request.url.is_empty() {
                return Err(Error::InvalidStructure(format!(
                    "Entry {} has empty request URL",
                    idx
                )));
            }
            if chrono::DateTime::parse_from_rfc3339(&entry.started_date_time).is_err() {
                return Err(Error::InvalidStructure(format!(
                    "Entry {} has invalid startedDateTime '{}'",
                    idx, entry.started_date_time
                )));
            }
            if entry.time < 0.0 {
                return Err(Error::InvalidStructure(format!(
                    "Entry {} has negative total time",
                    idx
                )));
            }
            let t = &entry.timings;
            let phases = [
                t.blocked, t.dns, t.connect, t.ssl, t.send, t.wait, t.receive,
            ];
            if phases.iter().any(|v| *v < 0.0 && *v != -1.0) {
                return Err(Error::InvalidStructure(format!(
                    "Entry {} has a negative timing other than -1",
                    idx
                )));
            }
        }

        tracing::debug!("HAR structure is valid");
        Ok(())
    }
}
