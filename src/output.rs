//! CSV report written once, after the scan completes.

use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::models::MatchRecord;

/// Write the report if there is anything to report. Returns whether a file
/// was written; an empty scan leaves no file behind.
pub fn persist_if_any(matches: &[MatchRecord], path: &Path) -> Result<bool> {
    if matches.is_empty() {
        return Ok(false);
    }
    write_matches(matches, path)?;
    Ok(true)
}

/// Serialize all rows into memory, then replace the output file in one write.
fn write_matches(matches: &[MatchRecord], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in matches {
        writer.serialize(record)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    fs::write(path, bytes)?;
    Ok(())
}
