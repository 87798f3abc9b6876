//! Defines the CSV report listing each published file with its signed
//! URL.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// The report's header row.
pub const HEADER: [&str; 2] = ["File Name", "URL"];

/// The name shown for a key: everything before its first dot.
pub fn display_name(key: &str) -> &str {
    key.split('.').next().unwrap_or(key)
}

/// Appends name/URL rows to a CSV sink.
pub struct Report<W: Write> {
    writer: csv::Writer<W>,
    rows: usize,
}

impl<W: Write> Report<W> {
    /// Wraps a sink. The header is written only when `with_header`
    /// is set, so that appending to an existing report doesn't repeat
    /// it.
    pub fn new(sink: W, with_header: bool) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(sink);
        if with_header {
            writer.write_record(HEADER)?;
        }
        Ok(Report { writer, rows: 0 })
    }

    /// Adds a row for `key`.
    pub fn record(&mut self, key: &str, url: &str) -> Result<()> {
        self.writer
            .write_record([display_name(key), url])
            .with_context(|| format!("Failed to write report row for {:?}", key))?;
        self.rows += 1;
        Ok(())
    }

    /// The number of rows written since opening.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flushes pending rows and returns the sink.
    pub fn finish(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush report: {}", e.error()))
    }
}

impl Report<std::fs::File> {
    /// Opens the report file for appending, creating it if needed.
    pub fn append_to(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open report file {:?}", path))?;
        let empty = file
            .metadata()
            .with_context(|| format!("Failed to inspect report file {:?}", path))?
            .len()
            == 0;
        Report::new(file, empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn display_name_stops_at_first_dot() {
        assert_eq!(display_name("merchant-42.csv"), "merchant-42");
        assert_eq!(display_name("a.b.csv"), "a");
        assert_eq!(display_name("plain"), "plain");
    }

    #[test]
    fn writes_header_then_rows() {
        let mut report = Report::new(Vec::new(), true).unwrap();
        report.record("m1.csv", "https://cdn/m1.csv?x=1").unwrap();
        report.record("m2.csv", "https://cdn/m2.csv?x=2").unwrap();
        assert_eq!(report.rows(), 2);
        let out = String::from_utf8(report.finish().unwrap()).unwrap();
        assert_eq!(
            out,
            "File Name,URL\nm1,https://cdn/m1.csv?x=1\nm2,https://cdn/m2.csv?x=2\n"
        );
    }

    #[test]
    fn appending_keeps_single_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("output.csv");
        for name in ["a.csv", "b.csv"] {
            let mut report = Report::append_to(&path).unwrap();
            report.record(name, "https://cdn/x").unwrap();
            report.finish().unwrap();
        }
        let out = fs::read_to_string(&path).unwrap();
        assert_eq!(out, "File Name,URL\na,https://cdn/x\nb,https://cdn/x\n");
    }
}
