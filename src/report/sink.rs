//! Destinations for a finished result table.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use super::ResultTable;
use crate::error::SweepError;

/// Receives the table exactly once, after a successful sweep.
pub trait ResultSink {
    fn write_table(&mut self, table: &ResultTable) -> Result<(), SweepError>;
}

/// Writes the table as CSV. The file appears atomically: a partial write
/// never replaces an existing file at `path`.
#[derive(Debug, Clone)]
pub struct CsvFileSink {
    path: PathBuf,
}

impl CsvFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn output_error(&self, source: std::io::Error) -> SweepError {
        SweepError::Output {
            path: self.path.clone(),
            source,
        }
    }
}

impl ResultSink for CsvFileSink {
    fn write_table(&mut self, table: &ResultTable) -> Result<(), SweepError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| self.output_error(e))?;

        let mut writer = csv::Writer::from_writer(tmp);
        for record in table.records() {
            writer
                .write_record(&record)
                .map_err(|e| self.output_error(e.into()))?;
        }
        let tmp = writer
            .into_inner()
            .map_err(|e| self.output_error(std::io::Error::new(e.error().kind(), e.error().to_string())))?;
        tmp.as_file().sync_all().map_err(|e| self.output_error(e))?;
        tmp.persist(&self.path).map_err(|e| self.output_error(e.error))?;

        info!(path = %self.path.display(), rows = table.len(), "Results written");
        Ok(())
    }
}

/// Prints the table to a writer, stdout in the binary.
pub struct ConsoleSink<W: Write> {
    out: W,
    json: bool,
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W, json: bool) -> Self {
        Self { out, json }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn render(&mut self, table: &ResultTable) -> std::io::Result<()> {
        if self.json {
            let json = serde_json::to_string_pretty(table).map_err(std::io::Error::other)?;
            return writeln!(self.out, "{}", json);
        }

        let [block, upload, download] = ResultTable::HEADER;
        writeln!(self.out, "{:<15} | {:<15} | {}", block, upload, download)?;
        writeln!(self.out, "{:-<15}-|-{:-<15}-|-{:-<17}", "", "", "")?;
        for row in table.rows() {
            let download = row
                .download_millis
                .map(|ms| format!("{} ms", ms))
                .unwrap_or_else(|| "-".to_string());
            writeln!(
                self.out,
                "{:<15} | {:<15} | {}",
                row.block_size_label,
                format!("{} ms", row.upload_millis),
                download
            )?;
        }
        self.out.flush()
    }
}

impl<W: Write> ResultSink for ConsoleSink<W> {
    fn write_table(&mut self, table: &ResultTable) -> Result<(), SweepError> {
        self.render(table).map_err(|source| SweepError::Output {
            path: PathBuf::from("<stdout>"),
            source,
        })
    }
}
