//! Result rows and the table they accumulate into.

pub mod sink;

use serde::Serialize;

pub use sink::{ConsoleSink, CsvFileSink, ResultSink};

/// One row of output: a block size and its measured durations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigurationResult {
    /// Human-readable effective block size, e.g. `2MiB`.
    pub block_size_label: String,
    pub upload_millis: u64,
    /// `None` when downloads were not measured.
    pub download_millis: Option<u64>,
}

impl ConfigurationResult {
    pub fn new(block_size_label: impl Into<String>, upload_millis: u64, download_millis: Option<u64>) -> Self {
        Self {
            block_size_label: block_size_label.into(),
            upload_millis,
            download_millis,
        }
    }

    fn record(&self) -> [String; 3] {
        [
            self.block_size_label.clone(),
            self.upload_millis.to_string(),
            self.download_millis.map(|ms| ms.to_string()).unwrap_or_default(),
        ]
    }
}

/// Ordered result rows. Insertion order is execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResultTable {
    rows: Vec<ConfigurationResult>,
}

impl ResultTable {
    pub const HEADER: [&'static str; 3] = ["Block Size", "Upload Duration", "Download Duration"];

    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: ConfigurationResult) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[ConfigurationResult] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Header followed by one string record per row.
    pub fn records(&self) -> Vec<Vec<String>> {
        let mut out = Vec::with_capacity(self.rows.len() + 1);
        out.push(Self::HEADER.iter().map(|h| h.to_string()).collect());
        out.extend(self.rows.iter().map(|r| r.record().to_vec()));
        out
    }
}
