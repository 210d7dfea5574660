//! Sweep configuration.
//!
//! [`SweepConfig`] is the validated, read-only view the engine runs from.
//! [`BenchFile`] is the optional TOML file layered underneath the CLI flags:
//! flag > file > compiled-in default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SweepError;

const MIB: u64 = 1024 * 1024;

pub const DEFAULT_START_BLOCK_BYTES: u64 = 2 * MIB;
pub const DEFAULT_END_BLOCK_BYTES: u64 = 32 * MIB;
pub const DEFAULT_INCREMENT_BLOCK_BYTES: u64 = MIB;
pub const DEFAULT_FILE_SIZE_BYTES: u64 = 512 * MIB;
pub const DEFAULT_FILES_PER_CONFIGURATION: u32 = 5;
pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 120;

/// Block-size grid of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSweep {
    pub start_block_bytes: u64,
    pub end_block_bytes: u64,
    pub increment_block_bytes: u64,
    /// Apply block sizes end→start while iterating the nominal grid start→end.
    pub reverse: bool,
}

impl Default for BlockSweep {
    fn default() -> Self {
        Self {
            start_block_bytes: DEFAULT_START_BLOCK_BYTES,
            end_block_bytes: DEFAULT_END_BLOCK_BYTES,
            increment_block_bytes: DEFAULT_INCREMENT_BLOCK_BYTES,
            reverse: false,
        }
    }
}

/// How trial timings become rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowMode {
    /// One row per block size, mean of its trials.
    #[default]
    Averaged,
    /// One row per trial.
    PerTrial,
}

/// Everything the engine needs for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepConfig {
    pub blocks: BlockSweep,
    pub file_size_bytes: u64,
    pub files_per_configuration: u32,
    pub concurrency: usize,
    pub operation_timeout: Duration,
    pub row_mode: RowMode,
    pub measure_download: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            blocks: BlockSweep::default(),
            file_size_bytes: DEFAULT_FILE_SIZE_BYTES,
            files_per_configuration: DEFAULT_FILES_PER_CONFIGURATION,
            concurrency: DEFAULT_CONCURRENCY,
            operation_timeout: Duration::from_secs(DEFAULT_OPERATION_TIMEOUT_SECS),
            row_mode: RowMode::Averaged,
            measure_download: true,
        }
    }
}

impl SweepConfig {
    /// Reject structurally invalid settings before any network activity.
    /// `start > end` is allowed and yields an empty sweep.
    pub fn validate(&self) -> Result<(), SweepError> {
        if self.blocks.increment_block_bytes == 0 {
            return Err(SweepError::invalid("block size increment must be greater than 0"));
        }
        if self.blocks.start_block_bytes == 0 {
            return Err(SweepError::invalid("start block size must be greater than 0"));
        }
        if self.file_size_bytes == 0 {
            return Err(SweepError::invalid("file size must be greater than 0"));
        }
        if usize::try_from(self.file_size_bytes).is_err() {
            return Err(SweepError::invalid(format!(
                "file size {} does not fit in memory on this platform",
                self.file_size_bytes
            )));
        }
        if self.files_per_configuration == 0 {
            return Err(SweepError::invalid("files per configuration must be at least 1"));
        }
        if self.concurrency == 0 {
            return Err(SweepError::invalid("concurrency must be at least 1"));
        }
        if self.operation_timeout.is_zero() {
            return Err(SweepError::invalid("operation timeout must be greater than 0"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TOML file
// ---------------------------------------------------------------------------

/// Root of the optional `--config` file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchFile {
    pub sweep: SweepSection,
    pub transport: TransportSection,
    pub output: OutputSection,
    pub logging: LoggingSection,
}

impl BenchFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let file: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "Loaded benchmark configuration");
        Ok(file)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepSection {
    pub start_block_bytes: u64,
    pub end_block_bytes: u64,
    pub increment_block_bytes: u64,
    pub reverse: bool,
    pub file_size_bytes: u64,
    pub files_per_configuration: u32,
    pub concurrency: usize,
    pub operation_timeout_secs: u64,
    pub row_mode: RowMode,
    pub measure_download: bool,
}

impl Default for SweepSection {
    fn default() -> Self {
        Self::from(&SweepConfig::default())
    }
}

impl From<&SweepConfig> for SweepSection {
    fn from(config: &SweepConfig) -> Self {
        Self {
            start_block_bytes: config.blocks.start_block_bytes,
            end_block_bytes: config.blocks.end_block_bytes,
            increment_block_bytes: config.blocks.increment_block_bytes,
            reverse: config.blocks.reverse,
            file_size_bytes: config.file_size_bytes,
            files_per_configuration: config.files_per_configuration,
            concurrency: config.concurrency,
            operation_timeout_secs: config.operation_timeout.as_secs(),
            row_mode: config.row_mode,
            measure_download: config.measure_download,
        }
    }
}

impl SweepSection {
    /// Build and validate the engine configuration.
    pub fn to_config(&self) -> Result<SweepConfig, SweepError> {
        let config = SweepConfig {
            blocks: BlockSweep {
                start_block_bytes: self.start_block_bytes,
                end_block_bytes: self.end_block_bytes,
                increment_block_bytes: self.increment_block_bytes,
                reverse: self.reverse,
            },
            file_size_bytes: self.file_size_bytes,
            files_per_configuration: self.files_per_configuration,
            concurrency: self.concurrency,
            operation_timeout: Duration::from_secs(self.operation_timeout_secs),
            row_mode: self.row_mode,
            measure_download: self.measure_download,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Backend connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSection {
    /// Prefer the environment or the flag over writing the key to disk.
    pub connection_string: Option<String>,
    /// Retries per backend request. Absent means unlimited.
    pub max_retries: Option<u32>,
    /// Explicit container name; default is `blobsweep-<unix seconds>`.
    pub container: Option<String>,
}

/// Where the result table goes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    /// CSV destination. Without it the table is printed to stdout.
    pub csv_file_path: Option<PathBuf>,
    /// Print JSON instead of an aligned table when writing to stdout.
    pub json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Default tracing level; `RUST_LOG` still wins.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Name for a run's transient container.
pub fn default_container_name(now: chrono::DateTime<chrono::Utc>) -> String {
    format!("blobsweep-{}", now.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = SweepConfig::default();
        assert_eq!(cfg.blocks.start_block_bytes, 2_097_152);
        assert_eq!(cfg.blocks.end_block_bytes, 33_554_432);
        assert_eq!(cfg.blocks.increment_block_bytes, 1_048_576);
        assert!(!cfg.blocks.reverse);
        assert_eq!(cfg.file_size_bytes, 536_870_912);
        assert_eq!(cfg.files_per_configuration, 5);
        assert_eq!(cfg.concurrency, 4);
        assert_eq!(cfg.operation_timeout, Duration::from_secs(120));
        assert_eq!(cfg.row_mode, RowMode::Averaged);
        assert!(cfg.measure_download);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_zero_increment_is_invalid() {
        let mut cfg = SweepConfig::default();
        cfg.blocks.increment_block_bytes = 0;
        assert!(matches!(cfg.validate(), Err(SweepError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_start_after_end_is_valid() {
        let mut cfg = SweepConfig::default();
        cfg.blocks.start_block_bytes = 8 * MIB;
        cfg.blocks.end_block_bytes = 4 * MIB;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_zero_counts_are_invalid() {
        let cases: [fn(&mut SweepConfig); 5] = [
            |c| c.files_per_configuration = 0,
            |c| c.concurrency = 0,
            |c| c.file_size_bytes = 0,
            |c| c.operation_timeout = Duration::ZERO,
            |c| c.blocks.start_block_bytes = 0,
        ];
        for mutate in cases {
            let mut cfg = SweepConfig::default();
            mutate(&mut cfg);
            assert!(cfg.validate().is_err(), "{cfg:?} should be rejected");
        }
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let file: BenchFile = toml::from_str(
            r#"
[sweep]
start_block_bytes = 1048576
end_block_bytes = 3145728
reverse = true
row_mode = "per_trial"

[output]
csv_file_path = "/tmp/results.csv"
"#,
        )
        .unwrap();

        let cfg = file.sweep.to_config().unwrap();
        assert_eq!(cfg.blocks.start_block_bytes, MIB);
        assert_eq!(cfg.blocks.end_block_bytes, 3 * MIB);
        assert_eq!(cfg.blocks.increment_block_bytes, DEFAULT_INCREMENT_BLOCK_BYTES);
        assert!(cfg.blocks.reverse);
        assert_eq!(cfg.row_mode, RowMode::PerTrial);
        assert_eq!(cfg.files_per_configuration, DEFAULT_FILES_PER_CONFIGURATION);
        assert_eq!(file.output.csv_file_path, Some(PathBuf::from("/tmp/results.csv")));
        assert_eq!(file.logging.level, "info");
        assert!(file.transport.max_retries.is_none());
    }

    #[test]
    fn test_invalid_toml_sweep_rejected() {
        let file: BenchFile = toml::from_str("[sweep]\nincrement_block_bytes = 0\n").unwrap();
        assert!(file.sweep.to_config().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("blobsweep.toml");
        std::fs::write(&path, "[sweep]\nfiles_per_configuration = 2\n").unwrap();

        let file = BenchFile::load(&path).unwrap();
        assert_eq!(file.sweep.files_per_configuration, 2);
    }

    #[test]
    fn test_load_missing_file_errors() {
        assert!(BenchFile::load(Path::new("/nonexistent/blobsweep.toml")).is_err());
    }

    #[test]
    fn test_container_name_from_timestamp() {
        let now = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(default_container_name(now), "blobsweep-1700000000");
    }
}
