//! Sweep engine: plan the block sizes, run the trials, reduce to rows.

pub mod aggregate;
pub mod planner;
pub mod runner;

use tracing::info;

use crate::config::{RowMode, SweepConfig};
use crate::error::SweepError;
use crate::report::{ConfigurationResult, ResultTable};
use crate::transport::BlobTransport;
use crate::units::format_bytes;

pub use aggregate::average;
pub use planner::{SweepPlanner, SweepStep};
pub use runner::{blob_name, StepTimings, TrialRunner};

/// Run the whole sweep inside an existing container.
///
/// Steps and trials run strictly one after another. The first failure
/// aborts the sweep and no table is returned.
pub async fn run_sweep<T>(transport: &T, container: &str, config: &SweepConfig) -> Result<ResultTable, SweepError>
where
    T: BlobTransport + ?Sized,
{
    config.validate()?;
    let planner = SweepPlanner::new(&config.blocks)?;
    info!(
        configurations = planner.step_count(),
        files = config.files_per_configuration,
        file_size = %format_bytes(config.file_size_bytes),
        reverse = config.blocks.reverse,
        "Starting sweep"
    );

    let runner = TrialRunner::new(transport, container, config);
    let mut table = ResultTable::new();

    for step in planner {
        let timings = runner.run_step(step).await?;
        let label = format_bytes(step.effective_block_size);
        match config.row_mode {
            RowMode::Averaged => {
                let upload = average(&timings.upload_millis)?;
                let download = if config.measure_download {
                    Some(average(&timings.download_millis)?)
                } else {
                    None
                };
                info!(block_size = %label, upload_ms = upload, download_ms = ?download, "Configuration complete");
                table.push(ConfigurationResult::new(label, upload, download));
            }
            RowMode::PerTrial => {
                for (i, &upload) in timings.upload_millis.iter().enumerate() {
                    let download = timings.download_millis.get(i).copied();
                    table.push(ConfigurationResult::new(label.clone(), upload, download));
                }
            }
        }
    }

    info!(rows = table.len(), "Sweep finished");
    Ok(table)
}
