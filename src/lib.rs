//! blobsweep -- block-size sweep benchmark for object-storage throughput.
//!
//! Uploads and downloads fixed-size blobs across a grid of block sizes and
//! reports the mean transfer time per size. The engine lives in [`sweep`];
//! [`run`] wraps it with container provisioning, cancellation, and output.

pub mod config;
pub mod container;
pub mod error;
pub mod report;
pub mod shutdown;
pub mod sweep;
pub mod transport;
pub mod units;

use std::future::Future;

use tracing::{info, warn};

pub use config::SweepConfig;
pub use container::ProvisionedContainer;
pub use error::SweepError;
pub use report::{ConfigurationResult, ResultSink, ResultTable};
pub use transport::BlobTransport;

/// One complete benchmark run.
///
/// 1. Validate `config` and the block grid. Nothing touches the network
///    before this succeeds.
/// 2. Create `container`.
/// 3. Run the sweep, racing it against `shutdown`.
/// 4. Delete the container on every path.
/// 5. Hand the table to `sink`, only if the sweep completed.
///
/// A failed delete after a successful sweep still writes the results and
/// then returns the provisioning error. After a failed sweep the delete
/// failure is only logged and the sweep error is returned.
pub async fn run<T, S, F>(
    transport: &T,
    config: &SweepConfig,
    container: &str,
    sink: &mut S,
    shutdown: F,
) -> Result<ResultTable, SweepError>
where
    T: BlobTransport + ?Sized,
    S: ResultSink + ?Sized,
    F: Future<Output = ()>,
{
    config.validate()?;
    sweep::SweepPlanner::new(&config.blocks)?;

    let provisioned = ProvisionedContainer::create(transport, container).await?;

    let outcome = tokio::select! {
        result = sweep::run_sweep(transport, provisioned.name(), config) => result,
        _ = shutdown => {
            warn!("Shutdown requested, aborting sweep");
            Err(SweepError::Interrupted)
        }
    };

    let released = provisioned.release(transport).await;

    // A delete failure was already logged by release.
    let table = match (outcome, released) {
        (Ok(table), released) => {
            sink.write_table(&table)?;
            released?;
            table
        }
        (Err(err), _) => return Err(err),
    };

    info!(rows = table.len(), "Run complete");
    Ok(table)
}
