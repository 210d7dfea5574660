//! Timed upload/download trials for one block size.

use std::future::Future;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::StreamExt;
use tracing::info;

use super::planner::SweepStep;
use crate::config::SweepConfig;
use crate::error::{Operation, SweepError, TransferError};
use crate::transport::{BlobTransport, TransportError, UploadOptions};
use crate::units::format_bytes;

/// Durations for every trial of one step, in file-index order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepTimings {
    pub upload_millis: Vec<u64>,
    /// Empty when downloads are not measured.
    pub download_millis: Vec<u64>,
}

/// Blob name for a trial. Unique per (block size, file index) within a run.
pub fn blob_name(effective_block_size: u64, file_index: u32) -> String {
    format!("{effective_block_size}-{file_index}")
}

pub struct TrialRunner<'a, T: BlobTransport + ?Sized> {
    transport: &'a T,
    container: &'a str,
    config: &'a SweepConfig,
    payload: Bytes,
    file_size_label: String,
}

impl<'a, T: BlobTransport + ?Sized> TrialRunner<'a, T> {
    pub fn new(transport: &'a T, container: &'a str, config: &'a SweepConfig) -> Self {
        // Contents do not matter, only the size. Validation guarantees it fits.
        let len = usize::try_from(config.file_size_bytes).unwrap_or(usize::MAX);
        Self {
            transport,
            container,
            config,
            payload: Bytes::from(vec![0u8; len]),
            file_size_label: format_bytes(config.file_size_bytes),
        }
    }

    /// Run every trial for `step`, stopping at the first failure.
    pub async fn run_step(&self, step: SweepStep) -> Result<StepTimings, SweepError> {
        let block_size = step.effective_block_size;
        let block_label = format_bytes(block_size);
        let mut timings = StepTimings::default();

        for file_index in 1..=self.config.files_per_configuration {
            let blob = blob_name(block_size, file_index);

            let upload = self.timed_upload(&blob, block_size).await?;
            self.report(Operation::Upload, file_index, &block_label, upload);
            timings.upload_millis.push(millis(upload));

            if self.config.measure_download {
                let download = self.timed_download(&blob).await?;
                self.report(Operation::Download, file_index, &block_label, download);
                timings.download_millis.push(millis(download));
            }
        }
        Ok(timings)
    }

    async fn timed_upload(&self, blob: &str, block_size: u64) -> Result<Duration, TransferError> {
        let options = UploadOptions {
            block_size,
            concurrency: self.config.concurrency,
        };
        let call = self
            .transport
            .upload(self.container, blob, self.payload.clone(), options);
        self.deadline(Operation::Upload, blob, call).await
    }

    /// Includes draining the whole body, not just the response headers.
    async fn timed_download(&self, blob: &str) -> Result<Duration, TransferError> {
        let call = async {
            let mut body = self.transport.download(self.container, blob).await?;
            while let Some(chunk) = body.next().await {
                chunk?;
            }
            Ok::<(), TransportError>(())
        };
        self.deadline(Operation::Download, blob, call).await
    }

    /// Time `call` under a fresh per-operation deadline.
    async fn deadline<F>(&self, operation: Operation, blob: &str, call: F) -> Result<Duration, TransferError>
    where
        F: Future<Output = Result<(), TransportError>>,
    {
        let limit = self.config.operation_timeout;
        let started = Instant::now();
        match tokio::time::timeout(limit, call).await {
            Ok(Ok(())) => Ok(started.elapsed()),
            Ok(Err(source)) => Err(TransferError::Transport {
                operation,
                blob: blob.to_string(),
                source,
            }),
            Err(_) => Err(TransferError::Timeout {
                operation,
                blob: blob.to_string(),
                limit,
            }),
        }
    }

    fn report(&self, operation: Operation, file_index: u32, block_label: &str, elapsed: Duration) {
        info!(
            %operation,
            file = file_index,
            block_size = %block_label,
            file_size = %self.file_size_label,
            duration = ?elapsed,
            "Transfer complete"
        );
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
