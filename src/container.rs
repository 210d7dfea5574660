//! Lifecycle of the run's transient container.

use tracing::{info, warn};

use crate::error::{ProvisioningAction, SweepError};
use crate::transport::BlobTransport;

/// A container created for one run. Call [`release`](Self::release) when
/// the sweep is over; dropping it unreleased leaves the container behind.
#[derive(Debug)]
pub struct ProvisionedContainer {
    name: String,
    released: bool,
}

impl ProvisionedContainer {
    pub async fn create<T>(transport: &T, name: &str) -> Result<Self, SweepError>
    where
        T: BlobTransport + ?Sized,
    {
        transport
            .create_container(name)
            .await
            .map_err(|source| SweepError::Provisioning {
                action: ProvisioningAction::Create,
                container: name.to_string(),
                source,
            })?;
        info!(container = %name, "Container created");
        Ok(Self {
            name: name.to_string(),
            released: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Delete the container along with every blob the run wrote.
    pub async fn release<T>(mut self, transport: &T) -> Result<(), SweepError>
    where
        T: BlobTransport + ?Sized,
    {
        self.released = true;
        match transport.delete_container(&self.name).await {
            Ok(()) => {
                info!(container = %self.name, "Container deleted");
                Ok(())
            }
            Err(source) => {
                warn!(container = %self.name, error = %source, "Failed to delete container");
                Err(SweepError::Provisioning {
                    action: ProvisioningAction::Delete,
                    container: self.name.clone(),
                    source,
                })
            }
        }
    }
}

impl Drop for ProvisionedContainer {
    fn drop(&mut self) {
        if !self.released {
            warn!(container = %self.name, "Container was not released and may need manual cleanup");
        }
    }
}
