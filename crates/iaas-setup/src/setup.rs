//! Retryable resource setup
//!
//! Creates a resource and drives it to a usable state:
//!
//! ```text
//! create ──▶ copy wait ──▶ provision before up ──▶ up wait
//!              │
//!              └─ Failed ──▶ delete (retried) ──▶ next attempt
//! ```
//!
//! Only a copy that ends in `Failed` is retried, by deleting the resource and
//! creating it again. Every other failure is returned as is.

use crate::error::{IaasError, Result, SetupFailure};
use crate::options::SetupOptions;
use crate::poller::{PollReadFn, StatePoller};
use crate::state::{Availability, InstanceStatus, Resource, ResourceId};
use futures_util::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Creates the resource in the given zone
pub type CreateFn<S> = Arc<dyn Fn(String) -> BoxFuture<'static, Result<S>> + Send + Sync>;

/// Reads the current snapshot of a resource
pub type ReadFn<S> = Arc<dyn Fn(String, ResourceId) -> BoxFuture<'static, Result<S>> + Send + Sync>;

/// Deletes a resource whose copy failed
pub type DeleteFn = Arc<dyn Fn(String, ResourceId) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Configures a created resource before it is booted
pub type ProvisionBeforeUpFn<S> =
    Arc<dyn Fn(String, ResourceId, S) -> BoxFuture<'static, Result<()>> + Send + Sync>;

const COPY_WAIT_TARGET: [Availability; 2] = [Availability::Available, Availability::Failed];
const COPY_WAIT_PENDING: [Availability; 5] = [
    Availability::Unknown,
    Availability::Migrating,
    Availability::Uploading,
    Availability::Transferring,
    Availability::Discontinued,
];

// Failed is in neither up-wait set; a boot that fails surfaces as an
// unexpected state.
const UP_WAIT_TARGET: [Availability; 1] = [Availability::Available];
const UP_WAIT_PENDING: [Availability; 5] = COPY_WAIT_PENDING;
const UP_WAIT_STATUS_TARGET: [InstanceStatus; 1] = [InstanceStatus::Up];
const UP_WAIT_STATUS_PENDING: [InstanceStatus; 3] = [
    InstanceStatus::Unknown,
    InstanceStatus::Cleaning,
    InstanceStatus::Down,
];

/// Setup of a resource that may need copy / boot waits and re-creation
pub struct RetryableSetup<S> {
    create: Option<CreateFn<S>>,
    read: Option<ReadFn<S>>,
    delete: Option<DeleteFn>,
    provision_before_up: Option<ProvisionBeforeUpFn<S>>,
    wait_for_copy: bool,
    wait_for_up: bool,
    options: SetupOptions,
}

impl<S> Default for RetryableSetup<S> {
    fn default() -> Self {
        Self {
            create: None,
            read: None,
            delete: None,
            provision_before_up: None,
            wait_for_copy: false,
            wait_for_up: false,
            options: SetupOptions::default(),
        }
    }
}

impl<S> RetryableSetup<S>
where
    S: Resource + Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S>> + Send + 'static,
    {
        self.create = Some(Arc::new(move |zone| {
            Box::pin(f(zone)) as BoxFuture<'static, Result<S>>
        }));
        self
    }

    pub fn read<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String, ResourceId) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S>> + Send + 'static,
    {
        self.read = Some(Arc::new(move |zone, id| {
            Box::pin(f(zone, id)) as BoxFuture<'static, Result<S>>
        }));
        self
    }

    pub fn delete<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String, ResourceId) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.delete = Some(Arc::new(move |zone, id| {
            Box::pin(f(zone, id)) as BoxFuture<'static, Result<()>>
        }));
        self
    }

    pub fn provision_before_up<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String, ResourceId, S) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.provision_before_up = Some(Arc::new(move |zone, id, target| {
            Box::pin(f(zone, id, target)) as BoxFuture<'static, Result<()>>
        }));
        self
    }

    pub fn wait_for_copy(mut self, wait: bool) -> Self {
        self.wait_for_copy = wait;
        self
    }

    pub fn wait_for_up(mut self, wait: bool) -> Self {
        self.wait_for_up = wait;
        self
    }

    pub fn options(mut self, options: SetupOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the resource, deleting and re-creating it when its copy fails.
    ///
    /// On failure after a resource survived the copy wait, the error carries
    /// that resource.
    pub async fn setup(
        &self,
        cancel: &CancellationToken,
        zone: &str,
    ) -> std::result::Result<S, SetupFailure<S>> {
        self.validate()?;

        let max_attempts = self.options.max_attempts();
        let mut attempts_left = max_attempts;

        while attempts_left > 0 {
            attempts_left -= 1;
            let attempt = max_attempts - attempts_left;

            if cancel.is_cancelled() {
                return Err(IaasError::Cancelled.into());
            }

            tracing::info!(
                "Creating resource in zone {} (attempt {}/{})",
                zone,
                attempt,
                max_attempts
            );
            let target = self.create_resource(zone).await?;
            let id = target.id();
            tracing::debug!("Created resource {}", id);

            let created = if self.wait_for_copy {
                match self.wait_for_copy_with_cleanup(cancel, zone, id).await {
                    Ok(Some(state)) => state,
                    Ok(None) => continue,
                    Err(e) => return Err(SetupFailure::with_resource(e, target)),
                }
            } else {
                target
            };

            if let Err(e) = self.provision(cancel, zone, id, &created).await {
                return Err(SetupFailure::with_resource(e, created));
            }

            return match self.wait_until_up(cancel, zone, id).await {
                Ok(Some(up)) => Ok(up),
                Ok(None) => Ok(created),
                Err(e) => Err(SetupFailure::with_resource(e, created)),
            };
        }

        tracing::warn!(
            "Giving up after {} attempts: resource never became available",
            max_attempts
        );
        Err(IaasError::MaxRetryExceeded {
            attempts: max_attempts,
        }
        .into())
    }

    fn validate(&self) -> Result<()> {
        if self.create.is_none() {
            return Err(IaasError::InvalidConfig(
                "create func is required".to_string(),
            ));
        }
        if (self.wait_for_copy || self.wait_for_up) && self.read.is_none() {
            return Err(IaasError::InvalidConfig(
                "read func is required when waiting for copy or up".to_string(),
            ));
        }
        if self.wait_for_copy && self.delete.is_none() {
            return Err(IaasError::InvalidConfig(
                "delete func is required when waiting for copy".to_string(),
            ));
        }
        Ok(())
    }

    async fn create_resource(&self, zone: &str) -> Result<S> {
        let create = self
            .create
            .as_ref()
            .ok_or_else(|| IaasError::InvalidConfig("create func is required".to_string()))?;
        create(zone.to_string()).await
    }

    fn poll_read_fn(&self, zone: &str, id: ResourceId) -> Result<PollReadFn<S>> {
        let read = self
            .read
            .clone()
            .ok_or_else(|| IaasError::InvalidConfig("read func is required".to_string()))?;
        let zone = zone.to_string();
        let read_fn: PollReadFn<S> = Arc::new(move || read(zone.clone(), id));
        Ok(read_fn)
    }

    /// `Ok(None)` when the copy failed and the resource has been cleaned up
    async fn wait_for_copy_with_cleanup(
        &self,
        cancel: &CancellationToken,
        zone: &str,
        id: ResourceId,
    ) -> Result<Option<S>> {
        let poller = StatePoller::from_read_fn(self.poll_read_fn(zone, id)?)
            .target_availability(COPY_WAIT_TARGET)
            .pending_availability(COPY_WAIT_PENDING)
            .interval(self.options.polling_interval)
            .timeout(Some(self.options.poll_timeout));

        let state = poller
            .wait_for_state_async(cancel.clone())
            .wait_with_progress(|state| {
                tracing::debug!(
                    "Waiting for copy of resource {}: {:?}",
                    id,
                    state.availability()
                );
            })
            .await?;

        if state.availability().is_some_and(|a| a.is_failed()) {
            tracing::warn!("Copy of resource {} failed, deleting it", id);
            self.delete_with_retry(cancel, zone, id).await?;
            return Ok(None);
        }

        Ok(Some(state))
    }

    async fn delete_with_retry(
        &self,
        cancel: &CancellationToken,
        zone: &str,
        id: ResourceId,
    ) -> Result<()> {
        let delete = self
            .delete
            .as_ref()
            .ok_or_else(|| IaasError::InvalidConfig("delete func is required".to_string()))?;
        let attempts = self.options.delete_retry_count.max(1);

        // Deleting right after the Failed transition can be rejected while the
        // copy is still winding down on the platform.
        for attempt in 1..=attempts {
            sleep_or_cancel(cancel, self.options.delete_retry_interval).await?;
            match delete(zone.to_string(), id).await {
                Ok(()) => {
                    tracing::info!("Deleted failed resource {}", id);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to delete resource {} (attempt {}/{}): {}",
                        id,
                        attempt,
                        attempts,
                        e
                    );
                }
            }
        }

        tracing::warn!("Resource {} could not be deleted, continuing", id);
        Ok(())
    }

    async fn provision(
        &self,
        cancel: &CancellationToken,
        zone: &str,
        id: ResourceId,
        created: &S,
    ) -> Result<()> {
        let Some(hook) = &self.provision_before_up else {
            return Ok(());
        };
        let attempts = self.options.provisioning_retry_count.max(1);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match hook(zone.to_string(), id, created.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= attempts => {
                    tracing::warn!(
                        "Provisioning resource {} failed after {} attempts: {}",
                        id,
                        attempts,
                        e
                    );
                    return Err(e);
                }
                Err(e) => {
                    tracing::debug!(
                        "Provisioning resource {} failed (attempt {}/{}): {}",
                        id,
                        attempt,
                        attempts,
                        e
                    );
                    sleep_or_cancel(cancel, self.options.provisioning_retry_interval).await?;
                }
            }
        }
    }

    async fn wait_until_up(
        &self,
        cancel: &CancellationToken,
        zone: &str,
        id: ResourceId,
    ) -> Result<Option<S>> {
        if !self.wait_for_up {
            return Ok(None);
        }

        tracing::debug!("Waiting for resource {} to boot", id);
        let poller = StatePoller::from_read_fn(self.poll_read_fn(zone, id)?)
            .target_availability(UP_WAIT_TARGET)
            .pending_availability(UP_WAIT_PENDING)
            .target_instance_status(UP_WAIT_STATUS_TARGET)
            .pending_instance_status(UP_WAIT_STATUS_PENDING)
            .interval(self.options.polling_interval)
            .timeout(Some(self.options.poll_timeout));

        poller.wait_for_state(cancel).await.map(Some)
    }
}

async fn sleep_or_cancel(cancel: &CancellationToken, duration: Duration) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(IaasError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
