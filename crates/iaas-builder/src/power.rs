//! Power helpers: issue a boot / shutdown and wait for the instance status

use crate::api::Bootable;
use iaas_setup::{
    CancellationToken, InstanceStatus, Resource, ResourceId, Result, SetupOptions, StatePoller,
};
use std::sync::Arc;

/// Boot the resource and wait until it is up.
///
/// A resource that is already up is returned without a boot request.
pub async fn boot_and_wait<C>(
    client: Arc<C>,
    zone: &str,
    id: ResourceId,
    options: &SetupOptions,
    cancel: &CancellationToken,
) -> Result<C::Target>
where
    C: Bootable + ?Sized,
{
    let current = client.read(zone, id).await?;
    if current.instance_status().is_some_and(|s| s.is_up()) {
        tracing::debug!("Resource {} is already up", id);
        return Ok(current);
    }

    tracing::info!("Booting resource {}", id);
    client.boot(zone, id).await?;

    wait_for_status(
        client,
        zone,
        id,
        options,
        cancel,
        InstanceStatus::Up,
        [
            InstanceStatus::Unknown,
            InstanceStatus::Cleaning,
            InstanceStatus::Down,
        ],
    )
    .await
}

/// Shut the resource down and wait until it is down
pub async fn shutdown_and_wait<C>(
    client: Arc<C>,
    zone: &str,
    id: ResourceId,
    force: bool,
    options: &SetupOptions,
    cancel: &CancellationToken,
) -> Result<C::Target>
where
    C: Bootable + ?Sized,
{
    let current = client.read(zone, id).await?;
    if current.instance_status().is_some_and(|s| s.is_down()) {
        tracing::debug!("Resource {} is already down", id);
        return Ok(current);
    }

    tracing::info!("Shutting down resource {} (force: {})", id, force);
    client.shutdown(zone, id, force).await?;

    wait_for_status(
        client,
        zone,
        id,
        options,
        cancel,
        InstanceStatus::Down,
        [
            InstanceStatus::Unknown,
            InstanceStatus::Cleaning,
            InstanceStatus::Up,
        ],
    )
    .await
}

async fn wait_for_status<C>(
    client: Arc<C>,
    zone: &str,
    id: ResourceId,
    options: &SetupOptions,
    cancel: &CancellationToken,
    target: InstanceStatus,
    pending: [InstanceStatus; 3],
) -> Result<C::Target>
where
    C: Bootable + ?Sized,
{
    let zone = zone.to_string();
    let poller = StatePoller::new(move || {
        let client = client.clone();
        let zone = zone.clone();
        async move { client.read(&zone, id).await }
    })
    .target_instance_status([target])
    .pending_instance_status(pending)
    .interval(options.polling_interval)
    .timeout(Some(options.poll_timeout));

    poller.wait_for_state(cancel).await
}
