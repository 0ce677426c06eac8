//! Waiting for imported disks

use crate::context::BuildContext;
use crate::error::{BuildError, Result};
use crate::state::{BuildState, TrackedImport};
use crate::step::Step;
use async_trait::async_trait;
use tokio::time::Instant;
use vmflow_api::ApiError;

/// Blocks until every tracked import disk leaves the `importing` status,
/// then resizes disks whose imported size differs from the requested one
#[derive(Debug, Default)]
pub struct DiskImportWaiter;

impl DiskImportWaiter {
    pub const NAME: &'static str = "wait-disk-import";
}

#[async_trait]
impl Step for DiskImportWaiter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, ctx: &BuildContext, state: &mut BuildState) -> Result<()> {
        if state.imports.is_empty() {
            tracing::debug!("No import disks to wait for");
            return Ok(());
        }

        let pending: Vec<TrackedImport> = state.imports.iter().cloned().collect();
        tracing::info!("Waiting for {} disk import(s)", pending.len());
        ctx.sleep(ctx.settings.import_settle_delay, Self::NAME).await?;

        // One disk at a time, in creation order
        for tracked in &pending {
            wait_for_import(ctx, state, tracked).await?;
        }
        for tracked in &pending {
            reconcile_size(ctx, state, tracked).await?;
        }

        state.imports.take();
        Ok(())
    }
}

async fn wait_for_import(ctx: &BuildContext, state: &mut BuildState, tracked: &TrackedImport) -> Result<()> {
    let settings = &ctx.settings;
    let started = Instant::now();
    let mut last_status = String::from("unknown");

    for attempt in 1..=settings.import_max_retries {
        match ctx.gateway.disk_import_status(&tracked.disk_key).await {
            Ok(status) if !status.is_importing() => {
                if status.looks_failed() {
                    state.warn(format!(
                        "disk {} finished importing with status '{}'",
                        tracked.spec.name, status
                    ));
                } else {
                    tracing::info!(
                        disk_key = %tracked.disk_key,
                        attempt,
                        "Disk {} imported ({})",
                        tracked.spec.name,
                        status
                    );
                }
                return Ok(());
            }
            Ok(status) => {
                tracing::debug!(disk_key = %tracked.disk_key, attempt, "Disk still {}", status);
                last_status = status.to_string();
            }
            Err(e) => {
                // Polling: a failed read is retried on the next tick
                tracing::debug!(disk_key = %tracked.disk_key, attempt, "Import status read failed: {}", e);
                last_status = format!("error: {}", e);
            }
        }

        if attempt < settings.import_max_retries {
            ctx.sleep(settings.import_poll_interval, DiskImportWaiter::NAME)
                .await?;
        }
    }

    Err(BuildError::DiskImportTimeout {
        disk_key: tracked.disk_key.to_string(),
        last_status,
        waited: started.elapsed(),
    })
}

/// Imports produce a disk sized like the source image; grow or shrink it
/// to the requested size
async fn reconcile_size(ctx: &BuildContext, state: &mut BuildState, tracked: &TrackedImport) -> Result<()> {
    let Some(requested) = tracked.spec.size_gb else {
        return Ok(());
    };
    let resize_failed = |cause: ApiError| BuildError::DiskResizeFailed {
        disk_name: tracked.spec.name.clone(),
        cause,
    };

    let info = ctx
        .gateway
        .read_disk(&tracked.disk_key)
        .await
        .map_err(resize_failed)?;
    let actual = info.size_gb();
    if actual == requested {
        tracing::debug!(disk_key = %tracked.disk_key, "Disk {} already {}GB", tracked.spec.name, actual);
        return Ok(());
    }

    tracing::info!(
        disk_key = %tracked.disk_key,
        "Resizing disk {} from {}GB to {}GB",
        tracked.spec.name,
        actual,
        requested
    );
    ctx.gateway
        .resize_disk(&tracked.disk_key, requested)
        .await
        .map_err(resize_failed)?;

    let info = ctx
        .gateway
        .read_disk(&tracked.disk_key)
        .await
        .map_err(resize_failed)?;
    if info.size_gb() != requested {
        state.warn(format!(
            "disk {} reports {}GB after resize to {}GB",
            tracked.spec.name,
            info.size_gb(),
            requested
        ));
    }
    Ok(())
}
