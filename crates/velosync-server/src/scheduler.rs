//! Background sync scheduling.
//!
//! Registers the recurring catalog sync job at server startup. The cron
//! expression comes from `VELOSYNC_SYNC_CRON` (default: every five minutes).

use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use velosync_sync::{SyncOrchestrator, SyncOutcome};

/// Builds and starts the background scheduler with the catalog sync job
/// registered.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive for
/// the lifetime of the process. Dropping it shuts down all scheduled jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised or
/// started, or if the cron expression is invalid.
pub async fn build_scheduler(
    cron: &str,
    orchestrator: Arc<SyncOrchestrator>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    register_sync_job(&scheduler, cron, orchestrator).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_sync_job(
    scheduler: &JobScheduler,
    cron: &str,
    orchestrator: Arc<SyncOrchestrator>,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(cron, move |_uuid, _lock| {
        let orchestrator = Arc::clone(&orchestrator);

        Box::pin(async move {
            tracing::info!("scheduler: starting catalog sync run");
            run_sync_job(&orchestrator).await;
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron = %cron, "scheduler: registered catalog sync job");
    Ok(())
}

/// Drive one guarded sync pass. Failures are logged rather than propagated so
/// a bad run never takes the scheduler down; the next tick retries.
async fn run_sync_job(orchestrator: &SyncOrchestrator) {
    match orchestrator.perform_sync().await {
        Ok(SyncOutcome::Completed {
            products,
            variations,
        }) => {
            tracing::info!(products, variations, "scheduler: catalog sync committed");
        }
        Ok(SyncOutcome::AlreadyRunning) => {
            tracing::info!("scheduler: previous sync still running; skipping this tick");
        }
        Ok(SyncOutcome::Skipped(reason)) => {
            tracing::info!(%reason, "scheduler: catalog sync skipped");
        }
        Ok(SyncOutcome::Failed { error }) => {
            tracing::warn!(error = %error, "scheduler: catalog sync failed; serving cached data");
        }
        Err(e) => {
            tracing::error!(error = %e, "scheduler: catalog sync aborted");
        }
    }
}
