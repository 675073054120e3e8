//! Background job scheduler.
//!
//! Registers housekeeping jobs at server startup.

use std::sync::Arc;

use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

const DEFAULT_OTP_PURGE_CRON: &str = "0 */15 * * * *";

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive for
/// the lifetime of the process. Dropping it shuts down all scheduled jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised, a
/// job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(pool: PgPool) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    register_otp_purge_job(&scheduler, pool).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

/// Deletes consumed and expired one-time codes every 15 minutes by default.
///
/// Override with `BAZAAR_OTP_PURGE_CRON`.
async fn register_otp_purge_job(
    scheduler: &JobScheduler,
    pool: PgPool,
) -> Result<(), JobSchedulerError> {
    let cron = std::env::var("BAZAAR_OTP_PURGE_CRON")
        .unwrap_or_else(|_| DEFAULT_OTP_PURGE_CRON.to_string());
    let pool = Arc::new(pool);

    let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
        let pool = Arc::clone(&pool);

        Box::pin(async move {
            match bazaar_db::purge_stale_otps(&pool).await {
                Ok(0) => tracing::debug!("scheduler: no stale otp rows"),
                Ok(purged) => tracing::info!(purged, "scheduler: purged stale otp rows"),
                Err(e) => tracing::error!(error = %e, "scheduler: otp purge failed"),
            }
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron = %cron, "scheduler: registered otp purge job");
    Ok(())
}
