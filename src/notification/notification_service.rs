use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use super::notification_store::NotificationStore;

/// Periodically reconciles the store and badge with the server, for events
/// the push channel may have missed.
pub async fn start_notification_sync(
    store: Arc<NotificationStore>,
    schedule: &str,
) -> Result<JobScheduler, Box<dyn std::error::Error + Send + Sync>> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async(schedule, move |_uuid, _l| {
        let store = store.clone();

        Box::pin(async move {
            if let Err(e) = sync_notifications(&store).await {
                error!("Error syncing notifications: {}", e);
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    info!("Notification sync scheduled ({})", schedule);
    Ok(scheduler)
}

async fn sync_notifications(store: &NotificationStore) -> crate::error::Result<()> {
    store.fetch().await?;
    let unread = store.refresh_unread_count().await?;
    tracing::debug!("Periodic sync done, {} unread", unread);
    Ok(())
}
