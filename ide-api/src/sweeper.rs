use ide_orchestrator::SubscriptionService;
use tokio::time::{interval, Duration};
use tracing::{error, info};

/// Periodically return lapsed VIP subscriptions to normal status.
pub async fn start_subscription_sweeper(subscriptions: SubscriptionService, interval_secs: u64) {
    let mut interval = interval(Duration::from_secs(interval_secs.max(1)));

    info!(
        "Subscription sweeper running (checks every {} seconds)",
        interval_secs
    );

    loop {
        interval.tick().await;
        sweep_once(&subscriptions).await;
    }
}

/// One sweep pass. Failures are logged; the next tick tries again.
pub async fn sweep_once(subscriptions: &SubscriptionService) -> u64 {
    match subscriptions.expire_subscriptions().await {
        Ok(0) => 0,
        Ok(expired) => {
            info!(expired, "Expired VIP subscriptions");
            expired
        }
        Err(e) => {
            error!("Subscription sweep failed: {}", e);
            0
        }
    }
}
