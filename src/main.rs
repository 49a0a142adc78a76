use std::sync::Arc;
use sparrow_live::{
    errors::LiveError,
    services::api_client::StaticCredentials,
    state::{AppConfig, SessionState},
    utils::telemetry::setup_tracing,
};

#[tokio::main]
async fn main() -> Result<(), LiveError> {
    setup_tracing();

    let order_id = std::env::args()
        .nth(1)
        .ok_or_else(|| LiveError::bad_request("usage: sparrow-live <order_id>"))?;

    let config = AppConfig::from_env()?;
    let credentials = match std::env::var("SPARROW_TOKEN") {
        Ok(token) if !token.trim().is_empty() => StaticCredentials::new(token),
        _ => return Err(LiveError::MissingCredential),
    };

    let mut session = SessionState::new(config, Arc::new(credentials), None)?;
    session.start()?;

    let tracker = session.track_order(order_id.clone());
    let mut snapshots = tracker.subscribe();

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();

                if let Some(order) = &snapshot.order {
                    tracing::info!("Order {} status: {}", order.id, order.status);
                }
                if let Some(tracking) = &snapshot.tracking {
                    tracing::info!(
                        "Courier at ({:.5}, {:.5}), {} min / {:.2} km away",
                        tracking.latitude,
                        tracking.longitude,
                        tracking.estimated_minutes,
                        tracking.distance_remaining_km
                    );
                }
                if let Some(error) = snapshot.error.as_ref().filter(|e| e.persistent) {
                    tracing::warn!("Tracking degraded: {}", error.message);
                }

                if snapshot.order.as_ref().is_some_and(|o| o.status.is_terminal()) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping tracking for order {}", order_id);
                break;
            }
        }
    }

    let unread = session.store.lock().await.unread_count();
    tracing::info!("Unread notifications at exit: {}", unread);
    match session.push.current().await {
        Some(subscription) => tracing::info!("Push subscription held for {}", subscription.endpoint),
        None => tracing::debug!("No push subscription this session"),
    }

    drop(tracker);
    session.logout().await;
    Ok(())
}
