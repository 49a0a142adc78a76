// src/services/order_tracker.rs
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, Sleep};
use tracing;

use crate::{
    errors::LiveError as AppError,
    models::{merge_sample, MergeOutcome, Order, OrderStatus, TrackingSample},
    services::tracking_source::TrackingSource,
};

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub poll_interval: Duration,
    pub start_delivery_delay: Duration,
    pub order_failure_threshold: u32, // consecutive failed order fetches before the error is persistent
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            start_delivery_delay: Duration::from_secs(30),
            order_failure_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerError {
    pub message: String,
    pub consecutive_failures: u32,
    pub transient: bool,  // next poll may recover
    pub persistent: bool, // show a status indicator to the user
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerSnapshot {
    pub order: Option<Order>,
    pub tracking: Option<TrackingSample>,
    pub error: Option<TrackerError>,
}

/// Side effects requested by the reconciler, executed by the polling task.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEffect {
    AssignCourier { order_id: String },
    ArmStartDelivery { assignment_id: String },
    CancelStartDelivery,
    Finish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeliveryTimer {
    Idle,
    Armed,
    Fired,
}

/// Pure reconciliation state for one tracked order.
#[derive(Debug)]
pub struct Reconciler {
    order: Option<Order>,
    tracking: Option<TrackingSample>,
    error: Option<TrackerError>,
    consecutive_failures: u32,
    failure_threshold: u32,
    assign_requested: bool,
    delivery_timer: DeliveryTimer,
}

impl Reconciler {
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            order: None,
            tracking: None,
            error: None,
            consecutive_failures: 0,
            failure_threshold,
            assign_requested: false,
            delivery_timer: DeliveryTimer::Idle,
        }
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            order: self.order.clone(),
            tracking: self.tracking.clone(),
            error: self.error.clone(),
        }
    }

    pub fn apply_order(&mut self, result: Result<Order, AppError>) -> Vec<TrackerEffect> {
        let incoming = match result {
            Ok(order) => order,
            Err(e) => {
                self.consecutive_failures += 1;
                let transient = e.is_transient();
                // Hard failures (4xx, unknown status) will not fix themselves
                let persistent = !transient || self.consecutive_failures >= self.failure_threshold;
                tracing::warn!(
                    "Order fetch failed ({} in a row, transient: {}): {}",
                    self.consecutive_failures,
                    transient,
                    e
                );
                self.error = Some(TrackerError {
                    message: e.to_string(),
                    consecutive_failures: self.consecutive_failures,
                    transient,
                    persistent,
                });
                return Vec::new();
            }
        };

        self.consecutive_failures = 0;
        self.error = None;

        let previous_status = self.order.as_ref().map(|o| o.status);
        if let Some(previous) = previous_status {
            if !previous.can_advance_to(incoming.status) {
                tracing::debug!(
                    "Ignoring status {} for order {} (currently {})",
                    incoming.status,
                    incoming.id,
                    previous
                );
                return Vec::new();
            }
        }

        let mut effects = Vec::new();
        let entered = previous_status != Some(incoming.status);

        if entered {
            self.assign_requested = false;
            if self.delivery_timer == DeliveryTimer::Armed {
                effects.push(TrackerEffect::CancelStartDelivery);
            }
            self.delivery_timer = DeliveryTimer::Idle;
        }

        match incoming.status {
            OrderStatus::InProgress => {
                if !incoming.has_courier() && !self.assign_requested {
                    self.assign_requested = true;
                    effects.push(TrackerEffect::AssignCourier {
                        order_id: incoming.id.clone(),
                    });
                }
            }
            OrderStatus::CourierAssigned => {
                if self.delivery_timer == DeliveryTimer::Idle {
                    if let Some(assignment) = &incoming.courier_assignment {
                        self.delivery_timer = DeliveryTimer::Armed;
                        effects.push(TrackerEffect::ArmStartDelivery {
                            assignment_id: assignment.id.clone(),
                        });
                    }
                }
            }
            status if status.is_terminal() => {
                effects.push(TrackerEffect::Finish);
            }
            _ => {}
        }

        self.order = Some(incoming);
        effects
    }

    pub fn apply_tracking(&mut self, result: Result<Option<TrackingSample>, AppError>) -> MergeOutcome {
        match result {
            Ok(sample) => merge_sample(&mut self.tracking, sample),
            Err(e) => {
                tracing::debug!("Tracking fetch failed, keeping previous sample: {}", e);
                MergeOutcome::Unchanged
            }
        }
    }

    pub fn mark_start_delivery_fired(&mut self) {
        self.delivery_timer = DeliveryTimer::Fired;
    }

    pub fn is_finished(&self) -> bool {
        self.order.as_ref().is_some_and(|o| o.status.is_terminal())
    }
}

struct PendingStart {
    sleep: Pin<Box<Sleep>>,
    assignment_id: String,
}

async fn wait_pending(pending: &mut Option<PendingStart>) -> String {
    match pending {
        Some(p) => {
            p.sleep.as_mut().await;
            p.assignment_id.clone()
        }
        None => std::future::pending().await,
    }
}

/// Polls one order at a time and fires its lifecycle side effects.
pub struct OrderStateTracker {
    source: Arc<dyn TrackingSource>,
    config: TrackerConfig,
    snapshot_tx: Arc<watch::Sender<TrackerSnapshot>>,
    task: Option<JoinHandle<()>>,
    order_id: Option<String>,
}

impl OrderStateTracker {
    pub fn new(source: Arc<dyn TrackingSource>, config: TrackerConfig) -> Self {
        let (snapshot_tx, _) = watch::channel(TrackerSnapshot::default());
        Self {
            source,
            config,
            snapshot_tx: Arc::new(snapshot_tx),
            task: None,
            order_id: None,
        }
    }

    pub fn start(&mut self, order_id: impl Into<String>) {
        self.stop();

        let order_id = order_id.into();
        tracing::info!("Starting tracking for order: {}", order_id);

        self.snapshot_tx.send_replace(TrackerSnapshot::default());
        let task = tokio::spawn(run_tracker(
            self.source.clone(),
            self.config.clone(),
            order_id.clone(),
            self.snapshot_tx.clone(),
        ));

        self.task = Some(task);
        self.order_id = Some(order_id);
    }

    /// Cancels polling and any pending start-delivery timer. Safe to call twice.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            if let Some(order_id) = &self.order_id {
                tracing::info!("Stopped tracking for order: {}", order_id);
            }
        }
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TrackerSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn order_id(&self) -> Option<&str> {
        self.order_id.as_deref()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for OrderStateTracker {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_tracker(
    source: Arc<dyn TrackingSource>,
    config: TrackerConfig,
    order_id: String,
    snapshot_tx: Arc<watch::Sender<TrackerSnapshot>>,
) {
    let mut reconciler = Reconciler::new(config.order_failure_threshold);
    let mut pending: Option<PendingStart> = None;

    // First tick completes immediately
    let mut interval = tokio::time::interval(config.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let (order_result, tracking_result) = tokio::join!(
                    source.fetch_order(&order_id),
                    source.fetch_tracking(&order_id),
                );

                reconciler.apply_tracking(tracking_result);
                let effects = reconciler.apply_order(order_result);
                snapshot_tx.send_replace(reconciler.snapshot());

                for effect in effects {
                    match effect {
                        TrackerEffect::AssignCourier { order_id } => {
                            if let Err(e) = source.assign_courier(&order_id).await {
                                tracing::warn!("Assign courier request failed for order {}: {}", order_id, e);
                            }
                        }
                        TrackerEffect::ArmStartDelivery { assignment_id } => {
                            tracing::debug!(
                                "Start delivery for assignment {} armed for {:?}",
                                assignment_id,
                                config.start_delivery_delay
                            );
                            pending = Some(PendingStart {
                                sleep: Box::pin(tokio::time::sleep(config.start_delivery_delay)),
                                assignment_id,
                            });
                        }
                        TrackerEffect::CancelStartDelivery => {
                            if pending.take().is_some() {
                                tracing::debug!("Pending start delivery cancelled for order {}", order_id);
                            }
                        }
                        TrackerEffect::Finish => {
                            tracing::info!("Order {} reached a terminal status, tracking finished", order_id);
                            return;
                        }
                    }
                }
            }
            assignment_id = wait_pending(&mut pending) => {
                pending = None;
                if let Err(e) = source.start_delivery(&assignment_id).await {
                    tracing::warn!("Start delivery request failed for assignment {}: {}", assignment_id, e);
                }
                reconciler.mark_start_delivery_fired();
                snapshot_tx.send_replace(reconciler.snapshot());
            }
        }
    }
}
