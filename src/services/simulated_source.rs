// src/services/simulated_source.rs
//
// Local stand-in for the tracking backend, used for demos and tests. Only
// reachable when the `simulate_tracking` debug flag is set.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing;
use uuid::Uuid;

use crate::{
    errors::LiveError as AppError,
    models::{CourierAssignment, GeoPoint, Order, OrderStatus, TrackingSample},
    services::tracking_source::TrackingSource,
};

pub const COURIER_ASSIGNED_AFTER: Duration = Duration::from_secs(3);
pub const ON_THE_WAY_AFTER: Duration = Duration::from_secs(30);

const STEP_FRACTION: f64 = 0.05; // share of the remaining vector covered per poll
const STEP_DISTANCE_KM: f64 = 0.5;
const SEED_OFFSET: (f64, f64) = (-0.004789, -0.003234);
const SEED_ESTIMATED_MINUTES: u32 = 12;
const SEED_DISTANCE_KM: f64 = 5.0;

pub const SIMULATED_COURIER_ID: &str = "sim-courier";
pub const SIMULATED_COURIER_NAME: &str = "Test Courier";

pub struct SimulatedTrackingSource {
    customer: GeoPoint,
    started_at: DateTime<Utc>,
    activated_at: Instant,
    last_sample: Mutex<Option<TrackingSample>>,
}

impl SimulatedTrackingSource {
    /// Activation time is now; the phase schedule counts from here.
    pub fn new(customer: GeoPoint) -> Self {
        Self::starting_at(customer, Utc::now())
    }

    pub fn starting_at(customer: GeoPoint, started_at: DateTime<Utc>) -> Self {
        Self {
            customer,
            started_at,
            activated_at: Instant::now(),
            last_sample: Mutex::new(None),
        }
    }

    fn elapsed(&self) -> Duration {
        Instant::now().saturating_duration_since(self.activated_at)
    }

    fn previous_sample(&self) -> Option<TrackingSample> {
        match self.last_sample.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Deterministic assignment for a simulated order.
pub fn simulated_assignment(order_id: &str) -> CourierAssignment {
    let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("sparrow-sim:{}", order_id).as_bytes());
    CourierAssignment {
        id: id.to_string(),
        courier_id: SIMULATED_COURIER_ID.to_string(),
        courier_name: SIMULATED_COURIER_NAME.to_string(),
    }
}

pub fn simulate_order(
    order_id: &str,
    customer: GeoPoint,
    started_at: DateTime<Utc>,
    elapsed: Duration,
    previous: Option<&TrackingSample>,
) -> Order {
    let (status, courier_assignment) = if elapsed < COURIER_ASSIGNED_AFTER {
        (OrderStatus::InProgress, None)
    } else if elapsed < ON_THE_WAY_AFTER {
        (OrderStatus::CourierAssigned, Some(simulated_assignment(order_id)))
    } else {
        let arrived = previous.is_some_and(|s| s.distance_remaining_km <= 0.0);
        let status = if arrived { OrderStatus::Delivered } else { OrderStatus::OnTheWay };
        (status, Some(simulated_assignment(order_id)))
    };

    Order {
        id: order_id.to_string(),
        status,
        courier_assignment,
        customer_location: customer,
        created_at: started_at,
    }
}

pub fn simulate_sample(
    customer: GeoPoint,
    started_at: DateTime<Utc>,
    elapsed: Duration,
    previous: Option<&TrackingSample>,
) -> Option<TrackingSample> {
    if elapsed < ON_THE_WAY_AFTER {
        return None;
    }

    let captured_at = started_at
        + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero());

    Some(match previous {
        Some(previous) => step(previous, customer, captured_at),
        None => seed(customer, captured_at),
    })
}

/// Courier's starting point once the order goes out for delivery.
pub fn seed(customer: GeoPoint, captured_at: DateTime<Utc>) -> TrackingSample {
    TrackingSample {
        latitude: customer.lat + SEED_OFFSET.0,
        longitude: customer.lng + SEED_OFFSET.1,
        estimated_minutes: SEED_ESTIMATED_MINUTES,
        distance_remaining_km: SEED_DISTANCE_KM,
        captured_at,
    }
}

/// Moves the courier 5% of the way toward the customer.
pub fn step(previous: &TrackingSample, customer: GeoPoint, captured_at: DateTime<Utc>) -> TrackingSample {
    TrackingSample {
        latitude: previous.latitude + STEP_FRACTION * (customer.lat - previous.latitude),
        longitude: previous.longitude + STEP_FRACTION * (customer.lng - previous.longitude),
        estimated_minutes: previous.estimated_minutes.saturating_sub(1).max(1),
        distance_remaining_km: (previous.distance_remaining_km - STEP_DISTANCE_KM).max(0.0),
        captured_at,
    }
}

#[async_trait]
impl TrackingSource for SimulatedTrackingSource {
    async fn fetch_order(&self, order_id: &str) -> Result<Order, AppError> {
        let previous = self.previous_sample();
        Ok(simulate_order(
            order_id,
            self.customer,
            self.started_at,
            self.elapsed(),
            previous.as_ref(),
        ))
    }

    async fn fetch_tracking(&self, _order_id: &str) -> Result<Option<TrackingSample>, AppError> {
        let mut guard = match self.last_sample.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let sample = simulate_sample(self.customer, self.started_at, self.elapsed(), guard.as_ref());
        if let Some(sample) = &sample {
            *guard = Some(sample.clone());
        }
        Ok(sample)
    }

    async fn assign_courier(&self, order_id: &str) -> Result<(), AppError> {
        tracing::info!("[SIMULATED] Would assign courier to order {}", order_id);
        Ok(())
    }

    async fn start_delivery(&self, assignment_id: &str) -> Result<(), AppError> {
        tracing::info!("[SIMULATED] Would start delivery for assignment {}", assignment_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn customer() -> GeoPoint {
        GeoPoint::new(30.049789, 31.233234)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 28, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_single_step_scenario() {
        let previous = TrackingSample {
            latitude: 30.045,
            longitude: 31.230,
            estimated_minutes: 12,
            distance_remaining_km: 5.0,
            captured_at: t0(),
        };

        let next = step(&previous, customer(), t0() + chrono::Duration::seconds(5));

        let expected_lat = 30.045 + 0.05 * (30.049789 - 30.045);
        let expected_lng = 31.230 + 0.05 * (31.233234 - 31.230);
        assert!((next.latitude - expected_lat).abs() < 1e-12);
        assert!((next.longitude - expected_lng).abs() < 1e-12);
        assert_eq!(next.estimated_minutes, 11);
        assert!((next.distance_remaining_km - 4.5).abs() < 1e-12);
    }

    #[test]
    fn test_step_floors() {
        let previous = TrackingSample {
            latitude: 30.0,
            longitude: 31.0,
            estimated_minutes: 1,
            distance_remaining_km: 0.2,
            captured_at: t0(),
        };
        let next = step(&previous, customer(), t0());
        assert_eq!(next.estimated_minutes, 1);
        assert_eq!(next.distance_remaining_km, 0.0);

        let previous = TrackingSample { estimated_minutes: 0, ..previous };
        assert_eq!(step(&previous, customer(), t0()).estimated_minutes, 1);
    }

    #[test]
    fn test_phase_schedule() {
        let order = simulate_order("ord-1", customer(), t0(), Duration::from_secs(0), None);
        assert_eq!(order.status, OrderStatus::InProgress);
        assert!(order.courier_assignment.is_none());

        let order = simulate_order("ord-1", customer(), t0(), Duration::from_secs(3), None);
        assert_eq!(order.status, OrderStatus::CourierAssigned);
        assert_eq!(order.courier_assignment, Some(simulated_assignment("ord-1")));

        let order = simulate_order("ord-1", customer(), t0(), Duration::from_millis(29_999), None);
        assert_eq!(order.status, OrderStatus::CourierAssigned);

        let order = simulate_order("ord-1", customer(), t0(), Duration::from_secs(30), None);
        assert_eq!(order.status, OrderStatus::OnTheWay);
    }

    #[test]
    fn test_no_sample_before_on_the_way() {
        assert!(simulate_sample(customer(), t0(), Duration::from_secs(10), None).is_none());

        let seeded = simulate_sample(customer(), t0(), Duration::from_secs(30), None).unwrap();
        assert_eq!(seeded.estimated_minutes, 12);
        assert_eq!(seeded.distance_remaining_km, 5.0);
        assert!((seeded.latitude - 30.045).abs() < 1e-9);
        assert!((seeded.longitude - 31.230).abs() < 1e-9);
        assert_eq!(seeded.captured_at, t0() + chrono::Duration::seconds(30));
    }

    #[test]
    fn test_output_is_deterministic() {
        let previous = seed(customer(), t0());
        let elapsed = Duration::from_secs(45);

        let a = simulate_sample(customer(), t0(), elapsed, Some(&previous));
        let b = simulate_sample(customer(), t0(), elapsed, Some(&previous));
        assert_eq!(a, b);

        let a = simulate_order("ord-7", customer(), t0(), elapsed, Some(&previous));
        let b = simulate_order("ord-7", customer(), t0(), elapsed, Some(&previous));
        assert_eq!(a, b);
    }

    #[test]
    fn test_arrival_reports_delivered() {
        let mut sample = seed(customer(), t0());
        for _ in 0..10 {
            sample = step(&sample, customer(), t0());
        }
        assert_eq!(sample.distance_remaining_km, 0.0);

        let order = simulate_order("ord-1", customer(), t0(), Duration::from_secs(90), Some(&sample));
        assert_eq!(order.status, OrderStatus::Delivered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_follows_elapsed_time() {
        let source = SimulatedTrackingSource::starting_at(customer(), t0());

        let order = source.fetch_order("ord-1").await.unwrap();
        assert_eq!(order.status, OrderStatus::InProgress);
        assert!(source.fetch_tracking("ord-1").await.unwrap().is_none());

        tokio::time::advance(Duration::from_secs(30)).await;
        let order = source.fetch_order("ord-1").await.unwrap();
        assert_eq!(order.status, OrderStatus::OnTheWay);
        let first = source.fetch_tracking("ord-1").await.unwrap().unwrap();
        assert_eq!(first.distance_remaining_km, 5.0);

        tokio::time::advance(Duration::from_secs(5)).await;
        let second = source.fetch_tracking("ord-1").await.unwrap().unwrap();
        assert_eq!(second.distance_remaining_km, 4.5);
        assert_eq!(second.estimated_minutes, 11);
        assert!(second.captured_at > first.captured_at);
    }
}
