// src/models/order.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{LiveError, LiveResult};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,         // Order placed, waiting for the store
    Confirmed,       // Store accepted the order
    InProgress,      // Being prepared
    CourierAssigned, // Courier attached, not yet en route
    OnTheWay,        // Courier is heading to the customer
    Delivered,       // Handed over to the customer
    Completed,       // Closed out after delivery
    Cancelled,       // Cancelled before completion
}

impl OrderStatus {
    /// Canonical wire value.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::CourierAssigned => "courier_assigned",
            OrderStatus::OnTheWay => "on_the_way",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Normalizes a raw backend status into the closed enum.
    ///
    /// Matching is case-insensitive and treats `-` and spaces like `_`, so
    /// `On-The-Way`, `on the way` and `on_the_way` are the same value. Legacy
    /// spellings still emitted by older backends are accepted as aliases.
    pub fn from_wire(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .trim()
            .chars()
            .map(|c| match c {
                '-' | ' ' => '_',
                c => c.to_ascii_lowercase(),
            })
            .collect();

        let status = match normalized.as_str() {
            "pending" => OrderStatus::Pending,
            "confirmed" | "accepted" => OrderStatus::Confirmed,
            "in_progress" | "preparing" | "processing" => OrderStatus::InProgress,
            "courier_assigned" | "assigned" | "driver_assigned" => OrderStatus::CourierAssigned,
            "on_the_way" | "in_way" | "out_for_delivery" | "in_transit" | "shipped" => {
                OrderStatus::OnTheWay
            }
            "delivered" => OrderStatus::Delivered,
            "completed" | "done" | "finished" => OrderStatus::Completed,
            "cancelled" | "canceled" => OrderStatus::Cancelled,
            _ => return None,
        };
        Some(status)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Completed | OrderStatus::Cancelled
        )
    }

    /// Position along the happy path. `Cancelled` sits outside it.
    fn rank(&self) -> Option<u8> {
        match self {
            OrderStatus::Pending => Some(0),
            OrderStatus::Confirmed => Some(1),
            OrderStatus::InProgress => Some(2),
            OrderStatus::CourierAssigned => Some(3),
            OrderStatus::OnTheWay => Some(4),
            OrderStatus::Delivered => Some(5),
            OrderStatus::Completed => Some(6),
            OrderStatus::Cancelled => None,
        }
    }

    /// Whether a freshly fetched `next` status may replace `self`.
    ///
    /// A repeated status is a refresh and always allowed. Nothing leaves a
    /// terminal status, and nothing moves backwards along the happy path.
    pub fn can_advance_to(&self, next: OrderStatus) -> bool {
        if *self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), next.rank()) {
            (_, None) => true,
            (Some(current), Some(next)) => next > current,
            (None, Some(_)) => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CourierAssignment {
    pub id: String,
    pub courier_id: String,
    pub courier_name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Order {
    pub id: String,
    pub status: OrderStatus,
    pub courier_assignment: Option<CourierAssignment>,
    pub customer_location: GeoPoint,
    pub created_at: DateTime<Utc>,
}

/// Order as the backend sends it, before status normalization.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OrderDto {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub courier_assignment: Option<CourierAssignment>,
    pub customer_location: GeoPoint,
    pub created_at: DateTime<Utc>,
}

impl OrderDto {
    pub fn into_order(self) -> LiveResult<Order> {
        let status = OrderStatus::from_wire(&self.status)
            .ok_or_else(|| LiveError::UnknownOrderStatus(self.status.clone()))?;

        Ok(Order {
            id: self.id,
            status,
            courier_assignment: self.courier_assignment,
            customer_location: self.customer_location,
            created_at: self.created_at,
        })
    }
}

impl Order {
    pub fn has_courier(&self) -> bool {
        self.courier_assignment.is_some()
    }
}
