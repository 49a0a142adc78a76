// src/models/tracking.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::order::GeoPoint;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TrackingSample {
    pub latitude: f64,
    pub longitude: f64,
    pub estimated_minutes: u32,
    pub distance_remaining_km: f64,
    pub captured_at: DateTime<Utc>,
}

impl TrackingSample {
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Result of offering a sample to the held one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Accepted,
    StaleDropped,
    Unchanged, // nothing offered
}

/// Monotonic merge: `incoming` replaces `held` only when it is not older.
pub fn merge_sample(held: &mut Option<TrackingSample>, incoming: Option<TrackingSample>) -> MergeOutcome {
    let Some(incoming) = incoming else {
        return MergeOutcome::Unchanged;
    };

    if let Some(current) = held.as_ref() {
        if incoming.captured_at < current.captured_at {
            tracing::debug!(
                "Dropping stale tracking sample captured at {} (holding {})",
                incoming.captured_at,
                current.captured_at
            );
            return MergeOutcome::StaleDropped;
        }
    }

    *held = Some(incoming);
    MergeOutcome::Accepted
}
