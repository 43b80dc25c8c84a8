//! External lookups used by the engine and playback.
//!
//! Both lookups are best-effort: a provider answers `None` when it has
//! nothing (no network, no data, not ready) and never fails the caller.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};

use crate::Point;

/// Resolves a human-readable place name for a coordinate.
pub trait ReverseGeocoder: Send + Sync {
    fn resolve(&self, point: Point) -> BoxFuture<'_, Option<String>>;
}

/// Wind at a point and time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wind {
    /// Speed in knots
    pub speed_knots: f64,
    /// Direction the wind blows from, degrees true
    pub direction_deg: f64,
}

/// Wind forecast or hindcast lookups.
pub trait WindProvider: Send + Sync {
    fn query(&self, point: Point, at: DateTime<Utc>) -> BoxFuture<'_, Option<Wind>>;
}

/// Geocoder that never finds a name; every waypoint gets a placeholder.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeocoder;

impl ReverseGeocoder for NoGeocoder {
    fn resolve(&self, _point: Point) -> BoxFuture<'_, Option<String>> {
        future::ready(None).boxed()
    }
}

/// Wind provider that is never ready.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWind;

impl WindProvider for NoWind {
    fn query(&self, _point: Point, _at: DateTime<Utc>) -> BoxFuture<'_, Option<Wind>> {
        future::ready(None).boxed()
    }
}

impl<T: ReverseGeocoder + ?Sized> ReverseGeocoder for Arc<T> {
    fn resolve(&self, point: Point) -> BoxFuture<'_, Option<String>> {
        (**self).resolve(point)
    }
}

impl<T: WindProvider + ?Sized> WindProvider for Arc<T> {
    fn query(&self, point: Point, at: DateTime<Utc>) -> BoxFuture<'_, Option<Wind>> {
        (**self).query(point, at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_providers_answer_none() {
        assert_eq!(NoGeocoder.resolve(Point::new(0.0, 0.0)).await, None);
        assert_eq!(NoWind.query(Point::new(0.0, 0.0), Utc::now()).await, None);
    }
}
