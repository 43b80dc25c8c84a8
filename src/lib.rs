//! # Voyage Planner
//!
//! Turns freehand-drawn sea legs into a time-annotated itinerary and a
//! scrubbable playback of position and wind along it.
//!
//! This library provides:
//! - A drawing state machine that commits contiguous legs onto a draw surface
//! - Segment derivation: distance, speed, dwell, chained ETAs and waypoint names
//! - A timeline that maps clock time to a position along the route
//! - Label projection for map overlays and a saved-route bundle
//!
//! ## Features
//!
//! - **`http`** - Nominatim reverse geocoding and Open-Meteo wind providers
//! - **`persistence`** - SQLite store for saved routes
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use voyage_planner::{Point, Segment, Timeline};
//! use chrono::{TimeZone, Utc};
//!
//! let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let mut leg = Segment::new("leg-1", 100.0, 10.0);
//! voyage_planner::segments::chain_arrivals(std::slice::from_mut(&mut leg), start);
//!
//! assert_eq!(leg.time_hours, 10.0);
//! assert_eq!(leg.arrival_time, Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap());
//! # let _ = (Point::new(0.0, 0.0), Timeline::empty(start));
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, PlannerError, Result};

// Geographic utilities (distance, interpolation)
pub mod geo_utils;

// Draw surface boundary and in-memory implementation
pub mod surface;
pub use surface::{DrawSurface, Feature, FeatureDraft, MemorySurface, SurfaceEvent};

// Drawing mode state machine and input policies
pub mod drawing;
pub use drawing::{
    CenterTap, ContinuousClick, DrawingMachine, DrawingState, InputPolicy, Key, KeyOutcome,
    PointerInput,
};

// External lookups (reverse geocoding, wind)
pub mod providers;
pub use providers::{NoGeocoder, NoWind, ReverseGeocoder, Wind, WindProvider};

// Segment derivation engine
pub mod segments;
pub use segments::{
    DerivationContext, Endpoint, ItinerarySummary, RecomputeJob, RecomputeResult, Segment,
    SegmentEngine,
};

// Position-in-time function over the itinerary
pub mod timeline;
pub use timeline::{Playback, PlaybackState, Timeline, WindTracker};

// Repeating playback timer
pub mod playback;
pub use playback::{PlaybackDriver, PlaybackFrame};

// Map overlay labels
pub mod labels;
pub use labels::{LabelFeature, LabelProjector, OverlaySource};

// Saved route bundle and storage
pub mod persistence;
#[cfg(feature = "persistence")]
pub use persistence::{RouteStore, SavedRouteSummary};
pub use persistence::{MapViewport, SavedRoute};

// HTTP providers
#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub use http::{NominatimGeocoder, OpenMeteoWind};

// Event-level facade tying everything together
pub mod planner;
pub use planner::VoyagePlanner;

// ============================================================================
// Core Types
// ============================================================================

/// A map coordinate, stored in GeoJSON order (longitude first).
///
/// # Example
/// ```
/// use voyage_planner::Point;
/// let point = Point::new(-5.3536, 36.1408); // Gibraltar
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub longitude: f64,
    pub latitude: f64,
}

impl Point {
    /// Create a new point from longitude and latitude.
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

impl From<Point> for geo::Point<f64> {
    fn from(p: Point) -> Self {
        geo::Point::new(p.longitude, p.latitude)
    }
}

/// A committed line on the draw surface: one leg of the route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub id: String,
    pub points: Vec<Point>,
}

impl Geometry {
    pub fn new(id: impl Into<String>, points: Vec<Point>) -> Self {
        Self {
            id: id.into(),
            points,
        }
    }

    pub fn start(&self) -> Option<Point> {
        self.points.first().copied()
    }

    pub fn end(&self) -> Option<Point> {
        self.points.last().copied()
    }

    /// Great-circle length in nautical miles.
    pub fn length_nm(&self) -> f64 {
        geo_utils::polyline_length_nm(&self.points)
    }
}

/// Configuration shared by the drawing machine, engine and playback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlannerConfig {
    /// Speed given to newly created legs, in knots.
    /// Default: 6.0
    pub default_speed_knots: f64,

    /// Maximum gap between a freehand leg's start and the previous leg's end.
    /// Larger gaps are rejected. Default: 100.0 meters
    pub continuity_threshold_m: f64,

    /// Distance under which two points count as the same waypoint.
    /// Default: 1.0 meter
    pub anchor_epsilon_m: f64,

    /// Prefix for waypoints that could not be named ("Point 1", "Point 2", ...).
    /// Default: "Point"
    pub unknown_point_prefix: String,

    /// Simulated minutes advanced per playback tick.
    /// Default: 10.0
    pub playback_step_minutes: f64,

    /// Wall-clock interval between playback ticks in milliseconds.
    /// Default: 100
    pub playback_tick_ms: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            default_speed_knots: 6.0,
            continuity_threshold_m: 100.0,
            anchor_epsilon_m: 1.0,
            unknown_point_prefix: "Point".to_string(),
            playback_step_minutes: 10.0,
            playback_tick_ms: 100,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
