//! # Timeline
//!
//! Position-in-time function over the itinerary, the playback clock, and
//! last-requested-wins bookkeeping for wind lookups.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::debug;

use crate::geo_utils::interpolate_along;
use crate::providers::Wind;
use crate::segments::{add_hours, leg_hours, sanitize_hours, Segment};
use crate::{Geometry, Point};

/// Slack for float sums and millisecond-rounded arrival times.
const END_TOLERANCE_HOURS: f64 = 1.0 / 3_600_000.0;

#[derive(Debug, Clone)]
struct TimelineLeg {
    points: Option<Vec<Point>>,
    travel_hours: f64,
    stop_hours: f64,
}

/// Maps clock time to a position along the route.
#[derive(Debug, Clone)]
pub struct Timeline {
    start_time: DateTime<Utc>,
    legs: Vec<TimelineLeg>,
    total_hours: f64,
}

impl Timeline {
    /// Build from segments in route order and their geometries (matched by id).
    pub fn new(segments: &[Segment], geometries: &[Geometry], start_time: DateTime<Utc>) -> Self {
        let by_id: HashMap<&str, &Geometry> =
            geometries.iter().map(|g| (g.id.as_str(), g)).collect();

        let legs: Vec<TimelineLeg> = segments
            .iter()
            .map(|s| TimelineLeg {
                points: by_id
                    .get(s.id.as_str())
                    .filter(|g| !g.points.is_empty())
                    .map(|g| g.points.clone()),
                travel_hours: leg_hours(s.distance_nm, s.speed),
                stop_hours: sanitize_hours(s.stop_hours),
            })
            .collect();

        let total_hours = legs.iter().map(|l| l.travel_hours + l.stop_hours).sum();

        Self {
            start_time,
            legs,
            total_hours,
        }
    }

    /// Timeline with no legs.
    pub fn empty(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            legs: Vec::new(),
            total_hours: 0.0,
        }
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Sum of travel and dwell over all legs, in hours.
    pub fn total_travel_hours(&self) -> f64 {
        self.total_hours
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        add_hours(self.start_time, self.total_hours)
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    /// Clock time at `elapsed_hours` after departure.
    pub fn time_at(&self, elapsed_hours: f64) -> DateTime<Utc> {
        add_hours(self.start_time, elapsed_hours)
    }

    /// Position at clock time `t`.
    pub fn position_at(&self, t: DateTime<Utc>) -> Option<Point> {
        let elapsed = (t - self.start_time).num_milliseconds() as f64 / 3_600_000.0;
        self.position_at_elapsed(elapsed)
    }

    /// Position `elapsed_hours` after departure.
    ///
    /// Interpolates along the active leg while under way and reports the
    /// leg's end point during its dwell. `None` before departure, after the
    /// last leg, or when the active leg has no geometry.
    pub fn position_at_elapsed(&self, elapsed_hours: f64) -> Option<Point> {
        if !elapsed_hours.is_finite()
            || elapsed_hours < 0.0
            || elapsed_hours > self.total_hours + END_TOLERANCE_HOURS
        {
            return None;
        }

        let mut remaining = elapsed_hours;
        for leg in &self.legs {
            if remaining <= 0.0 {
                return leg.points.as_ref()?.first().copied();
            }
            if leg.travel_hours > 0.0 && remaining <= leg.travel_hours {
                let points = leg.points.as_ref()?;
                return interpolate_along(points, remaining / leg.travel_hours);
            }
            if remaining <= leg.travel_hours + leg.stop_hours {
                return leg.points.as_ref()?.last().copied();
            }
            remaining -= leg.travel_hours + leg.stop_hours;
        }

        // Rounding can leave a sliver past the last leg
        self.legs.last()?.points.as_ref()?.last().copied()
    }
}

// ============================================================================
// Playback clock
// ============================================================================

/// Playback transport state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
    Finished,
}

/// Simulated clock advanced in fixed steps.
///
/// Transitions are explicit; only reaching the end changes state on its own.
#[derive(Debug, Clone)]
pub struct Playback {
    state: PlaybackState,
    elapsed_hours: f64,
    step_hours: f64,
    total_hours: f64,
}

impl Playback {
    pub fn new(total_hours: f64, step_minutes: f64) -> Self {
        Self {
            state: PlaybackState::Stopped,
            elapsed_hours: 0.0,
            step_hours: sanitize_hours(step_minutes / 60.0),
            total_hours: sanitize_hours(total_hours),
        }
    }

    pub fn for_timeline(timeline: &Timeline, step_minutes: f64) -> Self {
        Self::new(timeline.total_travel_hours(), step_minutes)
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn elapsed_hours(&self) -> f64 {
        self.elapsed_hours
    }

    pub fn total_hours(&self) -> f64 {
        self.total_hours
    }

    /// Elapsed share of the total, 0..=1.
    pub fn fraction(&self) -> f64 {
        if self.total_hours > 0.0 {
            self.elapsed_hours / self.total_hours
        } else {
            0.0
        }
    }

    /// Start or restart. Playing from the end starts over.
    pub fn play(&mut self) {
        if self.state == PlaybackState::Finished || self.elapsed_hours >= self.total_hours {
            self.elapsed_hours = 0.0;
        }
        self.state = if self.total_hours > 0.0 {
            PlaybackState::Playing
        } else {
            PlaybackState::Finished
        };
    }

    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == PlaybackState::Paused {
            self.state = PlaybackState::Playing;
        }
    }

    pub fn reset(&mut self) {
        self.elapsed_hours = 0.0;
        self.state = PlaybackState::Stopped;
    }

    /// Advance one step while playing; returns the new elapsed hours.
    pub fn tick(&mut self) -> Option<f64> {
        if self.state != PlaybackState::Playing {
            return None;
        }
        self.elapsed_hours = (self.elapsed_hours + self.step_hours).min(self.total_hours);
        if self.elapsed_hours >= self.total_hours {
            self.state = PlaybackState::Finished;
        }
        Some(self.elapsed_hours)
    }

    /// Jump to a share of the total, bypassing the step accumulator.
    pub fn scrub(&mut self, fraction: f64) -> f64 {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.elapsed_hours = fraction * self.total_hours;
        if self.state == PlaybackState::Finished && self.elapsed_hours < self.total_hours {
            self.state = PlaybackState::Paused;
        }
        self.elapsed_hours
    }
}

// ============================================================================
// Wind lookups
// ============================================================================

/// Latest accepted wind reading.
#[derive(Debug, Clone, PartialEq)]
pub struct WindReading {
    pub token: u64,
    pub point: Point,
    pub time: DateTime<Utc>,
    pub wind: Option<Wind>,
}

/// Keeps only the answer to the most recent request.
#[derive(Debug, Default)]
pub struct WindTracker {
    latest_token: u64,
    current: Option<WindReading>,
}

impl WindTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new request; earlier requests become stale.
    pub fn request(&mut self) -> u64 {
        self.latest_token += 1;
        self.latest_token
    }

    /// Record an answer. Answers to superseded requests are dropped.
    pub fn complete(
        &mut self,
        token: u64,
        point: Point,
        time: DateTime<Utc>,
        wind: Option<Wind>,
    ) -> bool {
        if token != self.latest_token {
            debug!(
                "[Playback] Dropping stale wind #{} (latest #{})",
                token, self.latest_token
            );
            return false;
        }
        self.current = Some(WindReading {
            token,
            point,
            time,
            wind,
        });
        true
    }

    pub fn latest(&self) -> Option<&WindReading> {
        self.current.as_ref()
    }
}
