//! # Segment Derivation Engine
//!
//! Turns the ordered committed geometries into [`Segment`] records:
//! great-circle distance, speed, dwell, leg duration, chained arrival times
//! and waypoint names.
//!
//! ## Recompute kinds
//!
//! - **Full** (geometry changed): reuses edits for legs whose id is already
//!   known, geocodes endpoints of new legs one leg at a time, then re-chains.
//! - **Partial** (speed/stop/name/start-time edit): re-chains times only.
//!   Never geocodes.
//!
//! A full recompute is split into [`SegmentEngine::begin_recompute`],
//! [`RecomputeJob::run`] and [`SegmentEngine::apply`]. Every begin (and every
//! clear or restore) takes a new request token; a result whose token is no
//! longer current is dropped on apply.

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{OptionExt, PlannerError, Result};
use crate::providers::ReverseGeocoder;
use crate::{Geometry, PlannerConfig, Point};

// ============================================================================
// Types
// ============================================================================

/// One leg of the itinerary, keyed by its geometry id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: String,
    /// Display label of the departure waypoint (user-editable)
    pub start_name: String,
    /// Display label of the arrival waypoint (user-editable)
    pub end_name: String,
    /// Name resolved when the leg was created
    pub auto_start_name: String,
    pub auto_end_name: String,
    /// Great-circle length in nautical miles
    pub distance_nm: f64,
    /// Speed in knots
    pub speed: f64,
    /// Dwell at the arrival waypoint before the next leg departs
    pub stop_hours: f64,
    /// Derived: distance / speed
    pub time_hours: f64,
    /// Derived: chained from the voyage start
    pub arrival_time: DateTime<Utc>,
}

impl Segment {
    /// Unnamed leg with derived fields computed for a zero start time.
    pub fn new(id: impl Into<String>, distance_nm: f64, speed: f64) -> Self {
        Self {
            id: id.into(),
            start_name: String::new(),
            end_name: String::new(),
            auto_start_name: String::new(),
            auto_end_name: String::new(),
            distance_nm,
            speed,
            stop_hours: 0.0,
            time_hours: leg_hours(distance_nm, speed),
            arrival_time: DateTime::<Utc>::default(),
        }
    }

    pub fn with_stop(mut self, stop_hours: f64) -> Self {
        self.stop_hours = sanitize_hours(stop_hours);
        self
    }

    pub fn with_names(mut self, start: &str, end: &str) -> Self {
        self.start_name = start.to_string();
        self.end_name = end.to_string();
        self.auto_start_name = start.to_string();
        self.auto_end_name = end.to_string();
        self
    }

    fn name_mut(&mut self, endpoint: Endpoint) -> &mut String {
        match endpoint {
            Endpoint::Start => &mut self.start_name,
            Endpoint::End => &mut self.end_name,
        }
    }

    fn auto_name(&self, endpoint: Endpoint) -> &str {
        match endpoint {
            Endpoint::Start => &self.auto_start_name,
            Endpoint::End => &self.auto_end_name,
        }
    }

    /// Copy user-editable fields from a newer version of the same leg.
    fn take_edits_from(&mut self, newer: &Segment) {
        self.start_name = newer.start_name.clone();
        self.end_name = newer.end_name.clone();
        self.auto_start_name = newer.auto_start_name.clone();
        self.auto_end_name = newer.auto_end_name.clone();
        self.speed = newer.speed;
        self.stop_hours = newer.stop_hours;
    }
}

/// Which end of a leg a name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Endpoint {
    Start,
    End,
}

/// Totals over the itinerary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItinerarySummary {
    pub leg_count: u32,
    pub total_distance_nm: f64,
    pub total_travel_hours: f64,
    pub total_stop_hours: f64,
    pub departure: DateTime<Utc>,
    pub arrival: DateTime<Utc>,
}

// ============================================================================
// Timing
// ============================================================================

/// Leg duration in hours.
///
/// Zero, negative or non-finite speeds (and non-finite distances) give a
/// zero-length leg instead of NaN or infinity.
pub fn leg_hours(distance_nm: f64, speed: f64) -> f64 {
    if !speed.is_finite() || speed <= 0.0 || !distance_nm.is_finite() {
        return 0.0;
    }
    let hours = distance_nm / speed;
    if hours.is_finite() {
        hours
    } else {
        0.0
    }
}

/// Clamp an hour count to a finite, non-negative value.
pub fn sanitize_hours(hours: f64) -> f64 {
    if hours.is_finite() && hours > 0.0 {
        hours
    } else {
        0.0
    }
}

/// Convert fractional hours to a clock duration (millisecond resolution).
pub fn hours_to_duration(hours: f64) -> Duration {
    let hours = sanitize_hours(hours);
    Duration::milliseconds((hours * 3_600_000.0).round() as i64)
}

/// Add fractional hours to a time, saturating at the original time on overflow.
pub fn add_hours(time: DateTime<Utc>, hours: f64) -> DateTime<Utc> {
    time.checked_add_signed(hours_to_duration(hours))
        .unwrap_or(time)
}

/// Recompute `time_hours` and chain `arrival_time` across legs.
///
/// `arrival_i = depart_i + time_i`, `depart_{i+1} = arrival_i + stop_i`,
/// with `depart_1 = start`.
pub fn chain_arrivals(segments: &mut [Segment], start: DateTime<Utc>) {
    let mut depart = start;
    for segment in segments.iter_mut() {
        segment.time_hours = leg_hours(segment.distance_nm, segment.speed);
        segment.arrival_time = add_hours(depart, segment.time_hours);
        depart = add_hours(segment.arrival_time, segment.stop_hours);
    }
}

// ============================================================================
// Derivation Context
// ============================================================================

/// Mutable bookkeeping owned by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivationContext {
    /// Next number for an unnamed waypoint ("Point N")
    pub unknown_counter: u32,
    /// End of the last leg
    pub anchor: Option<Point>,
    /// Current recompute request token
    pub token: u64,
}

impl Default for DerivationContext {
    fn default() -> Self {
        Self {
            unknown_counter: 1,
            anchor: None,
            token: 0,
        }
    }
}

impl DerivationContext {
    /// Reset the counter and anchor. The token keeps increasing.
    pub fn reset(&mut self) {
        self.unknown_counter = 1;
        self.anchor = None;
    }

    fn next_token(&mut self) -> u64 {
        self.token += 1;
        self.token
    }
}

// ============================================================================
// Full recompute
// ============================================================================

/// Snapshot of everything a full recompute needs, detached from the engine.
#[derive(Debug, Clone)]
pub struct RecomputeJob {
    token: u64,
    geometries: Vec<Geometry>,
    previous: Vec<Segment>,
    unknown_counter: u32,
    default_speed: f64,
    start_time: DateTime<Utc>,
    prefix: String,
}

/// Output of [`RecomputeJob::run`], applied with [`SegmentEngine::apply`].
#[derive(Debug, Clone)]
pub struct RecomputeResult {
    pub token: u64,
    pub segments: Vec<Segment>,
    pub unknown_counter: u32,
    pub anchor: Option<Point>,
    /// Number of reverse-geocoding lookups issued
    pub lookups: u32,
}

impl RecomputeJob {
    pub fn token(&self) -> u64 {
        self.token
    }

    fn placeholder(&mut self) -> String {
        let name = format!("{} {}", self.prefix, self.unknown_counter);
        self.unknown_counter += 1;
        name
    }

    /// Derive segments for the snapshot.
    ///
    /// Legs are processed in order; the two endpoint lookups of a new leg
    /// run concurrently and complete before the next leg starts.
    pub async fn run(mut self, geocoder: &dyn ReverseGeocoder) -> RecomputeResult {
        if self.geometries.is_empty() {
            return RecomputeResult {
                token: self.token,
                segments: Vec::new(),
                unknown_counter: 1,
                anchor: None,
                lookups: 0,
            };
        }

        let geometries = std::mem::take(&mut self.geometries);
        let mut out: Vec<Segment> = Vec::with_capacity(geometries.len());
        let mut lookups = 0;

        for geometry in &geometries {
            let distance_nm = geometry.length_nm();

            if let Some(previous) = self.previous.iter().find(|s| s.id == geometry.id) {
                let mut segment = previous.clone();
                segment.distance_nm = distance_nm;
                out.push(segment);
                continue;
            }

            let (Some(start), Some(end)) = (geometry.start(), geometry.end()) else {
                continue;
            };

            let (start_lookup, end_lookup) =
                futures::join!(geocoder.resolve(start), geocoder.resolve(end));
            lookups += 2;

            let start_name = match start_lookup.filter(|n| !n.trim().is_empty()) {
                Some(name) => name,
                None => match out.last() {
                    Some(prev) => prev.end_name.clone(),
                    None => self.placeholder(),
                },
            };
            let end_name = match end_lookup.filter(|n| !n.trim().is_empty()) {
                Some(name) => name,
                None => self.placeholder(),
            };

            let mut segment = Segment::new(geometry.id.clone(), distance_nm, self.default_speed);
            segment.start_name = start_name.clone();
            segment.end_name = end_name.clone();
            segment.auto_start_name = start_name;
            segment.auto_end_name = end_name;
            out.push(segment);
        }

        chain_arrivals(&mut out, self.start_time);

        RecomputeResult {
            token: self.token,
            segments: out,
            unknown_counter: self.unknown_counter,
            anchor: geometries.last().and_then(Geometry::end),
            lookups,
        }
    }
}

// ============================================================================
// Segment Engine
// ============================================================================

/// Owns the segment list and its derivation context.
#[derive(Debug, Clone)]
pub struct SegmentEngine {
    segments: Vec<Segment>,
    context: DerivationContext,
    start_time: DateTime<Utc>,
    default_speed: f64,
    prefix: String,
}

impl SegmentEngine {
    pub fn new(config: &PlannerConfig, start_time: DateTime<Utc>) -> Self {
        Self {
            segments: Vec::new(),
            context: DerivationContext::default(),
            start_time,
            default_speed: config.default_speed_knots,
            prefix: config.unknown_point_prefix.clone(),
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn get(&self, id: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.id == id)
    }

    pub fn context(&self) -> &DerivationContext {
        &self.context
    }

    pub fn unknown_counter(&self) -> u32 {
        self.context.unknown_counter
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn default_speed(&self) -> f64 {
        self.default_speed
    }

    // ========================================================================
    // Full recompute
    // ========================================================================

    /// Snapshot state for a full recompute and take a new request token.
    pub fn begin_recompute(&mut self, geometries: Vec<Geometry>) -> RecomputeJob {
        let token = self.context.next_token();
        debug!(
            "[SegmentEngine] Recompute #{} for {} geometries",
            token,
            geometries.len()
        );
        RecomputeJob {
            token,
            geometries,
            previous: self.segments.clone(),
            unknown_counter: self.context.unknown_counter,
            default_speed: self.default_speed,
            start_time: self.start_time,
            prefix: self.prefix.clone(),
        }
    }

    /// Install a recompute result unless a newer request superseded it.
    ///
    /// Edits made to known legs while the job was running win over the
    /// job's snapshot. Returns whether the result was applied.
    pub fn apply(&mut self, mut result: RecomputeResult) -> bool {
        if result.token != self.context.token {
            debug!(
                "[SegmentEngine] Dropping stale recompute #{} (current #{})",
                result.token, self.context.token
            );
            return false;
        }

        let snapshot_ends: Vec<String> =
            result.segments.iter().map(|s| s.end_name.clone()).collect();
        let mut is_new = Vec::with_capacity(result.segments.len());
        for segment in result.segments.iter_mut() {
            match self.segments.iter().find(|s| s.id == segment.id) {
                Some(current) => {
                    segment.take_edits_from(current);
                    is_new.push(false);
                }
                None => is_new.push(true),
            }
        }

        // A new leg that inherited its start name from the previous leg
        // follows any rename made to that waypoint while the job ran
        for i in 1..result.segments.len() {
            if is_new[i] && result.segments[i].start_name == snapshot_ends[i - 1] {
                let current_end = result.segments[i - 1].end_name.clone();
                result.segments[i].start_name = current_end;
            }
        }
        chain_arrivals(&mut result.segments, self.start_time);

        if result.segments.is_empty() {
            self.clear_state();
        } else {
            self.segments = result.segments;
            self.context.unknown_counter = result.unknown_counter;
            self.context.anchor = result.anchor;
        }

        info!(
            "[SegmentEngine] Recomputed {} legs ({} lookups)",
            self.segments.len(),
            result.lookups
        );
        true
    }

    /// Full recompute in one call: begin, run and apply.
    pub async fn recompute(
        &mut self,
        geometries: Vec<Geometry>,
        geocoder: &dyn ReverseGeocoder,
    ) -> bool {
        let job = self.begin_recompute(geometries);
        let result = job.run(geocoder).await;
        self.apply(result)
    }

    /// Drop all segments and reset the context; in-flight jobs become stale.
    pub fn clear(&mut self) {
        self.context.next_token();
        self.clear_state();
    }

    fn clear_state(&mut self) {
        self.segments.clear();
        self.context.reset();
    }

    /// Install saved segments, e.g. when loading a route.
    ///
    /// The unknown-point counter continues after the highest live
    /// placeholder so restored names are never handed out again.
    pub fn restore(
        &mut self,
        mut segments: Vec<Segment>,
        start_time: DateTime<Utc>,
        default_speed: f64,
        anchor: Option<Point>,
    ) {
        self.context.next_token();
        self.start_time = start_time;
        if default_speed.is_finite() && default_speed > 0.0 {
            self.default_speed = default_speed;
        }
        for segment in segments.iter_mut() {
            segment.stop_hours = sanitize_hours(segment.stop_hours);
        }
        chain_arrivals(&mut segments, start_time);

        let highest = segments
            .iter()
            .flat_map(|s| [&s.start_name, &s.end_name, &s.auto_start_name, &s.auto_end_name])
            .filter_map(|name| self.placeholder_number(name))
            .max();
        self.context.unknown_counter = highest.map_or(1, |n| n + 1);
        self.context.anchor = if segments.is_empty() { None } else { anchor };
        self.segments = segments;
    }

    fn placeholder_number(&self, name: &str) -> Option<u32> {
        name.strip_prefix(self.prefix.as_str())?
            .strip_prefix(' ')?
            .parse()
            .ok()
    }

    // ========================================================================
    // Partial recompute
    // ========================================================================

    fn segment_mut(&mut self, id: &str) -> Result<&mut Segment> {
        self.segments
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_unknown_segment(id)
    }

    fn rechain(&mut self) {
        chain_arrivals(&mut self.segments, self.start_time);
    }

    /// Set a leg's speed. Non-positive speeds give a zero-length leg.
    pub fn set_speed(&mut self, id: &str, speed: f64) -> Result<()> {
        self.segment_mut(id)?.speed = speed;
        self.rechain();
        Ok(())
    }

    /// Set a leg's dwell time; negative or non-finite values become zero.
    pub fn set_stop_hours(&mut self, id: &str, hours: f64) -> Result<()> {
        self.segment_mut(id)?.stop_hours = sanitize_hours(hours);
        self.rechain();
        Ok(())
    }

    pub fn set_start_time(&mut self, start_time: DateTime<Utc>) {
        self.start_time = start_time;
        self.rechain();
    }

    /// Speed given to legs created from now on.
    pub fn set_default_speed(&mut self, speed: f64) -> Result<()> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(PlannerError::InvalidSpeed { speed });
        }
        self.default_speed = speed;
        Ok(())
    }

    /// Set every leg to the same speed.
    pub fn apply_speed_to_all(&mut self, speed: f64) -> Result<()> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(PlannerError::InvalidSpeed { speed });
        }
        for segment in self.segments.iter_mut() {
            segment.speed = speed;
        }
        self.rechain();
        Ok(())
    }

    /// Rename a waypoint.
    ///
    /// Every other endpoint that carried the old name is renamed too, since
    /// a waypoint is both the end of one leg and the start of the next.
    /// Returns the number of endpoints changed.
    pub fn rename_endpoint(&mut self, id: &str, endpoint: Endpoint, name: &str) -> Result<usize> {
        let old = std::mem::replace(self.segment_mut(id)?.name_mut(endpoint), name.to_string());
        if old == name {
            return Ok(0);
        }

        let mut changed = 1;
        for segment in self.segments.iter_mut() {
            for end in [Endpoint::Start, Endpoint::End] {
                let current = segment.name_mut(end);
                if *current == old {
                    *current = name.to_string();
                    changed += 1;
                }
            }
        }
        debug!(
            "[SegmentEngine] Renamed '{}' to '{}' at {} endpoint(s)",
            old, name, changed
        );
        Ok(changed)
    }

    /// Restore the auto-resolved name of a waypoint.
    pub fn reset_endpoint_name(&mut self, id: &str, endpoint: Endpoint) -> Result<usize> {
        let auto = self
            .get(id)
            .ok_or_unknown_segment(id)?
            .auto_name(endpoint)
            .to_string();
        self.rename_endpoint(id, endpoint, &auto)
    }

    // ========================================================================
    // Summary
    // ========================================================================

    pub fn summary(&self) -> ItinerarySummary {
        ItinerarySummary {
            leg_count: self.segments.len() as u32,
            total_distance_nm: self.segments.iter().map(|s| s.distance_nm).sum(),
            total_travel_hours: self.segments.iter().map(|s| s.time_hours).sum(),
            total_stop_hours: self.segments.iter().map(|s| s.stop_hours).sum(),
            departure: self.start_time,
            arrival: self
                .segments
                .last()
                .map_or(self.start_time, |s| s.arrival_time),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::NoGeocoder;
    use chrono::TimeZone;
    use futures::future::{BoxFuture, FutureExt};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Names points by latitude band, counting calls.
    struct BandGeocoder {
        calls: AtomicU32,
    }

    impl BandGeocoder {
        fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
            }
        }
    }

    impl ReverseGeocoder for BandGeocoder {
        fn resolve(&self, point: Point) -> BoxFuture<'_, Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = if point.latitude >= 1.0 {
                Some(format!("Lat {}", point.latitude.floor()))
            } else {
                None
            };
            async move { name }.boxed()
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn leg(id: &str, from: (f64, f64), to: (f64, f64)) -> Geometry {
        Geometry::new(id, vec![Point::new(from.0, from.1), Point::new(to.0, to.1)])
    }

    fn engine() -> SegmentEngine {
        SegmentEngine::new(&PlannerConfig::default(), t0())
    }

    #[test]
    fn test_leg_hours_clamps_bad_speed() {
        assert_eq!(leg_hours(100.0, 10.0), 10.0);
        assert_eq!(leg_hours(100.0, 0.0), 0.0);
        assert_eq!(leg_hours(100.0, -4.0), 0.0);
        assert_eq!(leg_hours(100.0, f64::NAN), 0.0);
        assert_eq!(leg_hours(100.0, f64::INFINITY), 0.0);
        assert_eq!(leg_hours(f64::NAN, 5.0), 0.0);
    }

    #[test]
    fn test_single_leg_timing() {
        let mut legs = vec![Segment::new("a", 100.0, 10.0)];
        chain_arrivals(&mut legs, t0());
        assert_eq!(legs[0].time_hours, 10.0);
        assert_eq!(
            legs[0].arrival_time,
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_chained_legs_with_dwell() {
        let mut legs = vec![
            Segment::new("a", 50.0, 5.0).with_stop(2.0),
            Segment::new("b", 30.0, 10.0),
        ];
        chain_arrivals(&mut legs, t0());
        assert_eq!(legs[0].arrival_time, t0() + Duration::hours(10));
        assert_eq!(legs[1].arrival_time, t0() + Duration::hours(15));
    }

    #[test]
    fn test_zero_speed_leg_keeps_times_finite() {
        let mut legs = vec![Segment::new("a", 50.0, 0.0), Segment::new("b", 30.0, 10.0)];
        chain_arrivals(&mut legs, t0());
        assert_eq!(legs[0].time_hours, 0.0);
        assert_eq!(legs[0].arrival_time, t0());
        assert_eq!(legs[1].arrival_time, t0() + Duration::hours(3));
    }

    #[tokio::test]
    async fn test_recompute_names_with_placeholders() {
        let mut engine = engine();
        let geoms = vec![leg("a", (0.0, 0.0), (0.0, 0.5)), leg("b", (0.0, 0.5), (0.0, 0.9))];
        assert!(engine.recompute(geoms, &NoGeocoder).await);

        let segs = engine.segments();
        assert_eq!(segs[0].start_name, "Point 1");
        assert_eq!(segs[0].end_name, "Point 2");
        // Shared waypoint keeps the previous leg's end name
        assert_eq!(segs[1].start_name, "Point 2");
        assert_eq!(segs[1].end_name, "Point 3");
        assert_eq!(engine.unknown_counter(), 4);
        assert_eq!(engine.context().anchor, Some(Point::new(0.0, 0.9)));
    }

    #[tokio::test]
    async fn test_recompute_uses_geocoder_and_auto_names() {
        let geocoder = BandGeocoder::new();
        let mut engine = engine();
        engine
            .recompute(vec![leg("a", (0.0, 0.0), (0.0, 2.5))], &geocoder)
            .await;

        let seg = &engine.segments()[0];
        assert_eq!(seg.start_name, "Point 1");
        assert_eq!(seg.end_name, "Lat 2");
        assert_eq!(seg.auto_end_name, "Lat 2");
        assert_eq!(seg.speed, 6.0);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_recompute_is_idempotent() {
        let geocoder = BandGeocoder::new();
        let mut engine = engine();
        let geoms = vec![leg("a", (0.0, 0.0), (0.0, 0.5)), leg("b", (0.0, 0.5), (0.0, 0.9))];
        engine.recompute(geoms.clone(), &geocoder).await;
        engine.set_speed("b", 12.0).unwrap();
        let before = engine.segments().to_vec();
        let counter = engine.unknown_counter();
        let calls = geocoder.calls.load(Ordering::SeqCst);

        engine.recompute(geoms, &geocoder).await;
        assert_eq!(engine.segments(), before.as_slice());
        assert_eq!(engine.unknown_counter(), counter);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_vertex_edit_keeps_names_and_updates_distance() {
        let mut engine = engine();
        engine
            .recompute(vec![leg("a", (0.0, 0.0), (0.0, 0.5))], &NoGeocoder)
            .await;
        engine.rename_endpoint("a", Endpoint::End, "Harbour").unwrap();
        let before = engine.segments()[0].distance_nm;

        engine
            .recompute(vec![leg("a", (0.0, 0.0), (0.0, 0.8))], &NoGeocoder)
            .await;
        let seg = &engine.segments()[0];
        assert_eq!(seg.end_name, "Harbour");
        assert!(seg.distance_nm > before);
    }

    #[tokio::test]
    async fn test_empty_geometry_resets_counter() {
        let mut engine = engine();
        engine
            .recompute(vec![leg("a", (0.0, 0.0), (0.0, 0.5))], &NoGeocoder)
            .await;
        assert_eq!(engine.unknown_counter(), 3);

        engine.recompute(Vec::new(), &NoGeocoder).await;
        assert!(engine.segments().is_empty());
        assert_eq!(engine.unknown_counter(), 1);
        assert_eq!(engine.context().anchor, None);
    }

    #[tokio::test]
    async fn test_stale_result_is_dropped() {
        let mut engine = engine();
        let old_job = engine.begin_recompute(vec![leg("a", (0.0, 0.0), (0.0, 0.5))]);
        let new_job = engine.begin_recompute(vec![
            leg("a", (0.0, 0.0), (0.0, 0.5)),
            leg("b", (0.0, 0.5), (0.0, 0.9)),
        ]);

        let new_result = new_job.run(&NoGeocoder).await;
        let old_result = old_job.run(&NoGeocoder).await;
        assert!(engine.apply(new_result));
        assert!(!engine.apply(old_result));
        assert_eq!(engine.segments().len(), 2);
        assert_eq!(engine.unknown_counter(), 4);
    }

    #[tokio::test]
    async fn test_clear_invalidates_in_flight_job() {
        let mut engine = engine();
        let job = engine.begin_recompute(vec![leg("a", (0.0, 0.0), (0.0, 0.5))]);
        engine.clear();
        let result = job.run(&NoGeocoder).await;
        assert!(!engine.apply(result));
        assert!(engine.segments().is_empty());
        assert_eq!(engine.unknown_counter(), 1);
    }

    #[tokio::test]
    async fn test_edits_made_during_recompute_survive() {
        let mut engine = engine();
        engine
            .recompute(vec![leg("a", (0.0, 0.0), (0.0, 0.5))], &NoGeocoder)
            .await;

        let job = engine.begin_recompute(vec![
            leg("a", (0.0, 0.0), (0.0, 0.5)),
            leg("b", (0.0, 0.5), (0.0, 0.9)),
        ]);
        engine.set_speed("a", 3.0).unwrap();
        let result = job.run(&NoGeocoder).await;
        assert!(engine.apply(result));
        assert_eq!(engine.get("a").unwrap().speed, 3.0);
    }

    #[tokio::test]
    async fn test_rename_during_recompute_reaches_new_leg() {
        let mut engine = engine();
        engine
            .recompute(vec![leg("a", (0.0, 0.0), (0.0, 0.5))], &NoGeocoder)
            .await;

        let job = engine.begin_recompute(vec![
            leg("a", (0.0, 0.0), (0.0, 0.5)),
            leg("b", (0.0, 0.5), (0.0, 0.9)),
        ]);
        engine.rename_endpoint("a", Endpoint::End, "Marina").unwrap();
        let result = job.run(&NoGeocoder).await;
        assert!(engine.apply(result));

        assert_eq!(engine.get("a").unwrap().end_name, "Marina");
        assert_eq!(engine.get("b").unwrap().start_name, "Marina");
        assert_eq!(engine.get("b").unwrap().auto_start_name, "Point 2");
    }

    #[tokio::test]
    async fn test_rename_propagates_to_shared_waypoint() {
        let mut engine = engine();
        engine
            .recompute(
                vec![leg("a", (0.0, 0.0), (0.0, 0.5)), leg("b", (0.0, 0.5), (0.0, 0.9))],
                &NoGeocoder,
            )
            .await;

        let changed = engine.rename_endpoint("a", Endpoint::End, "Marina").unwrap();
        assert_eq!(changed, 2);
        assert_eq!(engine.get("a").unwrap().end_name, "Marina");
        assert_eq!(engine.get("b").unwrap().start_name, "Marina");
        assert_eq!(engine.get("a").unwrap().start_name, "Point 1");

        engine.reset_endpoint_name("b", Endpoint::Start).unwrap();
        assert_eq!(engine.get("a").unwrap().end_name, "Point 2");
        assert_eq!(engine.get("b").unwrap().start_name, "Point 2");
    }

    #[test]
    fn test_unknown_segment_edit_errors() {
        let mut engine = engine();
        assert!(matches!(
            engine.set_speed("missing", 5.0),
            Err(PlannerError::UnknownSegment { .. })
        ));
        assert!(matches!(
            engine.set_default_speed(0.0),
            Err(PlannerError::InvalidSpeed { .. })
        ));
    }

    #[test]
    fn test_restore_continues_placeholder_numbering() {
        let mut engine = engine();
        let segs = vec![
            Segment::new("a", 10.0, 5.0).with_names("Point 1", "Point 7"),
            Segment::new("b", 10.0, 5.0).with_names("Point 7", "Cadiz"),
        ];
        engine.restore(segs, t0(), 5.0, Some(Point::new(1.0, 1.0)));
        assert_eq!(engine.unknown_counter(), 8);
        assert_eq!(engine.default_speed(), 5.0);
        assert_eq!(engine.segments()[1].arrival_time, t0() + Duration::hours(4));
    }

    #[test]
    fn test_summary_totals() {
        let mut engine = engine();
        engine.restore(
            vec![
                Segment::new("a", 50.0, 5.0).with_stop(2.0),
                Segment::new("b", 30.0, 10.0),
            ],
            t0(),
            6.0,
            None,
        );
        let summary = engine.summary();
        assert_eq!(summary.leg_count, 2);
        assert_eq!(summary.total_distance_nm, 80.0);
        assert_eq!(summary.total_travel_hours, 13.0);
        assert_eq!(summary.total_stop_hours, 2.0);
        assert_eq!(summary.arrival, t0() + Duration::hours(15));
    }
}
