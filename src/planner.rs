//! # Voyage Planner Facade
//!
//! Owns the draw surface, drawing machine, segment engine and label
//! projector for one planning session, and wires them in data-flow order:
//!
//! ```text
//! surface -> drawing machine -> (geometry change) -> segment engine -> labels / timeline
//! ```
//!
//! UI handlers call the drawing methods, then [`VoyagePlanner::refresh`]
//! after anything that changed the geometry set. Field edits re-derive
//! timing synchronously and never geocode.
//!
//! For hosts that must keep handling events while a recompute awaits
//! geocoding, [`VoyagePlanner::begin_refresh`] and
//! [`VoyagePlanner::apply_refresh`] split the recompute around the await;
//! a result superseded by a newer request is dropped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::info;

use crate::drawing::{DrawingMachine, InputPolicy, Key, KeyOutcome, PointerInput};
use crate::error::{OptionExt, Result};
use crate::labels::LabelProjector;
use crate::persistence::{MapViewport, SavedRoute};
use crate::playback::{PlaybackDriver, PlaybackFrame};
use crate::providers::{ReverseGeocoder, WindProvider};
use crate::segments::{Endpoint, ItinerarySummary, RecomputeJob, RecomputeResult, Segment, SegmentEngine};
use crate::surface::{DrawSurface, FeatureDraft, MemorySurface, SurfaceEvent};
use crate::timeline::Timeline;
use crate::{Geometry, PlannerConfig};

pub struct VoyagePlanner<S: DrawSurface> {
    surface: S,
    drawing: DrawingMachine,
    engine: SegmentEngine,
    labels: LabelProjector,
    config: PlannerConfig,
}

impl<S: DrawSurface> VoyagePlanner<S> {
    pub fn new(
        surface: S,
        policy: Box<dyn InputPolicy>,
        config: PlannerConfig,
        start_time: DateTime<Utc>,
    ) -> Self {
        info!(
            "[Planner] New session with {} input, departing {}",
            policy.name(),
            start_time
        );
        Self {
            drawing: DrawingMachine::new(policy, &config),
            engine: SegmentEngine::new(&config, start_time),
            labels: LabelProjector::new(),
            surface,
            config,
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Direct access for user-level surface interaction.
    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn drawing(&self) -> &DrawingMachine {
        &self.drawing
    }

    pub fn engine(&self) -> &SegmentEngine {
        &self.engine
    }

    pub fn segments(&self) -> &[Segment] {
        self.engine.segments()
    }

    pub fn labels(&self) -> &LabelProjector {
        &self.labels
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn unknown_counter(&self) -> u32 {
        self.engine.unknown_counter()
    }

    /// Committed legs in commit order.
    pub fn geometries(&self) -> Vec<Geometry> {
        self.drawing.ordered_geometries(&self.surface)
    }

    // ========================================================================
    // Drawing events
    // ========================================================================

    pub fn open_route_actions(&mut self) {
        self.drawing.open_route_actions();
    }

    pub fn close_route_actions(&mut self) {
        self.drawing.close_route_actions();
    }

    pub fn start_route_drawing(&mut self) {
        self.drawing.start_route_drawing();
    }

    pub fn add_point(&mut self, input: PointerInput) -> bool {
        self.drawing.add_point(&mut self.surface, input)
    }

    /// Commit the pending leg. Call [`refresh`](Self::refresh) afterwards.
    pub fn finish_drawing(&mut self) -> Option<String> {
        self.drawing.finish_drawing(&mut self.surface)
    }

    /// Remove the last committed leg. Call [`refresh`](Self::refresh) afterwards.
    pub fn undo_last_segment(&mut self) -> Option<String> {
        self.drawing.undo_last_segment(&mut self.surface)
    }

    /// Wipe every leg, its segment and its labels.
    pub fn clear_all_segments(&mut self) {
        self.drawing.clear_all_segments(&mut self.surface);
        self.engine.clear();
        self.labels.clear();
    }

    pub fn cancel_drawing(&mut self) {
        self.drawing.cancel_drawing(&mut self.surface);
    }

    pub fn exit_drawing_mode(&mut self) {
        self.drawing.exit_drawing_mode(&mut self.surface);
    }

    pub fn handle_key(&mut self, key: Key) -> KeyOutcome {
        self.drawing.handle_key(&mut self.surface, key)
    }

    /// Route a user-originated surface notification.
    ///
    /// Returns whether the committed geometry set may have changed.
    pub fn handle_surface_event(&mut self, event: SurfaceEvent) -> bool {
        match event {
            SurfaceEvent::Created(id) => self.drawing.on_surface_created(&mut self.surface, &id),
            SurfaceEvent::Updated(id) => {
                let is_leg = self.drawing.legs().contains(&id);
                self.drawing.on_surface_updated(&self.surface, &id);
                is_leg
            }
            SurfaceEvent::Deleted(ids) => {
                let before = self.drawing.legs().len();
                self.drawing.on_surface_deleted(&self.surface, &ids);
                self.drawing.legs().len() != before
            }
        }
    }

    // ========================================================================
    // Derivation
    // ========================================================================

    /// Full recompute against the current geometry set, then relabel.
    ///
    /// Returns whether the result was applied.
    pub async fn refresh(&mut self, geocoder: &dyn ReverseGeocoder) -> bool {
        let job = self.begin_refresh();
        let result = job.run(geocoder).await;
        self.apply_refresh(result)
    }

    /// Snapshot the geometry set for a recompute run outside the planner.
    pub fn begin_refresh(&mut self) -> RecomputeJob {
        let geometries = self.drawing.ordered_geometries(&self.surface);
        self.engine.begin_recompute(geometries)
    }

    /// Install a recompute result unless a newer one was requested since.
    pub fn apply_refresh(&mut self, result: RecomputeResult) -> bool {
        let applied = self.engine.apply(result);
        if applied {
            self.project_labels();
        }
        applied
    }

    fn project_labels(&mut self) {
        if self.engine.segments().is_empty() {
            self.labels.clear();
        } else {
            let geometries = self.drawing.ordered_geometries(&self.surface);
            self.labels.project(self.engine.segments(), &geometries);
        }
    }

    // ========================================================================
    // Field edits
    // ========================================================================

    pub fn set_speed(&mut self, id: &str, speed: f64) -> Result<()> {
        self.engine.set_speed(id, speed)?;
        self.project_labels();
        Ok(())
    }

    pub fn set_stop_hours(&mut self, id: &str, hours: f64) -> Result<()> {
        self.engine.set_stop_hours(id, hours)?;
        self.project_labels();
        Ok(())
    }

    pub fn set_start_time(&mut self, start_time: DateTime<Utc>) {
        self.engine.set_start_time(start_time);
        self.project_labels();
    }

    pub fn set_default_speed(&mut self, speed: f64) -> Result<()> {
        self.engine.set_default_speed(speed)
    }

    pub fn apply_speed_to_all(&mut self, speed: f64) -> Result<()> {
        self.engine.apply_speed_to_all(speed)?;
        self.project_labels();
        Ok(())
    }

    pub fn rename_endpoint(&mut self, id: &str, endpoint: Endpoint, name: &str) -> Result<usize> {
        let changed = self.engine.rename_endpoint(id, endpoint, name)?;
        self.project_labels();
        Ok(changed)
    }

    pub fn reset_endpoint_name(&mut self, id: &str, endpoint: Endpoint) -> Result<usize> {
        let changed = self.engine.reset_endpoint_name(id, endpoint)?;
        self.project_labels();
        Ok(changed)
    }

    // ========================================================================
    // Timeline
    // ========================================================================

    pub fn timeline(&self) -> Timeline {
        let geometries = self.drawing.ordered_geometries(&self.surface);
        Timeline::new(self.engine.segments(), &geometries, self.engine.start_time())
    }

    pub fn summary(&self) -> ItinerarySummary {
        self.engine.summary()
    }

    /// Playback driver over a snapshot of the current itinerary.
    pub fn playback(
        &self,
        wind: Arc<dyn WindProvider>,
    ) -> (PlaybackDriver, tokio::sync::mpsc::UnboundedReceiver<PlaybackFrame>) {
        PlaybackDriver::new(self.timeline(), &self.config, wind)
    }

    // ========================================================================
    // Saved routes
    // ========================================================================

    pub fn to_saved_route(
        &self,
        id: &str,
        name: &str,
        map_viewport: Option<MapViewport>,
    ) -> SavedRoute {
        SavedRoute {
            id: id.to_string(),
            name: name.to_string(),
            saved_at: Utc::now(),
            start_date: self.engine.start_time(),
            default_speed: self.engine.default_speed(),
            segments: self.engine.segments().to_vec(),
            raw_geometry: self.geometries(),
            map_viewport,
        }
    }

    /// Replace the session with a saved route.
    ///
    /// The bundle is checked before anything is touched; on error the
    /// current session is unchanged.
    pub fn restore(&mut self, saved: &SavedRoute) -> Result<()> {
        saved.validate()?;
        let geometries = saved
            .segments
            .iter()
            .map(|s| {
                saved
                    .raw_geometry
                    .iter()
                    .find(|g| g.id == s.id)
                    .cloned()
                    .ok_or_unknown_segment(&s.id)
            })
            .collect::<Result<Vec<_>>>()?;

        self.surface.delete_all();
        let legs = geometries
            .into_iter()
            .map(|g| self.surface.add(FeatureDraft::line(g.points).with_id(g.id)))
            .collect();
        self.drawing.adopt_legs(&mut self.surface, legs);

        let anchor = self.drawing.anchor();
        self.engine.restore(
            saved.segments.clone(),
            saved.start_date,
            saved.default_speed,
            anchor,
        );
        self.project_labels();

        info!(
            "[Planner] Restored route '{}' ({} legs)",
            saved.name,
            saved.segments.len()
        );
        Ok(())
    }
}

impl VoyagePlanner<MemorySurface> {
    /// Drain and route all pending surface events.
    ///
    /// Returns whether the geometry set may have changed.
    pub fn sync_surface_events(&mut self) -> bool {
        let events = self.surface.drain_events();
        let mut changed = false;
        for event in events {
            changed |= self.handle_surface_event(event);
        }
        changed
    }
}
