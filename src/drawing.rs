//! # Drawing Mode State Machine
//!
//! Collects points for the leg being drawn, shows a preview line, and
//! commits finished legs onto the draw surface. Leg order is owned here as
//! an explicit id list in commit order; it is never re-derived from the
//! surface's own enumeration.
//!
//! ```text
//! Idle -> RouteActionsVisible -> ActivelyDrawing -> Idle
//! ```
//!
//! With a pointer device ([`ContinuousClick`]) the machine is always ready
//! to draw: the first click starts a leg. Touch devices ([`CenterTap`])
//! have no hover cursor, so drawing needs an explicit start trigger and
//! points are taken from the viewport center.
//!
//! Invalid requests (finishing with one point, disjoint freehand legs) are
//! logged and dropped. Nothing here returns an error to the UI.

use std::fmt;

use log::{debug, info, warn};

use crate::geo_utils::{haversine_distance, is_near};
use crate::surface::{DrawSurface, FeatureDraft};
use crate::{Geometry, PlannerConfig, Point};

/// Interaction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawingState {
    Idle,
    /// Route action bar is shown; drawing has not started.
    RouteActionsVisible,
    ActivelyDrawing,
}

/// A tap or click on the map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerInput {
    /// Where the pointer hit the map.
    pub at: Point,
    /// Center of the current viewport (crosshair position on touch devices).
    pub viewport_center: Point,
}

impl PointerInput {
    /// Input where pointer and viewport center coincide.
    pub fn at(point: Point) -> Self {
        Self {
            at: point,
            viewport_center: point,
        }
    }
}

/// Keyboard affordances while drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Escape,
    Other,
}

/// What a key press did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    Finished(String),
    Cancelled,
    Ignored,
}

/// Platform interaction rules, selected once when the machine is built.
pub trait InputPolicy: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Drawing must be started explicitly before points are accepted.
    fn requires_start_trigger(&self) -> bool;

    /// After a leg is committed, the next leg starts at its end point.
    fn keeps_drawing_after_finish(&self) -> bool;

    /// Map position a tap or click contributes.
    fn point_for(&self, input: &PointerInput) -> Point;

    /// Lines drawn directly with the surface's own tool are accepted as legs.
    fn accepts_freehand(&self) -> bool;
}

/// Desktop input: click stream under a persistent pointer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContinuousClick;

impl InputPolicy for ContinuousClick {
    fn name(&self) -> &'static str {
        "continuous-click"
    }

    fn requires_start_trigger(&self) -> bool {
        false
    }

    fn keeps_drawing_after_finish(&self) -> bool {
        false
    }

    fn point_for(&self, input: &PointerInput) -> Point {
        input.at
    }

    fn accepts_freehand(&self) -> bool {
        true
    }
}

/// Touch input: tap adds the point under the center crosshair.
#[derive(Debug, Clone, Copy, Default)]
pub struct CenterTap;

impl InputPolicy for CenterTap {
    fn name(&self) -> &'static str {
        "center-tap"
    }

    fn requires_start_trigger(&self) -> bool {
        true
    }

    fn keeps_drawing_after_finish(&self) -> bool {
        true
    }

    fn point_for(&self, input: &PointerInput) -> Point {
        input.viewport_center
    }

    fn accepts_freehand(&self) -> bool {
        false
    }
}

/// The drawing session plus the committed leg order.
#[derive(Debug)]
pub struct DrawingMachine {
    state: DrawingState,
    policy: Box<dyn InputPolicy>,
    /// Uncommitted points of the leg being drawn
    pending: Vec<Point>,
    preview_id: Option<String>,
    /// Committed leg ids in commit order
    legs: Vec<String>,
    /// End of the last committed leg
    anchor: Option<Point>,
    continuity_threshold_m: f64,
    anchor_epsilon_m: f64,
}

impl DrawingMachine {
    pub fn new(policy: Box<dyn InputPolicy>, config: &PlannerConfig) -> Self {
        info!("[Drawing] Using {} input", policy.name());
        Self {
            state: DrawingState::Idle,
            policy,
            pending: Vec::new(),
            preview_id: None,
            legs: Vec::new(),
            anchor: None,
            continuity_threshold_m: config.continuity_threshold_m,
            anchor_epsilon_m: config.anchor_epsilon_m,
        }
    }

    pub fn state(&self) -> DrawingState {
        self.state
    }

    pub fn is_drawing(&self) -> bool {
        self.state == DrawingState::ActivelyDrawing
    }

    pub fn policy(&self) -> &dyn InputPolicy {
        self.policy.as_ref()
    }

    /// Whether the route action bar should be visible.
    pub fn show_route_actions(&self) -> bool {
        self.state != DrawingState::Idle
    }

    pub fn pending_points(&self) -> &[Point] {
        &self.pending
    }

    pub fn preview_id(&self) -> Option<&str> {
        self.preview_id.as_deref()
    }

    /// Committed leg ids in commit order.
    pub fn legs(&self) -> &[String] {
        &self.legs
    }

    pub fn anchor(&self) -> Option<Point> {
        self.anchor
    }

    /// Committed legs in commit order, resolved against the surface.
    ///
    /// Ids whose feature is missing, a preview, or shorter than two points
    /// are skipped.
    pub fn ordered_geometries(&self, surface: &dyn DrawSurface) -> Vec<Geometry> {
        self.legs
            .iter()
            .filter_map(|id| surface.get(id))
            .filter(|f| !f.preview && f.points.len() >= 2)
            .map(|f| f.to_geometry())
            .collect()
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Show the route action bar (touch devices).
    pub fn open_route_actions(&mut self) {
        if self.state == DrawingState::Idle {
            self.state = DrawingState::RouteActionsVisible;
        }
    }

    /// Hide the route action bar without drawing.
    pub fn close_route_actions(&mut self) {
        if self.state == DrawingState::RouteActionsVisible {
            self.state = DrawingState::Idle;
        }
    }

    /// "Start route" trigger: leave the action bar and start drawing.
    pub fn start_route_drawing(&mut self) {
        self.start_drawing();
    }

    /// Enter drawing, seeding the new leg with the last leg's end point.
    pub fn start_drawing(&mut self) {
        if self.is_drawing() {
            return;
        }
        self.state = DrawingState::ActivelyDrawing;
        self.pending = self.anchor.into_iter().collect();
        debug!(
            "[Drawing] Started, seeded with {} point(s)",
            self.pending.len()
        );
    }

    /// Append a point to the leg being drawn.
    ///
    /// Returns `false` if the point was not accepted.
    pub fn add_point(&mut self, surface: &mut dyn DrawSurface, input: PointerInput) -> bool {
        if !self.is_drawing() {
            if self.policy.requires_start_trigger() {
                warn!("[Drawing] Ignoring point: drawing has not been started");
                return false;
            }
            self.start_drawing();
        }

        let point = self.policy.point_for(&input);
        if !point.is_valid() {
            warn!("[Drawing] Ignoring invalid point {:?}", point);
            return false;
        }
        if let Some(last) = self.pending.last() {
            if is_near(last, &point, self.anchor_epsilon_m) {
                debug!("[Drawing] Ignoring repeated point {:?}", point);
                return false;
            }
        }

        self.pending.push(point);
        if self.pending.len() >= 2 {
            self.refresh_preview(surface);
        }
        true
    }

    fn refresh_preview(&mut self, surface: &mut dyn DrawSurface) {
        let mut draft = FeatureDraft::preview(self.pending.clone());
        draft.id = self.preview_id.clone();
        self.preview_id = Some(surface.add(draft));
    }

    fn discard_preview(&mut self, surface: &mut dyn DrawSurface) {
        if let Some(id) = self.preview_id.take() {
            surface.delete(&id);
        }
    }

    /// Commit the pending points as a new leg.
    ///
    /// Returns the new leg's id, or `None` if fewer than two points exist.
    pub fn finish_drawing(&mut self, surface: &mut dyn DrawSurface) -> Option<String> {
        if !self.is_drawing() {
            warn!("[Drawing] Finish requested while not drawing");
            return None;
        }
        if self.pending.len() < 2 {
            warn!(
                "[Drawing] Finish requested with {} point(s), need 2",
                self.pending.len()
            );
            return None;
        }

        self.discard_preview(surface);
        let points = std::mem::take(&mut self.pending);
        let end = points[points.len() - 1];
        let id = surface.add(FeatureDraft::line(points));
        self.legs.push(id.clone());
        self.anchor = Some(end);

        if self.policy.keeps_drawing_after_finish() {
            self.pending.push(end);
        } else {
            self.state = DrawingState::Idle;
        }

        info!("[Drawing] Committed leg {} ({} total)", id, self.legs.len());
        Some(id)
    }

    /// Remove the most recently committed leg.
    pub fn undo_last_segment(&mut self, surface: &mut dyn DrawSurface) -> Option<String> {
        let removed = self.legs.pop()?;
        surface.delete(&removed);
        self.refresh_anchor(surface);

        if self.is_drawing() {
            self.discard_preview(surface);
            self.pending = self.anchor.into_iter().collect();
        }

        info!("[Drawing] Undid leg {} ({} left)", removed, self.legs.len());
        Some(removed)
    }

    /// Delete every leg and leave drawing mode.
    pub fn clear_all_segments(&mut self, surface: &mut dyn DrawSurface) {
        surface.delete_all();
        self.legs.clear();
        self.anchor = None;
        self.pending.clear();
        self.preview_id = None;
        self.state = DrawingState::Idle;
        info!("[Drawing] Cleared all legs");
    }

    /// Discard the leg being drawn without committing it.
    pub fn cancel_drawing(&mut self, surface: &mut dyn DrawSurface) {
        self.discard_preview(surface);
        self.pending.clear();
        self.state = DrawingState::Idle;
    }

    /// Leave drawing mode; same as cancelling the pending leg.
    pub fn exit_drawing_mode(&mut self, surface: &mut dyn DrawSurface) {
        self.cancel_drawing(surface);
    }

    /// Keyboard shortcuts, only active while drawing.
    pub fn handle_key(&mut self, surface: &mut dyn DrawSurface, key: Key) -> KeyOutcome {
        if !self.is_drawing() {
            return KeyOutcome::Ignored;
        }
        match key {
            Key::Enter if self.pending.len() >= 2 => match self.finish_drawing(surface) {
                Some(id) => KeyOutcome::Finished(id),
                None => KeyOutcome::Ignored,
            },
            Key::Escape => {
                self.cancel_drawing(surface);
                KeyOutcome::Cancelled
            }
            _ => KeyOutcome::Ignored,
        }
    }

    // ========================================================================
    // Surface notifications
    // ========================================================================

    /// Continuity guard for lines the surface created on its own.
    ///
    /// A line is accepted as the next leg only if it starts within the
    /// continuity threshold of the previous leg's end. Rejected lines are
    /// deleted from the surface. Returns whether the line was accepted.
    pub fn on_surface_created(&mut self, surface: &mut dyn DrawSurface, id: &str) -> bool {
        let Some(feature) = surface.get(id) else {
            return false;
        };
        if feature.preview || self.legs.iter().any(|l| l == id) {
            return false;
        }

        if !self.policy.accepts_freehand() {
            warn!(
                "[Drawing] Rejecting freehand line {} under {} input",
                id,
                self.policy.name()
            );
            surface.delete(id);
            return false;
        }

        if feature.points.len() < 2 {
            warn!("[Drawing] Rejecting line {} with fewer than 2 points", id);
            surface.delete(id);
            return false;
        }

        if let Some(anchor) = self.anchor {
            let gap = haversine_distance(&anchor, &feature.points[0]);
            if gap > self.continuity_threshold_m {
                warn!(
                    "[Drawing] Rejecting disjoint line {}: starts {:.0}m from previous leg end",
                    id, gap
                );
                surface.delete(id);
                return false;
            }
        }

        self.legs.push(id.to_string());
        self.anchor = feature.points.last().copied();
        if self.is_drawing() {
            self.discard_preview(surface);
            self.pending = self.anchor.into_iter().collect();
        }
        info!("[Drawing] Accepted freehand leg {}", id);
        true
    }

    /// Forget legs the user deleted directly on the surface.
    pub fn on_surface_deleted(&mut self, surface: &dyn DrawSurface, ids: &[String]) {
        let before = self.legs.len();
        self.legs.retain(|l| !ids.contains(l));
        if self.legs.len() != before {
            self.refresh_anchor(surface);
        }
    }

    /// Update the anchor after a leg's vertices were edited.
    pub fn on_surface_updated(&mut self, surface: &dyn DrawSurface, id: &str) {
        if self.legs.last().map(String::as_str) == Some(id) {
            self.refresh_anchor(surface);
        }
    }

    /// Replace the leg order, e.g. after restoring a saved route.
    pub fn adopt_legs(&mut self, surface: &mut dyn DrawSurface, legs: Vec<String>) {
        self.discard_preview(surface);
        self.pending.clear();
        self.state = DrawingState::Idle;
        self.legs = legs;
        self.refresh_anchor(surface);
    }

    fn refresh_anchor(&mut self, surface: &dyn DrawSurface) {
        self.anchor = self
            .legs
            .last()
            .and_then(|id| surface.get(id))
            .and_then(|f| f.points.last().copied());
    }
}
