//! Draw surface boundary.
//!
//! The surface holds committed and preview line features. Programmatic
//! `add`/`delete` calls are silent; only user-originated changes
//! (freehand drawing, vertex edits, direct deletes) are reported as
//! [`SurfaceEvent`]s, so reacting to an event never feeds back into itself.

use std::collections::VecDeque;

use crate::{Geometry, Point};

/// A line feature held by the surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: String,
    pub points: Vec<Point>,
    /// In-progress line shown while drawing; never part of the route.
    pub preview: bool,
}

impl Feature {
    pub fn to_geometry(&self) -> Geometry {
        Geometry::new(self.id.clone(), self.points.clone())
    }
}

/// Feature to be added. A `None` id lets the surface assign one.
#[derive(Debug, Clone, Default)]
pub struct FeatureDraft {
    pub id: Option<String>,
    pub points: Vec<Point>,
    pub preview: bool,
}

impl FeatureDraft {
    pub fn line(points: Vec<Point>) -> Self {
        Self {
            id: None,
            points,
            preview: false,
        }
    }

    pub fn preview(points: Vec<Point>) -> Self {
        Self {
            id: None,
            points,
            preview: true,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// User-originated change notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    Created(String),
    Updated(String),
    Deleted(Vec<String>),
}

/// Operations the planner needs from a map drawing layer.
pub trait DrawSurface {
    /// All features in insertion order.
    fn get_all(&self) -> Vec<Feature>;

    fn get(&self, id: &str) -> Option<Feature>;

    /// Add a feature, replacing any feature with the same id. Returns its id.
    fn add(&mut self, draft: FeatureDraft) -> String;

    /// Returns `false` if no such feature existed.
    fn delete(&mut self, id: &str) -> bool;

    fn delete_all(&mut self);

    /// Committed (non-preview) features as geometries, in insertion order.
    fn committed(&self) -> Vec<Geometry> {
        self.get_all()
            .into_iter()
            .filter(|f| !f.preview)
            .map(|f| f.to_geometry())
            .collect()
    }
}

/// In-memory draw surface with stable ids and an event queue.
#[derive(Debug, Default)]
pub struct MemorySurface {
    features: Vec<Feature>,
    next_id: u64,
    events: VecDeque<SurfaceEvent>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn assign_id(&mut self) -> String {
        loop {
            self.next_id += 1;
            let id = format!("feature-{}", self.next_id);
            if !self.features.iter().any(|f| f.id == id) {
                return id;
            }
        }
    }

    /// Simulate the user drawing a line directly on the surface.
    pub fn draw_freehand(&mut self, points: Vec<Point>) -> String {
        let id = self.add(FeatureDraft::line(points));
        self.events.push_back(SurfaceEvent::Created(id.clone()));
        id
    }

    /// Simulate the user dragging vertices of an existing line.
    pub fn edit_vertices(&mut self, id: &str, points: Vec<Point>) -> bool {
        match self.features.iter_mut().find(|f| f.id == id) {
            Some(feature) => {
                feature.points = points;
                self.events.push_back(SurfaceEvent::Updated(id.to_string()));
                true
            }
            None => false,
        }
    }

    /// Simulate the user deleting a line with the surface's own tool.
    pub fn user_delete(&mut self, id: &str) -> bool {
        let removed = self.delete(id);
        if removed {
            self.events
                .push_back(SurfaceEvent::Deleted(vec![id.to_string()]));
        }
        removed
    }

    /// Take all pending events, oldest first.
    pub fn drain_events(&mut self) -> Vec<SurfaceEvent> {
        self.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl DrawSurface for MemorySurface {
    fn get_all(&self) -> Vec<Feature> {
        self.features.clone()
    }

    fn get(&self, id: &str) -> Option<Feature> {
        self.features.iter().find(|f| f.id == id).cloned()
    }

    fn add(&mut self, draft: FeatureDraft) -> String {
        let id = match draft.id {
            Some(id) => id,
            None => self.assign_id(),
        };
        let feature = Feature {
            id: id.clone(),
            points: draft.points,
            preview: draft.preview,
        };
        match self.features.iter_mut().find(|f| f.id == id) {
            Some(existing) => *existing = feature,
            None => self.features.push(feature),
        }
        id
    }

    fn delete(&mut self, id: &str) -> bool {
        let before = self.features.len();
        self.features.retain(|f| f.id != id);
        self.features.len() != before
    }

    fn delete_all(&mut self) {
        self.features.clear();
    }
}
