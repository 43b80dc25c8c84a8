//! Map overlay labels for waypoints and legs.
//!
//! Projection is idempotent: sources are created once and updated in place,
//! and a source whose features did not change keeps its revision.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{json, Value};

use crate::geo_utils::midpoint;
use crate::segments::Segment;
use crate::{Geometry, Point};

pub const WAYPOINT_SOURCE: &str = "route-waypoints";
pub const LEG_SOURCE: &str = "route-legs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LabelKind {
    Waypoint,
    Leg,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelFeature {
    pub id: String,
    pub kind: LabelKind,
    pub position: Point,
    pub text: String,
}

/// A named overlay data source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlaySource {
    pub id: String,
    pub features: Vec<LabelFeature>,
    /// Bumped whenever the features change
    pub revision: u64,
}

impl OverlaySource {
    /// GeoJSON FeatureCollection of point labels.
    pub fn to_geojson(&self) -> Value {
        let features: Vec<Value> = self
            .features
            .iter()
            .map(|f| {
                json!({
                    "type": "Feature",
                    "id": f.id,
                    "geometry": {
                        "type": "Point",
                        "coordinates": [f.position.longitude, f.position.latitude],
                    },
                    "properties": { "kind": f.kind, "text": f.text },
                })
            })
            .collect();
        json!({ "type": "FeatureCollection", "features": features })
    }
}

/// "3h 05m" style duration.
pub fn format_hours(hours: f64) -> String {
    let total_minutes = (hours.max(0.0) * 60.0).round() as i64;
    format!("{}h {:02}m", total_minutes / 60, total_minutes % 60)
}

#[derive(Debug, Default)]
pub struct LabelProjector {
    sources: HashMap<String, OverlaySource>,
}

impl LabelProjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(&self, id: &str) -> Option<&OverlaySource> {
        self.sources.get(id)
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Rebuild labels from segments and their geometries.
    ///
    /// Returns `true` if any source changed.
    pub fn project(&mut self, segments: &[Segment], geometries: &[Geometry]) -> bool {
        let by_id: HashMap<&str, &Geometry> =
            geometries.iter().map(|g| (g.id.as_str(), g)).collect();

        let mut waypoints = Vec::new();
        let mut legs = Vec::new();

        for (i, segment) in segments.iter().enumerate() {
            let Some(geometry) = by_id.get(segment.id.as_str()) else {
                continue;
            };

            if i == 0 {
                if let Some(start) = geometry.start() {
                    waypoints.push(LabelFeature {
                        id: format!("{}:start", segment.id),
                        kind: LabelKind::Waypoint,
                        position: start,
                        text: segment.start_name.clone(),
                    });
                }
            }

            if let Some(end) = geometry.end() {
                waypoints.push(LabelFeature {
                    id: format!("{}:end", segment.id),
                    kind: LabelKind::Waypoint,
                    position: end,
                    text: format!(
                        "{}\nETA {}",
                        segment.end_name,
                        segment.arrival_time.format("%d %b %H:%M")
                    ),
                });
            }

            if let Some(mid) = midpoint(&geometry.points) {
                legs.push(LabelFeature {
                    id: segment.id.clone(),
                    kind: LabelKind::Leg,
                    position: mid,
                    text: format!(
                        "{:.1} NM · {:.1} kn · {}",
                        segment.distance_nm,
                        segment.speed,
                        format_hours(segment.time_hours)
                    ),
                });
            }
        }

        let waypoints_changed = self.upsert(WAYPOINT_SOURCE, waypoints);
        let legs_changed = self.upsert(LEG_SOURCE, legs);
        waypoints_changed || legs_changed
    }

    /// Empty every source without removing it.
    pub fn clear(&mut self) -> bool {
        let ids: Vec<String> = self.sources.keys().cloned().collect();
        let mut changed = false;
        for id in ids {
            changed |= self.upsert(&id, Vec::new());
        }
        changed
    }

    fn upsert(&mut self, id: &str, features: Vec<LabelFeature>) -> bool {
        match self.sources.get_mut(id) {
            Some(source) if source.features == features => false,
            Some(source) => {
                source.features = features;
                source.revision += 1;
                true
            }
            None => {
                self.sources.insert(
                    id.to_string(),
                    OverlaySource {
                        id: id.to_string(),
                        features,
                        revision: 1,
                    },
                );
                true
            }
        }
    }
}
