//! # Saved Routes
//!
//! The bundle a saved route round-trips through: metadata, the segment list
//! and the raw geometry, plus an optional SQLite store.
//!
//! A bundle is validated in full before anything is written or restored,
//! so a failed save or load never leaves partial state behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OptionExt, PlannerError, Result};
use crate::segments::Segment;
use crate::{Geometry, Point};

#[cfg(feature = "persistence")]
use chrono::SecondsFormat;

#[cfg(feature = "persistence")]
use log::info;

#[cfg(feature = "persistence")]
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};

/// Map camera at save time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapViewport {
    pub center: Point,
    pub zoom: f64,
    #[serde(default)]
    pub bearing: f64,
}

/// A persisted route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedRoute {
    pub id: String,
    pub name: String,
    pub saved_at: DateTime<Utc>,
    /// Voyage departure time
    pub start_date: DateTime<Utc>,
    /// Speed for new legs, in knots
    pub default_speed: f64,
    pub segments: Vec<Segment>,
    pub raw_geometry: Vec<Geometry>,
    #[serde(default)]
    pub map_viewport: Option<MapViewport>,
}

impl SavedRoute {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse and validate a saved route.
    pub fn from_json(json: &str) -> Result<Self> {
        let route: SavedRoute = serde_json::from_str(json)?;
        route.validate()?;
        Ok(route)
    }

    /// Every segment must have a geometry of at least two points.
    pub fn validate(&self) -> Result<()> {
        for segment in &self.segments {
            let geometry = self
                .raw_geometry
                .iter()
                .find(|g| g.id == segment.id)
                .ok_or_else(|| PlannerError::Persistence {
                    message: format!(
                        "route '{}' has no geometry for segment '{}'",
                        self.id, segment.id
                    ),
                })?;
            Some(geometry)
                .filter(|g| g.points.len() >= 2)
                .ok_or_insufficient_points(&geometry.id, geometry.points.len(), 2)?;
        }
        Ok(())
    }

    pub fn total_distance_nm(&self) -> f64 {
        self.segments.iter().map(|s| s.distance_nm).sum()
    }
}

// ============================================================================
// SQLite store
// ============================================================================

/// Listing entry for a saved route.
#[cfg(feature = "persistence")]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedRouteSummary {
    pub id: String,
    pub name: String,
    pub saved_at: DateTime<Utc>,
    pub start_date: DateTime<Utc>,
    pub leg_count: u32,
    pub total_distance_nm: f64,
}

/// SQLite-backed storage for saved routes.
#[cfg(feature = "persistence")]
pub struct RouteStore {
    db: Connection,
}

#[cfg(feature = "persistence")]
fn to_sql_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(feature = "persistence")]
fn from_sql_time(idx: usize, text: &str) -> SqlResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[cfg(feature = "persistence")]
impl RouteStore {
    /// Open (or create) a store at `db_path`.
    pub fn open(db_path: &str) -> Result<Self> {
        let db = Connection::open(db_path)?;
        Self::init_schema(&db)?;
        info!("[RouteStore] Opened {}", db_path);
        Ok(Self { db })
    }

    pub fn in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        Self::init_schema(&db)?;
        Ok(Self { db })
    }

    fn init_schema(conn: &Connection) -> SqlResult<()> {
        conn.execute_batch(
            r#"
            -- Full route bundle as JSON, listing columns alongside
            CREATE TABLE IF NOT EXISTS saved_routes (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                saved_at TEXT NOT NULL,
                start_date TEXT NOT NULL,
                leg_count INTEGER NOT NULL,
                total_distance_nm REAL NOT NULL,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_saved_routes_saved_at ON saved_routes(saved_at);
        "#,
        )
    }

    /// Insert or replace a route.
    pub fn save(&self, route: &SavedRoute) -> Result<()> {
        route.validate()?;
        let data = route.to_json()?;
        self.db.execute(
            "INSERT OR REPLACE INTO saved_routes
                (id, name, saved_at, start_date, leg_count, total_distance_nm, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                route.id,
                route.name,
                to_sql_time(&route.saved_at),
                to_sql_time(&route.start_date),
                route.segments.len() as i64,
                route.total_distance_nm(),
                data,
            ],
        )?;
        info!(
            "[RouteStore] Saved route '{}' ({} legs)",
            route.name,
            route.segments.len()
        );
        Ok(())
    }

    pub fn load(&self, id: &str) -> Result<Option<SavedRoute>> {
        let data: Option<String> = self
            .db
            .query_row(
                "SELECT data FROM saved_routes WHERE id = ?",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        match data {
            Some(json) => Ok(Some(SavedRoute::from_json(&json)?)),
            None => Ok(None),
        }
    }

    /// All routes, most recently saved first.
    pub fn list(&self) -> Result<Vec<SavedRouteSummary>> {
        let mut stmt = self.db.prepare(
            "SELECT id, name, saved_at, start_date, leg_count, total_distance_nm
             FROM saved_routes ORDER BY saved_at DESC",
        )?;

        let summaries = stmt
            .query_map([], |row| {
                let saved_at: String = row.get(2)?;
                let start_date: String = row.get(3)?;
                Ok(SavedRouteSummary {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    saved_at: from_sql_time(2, &saved_at)?,
                    start_date: from_sql_time(3, &start_date)?,
                    leg_count: row.get::<_, i64>(4)? as u32,
                    total_distance_nm: row.get(5)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(summaries)
    }

    /// Returns `false` if no such route existed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let removed = self
            .db
            .execute("DELETE FROM saved_routes WHERE id = ?", params![id])?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> SavedRoute {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut segments = vec![
            Segment::new("a", 12.345, 7.0).with_names("Point 1", "Palma"),
            Segment::new("b", 3.3, 4.5).with_names("Palma", "Point 2").with_stop(1.25),
        ];
        crate::segments::chain_arrivals(&mut segments, start);
        SavedRoute {
            id: "route-1".to_string(),
            name: "Balearics".to_string(),
            saved_at: Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap(),
            start_date: start,
            default_speed: 6.0,
            segments,
            raw_geometry: vec![
                Geometry::new("a", vec![Point::new(2.5, 39.4), Point::new(2.6, 39.5)]),
                Geometry::new("b", vec![Point::new(2.6, 39.5), Point::new(2.7, 39.6)]),
            ],
            map_viewport: Some(MapViewport {
                center: Point::new(2.6, 39.5),
                zoom: 9.0,
                bearing: 0.0,
            }),
        }
    }

    #[test]
    fn test_json_round_trip_is_exact() {
        let route = sample();
        let json = route.to_json().unwrap();
        assert!(json.contains("\"arrivalTime\""));
        assert!(json.contains("\"rawGeometry\""));
        let back = SavedRoute::from_json(&json).unwrap();
        assert_eq!(back, route);
    }

    #[test]
    fn test_missing_geometry_is_rejected() {
        let mut route = sample();
        route.raw_geometry.pop();
        let json = serde_json::to_string(&route).unwrap();
        assert!(matches!(
            SavedRoute::from_json(&json),
            Err(PlannerError::Persistence { .. })
        ));
    }

    #[test]
    fn test_short_geometry_is_rejected() {
        let mut route = sample();
        route.raw_geometry[1].points.truncate(1);
        assert!(matches!(
            route.validate(),
            Err(PlannerError::InsufficientPoints { point_count: 1, minimum_required: 2, .. })
        ));
    }

    #[test]
    fn test_corrupt_json_is_an_error() {
        assert!(matches!(
            SavedRoute::from_json("{\"id\": 3"),
            Err(PlannerError::Serialization(_))
        ));
    }
}
