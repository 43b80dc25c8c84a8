//! Shared test doubles for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use futures::future::{BoxFuture, FutureExt};
use voyage_planner::{
    ContinuousClick, MemorySurface, PlannerConfig, Point, PointerInput, ReverseGeocoder,
    VoyagePlanner,
};

/// Geocoder that knows a fixed set of coordinates and counts its calls.
pub struct TableGeocoder {
    places: Vec<(Point, String)>,
    calls: AtomicU32,
}

impl TableGeocoder {
    pub fn new(places: &[((f64, f64), &str)]) -> Self {
        Self {
            places: places
                .iter()
                .map(|((lng, lat), name)| (Point::new(*lng, *lat), name.to_string()))
                .collect(),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ReverseGeocoder for TableGeocoder {
    fn resolve(&self, point: Point) -> BoxFuture<'_, Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = self
            .places
            .iter()
            .find(|(p, _)| {
                (p.longitude - point.longitude).abs() < 1e-9
                    && (p.latitude - point.latitude).abs() < 1e-9
            })
            .map(|(_, name)| name.clone());
        async move { name }.boxed()
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn click(lng: f64, lat: f64) -> PointerInput {
    PointerInput::at(Point::new(lng, lat))
}

pub fn desktop_planner() -> VoyagePlanner<MemorySurface> {
    VoyagePlanner::new(
        MemorySurface::new(),
        Box::new(ContinuousClick),
        PlannerConfig::default(),
        t0(),
    )
}

/// Click a leg from the current anchor (or `from` on an empty route) to `to`.
pub fn draw_leg(
    planner: &mut VoyagePlanner<MemorySurface>,
    from: (f64, f64),
    to: (f64, f64),
) -> String {
    planner.start_route_drawing();
    if planner.drawing().pending_points().is_empty() {
        planner.add_point(click(from.0, from.1));
    }
    planner.add_point(click(to.0, to.1));
    planner.finish_drawing().expect("leg should commit")
}
