//! Geographic utilities: great-circle distances and walking along a polyline.

use geo::{Distance, Haversine};

use crate::Point;

/// Meters in one international nautical mile.
pub const METERS_PER_NM: f64 = 1852.0;

/// Great-circle distance between two points in meters.
pub fn haversine_distance(p1: &Point, p2: &Point) -> f64 {
    Haversine::distance(geo::Point::from(*p1), geo::Point::from(*p2))
}

/// Total great-circle length of a path in meters.
pub fn polyline_length(points: &[Point]) -> f64 {
    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Total great-circle length of a path in nautical miles.
pub fn polyline_length_nm(points: &[Point]) -> f64 {
    polyline_length(points) / METERS_PER_NM
}

/// Whether two points lie within `threshold_m` meters of each other.
pub fn is_near(p1: &Point, p2: &Point, threshold_m: f64) -> bool {
    haversine_distance(p1, p2) <= threshold_m
}

/// Point at `fraction` (0..=1) of the path's length.
///
/// Vertices are weighted by great-circle length; between two vertices the
/// position is interpolated linearly in lon/lat. Returns `None` for an
/// empty path.
pub fn interpolate_along(points: &[Point], fraction: f64) -> Option<Point> {
    let first = *points.first()?;
    let last = *points.last()?;
    if !fraction.is_finite() || fraction <= 0.0 || points.len() < 2 {
        return Some(first);
    }
    if fraction >= 1.0 {
        return Some(last);
    }

    let total = polyline_length(points);
    if total == 0.0 {
        return Some(first);
    }

    let target = total * fraction;
    let mut accumulated = 0.0;
    for w in points.windows(2) {
        let seg = haversine_distance(&w[0], &w[1]);
        if seg > 0.0 && accumulated + seg >= target {
            let ratio = (target - accumulated) / seg;
            return Some(Point::new(
                w[0].longitude + ratio * (w[1].longitude - w[0].longitude),
                w[0].latitude + ratio * (w[1].latitude - w[0].latitude),
            ));
        }
        accumulated += seg;
    }

    Some(last)
}

/// Midpoint of a path by length.
pub fn midpoint(points: &[Point]) -> Option<Point> {
    interpolate_along(points, 0.5)
}
