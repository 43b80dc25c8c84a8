//! HTTP providers for reverse geocoding and wind.
//!
//! - [`NominatimGeocoder`]: OpenStreetMap Nominatim `/reverse`
//! - [`OpenMeteoWind`]: Open-Meteo hourly forecast, wind at 10 m in knots
//!
//! Both degrade to `None` on any failure. A lookup that fails must never
//! abort a recompute or stall playback, so errors are logged and dropped.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;

use crate::error::{PlannerError, Result};
use crate::providers::{ReverseGeocoder, Wind, WindProvider};
use crate::Point;

const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";
const OPEN_METEO_URL: &str = "https://api.open-meteo.com";
const USER_AGENT: &str = concat!("voyage-planner/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| PlannerError::Http {
            message: format!("Failed to create HTTP client: {}", e),
            status_code: None,
        })
}

async fn get_json<T: serde::de::DeserializeOwned>(client: &Client, url: &str) -> Result<T> {
    let resp = client.get(url).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(PlannerError::Http {
            message: format!("HTTP {}", status),
            status_code: Some(status.as_u16()),
        });
    }
    Ok(resp.json::<T>().await?)
}

// ============================================================================
// Reverse geocoding
// ============================================================================

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    name: Option<String>,
    display_name: Option<String>,
    address: Option<ReverseAddress>,
}

#[derive(Debug, Deserialize)]
struct ReverseAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
}

/// Best short name from a Nominatim response: the feature's own name, then
/// the settlement, then the first part of the display name.
fn place_name(resp: ReverseResponse) -> Option<String> {
    let settlement = resp
        .address
        .and_then(|a| a.city.or(a.town).or(a.village));
    let from_display = resp
        .display_name
        .and_then(|d| d.split(',').next().map(|s| s.trim().to_string()));

    [resp.name, settlement, from_display]
        .into_iter()
        .flatten()
        .find(|n| !n.trim().is_empty())
}

/// Reverse geocoder backed by Nominatim.
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new() -> Result<Self> {
        Self::with_base_url(NOMINATIM_URL)
    }

    /// Point at a self-hosted Nominatim instance.
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn lookup(&self, point: Point) -> Result<Option<String>> {
        let url = format!(
            "{}/reverse?format=jsonv2&zoom=14&lat={}&lon={}",
            self.base_url, point.latitude, point.longitude
        );
        let resp: ReverseResponse = get_json(&self.client, &url).await?;
        Ok(place_name(resp))
    }
}

impl ReverseGeocoder for NominatimGeocoder {
    fn resolve(&self, point: Point) -> BoxFuture<'_, Option<String>> {
        async move {
            match self.lookup(point).await {
                Ok(name) => {
                    debug!("[Nominatim] {:?} -> {:?}", point, name);
                    name
                }
                Err(e) => {
                    warn!("[Nominatim] Lookup failed for {:?}: {}", point, e);
                    None
                }
            }
        }
        .boxed()
    }
}

// ============================================================================
// Wind
// ============================================================================

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    hourly: Option<HourlyWind>,
}

#[derive(Debug, Deserialize)]
struct HourlyWind {
    time: Vec<String>,
    wind_speed_10m: Vec<Option<f64>>,
    wind_direction_10m: Vec<Option<f64>>,
}

/// Reading for the hour nearest `at`, if one lies within the hour.
fn pick_hour(hourly: &HourlyWind, at: DateTime<Utc>) -> Option<Wind> {
    let mut best: Option<(i64, usize)> = None;
    for (i, text) in hourly.time.iter().enumerate() {
        let Ok(time) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M") else {
            continue;
        };
        let gap = (time.and_utc() - at).num_seconds().abs();
        if gap <= 3600 && best.map_or(true, |(g, _)| gap < g) {
            best = Some((gap, i));
        }
    }

    let (_, i) = best?;
    let speed_knots = (*hourly.wind_speed_10m.get(i)?)?;
    let direction_deg = (*hourly.wind_direction_10m.get(i)?)?;
    Some(Wind {
        speed_knots,
        direction_deg,
    })
}

/// Wind provider backed by the Open-Meteo forecast API.
pub struct OpenMeteoWind {
    client: Client,
    base_url: String,
}

impl OpenMeteoWind {
    pub fn new() -> Result<Self> {
        Self::with_base_url(OPEN_METEO_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn lookup(&self, point: Point, at: DateTime<Utc>) -> Result<Option<Wind>> {
        let day = at.format("%Y-%m-%d");
        let url = format!(
            "{}/v1/forecast?latitude={}&longitude={}\
             &hourly=wind_speed_10m,wind_direction_10m&wind_speed_unit=kn\
             &timezone=GMT&start_date={}&end_date={}",
            self.base_url, point.latitude, point.longitude, day, day
        );
        let resp: ForecastResponse = get_json(&self.client, &url).await?;
        Ok(resp.hourly.and_then(|h| pick_hour(&h, at)))
    }
}

impl WindProvider for OpenMeteoWind {
    fn query(&self, point: Point, at: DateTime<Utc>) -> BoxFuture<'_, Option<Wind>> {
        async move {
            match self.lookup(point, at).await {
                Ok(wind) => wind,
                Err(e) => {
                    warn!("[OpenMeteo] Wind lookup failed for {:?} at {}: {}", point, at, e);
                    None
                }
            }
        }
        .boxed()
    }
}
