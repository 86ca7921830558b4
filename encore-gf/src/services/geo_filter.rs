//! Geospatial proximity filter
//!
//! Selects the users whose home coordinates fall within a radius of a venue,
//! using great-circle (haversine) distance on a spherical Earth.

use crate::error::{EngineError, EngineResult};
use crate::types::{GeoPoint, UserDirectory};
use encore_common::UserId;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Mean Earth radius in statute miles
pub const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Default search radius around a venue
pub const DEFAULT_RADIUS_MILES: f64 = 50.0;

/// User inside the radius, with their distance to the venue
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyUser {
    pub user_id: UserId,
    pub distance_miles: f64,
}

/// Great-circle distance between two points in miles
pub fn haversine_miles(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    // Clamp guards against h drifting just above 1.0 for antipodal points
    let c = 2.0 * h.sqrt().min(1.0).asin();

    EARTH_RADIUS_MILES * c
}

/// Users within `radius_miles` of `center`, nearest first (ties by user id)
///
/// Boundary is inclusive.
pub fn within_radius(
    center: GeoPoint,
    radius_miles: f64,
    located: &HashMap<UserId, GeoPoint>,
) -> EngineResult<Vec<NearbyUser>> {
    if !radius_miles.is_finite() || radius_miles < 0.0 {
        return Err(EngineError::Contract(format!(
            "Radius must be a finite, non-negative number of miles, got {}",
            radius_miles
        )));
    }

    let mut nearby: Vec<NearbyUser> = located
        .iter()
        .filter_map(|(user_id, point)| {
            let distance_miles = haversine_miles(center, *point);
            (distance_miles <= radius_miles).then(|| NearbyUser {
                user_id: user_id.clone(),
                distance_miles,
            })
        })
        .collect();

    nearby.sort_by(|a, b| {
        a.distance_miles
            .partial_cmp(&b.distance_miles)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });

    Ok(nearby)
}

/// Proximity filter backed by the user directory
pub struct GeoFilter {
    directory: Arc<dyn UserDirectory>,
}

impl GeoFilter {
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self { directory }
    }

    /// Candidates within `radius_miles` of `center`
    ///
    /// Candidates without stored coordinates are left out.
    pub async fn nearby(
        &self,
        center: GeoPoint,
        radius_miles: f64,
        candidates: &BTreeSet<UserId>,
    ) -> EngineResult<Vec<NearbyUser>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let located = self.directory.locations_of(candidates).await?;

        if located.len() < candidates.len() {
            tracing::debug!(
                candidates = candidates.len(),
                located = located.len(),
                "Skipping candidates without coordinates"
            );
        }

        within_radius(center, radius_miles, &located)
    }
}
