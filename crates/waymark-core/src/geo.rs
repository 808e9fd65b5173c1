//! Great-circle distance on a spherical Earth.
//!
//! The tracker compares distances in kilometres against the proximity
//! threshold. The haversine formula is accurate to well under a metre at
//! the tens-of-metres scale the threshold operates at.

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two coordinates, in kilometres.
///
/// Inputs are decimal degrees. Non-finite input yields a non-finite
/// result, which compares as "not inside" against any threshold.
#[allow(clippy::similar_names)]
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();

    let half_chord = (phi1.cos() * phi2.cos())
        .mul_add((d_lon / 2.0).sin().powi(2), (d_lat / 2.0).sin().powi(2));
    // Rounding can push the chord a hair past 1.0 for antipodal points.
    let half_chord = half_chord.clamp(0.0, 1.0);
    let angle = 2.0 * half_chord.sqrt().atan2((1.0 - half_chord).sqrt());
    EARTH_RADIUS_KM * angle
}

/// Coordinate that lies `meters` due north of `(latitude, longitude)`.
///
/// Handy for building fixes at a known distance from a marker.
pub fn offset_north(latitude: f64, longitude: f64, meters: f64) -> (f64, f64) {
    let delta_deg = (meters / 1000.0 / EARTH_RADIUS_KM).to_degrees();
    (latitude + delta_deg, longitude)
}
