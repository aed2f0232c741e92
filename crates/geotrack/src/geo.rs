//! Great-circle distance.

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Haversine distance in meters between two lat/lng points given in degrees.
pub fn haversine_distance(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lng2 - lng1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_METERS * a.sqrt().atan2((1.0 - a).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_points_are_zero_apart() {
        assert_eq!(haversine_distance(-6.193125, 106.820233, -6.193125, 106.820233), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let mut rng = fastrand::Rng::with_seed(7);
        for _ in 0..500 {
            let (lat1, lng1) = (rng.f64() * 180.0 - 90.0, rng.f64() * 360.0 - 180.0);
            let (lat2, lng2) = (rng.f64() * 180.0 - 90.0, rng.f64() * 360.0 - 180.0);

            let ab = haversine_distance(lat1, lng1, lat2, lng2);
            let ba = haversine_distance(lat2, lng2, lat1, lng1);
            assert!((ab - ba).abs() < 1e-6, "{ab} != {ba}");
        }
    }

    #[test]
    fn pure_latitude_offset_is_arc_length() {
        // 0.0009 degrees of latitude is R * 0.0009 * pi / 180
        let d = haversine_distance(-6.193125, 106.820233, -6.193125 + 0.0009, 106.820233);
        assert!((d - 100.075).abs() < 0.01, "got {d}m");
    }

    #[test]
    fn jakarta_scenario_is_roughly_760m() {
        let d = haversine_distance(-6.193125, 106.820233, -6.2, 106.820233);
        assert!(d > 750.0 && d < 770.0, "got {d}m");
    }
}
