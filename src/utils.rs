//! Small helpers shared across the crate: great-circle distance for
//! location constraints and endpoint string splitting for the
//! connection engine.

use crate::error::OefError;

/// Mean Earth radius in kilometres, as used by the haversine formula.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two (latitude, longitude) points,
/// in kilometres.
///
/// Inputs are degrees. This is the distance contract used by
/// `CLOSE_TO` / distance constraints: a point satisfies the constraint
/// when `haversine(center, point) <= radius_km`.
pub fn haversine(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Split a `"<host>:<port>"` url at the first `:`.
///
/// The host part may itself be empty; the port must parse as `u16`.
pub fn split_host_port(url: &str) -> Result<(String, u16), OefError> {
    let (host, port) = url
        .split_once(':')
        .ok_or_else(|| OefError::Connection(format!("url {:?} has no port", url)))?;
    let port = port
        .parse::<u16>()
        .map_err(|_| OefError::Connection(format!("url {:?} has a bad port", url)))?;
    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_zero_distance() {
        assert_eq!(haversine(52.2057092, 0.1183431, 52.2057092, 0.1183431), 0.0);
    }

    /// Cambridge to London is roughly 80 km as the crow flies.
    #[test]
    fn test_haversine_known_distance() {
        let d = haversine(52.2057092, 0.1183431, 51.5073219, -0.1276474);
        assert!((d - 79.0).abs() < 3.0, "unexpected distance: {}", d);
    }

    #[test]
    fn test_split_host_port() {
        assert_eq!(
            split_host_port("127.0.0.1:3333").unwrap(),
            ("127.0.0.1".to_string(), 3333)
        );
    }

    /// Only the first colon separates host from port.
    #[test]
    fn test_split_host_port_rejects_bad_input() {
        assert!(split_host_port("localhost").is_err());
        assert!(split_host_port("localhost:notaport").is_err());
        assert!(split_host_port("a:1:2").is_err());
    }
}
