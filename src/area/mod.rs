//! Geographic area handling for Panocrawl
//!
//! This module provides coordinates, a local metric projection, and the
//! admission predicates that decide whether a panorama lies inside the
//! crawled area.

mod shapes;

use crate::config::AreaConfig;
use serde::Deserialize;

pub use shapes::{Circle, GpsBox, Rect};

/// Mean Earth radius in meters
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// A WGS84 latitude/longitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Returns true if both components are finite and within WGS84 bounds
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

impl std::fmt::Display for LatLng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}, {:.6}", self.lat, self.lng)
    }
}

/// A flat east/north plane tangent to the Earth at an origin
///
/// Distances computed in this frame are in meters and stay accurate for
/// areas of a few kilometers around the origin, which is the scale a
/// street-level crawl covers.
#[derive(Debug, Clone, Copy)]
pub struct LocalFrame {
    origin: LatLng,
    meters_per_deg_lat: f64,
    meters_per_deg_lng: f64,
}

impl LocalFrame {
    pub fn new(origin: LatLng) -> Self {
        let meters_per_deg_lat = EARTH_RADIUS_M.to_radians();
        let meters_per_deg_lng = meters_per_deg_lat * origin.lat.to_radians().cos();
        Self {
            origin,
            meters_per_deg_lat,
            meters_per_deg_lng,
        }
    }

    /// Projects a point to (east, north) meters relative to the origin
    pub fn project(&self, point: &LatLng) -> (f64, f64) {
        let mut dlng = point.lng - self.origin.lng;
        // Take the short way around the antimeridian
        if dlng > 180.0 {
            dlng -= 360.0;
        } else if dlng < -180.0 {
            dlng += 360.0;
        }
        let east = dlng * self.meters_per_deg_lng;
        let north = (point.lat - self.origin.lat) * self.meters_per_deg_lat;
        (east, north)
    }
}

/// Decides whether a panorama location belongs to the crawled area
///
/// Implementations must be pure: the same location always yields the same
/// answer, and calls from any number of workers may run concurrently.
pub trait Admission: Send + Sync {
    fn admit(&self, location: &LatLng) -> bool;
}

impl<F> Admission for F
where
    F: Fn(&LatLng) -> bool + Send + Sync,
{
    fn admit(&self, location: &LatLng) -> bool {
        self(location)
    }
}

/// Builds the admission predicate described by an area configuration
pub fn admission_from_config(area: &AreaConfig) -> Box<dyn Admission> {
    match *area {
        AreaConfig::Circle { origin, radius } => Box::new(Circle::new(origin, radius)),
        AreaConfig::Box {
            origin,
            width,
            height,
        } => Box::new(Rect::new(origin, width, height.unwrap_or(width))),
        AreaConfig::GpsBox {
            top_left,
            bottom_right,
        } => Box::new(GpsBox::new(top_left, bottom_right)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_origin_is_zero() {
        let frame = LocalFrame::new(LatLng::new(50.0833, 14.4167));
        let (e, n) = frame.project(&LatLng::new(50.0833, 14.4167));
        assert_eq!(e, 0.0);
        assert_eq!(n, 0.0);
    }

    #[test]
    fn test_project_one_degree_north() {
        let frame = LocalFrame::new(LatLng::new(0.0, 0.0));
        let (_, n) = frame.project(&LatLng::new(1.0, 0.0));
        // One degree of latitude is roughly 111.2 km
        assert!((n - 111_195.0).abs() < 50.0, "got {}", n);
    }

    #[test]
    fn test_longitude_shrinks_with_latitude() {
        let equator = LocalFrame::new(LatLng::new(0.0, 0.0));
        let north = LocalFrame::new(LatLng::new(60.0, 0.0));
        let (e0, _) = equator.project(&LatLng::new(0.0, 0.01));
        let (e60, _) = north.project(&LatLng::new(60.0, 0.01));
        assert!((e60 / e0 - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_project_across_antimeridian() {
        let frame = LocalFrame::new(LatLng::new(0.0, 179.999));
        let (e, _) = frame.project(&LatLng::new(0.0, -179.999));
        assert!(e > 0.0 && e < 500.0, "got {}", e);
    }

    #[test]
    fn test_latlng_validity() {
        assert!(LatLng::new(50.0, 14.4).is_valid());
        assert!(!LatLng::new(91.0, 0.0).is_valid());
        assert!(!LatLng::new(0.0, f64::NAN).is_valid());
    }

    #[test]
    fn test_closure_is_admission() {
        let north_only = |p: &LatLng| p.lat > 0.0;
        assert!(north_only.admit(&LatLng::new(1.0, 0.0)));
        assert!(!north_only.admit(&LatLng::new(-1.0, 0.0)));
    }

    #[test]
    fn test_admission_from_config() {
        let area = AreaConfig::Circle {
            origin: LatLng::new(50.0, 14.0),
            radius: 100.0,
        };
        let admission = admission_from_config(&area);
        assert!(admission.admit(&LatLng::new(50.0, 14.0)));
        assert!(!admission.admit(&LatLng::new(50.01, 14.0)));
    }
}
