use crate::area::{Admission, LatLng, LocalFrame};

/// Admits points strictly closer than `radius` meters to the origin
#[derive(Debug, Clone, Copy)]
pub struct Circle {
    frame: LocalFrame,
    radius: f64,
}

impl Circle {
    pub fn new(origin: LatLng, radius: f64) -> Self {
        Self {
            frame: LocalFrame::new(origin),
            radius,
        }
    }
}

impl Admission for Circle {
    fn admit(&self, location: &LatLng) -> bool {
        let (east, north) = self.frame.project(location);
        east.hypot(north) < self.radius
    }
}

/// Admits points inside a `width` x `height` meter box centered on the origin
#[derive(Debug, Clone, Copy)]
pub struct Rect {
    frame: LocalFrame,
    half_width: f64,
    half_height: f64,
}

impl Rect {
    pub fn new(origin: LatLng, width: f64, height: f64) -> Self {
        Self {
            frame: LocalFrame::new(origin),
            half_width: width / 2.0,
            half_height: height / 2.0,
        }
    }
}

impl Admission for Rect {
    fn admit(&self, location: &LatLng) -> bool {
        let (east, north) = self.frame.project(location);
        east.abs() < self.half_width && north.abs() < self.half_height
    }
}

/// Admits points inside a latitude/longitude rectangle
///
/// The top and left edges are inclusive, the bottom and right edges
/// exclusive, so adjacent boxes tile without overlap.
#[derive(Debug, Clone, Copy)]
pub struct GpsBox {
    top_left: LatLng,
    bottom_right: LatLng,
}

impl GpsBox {
    pub fn new(top_left: LatLng, bottom_right: LatLng) -> Self {
        Self {
            top_left,
            bottom_right,
        }
    }
}

impl Admission for GpsBox {
    fn admit(&self, location: &LatLng) -> bool {
        location.lat <= self.top_left.lat
            && location.lat > self.bottom_right.lat
            && location.lng >= self.top_left.lng
            && location.lng < self.bottom_right.lng
    }
}
