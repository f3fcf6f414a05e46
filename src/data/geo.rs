use std::f64::consts::PI;
use std::ops::RangeInclusive;

/// Web Mercator world size in pixels at zoom 0.
pub const TILE_SIZE: f64 = 512.0;

/// Latitude limit of the Web Mercator projection.
pub const MAX_MERCATOR_LAT: f64 = 85.051129;

/// Zoom range the map library allows by default.
pub const MIN_ZOOM: f64 = 0.0;
pub const MAX_ZOOM: f64 = 22.0;

/// WGS84 coordinates in degrees. Longitudes are not wrapped, so a value of
/// 190 denotes the copy of -170 one world to the east.
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone, Copy, PartialEq)]
#[archive(check_bytes)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub fn new(lng: f64, lat: f64) -> Self {
        LngLat { lng, lat }
    }

    /// Shifts the longitude by whole turns until it lies within 180 degrees
    /// of `pointer_lng`, so a popup lands on the copy of the point the
    /// pointer is over when the world repeats horizontally.
    pub fn nearest_copy_to(self, pointer_lng: f64) -> LngLat {
        let mut lng = self.lng;
        while (pointer_lng - lng).abs() > 180.0 {
            lng += if pointer_lng > lng { 360.0 } else { -360.0 };
        }
        LngLat { lng, lat: self.lat }
    }
}

impl From<[f64; 2]> for LngLat {
    fn from(value: [f64; 2]) -> Self {
        LngLat::new(value[0], value[1])
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub fn new(x: f64, y: f64) -> Self {
        ScreenPoint { x, y }
    }

    pub fn distance_to(&self, other: &ScreenPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Spherical Web Mercator camera looking at `center`, with the viewport
/// origin in the top left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WebMercator {
    pub center: LngLat,
    pub zoom: f64,
    pub width: f64,
    pub height: f64,
}

impl WebMercator {
    /// `zoom` is clamped to `MIN_ZOOM..=MAX_ZOOM`.
    pub fn new(center: LngLat, zoom: f64, width: f64, height: f64) -> Self {
        WebMercator { center, zoom: zoom.clamp(MIN_ZOOM, MAX_ZOOM), width, height }
    }

    /// Whether `point` lies on the canvas.
    pub fn contains(&self, point: &ScreenPoint) -> bool {
        (0.0..=self.width).contains(&point.x) && (0.0..=self.height).contains(&point.y)
    }

    pub fn world_size(&self) -> f64 {
        TILE_SIZE * 2f64.powf(self.zoom)
    }

    fn world_x(&self, lng: f64) -> f64 {
        (180.0 + lng) / 360.0 * self.world_size()
    }

    fn world_y(&self, lat: f64) -> f64 {
        let lat = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
        let merc = 180.0 / PI * (PI / 4.0 + lat * PI / 360.0).tan().ln();
        (180.0 - merc) / 360.0 * self.world_size()
    }

    pub fn project(&self, coords: &LngLat) -> ScreenPoint {
        ScreenPoint {
            x: self.world_x(coords.lng) - self.world_x(self.center.lng) + self.width / 2.0,
            y: self.world_y(coords.lat) - self.world_y(self.center.lat) + self.height / 2.0,
        }
    }

    /// Inverse of [`WebMercator::project`]. The longitude is left unwrapped.
    pub fn unproject(&self, point: &ScreenPoint) -> LngLat {
        let x = point.x - self.width / 2.0 + self.world_x(self.center.lng);
        let y = point.y - self.height / 2.0 + self.world_y(self.center.lat);
        let lng = x / self.world_size() * 360.0 - 180.0;
        let merc = 180.0 - y / self.world_size() * 360.0;
        let lat = 360.0 / PI * (merc * PI / 180.0).exp().atan() - 90.0;
        LngLat { lng, lat }
    }

    /// Whole-world offsets (in turns of 360 degrees) with at least one pixel
    /// inside the viewport grown by `margin_px` on each side.
    pub fn visible_world_copies(&self, margin_px: f64) -> RangeInclusive<i64> {
        let left = self.unproject(&ScreenPoint::new(-margin_px, 0.0)).lng;
        let right = self.unproject(&ScreenPoint::new(self.width + margin_px, 0.0)).lng;
        let first = ((left - 180.0) / 360.0).ceil() as i64;
        let last = ((right + 180.0) / 360.0).floor() as i64;
        first..=last.max(first)
    }
}
