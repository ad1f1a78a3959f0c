//! Projection conversions, bounding boxes and great-circle distances
//!
//! The heatmap server stores and answers in geographic coordinates (EPSG:4326),
//! while the slippy map displays Web Mercator (EPSG:3857). Every extent carries
//! the projection it is expressed in, so conversions are explicit at the call site.
//!
//! Antimeridian crossing is not normalized: an extent whose west edge lies east
//! of its east edge is rejected instead of being split.

use crate::{PointSample, Result, SyncError};
use geo::{Coord, Point, Rect};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Web Mercator bounds in meters (EPSG:3857)
pub const EARTH_MERCATOR_MAX: f64 = 20037508.34;
pub const EARTH_MERCATOR_MIN: f64 = -20037508.34;
pub const EARTH_SIZE_METERS: f64 = EARTH_MERCATOR_MAX - EARTH_MERCATOR_MIN;

/// Maximum latitude that can be represented in Web Mercator
pub const MAX_LATITUDE: f64 = 85.05112878;

/// Earth radius used for great-circle distances, in meters
pub const EARTH_RADIUS_METERS: f64 = 6371000.785;

/// Approximate length of one degree of latitude, in meters
pub const METERS_PER_DEGREE_LATITUDE: f64 = 111694.0;

/// Edge length of a map tile in pixels
pub const TILE_SIZE_PX: f64 = 256.0;

const LON_TO_X_FACTOR: f64 = EARTH_MERCATOR_MAX / 180.0;
const Y_FACTOR: f64 = EARTH_MERCATOR_MAX / std::f64::consts::PI;
const X_TO_LON_FACTOR: f64 = 180.0 / EARTH_MERCATOR_MAX;
const Y_TO_LAT_FACTOR: f64 = std::f64::consts::PI / EARTH_MERCATOR_MAX;

/// Coordinate reference system of an [`Extent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Projection {
    /// Longitude/latitude in degrees (EPSG:4326), the data projection
    Geographic,
    /// Web Mercator meters (EPSG:3857), the display projection
    WebMercator,
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Geographic => f.write_str("EPSG:4326"),
            Self::WebMercator => f.write_str("EPSG:3857"),
        }
    }
}

/// Convert WGS84 (lat, lon) to Web Mercator (x, y) in meters
///
/// Latitude is clamped to the representable Web Mercator range.
#[inline(always)]
pub fn wgs84_to_mercator(lat: f64, lon: f64) -> Point<f64> {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    let x = lon * LON_TO_X_FACTOR;
    let lat_rad = lat.to_radians();
    let y = (lat_rad.tan() + (1.0 / lat_rad.cos())).ln() * Y_FACTOR;
    Point::new(x, y)
}

/// Convert Web Mercator (x, y) in meters to WGS84, returned as `(lat, lon)`
#[inline(always)]
pub fn mercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lon = x * X_TO_LON_FACTOR;
    let lat =
        (std::f64::consts::PI / 2.0 - 2.0 * ((-y * Y_TO_LAT_FACTOR).exp()).atan()).to_degrees();
    (lat, lon)
}

/// An axis-aligned box in a stated projection, plus the zoom level it was observed at
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
    pub projection: Projection,
    pub zoom: u8,
}

impl Extent {
    /// Create an extent, rejecting inverted or non-finite edges
    pub fn new(
        west: f64,
        south: f64,
        east: f64,
        north: f64,
        projection: Projection,
        zoom: u8,
    ) -> Result<Self> {
        if ![west, south, east, north].iter().all(|v| v.is_finite()) {
            return Err(SyncError::InvalidExtent(format!(
                "non-finite edge in ({west}, {south}, {east}, {north})"
            )));
        }
        if west > east || south > north {
            return Err(SyncError::InvalidExtent(format!(
                "inverted edges in ({west}, {south}, {east}, {north})"
            )));
        }
        Ok(Self {
            west,
            south,
            east,
            north,
            projection,
            zoom,
        })
    }

    /// Build an extent from a `geo::Rect` (which is always normalized)
    pub fn from_rect(rect: Rect<f64>, projection: Projection, zoom: u8) -> Self {
        Self {
            west: rect.min().x,
            south: rect.min().y,
            east: rect.max().x,
            north: rect.max().y,
            projection,
            zoom,
        }
    }

    #[inline]
    pub fn as_rect(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.west,
                y: self.south,
            },
            Coord {
                x: self.east,
                y: self.north,
            },
        )
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Center point as (x, y) in the extent's own projection
    #[inline]
    pub fn center(&self) -> Point<f64> {
        self.as_rect().center().into()
    }

    #[inline]
    pub fn with_zoom(mut self, zoom: u8) -> Self {
        self.zoom = zoom;
        self
    }

    /// Express this extent in the geographic data projection
    pub fn to_data_projection(&self) -> Extent {
        match self.projection {
            Projection::Geographic => *self,
            Projection::WebMercator => {
                let (south, west) = mercator_to_wgs84(self.west, self.south);
                let (north, east) = mercator_to_wgs84(self.east, self.north);
                Extent {
                    west,
                    south,
                    east,
                    north,
                    projection: Projection::Geographic,
                    zoom: self.zoom,
                }
            }
        }
    }

    /// Express this extent in the Web Mercator display projection
    pub fn to_display_projection(&self) -> Extent {
        match self.projection {
            Projection::WebMercator => *self,
            Projection::Geographic => {
                let min = wgs84_to_mercator(self.south, self.west);
                let max = wgs84_to_mercator(self.north, self.east);
                Extent {
                    west: min.x(),
                    south: min.y(),
                    east: max.x(),
                    north: max.y(),
                    projection: Projection::WebMercator,
                    zoom: self.zoom,
                }
            }
        }
    }

    /// Render as the `"w,s,e,n"` string the server expects, in the data projection
    pub fn to_bbox_string(&self) -> String {
        let data = self.to_data_projection();
        format!(
            "{},{},{},{}",
            data.west, data.south, data.east, data.north
        )
    }

    /// Parse a `"w,s,e,n"` string in the geographic projection
    pub fn parse_bbox(bbox: &str, zoom: u8) -> Result<Self> {
        let values: Vec<f64> = bbox
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| SyncError::InvalidExtent(format!("bad bbox '{bbox}': {e}")))?;
        match values.as_slice() {
            [west, south, east, north] => {
                Self::new(*west, *south, *east, *north, Projection::Geographic, zoom)
            }
            _ => Err(SyncError::InvalidExtent(format!(
                "bbox '{bbox}' must have 4 components"
            ))),
        }
    }
}

/// Tight geographic box over the samples, or `None` for an empty slice
pub fn bounding_box(samples: &[PointSample], zoom: u8) -> Option<Extent> {
    let first = samples.first()?;
    let mut rect = Rect::new(
        Coord {
            x: first.lon,
            y: first.lat,
        },
        Coord {
            x: first.lon,
            y: first.lat,
        },
    );
    for sample in &samples[1..] {
        let min = rect.min();
        let max = rect.max();
        rect = Rect::new(
            Coord {
                x: min.x.min(sample.lon),
                y: min.y.min(sample.lat),
            },
            Coord {
                x: max.x.max(sample.lon),
                y: max.y.max(sample.lat),
            },
        );
    }
    Some(Extent::from_rect(rect, Projection::Geographic, zoom))
}

/// Great-circle distance in meters between two `(lat, lon)` pairs in degrees
///
/// Haversine formula on a sphere of radius [`EARTH_RADIUS_METERS`].
pub fn great_circle_distance_meters(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat0, lon0) = a;
    let (lat1, lon1) = b;
    let d_lat = (lat1 - lat0).to_radians();
    let d_lon = (lon1 - lon0).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + lat0.to_radians().cos() * lat1.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push h a hair above 1 for antipodal points
    2.0 * EARTH_RADIUS_METERS * h.clamp(0.0, 1.0).sqrt().asin()
}

/// Convert a radius in meters to degrees of latitude
#[inline]
pub fn meters_to_latitude_degrees(meters: f64) -> f64 {
    meters / METERS_PER_DEGREE_LATITUDE
}

/// Convert a span of latitude degrees to meters along a meridian
#[inline]
pub fn latitude_degrees_to_meters(degrees: f64) -> f64 {
    great_circle_distance_meters((0.0, 0.0), (degrees, 0.0))
}

/// Web Mercator meters per pixel at an integer zoom level
#[inline]
pub fn resolution_at_zoom(zoom: u8) -> f64 {
    EARTH_SIZE_METERS / (TILE_SIZE_PX * 2f64.powi(zoom as i32))
}

/// The geographic extent a viewport of `viewport_px` pixels shows at `zoom`,
/// centered on `center` given as a geographic `(lon, lat)` point
pub fn extent_at_zoom(center: Point<f64>, zoom: u8, viewport_px: (f64, f64)) -> Extent {
    let center = wgs84_to_mercator(center.y(), center.x());
    let resolution = resolution_at_zoom(zoom);
    let half_w = viewport_px.0 * resolution / 2.0;
    let half_h = viewport_px.1 * resolution / 2.0;
    let clamp = |v: f64| v.clamp(EARTH_MERCATOR_MIN, EARTH_MERCATOR_MAX);
    let display = Extent {
        west: clamp(center.x() - half_w),
        south: clamp(center.y() - half_h),
        east: clamp(center.x() + half_w),
        north: clamp(center.y() + half_h),
        projection: Projection::WebMercator,
        zoom,
    };
    display.to_data_projection()
}

/// Largest zoom in `[min_zoom, max_zoom]` at which `extent` fits in the viewport
///
/// Falls back to `min_zoom` when the extent does not fit even there.
pub fn zoom_to_fit(extent: &Extent, viewport_px: (f64, f64), min_zoom: u8, max_zoom: u8) -> u8 {
    let display = extent.to_display_projection();
    let mut best = min_zoom;
    for zoom in min_zoom..=max_zoom {
        let resolution = resolution_at_zoom(zoom);
        if display.width() / resolution <= viewport_px.0
            && display.height() / resolution <= viewport_px.1
        {
            best = zoom;
        } else {
            break;
        }
    }
    best
}
