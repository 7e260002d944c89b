use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

/// Pixel value type for all map data
pub type MapReal = f64;

/// 2D map data array (y x x)
pub type MapArray = Array2<MapReal>;

/// 3D stack of map data (frame x y x x)
pub type MapCube = Array3<MapReal>;

pub const ARCSEC_PER_DEGREE: f64 = 3600.0;

/// Nominal photospheric radius in metres, used when a header carries no `rsun_ref`
pub const RSUN_REF_METERS: f64 = 695_700_000.0;

/// One astronomical unit in metres
pub const AU_METERS: f64 = 149_597_870_700.0;

/// A position in a physical coordinate frame.
///
/// Both components are stored in degrees. For helioprojective frames `lon` is
/// Tx (solar-x) and `lat` is Ty (solar-y); for heliographic frames they are
/// longitude and latitude on the solar surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldCoordinate {
    pub lon: f64,
    pub lat: f64,
}

impl WorldCoordinate {
    pub fn from_degrees(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    pub fn from_arcsec(lon: f64, lat: f64) -> Self {
        Self {
            lon: lon / ARCSEC_PER_DEGREE,
            lat: lat / ARCSEC_PER_DEGREE,
        }
    }

    pub fn lon_arcsec(&self) -> f64 {
        self.lon * ARCSEC_PER_DEGREE
    }

    pub fn lat_arcsec(&self) -> f64 {
        self.lat * ARCSEC_PER_DEGREE
    }

    pub fn is_finite(&self) -> bool {
        self.lon.is_finite() && self.lat.is_finite()
    }
}

impl std::fmt::Display for WorldCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.3}\", {:.3}\")", self.lon_arcsec(), self.lat_arcsec())
    }
}

/// 0-based pixel position, x = column, y = row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelCoordinate {
    pub x: f64,
    pub y: f64,
}

impl PixelCoordinate {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Angular size of one pixel along each array axis, in degrees per pixel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelScale {
    pub x: f64,
    pub y: f64,
}

impl PixelScale {
    pub fn x_arcsec(&self) -> f64 {
        self.x * ARCSEC_PER_DEGREE
    }

    pub fn y_arcsec(&self) -> f64 {
        self.y * ARCSEC_PER_DEGREE
    }
}

/// Interpolation kernel used when pixel data is resampled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interpolation {
    Nearest,
    Bilinear,
}

impl Default for Interpolation {
    fn default() -> Self {
        Interpolation::Bilinear
    }
}

/// How a block of pixels collapses into one superpixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregation {
    Sum,
    Mean,
}

impl Default for Aggregation {
    fn default() -> Self {
        Aggregation::Sum
    }
}

impl std::fmt::Display for Aggregation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Aggregation::Sum => write!(f, "sum"),
            Aggregation::Mean => write!(f, "mean"),
        }
    }
}

/// Error types for map construction and manipulation
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("Missing metadata: no value found for '{field}'")]
    MissingMetadata { field: String },

    #[error("Invalid metadata: '{field}' has unusable value {value}")]
    InvalidMetadata { field: String, value: String },

    #[error("Unsupported projection: {0}")]
    UnsupportedProjection(String),

    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    #[error("Shape mismatch in {operation}: {left:?} vs {right:?}")]
    ShapeMismatch {
        operation: String,
        left: (usize, usize),
        right: (usize, usize),
    },

    #[error("Frame mismatch: {0}")]
    FrameMismatch(String),

    #[error("Insufficient frames: {operation} needs {required}, sequence has {available}")]
    InsufficientFrames {
        operation: String,
        required: usize,
        available: usize,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Layer not found: {0}")]
    LayerNotFound(u64),
}

impl MapError {
    pub(crate) fn missing(field: &str) -> Self {
        MapError::MissingMetadata {
            field: field.to_string(),
        }
    }

    pub(crate) fn invalid(field: &str, value: impl std::fmt::Display) -> Self {
        MapError::InvalidMetadata {
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

/// Result type for map operations
pub type MapResult<T> = Result<T, MapError>;
