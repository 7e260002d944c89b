//! Pixel <-> world transforms for solar maps.
//!
//! Follows the FITS WCS convention: pixel offsets from the reference pixel are
//! multiplied by the PC matrix, scaled by CDELT into intermediate world
//! coordinates, then deprojected. Gnomonic (TAN) and plate carree (CAR) are
//! implemented; everything else is refused.

use crate::io::header::MetaDict;
use crate::io::normalize::{normalize, NormalizedMetadata};
use crate::types::{MapError, MapResult, PixelCoordinate, PixelScale, WorldCoordinate};
use serde::{Deserialize, Serialize};

use super::frames::{wrap_degrees, CoordinateFrame};

/// Physical frame named by the CTYPE axis codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameKind {
    /// HPLN / HPLT
    Helioprojective,
    /// HGLN / HGLT
    HeliographicStonyhurst,
    /// CRLN / CRLT
    HeliographicCarrington,
}

impl FrameKind {
    fn axis_codes(&self) -> (&'static str, &'static str) {
        match self {
            FrameKind::Helioprojective => ("HPLN", "HPLT"),
            FrameKind::HeliographicStonyhurst => ("HGLN", "HGLT"),
            FrameKind::HeliographicCarrington => ("CRLN", "CRLT"),
        }
    }

    /// CTYPE1/CTYPE2 strings for this frame and projection
    pub fn ctypes(&self, projection: Projection) -> (String, String) {
        let (lon, lat) = self.axis_codes();
        (
            format!("{}-{}", lon, projection.code()),
            format!("{}-{}", lat, projection.code()),
        )
    }

    /// World coordinates depend on where the observer stands
    pub fn is_observer_dependent(&self) -> bool {
        matches!(self, FrameKind::Helioprojective)
    }
}

/// Spherical projection of the world axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Projection {
    /// Gnomonic
    Tan,
    /// Plate carree
    Car,
}

impl Projection {
    pub fn code(&self) -> &'static str {
        match self {
            Projection::Tan => "TAN",
            Projection::Car => "CAR",
        }
    }
}

/// Parse a CTYPE1/CTYPE2 pair into frame and projection
pub fn parse_ctypes(ctype1: &str, ctype2: &str) -> MapResult<(FrameKind, Projection)> {
    let ctype1 = ctype1.trim().to_uppercase();
    let ctype2 = ctype2.trim().to_uppercase();

    // Pre-WCS solar headers
    if ctype1 == "SOLAR_X" && ctype2 == "SOLAR_Y" {
        return Ok((FrameKind::Helioprojective, Projection::Tan));
    }

    let split = |ctype: &str| -> MapResult<(String, String)> {
        let mut parts = ctype.splitn(2, '-');
        let axis = parts.next().unwrap_or_default().to_string();
        let rest = parts.next().unwrap_or_default().trim_start_matches('-').to_string();
        if axis.is_empty() || rest.is_empty() {
            return Err(MapError::UnsupportedProjection(format!(
                "CTYPE '{}' has no projection code",
                ctype
            )));
        }
        Ok((axis, rest))
    };

    let (axis1, proj1) = split(&ctype1)?;
    let (axis2, proj2) = split(&ctype2)?;

    if proj1 != proj2 {
        return Err(MapError::UnsupportedProjection(format!(
            "axes use different projections: '{}' and '{}'",
            ctype1, ctype2
        )));
    }

    let projection = match proj1.as_str() {
        "TAN" => Projection::Tan,
        "CAR" => Projection::Car,
        other => {
            return Err(MapError::UnsupportedProjection(format!(
                "projection '{}' (from '{}') is not implemented",
                other, ctype1
            )))
        }
    };

    let kind = match (axis1.as_str(), axis2.as_str()) {
        ("HPLN", "HPLT") => FrameKind::Helioprojective,
        ("HGLN", "HGLT") => FrameKind::HeliographicStonyhurst,
        ("CRLN", "CRLT") => FrameKind::HeliographicCarrington,
        _ => {
            return Err(MapError::UnsupportedProjection(format!(
                "axis pair '{}'/'{}' is not a solar frame",
                ctype1, ctype2
            )))
        }
    };

    Ok((kind, projection))
}

/// Native longitude of the celestial pole for zenithal projections
const LONPOLE: f64 = 180.0;

/// Pixel <-> world transform of one map, including its output grid shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateEngine {
    reference_pixel: PixelCoordinate,
    reference_coordinate: WorldCoordinate,
    scale: PixelScale,
    pc: [[f64; 2]; 2],
    pc_inv: [[f64; 2]; 2],
    projection: Projection,
    frame: CoordinateFrame,
    shape: (usize, usize),
}

impl CoordinateEngine {
    /// Build the transform described by normalized metadata
    pub fn from_meta(meta: &NormalizedMetadata) -> Self {
        let pc = meta.rotation_matrix;
        // Non-singular by construction of NormalizedMetadata
        let det = pc[0][0] * pc[1][1] - pc[0][1] * pc[1][0];
        let pc_inv = [
            [pc[1][1] / det, -pc[0][1] / det],
            [-pc[1][0] / det, pc[0][0] / det],
        ];

        Self {
            reference_pixel: meta.reference_pixel,
            reference_coordinate: meta.reference_coordinate,
            scale: meta.scale,
            pc,
            pc_inv,
            projection: meta.projection,
            frame: CoordinateFrame {
                kind: meta.frame_kind,
                observer: meta.observer,
                obstime: meta.date,
                rsun: meta.rsun_ref,
            },
            shape: meta.shape,
        }
    }

    /// Build a target grid from a bare header, e.g. for reprojection
    pub fn from_header(meta: &MetaDict, shape: (usize, usize)) -> MapResult<Self> {
        Ok(Self::from_meta(&normalize(meta, shape)?))
    }

    pub fn coordinate_frame(&self) -> &CoordinateFrame {
        &self.frame
    }

    /// Grid shape (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn scale(&self) -> PixelScale {
        self.scale
    }

    pub fn projection(&self) -> Projection {
        self.projection
    }

    /// Copy this grid's geometry into `meta`, keeping its non-geometric fields
    pub fn apply_geometry(&self, meta: &NormalizedMetadata) -> NormalizedMetadata {
        NormalizedMetadata {
            scale: self.scale,
            rotation_matrix: self.pc,
            reference_pixel: self.reference_pixel,
            reference_coordinate: self.reference_coordinate,
            frame_kind: self.frame.kind,
            projection: self.projection,
            observer: self.frame.observer,
            rsun_ref: self.frame.rsun,
            shape: self.shape,
            ..meta.clone()
        }
    }

    /// World coordinate of a 0-based pixel position
    pub fn pixel_to_world(&self, x: f64, y: f64) -> WorldCoordinate {
        let dx = x - self.reference_pixel.x;
        let dy = y - self.reference_pixel.y;
        let ix = self.scale.x * (self.pc[0][0] * dx + self.pc[0][1] * dy);
        let iy = self.scale.y * (self.pc[1][0] * dx + self.pc[1][1] * dy);

        match self.projection {
            Projection::Car => WorldCoordinate::from_degrees(
                self.wrap_lon(self.reference_coordinate.lon + ix),
                self.reference_coordinate.lat + iy,
            ),
            Projection::Tan => self.deproject_tan(ix, iy),
        }
    }

    /// Pixel position of a world coordinate, failing when the coordinate cannot
    /// be projected onto this grid's plane
    pub fn world_to_pixel(&self, coord: WorldCoordinate) -> MapResult<PixelCoordinate> {
        self.try_world_to_pixel(coord).ok_or_else(|| {
            MapError::OutOfBounds(format!(
                "coordinate {} cannot be projected onto the {} plane",
                coord,
                self.projection.code()
            ))
        })
    }

    /// `world_to_pixel` without an error value, for per-pixel loops
    pub fn try_world_to_pixel(&self, coord: WorldCoordinate) -> Option<PixelCoordinate> {
        if !coord.is_finite() {
            return None;
        }

        let (ix, iy) = match self.projection {
            Projection::Car => (
                wrap_degrees(coord.lon - self.reference_coordinate.lon),
                coord.lat - self.reference_coordinate.lat,
            ),
            Projection::Tan => self.project_tan(coord)?,
        };

        let u = ix / self.scale.x;
        let v = iy / self.scale.y;
        Some(PixelCoordinate::new(
            self.pc_inv[0][0] * u + self.pc_inv[0][1] * v + self.reference_pixel.x,
            self.pc_inv[1][0] * u + self.pc_inv[1][1] * v + self.reference_pixel.y,
        ))
    }

    fn wrap_lon(&self, lon: f64) -> f64 {
        self.reference_coordinate.lon + wrap_degrees(lon - self.reference_coordinate.lon)
    }

    fn deproject_tan(&self, ix: f64, iy: f64) -> WorldCoordinate {
        let r = ix.hypot(iy).to_radians();
        let phi = ix.atan2(-iy);
        let theta = 1.0f64.atan2(r);
        let (lon, lat) = self.native_to_celestial(phi, theta);
        WorldCoordinate::from_degrees(self.wrap_lon(lon.to_degrees()), lat.to_degrees())
    }

    fn project_tan(&self, coord: WorldCoordinate) -> Option<(f64, f64)> {
        let (phi, theta) = self.celestial_to_native(coord.lon.to_radians(), coord.lat.to_radians());
        let sin_theta = theta.sin();
        if sin_theta <= 0.0 {
            return None;
        }
        let r = (theta.cos() / sin_theta).to_degrees();
        Some((r * phi.sin(), -r * phi.cos()))
    }

    fn native_to_celestial(&self, phi: f64, theta: f64) -> (f64, f64) {
        let alpha_p = self.reference_coordinate.lon.to_radians();
        let delta_p = self.reference_coordinate.lat.to_radians();
        let dphi = phi - LONPOLE.to_radians();

        let lat = (theta.sin() * delta_p.sin() + theta.cos() * delta_p.cos() * dphi.cos()).asin();
        let lon = alpha_p
            + (-theta.cos() * dphi.sin())
                .atan2(theta.sin() * delta_p.cos() - theta.cos() * delta_p.sin() * dphi.cos());
        (lon, lat)
    }

    fn celestial_to_native(&self, lon: f64, lat: f64) -> (f64, f64) {
        let alpha_p = self.reference_coordinate.lon.to_radians();
        let delta_p = self.reference_coordinate.lat.to_radians();
        let dlon = lon - alpha_p;

        let phi = LONPOLE.to_radians()
            + (-lat.cos() * dlon.sin())
                .atan2(lat.sin() * delta_p.cos() - lat.cos() * delta_p.sin() * dlon.cos());
        let theta = (lat.sin() * delta_p.sin() + lat.cos() * delta_p.cos() * dlon.cos())
            .clamp(-1.0, 1.0)
            .asin();
        (phi, theta)
    }

    /// World coordinates of the outer pixel edges: (bottom-left, top-right)
    pub fn edge_corners(&self) -> (WorldCoordinate, WorldCoordinate) {
        let (rows, cols) = self.shape;
        (
            self.pixel_to_world(-0.5, -0.5),
            self.pixel_to_world(cols as f64 - 0.5, rows as f64 - 0.5),
        )
    }

    /// World coordinates of every pixel centre, (rows, columns) order
    pub fn all_world_coordinates(&self) -> ndarray::Array2<WorldCoordinate> {
        ndarray::Array2::from_shape_fn(self.shape, |(row, col)| {
            self.pixel_to_world(col as f64, row as f64)
        })
    }
}
