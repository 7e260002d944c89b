//! Physical coordinate frames and conversions between them.
//!
//! Helioprojective coordinates are angles seen from an observer; heliographic
//! Stonyhurst coordinates are longitude/latitude on the solar surface with the
//! zero meridian facing Earth. Converting between observers goes through the
//! solar surface, so only on-disk points survive the trip.

use crate::io::normalize::ObserverLocation;
use crate::types::{MapError, MapResult, WorldCoordinate};
use approx::{abs_diff_eq, relative_eq};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::wcs::FrameKind;

/// Descriptor of the physical frame a map's world coordinates live in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateFrame {
    pub kind: FrameKind,
    pub observer: Option<ObserverLocation>,
    pub obstime: DateTime<Utc>,
    /// Solar radius in metres
    pub rsun: f64,
}

/// Tolerances used when deciding whether two frames are interchangeable
#[derive(Debug, Clone, Copy)]
pub struct AlignmentTolerance {
    /// Maximum observer longitude/latitude difference in degrees
    pub angle: f64,
    /// Maximum relative observer distance difference
    pub distance: f64,
}

impl Default for AlignmentTolerance {
    fn default() -> Self {
        Self {
            angle: 1e-2,
            distance: 1e-3,
        }
    }
}

impl std::fmt::Display for CoordinateFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.observer {
            Some(obs) => write!(
                f,
                "{:?}(observer lon={:.4} lat={:.4} d={:.4e} m)",
                self.kind, obs.lon, obs.lat, obs.distance
            ),
            None => write!(f, "{:?}(observer unknown)", self.kind),
        }
    }
}

/// True when world coordinates of `a` and `b` can be used interchangeably.
///
/// Frames must be of the same kind. Observer-dependent frames additionally need
/// observers that agree within `tolerance`, or both be unknown. Observation time
/// is not compared.
pub fn frames_co_aligned(a: &CoordinateFrame, b: &CoordinateFrame, tolerance: AlignmentTolerance) -> bool {
    if a.kind != b.kind {
        return false;
    }
    if !a.kind.is_observer_dependent() {
        return true;
    }
    match (&a.observer, &b.observer) {
        (None, None) => true,
        (Some(oa), Some(ob)) => observers_match(oa, ob, tolerance),
        _ => false,
    }
}

fn observers_match(a: &ObserverLocation, b: &ObserverLocation, tolerance: AlignmentTolerance) -> bool {
    let dlon = wrap_degrees(a.lon - b.lon);
    abs_diff_eq!(dlon, 0.0, epsilon = tolerance.angle)
        && abs_diff_eq!(a.lat, b.lat, epsilon = tolerance.angle)
        && relative_eq!(a.distance, b.distance, max_relative = tolerance.distance)
}

/// Wrap an angle in degrees into (-180, 180]
pub fn wrap_degrees(angle: f64) -> f64 {
    let wrapped = (angle + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 {
        180.0
    } else {
        wrapped
    }
}

/// Validated conversion between two frames, applied point by point
#[derive(Debug, Clone, Copy)]
pub enum FrameTransform {
    Identity,
    HelioprojectiveToStonyhurst { observer: ObserverLocation, rsun: f64 },
    StonyhurstToHelioprojective { observer: ObserverLocation, rsun: f64 },
    HelioprojectiveToHelioprojective {
        from: ObserverLocation,
        to: ObserverLocation,
        rsun: f64,
    },
}

impl FrameTransform {
    /// Build the conversion from `from` to `to`, failing when no conversion exists
    pub fn between(from: &CoordinateFrame, to: &CoordinateFrame) -> MapResult<Self> {
        if frames_co_aligned(from, to, AlignmentTolerance::default()) {
            return Ok(FrameTransform::Identity);
        }

        let rsun = from.rsun;
        let need_observer = |frame: &CoordinateFrame| {
            frame.observer.ok_or_else(|| {
                MapError::FrameMismatch(format!(
                    "cannot convert between {} and {}: observer location unknown",
                    from, to
                ))
            })
        };

        match (from.kind, to.kind) {
            (FrameKind::Helioprojective, FrameKind::Helioprojective) => {
                Ok(FrameTransform::HelioprojectiveToHelioprojective {
                    from: need_observer(from)?,
                    to: need_observer(to)?,
                    rsun,
                })
            }
            (FrameKind::Helioprojective, FrameKind::HeliographicStonyhurst) => {
                Ok(FrameTransform::HelioprojectiveToStonyhurst {
                    observer: need_observer(from)?,
                    rsun,
                })
            }
            (FrameKind::HeliographicStonyhurst, FrameKind::Helioprojective) => {
                Ok(FrameTransform::StonyhurstToHelioprojective {
                    observer: need_observer(to)?,
                    rsun,
                })
            }
            _ => Err(MapError::FrameMismatch(format!(
                "no conversion implemented from {} to {}",
                from, to
            ))),
        }
    }

    /// Convert one coordinate; `None` when the point has no counterpart
    /// (off the solar disk or on the far side of the target observer)
    pub fn apply(&self, coord: WorldCoordinate) -> Option<WorldCoordinate> {
        match *self {
            FrameTransform::Identity => Some(coord),
            FrameTransform::HelioprojectiveToStonyhurst { observer, rsun } => {
                helioprojective_to_stonyhurst(coord, &observer, rsun)
            }
            FrameTransform::StonyhurstToHelioprojective { observer, rsun } => {
                stonyhurst_to_helioprojective(coord, &observer, rsun)
            }
            FrameTransform::HelioprojectiveToHelioprojective { from, to, rsun } => {
                helioprojective_to_stonyhurst(coord, &from, rsun)
                    .and_then(|hgs| stonyhurst_to_helioprojective(hgs, &to, rsun))
            }
        }
    }
}

/// Intersect the line of sight with the solar sphere.
///
/// Returns heliocentric cartesian (x west, y north, z towards the observer)
/// in metres, or `None` when the line of sight misses the Sun.
pub fn helioprojective_to_heliocentric(
    coord: WorldCoordinate,
    distance: f64,
    rsun: f64,
) -> Option<[f64; 3]> {
    let tx = coord.lon.to_radians();
    let ty = coord.lat.to_radians();
    let cos_ty = ty.cos();
    let alpha = cos_ty * tx.cos();

    // |observer + d * los|^2 = rsun^2, nearest root
    let b = -2.0 * distance * alpha;
    let c = distance * distance - rsun * rsun;
    let discriminant = b * b - 4.0 * c;
    if discriminant < 0.0 {
        return None;
    }
    let d = (-b - discriminant.sqrt()) / 2.0;

    Some([
        d * cos_ty * tx.sin(),
        d * ty.sin(),
        distance - d * alpha,
    ])
}

fn heliocentric_to_stonyhurst(xyz: [f64; 3], observer: &ObserverLocation) -> WorldCoordinate {
    let [x, y, z] = xyz;
    let b0 = observer.lat.to_radians();
    let r = (x * x + y * y + z * z).sqrt();
    let lat = ((y * b0.cos() + z * b0.sin()) / r).asin();
    let lon = observer.lon.to_radians() + x.atan2(z * b0.cos() - y * b0.sin());
    WorldCoordinate::from_degrees(wrap_degrees(lon.to_degrees()), lat.to_degrees())
}

fn stonyhurst_to_heliocentric(coord: WorldCoordinate, observer: &ObserverLocation, r: f64) -> [f64; 3] {
    let lat = coord.lat.to_radians();
    let dlon = (coord.lon - observer.lon).to_radians();
    let b0 = observer.lat.to_radians();
    [
        r * lat.cos() * dlon.sin(),
        r * (lat.sin() * b0.cos() - lat.cos() * dlon.cos() * b0.sin()),
        r * (lat.sin() * b0.sin() + lat.cos() * dlon.cos() * b0.cos()),
    ]
}

fn helioprojective_to_stonyhurst(
    coord: WorldCoordinate,
    observer: &ObserverLocation,
    rsun: f64,
) -> Option<WorldCoordinate> {
    helioprojective_to_heliocentric(coord, observer.distance, rsun)
        .map(|xyz| heliocentric_to_stonyhurst(xyz, observer))
}

fn stonyhurst_to_helioprojective(
    coord: WorldCoordinate,
    observer: &ObserverLocation,
    rsun: f64,
) -> Option<WorldCoordinate> {
    let [x, y, z] = stonyhurst_to_heliocentric(coord, observer, rsun);

    // Hidden behind the limb for this observer
    if z * observer.distance < rsun * rsun {
        return None;
    }

    let zeta = observer.distance - z;
    let range = (x * x + y * y + zeta * zeta).sqrt();
    let tx = x.atan2(zeta);
    let ty = (y / range).asin();
    Some(WorldCoordinate::from_degrees(tx.to_degrees(), ty.to_degrees()))
}

/// Apparent angular radius of a sphere of radius `rsun` seen from `distance`, in degrees
pub fn angular_radius(rsun: f64, distance: f64) -> f64 {
    (rsun / distance).asin().to_degrees()
}
