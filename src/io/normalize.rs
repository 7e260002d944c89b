//! Resolution of instrument-specific header keywords into one canonical set.
//!
//! Every canonical field has a fixed list of header aliases tried in order. The
//! first alias present in the header decides the value: if that value has the
//! wrong type or an unphysical value the normalization fails instead of falling
//! through to the next alias.

use crate::core::wcs::{parse_ctypes, FrameKind, Projection};
use crate::io::header::{MetaDict, MetaValue};
use crate::types::{
    MapError, MapResult, PixelCoordinate, PixelScale, WorldCoordinate, RSUN_REF_METERS,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

const DATE_ALIASES: &[&str] = &["date-obs", "date_obs", "date-avg", "date-beg", "t_obs"];
const TIME_ALIASES: &[&str] = &["time-obs", "time_obs"];
const WAVELENGTH_ALIASES: &[&str] = &["wavelnth", "wavelength", "wave_len"];
const INSTRUMENT_ALIASES: &[&str] = &["instrume", "instrument"];
const DETECTOR_ALIASES: &[&str] = &["detector"];
const OBSERVATORY_ALIASES: &[&str] = &["obsrvtry", "telescop"];
const OBS_LON_ALIASES: &[&str] = &["hgln_obs"];
const OBS_LAT_ALIASES: &[&str] = &["hglt_obs", "crlt_obs", "solar_b0"];
const OBS_DIST_ALIASES: &[&str] = &["dsun_obs", "dsun"];
const ROTATION_ALIASES: &[&str] = &["crota2", "crota1", "crota"];
const EXPOSURE_ALIASES: &[&str] = &["exptime", "xposure"];
const RSUN_OBS_ALIASES: &[&str] = &["rsun_obs", "rsun_arc"];

/// Observer position in heliographic Stonyhurst coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObserverLocation {
    /// Stonyhurst longitude in degrees
    pub lon: f64,
    /// Stonyhurst latitude in degrees
    pub lat: f64,
    /// Distance from Sun centre in metres
    pub distance: f64,
}

/// Observed wavelength with the unit string taken from the header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wavelength {
    pub value: f64,
    pub unit: Option<String>,
}

impl Wavelength {
    /// Value in angstrom, when the unit is known
    pub fn to_angstrom(&self) -> Option<f64> {
        let factor = match self.unit.as_deref()?.to_lowercase().as_str() {
            "angstrom" | "angstroms" | "a" => 1.0,
            "nm" => 10.0,
            "um" | "micron" => 1.0e4,
            "m" => 1.0e10,
            _ => return None,
        };
        Some(self.value * factor)
    }
}

impl std::fmt::Display for Wavelength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.unit {
            Some(unit) => write!(f, "{} {}", self.value, unit),
            None => write!(f, "{}", self.value),
        }
    }
}

/// Canonical attribute set of a map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMetadata {
    pub date: DateTime<Utc>,
    pub wavelength: Option<Wavelength>,
    pub instrument: Option<String>,
    pub detector: Option<String>,
    pub observatory: Option<String>,
    pub observer: Option<ObserverLocation>,
    pub scale: PixelScale,
    /// PC matrix, row-major
    pub rotation_matrix: [[f64; 2]; 2],
    /// 0-based pixel position of the reference coordinate
    pub reference_pixel: PixelCoordinate,
    pub reference_coordinate: WorldCoordinate,
    pub frame_kind: FrameKind,
    pub projection: Projection,
    pub unit: Option<String>,
    pub exposure_time: Option<f64>,
    /// Solar radius in metres used for surface intersections
    pub rsun_ref: f64,
    /// Apparent solar radius in arcsec, if the header records it
    pub rsun_obs: Option<f64>,
    /// Array shape (rows, columns)
    pub shape: (usize, usize),
}

impl NormalizedMetadata {
    /// Rotation of the image y axis from solar north, degrees counterclockwise
    pub fn rotation_angle(&self) -> f64 {
        let m = &self.rotation_matrix;
        m[1][0].atan2(m[0][0]).to_degrees()
    }

    /// Canonical header describing this metadata
    pub fn to_header(&self) -> MetaDict {
        let (ctype1, ctype2) = self.frame_kind.ctypes(self.projection);
        let mut meta = MetaDict::new()
            .with("naxis", 2i64)
            .with("naxis1", self.shape.1 as i64)
            .with("naxis2", self.shape.0 as i64)
            .with("date-obs", self.date.format("%Y-%m-%dT%H:%M:%S%.3f").to_string())
            .with("ctype1", ctype1)
            .with("ctype2", ctype2)
            .with("cunit1", "deg")
            .with("cunit2", "deg")
            .with("cdelt1", self.scale.x)
            .with("cdelt2", self.scale.y)
            .with("crpix1", self.reference_pixel.x + 1.0)
            .with("crpix2", self.reference_pixel.y + 1.0)
            .with("crval1", self.reference_coordinate.lon)
            .with("crval2", self.reference_coordinate.lat)
            .with("pc1_1", self.rotation_matrix[0][0])
            .with("pc1_2", self.rotation_matrix[0][1])
            .with("pc2_1", self.rotation_matrix[1][0])
            .with("pc2_2", self.rotation_matrix[1][1])
            .with("rsun_ref", self.rsun_ref);

        if let Some(wavelength) = &self.wavelength {
            meta.insert("wavelnth", wavelength.value);
            if let Some(unit) = &wavelength.unit {
                meta.insert("waveunit", unit.as_str());
            }
        }
        if let Some(instrument) = &self.instrument {
            meta.insert("instrume", instrument.as_str());
        }
        if let Some(detector) = &self.detector {
            meta.insert("detector", detector.as_str());
        }
        if let Some(observatory) = &self.observatory {
            meta.insert("obsrvtry", observatory.as_str());
        }
        if let Some(observer) = &self.observer {
            meta.insert("hgln_obs", observer.lon);
            meta.insert("hglt_obs", observer.lat);
            meta.insert("dsun_obs", observer.distance);
        }
        if let Some(unit) = &self.unit {
            meta.insert("bunit", unit.as_str());
        }
        if let Some(exposure) = self.exposure_time {
            meta.insert("exptime", exposure);
        }
        if let Some(rsun_obs) = self.rsun_obs {
            meta.insert("rsun_obs", rsun_obs);
        }
        meta
    }
}

/// Build the canonical metadata for an array of `shape` (rows, columns)
pub fn normalize(meta: &MetaDict, shape: (usize, usize)) -> MapResult<NormalizedMetadata> {
    log::debug!("Normalizing header with {} keywords for {:?} array", meta.len(), shape);

    check_shape(meta, shape)?;

    let date = resolve_date(meta)?;
    let (frame_kind, projection) = resolve_projection(meta)?;
    let (unit_x, unit_y) = (axis_unit(meta, 1)?, axis_unit(meta, 2)?);
    let (scale, rotation_matrix) = resolve_scale_and_rotation(meta, unit_x, unit_y)?;

    let reference_pixel = PixelCoordinate::new(
        required_f64(meta, "crpix1")? - 1.0,
        required_f64(meta, "crpix2")? - 1.0,
    );
    let reference_coordinate = WorldCoordinate::from_degrees(
        required_f64(meta, "crval1")? * unit_x,
        required_f64(meta, "crval2")? * unit_y,
    );

    if projection == Projection::Car && reference_coordinate.lat.abs() > 1e-9 {
        return Err(MapError::UnsupportedProjection(format!(
            "CAR projection with non-zero reference latitude {}",
            reference_coordinate.lat
        )));
    }

    let rsun_ref = match optional_f64(meta, &["rsun_ref"])? {
        Some(r) if r > 0.0 => r,
        Some(r) => return Err(MapError::invalid("rsun_ref", r)),
        None => RSUN_REF_METERS,
    };

    let normalized = NormalizedMetadata {
        date,
        wavelength: resolve_wavelength(meta)?,
        instrument: optional_string(meta, INSTRUMENT_ALIASES)?,
        detector: optional_string(meta, DETECTOR_ALIASES)?,
        observatory: optional_string(meta, OBSERVATORY_ALIASES)?,
        observer: resolve_observer(meta)?,
        scale,
        rotation_matrix,
        reference_pixel,
        reference_coordinate,
        frame_kind,
        projection,
        unit: optional_string(meta, &["bunit"])?,
        exposure_time: optional_f64(meta, EXPOSURE_ALIASES)?,
        rsun_ref,
        rsun_obs: optional_f64(meta, RSUN_OBS_ALIASES)?,
        shape,
    };

    log::debug!(
        "Normalized: date={}, scale={:.4}\"x{:.4}\", rotation={:.3} deg",
        normalized.date,
        normalized.scale.x_arcsec(),
        normalized.scale.y_arcsec(),
        normalized.rotation_angle()
    );

    Ok(normalized)
}

fn check_shape(meta: &MetaDict, shape: (usize, usize)) -> MapResult<()> {
    for (key, expected) in [("naxis1", shape.1), ("naxis2", shape.0)] {
        if let Some(value) = meta.get(key) {
            match value.as_i64() {
                Some(n) if n == expected as i64 => {}
                _ => {
                    return Err(MapError::invalid(
                        key,
                        format!("{} (array has {})", value, expected),
                    ))
                }
            }
        }
    }
    Ok(())
}

fn finite_number(field: &str, value: &MetaValue) -> MapResult<f64> {
    match value.as_f64() {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(MapError::invalid(field, value)),
    }
}

fn required_f64(meta: &MetaDict, key: &str) -> MapResult<f64> {
    let value = meta.get(key).ok_or_else(|| MapError::missing(key))?;
    finite_number(key, value)
}

fn optional_f64(meta: &MetaDict, aliases: &[&str]) -> MapResult<Option<f64>> {
    meta.first_present(aliases)
        .map(|(alias, value)| finite_number(alias, value))
        .transpose()
}

fn optional_string(meta: &MetaDict, aliases: &[&str]) -> MapResult<Option<String>> {
    match meta.first_present(aliases) {
        Some((alias, value)) => match value.as_str() {
            Some(s) if !s.trim().is_empty() => Ok(Some(s.trim().to_string())),
            Some(_) => Ok(None),
            None => Err(MapError::invalid(alias, value)),
        },
        None => Ok(None),
    }
}

fn date_only_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{4}[-/]\d{2}[-/]\d{2}$").expect("valid date regex"))
}

/// Parse an observation timestamp; header times without a zone are UTC
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    let text = text.trim_end_matches('Z');
    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y/%m/%dT%H:%M:%S%.f",
        "%Y/%m/%d %H:%M:%S%.f",
    ];
    for format in FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }

    if date_only_pattern().is_match(text) {
        let normalized = text.replace('/', "-");
        if let Ok(date) = NaiveDate::parse_from_str(&normalized, "%Y-%m-%d") {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }
    None
}

fn resolve_date(meta: &MetaDict) -> MapResult<DateTime<Utc>> {
    let (alias, value) = meta
        .first_present(DATE_ALIASES)
        .ok_or_else(|| MapError::missing(DATE_ALIASES[0]))?;
    let text = value.as_str().ok_or_else(|| MapError::invalid(alias, value))?.trim();

    // Legacy headers split the date and the time of day over two keywords
    let combined = if date_only_pattern().is_match(text) {
        match meta.first_present(TIME_ALIASES) {
            Some((time_alias, time_value)) => {
                let time = time_value
                    .as_str()
                    .ok_or_else(|| MapError::invalid(time_alias, time_value))?;
                format!("{}T{}", text, time.trim())
            }
            None => text.to_string(),
        }
    } else {
        text.to_string()
    };

    parse_date(&combined).ok_or_else(|| MapError::invalid(alias, format!("'{}'", combined)))
}

fn resolve_wavelength(meta: &MetaDict) -> MapResult<Option<Wavelength>> {
    let (alias, raw) = match meta.first_present(WAVELENGTH_ALIASES) {
        Some(found) => found,
        None => return Ok(None),
    };
    let value = finite_number(alias, raw)?;
    if value <= 0.0 {
        return Err(MapError::invalid(alias, value));
    }
    let unit = optional_string(meta, &["waveunit"])?;
    Ok(Some(Wavelength { value, unit }))
}

fn resolve_observer(meta: &MetaDict) -> MapResult<Option<ObserverLocation>> {
    let lon = optional_f64(meta, OBS_LON_ALIASES)?;
    let lat = optional_f64(meta, OBS_LAT_ALIASES)?;
    let distance = optional_f64(meta, OBS_DIST_ALIASES)?;

    match (lon, lat, distance) {
        (Some(lon), Some(lat), Some(distance)) => {
            if distance <= 0.0 {
                return Err(MapError::invalid(OBS_DIST_ALIASES[0], distance));
            }
            if lat.abs() > 90.0 {
                return Err(MapError::invalid(OBS_LAT_ALIASES[0], lat));
            }
            Ok(Some(ObserverLocation { lon, lat, distance }))
        }
        (None, None, None) => Ok(None),
        partial => {
            log::warn!(
                "Incomplete observer location (lon, lat, distance) = {:?}; observer left unset",
                partial
            );
            Ok(None)
        }
    }
}

fn resolve_projection(meta: &MetaDict) -> MapResult<(FrameKind, Projection)> {
    let ctype1 = optional_string(meta, &["ctype1"])?;
    let ctype2 = optional_string(meta, &["ctype2"])?;
    match (ctype1, ctype2) {
        (Some(c1), Some(c2)) => parse_ctypes(&c1, &c2),
        (None, None) => {
            log::warn!("No CTYPE keywords; assuming helioprojective HPLN-TAN/HPLT-TAN axes");
            Ok((FrameKind::Helioprojective, Projection::Tan))
        }
        (Some(_), None) => Err(MapError::missing("ctype2")),
        (None, Some(_)) => Err(MapError::missing("ctype1")),
    }
}

/// Degrees per header unit for axis `axis`
fn axis_unit(meta: &MetaDict, axis: usize) -> MapResult<f64> {
    let key = format!("cunit{}", axis);
    let unit = match optional_string(meta, &[key.as_str()])? {
        Some(unit) => unit,
        None => return Ok(1.0),
    };
    let factor = match unit.to_lowercase().as_str() {
        "deg" | "degree" | "degrees" => 1.0,
        "arcmin" => 1.0 / 60.0,
        "arcsec" => 1.0 / 3600.0,
        "mas" => 1.0 / 3.6e6,
        "rad" => 180.0 / std::f64::consts::PI,
        _ => return Err(MapError::invalid(&key, format!("'{}'", unit))),
    };
    Ok(factor)
}

fn resolve_scale_and_rotation(
    meta: &MetaDict,
    unit_x: f64,
    unit_y: f64,
) -> MapResult<(PixelScale, [[f64; 2]; 2])> {
    let has_cdelt = meta.contains_key("cdelt1") || meta.contains_key("cdelt2");
    let has_cd = ["cd1_1", "cd1_2", "cd2_1", "cd2_2"]
        .iter()
        .any(|k| meta.contains_key(k));

    let (cdelt1, cdelt2, pc) = if has_cdelt {
        let cdelt1 = required_f64(meta, "cdelt1")?;
        let cdelt2 = required_f64(meta, "cdelt2")?;
        for (key, value) in [("cdelt1", cdelt1), ("cdelt2", cdelt2)] {
            if value <= 0.0 {
                return Err(MapError::invalid(key, value));
            }
        }
        let pc = resolve_pc(meta, cdelt1, cdelt2)?;
        (cdelt1, cdelt2, pc)
    } else if has_cd {
        let cd = [
            [cd_element(meta, "cd1_1")?, cd_element(meta, "cd1_2")?],
            [cd_element(meta, "cd2_1")?, cd_element(meta, "cd2_2")?],
        ];
        let cdelt1 = cd[0][0].hypot(cd[0][1]);
        let cdelt2 = cd[1][0].hypot(cd[1][1]);
        if cdelt1 <= 0.0 {
            return Err(MapError::invalid("cd1_1", cd[0][0]));
        }
        if cdelt2 <= 0.0 {
            return Err(MapError::invalid("cd2_2", cd[1][1]));
        }
        let pc = [
            [cd[0][0] / cdelt1, cd[0][1] / cdelt1],
            [cd[1][0] / cdelt2, cd[1][1] / cdelt2],
        ];
        (cdelt1, cdelt2, pc)
    } else {
        return Err(MapError::missing("cdelt1"));
    };

    let det = pc[0][0] * pc[1][1] - pc[0][1] * pc[1][0];
    if det.abs() < 1e-12 {
        return Err(MapError::invalid("pc", format!("singular matrix {:?}", pc)));
    }

    Ok((
        PixelScale {
            x: cdelt1 * unit_x,
            y: cdelt2 * unit_y,
        },
        pc,
    ))
}

fn cd_element(meta: &MetaDict, key: &str) -> MapResult<f64> {
    Ok(optional_f64(meta, &[key])?.unwrap_or(0.0))
}

fn resolve_pc(meta: &MetaDict, cdelt1: f64, cdelt2: f64) -> MapResult<[[f64; 2]; 2]> {
    let pc_keys = ["pc1_1", "pc1_2", "pc2_1", "pc2_2"];
    if pc_keys.iter().any(|k| meta.contains_key(k)) {
        // Absent PC elements take their identity-matrix value
        return Ok([
            [
                optional_f64(meta, &["pc1_1"])?.unwrap_or(1.0),
                optional_f64(meta, &["pc1_2"])?.unwrap_or(0.0),
            ],
            [
                optional_f64(meta, &["pc2_1"])?.unwrap_or(0.0),
                optional_f64(meta, &["pc2_2"])?.unwrap_or(1.0),
            ],
        ]);
    }

    let crota = optional_f64(meta, ROTATION_ALIASES)?.unwrap_or(0.0);
    Ok(crota_to_pc(crota, cdelt1, cdelt2))
}

/// PC matrix equivalent of a `CROTA2` rotation in degrees
pub fn crota_to_pc(crota: f64, cdelt1: f64, cdelt2: f64) -> [[f64; 2]; 2] {
    let (sin, cos) = crota.to_radians().sin_cos();
    let ratio = cdelt2 / cdelt1;
    [[cos, -sin * ratio], [sin / ratio, cos]]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn aia_like_header() -> MetaDict {
        MetaDict::new()
            .with("DATE-OBS", "2022-01-01T00:00:09.350")
            .with("INSTRUME", "AIA_3")
            .with("WAVELNTH", 171i64)
            .with("WAVEUNIT", "angstrom")
            .with("CTYPE1", "HPLN-TAN")
            .with("CTYPE2", "HPLT-TAN")
            .with("CUNIT1", "arcsec")
            .with("CUNIT2", "arcsec")
            .with("CDELT1", 0.6)
            .with("CDELT2", 0.6)
            .with("CRPIX1", 2.5)
            .with("CRPIX2", 2.5)
            .with("CRVAL1", 0.0)
            .with("CRVAL2", 0.0)
            .with("HGLN_OBS", 0.0)
            .with("HGLT_OBS", -3.0)
            .with("DSUN_OBS", 1.47e11)
    }

    #[test]
    fn test_normalize_complete_header() {
        let meta = normalize(&aia_like_header(), (4, 4)).unwrap();

        assert_eq!(meta.date.to_rfc3339(), "2022-01-01T00:00:09.350+00:00");
        assert_eq!(meta.instrument.as_deref(), Some("AIA_3"));
        assert_eq!(meta.wavelength.as_ref().and_then(|w| w.to_angstrom()), Some(171.0));
        assert_abs_diff_eq!(meta.scale.x_arcsec(), 0.6, epsilon = 1e-12);
        assert_abs_diff_eq!(meta.reference_pixel.x, 1.5);
        assert_eq!(meta.rotation_matrix, [[1.0, 0.0], [0.0, 1.0]]);
        let observer = meta.observer.unwrap();
        assert_eq!(observer.lat, -3.0);
        assert_eq!(meta.rsun_ref, RSUN_REF_METERS);
    }

    #[test]
    fn test_date_alias_priority() {
        let header = aia_like_header()
            .with("date_obs", "1999-01-01T00:00:00")
            .with("date-avg", "1999-01-01T00:00:00");
        let meta = normalize(&header, (4, 4)).unwrap();
        // date-obs is first in priority order
        assert_eq!(meta.date.format("%Y").to_string(), "2022");

        let mut header = aia_like_header();
        header.remove("date-obs");
        let header = header.with("date-avg", "2015-06-01T12:00:00Z");
        let meta = normalize(&header, (4, 4)).unwrap();
        assert_eq!(meta.date.format("%Y-%m-%d %H").to_string(), "2015-06-01 12");
    }

    #[test]
    fn test_missing_required_fields() {
        for key in ["date-obs", "crpix1", "crval2"] {
            let mut header = aia_like_header();
            header.remove(key);
            match normalize(&header, (4, 4)) {
                Err(MapError::MissingMetadata { field }) => assert_eq!(field, key),
                other => panic!("expected missing {}, got {:?}", key, other),
            }
        }

        let mut header = aia_like_header();
        header.remove("cdelt1");
        header.remove("cdelt2");
        assert!(matches!(
            normalize(&header, (4, 4)),
            Err(MapError::MissingMetadata { .. })
        ));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let header = aia_like_header().with("cdelt1", -0.6);
        match normalize(&header, (4, 4)) {
            Err(MapError::InvalidMetadata { field, value }) => {
                assert_eq!(field, "cdelt1");
                assert_eq!(value, "-0.6");
            }
            other => panic!("unexpected {:?}", other),
        }

        let header = aia_like_header().with("crval1", f64::NAN);
        assert!(matches!(
            normalize(&header, (4, 4)),
            Err(MapError::InvalidMetadata { .. })
        ));

        let header = aia_like_header().with("crpix1", "center");
        assert!(matches!(
            normalize(&header, (4, 4)),
            Err(MapError::InvalidMetadata { .. })
        ));

        let header = aia_like_header().with("date-obs", "yesterday");
        assert!(matches!(
            normalize(&header, (4, 4)),
            Err(MapError::InvalidMetadata { .. })
        ));

        let header = aia_like_header().with("naxis1", 512i64);
        assert!(matches!(
            normalize(&header, (4, 4)),
            Err(MapError::InvalidMetadata { .. })
        ));
    }

    #[test]
    fn test_bad_wavelength_names_the_keyword_used() {
        for (key, value) in [("wavelnth", -171.0), ("wavelength", 0.0), ("wave_len", -1.0)] {
            let mut header = aia_like_header();
            header.remove("wavelnth");
            let header = header.with(key, value);
            match normalize(&header, (4, 4)) {
                Err(MapError::InvalidMetadata { field, .. }) => assert_eq!(field, key),
                other => panic!("expected invalid {}, got {:?}", key, other),
            }
        }
    }

    #[test]
    fn test_legacy_split_date_and_time() {
        let header = aia_like_header()
            .with("date-obs", "2003/10/28")
            .with("time-obs", "11:06:05.500");
        let meta = normalize(&header, (4, 4)).unwrap();
        assert_eq!(
            meta.date.format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
            "2003-10-28T11:06:05.500"
        );
    }

    #[test]
    fn test_crota_and_cd_matrix() {
        let header = aia_like_header().with("crota2", 90.0);
        let meta = normalize(&header, (4, 4)).unwrap();
        assert_abs_diff_eq!(meta.rotation_angle(), 90.0, epsilon = 1e-9);

        let mut header = aia_like_header();
        header.remove("cdelt1");
        header.remove("cdelt2");
        let header = header
            .with("cd1_1", 0.0)
            .with("cd1_2", -0.5)
            .with("cd2_1", 0.5)
            .with("cd2_2", 0.0);
        let meta = normalize(&header, (4, 4)).unwrap();
        assert_abs_diff_eq!(meta.scale.x_arcsec(), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(meta.rotation_angle(), 90.0, epsilon = 1e-9);
    }

    #[test]
    fn test_partial_observer_is_left_unset() {
        let mut header = aia_like_header();
        header.remove("dsun_obs");
        let meta = normalize(&header, (4, 4)).unwrap();
        assert!(meta.observer.is_none());
    }

    #[test]
    fn test_unsupported_projection() {
        let header = aia_like_header()
            .with("ctype1", "HPLN-AZP")
            .with("ctype2", "HPLT-AZP");
        assert!(matches!(
            normalize(&header, (4, 4)),
            Err(MapError::UnsupportedProjection(_))
        ));

        let header = aia_like_header()
            .with("ctype1", "HPLN-TAN-SIP")
            .with("ctype2", "HPLT-TAN-SIP");
        assert!(matches!(
            normalize(&header, (4, 4)),
            Err(MapError::UnsupportedProjection(_))
        ));
    }

    #[test]
    fn test_header_round_trip() {
        let meta = normalize(&aia_like_header(), (4, 4)).unwrap();
        let rebuilt = normalize(&meta.to_header(), (4, 4)).unwrap();
        assert_eq!(rebuilt.date, meta.date);
        assert_abs_diff_eq!(rebuilt.scale.x, meta.scale.x, epsilon = 1e-15);
        assert_eq!(rebuilt.reference_pixel, meta.reference_pixel);
        assert_eq!(rebuilt.observer, meta.observer);
        assert_eq!(rebuilt.wavelength, meta.wavelength);
    }
}
