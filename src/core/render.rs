//! Render-ready artifacts handed to an external plotting collaborator.

use crate::types::{MapArray, WorldCoordinate};
use serde::{Deserialize, Serialize};

use super::resample::finite_range;

/// Intensity stretch applied between normalization and colour lookup
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Stretch {
    Linear,
    Sqrt,
    Log,
    /// Inverse hyperbolic sine with the given softening parameter
    Asinh(f64),
}

impl Stretch {
    /// Apply the stretch to a value already normalized into [0, 1]
    pub fn apply(&self, v: f64) -> f64 {
        let v = v.clamp(0.0, 1.0);
        match *self {
            Stretch::Linear => v,
            Stretch::Sqrt => v.sqrt(),
            Stretch::Log => (1.0 + 1000.0 * v).ln() / 1001.0f64.ln(),
            Stretch::Asinh(a) => (v / a).asinh() / (1.0 / a).asinh(),
        }
    }
}

/// Data values mapped to the bottom and top of the colour scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormRange {
    pub vmin: f64,
    pub vmax: f64,
}

impl NormRange {
    pub fn new(vmin: f64, vmax: f64) -> Self {
        Self { vmin, vmax }
    }

    /// Finite min/max of `data`
    pub fn from_data(data: &MapArray) -> Option<Self> {
        finite_range(data).map(|(vmin, vmax)| Self { vmin, vmax })
    }

    /// Range symmetric about zero covering `data`
    pub fn symmetric(data: &MapArray) -> Option<Self> {
        finite_range(data).map(|(lo, hi)| {
            let bound = lo.abs().max(hi.abs());
            Self {
                vmin: -bound,
                vmax: bound,
            }
        })
    }

    /// Smallest range covering both
    pub fn union(&self, other: &NormRange) -> NormRange {
        NormRange {
            vmin: self.vmin.min(other.vmin),
            vmax: self.vmax.max(other.vmax),
        }
    }

    /// Position of `value` inside the range, clipped to [0, 1]
    pub fn normalize(&self, value: f64) -> f64 {
        if self.vmax > self.vmin {
            ((value - self.vmin) / (self.vmax - self.vmin)).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Instrument-flavoured display defaults carried by every map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotSettings {
    pub cmap: String,
    pub stretch: Stretch,
    /// Fixed normalization; derived from the data when `None`
    pub norm: Option<NormRange>,
    /// Centre the colour scale on zero (signed data such as magnetograms)
    pub symmetric: bool,
}

impl Default for PlotSettings {
    fn default() -> Self {
        Self {
            cmap: "gray".to_string(),
            stretch: Stretch::Linear,
            norm: None,
            symmetric: false,
        }
    }
}

impl PlotSettings {
    /// Normalization to use for `data` under these settings
    pub fn resolve_norm(&self, data: &MapArray) -> Option<NormRange> {
        match self.norm {
            Some(norm) => Some(norm),
            None if self.symmetric => NormRange::symmetric(data),
            None => NormRange::from_data(data),
        }
    }
}

/// World-unit extent of an image: outer pixel edges, in arcsec for
/// helioprojective maps and degrees for heliographic ones
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub left: f64,
    pub right: f64,
    pub bottom: f64,
    pub top: f64,
}

impl Extent {
    pub fn from_corners(bottom_left: WorldCoordinate, top_right: WorldCoordinate, in_arcsec: bool) -> Self {
        let convert = |v: f64| if in_arcsec { v * crate::types::ARCSEC_PER_DEGREE } else { v };
        Self {
            left: convert(bottom_left.lon),
            right: convert(top_right.lon),
            bottom: convert(bottom_left.lat),
            top: convert(top_right.lat),
        }
    }
}

/// Everything a renderer needs besides the pixels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayMetadata {
    pub title: String,
    pub unit_label: Option<String>,
    pub cmap: String,
    pub stretch: Stretch,
    pub norm: Option<NormRange>,
    pub extent: Extent,
    pub alpha: f64,
    pub z_order: i32,
    /// Contour levels drawn instead of (or over) the image
    pub levels: Option<Vec<f64>>,
}

/// One drawable image
#[derive(Debug, Clone)]
pub struct RenderItem {
    pub data: MapArray,
    pub display: DisplayMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_norm_ranges_ignore_non_finite() {
        let data = array![[1.0, f64::NAN], [-3.0, 2.0]];
        assert_eq!(NormRange::from_data(&data), Some(NormRange::new(-3.0, 2.0)));
        assert_eq!(NormRange::symmetric(&data), Some(NormRange::new(-3.0, 3.0)));

        let empty = array![[f64::NAN]];
        assert_eq!(NormRange::from_data(&empty), None);
    }

    #[test]
    fn test_stretches_are_monotonic_on_unit_interval() {
        for stretch in [Stretch::Linear, Stretch::Sqrt, Stretch::Log, Stretch::Asinh(0.01)] {
            assert_abs_diff_eq!(stretch.apply(0.0), 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(stretch.apply(1.0), 1.0, epsilon = 1e-12);
            assert!(stretch.apply(0.25) < stretch.apply(0.5));
        }
    }

    #[test]
    fn test_fixed_norm_takes_precedence() {
        let data = array![[0.0, 10.0]];
        let settings = PlotSettings {
            norm: Some(NormRange::new(0.0, 5000.0)),
            ..PlotSettings::default()
        };
        assert_eq!(settings.resolve_norm(&data), Some(NormRange::new(0.0, 5000.0)));
        assert_abs_diff_eq!(NormRange::new(0.0, 5000.0).normalize(2500.0), 0.5);
    }
}
