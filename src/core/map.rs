//! The coordinate-aware map entity.
//!
//! A `GenericMap` owns its pixel array and normalized metadata. Every operation
//! returns a new map whose metadata is kept consistent with the new array, and
//! the receiver is never modified.

use crate::io::header::{MetaDict, RawImageInput};
use crate::io::normalize::{normalize, NormalizedMetadata, ObserverLocation, Wavelength};
use crate::types::{
    Aggregation, Interpolation, MapArray, MapError, MapResult, PixelCoordinate, PixelScale,
    WorldCoordinate,
};
use chrono::{DateTime, Utc};
use ndarray::{s, Array2};
use std::ops::Range;
use std::sync::{Arc, OnceLock};

use super::frames::{angular_radius, frames_co_aligned, AlignmentTolerance, CoordinateFrame, FrameTransform};
use super::render::{DisplayMetadata, Extent, PlotSettings, RenderItem};
use super::resample::{fill_grid, resample_array, rotate_array, sample, superpixel_array};
use super::sources::{GenericSource, InstrumentSource};
use super::wcs::{CoordinateEngine, FrameKind};

/// Reprojection parameters
#[derive(Debug, Clone, Copy)]
pub struct ReprojectParams {
    /// Value for output pixels with no counterpart in the source map
    pub fill_value: f64,
    pub interpolation: Interpolation,
}

impl Default for ReprojectParams {
    fn default() -> Self {
        Self {
            fill_value: f64::NAN,
            interpolation: Interpolation::Bilinear,
        }
    }
}

/// Rotation parameters
#[derive(Debug, Clone, Copy)]
pub struct RotateParams {
    pub interpolation: Interpolation,
    /// Value for canvas pixels not covered by the rotated image
    pub missing: f64,
}

impl Default for RotateParams {
    fn default() -> Self {
        Self {
            interpolation: Interpolation::Bilinear,
            missing: 0.0,
        }
    }
}

/// Where a map's pixel values come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provenance {
    /// Pixels as delivered by the instrument pipeline (possibly resampled)
    Instrument,
    /// Pixels computed from one or more maps
    Derived { operation: String },
}

/// A 2D solar image with normalized metadata and a lazily built coordinate engine
#[derive(Debug, Clone)]
pub struct GenericMap {
    data: MapArray,
    meta: NormalizedMetadata,
    header: MetaDict,
    source: Arc<dyn InstrumentSource>,
    provenance: Provenance,
    history: Vec<String>,
    plot_settings: PlotSettings,
    engine: OnceLock<CoordinateEngine>,
}

impl GenericMap {
    /// Assemble a map from already normalized metadata
    pub fn new(
        data: MapArray,
        meta: NormalizedMetadata,
        header: MetaDict,
        source: Arc<dyn InstrumentSource>,
    ) -> MapResult<Self> {
        if data.dim() != meta.shape {
            return Err(MapError::ShapeMismatch {
                operation: "map construction".to_string(),
                left: data.dim(),
                right: meta.shape,
            });
        }
        if data.is_empty() {
            return Err(MapError::InvalidParameter("map data is empty".to_string()));
        }

        let plot_settings = source.plot_settings(&meta, &header);
        Ok(Self {
            data,
            meta,
            header,
            source,
            provenance: Provenance::Instrument,
            history: Vec::new(),
            plot_settings,
            engine: OnceLock::new(),
        })
    }

    /// Build a map with no instrument-specific handling
    pub fn from_raw(input: RawImageInput) -> MapResult<Self> {
        Self::from_raw_with_source(input, Arc::new(GenericSource))
    }

    /// Build a map, letting `source` repair the header before normalization
    pub fn from_raw_with_source(
        input: RawImageInput,
        source: Arc<dyn InstrumentSource>,
    ) -> MapResult<Self> {
        let RawImageInput { data, mut meta } = input;
        source.fix_metadata(&mut meta)?;
        let normalized = normalize(&meta, data.dim())?;
        log::debug!(
            "Built {} map: {:?} array observed {}",
            source.name(),
            data.dim(),
            normalized.date
        );
        Self::new(data, normalized, meta, source)
    }

    /// New map from this one with replaced data and metadata
    fn derive(&self, data: MapArray, meta: NormalizedMetadata, step: String) -> Self {
        let mut history = self.history.clone();
        history.push(step);
        Self {
            data,
            meta,
            header: self.header.clone(),
            source: self.source.clone(),
            provenance: self.provenance.clone(),
            history,
            plot_settings: self.plot_settings.clone(),
            engine: OnceLock::new(),
        }
    }

    /// New map computed from this one, no longer tied to the instrument
    pub(crate) fn derive_computed(&self, data: MapArray, meta: NormalizedMetadata, operation: &str) -> Self {
        let mut derived = self.derive(data, meta, operation.to_string());
        derived.source = Arc::new(GenericSource);
        derived.provenance = Provenance::Derived {
            operation: operation.to_string(),
        };
        derived
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    pub fn data(&self) -> &MapArray {
        &self.data
    }

    pub fn meta(&self) -> &NormalizedMetadata {
        &self.meta
    }

    /// Header as received (after instrument repairs)
    pub fn header(&self) -> &MetaDict {
        &self.header
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn is_derived(&self) -> bool {
        matches!(self.provenance, Provenance::Derived { .. })
    }

    /// Operations applied since construction, oldest first
    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn plot_settings(&self) -> &PlotSettings {
        &self.plot_settings
    }

    pub fn with_plot_settings(&self, plot_settings: PlotSettings) -> Self {
        let mut map = self.clone();
        map.plot_settings = plot_settings;
        map
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.meta.date
    }

    pub fn wavelength(&self) -> Option<&Wavelength> {
        self.meta.wavelength.as_ref()
    }

    pub fn instrument(&self) -> Option<&str> {
        self.meta.instrument.as_deref()
    }

    pub fn detector(&self) -> Option<&str> {
        self.meta.detector.as_deref()
    }

    pub fn observatory(&self) -> Option<&str> {
        self.meta.observatory.as_deref()
    }

    pub fn unit(&self) -> Option<&str> {
        self.meta.unit.as_deref()
    }

    pub fn exposure_time(&self) -> Option<f64> {
        self.meta.exposure_time
    }

    pub fn observer(&self) -> Option<&ObserverLocation> {
        self.meta.observer.as_ref()
    }

    /// Short instrument name, e.g. "AIA" or "LASCO-C2"
    pub fn nickname(&self) -> String {
        self.source.nickname(&self.meta, &self.header)
    }

    /// What the pixels measure, e.g. a wavelength or "magnetogram"
    pub fn measurement(&self) -> Option<String> {
        self.source.measurement(&self.meta, &self.header)
    }

    /// Array shape (rows, columns)
    pub fn dimensions(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn scale(&self) -> PixelScale {
        self.meta.scale
    }

    /// Roll angle of the image, degrees counterclockwise from solar north
    pub fn rotation_angle(&self) -> f64 {
        self.meta.rotation_angle()
    }

    pub fn reference_pixel(&self) -> PixelCoordinate {
        self.meta.reference_pixel
    }

    pub fn reference_coordinate(&self) -> WorldCoordinate {
        self.meta.reference_coordinate
    }

    /// Coordinate engine, built on first use
    pub fn coordinate_engine(&self) -> &CoordinateEngine {
        self.engine.get_or_init(|| CoordinateEngine::from_meta(&self.meta))
    }

    pub fn coordinate_frame(&self) -> &CoordinateFrame {
        self.coordinate_engine().coordinate_frame()
    }

    pub fn pixel_to_world(&self, x: f64, y: f64) -> WorldCoordinate {
        self.coordinate_engine().pixel_to_world(x, y)
    }

    pub fn world_to_pixel(&self, coord: WorldCoordinate) -> MapResult<PixelCoordinate> {
        self.coordinate_engine().world_to_pixel(coord)
    }

    /// Title string for plots
    pub fn title(&self) -> String {
        let mut title = self.nickname();
        if let Some(measurement) = self.measurement() {
            title.push(' ');
            title.push_str(&measurement);
        }
        title.push(' ');
        title.push_str(&self.date().format("%Y-%m-%d %H:%M:%S").to_string());
        title
    }

    // ---------------------------------------------------------------------
    // Geometry
    // ---------------------------------------------------------------------

    /// World coordinate of the array centre
    pub fn center(&self) -> WorldCoordinate {
        let (rows, cols) = self.dimensions();
        self.pixel_to_world((cols as f64 - 1.0) / 2.0, (rows as f64 - 1.0) / 2.0)
    }

    /// World coordinate of the outer corner of the first pixel
    pub fn bottom_left_coord(&self) -> WorldCoordinate {
        self.coordinate_engine().edge_corners().0
    }

    /// World coordinate of the outer corner of the last pixel
    pub fn top_right_coord(&self) -> WorldCoordinate {
        self.coordinate_engine().edge_corners().1
    }

    /// World coordinate of every pixel centre, (rows, columns) order
    pub fn all_coordinates(&self) -> Array2<WorldCoordinate> {
        self.coordinate_engine().all_world_coordinates()
    }

    /// Extent of the image in display units
    pub fn world_extent(&self) -> Extent {
        let (bottom_left, top_right) = self.coordinate_engine().edge_corners();
        Extent::from_corners(
            bottom_left,
            top_right,
            self.meta.frame_kind == FrameKind::Helioprojective,
        )
    }

    /// True when `coord` falls on a pixel of this map
    pub fn contains_coordinate(&self, coord: WorldCoordinate) -> bool {
        let (rows, cols) = self.dimensions();
        match self.coordinate_engine().try_world_to_pixel(coord) {
            Some(p) => {
                p.x >= -0.5 && p.y >= -0.5 && p.x < cols as f64 - 0.5 && p.y < rows as f64 - 0.5
            }
            None => false,
        }
    }

    /// Same frame and observer as `other`, within default tolerances
    pub fn is_co_aligned_with(&self, other: &GenericMap) -> bool {
        frames_co_aligned(
            self.coordinate_frame(),
            other.coordinate_frame(),
            AlignmentTolerance::default(),
        )
    }

    /// Apparent solar radius in degrees
    pub fn solar_angular_radius(&self) -> MapResult<f64> {
        if let Some(rsun_obs) = self.meta.rsun_obs {
            return Ok(rsun_obs / crate::types::ARCSEC_PER_DEGREE);
        }
        let observer = self.meta.observer.ok_or_else(|| MapError::missing("dsun_obs"))?;
        Ok(angular_radius(self.meta.rsun_ref, observer.distance))
    }

    /// True when the whole solar disk lies inside the field of view
    pub fn contains_full_disk(&self) -> MapResult<bool> {
        if self.meta.frame_kind != FrameKind::Helioprojective {
            return Err(MapError::FrameMismatch(format!(
                "full-disk test needs a helioprojective map, got {:?}",
                self.meta.frame_kind
            )));
        }
        let radius = self.solar_angular_radius()?;
        let all_inside = (0..360).all(|deg| {
            let (sin, cos) = (deg as f64).to_radians().sin_cos();
            self.contains_coordinate(WorldCoordinate::from_degrees(radius * cos, radius * sin))
        });
        Ok(all_inside)
    }

    /// Nearest-pixel values at each coordinate
    pub fn sample_at_coords(&self, coords: &[WorldCoordinate]) -> MapResult<Vec<f64>> {
        coords
            .iter()
            .map(|&coord| {
                if !self.contains_coordinate(coord) {
                    return Err(MapError::OutOfBounds(format!(
                        "coordinate {} lies outside the map",
                        coord
                    )));
                }
                let p = self.world_to_pixel(coord)?;
                Ok(sample(&self.data, p.x, p.y, Interpolation::Nearest, f64::NAN))
            })
            .collect()
    }

    // ---------------------------------------------------------------------
    // Statistics over finite pixels
    // ---------------------------------------------------------------------

    fn finite_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.data.iter().copied().filter(|v| v.is_finite())
    }

    pub fn min(&self) -> Option<f64> {
        self.finite_values().reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.finite_values().reduce(f64::max)
    }

    pub fn mean(&self) -> Option<f64> {
        let (sum, count) = self
            .finite_values()
            .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
        (count > 0).then(|| sum / count as f64)
    }

    pub fn std(&self) -> Option<f64> {
        let mean = self.mean()?;
        let (sum_sq, count) = self
            .finite_values()
            .fold((0.0, 0usize), |(acc, count), v| (acc + (v - mean).powi(2), count + 1));
        Some((sum_sq / count as f64).sqrt())
    }

    // ---------------------------------------------------------------------
    // Cropping
    // ---------------------------------------------------------------------

    /// Cut out the smallest pixel-aligned rectangle containing the world
    /// rectangle spanned by the two corners (in either order)
    pub fn crop(&self, bottom_left: WorldCoordinate, top_right: WorldCoordinate) -> MapResult<Self> {
        let lon = (bottom_left.lon.min(top_right.lon), bottom_left.lon.max(top_right.lon));
        let lat = (bottom_left.lat.min(top_right.lat), bottom_left.lat.max(top_right.lat));

        let corners = [
            WorldCoordinate::from_degrees(lon.0, lat.0),
            WorldCoordinate::from_degrees(lon.1, lat.0),
            WorldCoordinate::from_degrees(lon.0, lat.1),
            WorldCoordinate::from_degrees(lon.1, lat.1),
        ];
        let pixels = corners
            .iter()
            .map(|&c| self.world_to_pixel(c))
            .collect::<MapResult<Vec<_>>>()?;

        let x_min = pixels.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let x_max = pixels.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        let y_min = pixels.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        let y_max = pixels.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);

        let (rows, cols) = self.dimensions();
        let x_range = pixel_span(x_min, x_max, cols).ok_or_else(|| {
            MapError::OutOfBounds(format!(
                "crop {} - {} spans x pixels [{:.2}, {:.2}] outside 0..{}",
                WorldCoordinate::from_degrees(lon.0, lat.0),
                WorldCoordinate::from_degrees(lon.1, lat.1),
                x_min,
                x_max,
                cols
            ))
        })?;
        let y_range = pixel_span(y_min, y_max, rows).ok_or_else(|| {
            MapError::OutOfBounds(format!(
                "crop {} - {} spans y pixels [{:.2}, {:.2}] outside 0..{}",
                WorldCoordinate::from_degrees(lon.0, lat.0),
                WorldCoordinate::from_degrees(lon.1, lat.1),
                y_min,
                y_max,
                rows
            ))
        })?;

        self.crop_pixels(x_range, y_range)
    }

    /// Same as [`GenericMap::crop`]
    pub fn submap(&self, bottom_left: WorldCoordinate, top_right: WorldCoordinate) -> MapResult<Self> {
        self.crop(bottom_left, top_right)
    }

    /// Cut out columns `x_range` and rows `y_range`
    pub fn crop_pixels(&self, x_range: Range<usize>, y_range: Range<usize>) -> MapResult<Self> {
        let (rows, cols) = self.dimensions();
        if x_range.is_empty() || y_range.is_empty() || x_range.end > cols || y_range.end > rows {
            return Err(MapError::OutOfBounds(format!(
                "pixel rectangle x {:?}, y {:?} not inside {}x{} array",
                x_range, y_range, cols, rows
            )));
        }

        let data = self
            .data
            .slice(s![y_range.clone(), x_range.clone()])
            .to_owned();

        let mut meta = self.meta.clone();
        meta.reference_pixel = PixelCoordinate::new(
            meta.reference_pixel.x - x_range.start as f64,
            meta.reference_pixel.y - y_range.start as f64,
        );
        meta.shape = data.dim();

        log::info!(
            "Cropped {}x{} map to x {:?}, y {:?} ({}x{})",
            cols,
            rows,
            x_range,
            y_range,
            meta.shape.1,
            meta.shape.0
        );

        Ok(self.derive(data, meta, format!("crop x={:?} y={:?}", x_range, y_range)))
    }

    // ---------------------------------------------------------------------
    // Resampling
    // ---------------------------------------------------------------------

    /// Resample to `new_shape` (rows, columns) covering the same field of view
    pub fn resample(&self, new_shape: (usize, usize), interpolation: Interpolation) -> MapResult<Self> {
        let data = resample_array(&self.data, new_shape, interpolation)?;
        let (rows, cols) = self.dimensions();
        let factor_x = cols as f64 / new_shape.1 as f64;
        let factor_y = rows as f64 / new_shape.0 as f64;

        log::info!(
            "Resampled {}x{} -> {}x{} ({:?})",
            rows,
            cols,
            new_shape.0,
            new_shape.1,
            interpolation
        );

        let meta = rescaled_meta(&self.meta, factor_x, factor_y, new_shape);
        Ok(self.derive(data, meta, format!("resample {:?} {:?}", new_shape, interpolation)))
    }

    /// Collapse `factor_x` x `factor_y` pixel blocks into single pixels
    pub fn superpixel(&self, factor_x: usize, factor_y: usize, aggregation: Aggregation) -> MapResult<Self> {
        let data = superpixel_array(&self.data, factor_x, factor_y, aggregation)?;
        let new_shape = data.dim();

        log::info!(
            "Superpixel {}x{} ({}): {:?} -> {:?}",
            factor_x,
            factor_y,
            aggregation,
            self.dimensions(),
            new_shape
        );

        let meta = rescaled_meta(&self.meta, factor_x as f64, factor_y as f64, new_shape);
        Ok(self.derive(
            data,
            meta,
            format!("superpixel {}x{} {}", factor_x, factor_y, aggregation),
        ))
    }

    /// Resample onto another grid, converting frames when needed.
    ///
    /// Fails with `FrameMismatch` when no conversion between the frames exists.
    pub fn reproject_to(&self, target: &CoordinateEngine, params: &ReprojectParams) -> MapResult<Self> {
        let transform = FrameTransform::between(target.coordinate_frame(), self.coordinate_frame())?;
        let source = self.coordinate_engine();
        let fill = params.fill_value;

        log::info!(
            "Reprojecting {:?} map onto {:?} grid in {}",
            self.dimensions(),
            target.shape(),
            target.coordinate_frame()
        );
        log::debug!("Frame transform: {:?}", transform);

        let data = fill_grid(target.shape(), |row, col| {
            let world = target.pixel_to_world(col as f64, row as f64);
            transform
                .apply(world)
                .and_then(|source_world| source.try_world_to_pixel(source_world))
                .map(|p| sample(&self.data, p.x, p.y, params.interpolation, fill))
                .unwrap_or(fill)
        });

        let meta = target.apply_geometry(&self.meta);
        Ok(self.derive(data, meta, format!("reproject to {}", target.coordinate_frame())))
    }

    /// Rotate counterclockwise by `angle` degrees onto an expanded canvas
    pub fn rotate(&self, angle: f64, params: &RotateParams) -> MapResult<Self> {
        if !angle.is_finite() {
            return Err(MapError::InvalidParameter(format!(
                "rotation angle must be finite, got {}",
                angle
            )));
        }
        let scale = self.meta.scale;
        if (scale.x - scale.y).abs() > 1e-6 * scale.x.max(scale.y) {
            log::warn!(
                "Rotating map with non-square pixels ({:.4}\" x {:.4}\"); rotation is applied in pixel space",
                scale.x_arcsec(),
                scale.y_arcsec()
            );
        }

        let (data, canvas) = rotate_array(&self.data, angle, params.interpolation, params.missing);

        let mut meta = self.meta.clone();
        let (ref_x, ref_y) = canvas.forward(meta.reference_pixel.x, meta.reference_pixel.y);
        meta.reference_pixel = PixelCoordinate::new(ref_x, ref_y);

        // PC' = PC . R(-angle)
        let (sin, cos) = (canvas.sin, canvas.cos);
        let pc = meta.rotation_matrix;
        meta.rotation_matrix = [
            [pc[0][0] * cos - pc[0][1] * sin, pc[0][0] * sin + pc[0][1] * cos],
            [pc[1][0] * cos - pc[1][1] * sin, pc[1][0] * sin + pc[1][1] * cos],
        ];
        meta.shape = data.dim();

        log::info!(
            "Rotated map by {:.3} deg: {:?} -> {:?}, roll now {:.3} deg",
            angle,
            self.dimensions(),
            meta.shape,
            meta.rotation_angle()
        );

        Ok(self.derive(data, meta, format!("rotate {:.6} deg", angle)))
    }

    /// Rotate so that solar north points up the array's y axis
    pub fn rotate_to_north(&self, params: &RotateParams) -> MapResult<Self> {
        self.rotate(self.rotation_angle(), params)
    }

    /// Move the reference coordinate by `offset` (degrees), e.g. to correct pointing
    pub fn shift_reference_coord(&self, offset: WorldCoordinate) -> Self {
        let mut meta = self.meta.clone();
        meta.reference_coordinate = WorldCoordinate::from_degrees(
            meta.reference_coordinate.lon + offset.lon,
            meta.reference_coordinate.lat + offset.lat,
        );
        self.derive(self.data.clone(), meta, format!("shift reference by {}", offset))
    }

    // ---------------------------------------------------------------------
    // Arithmetic
    // ---------------------------------------------------------------------

    fn check_same_shape(&self, other: &GenericMap, operation: &str) -> MapResult<()> {
        if self.dimensions() != other.dimensions() {
            return Err(MapError::ShapeMismatch {
                operation: operation.to_string(),
                left: self.dimensions(),
                right: other.dimensions(),
            });
        }
        if self.unit() != other.unit() {
            log::warn!(
                "{} of maps with different units: {:?} and {:?}",
                operation,
                self.unit(),
                other.unit()
            );
        }
        Ok(())
    }

    /// Element-wise sum; keeps the frame of `self`
    pub fn add(&self, other: &GenericMap) -> MapResult<Self> {
        self.check_same_shape(other, "add")?;
        let data = &self.data + &other.data;
        Ok(self.derive_computed(data, self.meta.clone(), "add"))
    }

    /// Element-wise difference `self - other`; keeps the frame of `self`
    pub fn subtract(&self, other: &GenericMap) -> MapResult<Self> {
        self.check_same_shape(other, "subtract")?;
        let data = &self.data - &other.data;
        Ok(self.derive_computed(data, self.meta.clone(), "subtract"))
    }

    pub fn multiply_scalar(&self, factor: f64) -> Self {
        let data = &self.data * factor;
        self.derive_computed(data, self.meta.clone(), "multiply_scalar")
    }

    pub fn add_scalar(&self, offset: f64) -> Self {
        let data = &self.data + offset;
        self.derive_computed(data, self.meta.clone(), "add_scalar")
    }

    // ---------------------------------------------------------------------
    // Rendering
    // ---------------------------------------------------------------------

    /// Array plus display metadata for an external renderer
    pub fn to_render_item(&self) -> RenderItem {
        RenderItem {
            data: self.data.clone(),
            display: DisplayMetadata {
                title: self.title(),
                unit_label: self.meta.unit.clone(),
                cmap: self.plot_settings.cmap.clone(),
                stretch: self.plot_settings.stretch,
                norm: self.plot_settings.resolve_norm(&self.data),
                extent: self.world_extent(),
                alpha: 1.0,
                z_order: 0,
                levels: None,
            },
        }
    }
}

/// Column or row index range covering `[lo, hi]`, clipped to `0..len`
fn pixel_span(lo: f64, hi: f64, len: usize) -> Option<Range<usize>> {
    let start = (lo + 0.5).floor();
    let end = (hi + 0.5).floor() + 1.0;
    if end <= 0.0 || start >= len as f64 {
        return None;
    }
    let start = start.max(0.0) as usize;
    let end = (end as usize).min(len);
    Some(start..end)
}

/// Metadata after merging `factor_x` x `factor_y` input pixels into one
fn rescaled_meta(
    meta: &NormalizedMetadata,
    factor_x: f64,
    factor_y: f64,
    new_shape: (usize, usize),
) -> NormalizedMetadata {
    let mut rescaled = meta.clone();
    rescaled.scale = PixelScale {
        x: meta.scale.x * factor_x,
        y: meta.scale.y * factor_y,
    };
    rescaled.reference_pixel = PixelCoordinate::new(
        (meta.reference_pixel.x + 0.5) / factor_x - 0.5,
        (meta.reference_pixel.y + 0.5) / factor_y - 0.5,
    );

    // PC' = F^-1 . PC . F keeps S'.PC' = S.PC.F
    let pc = meta.rotation_matrix;
    rescaled.rotation_matrix = [
        [pc[0][0], pc[0][1] * factor_y / factor_x],
        [pc[1][0] * factor_x / factor_y, pc[1][1]],
    ];
    rescaled.shape = new_shape;
    rescaled
}
