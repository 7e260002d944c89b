//! Ordered series of maps: stacking, time derivatives and animation frames.

use crate::io::normalize::NormalizedMetadata;
use crate::types::{MapCube, MapError, MapResult};
use ndarray::Axis;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::frames::{frames_co_aligned, AlignmentTolerance};
use super::map::GenericMap;
use super::render::{NormRange, RenderItem};

/// Maps in insertion order, unless explicitly sorted
#[derive(Debug, Clone, Default)]
pub struct MapSequence {
    maps: Vec<GenericMap>,
}

impl MapSequence {
    pub fn new(maps: Vec<GenericMap>) -> Self {
        Self { maps }
    }

    pub fn push(&mut self, map: GenericMap) {
        self.maps.push(map);
    }

    pub fn get(&self, index: usize) -> Option<&GenericMap> {
        self.maps.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, GenericMap> {
        self.maps.iter()
    }

    pub fn maps(&self) -> &[GenericMap] {
        &self.maps
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Copy of the sequence ordered by observation time (stable for equal times)
    pub fn sorted_by_date(&self) -> Self {
        let mut maps = self.maps.clone();
        maps.sort_by_key(|map| map.date());
        Self { maps }
    }

    pub fn all_meta(&self) -> Vec<&NormalizedMetadata> {
        self.maps.iter().map(|map| map.meta()).collect()
    }

    pub fn all_same_shape(&self) -> bool {
        self.maps
            .windows(2)
            .all(|pair| pair[0].dimensions() == pair[1].dimensions())
    }

    /// Every frame shares the first frame's coordinate frame and observer
    pub fn all_co_aligned(&self) -> bool {
        match self.maps.split_first() {
            Some((first, rest)) => rest.iter().all(|map| {
                frames_co_aligned(
                    first.coordinate_frame(),
                    map.coordinate_frame(),
                    AlignmentTolerance::default(),
                )
            }),
            None => true,
        }
    }

    fn check_same_shape(&self, operation: &str) -> MapResult<()> {
        if let Some(first) = self.maps.first() {
            if let Some(other) = self.maps.iter().find(|m| m.dimensions() != first.dimensions()) {
                return Err(MapError::ShapeMismatch {
                    operation: operation.to_string(),
                    left: first.dimensions(),
                    right: other.dimensions(),
                });
            }
        }
        Ok(())
    }

    fn check_co_aligned(&self, operation: &str) -> MapResult<()> {
        let Some((first, rest)) = self.maps.split_first() else {
            return Ok(());
        };
        let reference = first.coordinate_frame();
        for (offset, map) in rest.iter().enumerate() {
            let frame = map.coordinate_frame();
            if !frames_co_aligned(reference, frame, AlignmentTolerance::default()) {
                return Err(MapError::FrameMismatch(format!(
                    "{}: frame {} is in {}, frame 0 is in {}",
                    operation,
                    offset + 1,
                    frame,
                    reference
                )));
            }
        }
        Ok(())
    }

    /// Pixel arrays stacked into a (frame, y, x) cube.
    ///
    /// Frames are not reprojected: differing shapes fail with `ShapeMismatch`,
    /// differing pixel scales or frames that are not co-aligned with `FrameMismatch`.
    pub fn as_array_stack(&self) -> MapResult<MapCube> {
        let first = self.maps.first().ok_or(MapError::InsufficientFrames {
            operation: "as_array_stack".to_string(),
            required: 1,
            available: 0,
        })?;
        self.check_same_shape("as_array_stack")?;
        self.check_co_aligned("as_array_stack")?;

        let scale = first.scale();
        for (index, map) in self.maps.iter().enumerate().skip(1) {
            let other = map.scale();
            let rel = |a: f64, b: f64| (a - b).abs() <= 1e-9 * a.abs().max(b.abs());
            if !rel(scale.x, other.x) || !rel(scale.y, other.y) {
                return Err(MapError::FrameMismatch(format!(
                    "frame {} has pixel scale {:.6}\"x{:.6}\", frame 0 has {:.6}\"x{:.6}\"",
                    index,
                    other.x_arcsec(),
                    other.y_arcsec(),
                    scale.x_arcsec(),
                    scale.y_arcsec()
                )));
            }
        }

        let views: Vec<_> = self.maps.iter().map(|map| map.data().view()).collect();
        let cube = ndarray::stack(Axis(0), &views).map_err(|e| MapError::ShapeMismatch {
            operation: format!("as_array_stack ({})", e),
            left: first.dimensions(),
            right: first.dimensions(),
        })?;

        log::debug!("Stacked {} frames into {:?} cube", self.maps.len(), cube.dim());
        Ok(cube)
    }

    /// Finite difference in time, applied `order` times.
    ///
    /// Each output frame is `(next - current) / dt` in units per second,
    /// stamped at the midpoint of its two source frames.
    pub fn derivative(&self, order: usize) -> MapResult<MapSequence> {
        if order == 0 {
            return Err(MapError::InvalidParameter(
                "derivative order must be at least 1".to_string(),
            ));
        }
        if self.maps.len() < order + 1 {
            return Err(MapError::InsufficientFrames {
                operation: format!("derivative(order={})", order),
                required: order + 1,
                available: self.maps.len(),
            });
        }
        self.check_same_shape("derivative")?;
        self.check_co_aligned("derivative")?;

        log::info!("Computing order-{} derivative of {} frames", order, self.maps.len());

        let mut frames = self.maps.clone();
        for _ in 0..order {
            frames = first_difference(&frames)?;
        }
        Ok(MapSequence { maps: frames })
    }

    /// Smallest normalization covering every frame's display range
    pub fn global_norm(&self) -> Option<NormRange> {
        self.maps
            .iter()
            .filter_map(|map| map.plot_settings().resolve_norm(map.data()))
            .reduce(|a, b| a.union(&b))
    }

    /// Render items in stored order sharing one normalization.
    ///
    /// The iterator is lazy and can be cloned to replay the sequence.
    pub fn plot_sequence(&self, norm: Option<NormRange>) -> SequenceFrames<'_> {
        SequenceFrames {
            maps: self.maps.iter(),
            norm: norm.or_else(|| self.global_norm()),
        }
    }
}

fn difference(pair: &[GenericMap]) -> MapResult<GenericMap> {
    let (a, b) = (&pair[0], &pair[1]);
    let elapsed = b.date() - a.date();
    let dt = elapsed
        .num_microseconds()
        .map(|us| us as f64 / 1e6)
        .unwrap_or_else(|| elapsed.num_milliseconds() as f64 / 1e3);
    if dt == 0.0 {
        return Err(MapError::InvalidParameter(format!(
            "frames at {} and {} share a timestamp; time derivative undefined",
            a.date(),
            b.date()
        )));
    }

    let data = (b.data() - a.data()) / dt;

    let mut meta = a.meta().clone();
    meta.date = a.date() + elapsed / 2;
    meta.unit = Some(match &a.meta().unit {
        Some(unit) => format!("{} / s", unit),
        None => "1 / s".to_string(),
    });
    Ok(a.derive_computed(data, meta, "derivative"))
}

#[cfg(feature = "parallel")]
fn first_difference(frames: &[GenericMap]) -> MapResult<Vec<GenericMap>> {
    frames.par_windows(2).map(difference).collect()
}

#[cfg(not(feature = "parallel"))]
fn first_difference(frames: &[GenericMap]) -> MapResult<Vec<GenericMap>> {
    frames.windows(2).map(difference).collect()
}

impl FromIterator<GenericMap> for MapSequence {
    fn from_iter<I: IntoIterator<Item = GenericMap>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a MapSequence {
    type Item = &'a GenericMap;
    type IntoIter = std::slice::Iter<'a, GenericMap>;

    fn into_iter(self) -> Self::IntoIter {
        self.maps.iter()
    }
}

/// Lazy render items of a sequence
#[derive(Debug, Clone)]
pub struct SequenceFrames<'a> {
    maps: std::slice::Iter<'a, GenericMap>,
    norm: Option<NormRange>,
}

impl<'a> Iterator for SequenceFrames<'a> {
    type Item = RenderItem;

    fn next(&mut self) -> Option<Self::Item> {
        let map = self.maps.next()?;
        let mut item = map.to_render_item();
        if self.norm.is_some() {
            item.display.norm = self.norm;
        }
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.maps.size_hint()
    }
}

impl ExactSizeIterator for SequenceFrames<'_> {}
