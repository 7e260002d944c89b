//! Core map model: coordinates, the map entity and its containers

pub mod wcs;
pub mod frames;
pub mod resample;
pub mod render;
pub mod sources;
pub mod map;
pub mod factory;
pub mod composite;
pub mod sequence;

// Re-export main types
pub use wcs::{CoordinateEngine, FrameKind, Projection, parse_ctypes};
pub use frames::{CoordinateFrame, AlignmentTolerance, FrameTransform, frames_co_aligned};
pub use render::{PlotSettings, Stretch, NormRange, Extent, DisplayMetadata, RenderItem};
pub use sources::{
    InstrumentSource, GenericSource, AiaSource, HmiSource, EitSource, EuviSource,
    LascoSource, XrtSource, SwapSource,
};
pub use map::{GenericMap, Provenance, ReprojectParams, RotateParams};
pub use factory::{
    MapFactory, Predicate, Constructor, default_factory, init_default_factory, create_map,
};
pub use composite::{CompositeMap, Layer, LayerHandle, LayerOptions};
pub use sequence::{MapSequence, SequenceFrames};
