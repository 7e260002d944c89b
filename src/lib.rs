//! heliomap: coordinate-aware solar image maps
//!
//! This library turns a parsed solar image (pixel array plus FITS-style header)
//! into a map that knows where every pixel points on the Sun. Maps can be
//! cropped, resampled, rotated, reprojected onto other observers' grids,
//! layered into composites and collected into time sequences.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    MapArray, MapCube, MapError, MapResult, WorldCoordinate, PixelCoordinate, PixelScale,
    Interpolation, Aggregation,
};

pub use io::{MetaDict, MetaValue, RawImageInput, NormalizedMetadata, normalize};

pub use crate::core::{
    GenericMap, MapFactory, CompositeMap, MapSequence, CoordinateEngine, CoordinateFrame,
    RenderItem, create_map, default_factory, init_default_factory,
};
