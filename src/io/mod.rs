//! Header handling: raw keyword mappings and their normalization

pub mod header;
pub mod normalize;

pub use header::{MetaDict, MetaValue, RawImageInput};
pub use normalize::{normalize, parse_date, NormalizedMetadata, ObserverLocation, Wavelength};
