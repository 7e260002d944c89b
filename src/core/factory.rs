//! Dispatch of raw images to instrument-specific map constructors.
//!
//! The factory holds an ordered list of `(predicate, constructor)` pairs. The
//! first predicate that accepts a header decides the constructor; headers no
//! predicate claims become generic maps.

use crate::io::header::{MetaDict, RawImageInput};
use crate::types::{MapError, MapResult};
use std::fmt;
use std::sync::{Arc, OnceLock};

use super::composite::CompositeMap;
use super::map::GenericMap;
use super::sequence::MapSequence;
use super::sources::{
    AiaSource, EitSource, EuviSource, HmiSource, InstrumentSource, LascoSource, SwapSource,
    XrtSource, GENERIC_SOURCE_NAME,
};

/// Side-effect-free test on a raw header
pub type Predicate = Box<dyn Fn(&MetaDict) -> bool + Send + Sync>;

/// Builds a map from a raw image
pub type Constructor = Box<dyn Fn(RawImageInput) -> MapResult<GenericMap> + Send + Sync>;

struct Registration {
    name: String,
    predicate: Predicate,
    constructor: Constructor,
}

/// Ordered registry of map constructors
pub struct MapFactory {
    registry: Vec<Registration>,
}

impl fmt::Debug for MapFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapFactory")
            .field("sources", &self.registered_sources())
            .finish()
    }
}

impl Default for MapFactory {
    fn default() -> Self {
        Self::with_default_sources()
    }
}

impl MapFactory {
    /// Factory with no registrations; everything becomes a generic map
    pub fn new() -> Self {
        Self {
            registry: Vec::new(),
        }
    }

    /// Factory with the built-in instrument sources registered
    pub fn with_default_sources() -> Self {
        let mut factory = Self::new();
        factory
            .register_source(Arc::new(AiaSource))
            .register_source(Arc::new(HmiSource))
            .register_source(Arc::new(EitSource))
            .register_source(Arc::new(EuviSource))
            .register_source(Arc::new(LascoSource))
            .register_source(Arc::new(XrtSource))
            .register_source(Arc::new(SwapSource));
        factory
    }

    /// Append a `(predicate, constructor)` pair after the existing ones
    pub fn register<P, C>(&mut self, name: impl Into<String>, predicate: P, constructor: C) -> &mut Self
    where
        P: Fn(&MetaDict) -> bool + Send + Sync + 'static,
        C: Fn(RawImageInput) -> MapResult<GenericMap> + Send + Sync + 'static,
    {
        let name = name.into();
        log::debug!("Registering map source '{}' at position {}", name, self.registry.len());
        self.registry.push(Registration {
            name,
            predicate: Box::new(predicate),
            constructor: Box::new(constructor),
        });
        self
    }

    /// Register an instrument source, using its own header test as predicate
    pub fn register_source(&mut self, source: Arc<dyn InstrumentSource>) -> &mut Self {
        let name = source.name().to_string();
        let matcher = source.clone();
        self.register(
            name,
            move |header| matcher.matches(header),
            move |input| GenericMap::from_raw_with_source(input, source.clone()),
        )
    }

    /// Registered source names in dispatch order
    pub fn registered_sources(&self) -> Vec<&str> {
        self.registry.iter().map(|r| r.name.as_str()).collect()
    }

    fn lookup(&self, header: &MetaDict) -> Option<&Registration> {
        self.registry.iter().find(|r| (r.predicate)(header))
    }

    /// Name of the source that would build a map from `header`
    pub fn classify(&self, header: &MetaDict) -> &str {
        self.lookup(header)
            .map(|r| r.name.as_str())
            .unwrap_or(GENERIC_SOURCE_NAME)
    }

    /// Build a map with the first matching constructor, or a generic map
    pub fn create(&self, input: RawImageInput) -> MapResult<GenericMap> {
        match self.lookup(&input.meta) {
            Some(registration) => {
                log::debug!("Header matched source '{}'", registration.name);
                (registration.constructor)(input)
            }
            None => {
                log::debug!("No registered source matched; building generic map");
                GenericMap::from_raw(input)
            }
        }
    }

    /// Build every input and keep them in order as a sequence
    pub fn create_sequence<I>(&self, inputs: I) -> MapResult<MapSequence>
    where
        I: IntoIterator<Item = RawImageInput>,
    {
        let maps = inputs
            .into_iter()
            .map(|input| self.create(input))
            .collect::<MapResult<Vec<_>>>()?;
        log::info!("Created sequence of {} maps", maps.len());
        Ok(MapSequence::new(maps))
    }

    /// Build every input and layer them, first input as base
    pub fn create_composite<I>(&self, inputs: I) -> MapResult<CompositeMap>
    where
        I: IntoIterator<Item = RawImageInput>,
    {
        let maps = inputs
            .into_iter()
            .map(|input| self.create(input))
            .collect::<MapResult<Vec<_>>>()?;
        log::info!("Created composite of {} maps", maps.len());
        Ok(CompositeMap::from_maps(maps))
    }
}

static DEFAULT_FACTORY: OnceLock<MapFactory> = OnceLock::new();

/// Install `factory` as the process-wide registry.
///
/// Must run before the first call to [`default_factory`] or [`create_map`];
/// the registry is read-only once set.
pub fn init_default_factory(factory: MapFactory) -> MapResult<()> {
    let sources = factory.registered_sources().join(", ");
    DEFAULT_FACTORY.set(factory).map_err(|_| {
        MapError::InvalidParameter("process-wide map factory is already initialised".to_string())
    })?;
    log::info!("Installed process-wide map factory: [{}]", sources);
    Ok(())
}

/// Process-wide factory; the built-in sources unless [`init_default_factory`] ran first
pub fn default_factory() -> &'static MapFactory {
    DEFAULT_FACTORY.get_or_init(MapFactory::with_default_sources)
}

/// Build a map through the process-wide factory
pub fn create_map(input: RawImageInput) -> MapResult<GenericMap> {
    default_factory().create(input)
}
