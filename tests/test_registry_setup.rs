use heliomap::core::{AiaSource, EitSource};
use heliomap::{create_map, init_default_factory, GenericMap, MapError, MapFactory, MetaDict, RawImageInput};
use ndarray::Array2;
use std::sync::Arc;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn header(instrume: &str) -> MetaDict {
    MetaDict::new()
        .with("DATE-OBS", "2019-04-02T09:30:00")
        .with("INSTRUME", instrume)
        .with("WAVELNTH", 171i64)
        .with("CTYPE1", "HPLN-TAN")
        .with("CTYPE2", "HPLT-TAN")
        .with("CUNIT1", "arcsec")
        .with("CUNIT2", "arcsec")
        .with("CDELT1", 1.2)
        .with("CDELT2", 1.2)
        .with("CRPIX1", 2.5)
        .with("CRPIX2", 2.5)
        .with("CRVAL1", 0.0)
        .with("CRVAL2", 0.0)
}

fn raw(instrume: &str) -> RawImageInput {
    RawImageInput::new(Array2::from_elem((4, 4), 1.0), header(instrume))
}

// The process-wide registry can be set only once per process, so this binary
// holds a single test.
#[test]
fn test_startup_registration_is_used_by_create_map() {
    init_logging();

    let mut factory = MapFactory::new();
    factory
        .register(
            "aia_calibrated",
            |header| header.get_str("instrume").map_or(false, |i| i.starts_with("AIA")),
            |input| GenericMap::from_raw(input).map(|map| map.add_scalar(100.0)),
        )
        .register_source(Arc::new(AiaSource))
        .register_source(Arc::new(EitSource));
    init_default_factory(factory).expect("Failed to install map factory");

    // The custom predicate comes first and shadows the built-in AIA source
    let map = create_map(raw("AIA_3")).expect("Failed to build map");
    assert_eq!(map.data()[[0, 0]], 101.0);
    assert!(map.is_derived());

    // Other registrations still dispatch normally
    assert_eq!(create_map(raw("EIT")).unwrap().source_name(), "eit");
    assert_eq!(create_map(raw("SUVI")).unwrap().source_name(), "generic");

    // Read-only after setup
    assert!(matches!(
        init_default_factory(MapFactory::with_default_sources()),
        Err(MapError::InvalidParameter(_))
    ));
    assert_eq!(create_map(raw("AIA_3")).unwrap().data()[[0, 0]], 101.0);
}
