use approx::assert_abs_diff_eq;
use heliomap::core::{CoordinateEngine, ReprojectParams, RotateParams};
use heliomap::types::{AU_METERS, RSUN_REF_METERS};
use heliomap::{
    create_map, Aggregation, GenericMap, Interpolation, MapError, MetaDict, RawImageInput,
    WorldCoordinate,
};
use ndarray::Array2;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// AIA-style level 1 header: 0.6"/px, disk centre at `crpix`
fn aia_header(size: usize, crpix: f64) -> MetaDict {
    MetaDict::new()
        .with("NAXIS", 2i64)
        .with("NAXIS1", size as i64)
        .with("NAXIS2", size as i64)
        .with("DATE-OBS", "2011-06-07T06:33:02.880")
        .with("TELESCOP", "SDO/AIA")
        .with("INSTRUME", "AIA_3")
        .with("WAVELNTH", 171i64)
        .with("WAVEUNIT", "angstrom")
        .with("CTYPE1", "HPLN-TAN")
        .with("CTYPE2", "HPLT-TAN")
        .with("CUNIT1", "arcsec")
        .with("CUNIT2", "arcsec")
        .with("CDELT1", 0.6)
        .with("CDELT2", 0.6)
        .with("CRPIX1", crpix)
        .with("CRPIX2", crpix)
        .with("CRVAL1", 0.0)
        .with("CRVAL2", 0.0)
        .with("CROTA2", 0.0)
        .with("HGLN_OBS", 0.0)
        .with("HGLT_OBS", 0.0)
        .with("DSUN_OBS", AU_METERS)
        .with("RSUN_REF", RSUN_REF_METERS)
        .with("BUNIT", "DN")
        .with("EXPTIME", 2.0)
}

fn ramp(size: usize) -> Array2<f64> {
    Array2::from_shape_fn((size, size), |(r, c)| (r * size + c) as f64)
}

#[test]
fn test_crop_world_rectangle() {
    init_logging();

    // Reference pixel 1024 (1-based) leaves room for the whole rectangle
    let map = create_map(RawImageInput::new(ramp(2048), aia_header(2048, 1024.0)))
        .expect("Failed to build map");
    assert_eq!(map.source_name(), "aia");

    let bottom_left = WorldCoordinate::from_arcsec(-100.0, -400.0);
    let top_right = WorldCoordinate::from_arcsec(400.0, 100.0);
    let cropped = map.crop(bottom_left, top_right).expect("Crop failed");

    let expected = (500.0f64 / 0.6).ceil() as i64;
    let (rows, cols) = cropped.dimensions();
    println!("Cropped shape: {}x{} (expected about {})", rows, cols, expected);
    assert!((rows as i64 - expected).abs() <= 1);
    assert!((cols as i64 - expected).abs() <= 1);

    // Reference pixel moved with the crop and still maps to disk centre
    let reference = cropped.reference_pixel();
    assert_abs_diff_eq!(reference.x, 1023.0 - 856.0, epsilon = 1e-9);
    let centre = cropped.pixel_to_world(reference.x, reference.y);
    assert_abs_diff_eq!(centre.lon_arcsec(), 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(centre.lat_arcsec(), 0.0, epsilon = 1e-9);

    // The corners requested lie inside the result
    assert!(cropped.contains_coordinate(bottom_left));
    assert!(cropped.contains_coordinate(top_right));

    // Pixel values come from the matching source pixels
    assert_eq!(cropped.data()[[0, 0]], map.data()[[356, 856]]);

    // Metadata other than geometry is carried over
    assert_eq!(cropped.wavelength(), map.wavelength());
    assert_eq!(cropped.date(), map.date());
    assert_eq!(cropped.plot_settings().cmap, "sdoaia171");
}

#[test]
fn test_crop_is_idempotent() {
    init_logging();
    let map = create_map(RawImageInput::new(ramp(2048), aia_header(2048, 1024.0))).unwrap();
    let bottom_left = WorldCoordinate::from_arcsec(-100.0, -400.0);
    let top_right = WorldCoordinate::from_arcsec(400.0, 100.0);

    let once = map.crop(bottom_left, top_right).unwrap();
    let twice = once.crop(bottom_left, top_right).unwrap();
    assert_eq!(once.data(), twice.data());
    assert_eq!(once.reference_pixel(), twice.reference_pixel());
}

#[test]
fn test_crop_partially_outside_is_clipped() {
    init_logging();
    // Reference pixel 512 on a 1024 array: the rectangle runs off the bottom and right edges
    let map = create_map(RawImageInput::new(ramp(1024), aia_header(1024, 512.0))).unwrap();
    let cropped = map
        .crop(
            WorldCoordinate::from_arcsec(-100.0, -400.0),
            WorldCoordinate::from_arcsec(400.0, 100.0),
        )
        .unwrap();

    assert_eq!(cropped.dimensions(), (679, 680));
    assert_eq!(cropped.data()[[0, 0]], map.data()[[0, 344]]);

    let outside = map.crop(
        WorldCoordinate::from_arcsec(2000.0, 2000.0),
        WorldCoordinate::from_arcsec(2100.0, 2100.0),
    );
    assert!(matches!(outside, Err(MapError::OutOfBounds(_))));
}

#[test]
fn test_round_trip_law_with_roll() {
    let header = aia_header(1024, 512.5).with("CROTA2", 17.0);
    let map = create_map(RawImageInput::new(Array2::zeros((1024, 1024)), header)).unwrap();

    for &(x, y) in &[(0.0, 0.0), (511.5, 511.5), (1023.0, 0.0), (10.25, 900.75), (700.0, 300.0)] {
        let world = map.pixel_to_world(x, y);
        let pixel = map.world_to_pixel(world).unwrap();
        assert_abs_diff_eq!(pixel.x, x, epsilon = 1e-7);
        assert_abs_diff_eq!(pixel.y, y, epsilon = 1e-7);
    }
}

#[test]
fn test_arithmetic_scenarios() {
    init_logging();
    let a = create_map(RawImageInput::new(ramp(4), aia_header(4, 2.5))).unwrap();
    let b = a.multiply_scalar(3.0);

    let sum_ab = a.add(&b).unwrap();
    let sum_ba = b.add(&a).unwrap();
    assert_eq!(sum_ab.data(), sum_ba.data());
    assert!(sum_ab.is_derived());
    assert_eq!(sum_ab.source_name(), "generic");
    assert_eq!(sum_ab.coordinate_frame(), a.coordinate_frame());

    let small = create_map(RawImageInput::new(ramp(3), aia_header(3, 2.0))).unwrap();
    match a.add(&small) {
        Err(MapError::ShapeMismatch { left, right, .. }) => {
            assert_eq!(left, (4, 4));
            assert_eq!(right, (3, 3));
        }
        other => panic!("Expected shape mismatch, got {:?}", other),
    }
    let message = a.subtract(&small).unwrap_err().to_string();
    assert!(message.contains("subtract"));
}

#[test]
fn test_superpixel_and_resample_rescale_metadata() {
    let map = create_map(RawImageInput::new(ramp(16), aia_header(16, 8.5))).unwrap();

    let summed = map.superpixel(4, 4, Aggregation::default()).unwrap();
    assert_eq!(summed.dimensions(), (4, 4));
    assert_abs_diff_eq!(summed.scale().x_arcsec(), 2.4, epsilon = 1e-9);
    assert_abs_diff_eq!(summed.data().sum(), map.data().sum());

    let half = map.resample((8, 8), Interpolation::Bilinear).unwrap();
    assert_abs_diff_eq!(half.scale().y_arcsec(), 1.2, epsilon = 1e-9);
    let centre = half.center();
    assert_abs_diff_eq!(centre.lon_arcsec(), map.center().lon_arcsec(), epsilon = 1e-9);
}

#[test]
fn test_rotate_preserves_total_intensity() {
    init_logging();
    let size = 101;
    let data = Array2::from_shape_fn((size, size), |(r, c)| {
        let dx = c as f64 - 50.0;
        let dy = r as f64 - 50.0;
        1000.0 * (-(dx * dx + dy * dy) / (2.0 * 100.0)).exp()
    });
    let map = create_map(RawImageInput::new(data, aia_header(size, 51.0))).unwrap();

    let rotated = map.rotate(30.0, &RotateParams::default()).unwrap();
    assert!(rotated.dimensions().0 > size);
    assert_abs_diff_eq!(rotated.data().sum() / map.data().sum(), 1.0, epsilon = 1e-2);
    assert_abs_diff_eq!(rotated.rotation_angle(), -30.0, epsilon = 1e-9);

    // Disk centre keeps its world position
    let centre = rotated.world_to_pixel(WorldCoordinate::from_degrees(0.0, 0.0)).unwrap();
    let (rows, cols) = rotated.dimensions();
    assert_abs_diff_eq!(centre.x, (cols as f64 - 1.0) / 2.0, epsilon = 1e-9);
    assert_abs_diff_eq!(centre.y, (rows as f64 - 1.0) / 2.0, epsilon = 1e-9);

    let nearest = RotateParams {
        interpolation: Interpolation::Nearest,
        missing: f64::NAN,
    };
    let rotated = map.rotate(30.0, &nearest).unwrap();
    assert!(rotated.data()[[0, 0]].is_nan());
}

#[test]
fn test_reproject_onto_stonyhurst_grid() {
    init_logging();
    // Full disk at 8"/px
    let header = aia_header(300, 150.5).with("CDELT1", 8.0).with("CDELT2", 8.0);
    let map = create_map(RawImageInput::new(Array2::from_elem((300, 300), 1.0), header)).unwrap();

    let grid_header = MetaDict::new()
        .with("DATE-OBS", "2011-06-07T06:33:02.880")
        .with("CTYPE1", "HGLN-CAR")
        .with("CTYPE2", "HGLT-CAR")
        .with("CUNIT1", "deg")
        .with("CUNIT2", "deg")
        .with("CDELT1", 1.0)
        .with("CDELT2", 1.0)
        .with("CRPIX1", 181.0)
        .with("CRPIX2", 91.0)
        .with("CRVAL1", 0.0)
        .with("CRVAL2", 0.0);
    let grid = CoordinateEngine::from_header(&grid_header, (181, 361)).unwrap();

    let reprojected = map.reproject_to(&grid, &ReprojectParams::default()).unwrap();
    assert_eq!(reprojected.dimensions(), (181, 361));
    // Disk centre is visible, the far side is not
    assert_abs_diff_eq!(reprojected.data()[[90, 180]], 1.0, epsilon = 1e-9);
    assert!(reprojected.data()[[90, 180 + 120]].is_nan());
    assert!(reprojected.data()[[90, 180 - 120]].is_nan());

    // Carrington output is not supported
    let carrington = CoordinateEngine::from_header(
        &grid_header.clone().with("CTYPE1", "CRLN-CAR").with("CTYPE2", "CRLT-CAR"),
        (181, 361),
    )
    .unwrap();
    assert!(matches!(
        map.reproject_to(&carrington, &ReprojectParams::default()),
        Err(MapError::FrameMismatch(_))
    ));
}

#[test]
fn test_missing_metadata_is_reported() {
    let mut header = aia_header(4, 2.5);
    header.remove("CRVAL1");
    match GenericMap::from_raw(RawImageInput::new(ramp(4), header)) {
        Err(MapError::MissingMetadata { field }) => assert_eq!(field, "crval1"),
        other => panic!("Expected missing crval1, got {:?}", other),
    }

    let header = aia_header(4, 2.5).with("CTYPE1", "HPLN-ARC").with("CTYPE2", "HPLT-ARC");
    assert!(matches!(
        create_map(RawImageInput::new(ramp(4), header)),
        Err(MapError::UnsupportedProjection(_))
    ));
}
