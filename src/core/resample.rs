use crate::types::{Aggregation, Interpolation, MapArray, MapError, MapResult};
use ndarray::Array2;

/// Sample `image` at a fractional 0-based pixel position.
///
/// Positions outside the outer pixel edges return `fill`. Within the last half
/// pixel the edge value is used.
pub fn sample(image: &MapArray, x: f64, y: f64, interpolation: Interpolation, fill: f64) -> f64 {
    let (rows, cols) = image.dim();
    if rows == 0 || cols == 0 || !x.is_finite() || !y.is_finite() {
        return fill;
    }
    if x < -0.5 || y < -0.5 || x >= cols as f64 - 0.5 || y >= rows as f64 - 0.5 {
        return fill;
    }

    match interpolation {
        Interpolation::Nearest => {
            let col = (x + 0.5).floor() as usize;
            let row = (y + 0.5).floor() as usize;
            image[[row.min(rows - 1), col.min(cols - 1)]]
        }
        Interpolation::Bilinear => bilinear_interpolate(image, x, y),
    }
}

/// Bilinear interpolation, clamped to the array interior
fn bilinear_interpolate(image: &MapArray, x: f64, y: f64) -> f64 {
    let (rows, cols) = image.dim();
    let x = x.clamp(0.0, (cols - 1) as f64);
    let y = y.clamp(0.0, (rows - 1) as f64);

    let x1 = x.floor() as usize;
    let y1 = y.floor() as usize;
    let x2 = (x1 + 1).min(cols - 1);
    let y2 = (y1 + 1).min(rows - 1);

    let dx = x - x1 as f64;
    let dy = y - y1 as f64;

    let v11 = image[[y1, x1]];
    let v12 = image[[y2, x1]];
    let v21 = image[[y1, x2]];
    let v22 = image[[y2, x2]];

    // Skip zero-weight neighbours so NaNs next to an exact hit do not leak in
    let mut value = 0.0;
    for (v, w) in [
        (v11, (1.0 - dx) * (1.0 - dy)),
        (v21, dx * (1.0 - dy)),
        (v12, (1.0 - dx) * dy),
        (v22, dx * dy),
    ] {
        if w != 0.0 {
            value += v * w;
        }
    }
    value
}

/// Fill a new grid by evaluating `f(row, col)` for every pixel
#[cfg(feature = "parallel")]
pub fn fill_grid<F>(shape: (usize, usize), f: F) -> MapArray
where
    F: Fn(usize, usize) -> f64 + Sync + Send,
{
    let mut output = MapArray::zeros(shape);
    ndarray::Zip::indexed(&mut output).par_for_each(|(row, col), value| {
        *value = f(row, col);
    });
    output
}

/// Fill a new grid by evaluating `f(row, col)` for every pixel
#[cfg(not(feature = "parallel"))]
pub fn fill_grid<F>(shape: (usize, usize), f: F) -> MapArray
where
    F: Fn(usize, usize) -> f64 + Sync + Send,
{
    Array2::from_shape_fn(shape, |(row, col)| f(row, col))
}

/// Aggregate `factor_y` x `factor_x` blocks into single pixels.
///
/// The factors must divide the array shape exactly.
pub fn superpixel_array(
    data: &MapArray,
    factor_x: usize,
    factor_y: usize,
    aggregation: Aggregation,
) -> MapResult<MapArray> {
    let (rows, cols) = data.dim();

    if factor_x == 0 || factor_y == 0 {
        return Err(MapError::InvalidParameter(format!(
            "superpixel factors must be positive, got {}x{}",
            factor_x, factor_y
        )));
    }

    let out_rows = rows / factor_y;
    let out_cols = cols / factor_x;

    if out_rows == 0 || out_cols == 0 {
        return Err(MapError::InvalidParameter(format!(
            "superpixel factors {}x{} too large for {}x{} array",
            factor_x, factor_y, cols, rows
        )));
    }
    if rows % factor_y != 0 || cols % factor_x != 0 {
        return Err(MapError::InvalidParameter(format!(
            "superpixel factors {}x{} do not divide {}x{} array ({} columns, {} rows left over)",
            factor_x,
            factor_y,
            cols,
            rows,
            cols % factor_x,
            rows % factor_y
        )));
    }

    log::debug!("Superpixel ({}): {}x{} -> {}x{}", aggregation, rows, cols, out_rows, out_cols);

    let block_size = (factor_x * factor_y) as f64;
    let output = Array2::from_shape_fn((out_rows, out_cols), |(out_row, out_col)| {
        let start_row = out_row * factor_y;
        let start_col = out_col * factor_x;
        let block = data.slice(ndarray::s![
            start_row..start_row + factor_y,
            start_col..start_col + factor_x
        ]);
        let sum: f64 = block.sum();
        match aggregation {
            Aggregation::Sum => sum,
            Aggregation::Mean => sum / block_size,
        }
    });

    Ok(output)
}

/// Resample onto a grid of `new_shape` (rows, columns) covering the same area
pub fn resample_array(
    data: &MapArray,
    new_shape: (usize, usize),
    interpolation: Interpolation,
) -> MapResult<MapArray> {
    let (rows, cols) = data.dim();
    let (new_rows, new_cols) = new_shape;
    if new_rows == 0 || new_cols == 0 {
        return Err(MapError::InvalidParameter(format!(
            "cannot resample to empty shape {:?}",
            new_shape
        )));
    }

    let scale_x = cols as f64 / new_cols as f64;
    let scale_y = rows as f64 / new_rows as f64;

    Ok(fill_grid(new_shape, |row, col| {
        let x = (col as f64 + 0.5) * scale_x - 0.5;
        let y = (row as f64 + 0.5) * scale_y - 0.5;
        sample(data, x, y, interpolation, f64::NAN)
    }))
}

/// Geometry of a rotated canvas relative to its source array
#[derive(Debug, Clone, Copy)]
pub struct RotatedCanvas {
    pub shape: (usize, usize),
    /// Rotation centre in the source array, 0-based (x, y)
    pub source_center: (f64, f64),
    /// Rotation centre in the rotated array, 0-based (x, y)
    pub target_center: (f64, f64),
    pub sin: f64,
    pub cos: f64,
}

impl RotatedCanvas {
    /// Canvas large enough to hold `shape` rotated by `angle` degrees counterclockwise
    pub fn new(shape: (usize, usize), angle: f64) -> Self {
        let (rows, cols) = shape;
        let (sin, cos) = angle.to_radians().sin_cos();
        let extent = |a: f64, b: f64| ((a.abs() + b.abs()) - 1e-6).ceil().max(1.0) as usize;
        let new_cols = extent(cols as f64 * cos, rows as f64 * sin);
        let new_rows = extent(cols as f64 * sin, rows as f64 * cos);

        Self {
            shape: (new_rows, new_cols),
            source_center: ((cols as f64 - 1.0) / 2.0, (rows as f64 - 1.0) / 2.0),
            target_center: ((new_cols as f64 - 1.0) / 2.0, (new_rows as f64 - 1.0) / 2.0),
            sin,
            cos,
        }
    }

    /// Position in the rotated array of a source pixel
    pub fn forward(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = x - self.source_center.0;
        let dy = y - self.source_center.1;
        (
            self.target_center.0 + self.cos * dx - self.sin * dy,
            self.target_center.1 + self.sin * dx + self.cos * dy,
        )
    }

    /// Source position of a pixel in the rotated array
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = x - self.target_center.0;
        let dy = y - self.target_center.1;
        (
            self.source_center.0 + self.cos * dx + self.sin * dy,
            self.source_center.1 - self.sin * dx + self.cos * dy,
        )
    }
}

/// Rotate pixel data counterclockwise by `angle` degrees onto an expanded canvas
pub fn rotate_array(
    data: &MapArray,
    angle: f64,
    interpolation: Interpolation,
    missing: f64,
) -> (MapArray, RotatedCanvas) {
    let canvas = RotatedCanvas::new(data.dim(), angle);
    log::debug!(
        "Rotating {:?} array by {:.3} deg onto {:?} canvas",
        data.dim(),
        angle,
        canvas.shape
    );

    let rotated = fill_grid(canvas.shape, |row, col| {
        let (x, y) = canvas.inverse(col as f64, row as f64);
        // Snap positions that are integral up to round-off
        let (x, y) = (snap(x), snap(y));
        sample(data, x, y, interpolation, missing)
    });
    (rotated, canvas)
}

fn snap(v: f64) -> f64 {
    let rounded = v.round();
    if (v - rounded).abs() < 1e-9 {
        rounded
    } else {
        v
    }
}

/// Finite min/max of an array, `None` when no pixel is finite
pub fn finite_range(data: &MapArray) -> Option<(f64, f64)> {
    data.iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array;

    #[test]
    fn test_superpixel_sum_and_mean() {
        let data = Array::from_shape_vec(
            (4, 4),
            vec![
                1.0, 2.0, 3.0, 4.0,
                5.0, 6.0, 7.0, 8.0,
                9.0, 10.0, 11.0, 12.0,
                13.0, 14.0, 15.0, 16.0,
            ],
        )
        .unwrap();

        let summed = superpixel_array(&data, 2, 2, Aggregation::Sum).unwrap();
        assert_eq!(summed.dim(), (2, 2));
        assert_eq!(summed[[0, 0]], 14.0); // 1+2+5+6
        assert_eq!(summed[[1, 1]], 54.0); // 11+12+15+16

        let averaged = superpixel_array(&data, 2, 2, Aggregation::Mean).unwrap();
        assert_eq!(averaged[[0, 0]], 3.5);
        assert_eq!(averaged[[0, 1]], 5.5);
    }

    #[test]
    fn test_superpixel_asymmetric_and_invalid() {
        let data = Array::from_shape_vec((2, 4), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0])
            .unwrap();
        let result = superpixel_array(&data, 2, 1, Aggregation::Sum).unwrap();
        assert_eq!(result.dim(), (2, 2));
        assert_eq!(result[[1, 0]], 11.0);

        assert!(superpixel_array(&data, 0, 1, Aggregation::Sum).is_err());
        assert!(superpixel_array(&data, 8, 1, Aggregation::Sum).is_err());

        // Blocks must tile the array exactly
        match superpixel_array(&data, 3, 1, Aggregation::Sum) {
            Err(MapError::InvalidParameter(message)) => assert!(message.contains("do not divide")),
            other => panic!("expected invalid parameter, got {:?}", other),
        }
        assert!(superpixel_array(&data, 2, 2, Aggregation::Sum).is_ok());
        assert!(superpixel_array(&data, 1, 3, Aggregation::Sum).is_err());
    }

    #[test]
    fn test_sample_edges() {
        let data = Array2::from_shape_fn((3, 3), |(r, c)| (r * 3 + c) as f64);
        assert_eq!(sample(&data, 1.0, 1.0, Interpolation::Bilinear, -1.0), 4.0);
        assert_eq!(sample(&data, 1.5, 1.0, Interpolation::Bilinear, -1.0), 4.5);
        assert_eq!(sample(&data, 1.4, 0.6, Interpolation::Nearest, -1.0), 4.0);
        assert_eq!(sample(&data, -0.4, 0.0, Interpolation::Bilinear, -1.0), 0.0);
        assert_eq!(sample(&data, -0.6, 0.0, Interpolation::Bilinear, -1.0), -1.0);
        assert!(sample(&data, 3.0, 0.0, Interpolation::Nearest, f64::NAN).is_nan());
    }

    #[test]
    fn test_resample_identity_and_downsample() {
        let data = Array2::from_shape_fn((4, 4), |(r, c)| (r * 4 + c) as f64);
        let same = resample_array(&data, (4, 4), Interpolation::Bilinear).unwrap();
        assert_eq!(same, data);

        let half = resample_array(&data, (2, 2), Interpolation::Bilinear).unwrap();
        // Each output centre falls between four input pixels
        assert_abs_diff_eq!(half[[0, 0]], 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(half[[1, 1]], 12.5, epsilon = 1e-12);
    }

    #[test]
    fn test_rotate_quarter_turn_preserves_intensity() {
        let data = Array2::from_shape_fn((3, 4), |(r, c)| (r * 4 + c + 1) as f64);
        for interpolation in [Interpolation::Nearest, Interpolation::Bilinear] {
            let (rotated, canvas) = rotate_array(&data, 90.0, interpolation, 0.0);
            assert_eq!(canvas.shape, (4, 3));
            assert_abs_diff_eq!(rotated.sum(), data.sum(), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_rotate_smooth_blob_preserves_intensity() {
        let data = Array2::from_shape_fn((41, 41), |(r, c)| {
            let dx = c as f64 - 20.0;
            let dy = r as f64 - 20.0;
            (-(dx * dx + dy * dy) / (2.0 * 16.0)).exp()
        });
        let (rotated, _) = rotate_array(&data, 30.0, Interpolation::Bilinear, 0.0);
        let ratio = rotated.sum() / data.sum();
        assert_abs_diff_eq!(ratio, 1.0, epsilon = 1e-2);
    }

    #[test]
    fn test_canvas_forward_inverse() {
        let canvas = RotatedCanvas::new((10, 20), 37.0);
        let (x, y) = canvas.forward(3.0, 7.0);
        let (bx, by) = canvas.inverse(x, y);
        assert_abs_diff_eq!(bx, 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(by, 7.0, epsilon = 1e-12);
    }
}
