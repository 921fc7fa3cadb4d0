//! Cross-resolution grid harmonization.
//!
//! Aligns a coarse-pitch cube (so far Landsat, 30 m) and a fine-pitch cube
//! (so far Sentinel-2, 10 m) onto one shared grid, either by replicating
//! coarse pixels onto the fine grid or by block-reducing fine pixels onto
//! the coarse grid, then combines both along the time axis.

use std::cmp::Ordering;
use std::str::FromStr;

use ndarray::{concatenate, Axis};
use num_traits::Float;
use serde::{Deserialize, Serialize};

use crate::cube::{Band, DataCube};
use crate::types::{axis_bounds, BandCube, CubeError, CubeResult, QUALITY_BAND_NAMES};

/// The only supported pixel-pitch ratio between the two grids
/// (10 m Sentinel-2 against 30 m Landsat).
pub const RESOLUTION_RATIO: usize = 3;

/// Relative tolerance for resolution and origin comparisons; coordinate
/// arrays rarely store pitches exactly.
const GRID_TOLERANCE: f64 = 0.001;

/// How the two resolutions are reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResampleMode {
    /// Replicate each coarse pixel into a 3x3 block on the fine grid
    Up,
    /// Reduce each fine 3x3 block onto the coarse grid by its mean
    DownMean,
    /// Reduce each fine 3x3 block onto the coarse grid by its median
    DownMedian,
}

impl std::fmt::Display for ResampleMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResampleMode::Up => write!(f, "up"),
            ResampleMode::DownMean => write!(f, "down_mean"),
            ResampleMode::DownMedian => write!(f, "down_median"),
        }
    }
}

impl FromStr for ResampleMode {
    type Err = CubeError;

    fn from_str(s: &str) -> CubeResult<Self> {
        match s {
            "up" => Ok(ResampleMode::Up),
            "down_mean" => Ok(ResampleMode::DownMean),
            "down_median" => Ok(ResampleMode::DownMedian),
            other => Err(CubeError::Configuration(format!(
                "unknown resample mode \"{}\": expected up, down_mean or down_median",
                other
            ))),
        }
    }
}

/// Harmonize a coarse and a fine cube onto one grid.
///
/// Preconditions, all checked before any data is touched: the pixel-count
/// ratio is exactly [`RESOLUTION_RATIO`] on both axes, resolutions and
/// minimum-corner alignment agree within 0.1%, and both cubes carry the
/// same non-flag bands. Quality bands (`pixel_qa`, `slc`) are never part
/// of the output.
///
/// The output takes the coordinates of the target-resolution input (fine
/// for [`ResampleMode::Up`], coarse otherwise), holds both inputs' time
/// steps and is sorted ascending by time.
pub fn harmonize(coarse: &DataCube, fine: &DataCube, mode: ResampleMode) -> CubeResult<DataCube> {
    validate_grids(coarse, fine)?;
    let vars = shared_band_names(coarse, fine)?;

    log::info!(
        "harmonizing {} bands {} onto the {} grid",
        vars.len(),
        mode,
        match mode {
            ResampleMode::Up => "fine",
            _ => "coarse",
        }
    );

    let (target, times, bands) = match mode {
        ResampleMode::Up => {
            let mut bands = Vec::with_capacity(vars.len());
            for name in &vars {
                let coarse_band = band_values(coarse, name)?;
                let fine_band = band_values(fine, name)?;
                let tiled = upsample_tiles(coarse_band, RESOLUTION_RATIO);
                bands.push(Band::new(name.clone(), concat_bands(fine_band, &tiled)?));
            }
            let mut times = fine.times().to_vec();
            times.extend_from_slice(coarse.times());
            (fine, times, bands)
        }
        ResampleMode::DownMean | ResampleMode::DownMedian => {
            let mut bands = Vec::with_capacity(vars.len());
            for name in &vars {
                let coarse_band = band_values(coarse, name)?;
                let fine_band = band_values(fine, name)?;
                let reduced = block_reduce(fine_band, RESOLUTION_RATIO, mode);
                bands.push(Band::new(name.clone(), concat_bands(coarse_band, &reduced)?));
            }
            let mut times = coarse.times().to_vec();
            times.extend_from_slice(fine.times());
            (coarse, times, bands)
        }
    };

    let combined = DataCube::new(
        times,
        target.latitudes().to_vec(),
        target.longitudes().to_vec(),
        bands,
    )?;
    Ok(combined.sorted_by_time())
}

fn validate_grids(coarse: &DataCube, fine: &DataCube) -> CubeResult<()> {
    let cols_c = coarse.longitudes().len();
    let rows_c = coarse.latitudes().len();
    let cols_f = fine.longitudes().len();
    let rows_f = fine.latitudes().len();

    if cols_f != cols_c * RESOLUTION_RATIO {
        return Err(CubeError::Validation(format!(
            "the column count ratio between the fine and coarse grids must be {} (got {} / {})",
            RESOLUTION_RATIO, cols_f, cols_c
        )));
    }
    if rows_f != rows_c * RESOLUTION_RATIO {
        return Err(CubeError::Validation(format!(
            "the row count ratio between the fine and coarse grids must be {} (got {} / {})",
            RESOLUTION_RATIO, rows_f, rows_c
        )));
    }

    let grid_c = coarse.grid()?;
    let grid_f = fine.grid()?;
    let ratio = RESOLUTION_RATIO as f64;

    if (grid_f.res_x - grid_c.res_x / ratio).abs() / grid_f.res_x > GRID_TOLERANCE {
        return Err(CubeError::Validation(format!(
            "the coarse column resolution {} is not {} times the fine resolution {}",
            grid_c.res_x, RESOLUTION_RATIO, grid_f.res_x
        )));
    }
    if (grid_f.res_y - grid_c.res_y / ratio).abs() / grid_f.res_y > GRID_TOLERANCE {
        return Err(CubeError::Validation(format!(
            "the coarse row resolution {} is not {} times the fine resolution {}",
            grid_c.res_y, RESOLUTION_RATIO, grid_f.res_y
        )));
    }

    // The outermost coarse pixel centre sits one fine pixel inside the
    // outermost fine pixel centre when the grids overlay.
    let (min_lon_c, _) = axis_bounds(coarse.longitudes());
    let (min_lon_f, _) = axis_bounds(fine.longitudes());
    if ((min_lon_c - min_lon_f).abs() - grid_f.res_x).abs() > grid_f.res_x * GRID_TOLERANCE {
        return Err(CubeError::Validation(
            "the longitudinal extents of the two grids do not overlay; load both products over a window derived from the coarse grid".to_string(),
        ));
    }
    let (min_lat_c, _) = axis_bounds(coarse.latitudes());
    let (min_lat_f, _) = axis_bounds(fine.latitudes());
    if ((min_lat_c - min_lat_f).abs() - grid_f.res_y).abs() > grid_f.res_y * GRID_TOLERANCE {
        return Err(CubeError::Validation(
            "the latitudinal extents of the two grids do not overlay; load both products over a window derived from the coarse grid".to_string(),
        ));
    }

    Ok(())
}

/// Sorted non-flag band names, required identical on both inputs.
fn shared_band_names(coarse: &DataCube, fine: &DataCube) -> CubeResult<Vec<String>> {
    let select = |cube: &DataCube| -> Vec<String> {
        let mut names: Vec<String> = cube
            .bands()
            .iter()
            .map(|b| b.name.clone())
            .filter(|n| !QUALITY_BAND_NAMES.contains(&n.as_str()))
            .collect();
        names.sort();
        names
    };

    let vars_c = select(coarse);
    let vars_f = select(fine);
    if vars_c != vars_f {
        return Err(CubeError::Validation(format!(
            "measurement bands differ between the two cubes: {:?} vs {:?}",
            vars_c, vars_f
        )));
    }
    if vars_c.is_empty() {
        return Err(CubeError::Validation(
            "no measurement band left to harmonize once quality bands are excluded".to_string(),
        ));
    }
    Ok(vars_c)
}

fn band_values<'a>(cube: &'a DataCube, name: &str) -> CubeResult<&'a BandCube> {
    cube.band(name).ok_or_else(|| {
        CubeError::Validation(format!("band \"{}\" disappeared during harmonization", name))
    })
}

fn concat_bands(first: &BandCube, second: &BandCube) -> CubeResult<BandCube> {
    concatenate(Axis(0), &[first.view(), second.view()])
        .map_err(|e| CubeError::Validation(format!("time concatenation failed: {}", e)))
}

/// Replicate every pixel into a `ratio` x `ratio` block.
///
/// One output buffer is pre-allocated and filled by index arithmetic; for
/// ratio 3 it holds nine times the input samples, the transient peak of the
/// whole pipeline.
fn upsample_tiles(values: &BandCube, ratio: usize) -> BandCube {
    let (nt, rows, cols) = values.dim();
    let mut out = BandCube::from_elem((nt, rows * ratio, cols * ratio), f32::NAN);
    for t in 0..nt {
        for r in 0..rows {
            for c in 0..cols {
                let v = values[[t, r, c]];
                for dr in 0..ratio {
                    for dc in 0..ratio {
                        out[[t, r * ratio + dr, c * ratio + dc]] = v;
                    }
                }
            }
        }
    }
    out
}

/// Reduce every non-overlapping `ratio` x `ratio` block to its mean or
/// median, ignoring missing samples. An all-missing block stays missing.
fn block_reduce(values: &BandCube, ratio: usize, mode: ResampleMode) -> BandCube {
    let (nt, rows, cols) = values.dim();
    let (out_rows, out_cols) = (rows / ratio, cols / ratio);
    let mut out = BandCube::from_elem((nt, out_rows, out_cols), f32::NAN);
    let mut block: Vec<f32> = Vec::with_capacity(ratio * ratio);

    for t in 0..nt {
        for r in 0..out_rows {
            for c in 0..out_cols {
                block.clear();
                for dr in 0..ratio {
                    for dc in 0..ratio {
                        let v = values[[t, r * ratio + dr, c * ratio + dc]];
                        if !v.is_nan() {
                            block.push(v);
                        }
                    }
                }
                out[[t, r, c]] = match mode {
                    ResampleMode::DownMedian => median(&mut block),
                    _ => mean(&block),
                };
            }
        }
    }
    out
}

fn mean<T: Float>(values: &[T]) -> T {
    if values.is_empty() {
        return T::nan();
    }
    let mut sum = T::zero();
    let mut count = T::zero();
    for &v in values {
        sum = sum + v;
        count = count + T::one();
    }
    sum / count
}

fn median<T: Float>(values: &mut [T]) -> T {
    if values.is_empty() {
        return T::nan();
    }
    values.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) / (T::one() + T::one())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::{DateTime, TimeZone, Utc};
    use ndarray::Array3;

    fn t(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 6, day, 10, 0, 0).unwrap()
    }

    /// Coarse axis of `n` centres with pitch `step`, and the matching fine
    /// axis of `3 n` centres overlaying it.
    fn paired_axes(origin: f64, step: f64, n: usize) -> (Vec<f64>, Vec<f64>) {
        let fine_step = step / 3.0;
        let coarse = (0..n).map(|i| origin + i as f64 * step).collect();
        let fine = (0..3 * n)
            .map(|j| origin - fine_step + j as f64 * fine_step)
            .collect();
        (coarse, fine)
    }

    fn coarse_cube(day: u32, values: Vec<f32>, n: usize) -> DataCube {
        let (lat, _) = paired_axes(45.0, 0.0009, n);
        let (lon, _) = paired_axes(7.0, 0.0009, n);
        DataCube::new(
            vec![t(day)],
            lat,
            lon,
            vec![Band::new(
                "red",
                Array3::from_shape_vec((1, n, n), values).unwrap(),
            )],
        )
        .unwrap()
    }

    fn fine_cube(day: u32, values: Vec<f32>, n: usize) -> DataCube {
        let (_, lat) = paired_axes(45.0, 0.0009, n);
        let (_, lon) = paired_axes(7.0, 0.0009, n);
        DataCube::new(
            vec![t(day)],
            lat,
            lon,
            vec![Band::new(
                "red",
                Array3::from_shape_vec((1, 3 * n, 3 * n), values).unwrap(),
            )],
        )
        .unwrap()
    }

    #[test]
    fn upsample_then_block_average_recovers_coarse_values() {
        let coarse = coarse_cube(1, vec![1.0, 2.0, 3.0, 4.0], 2);
        let fine = fine_cube(2, vec![0.5; 36], 2);

        let fused = harmonize(&coarse, &fine, ResampleMode::Up).unwrap();
        assert_eq!(fused.times(), &[t(1), t(2)]);
        let red = fused.band("red").unwrap();

        // time slice 0 is the tiled coarse input; averaging each 3x3 block
        // must give back the original pixel
        for (r, c, want) in [(0, 0, 1.0), (0, 1, 2.0), (1, 0, 3.0), (1, 1, 4.0)] {
            let mut sum = 0.0;
            for dr in 0..3 {
                for dc in 0..3 {
                    sum += red[[0, r * 3 + dr, c * 3 + dc]];
                }
            }
            assert_abs_diff_eq!(sum / 9.0, want, epsilon = 1e-6);
        }
        // time slice 1 is the untouched fine input
        assert_abs_diff_eq!(red[[1, 0, 0]], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn down_mean_ignores_missing_samples() {
        let coarse = coarse_cube(5, vec![9.0, 9.0, 9.0, 9.0], 2);
        let mut values = vec![f32::NAN; 36];
        // first 3x3 block (rows 0..3, cols 0..3 of a 6-wide grid): two
        // valid samples, the rest missing
        values[0] = 2.0;
        values[7] = 4.0; // row 1, col 1
        let fine = fine_cube(6, values, 2);

        let fused = harmonize(&coarse, &fine, ResampleMode::DownMean).unwrap();
        let red = fused.band("red").unwrap();

        // slice 0 = coarse input day 5, slice 1 = reduced fine day 6
        assert_abs_diff_eq!(red[[1, 0, 0]], 3.0, epsilon = 1e-6);
        assert!(red[[1, 0, 1]].is_nan());
        assert!(red[[1, 1, 1]].is_nan());
    }

    #[test]
    fn down_median_takes_block_median() {
        let coarse = coarse_cube(5, vec![0.0; 4], 2);
        let mut values = vec![f32::NAN; 36];
        let block: [f32; 9] = [5.0, 1.0, 3.0, 2.0, 4.0, 9.0, 8.0, 7.0, 6.0];
        for dr in 0..3 {
            for dc in 0..3 {
                values[dr * 6 + dc] = block[dr * 3 + dc];
            }
        }
        let fine = fine_cube(6, values, 2);

        let fused = harmonize(&coarse, &fine, ResampleMode::DownMedian).unwrap();
        let red = fused.band("red").unwrap();
        assert_abs_diff_eq!(red[[1, 0, 0]], 5.0, epsilon = 1e-6);
    }

    #[test]
    fn rejects_ratio_two_pairing() {
        let coarse = coarse_cube(1, vec![1.0, 2.0, 3.0, 4.0], 2);
        // 4x4 "fine" grid: ratio 2, not 3
        let lat: Vec<f64> = (0..4).map(|i| 45.0 + i as f64 * 0.00045).collect();
        let lon: Vec<f64> = (0..4).map(|i| 7.0 + i as f64 * 0.00045).collect();
        let fine = DataCube::new(
            vec![t(2)],
            lat,
            lon,
            vec![Band::new("red", Array3::zeros((1, 4, 4)))],
        )
        .unwrap();

        assert!(matches!(
            harmonize(&coarse, &fine, ResampleMode::Up),
            Err(CubeError::Validation(_))
        ));
    }

    #[test]
    fn rejects_inconsistent_resolution() {
        let coarse = coarse_cube(1, vec![1.0, 2.0, 3.0, 4.0], 2);
        // right pixel count, wrong pitch
        let lat: Vec<f64> = (0..6).map(|i| 45.0 - 0.0003 + i as f64 * 0.0004).collect();
        let lon: Vec<f64> = (0..6).map(|i| 7.0 - 0.0003 + i as f64 * 0.0004).collect();
        let fine = DataCube::new(
            vec![t(2)],
            lat,
            lon,
            vec![Band::new("red", Array3::zeros((1, 6, 6)))],
        )
        .unwrap();

        assert!(matches!(
            harmonize(&coarse, &fine, ResampleMode::Up),
            Err(CubeError::Validation(_))
        ));
    }

    #[test]
    fn rejects_shifted_origin() {
        let coarse = coarse_cube(1, vec![1.0, 2.0, 3.0, 4.0], 2);
        let fine_step = 0.0003;
        // shifted by two fine pixels instead of one
        let lat: Vec<f64> = (0..6).map(|i| 45.0 - 2.0 * fine_step + i as f64 * fine_step).collect();
        let lon: Vec<f64> = (0..6).map(|i| 7.0 - fine_step + i as f64 * fine_step).collect();
        let fine = DataCube::new(
            vec![t(2)],
            lat,
            lon,
            vec![Band::new("red", Array3::zeros((1, 6, 6)))],
        )
        .unwrap();

        assert!(matches!(
            harmonize(&coarse, &fine, ResampleMode::Up),
            Err(CubeError::Validation(_))
        ));
    }

    #[test]
    fn rejects_different_band_sets() {
        let coarse = coarse_cube(1, vec![1.0, 2.0, 3.0, 4.0], 2);
        let (_, lat) = paired_axes(45.0, 0.0009, 2);
        let (_, lon) = paired_axes(7.0, 0.0009, 2);
        let fine = DataCube::new(
            vec![t(2)],
            lat,
            lon,
            vec![Band::new("nir", Array3::zeros((1, 6, 6)))],
        )
        .unwrap();

        assert!(matches!(
            harmonize(&coarse, &fine, ResampleMode::Up),
            Err(CubeError::Validation(_))
        ));
    }

    #[test]
    fn resample_mode_parsing() {
        assert_eq!("up".parse::<ResampleMode>().unwrap(), ResampleMode::Up);
        assert_eq!(
            "down_median".parse::<ResampleMode>().unwrap(),
            ResampleMode::DownMedian
        );
        assert!("bilinear".parse::<ResampleMode>().is_err());
    }
}
