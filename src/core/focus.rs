//! Extremal-density window selection.
//!
//! Locates the square sub-window of a cube where the per-pixel count of
//! valid observations sums to the global minimum or maximum, a quick way
//! to focus follow-up analysis on the best or worst covered area.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::cube::DataCube;
use crate::types::{CubeError, CubeResult};

/// Which extremum of the summed validity counts to look for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FocusStat {
    Min,
    Max,
}

impl std::fmt::Display for FocusStat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FocusStat::Min => write!(f, "min"),
            FocusStat::Max => write!(f, "max"),
        }
    }
}

/// Extract the square sub-cube of side `2 * half_width + 1` whose summed
/// validity count is extremal.
///
/// Counts come from the first band. Only fully-interior window positions
/// are evaluated; ties resolve to the first position in row-major scan
/// order. Both spatial axes must be strictly longer than the window side.
pub fn focus_window(cube: &DataCube, half_width: usize, stat: FocusStat) -> CubeResult<DataCube> {
    if half_width == 0 {
        return Err(CubeError::Validation(
            "the window half-width must be a positive integer".to_string(),
        ));
    }
    let side = 2 * half_width + 1;
    let rows = cube.latitudes().len();
    let cols = cube.longitudes().len();
    if rows.min(cols) <= side {
        return Err(CubeError::Validation(format!(
            "a {}x{} window does not fit strictly inside a {}x{} raster",
            side, side, rows, cols
        )));
    }

    let counts = cube.validity_counts();
    let sums = window_sums(&counts, side);

    let (win_r, win_c) = extremal_position(&sums, stat);
    log::debug!(
        "{} validity window of side {} found at rows {}..{}, cols {}..{}",
        stat,
        side,
        win_r,
        win_r + side,
        win_c,
        win_c + side
    );

    Ok(cube.slice_spatial(win_r..win_r + side, win_c..win_c + side))
}

/// Sliding-window sum of `counts` over every fully-interior position of a
/// square window, written into one pre-allocated buffer.
fn window_sums(counts: &Array2<u32>, side: usize) -> Array2<u64> {
    let (rows, cols) = counts.dim();
    let out_rows = rows - side + 1;
    let out_cols = cols - side + 1;
    let mut sums = Array2::<u64>::zeros((out_rows, out_cols));
    for r in 0..out_rows {
        for c in 0..out_cols {
            let mut total = 0u64;
            for dr in 0..side {
                for dc in 0..side {
                    total += u64::from(counts[[r + dr, c + dc]]);
                }
            }
            sums[[r, c]] = total;
        }
    }
    sums
}

/// First row-major position reaching the extremal sum.
fn extremal_position(sums: &Array2<u64>, stat: FocusStat) -> (usize, usize) {
    let (rows, cols) = sums.dim();
    let mut best = (0usize, 0usize);
    let mut best_sum = sums[[0, 0]];
    for r in 0..rows {
        for c in 0..cols {
            let s = sums[[r, c]];
            let better = match stat {
                FocusStat::Min => s < best_sum,
                FocusStat::Max => s > best_sum,
            };
            if better {
                best = (r, c);
                best_sum = s;
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cube::Band;
    use chrono::{TimeZone, Utc};
    use ndarray::Array3;

    /// One-time-step cube whose single band is valid everywhere except the
    /// listed pixels.
    fn cube_with_holes(rows: usize, cols: usize, holes: &[(usize, usize)]) -> DataCube {
        let mut values = Array3::<f32>::from_elem((1, rows, cols), 1.0);
        for &(r, c) in holes {
            values[[0, r, c]] = f32::NAN;
        }
        DataCube::new(
            vec![Utc.with_ymd_and_hms(2019, 6, 1, 10, 0, 0).unwrap()],
            (0..rows).map(|i| 45.0 + i as f64 * 0.01).collect(),
            (0..cols).map(|i| 7.0 + i as f64 * 0.01).collect(),
            vec![Band::new("red", values)],
        )
        .unwrap()
    }

    #[test]
    fn min_finds_the_single_sparse_window() {
        // missing data clustered around (5, 6)
        let cube = cube_with_holes(10, 10, &[(4, 5), (5, 6), (6, 7)]);
        let focused = focus_window(&cube, 1, FocusStat::Min).unwrap();

        // the 3x3 window centred on (5, 6) covers all three holes
        assert_eq!(focused.latitudes().len(), 3);
        assert_eq!(focused.longitudes().len(), 3);
        assert_eq!(focused.latitudes()[0], 45.0 + 4.0 * 0.01);
        assert_eq!(focused.longitudes()[0], 7.0 + 5.0 * 0.01);

        let red = focused.band("red").unwrap();
        let missing = red.iter().filter(|v| v.is_nan()).count();
        assert_eq!(missing, 3);
    }

    #[test]
    fn uniform_input_returns_first_window() {
        let cube = cube_with_holes(8, 8, &[]);
        let focused = focus_window(&cube, 2, FocusStat::Max).unwrap();
        assert_eq!(focused.latitudes()[0], 45.0);
        assert_eq!(focused.longitudes()[0], 7.0);
        assert_eq!(focused.latitudes().len(), 5);
    }

    #[test]
    fn max_prefers_the_densest_window() {
        // a sparse corner leaves the opposite corner densest
        let holes: Vec<(usize, usize)> = (0..4)
            .flat_map(|r| (0..4).map(move |c| (r, c)))
            .collect();
        let cube = cube_with_holes(9, 9, &holes);
        let focused = focus_window(&cube, 1, FocusStat::Max).unwrap();
        // first full-density window in row-major order starts past the holes
        assert_eq!(focused.latitudes()[0], 45.0);
        assert_eq!(focused.longitudes()[0], 7.0 + 4.0 * 0.01);
    }

    #[test]
    fn rejects_zero_half_width() {
        let cube = cube_with_holes(8, 8, &[]);
        assert!(focus_window(&cube, 0, FocusStat::Min).is_err());
    }

    #[test]
    fn rejects_window_not_strictly_inside() {
        let cube = cube_with_holes(7, 9, &[]);
        // side 7 == rows, must be strictly smaller
        assert!(focus_window(&cube, 3, FocusStat::Min).is_err());
    }
}
