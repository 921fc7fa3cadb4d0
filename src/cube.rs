//! Labeled data-cube container shared by the cleaning and fusion pipeline.
//!
//! A [`DataCube`] holds one or more named band cubes over common
//! (time, latitude, longitude) coordinate axes. Every operation returns a
//! fresh cube; nothing is mutated in place.

use chrono::{DateTime, Utc};
use ndarray::{concatenate, s, Array2, Axis};

use crate::types::{
    BandCube, CleanMask, CubeError, CubeExtents, CubeResult, GridDescriptor,
};

/// One named measurement band
#[derive(Debug, Clone)]
pub struct Band {
    pub name: String,
    pub values: BandCube,
}

impl Band {
    pub fn new(name: impl Into<String>, values: BandCube) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Multi-band raster time series over a uniform geographic grid
#[derive(Debug, Clone)]
pub struct DataCube {
    times: Vec<DateTime<Utc>>,
    latitudes: Vec<f64>,
    longitudes: Vec<f64>,
    bands: Vec<Band>,
}

impl DataCube {
    /// Build a cube, validating that every band matches the coordinate
    /// axes. The time axis may be empty (a load that found nothing),
    /// the spatial axes and the band list may not.
    pub fn new(
        times: Vec<DateTime<Utc>>,
        latitudes: Vec<f64>,
        longitudes: Vec<f64>,
        bands: Vec<Band>,
    ) -> CubeResult<Self> {
        if latitudes.is_empty() || longitudes.is_empty() {
            return Err(CubeError::Validation(
                "spatial coordinate axes must not be empty".to_string(),
            ));
        }
        if bands.is_empty() {
            return Err(CubeError::Validation(
                "a data cube needs at least one band".to_string(),
            ));
        }
        let expected = (times.len(), latitudes.len(), longitudes.len());
        for band in &bands {
            if band.values.dim() != expected {
                return Err(CubeError::Validation(format!(
                    "band \"{}\" has shape {:?}, expected {:?} from the coordinate axes",
                    band.name,
                    band.values.dim(),
                    expected
                )));
            }
        }
        Ok(Self {
            times,
            latitudes,
            longitudes,
            bands,
        })
    }

    pub fn times(&self) -> &[DateTime<Utc>] {
        &self.times
    }

    pub fn latitudes(&self) -> &[f64] {
        &self.latitudes
    }

    pub fn longitudes(&self) -> &[f64] {
        &self.longitudes
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn band(&self, name: &str) -> Option<&BandCube> {
        self.bands
            .iter()
            .find(|b| b.name == name)
            .map(|b| &b.values)
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(|b| b.name.as_str()).collect()
    }

    /// First band in request order; the convention throughout the pipeline
    /// for deriving validity information.
    pub fn first_band(&self) -> &Band {
        &self.bands[0]
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Grid geometry of the spatial axes.
    pub fn grid(&self) -> CubeResult<GridDescriptor> {
        GridDescriptor::from_axes(&self.longitudes, &self.latitudes)
    }

    /// Padded spatial extent plus acquisition time span.
    pub fn extents(&self) -> CubeResult<CubeExtents> {
        let grid = self.grid()?;
        let start = self.times.iter().min();
        let end = self.times.iter().max();
        match (start, end) {
            (Some(&start_time), Some(&end_time)) => Ok(CubeExtents {
                extent: grid.extent,
                start_time,
                end_time,
            }),
            _ => Err(CubeError::Validation(
                "cannot summarize the extents of a cube with an empty time axis".to_string(),
            )),
        }
    }

    /// Append another cube along the time axis.
    ///
    /// Both cubes must share the exact same spatial coordinates and band
    /// names in the same order; the output keeps the concatenation order
    /// (sort afterwards if ascending time is needed).
    pub fn concat_time(&self, other: &DataCube) -> CubeResult<DataCube> {
        if self.latitudes != other.latitudes || self.longitudes != other.longitudes {
            return Err(CubeError::Validation(
                "cannot concatenate cubes over different spatial grids".to_string(),
            ));
        }
        if self.band_names() != other.band_names() {
            return Err(CubeError::Validation(format!(
                "cannot concatenate cubes with different bands: {:?} vs {:?}",
                self.band_names(),
                other.band_names()
            )));
        }

        let mut times = self.times.clone();
        times.extend_from_slice(&other.times);

        let mut bands = Vec::with_capacity(self.bands.len());
        for (a, b) in self.bands.iter().zip(&other.bands) {
            let values = concatenate(Axis(0), &[a.values.view(), b.values.view()])
                .map_err(|e| CubeError::Validation(format!("time concatenation failed: {}", e)))?;
            bands.push(Band::new(a.name.clone(), values));
        }

        DataCube::new(times, self.latitudes.clone(), self.longitudes.clone(), bands)
    }

    /// Reorder all bands by ascending acquisition time. The sort is stable,
    /// equal timestamps keep their current order.
    pub fn sorted_by_time(&self) -> DataCube {
        let mut order: Vec<usize> = (0..self.times.len()).collect();
        order.sort_by_key(|&i| self.times[i]);

        self.reindex_time(&order)
    }

    /// Drop time slices that hold no valid sample in any band.
    pub fn drop_empty_times(&self) -> DataCube {
        let keep: Vec<usize> = (0..self.times.len())
            .filter(|&t| {
                self.bands.iter().any(|band| {
                    band.values
                        .slice(s![t, .., ..])
                        .iter()
                        .any(|v| !v.is_nan())
                })
            })
            .collect();

        if keep.len() == self.times.len() {
            return self.clone();
        }
        log::info!(
            "dropping {} of {} time slices without any valid sample",
            self.times.len() - keep.len(),
            self.times.len()
        );
        self.reindex_time(&keep)
    }

    /// Extract the spatial sub-cube over half-open row/column index ranges,
    /// keeping every band and time step.
    pub fn slice_spatial(&self, rows: std::ops::Range<usize>, cols: std::ops::Range<usize>) -> DataCube {
        let bands = self
            .bands
            .iter()
            .map(|band| {
                Band::new(
                    band.name.clone(),
                    band.values
                        .slice(s![.., rows.clone(), cols.clone()])
                        .to_owned(),
                )
            })
            .collect();
        DataCube {
            times: self.times.clone(),
            latitudes: self.latitudes[rows].to_vec(),
            longitudes: self.longitudes[cols].to_vec(),
            bands,
        }
    }

    /// Per-pixel count of non-missing time-series samples in the first band.
    pub fn validity_counts(&self) -> Array2<u32> {
        let band = &self.first_band().values;
        let (nt, nrows, ncols) = band.dim();
        let mut counts = Array2::<u32>::zeros((nrows, ncols));
        for t in 0..nt {
            for r in 0..nrows {
                for c in 0..ncols {
                    if !band[[t, r, c]].is_nan() {
                        counts[[r, c]] += 1;
                    }
                }
            }
        }
        counts
    }

    /// Validity mask of the first band: true where a sample survived
    /// cleaning.
    pub fn valid_mask(&self) -> CleanMask {
        self.first_band().values.mapv(|v| !v.is_nan())
    }

    fn reindex_time(&self, order: &[usize]) -> DataCube {
        let times = order.iter().map(|&i| self.times[i]).collect();
        let (_, nrows, ncols) = self.bands[0].values.dim();
        let bands = self
            .bands
            .iter()
            .map(|band| {
                let mut values = BandCube::from_elem((order.len(), nrows, ncols), f32::NAN);
                for (dst, &src) in order.iter().enumerate() {
                    values
                        .slice_mut(s![dst, .., ..])
                        .assign(&band.values.slice(s![src, .., ..]));
                }
                Band::new(band.name.clone(), values)
            })
            .collect();
        DataCube {
            times,
            latitudes: self.latitudes.clone(),
            longitudes: self.longitudes.clone(),
            bands,
        }
    }
}
