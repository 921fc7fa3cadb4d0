use chrono::{DateTime, Utc};
use ndarray::Array3;
use serde::{Deserialize, Serialize};

/// Per-band sample cube (time x row x column), missing samples are NaN
pub type BandCube = Array3<f32>;

/// Per-pixel quality flag codes, shaped like the band cubes it qualifies
pub type FlagCube = Array3<u16>;

/// Boolean validity cube, same shape as the cleaned data
pub type CleanMask = Array3<bool>;

/// Conventional names of the per-family quality bands
pub const QUALITY_BAND_NAMES: &[&str] = &["pixel_qa", "slc"];

/// Sensor families supported by the cleaning pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorFamily {
    /// Landsat 5/7/8 Collection 1 (bit-packed `pixel_qa` band)
    Landsat,
    /// Sentinel-2 with sen2cor scene classification (`slc` band)
    Sentinel2,
}

impl SensorFamily {
    /// Resolve the family from a product identifier prefix (`ls` or `s2`).
    pub fn from_product_id(product_id: &str) -> CubeResult<Self> {
        match product_id.get(..2) {
            Some("ls") => Ok(SensorFamily::Landsat),
            Some("s2") => Ok(SensorFamily::Sentinel2),
            _ => Err(CubeError::Configuration(format!(
                "cannot derive a sensor family from product id \"{}\" (expected an \"ls\" or \"s2\" prefix)",
                product_id
            ))),
        }
    }

    /// Name of the quality band carried by products of this family.
    pub fn quality_band(&self) -> &'static str {
        match self {
            SensorFamily::Landsat => "pixel_qa",
            SensorFamily::Sentinel2 => "slc",
        }
    }
}

impl std::fmt::Display for SensorFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorFamily::Landsat => write!(f, "Landsat"),
            SensorFamily::Sentinel2 => write!(f, "Sentinel-2"),
        }
    }
}

/// Closed acquisition time interval used when querying a data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> CubeResult<Self> {
        if end < start {
            return Err(CubeError::Configuration(format!(
                "time range end {} precedes start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }
}

/// Geographic bounding box, degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Smallest box covering both inputs.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_lon: self.min_lon.min(other.min_lon),
            max_lon: self.max_lon.max(other.max_lon),
            min_lat: self.min_lat.min(other.min_lat),
            max_lat: self.max_lat.max(other.max_lat),
        }
    }
}

/// Derived geometry of a uniform raster grid.
///
/// Resolution is the pixel pitch between neighbouring centres,
/// `(max - min) / (n - 1)` per axis; the extent pads the outermost pixel
/// centres by half a pixel on every side. Recompute whenever the coordinate
/// arrays change, never store alongside them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridDescriptor {
    pub columns: usize,
    pub rows: usize,
    pub res_x: f64,
    pub res_y: f64,
    pub extent: BoundingBox,
}

impl GridDescriptor {
    /// Compute the descriptor from pixel-centre coordinate axes.
    ///
    /// Both axes need at least two samples, otherwise the pitch is
    /// undefined.
    pub fn from_axes(longitudes: &[f64], latitudes: &[f64]) -> CubeResult<Self> {
        if longitudes.len() < 2 || latitudes.len() < 2 {
            return Err(CubeError::Validation(format!(
                "grid geometry needs at least 2 samples per axis, got {} x {}",
                longitudes.len(),
                latitudes.len()
            )));
        }
        let (min_x, max_x) = axis_bounds(longitudes);
        let (min_y, max_y) = axis_bounds(latitudes);
        let res_x = (max_x - min_x) / (longitudes.len() - 1) as f64;
        let res_y = (max_y - min_y) / (latitudes.len() - 1) as f64;
        Ok(Self {
            columns: longitudes.len(),
            rows: latitudes.len(),
            res_x,
            res_y,
            extent: BoundingBox {
                min_lon: min_x - res_x / 2.0,
                max_lon: max_x + res_x / 2.0,
                min_lat: min_y - res_y / 2.0,
                max_lat: max_y + res_y / 2.0,
            },
        })
    }
}

/// Spatial and temporal footprint of one product
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CubeExtents {
    pub extent: BoundingBox,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl CubeExtents {
    /// Fold several products' footprints into their common envelope.
    pub fn envelope<I>(extents: I) -> Option<CubeExtents>
    where
        I: IntoIterator<Item = CubeExtents>,
    {
        extents.into_iter().reduce(|acc, e| CubeExtents {
            extent: acc.extent.union(&e.extent),
            start_time: acc.start_time.min(e.start_time),
            end_time: acc.end_time.max(e.end_time),
        })
    }
}

/// Minimum and maximum of a coordinate axis, independent of its direction
pub(crate) fn axis_bounds(values: &[f64]) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &v in values {
        min = min.min(v);
        max = max.max(v);
    }
    (min, max)
}

/// Error types for data-cube cleaning and fusion
#[derive(Debug, thiserror::Error)]
pub enum CubeError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("data source error: {0}")]
    Source(String),
}

/// Result type for data-cube operations
pub type CubeResult<T> = Result<T, CubeError>;
