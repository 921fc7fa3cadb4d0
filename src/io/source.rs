//! Abstract host data-cube capability.
//!
//! The loader never talks to a concrete catalogue; it queries anything
//! implementing [`CubeSource`] and works with the labeled arrays that come
//! back. Implementations live outside this crate (an indexed datacube, a
//! file-backed test source, ...).

use chrono::{DateTime, Utc};

use crate::cube::Band;
use crate::types::{CubeResult, FlagCube, TimeRange};

/// One spatio-temporal window request against a product
#[derive(Debug, Clone)]
pub struct CubeQuery {
    pub product: String,
    pub time: TimeRange,
    /// Minimum and maximum longitude, degrees
    pub lon: (f64, f64),
    /// Minimum and maximum latitude, degrees
    pub lat: (f64, f64),
    /// Measurement bands to fetch, quality band included
    pub measurements: Vec<String>,
}

/// Raw response for one product: measurement bands in request order plus
/// the family quality band, all over shared coordinate axes
#[derive(Debug, Clone)]
pub struct RawProduct {
    pub times: Vec<DateTime<Utc>>,
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    pub bands: Vec<Band>,
    pub quality: Option<QualityBand>,
}

/// The per-pixel quality flags accompanying a raw product
#[derive(Debug, Clone)]
pub struct QualityBand {
    pub name: String,
    pub codes: FlagCube,
}

/// Synchronous, opaque access to a raster product catalogue.
///
/// `Ok(None)` means the product holds no data over the requested window;
/// the loader skips it and carries on. Errors abort the whole load.
pub trait CubeSource {
    fn load(&self, query: &CubeQuery) -> CubeResult<Option<RawProduct>>;
}
