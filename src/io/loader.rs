//! Cleaned multi-product loading.
//!
//! [`load_multi_clean`] fetches one or more products of a single sensor
//! family over a shared window, decodes each product's quality band,
//! masks invalid and negative samples and concatenates everything along
//! the time axis. [`load_dual_clean`] runs one load per family and can
//! fuse the two results across resolutions.

use serde::{Deserialize, Serialize};

use crate::core::harmonize::{harmonize, ResampleMode};
use crate::core::qa_mask;
use crate::cube::{Band, DataCube};
use crate::io::source::{CubeQuery, CubeSource, RawProduct};
use crate::types::{
    axis_bounds, CleanMask, CubeError, CubeResult, SensorFamily, TimeRange, QUALITY_BAND_NAMES,
};

/// Options for a single-family cleaned load
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadRequest {
    /// Product identifiers, all of one sensor family (`ls*` or `s2*`)
    pub products: Vec<String>,
    pub time: TimeRange,
    /// Minimum and maximum longitude, degrees
    pub lon: (f64, f64),
    /// Minimum and maximum latitude, degrees
    pub lat: (f64, f64),
    /// Measurement bands to load; the family quality band is added to
    /// every query automatically
    pub measurements: Vec<String>,
    /// Remove time slices without any valid sample
    pub drop_empty_times: bool,
    /// Acceptable quality categories; `None` or empty selects the family
    /// default
    pub valid_categories: Option<Vec<u8>>,
}

impl LoadRequest {
    fn validate(&self) -> CubeResult<()> {
        if self.products.is_empty() {
            return Err(CubeError::Configuration(
                "at least one product id is required".to_string(),
            ));
        }
        if self.data_measurements().is_empty() {
            return Err(CubeError::Configuration(
                "at least one measurement band besides the quality band is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Requested bands with any explicitly listed quality band stripped;
    /// the loader appends the right one per family itself.
    fn data_measurements(&self) -> Vec<String> {
        self.measurements
            .iter()
            .filter(|m| !QUALITY_BAND_NAMES.contains(&m.as_str()))
            .cloned()
            .collect()
    }
}

/// A cleaned cube plus the validity mask of its first measurement band
#[derive(Debug, Clone)]
pub struct CleanProduct {
    pub cube: DataCube,
    pub mask: CleanMask,
}

impl CleanProduct {
    fn from_cube(cube: DataCube) -> Self {
        let mask = cube.valid_mask();
        Self { cube, mask }
    }
}

/// Load and clean one or more products of a single sensor family.
///
/// Products yielding no data over the window are skipped with a warning;
/// if none yields data the result is `Ok(None)` and callers must check
/// for it. The returned cube is concatenated over products in request
/// order and sorted ascending by time (stable, ties keep request order).
pub fn load_multi_clean(
    source: &dyn CubeSource,
    request: &LoadRequest,
) -> CubeResult<Option<CleanProduct>> {
    request.validate()?;

    // Resolve and cross-check families before any fetch happens.
    let families = request
        .products
        .iter()
        .map(|p| SensorFamily::from_product_id(p))
        .collect::<CubeResult<Vec<_>>>()?;
    let family = families[0];
    if families.iter().any(|f| *f != family) {
        return Err(CubeError::Configuration(format!(
            "mixed sensor families in {:?}: load Landsat and Sentinel-2 products through load_dual_clean instead",
            request.products
        )));
    }

    let measurements = request.data_measurements();
    let mut combined: Option<DataCube> = None;

    for product in &request.products {
        let mut query_measurements = measurements.clone();
        query_measurements.push(family.quality_band().to_string());
        let query = CubeQuery {
            product: product.clone(),
            time: request.time,
            lon: request.lon,
            lat: request.lat,
            measurements: query_measurements,
        };

        let raw = match source.load(&query)? {
            Some(raw) => raw,
            None => {
                log::warn!(
                    "product {} returned no data over the requested window, skipping",
                    product
                );
                continue;
            }
        };

        let cleaned = clean_product(product, family, raw, request.valid_categories.as_deref())?;
        log::info!(
            "product {}: {} cleaned time slices over {} bands",
            product,
            cleaned.times().len(),
            cleaned.bands().len()
        );

        combined = Some(match combined {
            None => cleaned,
            Some(acc) => acc.concat_time(&cleaned)?,
        });
    }

    let cube = match combined {
        Some(cube) => cube,
        None => {
            log::warn!("no requested product yielded any data");
            return Ok(None);
        }
    };

    let cube = if request.drop_empty_times {
        cube.drop_empty_times()
    } else {
        cube
    };
    if cube.is_empty() {
        log::warn!("every time slice was dropped as empty");
        return Ok(None);
    }

    Ok(Some(CleanProduct::from_cube(cube.sorted_by_time())))
}

/// Decode one raw product's quality band and blank out invalid and
/// negative samples in every measurement band.
fn clean_product(
    product: &str,
    family: SensorFamily,
    raw: RawProduct,
    valid_categories: Option<&[u8]>,
) -> CubeResult<DataCube> {
    let quality = raw.quality.ok_or_else(|| {
        CubeError::Source(format!(
            "product {} response is missing its {} band",
            product,
            family.quality_band()
        ))
    })?;

    let mask = qa_mask::clean_mask(family, &quality.codes, valid_categories)?;

    let mut bands = Vec::with_capacity(raw.bands.len());
    for band in raw.bands {
        if QUALITY_BAND_NAMES.contains(&band.name.as_str()) {
            continue;
        }
        if band.values.dim() != quality.codes.dim() {
            return Err(CubeError::Source(format!(
                "product {} band \"{}\" has shape {:?} but its quality band has {:?}",
                product,
                band.name,
                band.values.dim(),
                quality.codes.dim()
            )));
        }
        let mut values = band.values;
        for (v, &ok) in values.iter_mut().zip(mask.iter()) {
            if !ok || *v < 0.0 {
                *v = f32::NAN;
            }
        }
        bands.push(Band::new(band.name, values));
    }

    DataCube::new(raw.times, raw.latitudes, raw.longitudes, bands)
}

/// Options for a dual-family cleaned load
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DualLoadRequest {
    /// Product identifiers; both families must be present
    pub products: Vec<String>,
    pub time: TimeRange,
    pub lon: (f64, f64),
    pub lat: (f64, f64),
    pub measurements: Vec<String>,
    /// When set, fuse the two families across resolutions into a single
    /// combined product
    pub resample: Option<ResampleMode>,
    pub drop_empty_times: bool,
    pub landsat_categories: Option<Vec<u8>>,
    pub sentinel2_categories: Option<Vec<u8>>,
}

/// Result of a dual-family load: either the two cleaned products side by
/// side, or a single fused product when resampling was requested
#[derive(Debug, Clone)]
pub struct DualCleanOutput {
    pub landsat: Option<CleanProduct>,
    pub sentinel2: Option<CleanProduct>,
    pub fused: Option<CleanProduct>,
}

/// Load, clean and optionally fuse a mix of Landsat and Sentinel-2
/// products.
///
/// Landsat loads first; the Sentinel-2 window is then derived from the
/// Landsat result grid so the ratio-3 grids overlay pixel borders. If one
/// family comes back empty, fusion is skipped with a warning and the
/// other side is returned on its own.
pub fn load_dual_clean(
    source: &dyn CubeSource,
    request: &DualLoadRequest,
) -> CubeResult<DualCleanOutput> {
    let mut landsat_products = Vec::new();
    let mut sentinel2_products = Vec::new();
    for product in &request.products {
        match SensorFamily::from_product_id(product)? {
            SensorFamily::Landsat => landsat_products.push(product.clone()),
            SensorFamily::Sentinel2 => sentinel2_products.push(product.clone()),
        }
    }
    if landsat_products.is_empty() || sentinel2_products.is_empty() {
        return Err(CubeError::Configuration(
            "a mix of Landsat and Sentinel-2 products is required here; use load_multi_clean for a single family"
                .to_string(),
        ));
    }

    let landsat = load_multi_clean(
        source,
        &LoadRequest {
            products: landsat_products,
            time: request.time,
            lon: request.lon,
            lat: request.lat,
            measurements: request.measurements.clone(),
            drop_empty_times: request.drop_empty_times,
            valid_categories: request.landsat_categories.clone(),
        },
    )?;

    // Pin the Sentinel-2 window to the Landsat grid so both loads cover
    // the same footprint at the finer pitch.
    let (lon, lat) = match &landsat {
        Some(product) => derived_window(&product.cube),
        None => {
            log::warn!("Landsat side is empty, keeping the caller's window for Sentinel-2");
            (request.lon, request.lat)
        }
    };

    let sentinel2 = load_multi_clean(
        source,
        &LoadRequest {
            products: sentinel2_products,
            time: request.time,
            lon,
            lat,
            measurements: request.measurements.clone(),
            drop_empty_times: request.drop_empty_times,
            valid_categories: request.sentinel2_categories.clone(),
        },
    )?;

    if let Some(mode) = request.resample {
        if let (Some(coarse), Some(fine)) = (&landsat, &sentinel2) {
            let fused = harmonize(&coarse.cube, &fine.cube, mode)?;
            return Ok(DualCleanOutput {
                landsat: None,
                sentinel2: None,
                fused: Some(CleanProduct::from_cube(fused)),
            });
        }
        log::warn!("one sensor family returned no data, skipping {} resampling", mode);
    }

    Ok(DualCleanOutput {
        landsat,
        sentinel2,
        fused: None,
    })
}

/// Query window derived from a result grid: its coordinate span padded by
/// a third of the pixel pitch on each side.
fn derived_window(cube: &DataCube) -> ((f64, f64), (f64, f64)) {
    let (min_lon, max_lon) = axis_bounds(cube.longitudes());
    let (min_lat, max_lat) = axis_bounds(cube.latitudes());
    let res_x = (max_lon - min_lon) / cube.longitudes().len() as f64;
    let res_y = (max_lat - min_lat) / cube.latitudes().len() as f64;
    (
        (min_lon - res_x / 3.0, max_lon + res_x / 3.0),
        (min_lat - res_y / 3.0, max_lat + res_y / 3.0),
    )
}
