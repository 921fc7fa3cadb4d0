//! cubeclean: A Fast, Modular Landsat / Sentinel-2 Data-Cube Cleaning Toolkit
//!
//! This library turns raw data-cube loads into analysis-ready time series:
//! it decodes per-pixel quality flags into validity masks, orchestrates
//! cleaned multi-product loads over a shared window, harmonizes the 10 m
//! Sentinel-2 and 30 m Landsat grids onto one resolution, and locates the
//! best (or worst) observed sub-window of a cube.

pub mod core;
pub mod cube;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    BandCube, BoundingBox, CleanMask, CubeError, CubeExtents, CubeResult, FlagCube,
    GridDescriptor, SensorFamily, TimeRange, QUALITY_BAND_NAMES,
};

pub use cube::{Band, DataCube};

pub use crate::core::{
    clean_mask, focus_window, harmonize, ls_qa_clean_mask, slc_clean_mask, FocusStat, QaEncoding,
    ResampleMode, LANDSAT_DEFAULT_BITS, RESOLUTION_RATIO, SENTINEL2_DEFAULT_CATEGORIES,
};

pub use io::{
    load_dual_clean, load_multi_clean, CleanProduct, CubeQuery, CubeSource, DualCleanOutput,
    DualLoadRequest, LoadRequest, QualityBand, RawProduct,
};
