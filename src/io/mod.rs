//! I/O modules bridging the opaque data-cube source and the cleaners

pub mod loader;
pub mod source;

pub use loader::{
    load_dual_clean, load_multi_clean, CleanProduct, DualCleanOutput, DualLoadRequest, LoadRequest,
};
pub use source::{CubeQuery, CubeSource, QualityBand, RawProduct};
