//! Core cleaning and fusion modules

pub mod focus;
pub mod harmonize;
pub mod qa_mask;

// Re-export main types
pub use focus::{focus_window, FocusStat};
pub use harmonize::{harmonize, ResampleMode, RESOLUTION_RATIO};
pub use qa_mask::{
    clean_mask, default_categories, flag_histogram, ls_qa_clean_mask, slc_clean_mask, QaEncoding,
    LANDSAT_DEFAULT_BITS, SENTINEL2_DEFAULT_CATEGORIES,
};
