//! Quality-flag decoding for Landsat and Sentinel-2 products.
//!
//! Both decoders are pure functions over a flag cube and a caller-supplied
//! set of acceptable categories; they never touch the measurement bands.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::types::{CleanMask, CubeError, CubeResult, FlagCube, SensorFamily};

/// Sentinel-2 scene classification categories accepted by default:
/// vegetation, not vegetated, water, unclassified, snow.
///
/// ```text
///  0 - no data
///  1 - saturated or defective
///  2 - dark area pixels
///  3 - cloud shadows
///  4 * vegetation
///  5 * not vegetated
///  6 * water
///  7 * unclassified
///  8 - cloud medium probability
///  9 - cloud high probability
/// 10 - thin cirrus
/// 11 * snow
/// ```
pub const SENTINEL2_DEFAULT_CATEGORIES: &[u8] = &[4, 5, 6, 7, 11];

/// Landsat Collection 1 `pixel_qa` bit positions accepted by default:
/// clear, water, snow.
///
/// ```text
///  0 : fill
///  1 * clear
///  2 * water
///  3 : cloud shadow
///  4 * snow
///  5 : cloud
/// 10 : terrain occlusion (Landsat 8 only)
/// ```
pub const LANDSAT_DEFAULT_BITS: &[u8] = &[1, 2, 4];

/// Default acceptable category set for a sensor family.
pub fn default_categories(family: SensorFamily) -> &'static [u8] {
    match family {
        SensorFamily::Landsat => LANDSAT_DEFAULT_BITS,
        SensorFamily::Sentinel2 => SENTINEL2_DEFAULT_CATEGORIES,
    }
}

/// Recognized `pixel_qa` bit layouts, selected from the widest observed
/// code. Every other width is rejected instead of decoding to an
/// all-invalid mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QaEncoding {
    /// 8-bit Landsat 5/7 codes; cloud confidence in bits 6-7
    Legacy8,
    /// 10-bit and wider Landsat 8 codes; cloud confidence in bits 6-7,
    /// cirrus confidence in bits 8-9
    Extended,
}

impl QaEncoding {
    pub fn from_bit_width(width: u32) -> CubeResult<Self> {
        match width {
            8 => Ok(QaEncoding::Legacy8),
            w if w >= 10 => Ok(QaEncoding::Extended),
            w => Err(CubeError::Configuration(format!(
                "unsupported pixel_qa bit width {}: expected 8 (Landsat 5/7) or >= 10 (Landsat 8)",
                w
            ))),
        }
    }

    pub fn bit_width(&self, observed: u32) -> u32 {
        match self {
            QaEncoding::Legacy8 => 8,
            QaEncoding::Extended => observed,
        }
    }

    /// Confidence bit pairs (low bit, high bit) that must read
    /// low-confidence (low set, high clear) for a code to survive the
    /// cloud pre-filter.
    fn confidence_pairs(&self) -> &'static [(u8, u8)] {
        match self {
            QaEncoding::Legacy8 => &[(6, 7)],
            QaEncoding::Extended => &[(6, 7), (8, 9)],
        }
    }

    fn is_low_confidence(&self, code: u16) -> bool {
        self.confidence_pairs()
            .iter()
            .all(|&(low, high)| code & (1 << low) != 0 && code & (1 << high) == 0)
    }
}

/// Unique flag codes with their occurrence counts, ascending by code.
pub fn flag_histogram(flags: &FlagCube) -> Vec<(u16, usize)> {
    let mut counts: BTreeMap<u16, usize> = BTreeMap::new();
    for &code in flags.iter() {
        *counts.entry(code).or_insert(0) += 1;
    }
    counts.into_iter().collect()
}

/// Decode a Sentinel-2 scene classification cube into a validity mask.
///
/// A pixel is valid iff its category is an element of `valid_categories`.
pub fn slc_clean_mask(flags: &FlagCube, valid_categories: &[u8]) -> CleanMask {
    let wanted: HashSet<u16> = valid_categories.iter().map(|&c| u16::from(c)).collect();
    flags.mapv(|code| wanted.contains(&code))
}

/// Decode a Landsat Collection 1 `pixel_qa` cube into a validity mask.
///
/// The bit layout is chosen from the widest observed code, then codes pass
/// two stages: a cloud(/cirrus) confidence pre-filter independent of the
/// caller's set, and a membership test accepting any code with at least one
/// bit of `valid_bits` set.
pub fn ls_qa_clean_mask(flags: &FlagCube, valid_bits: &[u8]) -> CubeResult<CleanMask> {
    let histogram = flag_histogram(flags);
    let max_code = histogram.last().map(|&(code, _)| code).unwrap_or(0);
    let observed_width = 16 - max_code.leading_zeros();
    let encoding = QaEncoding::from_bit_width(observed_width)?;

    let width = encoding.bit_width(observed_width);
    if let Some(&bit) = valid_bits.iter().find(|&&b| u32::from(b) >= width) {
        return Err(CubeError::Configuration(format!(
            "valid bit {} does not exist in the {}-bit pixel_qa encoding",
            bit, width
        )));
    }

    let accepted: HashSet<u16> = histogram
        .iter()
        .map(|&(code, _)| code)
        .filter(|&code| encoding.is_low_confidence(code))
        .filter(|&code| valid_bits.iter().any(|&bit| code & (1 << bit) != 0))
        .collect();

    log::debug!(
        "pixel_qa decode ({:?}): {} of {} observed codes accepted",
        encoding,
        accepted.len(),
        histogram.len()
    );

    Ok(flags.mapv(|code| accepted.contains(&code)))
}

/// Family dispatch used by the loaders. `valid_categories` of `None` (or an
/// explicit empty set) selects the family default.
pub fn clean_mask(
    family: SensorFamily,
    flags: &FlagCube,
    valid_categories: Option<&[u8]>,
) -> CubeResult<CleanMask> {
    let categories = match valid_categories {
        Some(c) if !c.is_empty() => c,
        _ => default_categories(family),
    };
    match family {
        SensorFamily::Sentinel2 => Ok(slc_clean_mask(flags, categories)),
        SensorFamily::Landsat => ls_qa_clean_mask(flags, categories),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn flag_cube(codes: &[u16]) -> FlagCube {
        Array3::from_shape_vec((1, 1, codes.len()), codes.to_vec()).unwrap()
    }

    #[test]
    fn slc_default_categories() {
        let codes: Vec<u16> = (0..=11).collect();
        let mask = slc_clean_mask(&flag_cube(&codes), SENTINEL2_DEFAULT_CATEGORIES);

        for (i, &code) in codes.iter().enumerate() {
            let expected = matches!(code, 4 | 5 | 6 | 7 | 11);
            assert_eq!(mask[[0, 0, i]], expected, "category {}", code);
        }
    }

    #[test]
    fn slc_category_override() {
        let mask = slc_clean_mask(&flag_cube(&[4, 6, 11]), &[6]);
        assert_eq!(mask[[0, 0, 0]], false);
        assert_eq!(mask[[0, 0, 1]], true);
        assert_eq!(mask[[0, 0, 2]], false);
    }

    #[test]
    fn landsat_legacy_codes() {
        // Landsat 5/7 style raster: 66 clear, 68 water, 72 shadow, 80 snow,
        // 96 low-confidence cloud, 130 medium cloud, 224 high cloud.
        let codes = [66u16, 68, 72, 80, 96, 130, 224];
        let mask = ls_qa_clean_mask(&flag_cube(&codes), LANDSAT_DEFAULT_BITS).unwrap();

        let expected = [true, true, false, true, false, false, false];
        for (i, want) in expected.iter().enumerate() {
            assert_eq!(mask[[0, 0, i]], *want, "code {}", codes[i]);
        }
    }

    #[test]
    fn landsat_extended_codes_check_cirrus_confidence() {
        // Landsat 8 style raster: 322 clear, 324 water, 328 shadow,
        // 352 cloud low-conf, 386 medium cloud, 898 high cirrus.
        let codes = [322u16, 324, 328, 352, 386, 898];
        let mask = ls_qa_clean_mask(&flag_cube(&codes), LANDSAT_DEFAULT_BITS).unwrap();

        let expected = [true, true, false, false, false, false];
        for (i, want) in expected.iter().enumerate() {
            assert_eq!(mask[[0, 0, i]], *want, "code {}", codes[i]);
        }
    }

    #[test]
    fn landsat_rejects_unknown_bit_widths() {
        // widest code has 7 bits
        assert!(matches!(
            ls_qa_clean_mask(&flag_cube(&[66, 96]), LANDSAT_DEFAULT_BITS),
            Err(CubeError::Configuration(_))
        ));
        // widest code has 9 bits
        assert!(matches!(
            ls_qa_clean_mask(&flag_cube(&[66, 480]), LANDSAT_DEFAULT_BITS),
            Err(CubeError::Configuration(_))
        ));
        // all-fill raster
        assert!(ls_qa_clean_mask(&flag_cube(&[0, 0]), LANDSAT_DEFAULT_BITS).is_err());
    }

    #[test]
    fn landsat_rejects_out_of_range_valid_bit() {
        let codes = [66u16, 224];
        assert!(matches!(
            ls_qa_clean_mask(&flag_cube(&codes), &[1, 9]),
            Err(CubeError::Configuration(_))
        ));
    }

    #[test]
    fn histogram_is_ascending_with_counts() {
        let flags = flag_cube(&[66, 66, 224, 66, 2]);
        assert_eq!(flag_histogram(&flags), vec![(2, 1), (66, 3), (224, 1)]);
    }

    #[test]
    fn dispatch_uses_family_defaults_for_empty_override() {
        let flags = flag_cube(&[4, 8]);
        let mask = clean_mask(SensorFamily::Sentinel2, &flags, Some(&[])).unwrap();
        assert_eq!(mask[[0, 0, 0]], true);
        assert_eq!(mask[[0, 0, 1]], false);
    }
}
