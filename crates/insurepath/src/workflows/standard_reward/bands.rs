use serde::Serialize;

use super::domain::{Band, Yen};

/// Grade and standardized amount a salary falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BandResolution {
    pub grade: u16,
    pub standard_monthly: Yen,
}

impl From<&Band> for BandResolution {
    fn from(band: &Band) -> Self {
        Self {
            grade: band.grade,
            standard_monthly: band.standard_monthly,
        }
    }
}

/// Maps a monthly salary onto a band list.
///
/// Bands are scanned in ascending grade order regardless of input order, and the first band
/// with `lower_limit <= salary <= upper_limit` wins, so a salary sitting exactly on a shared
/// boundary resolves to the lower grade. Salaries above the top band saturate to the top
/// grade. Salaries below the floor, non-positive salaries, and empty lists yield `None`.
pub fn resolve_band(salary: Yen, bands: &[Band]) -> Option<BandResolution> {
    if salary <= 0 || bands.is_empty() {
        return None;
    }

    let mut ordered: Vec<&Band> = bands.iter().collect();
    ordered.sort_by_key(|band| band.grade);

    if let Some(band) = ordered.iter().find(|band| band.contains(salary)) {
        return Some(BandResolution::from(*band));
    }

    let top = ordered.last()?;
    if salary > top.upper_limit {
        return Some(BandResolution::from(*top));
    }

    None
}

/// Structural problems in an admin-entered band list.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BandTableError {
    #[error("grade must be 1 or greater")]
    ZeroGrade,
    #[error("grade {0} appears more than once")]
    DuplicateGrade(u16),
    #[error("grade {grade}: lower limit {lower} must be below upper limit {upper}")]
    InvertedRange { grade: u16, lower: Yen, upper: Yen },
    #[error("grade {grade}: standard monthly amount must be positive")]
    NonPositiveStandard { grade: u16 },
    #[error("grades {below} and {above} leave salaries between {from} and {to} unbanded")]
    Gap {
        below: u16,
        above: u16,
        from: Yen,
        to: Yen,
    },
    #[error("grades {below} and {above} overlap between {from} and {to}")]
    Overlap {
        below: u16,
        above: u16,
        from: Yen,
        to: Yen,
    },
    #[error("rate {0} must be a fraction between 0 and 1")]
    RateOutOfRange(f64),
}

/// Checks that bands are contiguous when ordered by grade: each band starts exactly where the
/// previous one ends. An empty list passes; it is a table awaiting data entry.
pub fn validate_bands(bands: &[Band]) -> Result<(), BandTableError> {
    let mut ordered: Vec<&Band> = bands.iter().collect();
    ordered.sort_by_key(|band| band.grade);

    for band in &ordered {
        if band.grade == 0 {
            return Err(BandTableError::ZeroGrade);
        }
        if band.lower_limit >= band.upper_limit {
            return Err(BandTableError::InvertedRange {
                grade: band.grade,
                lower: band.lower_limit,
                upper: band.upper_limit,
            });
        }
        if band.standard_monthly <= 0 {
            return Err(BandTableError::NonPositiveStandard { grade: band.grade });
        }
    }

    for pair in ordered.windows(2) {
        let (below, above) = (pair[0], pair[1]);
        if below.grade == above.grade {
            return Err(BandTableError::DuplicateGrade(above.grade));
        }
        if above.lower_limit > below.upper_limit {
            return Err(BandTableError::Gap {
                below: below.grade,
                above: above.grade,
                from: below.upper_limit,
                to: above.lower_limit,
            });
        }
        if above.lower_limit < below.upper_limit {
            return Err(BandTableError::Overlap {
                below: below.grade,
                above: above.grade,
                from: above.lower_limit,
                to: below.upper_limit,
            });
        }
    }

    Ok(())
}

pub fn validate_rate(rate: f64) -> Result<(), BandTableError> {
    if rate.is_finite() && (0.0..=1.0).contains(&rate) {
        Ok(())
    } else {
        Err(BandTableError::RateOutOfRange(rate))
    }
}
