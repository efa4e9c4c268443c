//! Translation of human-facing print parameters into protocol units.
//!
//! `Page.printToPDF` takes paper dimensions and margins in inches; callers
//! speak in page-size keywords and centimeters.

use crate::error::{Error, Result};

pub const CM_PER_INCH: f64 = 2.54;

/// Physical paper dimensions in inches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaperSize {
    pub width: f64,
    pub height: f64,
}

const PAPER_SIZES: &[(&str, PaperSize)] = &[
    ("a0", PaperSize { width: 33.1, height: 46.8 }),
    ("a1", PaperSize { width: 23.4, height: 33.1 }),
    ("a2", PaperSize { width: 16.5, height: 23.4 }),
    ("a3", PaperSize { width: 11.7, height: 16.5 }),
    ("a4", PaperSize { width: 8.3, height: 11.7 }),
    ("a5", PaperSize { width: 5.8, height: 8.3 }),
    ("a6", PaperSize { width: 4.1, height: 5.8 }),
    ("a7", PaperSize { width: 2.9, height: 4.1 }),
    ("a8", PaperSize { width: 2.0, height: 2.9 }),
    ("letter", PaperSize { width: 8.5, height: 11.0 }),
    ("legal", PaperSize { width: 8.5, height: 14.0 }),
    ("ledger", PaperSize { width: 17.0, height: 11.0 }),
];

/// Resolves a page-size keyword, case-insensitively.
pub fn paper_size(format: &str) -> Result<PaperSize> {
    let needle = format.to_ascii_lowercase();
    PAPER_SIZES
        .iter()
        .find(|(name, _)| *name == needle)
        .map(|(_, size)| *size)
        .ok_or_else(|| Error::UnknownFormat(format.to_string()))
}

/// Converts a margin in centimeters to inches. An absent margin is zero, not
/// "unspecified": omission and `Some(0.0)` produce the same output.
pub fn margin_to_inches(cm: Option<f64>) -> f64 {
    cm.unwrap_or(0.0) / CM_PER_INCH
}

/// True only for the keyword "landscape", case-insensitively. Every other
/// value, including absence, means portrait.
pub fn is_landscape(orientation: Option<&str>) -> bool {
    orientation.is_some_and(|o| o.eq_ignore_ascii_case("landscape"))
}
