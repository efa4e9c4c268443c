//! Conversion request options and their translation into `Page.printToPDF`
//! parameters.

use serde_json::{Value, json};

use crate::error::Result;
use crate::paper::{is_landscape, margin_to_inches, paper_size};

/// Options for one URL-to-PDF conversion. Immutable once submitted.
///
/// Defaults: portrait orientation, no background graphics, "a4" paper, all
/// margins zero, all pages.
#[derive(Debug, Clone, Default)]
pub struct PdfRequest {
    /// Page to render.
    pub url: String,
    /// Paper orientation keyword; only "landscape" (any case) flips the page.
    pub orientation: Option<String>,
    /// Print background graphics.
    pub print_background: bool,
    /// Page-size keyword: a0..a8, letter, legal, ledger.
    pub format: Option<String>,
    /// Margins in centimeters.
    pub margin_top: Option<f64>,
    pub margin_bottom: Option<f64>,
    pub margin_left: Option<f64>,
    pub margin_right: Option<f64>,
    /// Page-range expression, e.g. "1-5, 8, 11-13". Passed through verbatim;
    /// empty means all pages.
    pub page_ranges: Option<String>,
}

impl PdfRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

/// Builds the exact `Page.printToPDF` argument object for a request.
pub(crate) fn print_params(request: &PdfRequest) -> Result<Value> {
    let size = paper_size(request.format.as_deref().unwrap_or("a4"))?;
    Ok(json!({
        "landscape": is_landscape(request.orientation.as_deref()),
        "printBackground": request.print_background,
        "paperWidth": size.width,
        "paperHeight": size.height,
        "marginTop": margin_to_inches(request.margin_top),
        "marginBottom": margin_to_inches(request.margin_bottom),
        "marginLeft": margin_to_inches(request.margin_left),
        "marginRight": margin_to_inches(request.margin_right),
        "pageRanges": request.page_ranges.as_deref().unwrap_or(""),
    }))
}
