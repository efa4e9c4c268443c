use std::path::PathBuf;

use clap::Parser;
use crtopdf::PdfRequest;

#[derive(Parser, Debug)]
#[command(name = "crtopdf")]
#[command(about = "Convert a web page to PDF with headless Chromium")]
#[command(version)]
pub struct Cli {
    /// Page to convert
    #[arg(short, long)]
    pub url: String,

    /// Output PDF path
    #[arg(short, long)]
    pub output: PathBuf,

    /// Paper orientation: portrait or landscape
    #[arg(long, default_value = "portrait")]
    pub orientation: String,

    /// Print background graphics
    #[arg(long)]
    pub print_background: bool,

    /// Paper size: a0..a8, letter, legal, ledger
    #[arg(long, default_value = "a4")]
    pub format: String,

    /// Top margin in centimeters
    #[arg(long)]
    pub margin_top: Option<f64>,

    /// Bottom margin in centimeters
    #[arg(long)]
    pub margin_bottom: Option<f64>,

    /// Left margin in centimeters
    #[arg(long)]
    pub margin_left: Option<f64>,

    /// Right margin in centimeters
    #[arg(long)]
    pub margin_right: Option<f64>,

    /// Page ranges, e.g. "1-5, 8, 11-13"
    #[arg(long)]
    pub page_ranges: Option<String>,

    /// Path to the browser executable (auto-detected when omitted)
    #[arg(long, value_name = "FILE")]
    pub browser_path: Option<PathBuf>,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn request(&self) -> PdfRequest {
        PdfRequest {
            url: self.url.clone(),
            orientation: Some(self.orientation.clone()),
            print_background: self.print_background,
            format: Some(self.format.clone()),
            margin_top: self.margin_top,
            margin_bottom: self.margin_bottom,
            margin_left: self.margin_left,
            margin_right: self.margin_right,
            page_ranges: self.page_ranges.clone(),
        }
    }
}
