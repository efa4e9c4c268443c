//! Web page to PDF conversion via headless Chromium.
//!
//! Drives an externally launched browser process through its remote
//! debugging protocol. One [`Session`] owns one browser process and one
//! protocol connection; conversions issued concurrently against a session
//! are serialized through a FIFO counting [`Gate`].
//!
//! ```no_run
//! use crtopdf::{LaunchConfig, PdfRequest, Session};
//!
//! # async fn run() -> crtopdf::Result<()> {
//! let session = Session::launch(LaunchConfig::default()).await?;
//! let pdf = session.convert(&PdfRequest::new("https://en.wikipedia.org")).await?;
//! std::fs::write("wikipedia.pdf", pdf).unwrap();
//! session.dispose().await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod gate;
mod launcher;
pub mod paper;
mod protocol;
mod request;
mod session;

pub use error::{Error, Result};
pub use gate::{Gate, GateGuard};
pub use launcher::LaunchConfig;
pub use request::PdfRequest;
pub use session::Session;
