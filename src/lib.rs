//! RFox PDF renderer
//!
//! Turns URLs or raw HTML into PDF documents by driving one shared headless
//! browser. Each render gets its own page, which is navigated, left to settle
//! until the network is almost idle, printed to PDF and then closed.
//!
//! # Features
//!
//! - **CDP Backend** (`cdp`, default): headless Chrome via the DevTools Protocol
//! - **HTTP front-end** (`server`, default): `GET`/`POST /{filename}` routes
//! - **Bounded pages**: a page pool caps concurrent renders, every render has
//!   a deadline and its page is released on every exit path
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rfpdf::{RenderConfig, RenderEngine};
//! use rfpdf::params::RequestParams;
//! use rfpdf::pdf_options::build_pdf_options;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RenderConfig::default();
//! let browser = rfpdf::cdp::CdpBrowser::launch(&config)?;
//! let engine = RenderEngine::new(Arc::new(browser), config);
//!
//! let params = RequestParams::new().with_query("format", "A4");
//! let options = build_pdf_options(&params)?;
//! let pdf = engine.render_html("<h1>Hello</h1>", &options).await?;
//! assert!(pdf.starts_with(b"%PDF"));
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

pub mod error;
pub use error::{Error, Result, ValidationFailure};

pub mod params;
pub mod pdf_options;
pub mod disposition;
pub mod body;
pub mod report;

// Browser seam and the in-process mock backend
pub mod backend;

// Shared browser handle, page pool and per-request page lifecycle
pub mod engine;
pub use engine::{RenderEngine, RenderTarget};

pub mod request;

#[cfg(feature = "cdp")]
pub mod cdp;

#[cfg(feature = "server")]
pub mod server;

/// Configuration for the render engine and the browser it drives
///
/// The defaults are conservative: a 30 second budget per render and one
/// concurrent page per CPU.
///
/// # Examples
///
/// ```
/// let cfg = rfpdf::RenderConfig::default();
/// assert_eq!(cfg.timeout_ms, 30000);
/// assert!(cfg.max_pages >= 1);
/// ```
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Budget for a whole render (pool wait, navigation, idle wait, capture)
    pub timeout_ms: u64,
    /// Maximum number of pages open at once
    pub max_pages: usize,
    /// Chrome/Chromium executable; `None` lets the backend locate one
    pub chrome_path: Option<PathBuf>,
    /// Whether to keep Chrome's sandbox enabled
    pub sandbox: bool,
    /// Browser window size
    pub viewport: Viewport,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_pages: num_cpus::get().max(1),
            chrome_path: None,
            sandbox: false,
            viewport: Viewport::default(),
        }
    }
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RenderConfig::default();
        assert_eq!(config.timeout_ms, 30000);
        assert_eq!(config.viewport.width, 1280);
        assert_eq!(config.viewport.height, 720);
        assert!(!config.sandbox);
        assert!(config.chrome_path.is_none());
    }
}
