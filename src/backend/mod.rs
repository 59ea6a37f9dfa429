//! Browser seam: the traits the render engine drives
//!
//! A [`BrowserBackend`] is the long-lived, shared browser process. It hands
//! out [`BrowserPage`]s, each an isolated, single-use browsing session that
//! the engine navigates, prints and closes. Backend calls are blocking; the
//! engine runs them on tokio's blocking pool and passes the remaining request
//! budget into every call. A browser may not honor that budget (a black-holed
//! host keeps Chrome connecting for minutes), so every page also hands out a
//! [`PageCanceller`] the engine fires from another thread at the deadline.

use std::sync::Arc;
use std::time::Duration;

use crate::pdf_options::PdfOptions;
use crate::Result;

pub mod mock;

pub use mock::MockBrowser;

/// A running browser shared by every in-flight render
pub trait BrowserBackend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Open a fresh page. The caller owns it and must `close` it.
    fn open_page(&self) -> Result<Box<dyn BrowserPage>>;
}

/// One isolated page inside a [`BrowserBackend`]
pub trait BrowserPage: Send {
    /// Navigate to `url` and wait for the navigation to commit
    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()>;

    /// Block until the page has no more than two network connections for
    /// 500ms
    fn wait_for_network_idle(&mut self, timeout: Duration) -> Result<()>;

    /// Print the loaded document
    fn print_to_pdf(&mut self, options: &PdfOptions, timeout: Duration) -> Result<Vec<u8>>;

    /// Release the page inside the browser
    fn close(&mut self) -> Result<()>;

    /// Handle that tears this page down while another thread is blocked in
    /// one of its calls
    fn canceller(&self) -> Arc<dyn PageCanceller>;
}

/// Aborts a page from outside the render that owns it
///
/// After `cancel` returns the page is released inside the browser; calls
/// still blocked on it fail, and the owner must not `close` it again.
pub trait PageCanceller: Send + Sync {
    fn cancel(&self) -> Result<()>;
}
