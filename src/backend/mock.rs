//! An in-process backend that "prints" documents without a browser.
//!
//! `MockBrowser` decodes `data:` URLs, fakes remote documents and produces a
//! deterministic PDF-like byte buffer from the document and the options. It
//! counts open pages so tests can check that every page is released. Like a
//! real browser tab, a `MockPage` is only released by `close` or by its
//! canceller, not by drop.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use base64::Engine as Base64Engine;

use super::{BrowserBackend, BrowserPage, PageCanceller};
use crate::pdf_options::PdfOptions;
use crate::{Error, Result};

/// Upper bound on a hanging navigation, so a broken test cannot wedge forever
const HANG_LIMIT: Duration = Duration::from_secs(30);

#[derive(Default)]
struct MockState {
    open: AtomicUsize,
    opened_total: AtomicUsize,
    cancelled_total: AtomicUsize,
    fail_capture: AtomicBool,
    unreachable: Mutex<Vec<String>>,
    hanging: Mutex<Vec<String>>,
    navigation_delay: Mutex<Duration>,
    late_content: Mutex<Option<String>>,
}

/// A fake browser for tests and for running the pipeline without Chrome
#[derive(Clone, Default)]
pub struct MockBrowser {
    state: Arc<MockState>,
}

impl MockBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Navigations to URLs starting with `prefix` hang until their timeout
    pub fn with_unreachable(self, prefix: impl Into<String>) -> Self {
        self.state
            .unreachable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prefix.into());
        self
    }

    /// Navigations to URLs starting with `prefix` ignore their timeout and
    /// only return once the page is cancelled
    pub fn with_hanging(self, prefix: impl Into<String>) -> Self {
        self.state
            .hanging
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prefix.into());
        self
    }

    /// Every navigation takes at least `delay`
    pub fn with_navigation_delay(self, delay: Duration) -> Self {
        *self.state.navigation_delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
        self
    }

    /// `fragment` shows up in every document only once its network has gone
    /// idle, like content fetched by a script after load
    pub fn with_late_content(self, fragment: impl Into<String>) -> Self {
        *self.state.late_content.lock().unwrap_or_else(PoisonError::into_inner) = Some(fragment.into());
        self
    }

    /// Every capture fails
    pub fn failing_capture(self) -> Self {
        self.state.fail_capture.store(true, Ordering::SeqCst);
        self
    }

    /// Pages opened and not yet closed
    pub fn open_pages(&self) -> usize {
        self.state.open.load(Ordering::SeqCst)
    }

    /// Pages opened since creation
    pub fn pages_opened(&self) -> usize {
        self.state.opened_total.load(Ordering::SeqCst)
    }

    /// Pages torn down through their canceller
    pub fn pages_cancelled(&self) -> usize {
        self.state.cancelled_total.load(Ordering::SeqCst)
    }

    fn matches(list: &Mutex<Vec<String>>, url: &str) -> bool {
        list.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|p| url.starts_with(p.as_str()))
    }

    fn navigation_delay(&self) -> Duration {
        *self.state.navigation_delay.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn late_content(&self) -> Option<String> {
        self.state.late_content.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl BrowserBackend for MockBrowser {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn open_page(&self) -> Result<Box<dyn BrowserPage>> {
        self.state.open.fetch_add(1, Ordering::SeqCst);
        self.state.opened_total.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockPage {
            document: None,
            handle: Arc::new(PageHandle {
                browser: self.clone(),
                cancelled: Mutex::new(false),
                changed: Condvar::new(),
                closed: AtomicBool::new(false),
            }),
        }))
    }
}

/// State shared between a page and its canceller
struct PageHandle {
    browser: MockBrowser,
    cancelled: Mutex<bool>,
    changed: Condvar,
    closed: AtomicBool,
}

impl PageHandle {
    fn release(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.browser.state.open.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.cancelled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until cancelled or `limit` passes
    fn wait_for_cancel(&self, limit: Duration) {
        let guard = self.cancelled.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = self
            .changed
            .wait_timeout_while(guard, limit, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

impl PageCanceller for PageHandle {
    fn cancel(&self) -> Result<()> {
        *self.cancelled.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.changed.notify_all();
        if !self.closed.load(Ordering::SeqCst) {
            self.browser.state.cancelled_total.fetch_add(1, Ordering::SeqCst);
        }
        self.release();
        Ok(())
    }
}

struct MockPage {
    document: Option<String>,
    handle: Arc<PageHandle>,
}

impl MockPage {
    fn check_live(&self) -> Result<()> {
        if self.handle.is_cancelled() {
            return Err(Error::LoadError("Page was closed".into()));
        }
        Ok(())
    }
}

impl BrowserPage for MockPage {
    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()> {
        self.check_live()?;
        let browser = &self.handle.browser;

        if MockBrowser::matches(&browser.state.hanging, url) {
            self.handle.wait_for_cancel(HANG_LIMIT);
            return Err(Error::LoadError(format!("Navigation to {} aborted", url)));
        }

        if MockBrowser::matches(&browser.state.unreachable, url) {
            std::thread::sleep(timeout);
            return Err(Error::Timeout(timeout.as_millis() as u64));
        }

        let delay = browser.navigation_delay();
        if delay > timeout {
            std::thread::sleep(timeout);
            return Err(Error::Timeout(timeout.as_millis() as u64));
        }
        std::thread::sleep(delay);

        self.check_live()?;
        self.document = Some(load_document(url)?);
        Ok(())
    }

    fn wait_for_network_idle(&mut self, _timeout: Duration) -> Result<()> {
        self.check_live()?;
        let late = self.handle.browser.late_content();
        match self.document.as_mut() {
            Some(document) => {
                if let Some(fragment) = late {
                    document.push_str(&fragment);
                }
                Ok(())
            }
            None => Err(Error::LoadError("No document loaded".into())),
        }
    }

    fn print_to_pdf(&mut self, options: &PdfOptions, _timeout: Duration) -> Result<Vec<u8>> {
        self.check_live()?;
        if self.handle.browser.state.fail_capture.load(Ordering::SeqCst) {
            return Err(Error::RenderError("Capture failed".into()));
        }
        options.paper_size_inches().map_err(Error::RenderError)?;
        options.margin_inches().map_err(Error::RenderError)?;

        let document = self
            .document
            .as_deref()
            .ok_or_else(|| Error::RenderError("Nothing to print".into()))?;
        let options = serde_json::to_string(options).map_err(|e| Error::Other(e.to_string()))?;

        Ok(format!("%PDF-1.4\n% rfpdf mock\n% {}\n{}\n%%EOF\n", options, document).into_bytes())
    }

    fn close(&mut self) -> Result<()> {
        self.handle.release();
        Ok(())
    }

    fn canceller(&self) -> Arc<dyn PageCanceller> {
        self.handle.clone()
    }
}

/// Document a real browser would show for `url`
fn load_document(url: &str) -> Result<String> {
    let Some(rest) = url.strip_prefix("data:") else {
        return Ok(format!("<html><body>{}</body></html>", url));
    };

    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| Error::LoadError(format!("Malformed data URL: {}", url)))?;

    if meta.ends_with(";base64") {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| Error::LoadError(format!("Invalid base64 payload: {}", e)))?;
        String::from_utf8(bytes).map_err(|e| Error::LoadError(format!("Payload is not UTF-8: {}", e)))
    } else {
        Ok(payload.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn decodes_plain_and_base64_data_urls() {
        assert_eq!(load_document("data:text/html,<h1>hi</h1>").unwrap(), "<h1>hi</h1>");
        assert_eq!(
            load_document("data:text/html;charset=utf-8;base64,PGgxPmhpPC9oMT4=").unwrap(),
            "<h1>hi</h1>"
        );
        assert!(load_document("data:text/html").is_err());
    }

    #[test]
    fn only_close_releases_a_page() {
        let browser = MockBrowser::new();
        let mut page = browser.open_page().unwrap();
        assert_eq!(browser.open_pages(), 1);

        page.close().unwrap();
        page.close().unwrap();
        assert_eq!(browser.open_pages(), 0);

        let leaked = browser.open_page().unwrap();
        drop(leaked);
        assert_eq!(browser.open_pages(), 1);
        assert_eq!(browser.pages_opened(), 2);
    }

    #[test]
    fn invalid_lengths_fail_the_capture() {
        let browser = MockBrowser::new();
        let mut page = browser.open_page().unwrap();
        page.navigate("data:text/html,x", Duration::from_secs(1)).unwrap();

        let options = PdfOptions {
            width: Some("wide".into()),
            ..Default::default()
        };
        let err = page.print_to_pdf(&options, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, Error::RenderError(_)));
        page.close().unwrap();
    }

    #[test]
    fn late_content_arrives_with_network_idle() {
        let browser = MockBrowser::new().with_late_content("<p>late</p>");
        let mut page = browser.open_page().unwrap();
        page.navigate("data:text/html,<p>early</p>", Duration::from_secs(1)).unwrap();

        let before = page.print_to_pdf(&PdfOptions::default(), Duration::from_secs(1)).unwrap();
        assert!(!String::from_utf8(before).unwrap().contains("<p>late</p>"));

        page.wait_for_network_idle(Duration::from_secs(1)).unwrap();
        let after = page.print_to_pdf(&PdfOptions::default(), Duration::from_secs(1)).unwrap();
        assert!(String::from_utf8(after).unwrap().contains("<p>early</p><p>late</p>"));
        page.close().unwrap();
    }

    #[test]
    fn canceller_unblocks_a_hanging_navigation() {
        let browser = MockBrowser::new().with_hanging("http://blackhole");
        let mut page = browser.open_page().unwrap();
        let canceller = page.canceller();

        let started = Instant::now();
        let navigation = std::thread::spawn(move || {
            let result = page.navigate("http://blackhole/", Duration::from_millis(10));
            (page, result)
        });

        std::thread::sleep(Duration::from_millis(100));
        canceller.cancel().unwrap();
        assert_eq!(browser.open_pages(), 0);

        let (mut page, result) = navigation.join().unwrap();
        assert!(matches!(result, Err(Error::LoadError(_))));
        assert!(started.elapsed() < Duration::from_secs(5));

        // Closing after a cancel does not release twice.
        page.close().unwrap();
        assert_eq!(browser.open_pages(), 0);
        assert_eq!(browser.pages_cancelled(), 1);
    }
}
