//! Render engine: one shared browser, one page per render
//!
//! The engine owns the shared [`BrowserBackend`]. Every render acquires a slot
//! in the page pool, opens its own page, walks it through
//! `Idle → PageOpened → Navigating → NetworkSettled → CaptureInProgress → Closed`
//! and closes it on the way out, whatever the outcome. HTML is rendered by
//! navigating to a `data:` URL, so it takes exactly the same path as a URL.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use base64::Engine as Base64Engine;
use log::{debug, info, warn};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::backend::{BrowserBackend, BrowserPage, PageCanceller};
use crate::pdf_options::PdfOptions;
use crate::{Error, RenderConfig, Result, ValidationFailure};

/// Prefix of the `data:` URL HTML documents are navigated through
pub const HTML_DATA_URL_PREFIX: &str = "data:text/html;charset=utf-8;base64,";

/// Chrome refuses to navigate to URLs longer than 2 MiB
pub const MAX_URL_LEN: usize = 2 * 1024 * 1024;

/// Largest HTML document whose base64 `data:` URL stays within [`MAX_URL_LEN`]
pub const MAX_HTML_BYTES: usize = (MAX_URL_LEN - HTML_DATA_URL_PREFIX.len()) / 4 * 3;

/// What to render
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderTarget {
    Url(String),
    Html(String),
}

impl RenderTarget {
    /// URL the page navigates to. HTML becomes a base64 `data:` URL.
    pub fn navigable_url(&self) -> String {
        match self {
            RenderTarget::Url(url) => url.clone(),
            RenderTarget::Html(html) => format!(
                "{}{}",
                HTML_DATA_URL_PREFIX,
                base64::engine::general_purpose::STANDARD.encode(html)
            ),
        }
    }
}

/// How a render ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// Where a single render is in its page lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStage {
    Idle,
    PageOpened,
    Navigating,
    NetworkSettled,
    CaptureInProgress,
    Closed(Outcome),
}

/// The pool slot of one render and the page occupying it
///
/// Whoever closes the page first owns the teardown: the render when it
/// finishes, or the deadline through the page's [`PageCanceller`]. The pool
/// permit is released right after that close, never before.
struct PageSlot {
    state: Mutex<SlotState>,
    open_pages: Arc<AtomicUsize>,
    timeout_ms: u64,
}

enum SlotState {
    /// Permit held, no page yet
    Reserved(OwnedSemaphorePermit),
    Open {
        permit: OwnedSemaphorePermit,
        canceller: Arc<dyn PageCanceller>,
    },
    Released,
}

impl PageSlot {
    fn new(permit: OwnedSemaphorePermit, open_pages: Arc<AtomicUsize>, timeout_ms: u64) -> Self {
        Self {
            state: Mutex::new(SlotState::Reserved(permit)),
            open_pages,
            timeout_ms,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a freshly opened page. False when the deadline already gave
    /// the slot up.
    fn attach(&self, canceller: Arc<dyn PageCanceller>) -> bool {
        let mut state = self.lock();
        match std::mem::replace(&mut *state, SlotState::Released) {
            SlotState::Reserved(permit) => {
                *state = SlotState::Open { permit, canceller };
                self.open_pages.fetch_add(1, Ordering::SeqCst);
                true
            }
            other => {
                *state = other;
                false
            }
        }
    }

    /// Take over the teardown of an open page. `None` when it was already
    /// cancelled.
    fn claim(&self) -> Option<OwnedSemaphorePermit> {
        match std::mem::replace(&mut *self.lock(), SlotState::Released) {
            SlotState::Open { permit, .. } => Some(permit),
            _ => None,
        }
    }

    /// Tear the page down from outside the render. Blocking.
    fn cancel(&self) {
        let taken = std::mem::replace(&mut *self.lock(), SlotState::Released);
        if let SlotState::Open { permit, canceller } = taken {
            if let Err(e) = canceller.cancel() {
                warn!("failed to cancel page: {}", e);
            }
            self.open_pages.fetch_sub(1, Ordering::SeqCst);
            drop(permit);
        }
    }
}

/// A page owned by one render. Dropping it without `finish` closes it as a
/// failure.
struct PageSession {
    page: Box<dyn BrowserPage>,
    stage: RenderStage,
    slot: Arc<PageSlot>,
    target: String,
}

impl PageSession {
    fn open(backend: &dyn BrowserBackend, slot: Arc<PageSlot>, target: String) -> Result<Self> {
        debug!("[{}] {:?}", target, RenderStage::Idle);
        let mut page = backend.open_page()?;
        if !slot.attach(page.canceller()) {
            debug!("[{}] deadline passed while opening the page", target);
            if let Err(e) = page.close() {
                warn!("[{}] failed to close page: {}", target, e);
            }
            return Err(Error::Timeout(slot.timeout_ms));
        }

        let mut session = Self {
            page,
            stage: RenderStage::Idle,
            slot,
            target,
        };
        session.advance(RenderStage::PageOpened);
        Ok(session)
    }

    fn advance(&mut self, stage: RenderStage) {
        debug!("[{}] {:?} -> {:?}", self.target, self.stage, stage);
        self.stage = stage;
    }

    fn finish(mut self, outcome: Outcome) {
        self.close(outcome);
    }

    fn close(&mut self, outcome: Outcome) {
        if matches!(self.stage, RenderStage::Closed(_)) {
            return;
        }
        self.advance(RenderStage::Closed(outcome));
        let Some(permit) = self.slot.claim() else {
            debug!("[{}] page was already cancelled", self.target);
            return;
        };
        if let Err(e) = self.page.close() {
            warn!("[{}] failed to close page: {}", self.target, e);
        }
        self.slot.open_pages.fetch_sub(1, Ordering::SeqCst);
        drop(permit);
    }
}

impl Drop for PageSession {
    fn drop(&mut self) {
        self.close(Outcome::Failure);
    }
}

/// Cancels the render's page unless disarmed, including when the caller
/// stops polling the render
struct CancelOnDrop(Option<Arc<PageSlot>>);

impl CancelOnDrop {
    fn disarm(&mut self) {
        self.0 = None;
    }

    async fn cancel_now(&mut self) {
        if let Some(slot) = self.0.take() {
            if let Err(e) = tokio::task::spawn_blocking(move || slot.cancel()).await {
                warn!("page cancel task failed: {}", e);
            }
        }
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(slot) = self.0.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn_blocking(move || slot.cancel());
                }
                Err(_) => slot.cancel(),
            }
        }
    }
}

struct EngineInner {
    backend: Arc<dyn BrowserBackend>,
    config: RenderConfig,
    pages: Arc<Semaphore>,
    open_pages: Arc<AtomicUsize>,
    accepting: AtomicBool,
}

/// Renders URLs and HTML to PDF against one shared browser.
///
/// Cloning is cheap; clones share the browser, the page pool and the
/// lifecycle state.
#[derive(Clone)]
pub struct RenderEngine {
    inner: Arc<EngineInner>,
}

impl RenderEngine {
    /// Wrap an already running browser. The engine accepts renders as soon
    /// as it is constructed.
    pub fn new(backend: Arc<dyn BrowserBackend>, config: RenderConfig) -> Self {
        let max_pages = config.max_pages.max(1);
        info!(
            "render engine ready (backend: {}, max pages: {}, timeout: {}ms)",
            backend.name(),
            max_pages,
            config.timeout_ms
        );
        Self {
            inner: Arc::new(EngineInner {
                backend,
                config,
                pages: Arc::new(Semaphore::new(max_pages)),
                open_pages: Arc::new(AtomicUsize::new(0)),
                accepting: AtomicBool::new(true),
            }),
        }
    }

    /// Whether new renders are accepted
    pub fn is_ready(&self) -> bool {
        self.inner.accepting.load(Ordering::SeqCst)
    }

    /// Pages currently open through this engine
    pub fn open_pages(&self) -> usize {
        self.inner.open_pages.load(Ordering::SeqCst)
    }

    /// Stop accepting renders. Renders already holding a page run to
    /// completion; renders still waiting for one fail with `NotReady`.
    pub fn shutdown(&self) {
        if self.inner.accepting.swap(false, Ordering::SeqCst) {
            self.inner.pages.close();
            info!("render engine shutting down ({} pages open)", self.open_pages());
        }
    }

    /// Render the page at `url`
    pub async fn render_url(&self, url: &str, options: &PdfOptions) -> Result<Vec<u8>> {
        if !self.is_ready() {
            return Err(Error::NotReady);
        }

        let timeout_ms = self.inner.config.timeout_ms;
        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
        let target = describe(url);

        let permit = match tokio::time::timeout_at(deadline, Arc::clone(&self.inner.pages).acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(Error::NotReady),
            Err(_) => {
                warn!("[{}] no page available within {}ms", target, timeout_ms);
                return Err(Error::Timeout(timeout_ms));
            }
        };

        info!("[{}] rendering", target);
        let started = Instant::now();
        let backend = Arc::clone(&self.inner.backend);
        let slot = Arc::new(PageSlot::new(permit, Arc::clone(&self.inner.open_pages), timeout_ms));
        let mut guard = CancelOnDrop(Some(Arc::clone(&slot)));
        let url = url.to_string();
        let options = options.clone();
        let std_deadline = deadline.into_std();
        let job_target = target.clone();

        let job = tokio::task::spawn_blocking(move || {
            capture(backend.as_ref(), slot, job_target, &url, &options, std_deadline)
        });

        let result = match tokio::time::timeout_at(deadline, job).await {
            Ok(Ok(result)) => {
                guard.disarm();
                result
            }
            Ok(Err(e)) => {
                guard.cancel_now().await;
                Err(Error::RenderError(format!("Render task failed: {}", e)))
            }
            Err(_) => {
                warn!("[{}] exceeded {}ms, cancelling its page", target, timeout_ms);
                guard.cancel_now().await;
                Err(Error::Timeout(timeout_ms))
            }
        };

        match &result {
            Ok(pdf) => info!("[{}] rendered {} bytes in {:?}", target, pdf.len(), started.elapsed()),
            Err(e) => debug!("[{}] failed after {:?}: {}", target, started.elapsed(), e),
        }
        result
    }

    /// Render an HTML document. Same path as [`render_url`](Self::render_url)
    /// on the document's `data:` URL.
    ///
    /// Documents over [`MAX_HTML_BYTES`] are rejected as a bad request.
    pub async fn render_html(&self, html: &str, options: &PdfOptions) -> Result<Vec<u8>> {
        check_html_len(html)?;
        let url = RenderTarget::Html(html.to_string()).navigable_url();
        self.render_url(&url, options).await
    }

    pub async fn render(&self, target: &RenderTarget, options: &PdfOptions) -> Result<Vec<u8>> {
        match target {
            RenderTarget::Url(url) => self.render_url(url, options).await,
            RenderTarget::Html(html) => self.render_html(html, options).await,
        }
    }
}

/// `html` fits in a navigable `data:` URL
pub fn check_html_len(html: &str) -> std::result::Result<(), ValidationFailure> {
    if html.len() > MAX_HTML_BYTES {
        return Err(ValidationFailure::field(
            "html",
            format!("Must be at most {} bytes", MAX_HTML_BYTES),
        ));
    }
    Ok(())
}

fn remaining(deadline: Instant, timeout_ms: u64) -> Result<Duration> {
    deadline
        .checked_duration_since(Instant::now())
        .filter(|d| !d.is_zero())
        .ok_or(Error::Timeout(timeout_ms))
}

/// The blocking part of a render. Runs on the blocking pool.
fn capture(
    backend: &dyn BrowserBackend,
    slot: Arc<PageSlot>,
    target: String,
    url: &str,
    options: &PdfOptions,
    deadline: Instant,
) -> Result<Vec<u8>> {
    let timeout_ms = slot.timeout_ms;
    let mut session = PageSession::open(backend, slot, target)?;

    session.advance(RenderStage::Navigating);
    session.page.navigate(url, remaining(deadline, timeout_ms)?)?;
    session.page.wait_for_network_idle(remaining(deadline, timeout_ms)?)?;
    session.advance(RenderStage::NetworkSettled);

    session.advance(RenderStage::CaptureInProgress);
    let pdf = session.page.print_to_pdf(options, remaining(deadline, timeout_ms)?)?;

    session.finish(Outcome::Success);
    Ok(pdf)
}

/// Short label for logs; data URLs can be megabytes long
fn describe(url: &str) -> String {
    if url.starts_with("data:") {
        let media = url[5..].split([',', ';']).next().unwrap_or("");
        format!("data:{} ({} bytes)", media, url.len())
    } else {
        url.to_string()
    }
}
