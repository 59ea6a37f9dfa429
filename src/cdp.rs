//! Chrome DevTools Protocol backend (uses the `headless_chrome` crate)

use std::ffi::OsStr;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, info, warn};

use crate::backend::{BrowserBackend, BrowserPage, PageCanceller};
use crate::pdf_options::PdfOptions;
use crate::{Error, RenderConfig, Result};

/// The browser lives as long as the service; don't let it reap itself.
const BROWSER_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Lifecycle event Chrome emits once a frame has had at most two network
/// connections for 500ms.
const NETWORK_ALMOST_IDLE: &str = "networkAlmostIdle";

/// A headless Chrome process shared by all renders
///
/// Each render gets its own tab, opened by [`BrowserBackend::open_page`] and
/// closed when the render finishes.
pub struct CdpBrowser {
    browser: Browser,
}

impl CdpBrowser {
    /// Launch headless Chrome
    pub fn launch(config: &RenderConfig) -> Result<Self> {
        let mut args: Vec<&OsStr> = Vec::new();
        if !config.sandbox {
            args.push(OsStr::new("--disable-setuid-sandbox"));
        }

        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(config.sandbox)
            .window_size(Some((config.viewport.width, config.viewport.height)))
            .idle_browser_timeout(BROWSER_IDLE_TIMEOUT)
            .path(config.chrome_path.clone())
            .args(args)
            .build()
            .map_err(|e| Error::InitializationError(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::InitializationError(format!("Failed to launch browser: {}", e)))?;

        info!("launched headless Chrome (sandbox: {})", config.sandbox);
        Ok(Self { browser })
    }
}

impl BrowserBackend for CdpBrowser {
    fn name(&self) -> &'static str {
        "cdp"
    }

    fn open_page(&self) -> Result<Box<dyn BrowserPage>> {
        let tab = self
            .browser
            .new_tab()
            .map_err(|e| Error::RenderError(format!("Failed to create tab: {}", e)))?;

        match CdpPage::attach(Arc::clone(&tab)) {
            Ok(page) => Ok(Box::new(page)),
            Err(e) => {
                // The tab exists in the browser even though setup failed.
                if let Err(close_err) = tab.close(false) {
                    warn!("Failed to close tab after setup error: {}", close_err);
                }
                Err(e)
            }
        }
    }
}

/// Set once the main frame reports `networkAlmostIdle`, cleared when a new
/// document starts loading.
#[derive(Default)]
struct IdleSignal {
    settled: Mutex<bool>,
    changed: Condvar,
}

impl IdleSignal {
    fn set(&self, settled: bool) {
        if let Ok(mut guard) = self.settled.lock() {
            *guard = settled;
            self.changed.notify_all();
        }
    }

    /// Apply one `Page.lifecycleEvent`. Only the main frame counts: `init`
    /// starts a new document, `networkAlmostIdle` settles it.
    fn observe(&self, main_frame: &str, frame_id: &str, name: &str) {
        if frame_id != main_frame {
            return;
        }
        match name {
            "init" => self.set(false),
            NETWORK_ALMOST_IDLE => self.set(true),
            _ => {}
        }
    }

    fn wait(&self, timeout: Duration) -> Result<()> {
        let guard = self
            .settled
            .lock()
            .map_err(|_| Error::Other("Idle signal lock poisoned".into()))?;
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |settled| !*settled)
            .map_err(|_| Error::Other("Idle signal lock poisoned".into()))?;
        if *guard {
            Ok(())
        } else {
            Err(Error::Timeout(timeout.as_millis() as u64))
        }
    }
}

struct CdpPage {
    tab: Arc<Tab>,
    idle: Arc<IdleSignal>,
}

impl CdpPage {
    fn attach(tab: Arc<Tab>) -> Result<Self> {
        tab.call_method(Page::SetLifecycleEventsEnabled { enabled: true })?;

        let idle = Arc::new(IdleSignal::default());
        let signal = Arc::clone(&idle);
        // The main frame shares its id with the target.
        let main_frame = tab.get_target_id().clone();

        tab.add_event_listener(Arc::new(move |event: &Event| {
            if let Event::PageLifecycleEvent(lifecycle) = event {
                signal.observe(&main_frame, &lifecycle.params.frame_id, &lifecycle.params.name);
            }
        }))?;

        Ok(Self { tab, idle })
    }
}

impl BrowserPage for CdpPage {
    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()> {
        self.idle.set(false);
        self.tab.set_default_timeout(timeout);

        self.tab
            .navigate_to(url)
            .map_err(|e| Error::LoadError(format!("Navigation failed: {}", e)))?;

        self.tab
            .wait_until_navigated()
            .map_err(|e| Error::LoadError(format!("Wait for navigation failed: {}", e)))?;

        Ok(())
    }

    fn wait_for_network_idle(&mut self, timeout: Duration) -> Result<()> {
        self.idle.wait(timeout)?;
        debug!("network idle on {}", self.tab.get_url());
        Ok(())
    }

    fn print_to_pdf(&mut self, options: &PdfOptions, timeout: Duration) -> Result<Vec<u8>> {
        self.tab.set_default_timeout(timeout);
        let print_options = to_print_options(options)?;

        self.tab
            .print_to_pdf(Some(print_options))
            .map_err(|e| Error::RenderError(format!("PDF capture failed: {}", e)))
    }

    fn close(&mut self) -> Result<()> {
        self.tab
            .close(false)
            .map_err(|e| Error::CdpError(format!("Failed to close tab: {}", e)))?;
        Ok(())
    }

    fn canceller(&self) -> Arc<dyn PageCanceller> {
        Arc::new(TabCanceller {
            tab: Arc::clone(&self.tab),
            idle: Arc::clone(&self.idle),
        })
    }
}

/// Stops a tab's loading and closes it while the render thread is blocked on
/// it. Chrome does not bound a connect to a black-holed host by our
/// deadline, so this is what frees the page.
struct TabCanceller {
    tab: Arc<Tab>,
    idle: Arc<IdleSignal>,
}

impl PageCanceller for TabCanceller {
    fn cancel(&self) -> Result<()> {
        if let Err(e) = self.tab.call_method(Page::StopLoading(None)) {
            debug!("stopLoading before close failed: {}", e);
        }
        let closed = self
            .tab
            .close(false)
            .map_err(|e| Error::CdpError(format!("Failed to close tab: {}", e)));
        // Wake an idle wait; the closed tab fails whatever comes next.
        self.idle.set(true);
        closed?;
        info!("cancelled tab {}", self.tab.get_target_id());
        Ok(())
    }
}

/// Map capture options onto `Page.printToPDF` parameters. Lengths that cannot
/// be parsed fail the capture.
fn to_print_options(options: &PdfOptions) -> Result<PrintToPdfOptions> {
    let (paper_width, paper_height) = options.paper_size_inches().map_err(Error::RenderError)?;
    let [margin_top, margin_right, margin_bottom, margin_left] =
        options.margin_inches().map_err(Error::RenderError)?;

    Ok(PrintToPdfOptions {
        landscape: options.landscape,
        display_header_footer: options.display_header_footer,
        print_background: options.print_background,
        scale: options.scale,
        paper_width,
        paper_height,
        margin_top,
        margin_bottom,
        margin_left,
        margin_right,
        page_ranges: options.page_ranges.clone(),
        header_template: options.header_template.clone(),
        footer_template: options.footer_template.clone(),
        ..Default::default()
    })
}
