//! Rendering against a real headless Chrome
//!
//! Run with `cargo test -- --ignored` on a machine with Chrome installed.
#![cfg(feature = "cdp")]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

use rfpdf::cdp::CdpBrowser;
use rfpdf::params::RequestParams;
use rfpdf::pdf_options::build_pdf_options;
use rfpdf::{Error, RenderConfig, RenderEngine};
use tiny_http::{Header, Response, Server};

static INIT: Once = Once::new();

/// Set once the page's post-load fetch has been answered
static LATE_DATA_SERVED: AtomicBool = AtomicBool::new(false);

/// How long the fixture holds back the post-load fetch
const LATE_DATA_DELAY: Duration = Duration::from_millis(1000);

/// Start a simple test HTTP server
fn start_test_server() -> String {
    INIT.call_once(|| {
        std::thread::spawn(|| {
            let server = Server::http("127.0.0.1:18090").unwrap();
            for request in server.incoming_requests() {
                if request.url() == "/data" {
                    std::thread::spawn(move || {
                        std::thread::sleep(LATE_DATA_DELAY);
                        let response = Response::from_string("late chart data")
                            .with_header("Content-Type: text/plain".parse::<Header>().unwrap());
                        LATE_DATA_SERVED.store(true, Ordering::SeqCst);
                        let _ = request.respond(response);
                    });
                    continue;
                }
                let response = match request.url() {
                    "/" => Response::from_string(
                        r#"<!DOCTYPE html>
<html>
<head><title>Test Page</title><link rel="stylesheet" href="/style.css"></head>
<body><h1>Hello from Test Server</h1></body>
</html>"#,
                    )
                    .with_header("Content-Type: text/html; charset=utf-8".parse::<Header>().unwrap()),
                    "/late" => Response::from_string(
                        r#"<!DOCTYPE html>
<html>
<body>
<div id="chart">loading</div>
<script>
window.addEventListener("load", () => {
  fetch("/data").then(r => r.text()).then(t => { document.getElementById("chart").textContent = t; });
});
</script>
</body>
</html>"#,
                    )
                    .with_header("Content-Type: text/html; charset=utf-8".parse::<Header>().unwrap()),
                    "/style.css" => Response::from_string("h1 { color: #336699; }")
                        .with_header("Content-Type: text/css".parse::<Header>().unwrap()),
                    _ => Response::from_string("Not Found").with_status_code(404),
                };
                let _ = request.respond(response);
            }
        });
        // Give the server time to start
        std::thread::sleep(Duration::from_millis(100));
    });

    "http://127.0.0.1:18090".to_string()
}

fn start_engine(timeout_ms: u64) -> RenderEngine {
    let config = RenderConfig {
        timeout_ms,
        max_pages: 2,
        ..Default::default()
    };
    let browser = CdpBrowser::launch(&config).expect("Failed to launch Chrome");
    RenderEngine::new(Arc::new(browser), config)
}

#[tokio::test(flavor = "multi_thread")]
#[ignore] // Requires Chrome to be installed
async fn renders_a_served_page() {
    let base_url = start_test_server();
    let engine = start_engine(30000);
    let options = build_pdf_options(&RequestParams::new().with_query("format", "A4")).unwrap();

    let pdf = engine.render_url(&base_url, &options).await.unwrap();
    assert!(pdf.starts_with(b"%PDF"));
    assert_eq!(engine.open_pages(), 0);
}

#[tokio::test(flavor = "multi_thread")]
#[ignore] // Requires Chrome to be installed
async fn waits_for_content_fetched_after_load() {
    let base_url = start_test_server();
    let engine = start_engine(30000);

    let started = Instant::now();
    let pdf = engine
        .render_url(&format!("{}/late", base_url), &Default::default())
        .await
        .unwrap();

    assert!(pdf.starts_with(b"%PDF"));
    // Capture happened only after the delayed fetch settled.
    assert!(LATE_DATA_SERVED.load(Ordering::SeqCst));
    assert!(started.elapsed() >= LATE_DATA_DELAY);
}

#[tokio::test(flavor = "multi_thread")]
#[ignore] // Requires Chrome to be installed
async fn renders_inline_html() {
    let engine = start_engine(30000);
    let params = RequestParams::new()
        .with_query("landscape", "true")
        .with_query("margin", "1cm");
    let options = build_pdf_options(&params).unwrap();

    let pdf = engine
        .render_html("<h1>Hello</h1><p>ünïcödé</p>", &options)
        .await
        .unwrap();
    assert!(pdf.starts_with(b"%PDF"));
}

#[tokio::test(flavor = "multi_thread")]
#[ignore] // Requires Chrome to be installed
async fn unroutable_address_times_out() {
    let engine = start_engine(2000);

    let err = engine
        .render_url("http://10.255.255.1/", &Default::default())
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::Timeout(_) | Error::LoadError(_)),
        "unexpected error: {:?}",
        err
    );

    // The browser survives and keeps serving.
    let pdf = engine.render_html("<p>still here</p>", &Default::default()).await.unwrap();
    assert!(pdf.starts_with(b"%PDF"));
}
