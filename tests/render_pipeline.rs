//! End-to-end tests of the render pipeline against the in-process mock browser

use std::sync::Arc;
use std::time::{Duration, Instant};

use rfpdf::backend::MockBrowser;
use rfpdf::params::RequestParams;
use rfpdf::pdf_options::{build_pdf_options, PdfOptions};
use rfpdf::{Error, RenderConfig, RenderEngine, RenderTarget};

fn engine_with(browser: &MockBrowser, timeout_ms: u64, max_pages: usize) -> RenderEngine {
    let config = RenderConfig {
        timeout_ms,
        max_pages,
        ..Default::default()
    };
    RenderEngine::new(Arc::new(browser.clone()), config)
}

async fn wait_for_released_pages(engine: &RenderEngine, within: Duration) -> bool {
    let until = Instant::now() + within;
    while Instant::now() < until {
        if engine.open_pages() == 0 {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    engine.open_pages() == 0
}

#[tokio::test]
async fn html_renders_like_its_data_url() {
    let browser = MockBrowser::new();
    let engine = engine_with(&browser, 5000, 2);
    let html = "<html><body><h1>Quarterly report</h1><p>ünïcödé</p></body></html>";
    let options = build_pdf_options(&RequestParams::new().with_query("format", "A4")).unwrap();

    let from_html = engine.render_html(html, &options).await.unwrap();
    let data_url = RenderTarget::Html(html.to_string()).navigable_url();
    let from_url = engine.render_url(&data_url, &options).await.unwrap();
    let from_target = engine.render(&RenderTarget::Html(html.to_string()), &options).await.unwrap();

    assert_eq!(from_html, from_url);
    assert_eq!(from_html, from_target);
    assert_eq!(browser.open_pages(), 0);
}

#[tokio::test]
async fn unreachable_url_times_out_and_releases_its_page() {
    let browser = MockBrowser::new().with_unreachable("http://10.255.255.1");
    let engine = engine_with(&browser, 300, 2);

    let started = Instant::now();
    let err = engine
        .render_url("http://10.255.255.1/slow", &PdfOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout(300)), "unexpected error: {:?}", err);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(wait_for_released_pages(&engine, Duration::from_secs(2)).await);
    assert_eq!(browser.open_pages(), 0);

    // The engine is still usable afterwards.
    let pdf = engine.render_html("<p>next</p>", &PdfOptions::default()).await.unwrap();
    assert!(pdf.starts_with(b"%PDF"));
}

#[tokio::test(flavor = "multi_thread")]
async fn page_that_ignores_its_timeout_is_cancelled_at_the_deadline() {
    let browser = MockBrowser::new().with_hanging("http://10.255.255.1");
    let engine = engine_with(&browser, 200, 1);

    let started = Instant::now();
    let err = engine
        .render_url("http://10.255.255.1/", &PdfOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(200)), "unexpected error: {:?}", err);
    assert_eq!(engine.open_pages(), 0);
    assert_eq!(browser.open_pages(), 0);

    // The only pool slot is free again right away.
    let pdf = engine.render_html("<p>ok</p>", &PdfOptions::default()).await.unwrap();
    assert!(pdf.starts_with(b"%PDF"));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn content_loaded_after_the_document_is_captured() {
    let browser = MockBrowser::new().with_late_content("<div id=\"chart\">42</div>");
    let engine = engine_with(&browser, 5000, 1);

    let pdf = engine
        .render_html("<div id=\"app\"></div>", &PdfOptions::default())
        .await
        .unwrap();
    let text = String::from_utf8(pdf).unwrap();
    assert!(text.contains("<div id=\"chart\">42</div>"));
}

#[tokio::test]
async fn concurrent_renders_are_isolated() {
    let browser = MockBrowser::new().with_navigation_delay(Duration::from_millis(20));
    let engine = engine_with(&browser, 5000, 3);

    let mut handles = Vec::new();
    for i in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let html = format!("<p>document {}</p>", i);
            let pdf = engine.render_html(&html, &PdfOptions::default()).await.unwrap();
            (i, String::from_utf8(pdf).unwrap())
        }));
    }

    for handle in handles {
        let (i, text) = handle.await.unwrap();
        assert!(text.contains(&format!("<p>document {}</p>", i)));
        for other in (0..8).filter(|o| *o != i) {
            assert!(!text.contains(&format!("<p>document {}</p>", other)));
        }
    }

    assert_eq!(browser.pages_opened(), 8);
    assert_eq!(browser.open_pages(), 0);
}

#[tokio::test]
async fn page_pool_bounds_concurrency() {
    let browser = MockBrowser::new().with_navigation_delay(Duration::from_millis(100));
    let engine = engine_with(&browser, 5000, 2);

    let started = Instant::now();
    let renders: Vec<_> = (0..4)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .render_html(&format!("<p>{}</p>", i), &PdfOptions::default())
                    .await
            })
        })
        .collect();
    for render in renders {
        render.await.unwrap().unwrap();
    }

    // Four renders through two pages take at least two rounds.
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(browser.open_pages(), 0);
}

#[tokio::test]
async fn options_reach_the_capture() {
    let browser = MockBrowser::new();
    let engine = engine_with(&browser, 5000, 1);
    let params = RequestParams::new()
        .with_query("landscape", "true")
        .with_query("pageRanges", "1-3");
    let options = build_pdf_options(&params).unwrap();

    let pdf = engine.render_html("<p>x</p>", &options).await.unwrap();
    let text = String::from_utf8(pdf).unwrap();
    assert!(text.contains(r#""landscape":true"#));
    assert!(text.contains(r#""pageRanges":"1-3""#));
}

#[tokio::test]
async fn shutdown_turns_renders_away() {
    let browser = MockBrowser::new();
    let engine = engine_with(&browser, 1000, 1);
    engine.render_html("<p>before</p>", &PdfOptions::default()).await.unwrap();

    engine.shutdown();
    let err = engine.render_html("<p>after</p>", &PdfOptions::default()).await.unwrap_err();
    assert!(matches!(err, Error::NotReady));
    assert_eq!(browser.pages_opened(), 1);
}
