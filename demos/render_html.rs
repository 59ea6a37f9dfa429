//! Render a small HTML document to PDF through headless Chrome

use std::sync::Arc;

use rfpdf::cdp::CdpBrowser;
use rfpdf::params::RequestParams;
use rfpdf::pdf_options::build_pdf_options;
use rfpdf::{RenderConfig, RenderEngine};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("rfpdf - HTML to PDF Example\n");

    let config = RenderConfig {
        timeout_ms: 30000,
        max_pages: 2,
        ..Default::default()
    };

    println!("Launching Chrome with config:");
    println!("  Timeout: {}ms", config.timeout_ms);
    println!("  Max pages: {}\n", config.max_pages);

    let browser = CdpBrowser::launch(&config)?;
    let engine = RenderEngine::new(Arc::new(browser), config);
    println!("Engine ready!\n");

    // Same names the HTTP query string accepts
    let params = RequestParams::new()
        .with_query("format", "A4")
        .with_query("margin", "1cm")
        .with_query("printBackground", "true");
    let options = build_pdf_options(&params)?;
    println!("PDF options: {}\n", serde_json::to_string(&options)?);

    let html = r#"<!DOCTYPE html>
<html>
<head><style>h1 { color: #336699; }</style></head>
<body>
  <h1>Invoice 42</h1>
  <p>Rendered by rfpdf.</p>
</body>
</html>"#;

    println!("Rendering {} bytes of HTML...", html.len());
    let pdf = engine.render_html(html, &options).await?;
    println!("PDF rendered: {} bytes", pdf.len());

    std::fs::write("output.pdf", &pdf)?;
    println!("PDF saved to: output.pdf\n");

    println!("Shutting down...");
    engine.shutdown();
    println!("Done!");

    Ok(())
}
