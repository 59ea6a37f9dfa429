use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rfpdf::body::RequestBody;
use rfpdf::cdp::CdpBrowser;
use rfpdf::params::RequestParams;
use rfpdf::request::{render_html_request, render_url_request};
use rfpdf::server::{self, ServerConfig};
use rfpdf::{RenderConfig, RenderEngine};

#[derive(Parser, Debug)]
#[command(name = "rfpdf", version, about = "Render URLs and HTML to PDF with headless Chrome")]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service
    Serve {
        #[arg(long, env = "IP", default_value = "0.0.0.0")]
        host: String,

        #[arg(short, long, env = "PORT", default_value_t = 5000)]
        port: u16,

        #[command(flatten)]
        browser: BrowserArgs,
    },
    /// Render a single document and exit
    Render {
        /// Page to render
        #[arg(long, conflicts_with = "html_file", required_unless_present = "html_file")]
        url: Option<String>,

        /// HTML file to render
        #[arg(long)]
        html_file: Option<PathBuf>,

        /// Where to write the PDF
        #[arg(short, long, default_value = "output.pdf")]
        output: PathBuf,

        /// PDF option as key=value (e.g. `-O format=A4 -O landscape=true`)
        #[arg(short = 'O', long = "option", value_parser = parse_key_value)]
        options: Vec<(String, String)>,

        #[command(flatten)]
        browser: BrowserArgs,
    },
}

#[derive(Args, Debug)]
struct BrowserArgs {
    /// Chrome/Chromium executable
    #[arg(long, env = "CHROME_PATH")]
    chrome_path: Option<PathBuf>,

    /// Pages rendered concurrently
    #[arg(long, env = "RFPDF_MAX_PAGES", default_value_t = num_cpus::get())]
    max_pages: usize,

    /// Budget for one render, in milliseconds
    #[arg(long, env = "RFPDF_TIMEOUT_MS", default_value_t = 30000)]
    timeout_ms: u64,

    /// Keep Chrome's sandbox enabled
    #[arg(long, env = "RFPDF_SANDBOX")]
    sandbox: bool,
}

impl BrowserArgs {
    fn render_config(&self) -> RenderConfig {
        RenderConfig {
            timeout_ms: self.timeout_ms,
            max_pages: self.max_pages,
            chrome_path: self.chrome_path.clone(),
            sandbox: self.sandbox,
            ..Default::default()
        }
    }
}

fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got `{}`", s))
}

/// Launch Chrome off the async runtime and wrap it in an engine
async fn start_engine(config: RenderConfig) -> Result<RenderEngine> {
    let launch_config = config.clone();
    let browser = tokio::task::spawn_blocking(move || CdpBrowser::launch(&launch_config))
        .await
        .context("browser launch task failed")??;
    Ok(RenderEngine::new(Arc::new(browser), config))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn serve(config: ServerConfig, browser: BrowserArgs) -> Result<()> {
    let addr = config.addr();

    // The browser is up before the first request can arrive.
    let engine = start_engine(browser.render_config()).await?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    server::serve(listener, engine, shutdown_signal()).await?;
    Ok(())
}

async fn render(
    url: Option<String>,
    html_file: Option<PathBuf>,
    output: PathBuf,
    options: Vec<(String, String)>,
    browser: BrowserArgs,
) -> Result<()> {
    let filename = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output.pdf".to_string());

    let mut params = RequestParams::new().with_path("filename", filename);
    for (key, value) in options {
        params = params.with_query(key, value);
    }

    let engine = start_engine(browser.render_config()).await?;
    let rendered = match (url, html_file) {
        (Some(url), _) => render_url_request(&engine, &params.with_query("url", url)).await,
        (None, Some(path)) => {
            let html = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            render_html_request(&engine, &params, RequestBody::Text(html)).await
        }
        (None, None) => bail!("either --url or --html-file is required"),
    };
    engine.shutdown();

    let rendered = rendered?;
    std::fs::write(&output, &rendered.pdf).with_context(|| format!("failed to write {}", output.display()))?;
    log::info!("wrote {} ({} bytes)", output.display(), rendered.pdf.len());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve { host, port, browser } => serve(ServerConfig { host, port }, browser).await,
        Command::Render {
            url,
            html_file,
            output,
            options,
            browser,
        } => render(url, html_file, output, options, browser).await,
    }
}
