//! CLI binary for academic-reader.
//!
//! A thin shim over the library crate that maps flags and environment
//! variables to `ServerConfig` and runs the HTTP service.

use academic_reader::config::parse_cleanup_flag;
use academic_reader::{serve, DeviceSelection, EngineOptions, ServerConfig};
use anyhow::{Context, Result};
use clap::Parser;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"ENDPOINTS:
  POST /api/academic/parse                         multipart field "file" (application/pdf, ≤ 50 MiB)
  GET  /                                           service info and engine readiness
  GET  {STATIC_BASE_URL}/academic/{id}/figures/*   stored figure PNGs

STORAGE:
  {STORAGE_BASE_PATH}/academic/{id}/content.md
  {STORAGE_BASE_PATH}/academic/{id}/meta.json
  {STORAGE_BASE_PATH}/academic/{id}/figures/fig_001.png …

PDFIUM:
  The pdfium shared library is looked up in PDFIUM_LIB_PATH, then ./, then
  the system library path.
"#;

/// Serve academic-paper PDF parsing over HTTP.
#[derive(Parser, Debug)]
#[command(
    name = "academic-reader",
    version,
    about = "Serve academic-paper PDF parsing over HTTP",
    long_about = "Accepts academic-paper PDFs over HTTP, converts them to Markdown, extracts \
figures as PNG files, stores both under a generated document id, and serves the figures as \
static files.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Socket address to listen on.
    #[arg(long, env = "ACADEMIC_READER_ADDR", default_value = "0.0.0.0:8000")]
    addr: SocketAddr,

    /// Browser frontend origin allowed by CORS.
    #[arg(long, env = "FRONTEND_URL")]
    frontend_url: Option<String>,

    /// Root directory for stored documents.
    #[arg(long, env = "STORAGE_BASE_PATH", default_value = "storage")]
    storage_base_path: PathBuf,

    /// URL prefix stored files are served under.
    #[arg(long, env = "STATIC_BASE_URL", default_value = "/static")]
    static_base_url: String,

    /// Delete all stored documents on shutdown (only the value "true" enables it).
    #[arg(long, env = "CLEANUP_ON_EXIT", default_value = "false")]
    cleanup_on_exit: String,

    /// Compute device: auto, cuda, mps, cpu.
    #[arg(long, env = "ACADEMIC_READER_DEVICE", default_value = "auto")]
    device: String,

    /// Conversions allowed to run at once.
    #[arg(long, env = "ACADEMIC_READER_CONVERSION_SLOTS", default_value_t = 1,
          value_parser = clap::value_parser!(u32).range(1..=64))]
    conversion_slots: u32,

    /// Abandon a conversion after this many seconds (unbounded when unset).
    #[arg(long, env = "ACADEMIC_READER_CONVERSION_TIMEOUT")]
    conversion_timeout: Option<u64>,

    /// Directory containing the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "ACADEMIC_READER_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "academic_reader=debug,tower_http=debug"
    } else {
        "academic_reader=info,tower_http=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;
    tracing::info!(
        "Starting academic-reader {} on {}",
        env!("CARGO_PKG_VERSION"),
        config.bind_addr
    );

    serve(config).await.context("Server failed")?;
    Ok(())
}

/// Map CLI args to `ServerConfig`.
fn build_config(cli: &Cli) -> Result<ServerConfig> {
    let engine = EngineOptions {
        device: DeviceSelection::parse(&cli.device).context("Invalid --device")?,
        conversion_slots: cli.conversion_slots as usize,
        conversion_timeout_secs: cli.conversion_timeout,
        pdfium_library_path: cli.pdfium_lib_path.clone(),
        ..EngineOptions::default()
    };

    let mut builder = ServerConfig::builder()
        .bind_addr(cli.addr)
        .storage_base_path(&cli.storage_base_path)
        .static_base_url(cli.static_base_url.as_str())
        .cleanup_on_exit(parse_cleanup_flag(&cli.cleanup_on_exit))
        .engine(engine);

    if let Some(ref url) = cli.frontend_url {
        builder = builder.frontend_url(url.as_str());
    }

    builder.build().context("Invalid configuration")
}
