//! Laserscope - networked oscilloscope for laser scan diagnostics
//!
//! Entry point: loads the config, starts acquisition and serves the web
//! interface until Ctrl+C.

use anyhow::Result;
use laserscope::{AppConfig, Scope};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, info};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("laserscope=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut port: Option<u16> = None;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--version" | "-v" => {
                println!("laserscope {} ({})", laserscope::VERSION, laserscope::BUILD_DATE);
                return Ok(());
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--config" | "-c" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --config requires a path");
                    return Ok(());
                }
                config_path = Some(PathBuf::from(&args[i + 1]));
                i += 2;
                continue;
            }
            "--port" | "-p" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --port requires a value");
                    return Ok(());
                }
                port = args[i + 1].parse().ok();
                if port.is_none() {
                    eprintln!("Error: Invalid port: {}", args[i + 1]);
                    return Ok(());
                }
                i += 2;
                continue;
            }
            arg => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                return Ok(());
            }
        }
    }

    let config_path = config_path.unwrap_or_else(AppConfig::path);
    let mut config = AppConfig::load_from(&config_path);
    if let Some(port) = port {
        config.port = port;
    }

    info!(
        version = laserscope::VERSION,
        build_date = laserscope::BUILD_DATE,
        "Laserscope starting"
    );

    let scope = Scope::start(&config)?;

    let shutdown = Arc::new(Notify::new());
    let signal = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        info!("Shutdown requested");
        signal.notify_one();
    })?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(laserscope_server::start_server(scope.state(), async move {
        shutdown.notified().await;
    }));

    scope.shutdown();

    if let Err(e) = &result {
        error!("Server error: {}", e);
    }
    result
}

fn print_help() {
    println!("Usage: laserscope [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -c, --config PATH   Config file (default: $LASERSCOPE_CONFIG or config.json)");
    println!("  -p, --port PORT     Override the configured HTTP port");
    println!("  -v, --version       Show version");
    println!("  -h, --help          Show this help");
}
