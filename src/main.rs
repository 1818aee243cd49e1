// src/main.rs

//! The main entry point for the Twice proxy.

use anyhow::{Context, Result};
use std::env;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::filter::EnvFilter;
use twice::config::Config;
use twice::server;

#[tokio::main]
async fn main() -> Result<()> {
    run_app().await
}

async fn run_app() -> Result<()> {
    // Define version information.
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    // Collect command-line arguments to decide the execution mode.
    let args: Vec<String> = env::args().collect();

    // Handle the --version flag.
    if args.contains(&"--version".to_string()) {
        println!("Twice version {VERSION}");
        return Ok(());
    }

    let flag_value = |name: &str| {
        args.iter()
            .position(|arg| arg == name)
            .and_then(|i| args.get(i + 1))
            .cloned()
    };
    let flag_set =
        |long: &str, short: &str| args.iter().any(|arg| arg == long || arg == short);

    // Load the server configuration. If loading fails, print the error and
    // exit non-zero, as the proxy cannot run without a valid configuration.
    let config_path = flag_value("--config").unwrap_or_else(|| "twice.toml".to_string());
    let mut config = match Config::from_file(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{config_path}\": {e}");
            std::process::exit(1);
        }
    };

    // Override the listen socket if provided on the command line.
    if let Some(port_str) = flag_value("--port") {
        match port_str.parse::<u16>() {
            Ok(port) => config.port = port,
            Err(_) => {
                eprintln!("Invalid port number: {port_str}");
                std::process::exit(1);
            }
        }
    }
    if let Some(interface) = flag_value("--interface") {
        config.interface = interface;
    }

    // Setup logging. `--verbose` wins over the config level; RUST_LOG wins
    // over both. `--log FILE` routes output to a file instead of stdout.
    let verbose = flag_set("--verbose", "-v");
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if verbose {
            "debug".to_string()
        } else {
            config.log_level.clone()
        }
    });
    match flag_value("--log") {
        Some(path) if path != "stdout" => {
            let file = std::fs::File::create(&path)
                .with_context(|| format!("Failed to open log file '{path}'"))?;
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new(log_level))
                .compact()
                .with_ansi(false)
                .with_writer(Arc::new(file))
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new(log_level))
                .compact()
                .with_ansi(true)
                .init();
        }
    }

    if flag_set("--daemon", "-d") {
        // Process supervision owns daemonization; nothing to do in-process.
        info!("--daemon: running in the foreground, daemonization is delegated to the service manager.");
    }

    if let Err(e) = server::run(config).await {
        error!("Server runtime error: {}", e);
        return Err(e);
    }

    Ok(())
}
