//! diffusion-gateway: serves the diffusion-LLM tools over stdin/stdout.
//!
//! Usage:
//!   diffusion-gateway [--config <path>]
//!   diffusion-gateway --version
//!
//! Logs go to stderr; stdout carries only protocol replies.

use anyhow::Context;
use diffusion_gateway::cache::ResponseCache;
use diffusion_gateway::client::UpstreamClientBuilder;
use diffusion_gateway::config::GatewayConfig;
use diffusion_gateway::logging;
use diffusion_gateway::server::ToolServer;
use diffusion_gateway::tools::{default_dispatcher, ToolContext};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

fn print_usage() {
    println!(
        r#"diffusion-gateway {}

USAGE:
    diffusion-gateway [--config <path>]

OPTIONS:
    --config <path>     YAML configuration file
    --version           Show version information
    --help              Show this help message

ENVIRONMENT:
    GATEWAY_CONFIG      Configuration file, when --config is not given
    GATEWAY_API_KEY     Upstream API key (required)
    GATEWAY_*           Overrides for individual settings
    RUST_LOG            Log filter, overrides the configured level"#,
        env!("CARGO_PKG_VERSION")
    );
}

fn config_path(args: &[String]) -> Option<PathBuf> {
    for (i, arg) in args.iter().enumerate() {
        if arg == "--config" {
            if let Some(path) = args.get(i + 1) {
                return Some(PathBuf::from(path));
            }
        }
    }
    std::env::var("GATEWAY_CONFIG")
        .ok()
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("diffusion-gateway {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let path = config_path(&args);
    let config = GatewayConfig::load(path.as_deref()).context("failed to load configuration")?;
    logging::init(&config.logging).context("failed to initialize logging")?;
    let config = Arc::new(config);

    let cache = Arc::new(ResponseCache::new(config.cache.clone()));
    let _reporter = config
        .cache
        .stats_interval_secs
        .filter(|secs| *secs > 0 && cache.is_enabled())
        .map(|secs| cache.spawn_stats_reporter(Duration::from_secs(secs)));

    let client = Arc::new(
        UpstreamClientBuilder::from_config(&config.upstream)
            .build()
            .context("failed to build upstream client")?,
    );
    let dispatcher = Arc::new(
        default_dispatcher(&ToolContext::new(client, cache, Arc::clone(&config)))
            .context("failed to register tools")?,
    );

    info!(
        version = env!("CARGO_PKG_VERSION"),
        base_url = config.upstream.base_url.as_str(),
        default_model = config.default_model.as_str(),
        tools = dispatcher.len(),
        "starting diffusion gateway"
    );

    let server = ToolServer::new(dispatcher);
    tokio::select! {
        result = server.serve(tokio::io::stdin(), tokio::io::stdout()) => {
            if let Err(e) = &result {
                error!(error = %e, "server stopped with an error");
            }
            result.context("tool server failed")?;
            info!("input closed, shutting down");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl-C, shutting down");
        }
    }
    Ok(())
}
