use std::error::Error;

use clap::Parser;
use env_logger::Builder;
use log::{debug, error, info, warn, LevelFilter};

use ribd::cli::{query_ribd, Args, Command, RunOptions};
use ribd::config::{self, ServerConfig};
use ribd::server::Server;

async fn run(options: &RunOptions) -> Result<(), Box<dyn Error>> {
    let config = match &options.config_path {
        Some(path) => {
            let config = config::from_file(path)?;
            debug!(
                "Found {} static routes in {}",
                config.static_routes.len(),
                path
            );
            config
        }
        None => ServerConfig::default(),
    };

    let server = Server::new();
    let (api_addr, api_handle) = server.serve_rpc_api(config.api_address).await?;
    info!("JSON-RPC API listening on {}", api_addr);

    if let Some(global) = &config.global {
        server.start_bgp(global).await?;
        let added = server.add_static_routes(&config.static_routes).await?;
        debug!("Added {} static routes", added);
    } else if !config.static_routes.is_empty() {
        warn!("Static routes are ignored without a [global] config");
    }

    tokio::signal::ctrl_c().await?;
    info!("Stopping ribd...");
    server.stop_bgp().await;
    api_handle.stop()?;
    api_handle.stopped().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let (ribd_level, other_level) = match args.verbose {
        0 => (LevelFilter::Info, LevelFilter::Warn),
        1 => (LevelFilter::Debug, LevelFilter::Warn),
        2 => (LevelFilter::Trace, LevelFilter::Warn),
        _ => (LevelFilter::Trace, LevelFilter::Trace),
    };
    Builder::new()
        .filter(Some("ribd"), ribd_level)
        .filter(None, other_level)
        .init();
    debug!("Logging at levels {}/{}", ribd_level, other_level);

    match &args.cmd {
        Command::Run(options) => {
            if let Err(err) = run(options).await {
                error!("{}", err);
                std::process::exit(1);
            }
        }
        _ => query_ribd(&args).await,
    }
}
