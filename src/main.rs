use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing_subscriber::EnvFilter;

use webserv::config::Config;
use webserv::handler::DefaultHandler;
use webserv::server::Server;

#[derive(Parser, Debug)]
#[command(name = "webserv", version, about = "Single-threaded HTTP/1.1 server", long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(env = "WEBSERV_CONFIG", default_value = "conf/webserv.yaml")]
    config: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    let args = Args::parse();
    let config = Arc::new(Config::from_file(&args.config)?);
    tracing::info!(
        config = %args.config.display(),
        servers = config.servers.len(),
        "configuration loaded"
    );

    let handler = DefaultHandler::new(&config);
    let mut server = Server::bind(Arc::clone(&config), Box::new(handler))?;

    let shutdown = server.shutdown_handle();
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&shutdown))
            .with_context(|| format!("failed to install handler for signal {signal}"))?;
    }

    server.run()
}
