mod cli;

use anyhow::Context;
use clap::Parser;
use log::info;

use fouine_lib::{ProxyConfig, Server};

use crate::cli::Args;

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = ProxyConfig {
        listen_address: ([0, 0, 0, 0], args.port).into(),
        max_clients: args.max_clients,
        max_cache_bytes: args.max_cache_bytes,
        max_element_bytes: args.max_element_bytes,
    };

    let server = Server::new(config).context("could not start the proxy")?;
    info!(
        "listening on {}",
        server.local_addr().context("could not read the bound address")?
    );
    server.run();
    Ok(())
}
