//! Serves directory listings, file downloads and directory changes to one client at a time

use std::error::Error;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use ftserver::server::{Server, ServerConfig};

#[derive(clap::Parser, Debug, Clone)]
struct Cli {
	/// Port to listen on for control connections.
	#[arg(value_parser = clap::value_parser!(u16).range(1..))]
	port: u16,
	/// Address to listen on.
	#[arg(long, default_value = "0.0.0.0")]
	bind: IpAddr,
	/// Directory to serve from at startup. Defaults to the working directory.
	#[arg(long)]
	dir: Option<PathBuf>,
	/// Give up on a request when receiving, connecting or sending stalls this long.
	#[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
	timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
	let cli_args = Cli::parse();

	let root = match cli_args.dir {
		Some(dir) => dir,
		None => std::env::current_dir().context("Reading working directory")?,
	};
	let server = Server::bind(ServerConfig {
		bind: SocketAddr::new(cli_args.bind, cli_args.port),
		root,
		timeout: cli_args.timeout_secs.map(Duration::from_secs),
	})
	.await?;
	log::info!("Serving {} on {}", server.current_dir().display(), server.local_addr()?);

	tokio::select! {
		served = server.run() => served?,
		interrupted = tokio::signal::ctrl_c() => {
			interrupted.context("Waiting for Ctrl-C")?;
			log::info!("Interrupted, shutting down");
		}
	}
	Ok(())
}
