//! Requests listings, files and directory changes from an ftserver

use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use ftserver::client::{Client, ClientConfig, ClientError, ListedEntry};
use tokio::fs::File;

#[derive(clap::Parser, Debug, Clone)]
struct Cli {
	/// Host the server runs on, e.g. `localhost`.
	host: String,
	/// Control port of the server.
	#[arg(value_parser = clap::value_parser!(u16).range(1..))]
	port: u16,
	/// Port to receive data on. 0 picks a free one.
	data_port: u16,
	/// Give up on the request after this many seconds.
	#[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
	timeout_secs: Option<u64>,
	#[command(subcommand)]
	action: Action,
}

#[derive(clap::Subcommand, Debug, Clone)]
enum Action {
	/// List the server's current directory.
	List {
		/// Include hidden entries.
		#[arg(long, short)]
		all: bool,
		/// Print the listing as a JSON array.
		#[arg(long)]
		json: bool,
	},
	/// Download a file from the server's current directory.
	Get {
		file: String,
		/// Where to store the file. Defaults to the file's name in the working directory.
		#[arg(long, short)]
		output: Option<PathBuf>,
	},
	/// Change the server's current directory.
	Cd { dir: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	env_logger::init();
	let cli_args = Cli::parse();

	let client = Client::new(ClientConfig {
		server: format!("{}:{}", cli_args.host, cli_args.port),
		data_port: cli_args.data_port,
		timeout: cli_args.timeout_secs.map(Duration::from_secs),
	});

	match cli_args.action {
		Action::List { all, json } => {
			let lines = client.list(all).await.context("Listing directory")?;
			if json {
				println!("{}", listing_json(&lines)?);
			} else {
				for line in lines {
					println!("{}", line);
				}
			}
		}
		Action::Get { file, output } => {
			let output = match output {
				Some(output) => output,
				None => Path::new(&file).file_name().map(PathBuf::from).context(format!("No file name in {:?}", file))?,
			};
			let mut sink = File::create(&output).await.context(format!("Creating {}", output.display()))?;
			match client.get(&file, &mut sink).await {
				Ok(bytes) => println!("Received {:?} ({} bytes) into {}", file, bytes, output.display()),
				Err(err) => {
					drop(sink);
					if let Err(remove_err) = tokio::fs::remove_file(&output).await {
						log::warn!("Removing partial {}: {}", output.display(), remove_err);
					}
					return Err(report(err).into());
				}
			}
		}
		Action::Cd { dir } => {
			client.change_dir(&dir).await.map_err(report)?;
			println!("Server directory changed to {:?}", dir);
		}
	}
	Ok(())
}

fn listing_json(lines: &[String]) -> serde_json::Result<String> {
	let entries: Vec<ListedEntry> = lines.iter().map(|line| ListedEntry::parse(line)).collect();
	serde_json::to_string_pretty(&entries)
}

fn report(err: ClientError) -> anyhow::Error {
	match err {
		ClientError::Server(reply) => anyhow::anyhow!("{}", reply),
		other => anyhow::Error::new(other).context("Request failed"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn json_listing_is_an_array_of_entries() {
		let lines = vec!["sub/".to_string(), "notes.txt".to_string()];
		let value: serde_json::Value = serde_json::from_str(&listing_json(&lines).unwrap()).unwrap();
		assert_eq!(
			value,
			serde_json::json!([
				{ "name": "sub", "is_dir": true },
				{ "name": "notes.txt", "is_dir": false },
			])
		);
	}

	#[test]
	fn empty_listing_is_an_empty_array() {
		assert_eq!(listing_json(&[]).unwrap(), "[]");
	}

	#[test]
	fn parses_subcommands() {
		let cli = Cli::try_parse_from(["ftclient", "localhost", "30020", "0", "list", "--all", "--json"]).unwrap();
		assert!(matches!(cli.action, Action::List { all: true, json: true }));
		assert!(Cli::try_parse_from(["ftclient", "localhost", "30020", "0", "--timeout-secs", "0", "cd", "x"]).is_err());
		assert!(Cli::try_parse_from(["ftclient", "localhost", "0", "0", "get", "f"]).is_err());
	}
}
