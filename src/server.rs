//! Accept loop: one control connection at a time, one request per connection.

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

use crate::command::{Command, Request};
use crate::data_channel::{self, send_all, timed};
use crate::error::RequestError;
use crate::listing;
use crate::messages::{path_from_wire, ControlMessage, ErrorReply, MAX_MESSAGE_LEN};
use crate::transfer::{self, SourceFile};

#[derive(Debug, Clone)]
pub struct ServerConfig {
	/// Address of the control listener, e.g. `0.0.0.0:30020`.
	pub bind: SocketAddr,
	/// Initial current directory.
	pub root: PathBuf,
	/// Bound for the control receive, the data connect and each send. `None` waits forever.
	pub timeout: Option<Duration>,
}

/// How a request ended when it was not aborted.
#[derive(Debug)]
enum Outcome {
	Listed(usize),
	Sent(u64),
	ChangedDirectory,
	Rejected(ErrorReply),
}

pub struct Server {
	listener: TcpListener,
	/// Persists across requests. Only a successful directory change replaces it.
	current_dir: PathBuf,
	timeout: Option<Duration>,
}

impl Server {
	pub async fn bind(config: ServerConfig) -> anyhow::Result<Server> {
		let current_dir = tokio::fs::canonicalize(&config.root)
			.await
			.context(format!("Resolving start directory {}", config.root.display()))?;
		anyhow::ensure!(current_dir.is_dir(), "{} is not a directory", current_dir.display());

		let listener = TcpListener::bind(config.bind).await.context(format!("Listening on {}", config.bind))?;
		Ok(Server { listener, current_dir, timeout: config.timeout })
	}

	pub fn local_addr(&self) -> io::Result<SocketAddr> {
		self.listener.local_addr()
	}

	pub fn current_dir(&self) -> &Path {
		&self.current_dir
	}

	/// Serves requests until accepting fails.
	pub async fn run(mut self) -> anyhow::Result<()> {
		let local_addr = self.local_addr().context("Reading listener address")?;
		loop {
			log::info!("Server open on {}", local_addr);
			let (control, peer) = self.listener.accept().await.context("Accepting control connection")?;
			log::info!("Connection from {}", peer);

			match self.handle(control, peer).await {
				Ok(Outcome::Listed(entries)) => log::info!("Listed {} entries to {}", entries, peer),
				Ok(Outcome::Sent(bytes)) => log::info!("Sent {} bytes to {}", bytes, peer),
				Ok(Outcome::ChangedDirectory) => log::info!("Working directory changed to {}", self.current_dir.display()),
				Ok(Outcome::Rejected(reply)) => log::info!("Replied {:?} to {}", reply.as_str().trim_end(), peer),
				Err(err) => log::warn!("Request from {} abandoned: {}", peer, err),
			}
		}
	}

	/// Runs one request/response cycle. Both connections are closed when this returns.
	async fn handle(&mut self, mut control: TcpStream, peer: SocketAddr) -> Result<Outcome, RequestError> {
		let mut buf = [0u8; MAX_MESSAGE_LEN];
		let read = timed(self.timeout, "control receive", async {
			control.read(&mut buf).await.map_err(RequestError::ControlChannel)
		})
		.await?;
		if read == 0 {
			return Err(RequestError::ControlChannel(io::ErrorKind::UnexpectedEof.into()));
		}

		let decoded = ControlMessage::decode(&buf[..read])?;
		if decoded.truncated {
			log::warn!("Discarded fields after the data port in message from {}", peer);
		}
		let message = decoded.message;
		let data_addr = SocketAddr::new(peer.ip(), message.data_port);
		if Command::parse(message.command).uses_data_channel() {
			log::debug!("Request {:?} from {}, data channel {}", message.command, peer, data_addr);
		} else {
			log::debug!("Request {:?} from {}, no data channel", message.command, peer);
		}

		let outcome = match Request::dispatch(&message) {
			Request::List { show_hidden } => self.list(&mut control, data_addr, show_hidden).await?,
			Request::Transfer { file_name } => self.transfer(&mut control, data_addr, file_name).await?,
			Request::ChangeDirectory { path } => self.change_directory(&mut control, path).await?,
			Request::Invalid => {
				log::warn!("Invalid command {:?} from {}", message.command, peer);
				self.reply(&mut control, ErrorReply::InvalidCommand).await?
			}
		};
		data_channel::close(control).await;
		Ok(outcome)
	}

	async fn list(&self, control: &mut TcpStream, data_addr: SocketAddr, show_hidden: bool) -> Result<Outcome, RequestError> {
		log::info!("List directory requested (hidden entries {})", if show_hidden { "shown" } else { "hidden" });
		let entries = match listing::open(&self.current_dir).await {
			Ok(entries) => entries,
			Err(err) => {
				log::warn!("Opening {}: {}", self.current_dir.display(), err);
				return self.reply(control, ErrorReply::DirectoryUnreadable).await;
			}
		};

		log::info!("Sending directory contents to {}", data_addr);
		let mut data = data_channel::connect(data_addr, self.timeout).await?;
		let sent = listing::stream_entries(entries, show_hidden, &mut data, self.timeout).await?;
		data_channel::close(data).await;
		Ok(Outcome::Listed(sent))
	}

	async fn transfer(&self, control: &mut TcpStream, data_addr: SocketAddr, file_name: Option<&[u8]>) -> Result<Outcome, RequestError> {
		let Some(file_name) = file_name.map(path_from_wire) else {
			log::warn!("Transfer requested without a file name");
			return self.reply(control, ErrorReply::FileNotFound).await;
		};
		log::info!("File {:?} requested", file_name);

		let mut source = match SourceFile::open(&self.current_dir, &file_name).await {
			Ok(source) => source,
			Err(err) => {
				log::info!("Requested file not found ({}), sending error message", err);
				return self.reply(control, ErrorReply::FileNotFound).await;
			}
		};

		log::info!("Sending {:?} ({} bytes) to {}", file_name, source.size, data_addr);
		let mut data = data_channel::connect(data_addr, self.timeout).await?;
		let sent = transfer::send_file(&mut source.file, source.size, &mut data, self.timeout).await?;
		data_channel::close(data).await;
		Ok(Outcome::Sent(sent))
	}

	async fn change_directory(&mut self, control: &mut TcpStream, path: Option<&[u8]>) -> Result<Outcome, RequestError> {
		let path = path.map(path_from_wire);
		log::info!("Change directory requested: {:?}", path);
		let target = match path {
			Some(path) => resolve_directory(&self.current_dir.join(path)).await,
			None => Err(io::Error::new(io::ErrorKind::InvalidInput, "no directory given")),
		};
		match target {
			Ok(dir) => {
				self.current_dir = dir;
				Ok(Outcome::ChangedDirectory)
			}
			Err(err) => {
				log::info!("Error switching to requested directory ({}), sending error message", err);
				self.reply(control, ErrorReply::DirectoryChangeFailed).await
			}
		}
	}

	async fn reply(&self, control: &mut TcpStream, reply: ErrorReply) -> Result<Outcome, RequestError> {
		send_all(control, reply.as_bytes(), self.timeout).await?;
		Ok(Outcome::Rejected(reply))
	}
}

async fn resolve_directory(path: &Path) -> io::Result<PathBuf> {
	let dir = tokio::fs::canonicalize(path).await?;
	if !tokio::fs::metadata(&dir).await?.is_dir() {
		return Err(io::Error::new(io::ErrorKind::Other, format!("{} is not a directory", dir.display())));
	}
	Ok(dir)
}
