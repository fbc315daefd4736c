//! Peer side of the protocol.
//!
//! For every request the client connects a fresh control connection, listens on the data port it
//! advertises and waits for either an error reply on the control channel or the server's data
//! connection.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::command::Command;
use crate::listing::DIRECTORY_MARKER;
use crate::messages::{ControlMessage, FrameError};

/// How long to wait for a data connection once the server has closed the control channel without
/// replying. A server that finished a transfer has connected long before that.
const DATA_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum ClientError {
	/// The server answered with an error reply on the control channel.
	#[error("server replied: {0}")]
	Server(String),
	#[error(transparent)]
	Frame(#[from] FrameError),
	#[error("I/O: {0}")]
	Io(#[from] io::Error),
	#[error("server closed the control connection without opening a data connection")]
	NoDataChannel,
	#[error("request timed out after {0:?}")]
	TimedOut(Duration),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
	/// Control address of the server, e.g. `flip1:30020`.
	pub server: String,
	/// Port advertised for the data channel. 0 picks a free port per request.
	pub data_port: u16,
	/// Bound for each whole request. `None` waits forever.
	pub timeout: Option<Duration>,
}

/// One line of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListedEntry {
	pub name: String,
	pub is_dir: bool,
}

impl ListedEntry {
	pub fn parse(line: &str) -> ListedEntry {
		match line.strip_suffix(DIRECTORY_MARKER as char) {
			Some(name) => ListedEntry { name: name.to_string(), is_dir: true },
			None => ListedEntry { name: line.to_string(), is_dir: false },
		}
	}
}

#[derive(Debug, Clone)]
pub struct Client {
	config: ClientConfig,
}

impl Client {
	pub fn new(config: ClientConfig) -> Client {
		Client { config }
	}

	/// Lists the server's current directory. Directory names keep their trailing `/`. Names that
	/// are not UTF-8 are shown lossily; use [`Client::list_raw`] to fetch them afterwards.
	pub async fn list(&self, show_hidden: bool) -> Result<Vec<String>, ClientError> {
		let lines = self.list_raw(show_hidden).await?;
		Ok(lines.iter().map(|line| String::from_utf8_lossy(line).into_owned()).collect())
	}

	/// Lists the server's current directory with every name exactly as the server sent it.
	pub async fn list_raw(&self, show_hidden: bool) -> Result<Vec<Vec<u8>>, ClientError> {
		let command = if show_hidden { Command::ListAll } else { Command::List };
		let mut out = Vec::new();
		self.request(command, None, &mut out).await?;
		Ok(out.split_inclusive(|&b| b == b'\n').map(|line| line.strip_suffix(b"\n").unwrap_or(line).to_vec()).collect())
	}

	/// Downloads `file_name` from the server's current directory into `sink`.
	pub async fn get<W>(&self, file_name: impl AsRef<[u8]>, sink: &mut W) -> Result<u64, ClientError>
	where
		W: AsyncWrite + Unpin,
	{
		self.request(Command::Transfer, Some(file_name.as_ref()), sink).await
	}

	/// Changes the server's current directory for all later requests.
	pub async fn change_dir(&self, path: impl AsRef<[u8]>) -> Result<(), ClientError> {
		self.request(Command::ChangeDirectory, Some(path.as_ref()), &mut tokio::io::sink()).await?;
		Ok(())
	}

	/// Sends a raw control message and copies whatever arrives on the data channel into `sink`.
	pub async fn send_raw<W>(&self, token: &str, argument: Option<&[u8]>, sink: &mut W) -> Result<u64, ClientError>
	where
		W: AsyncWrite + Unpin,
	{
		let expects_data = Command::parse(token).uses_data_channel();
		let exchange = self.exchange(token, argument, expects_data, sink);
		match self.config.timeout {
			Some(limit) => tokio::time::timeout(limit, exchange).await.map_err(|_| ClientError::TimedOut(limit))?,
			None => exchange.await,
		}
	}

	async fn request<W>(&self, command: Command, argument: Option<&[u8]>, sink: &mut W) -> Result<u64, ClientError>
	where
		W: AsyncWrite + Unpin,
	{
		// parse never yields Unknown for the commands used here
		let token = command.token().unwrap_or_default();
		self.send_raw(token, argument, sink).await
	}

	async fn exchange<W>(&self, token: &str, argument: Option<&[u8]>, expects_data: bool, sink: &mut W) -> Result<u64, ClientError>
	where
		W: AsyncWrite + Unpin,
	{
		let mut control = TcpStream::connect(&self.config.server).await?;
		// The server dials back to the address it sees as our control peer.
		let local_ip = control.local_addr()?.ip();
		let data_listener = TcpListener::bind(SocketAddr::new(local_ip, self.config.data_port)).await?;
		let data_port = data_listener.local_addr()?.port();

		let frame = ControlMessage { command: token, argument, data_port }.encode()?;
		log::debug!("Sending {:?} to {}", String::from_utf8_lossy(&frame), self.config.server);
		control.write_all(&frame).await?;

		let mut reply = Vec::new();
		if !expects_data {
			control.read_to_end(&mut reply).await?;
			if !reply.is_empty() {
				return Err(server_error(&reply));
			}
			return Ok(0);
		}

		let accepted = tokio::select! {
			biased;
			accepted = data_listener.accept() => Some(accepted?.0),
			read = control.read_to_end(&mut reply) => {
				read?;
				None
			}
		};
		let mut data = match accepted {
			Some(data) => data,
			None if !reply.is_empty() => return Err(server_error(&reply)),
			None => match tokio::time::timeout(DATA_GRACE, data_listener.accept()).await {
				Ok(accepted) => accepted?.0,
				Err(_) => return Err(ClientError::NoDataChannel),
			},
		};
		log::debug!("Data channel from {}", data.peer_addr()?);

		let received = tokio::io::copy(&mut data, sink).await?;
		sink.flush().await?;

		// Success leaves the control channel empty.
		control.read_to_end(&mut reply).await?;
		if !reply.is_empty() {
			return Err(server_error(&reply));
		}
		Ok(received)
	}
}

fn server_error(reply: &[u8]) -> ClientError {
	ClientError::Server(String::from_utf8_lossy(reply).trim_end().to_string())
}
