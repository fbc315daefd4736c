//! The server-initiated data connection and the send discipline shared by both channels.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::RequestError;

/// Runs `operation`, bounded by `limit` if one is configured.
pub(crate) async fn timed<T, F>(limit: Option<Duration>, what: &'static str, operation: F) -> Result<T, RequestError>
where
	F: Future<Output = Result<T, RequestError>>,
{
	match limit {
		Some(limit) => tokio::time::timeout(limit, operation)
			.await
			.map_err(|_| RequestError::TimedOut(what, limit))?,
		None => operation.await,
	}
}

/// Connects to the data port the peer advertised in its control message.
pub async fn connect(addr: SocketAddr, limit: Option<Duration>) -> Result<TcpStream, RequestError> {
	log::debug!("Opening data channel to {}", addr);
	timed(limit, "data channel connect", async {
		TcpStream::connect(addr)
			.await
			.map_err(|source| RequestError::DataChannelUnreachable { addr, source })
	})
	.await
}

/// Writes `buf` completely. A short write is progress: the remainder is sent again until nothing
/// is left. Returns the number of bytes written.
pub async fn send_all<W>(writer: &mut W, mut buf: &[u8], limit: Option<Duration>) -> Result<usize, RequestError>
where
	W: AsyncWrite + Unpin,
{
	let total = buf.len();
	while !buf.is_empty() {
		let sent = timed(limit, "send", async { writer.write(buf).await.map_err(RequestError::TransportInterrupted) }).await?;
		if sent == 0 {
			return Err(RequestError::TransportInterrupted(io::ErrorKind::WriteZero.into()));
		}
		log::trace!("Sent {} of {} bytes", sent, buf.len());
		buf = &buf[sent..];
	}
	Ok(total)
}

/// Flushes and half-closes a finished connection. The receiver treats the close as end of data.
pub async fn close(mut stream: TcpStream) {
	if let Err(err) = stream.shutdown().await {
		log::debug!("Closing connection: {}", err);
	}
}
