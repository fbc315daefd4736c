use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::messages::FrameError;

/// Conditions that abort a single request. None of them stop the server.
#[derive(Debug, Error)]
pub enum RequestError {
	#[error("malformed control message: {0}")]
	MalformedMessage(#[from] FrameError),
	#[error("reading the control message: {0}")]
	ControlChannel(#[source] io::Error),
	#[error("data channel {addr} unreachable: {source}")]
	DataChannelUnreachable {
		addr: SocketAddr,
		#[source]
		source: io::Error,
	},
	#[error("peer interrupted the transfer: {0}")]
	TransportInterrupted(#[source] io::Error),
	#[error("reading local file: {0}")]
	LocalRead(#[source] io::Error),
	#[error("{0} timed out after {1:?}")]
	TimedOut(&'static str, Duration),
}
