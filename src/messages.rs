//! Control channel framing.
//!
//! A control message is a single buffer of at most [`MAX_MESSAGE_LEN`] bytes:
//! `<command>#<argument>#<data port>`, or `<command>#<data port>` when the
//! command takes no argument.

use std::borrow::Cow;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::str;

use thiserror::Error;

/// Separates the fields of a control message.
pub const DIVIDER: u8 = b'#';

/// Size of the receive buffer on the control channel. Longer messages are truncated by the reader.
pub const MAX_MESSAGE_LEN: usize = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
	#[error("control message is not valid UTF-8")]
	NotUtf8,
	#[error("control message has no data port")]
	MissingPort,
	#[error("invalid data port {0:?}")]
	InvalidPort(String),
	#[error("field {0:?} contains the divider byte")]
	DividerInField(String),
	#[error("control message of {0} bytes exceeds the {max} byte limit", max = MAX_MESSAGE_LEN)]
	TooLong(usize),
}

/// One decoded control message. Fields borrow from the received buffer.
///
/// Only the command token and the port have to be text. The argument is a file or directory
/// name and is kept as the raw bytes the peer sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlMessage<'a> {
	pub command: &'a str,
	/// File or directory name. Absent for listings.
	pub argument: Option<&'a [u8]>,
	/// Port the peer listens on for the data channel.
	pub data_port: u16,
}

impl<'a> ControlMessage<'a> {
	/// Decodes a received control buffer.
	///
	/// Everything from the first NUL byte on is ignored. The first divider ends the command, the
	/// second ends the argument and the third field is the data port. Segments after a third
	/// divider are dropped; `truncated` reports whether that happened.
	pub fn decode(buf: &'a [u8]) -> Result<Decoded<'a>, FrameError> {
		let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());

		let mut fields = buf[..end].split(|&b| b == DIVIDER);
		// split always yields at least one item
		let command = fields.next().unwrap_or_default();
		let (argument, port) = match (fields.next(), fields.next()) {
			(None, _) => return Err(FrameError::MissingPort),
			(Some(port), None) => (None, port),
			(Some(argument), Some(port)) => (Some(argument).filter(|a| !a.is_empty()), port),
		};
		let truncated = fields.next().is_some();

		let command = str::from_utf8(command).map_err(|_| FrameError::NotUtf8)?;
		let port = str::from_utf8(port).map_err(|_| FrameError::NotUtf8)?;
		let data_port = parse_port(port)?;
		Ok(Decoded {
			message: ControlMessage { command, argument, data_port },
			truncated,
		})
	}

	/// Encodes the message into a frame that fits the peer's receive buffer.
	pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
		for field in std::iter::once(self.command.as_bytes()).chain(self.argument) {
			if field.contains(&DIVIDER) {
				return Err(FrameError::DividerInField(String::from_utf8_lossy(field).into_owned()));
			}
		}
		let port = self.data_port.to_string();
		let mut frame = Vec::with_capacity(self.command.len() + self.argument.map_or(0, <[u8]>::len) + port.len() + 2);
		frame.extend_from_slice(self.command.as_bytes());
		frame.push(DIVIDER);
		if let Some(argument) = self.argument {
			frame.extend_from_slice(argument);
			frame.push(DIVIDER);
		}
		frame.extend_from_slice(port.as_bytes());
		if frame.len() > MAX_MESSAGE_LEN {
			return Err(FrameError::TooLong(frame.len()));
		}
		Ok(frame)
	}
}

/// Turns a name received on the wire into a path without altering its bytes.
#[cfg(unix)]
pub fn path_from_wire(name: &[u8]) -> PathBuf {
	use std::os::unix::ffi::OsStrExt;
	PathBuf::from(OsStr::from_bytes(name))
}

#[cfg(not(unix))]
pub fn path_from_wire(name: &[u8]) -> PathBuf {
	PathBuf::from(String::from_utf8_lossy(name).into_owned())
}

/// Bytes of a file name as they are sent on the wire.
#[cfg(unix)]
pub fn name_to_wire(name: &OsStr) -> Cow<'_, [u8]> {
	use std::os::unix::ffi::OsStrExt;
	Cow::Borrowed(name.as_bytes())
}

#[cfg(not(unix))]
pub fn name_to_wire(name: &OsStr) -> Cow<'_, [u8]> {
	match name.to_string_lossy() {
		Cow::Borrowed(text) => Cow::Borrowed(text.as_bytes()),
		Cow::Owned(text) => Cow::Owned(text.into_bytes()),
	}
}

/// Result of [`ControlMessage::decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded<'a> {
	pub message: ControlMessage<'a>,
	/// Extra divider-separated segments were present and discarded.
	pub truncated: bool,
}

fn parse_port(text: &str) -> Result<u16, FrameError> {
	match text.trim().parse::<u16>() {
		Ok(0) | Err(_) => Err(FrameError::InvalidPort(text.to_string())),
		Ok(port) => Ok(port),
	}
}

/// Error replies sent on the control channel. The wire texts are fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorReply {
	/// Server -> Client; control channel.
	/// The requested file does not exist or is not a regular file.
	FileNotFound,
	/// Server -> Client; control channel.
	/// The target of a directory change does not exist or is not a directory.
	DirectoryChangeFailed,
	/// Server -> Client; control channel.
	/// The current directory could not be enumerated.
	DirectoryUnreadable,
	/// Server -> Client; control channel.
	InvalidCommand,
}

impl ErrorReply {
	pub const fn as_str(self) -> &'static str {
		match self {
			ErrorReply::FileNotFound => "File not found\n",
			ErrorReply::DirectoryChangeFailed => "Error changing directory",
			ErrorReply::DirectoryUnreadable => "Error opening directory",
			ErrorReply::InvalidCommand => "Invalid command",
		}
	}

	pub fn as_bytes(self) -> &'static [u8] {
		self.as_str().as_bytes()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn decode(text: &str) -> Result<Decoded<'_>, FrameError> {
		ControlMessage::decode(text.as_bytes())
	}

	#[test]
	fn decodes_transfer_request() {
		let decoded = decode("-g#notes.txt#30021").unwrap();
		assert_eq!(
			decoded.message,
			ControlMessage { command: "-g", argument: Some(b"notes.txt"), data_port: 30021 }
		);
		assert!(!decoded.truncated);
	}

	#[test]
	fn listing_needs_no_placeholder_argument() {
		let decoded = decode("-l#30021").unwrap();
		assert_eq!(decoded.message, ControlMessage { command: "-l", argument: None, data_port: 30021 });
	}

	#[test]
	fn empty_argument_is_absent() {
		let decoded = decode("-la##4000").unwrap();
		assert_eq!(decoded.message.argument, None);
		assert_eq!(decoded.message.data_port, 4000);
	}

	#[test]
	fn ignores_nul_padding_and_trailing_newline() {
		let mut buf = [0u8; MAX_MESSAGE_LEN];
		let text = b"-c#some dir#5001\n";
		buf[..text.len()].copy_from_slice(text);
		let before = buf;

		let decoded = ControlMessage::decode(&buf).unwrap();
		assert_eq!(decoded.message.argument, Some(&b"some dir"[..]));
		assert_eq!(decoded.message.data_port, 5001);
		assert_eq!(buf, before);
	}

	#[test]
	fn drops_segments_after_the_port() {
		let decoded = decode("-g#a.txt#5000#junk#more").unwrap();
		assert_eq!(decoded.message.argument, Some(&b"a.txt"[..]));
		assert_eq!(decoded.message.data_port, 5000);
		assert!(decoded.truncated);
	}

	#[test]
	fn rejects_message_without_port() {
		assert_eq!(decode("-l"), Err(FrameError::MissingPort));
		assert_eq!(decode(""), Err(FrameError::MissingPort));
	}

	#[test]
	fn rejects_bad_ports() {
		assert!(matches!(decode("-l#abc"), Err(FrameError::InvalidPort(_))));
		assert!(matches!(decode("-l#0"), Err(FrameError::InvalidPort(_))));
		assert!(matches!(decode("-g#f#70000"), Err(FrameError::InvalidPort(_))));
	}

	#[test]
	fn argument_bytes_are_taken_verbatim() {
		let decoded = ControlMessage::decode(b"-g#caf\xe9.txt#5000").unwrap();
		assert_eq!(decoded.message.argument, Some(&b"caf\xe9.txt"[..]));
	}

	#[test]
	fn command_and_port_must_be_text() {
		assert_eq!(ControlMessage::decode(b"-\xff#a#1"), Err(FrameError::NotUtf8));
		assert_eq!(ControlMessage::decode(b"-g#a#1\xff"), Err(FrameError::NotUtf8));
	}

	#[test]
	fn encodes_both_shapes() {
		let get = ControlMessage { command: "-g", argument: Some(b"a.bin"), data_port: 7000 };
		assert_eq!(get.encode().unwrap(), b"-g#a.bin#7000");
		let list = ControlMessage { command: "-l", argument: None, data_port: 7000 };
		assert_eq!(list.encode().unwrap(), b"-l#7000");
	}

	#[test]
	fn encode_rejects_divider_and_oversize() {
		let bad = ControlMessage { command: "-g", argument: Some(b"a#b"), data_port: 1 };
		assert!(matches!(bad.encode(), Err(FrameError::DividerInField(_))));

		let long = "x".repeat(MAX_MESSAGE_LEN);
		let big = ControlMessage { command: "-g", argument: Some(long.as_bytes()), data_port: 1 };
		assert!(matches!(big.encode(), Err(FrameError::TooLong(_))));
	}

	#[test]
	fn error_reply_texts() {
		assert_eq!(ErrorReply::FileNotFound.as_str(), "File not found\n");
		assert_eq!(ErrorReply::InvalidCommand.as_str(), "Invalid command");
	}
}
