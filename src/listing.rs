//! Directory listings streamed over the data channel.

use std::io;
use std::path::Path;
use std::time::Duration;

use tokio::fs::{self, ReadDir};
use tokio::io::AsyncWrite;

use crate::data_channel::send_all;
use crate::error::RequestError;
use crate::messages::name_to_wire;

pub const HIDDEN_MARKER: u8 = b'.';
pub const DIRECTORY_MARKER: u8 = b'/';

/// Self and parent entries. Hidden like any dot entry, listed first when hidden entries are shown.
const SPECIAL_ENTRIES: [&[u8]; 2] = [b".", b".."];

/// Opens `dir` for enumeration. Done before the data channel exists so that an unreadable
/// directory can still be reported on the control channel.
pub async fn open(dir: &Path) -> io::Result<ReadDir> {
	fs::read_dir(dir).await
}

/// The line sent for one entry, or `None` if the entry is hidden and hidden entries are not shown.
/// Name bytes are sent as they are on disk.
pub fn entry_line(name: &[u8], is_dir: bool, show_hidden: bool) -> Option<Vec<u8>> {
	if !show_hidden && name.first() == Some(&HIDDEN_MARKER) {
		return None;
	}
	let mut line = Vec::with_capacity(name.len() + 2);
	line.extend_from_slice(name);
	if is_dir {
		line.push(DIRECTORY_MARKER);
	}
	line.push(b'\n');
	Some(line)
}

/// Sends every qualifying entry as its own write: `./` and `../` first, then the directory in
/// enumeration order. Returns the number of entries sent.
///
/// An entry that fails to enumerate ends the listing early; what was already sent stays sent.
pub async fn stream_entries<W>(
	mut entries: ReadDir,
	show_hidden: bool,
	data: &mut W,
	limit: Option<Duration>,
) -> Result<usize, RequestError>
where
	W: AsyncWrite + Unpin,
{
	let mut sent = 0;
	for name in SPECIAL_ENTRIES {
		if let Some(line) = entry_line(name, true, show_hidden) {
			send_all(data, &line, limit).await?;
			sent += 1;
		}
	}
	loop {
		let entry = match entries.next_entry().await {
			Ok(Some(entry)) => entry,
			Ok(None) => break,
			Err(err) => {
				log::warn!("Directory enumeration stopped early: {}", err);
				break;
			}
		};
		// file_type does not follow symlinks
		let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
		let name = entry.file_name();
		if let Some(line) = entry_line(&name_to_wire(&name), is_dir, show_hidden) {
			send_all(data, &line, limit).await?;
			sent += 1;
		}
	}
	Ok(sent)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn hidden_entries_need_the_flag() {
		assert_eq!(entry_line(b".hidden", false, false), None);
		assert_eq!(entry_line(b".hidden", false, true).as_deref(), Some(&b".hidden\n"[..]));
		assert_eq!(entry_line(b".git", true, true).as_deref(), Some(&b".git/\n"[..]));
	}

	#[test]
	fn directories_get_a_trailing_marker() {
		assert_eq!(entry_line(b"sub", true, false).as_deref(), Some(&b"sub/\n"[..]));
		assert_eq!(entry_line(b"visible.txt", false, false).as_deref(), Some(&b"visible.txt\n"[..]));
	}

	#[test]
	fn names_keep_their_bytes() {
		assert_eq!(entry_line(b"caf\xe9.txt", false, false).as_deref(), Some(&b"caf\xe9.txt\n"[..]));
	}

	#[tokio::test]
	async fn streams_one_line_per_entry() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join(".hidden"), b"h").unwrap();
		std::fs::write(dir.path().join("visible.txt"), b"v").unwrap();
		std::fs::create_dir(dir.path().join("sub")).unwrap();

		let mut out = Vec::new();
		let sent = stream_entries(open(dir.path()).await.unwrap(), false, &mut out, None).await.unwrap();

		let text = String::from_utf8(out).unwrap();
		let mut lines: Vec<&str> = text.lines().collect();
		lines.sort();
		assert_eq!(sent, 2);
		assert_eq!(lines, ["sub/", "visible.txt"]);
	}

	#[tokio::test]
	async fn show_hidden_starts_with_self_and_parent() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join(".hidden"), b"h").unwrap();

		let mut out = Vec::new();
		let sent = stream_entries(open(dir.path()).await.unwrap(), true, &mut out, None).await.unwrap();

		assert_eq!(sent, 3);
		assert_eq!(out, b"./\n../\n.hidden\n");
	}

	#[tokio::test]
	async fn missing_directory_fails_to_open() {
		let dir = tempfile::tempdir().unwrap();
		assert!(open(&dir.path().join("gone")).await.is_err());
	}
}
