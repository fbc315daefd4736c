//! Chunked file transmission over the data channel.

use std::io;
use std::path::Path;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use crate::data_channel::send_all;
use crate::error::RequestError;

/// Upper bound for one read from the file and therefore for one chunk on the wire.
pub const CHUNK_SIZE: usize = 1024;

/// A file opened for transmission, with its size at the moment of opening.
#[derive(Debug)]
pub struct SourceFile {
	pub file: File,
	pub size: u64,
}

impl SourceFile {
	/// Opens `name` relative to `dir`. Anything that is not a regular file counts as not found.
	pub async fn open(dir: &Path, name: &Path) -> io::Result<SourceFile> {
		let file = File::open(dir.join(name)).await?;
		let metadata = file.metadata().await?;
		if !metadata.is_file() {
			return Err(io::Error::new(io::ErrorKind::NotFound, format!("{} is not a regular file", name.display())));
		}
		Ok(SourceFile { file, size: metadata.len() })
	}
}

/// Sends `size` bytes of `source` in chunks of at most [`CHUNK_SIZE`]. Every chunk is written in
/// full before the next one is read. Returns the number of bytes sent.
///
/// If the source ends before `size` bytes (the file shrank), the transfer stops there.
pub async fn send_file<R, W>(source: &mut R, size: u64, data: &mut W, limit: Option<Duration>) -> Result<u64, RequestError>
where
	R: AsyncRead + Unpin,
	W: AsyncWrite + Unpin,
{
	let mut chunk = [0u8; CHUNK_SIZE];
	let mut remaining = size;
	while remaining > 0 {
		let want = remaining.min(CHUNK_SIZE as u64) as usize;
		let read = source.read(&mut chunk[..want]).await.map_err(RequestError::LocalRead)?;
		if read == 0 {
			log::warn!("File ended {} bytes short of its size at open", remaining);
			break;
		}
		send_all(data, &chunk[..read], limit).await?;
		remaining -= read as u64;
	}
	Ok(size - remaining)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn pattern(len: usize) -> Vec<u8> {
		(0..len).map(|i| (i * 31 % 251) as u8).collect()
	}

	#[tokio::test]
	async fn sends_exactly_the_file_contents() {
		for len in [0, 1, CHUNK_SIZE - 1, CHUNK_SIZE, CHUNK_SIZE + 1, 5 * CHUNK_SIZE + 17] {
			let content = pattern(len);
			let mut out = Vec::new();
			let sent = send_file(&mut content.as_slice(), len as u64, &mut out, None).await.unwrap();
			assert_eq!(sent, len as u64);
			assert_eq!(out, content, "length {}", len);
		}
	}

	#[tokio::test]
	async fn stops_when_the_source_is_shorter_than_announced() {
		let content = pattern(100);
		let mut out = Vec::new();
		let sent = send_file(&mut content.as_slice(), 4096, &mut out, None).await.unwrap();
		assert_eq!(sent, 100);
		assert_eq!(out, content);
	}

	#[tokio::test]
	async fn open_rejects_missing_files_and_directories() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::create_dir(dir.path().join("sub")).unwrap();
		std::fs::write(dir.path().join("data.bin"), pattern(3000)).unwrap();

		let missing = SourceFile::open(dir.path(), Path::new("nope.txt")).await.unwrap_err();
		assert_eq!(missing.kind(), io::ErrorKind::NotFound);
		let not_file = SourceFile::open(dir.path(), Path::new("sub")).await.unwrap_err();
		assert_eq!(not_file.kind(), io::ErrorKind::NotFound);

		let source = SourceFile::open(dir.path(), Path::new("data.bin")).await.unwrap();
		assert_eq!(source.size, 3000);
	}
}
