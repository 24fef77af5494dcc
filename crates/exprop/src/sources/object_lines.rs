//! 🪣 ObjectLines -- an exported object, one line at a time.
//!
//! 🧠 Knowledge graph:
//! - The object arrives as a stream of byte chunks. Chunk boundaries land wherever the network
//!   felt like, so a line may start in one chunk and end three chunks later. We keep one buffer,
//!   scan it with `memchr`, and only pull another chunk when no newline is left.
//! - `\r\n` and `\n` both end a line. A last line without a newline is still a line.
//! - Empty lines are skipped. An empty record is not a JSON value and cannot be propagated.
//! - Bytes that are not UTF-8 are a read fault (`InvalidData`), not a silently mangled line.
//! - `.gz` objects are inflated in full on a blocking thread before the first line is served.
//!   Warehouse exports split into files of a few hundred MiB at most, so that fits.

use std::io::{self, Read};

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use flate2::read::MultiGzDecoder;
use futures::StreamExt;
use futures::stream::BoxStream;
use memchr::memchr;
use object_store::ObjectStore;
use tracing::{debug, trace};

use crate::engine::LineSource;
use crate::storage::ExportedObject;

/// 🪣 Streams lines out of one object.
pub struct ObjectLines {
    source_location: String,
    stream: BoxStream<'static, object_store::Result<Bytes>>,
    buffer: Vec<u8>,
    // -- everything before `cursor` has already been handed out
    cursor: usize,
    // -- and the `scanned` bytes after it are known to hold no newline
    scanned: usize,
    exhausted: bool,
    bytes_read: u64,
    inflated: bool,
}

impl std::fmt::Debug for ObjectLines {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectLines")
            .field("source_location", &self.source_location)
            .field("buffered", &(self.buffer.len() - self.cursor))
            .field("exhausted", &self.exhausted)
            .field("bytes_read", &self.bytes_read)
            .finish()
    }
}

impl ObjectLines {
    /// 🚀 Open `object` for reading. Gzipped objects are inflated here, up front.
    pub async fn open(store: &dyn ObjectStore, object: &ExportedObject) -> Result<Self> {
        let result = store.get(&object.path).await.with_context(|| {
            format!("💀 Could not open '{}' for reading", object.source_location)
        })?;

        if !is_gzip(object) {
            return Ok(Self::from_stream(
                object.source_location.clone(),
                result.into_stream(),
            ));
        }

        let compressed = result.bytes().await.with_context(|| {
            format!("💀 Could not download '{}'", object.source_location)
        })?;
        let inflated = tokio::task::spawn_blocking(move || -> io::Result<Vec<u8>> {
            let mut inflated = Vec::with_capacity(compressed.len() * 4);
            MultiGzDecoder::new(&compressed[..]).read_to_end(&mut inflated)?;
            Ok(inflated)
        })
        .await
        .context("💀 The gzip worker thread did not come back")?
        .with_context(|| format!("💀 '{}' is not valid gzip", object.source_location))?;
        debug!(
            "🫁 inflated '{}' from {} to {} bytes",
            object.source_location,
            object.size_bytes,
            inflated.len()
        );

        let single_chunk = futures::stream::once(async move { Ok(Bytes::from(inflated)) });
        let mut lines = Self::from_stream(object.source_location.clone(), single_chunk.boxed());
        lines.inflated = true;
        Ok(lines)
    }

    /// 🔧 Split an arbitrary byte-chunk stream into lines.
    pub fn from_stream(
        source_location: impl Into<String>,
        stream: BoxStream<'static, object_store::Result<Bytes>>,
    ) -> Self {
        Self {
            source_location: source_location.into(),
            stream,
            buffer: Vec::new(),
            cursor: 0,
            scanned: 0,
            exhausted: false,
            bytes_read: 0,
            inflated: false,
        }
    }

    /// 📏 Bytes pulled off the stream so far. For gzipped objects these are inflated bytes.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// 🫁 True when the bytes served are inflated gzip, so the listed size says nothing about them.
    pub fn is_inflated(&self) -> bool {
        self.inflated
    }

    /// ✂️ The line in `buffer[start..end]`, minus a trailing `\r`. `None` for empty lines.
    fn line_at(&self, start: usize, end: usize) -> io::Result<Option<String>> {
        let mut raw = &self.buffer[start..end];
        if let Some(stripped) = raw.strip_suffix(b"\r") {
            raw = stripped;
        }
        if raw.is_empty() {
            return Ok(None);
        }
        match std::str::from_utf8(raw) {
            Ok(line) => Ok(Some(line.to_owned())),
            Err(err) => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("line in '{}' is not UTF-8: {err}", self.source_location),
            )),
        }
    }
}

#[async_trait]
impl LineSource for ObjectLines {
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        loop {
            let from = self.cursor + self.scanned;
            if let Some(offset) = memchr(b'\n', &self.buffer[from..]) {
                let (start, end) = (self.cursor, from + offset);
                self.cursor = end + 1;
                self.scanned = 0;
                match self.line_at(start, end)? {
                    Some(line) => return Ok(Some(line)),
                    None => continue,
                }
            }

            if self.exhausted {
                if self.cursor == self.buffer.len() {
                    return Ok(None);
                }
                let (start, end) = (self.cursor, self.buffer.len());
                self.cursor = end;
                return self.line_at(start, end);
            }

            self.scanned = self.buffer.len() - self.cursor;
            self.buffer.drain(..self.cursor);
            self.cursor = 0;
            match self.stream.next().await {
                Some(Ok(chunk)) => {
                    self.bytes_read += chunk.len() as u64;
                    trace!(
                        "🪣 pulled {} bytes from '{}' ({} so far)",
                        chunk.len(),
                        self.source_location,
                        self.bytes_read
                    );
                    self.buffer.extend_from_slice(&chunk);
                }
                Some(Err(err)) => return Err(io::Error::other(err)),
                None => self.exhausted = true,
            }
        }
    }
}

fn is_gzip(object: &ExportedObject) -> bool {
    object
        .path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use flate2::Compression;
    use flate2::write::GzEncoder;
    use object_store::memory::InMemory;
    use object_store::path::Path;

    use super::*;

    fn chunked(pieces: &[&'static [u8]]) -> ObjectLines {
        let chunks: Vec<object_store::Result<Bytes>> =
            pieces.iter().map(|p| Ok(Bytes::from_static(p))).collect();
        ObjectLines::from_stream("memory:///x", futures::stream::iter(chunks).boxed())
    }

    async fn drain_all(lines: &mut ObjectLines) -> io::Result<Vec<String>> {
        let mut all = Vec::new();
        while let Some(line) = lines.next_line().await? {
            all.push(line);
        }
        Ok(all)
    }

    #[tokio::test]
    async fn the_one_where_lines_straddle_chunk_boundaries() -> anyhow::Result<()> {
        let mut the_lines = chunked(&[b"{\"a\":", b"1}\n{\"b\"", b":2}\n", b"{\"c\":3}"]);
        assert_eq!(
            drain_all(&mut the_lines).await?,
            vec![r#"{"a":1}"#, r#"{"b":2}"#, r#"{"c":3}"#]
        );
        assert_eq!(the_lines.bytes_read(), 23);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_long_line_trickles_in_a_byte_at_a_time() -> anyhow::Result<()> {
        let the_long_line = "x".repeat(4_096);
        let mut pieces: Vec<object_store::Result<Bytes>> = the_long_line
            .bytes()
            .map(|b| Ok(Bytes::from(vec![b])))
            .collect();
        pieces.push(Ok(Bytes::from_static(b"\nshort\n")));
        let mut the_lines =
            ObjectLines::from_stream("memory:///x", futures::stream::iter(pieces).boxed());

        assert_eq!(the_lines.next_line().await?.as_deref(), Some(the_long_line.as_str()));
        assert_eq!(the_lines.scanned, 0, "a found newline starts the next scan fresh");
        assert_eq!(the_lines.next_line().await?.as_deref(), Some("short"));
        assert_eq!(the_lines.next_line().await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_partial_line_is_never_scanned_twice() {
        let chunks: Vec<object_store::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"abc")),
            Ok(Bytes::from_static(b"def")),
            Err(object_store::Error::Generic {
                store: "test",
                source: "connection reset".into(),
            }),
        ];
        let mut the_lines =
            ObjectLines::from_stream("memory:///x", futures::stream::iter(chunks).boxed());

        assert!(the_lines.next_line().await.is_err());
        assert_eq!(the_lines.buffer, b"abcdef");
        assert_eq!(the_lines.scanned, 6, "both pieces were looked at, once");
    }

    #[tokio::test]
    async fn the_one_with_windows_line_endings_and_blank_lines() -> anyhow::Result<()> {
        let mut the_lines = chunked(&[b"one\r\n\r\n", b"\n", b"two\r", b"\n\n"]);
        assert_eq!(drain_all(&mut the_lines).await?, vec!["one", "two"]);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_an_empty_object_has_no_lines() -> anyhow::Result<()> {
        let mut the_lines = chunked(&[]);
        assert_eq!(the_lines.next_line().await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_broken_utf8_is_a_read_fault() {
        let mut the_lines = chunked(&[b"fine\n", b"\xff\xfe\n"]);
        assert_eq!(the_lines.next_line().await.ok().flatten().as_deref(), Some("fine"));
        let the_fault = the_lines.next_line().await;
        assert!(matches!(the_fault, Err(ref e) if e.kind() == io::ErrorKind::InvalidData));
    }

    #[tokio::test]
    async fn the_one_where_the_stream_dies_mid_object() {
        let chunks: Vec<object_store::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"first\nsecond-but-cut")),
            Err(object_store::Error::Generic {
                store: "test",
                source: "connection reset".into(),
            }),
        ];
        let mut the_lines =
            ObjectLines::from_stream("memory:///x", futures::stream::iter(chunks).boxed());
        assert_eq!(the_lines.next_line().await.ok().flatten().as_deref(), Some("first"));
        assert!(the_lines.next_line().await.is_err());
    }

    #[tokio::test]
    async fn the_one_where_plain_and_gzipped_objects_read_the_same() -> anyhow::Result<()> {
        let body = "{\"n\":1}\n{\"n\":2}\n";
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(body.as_bytes())?;
        let gzipped = encoder.finish()?;

        let store = Arc::new(InMemory::new());
        let plain = Path::from("exports/000-file.json");
        let squished = Path::from("exports/001-file.json.gz");
        store.put(&plain, body.as_bytes().to_vec().into()).await?;
        store.put(&squished, gzipped.clone().into()).await?;

        for (path, size) in [(plain, body.len()), (squished, gzipped.len())] {
            let object = ExportedObject {
                source_location: format!("memory:///{path}"),
                path,
                size_bytes: size as u64,
            };
            let mut the_lines = ObjectLines::open(&*store, &object).await?;
            assert_eq!(the_lines.is_inflated(), object.path.as_ref().ends_with(".gz"));
            assert_eq!(drain_all(&mut the_lines).await?, vec![r#"{"n":1}"#, r#"{"n":2}"#]);
            assert_eq!(the_lines.bytes_read(), body.len() as u64);
        }
        Ok(())
    }
}
