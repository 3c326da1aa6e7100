//! Newline-delimited message framing for stdio.
//!
//! Each message is a single line of compact JSON terminated by `\n`:
//!
//! ```text
//! {"jsonrpc":"2.0","id":1,"method":"ping"}\n
//! ```

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::MAX_MESSAGE_SIZE;
use crate::error::{ProtocolError, ProtocolResult};

/// Longest line buffered: the message plus a `\r\n` terminator.
const LINE_LIMIT: usize = MAX_MESSAGE_SIZE + 2;

/// Encodes a message as one JSON line, including the trailing newline.
pub fn encode_message<T: Serialize>(message: &T) -> ProtocolResult<Vec<u8>> {
    let mut json = serde_json::to_vec(message)?;

    if json.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: json.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }

    json.push(b'\n');
    Ok(json)
}

/// Decodes one line, ignoring surrounding whitespace and the line terminator.
pub fn decode_message<T: DeserializeOwned>(line: &[u8]) -> ProtocolResult<T> {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    if trimmed.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: trimmed.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(serde_json::from_slice(trimmed)?)
}

/// Reads raw lines from an async byte stream.
///
/// Lines are returned undecoded so the caller can answer malformed input
/// with a JSON-RPC parse error instead of dropping the connection.
pub struct LineReader<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    /// Reads the next non-blank line.
    ///
    /// Returns `Ok(None)` at end of stream. A line over the size cap is
    /// skipped without being buffered and reported as `MessageTooLarge`;
    /// the reader stays usable for the following line.
    pub async fn next_line(&mut self) -> ProtocolResult<Option<Vec<u8>>> {
        loop {
            self.buf.clear();
            let n = (&mut self.reader)
                .take(LINE_LIMIT as u64)
                .read_until(b'\n', &mut self.buf)
                .await?;
            if n == 0 {
                return Ok(None);
            }
            if n == LINE_LIMIT && self.buf.last() != Some(&b'\n') {
                let rest = self.discard_line().await?;
                self.buf.clear();
                return Err(ProtocolError::MessageTooLarge {
                    size: n + rest,
                    max: MAX_MESSAGE_SIZE,
                });
            }
            if self.buf.trim_ascii().is_empty() {
                continue;
            }
            return Ok(Some(std::mem::take(&mut self.buf)));
        }
    }

    /// Consumes input up to and including the next newline.
    async fn discard_line(&mut self) -> std::io::Result<usize> {
        let mut dropped = 0;
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(dropped);
            }
            match available.iter().position(|b| *b == b'\n') {
                Some(i) => {
                    self.reader.consume(i + 1);
                    return Ok(dropped + i + 1);
                }
                None => {
                    let len = available.len();
                    self.reader.consume(len);
                    dropped += len;
                }
            }
        }
    }

    /// Unwraps this reader, returning the underlying stream.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Writes framed messages to an async byte stream.
pub struct LineWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> LineWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes and flushes a single message.
    pub async fn write_message<T: Serialize>(&mut self, message: &T) -> ProtocolResult<()> {
        let data = encode_message(message)?;
        self.writer.write_all(&data).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Unwraps this writer, returning the underlying stream.
    pub fn into_inner(self) -> W {
        self.writer
    }
}
