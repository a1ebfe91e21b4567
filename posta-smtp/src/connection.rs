use std::io;

use posta_common::status::Status;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

/// Line oriented framing over a client stream.
pub struct Connection<Stream: AsyncRead + AsyncWrite + Unpin + Send> {
    stream: BufReader<Stream>,
    line: Vec<u8>,
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send> Connection<Stream> {
    pub fn new(stream: Stream) -> Self {
        Self {
            stream: BufReader::new(stream),
            line: Vec::with_capacity(1024),
        }
    }

    /// Read the next line, without its `\n` or `\r\n` terminator.
    ///
    /// Returns `Ok(None)` once the peer has stopped sending. A trailing
    /// fragment with no line terminator counts as the end of the stream.
    ///
    /// Not cancel safe: a partially read line is lost if the future is
    /// dropped.
    pub async fn receive_line(&mut self) -> io::Result<Option<String>> {
        self.line.clear();

        if self.stream.read_until(b'\n', &mut self.line).await? == 0 {
            return Ok(None);
        }

        let Some(line) = self.line.strip_suffix(b"\n") else {
            return Ok(None);
        };
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        Ok(Some(String::from_utf8_lossy(line).into_owned()))
    }

    /// Write a single `<code> <text>` reply and flush it.
    pub async fn send(&mut self, status: Status, text: &str) -> io::Result<()> {
        let stream = self.stream.get_mut();

        stream
            .write_all(format!("{status} {text}\r\n").as_bytes())
            .await?;
        stream.flush().await
    }
}
