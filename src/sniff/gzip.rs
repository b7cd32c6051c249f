//! Gzip framing for a whole connection.
//!
//! Inbound bytes are inflated as they arrive; outbound bytes are deflated and
//! sync-flushed on every flush so the peer can decode each response without
//! waiting for the end of the stream.
//!
//! Inflation is demand-driven: compressed input is only fed to the decoder
//! once the reader has drained the previous output, so a highly compressible
//! payload never expands beyond one decoder window ahead of the reader.

use std::io::{self, Write};
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::{Buf, BytesMut};
use flate2::write::{GzDecoder, GzEncoder};
use flate2::Compression;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

const SCRATCH_LEN: usize = 8 * 1024;

/// Bidirectional gzip adapter over a byte stream.
pub struct GzipStream<S> {
    inner: S,
    decoder: GzDecoder<Vec<u8>>,
    /// Inflated bytes not yet handed to the reader.
    plain: BytesMut,
    /// Compressed bytes read from `inner` but not yet inflated.
    compressed: BytesMut,
    scratch: Box<[u8]>,
    read_done: bool,
    /// `None` once the trailer has been produced.
    encoder: Option<GzEncoder<Vec<u8>>>,
    /// Deflated bytes not yet written to `inner`.
    encoded: BytesMut,
}

impl<S> GzipStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            decoder: GzDecoder::new(Vec::new()),
            plain: BytesMut::new(),
            compressed: BytesMut::new(),
            scratch: vec![0u8; SCRATCH_LEN].into_boxed_slice(),
            read_done: false,
            encoder: Some(GzEncoder::new(Vec::new(), Compression::fast())),
            encoded: BytesMut::new(),
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S: AsyncWrite + Unpin> GzipStream<S> {
    fn poll_drain(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while !self.encoded.is_empty() {
            let n = ready!(Pin::new(&mut self.inner).poll_write(cx, &self.encoded))?;
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            self.encoded.advance(n);
        }
        Poll::Ready(Ok(()))
    }
}

impl<S> GzipStream<S> {
    /// Feed pending compressed bytes to the decoder once and collect its output.
    ///
    /// A single decoder write is bounded by its internal buffer, which keeps
    /// `plain` small no matter how much the input expands.
    fn inflate_step(&mut self) -> io::Result<()> {
        let n = self.decoder.write(&self.compressed)?;
        if n == 0 {
            tracing::debug!(ignored = self.compressed.len(), "Ignoring bytes after the gzip member");
            self.compressed.clear();
        } else {
            self.compressed.advance(n);
        }
        self.decoder.flush()?;
        self.collect_plain();
        Ok(())
    }

    fn collect_plain(&mut self) {
        let out = self.decoder.get_mut();
        self.plain.extend_from_slice(out);
        out.clear();
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for GzipStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        loop {
            if !this.plain.is_empty() {
                let n = this.plain.len().min(buf.remaining());
                buf.put_slice(&this.plain[..n]);
                this.plain.advance(n);
                return Poll::Ready(Ok(()));
            }
            if !this.compressed.is_empty() {
                this.inflate_step()?;
                continue;
            }
            if this.read_done {
                return Poll::Ready(Ok(()));
            }

            let mut raw = ReadBuf::new(&mut this.scratch[..]);
            ready!(Pin::new(&mut this.inner).poll_read(cx, &mut raw))?;
            let n = raw.filled().len();
            if n == 0 {
                this.read_done = true;
                if let Err(error) = this.decoder.try_finish() {
                    tracing::debug!(error = %error, "Gzip stream ended without trailer");
                }
                this.collect_plain();
                continue;
            }
            this.compressed.extend_from_slice(&this.scratch[..n]);
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for GzipStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        let Some(encoder) = this.encoder.as_mut() else {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "gzip stream already finished",
            )));
        };
        encoder.write_all(buf)?;
        encoder.flush()?;
        let out = encoder.get_mut();
        this.encoded.extend_from_slice(out);
        out.clear();
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Some(encoder) = this.encoder.take() {
            let trailer = encoder.finish()?;
            this.encoded.extend_from_slice(&trailer);
        }
        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    fn sync_flushed(text: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text).unwrap();
        encoder.flush().unwrap();
        encoder.get_mut().split_off(0)
    }

    #[tokio::test]
    async fn inflates_before_end_of_stream() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut stream = GzipStream::new(server);

        client.write_all(&sync_flushed(b"GET / HTTP/1.1\r\n")).await.unwrap();
        let mut line = [0u8; 16];
        stream.read_exact(&mut line).await.unwrap();
        assert_eq!(&line, b"GET / HTTP/1.1\r\n");
    }

    #[tokio::test]
    async fn deflates_and_finishes_on_shutdown() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut stream = GzipStream::new(server);

        stream.write_all(b"HTTP/1.1 200 OK\r\n").await.unwrap();
        stream.flush().await.unwrap();
        stream.shutdown().await.unwrap();

        let mut raw = Vec::new();
        client.read_to_end(&mut raw).await.unwrap();
        let mut text = String::new();
        flate2::read::GzDecoder::new(&raw[..])
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "HTTP/1.1 200 OK\r\n");
    }

    #[tokio::test]
    async fn write_after_shutdown_fails() {
        let (_client, server) = tokio::io::duplex(1024);
        let mut stream = GzipStream::new(server);
        stream.shutdown().await.unwrap();
        assert!(stream.write_all(b"late").await.is_err());
    }

    #[tokio::test]
    async fn expansion_is_bounded_by_reader_demand() {
        const PLAIN_LEN: usize = 16 * 1024 * 1024;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(&vec![0u8; PLAIN_LEN]).unwrap();
        let bomb = encoder.finish().unwrap();

        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let writer = tokio::spawn(async move {
            client.write_all(&bomb).await.unwrap();
            client.shutdown().await.unwrap();
        });
        let mut stream = GzipStream::new(server);

        let mut first = [0u8; 1];
        stream.read_exact(&mut first).await.unwrap();
        assert!(stream.plain.len() < 256 * 1024, "{} bytes buffered", stream.plain.len());

        let mut total = 1;
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            assert!(buf[..n].iter().all(|&b| b == 0));
            assert!(stream.plain.len() < 256 * 1024);
            total += n;
        }
        assert_eq!(total, PLAIN_LEN);
        writer.await.unwrap();
    }
}
