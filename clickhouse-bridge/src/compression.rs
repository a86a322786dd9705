//! Framing of compressed data blocks in the native protocol.
//!
//! Each frame is laid out as:
//! - 16 bytes: `CityHash128` (v1.0.2) checksum of everything that follows, high and low halves
//! - 1 byte: compression method
//! - 4 bytes: compressed size, including the 9 byte header
//! - 4 bytes: decompressed size
//! - N bytes: compressed payload
use std::future::Future;
use std::io::ErrorKind;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures_util::FutureExt;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

use crate::constants::MAX_COMPRESS_CHUNK;
use crate::io::ClickHouseRead;
use crate::native::protocol::CompressionMethod;
use crate::{Error, Result};

/// Number of bytes in the per-frame header: algorithm tag + compressed and decompressed sizes.
const COMPRESSED_FRAME_HEADER_BYTES: usize = 1 + 4 + 4;
const CHECKSUM_BYTES: usize = 16;

const MAX_COMPRESSED_FRAME: u32 = 100_000_000;
const MAX_DECOMPRESSED_FRAME: u32 = 1_000_000_000;

fn split_checksum(checksum: u128) -> (u64, u64) {
    #[expect(clippy::cast_possible_truncation)]
    let parts = ((checksum >> 64) as u64, checksum as u64);
    parts
}

/// Compress `raw` into one or more frames of at most [`MAX_COMPRESS_CHUNK`] uncompressed bytes.
pub(crate) fn compress_block(method: CompressionMethod, raw: &[u8]) -> Result<Bytes> {
    let mut out = BytesMut::with_capacity(raw.len() / 2 + CHECKSUM_BYTES);
    for chunk in raw.chunks(MAX_COMPRESS_CHUNK) {
        let compressed = match method {
            CompressionMethod::LZ4 => lz4_flex::compress(chunk),
            CompressionMethod::ZSTD => zstd::bulk::compress(chunk, 1)
                .map_err(|e| Error::encode(format!("ZSTD compress error: {e}")))?,
            CompressionMethod::None => {
                return Err(Error::encode("attempted to compress with compression disabled"));
            }
        };

        let compressed_size = u32::try_from(compressed.len() + COMPRESSED_FRAME_HEADER_BYTES)
            .map_err(|_| Error::encode("compressed frame larger than u32::MAX"))?;
        let decompressed_size = u32::try_from(chunk.len())
            .map_err(|_| Error::encode("decompressed frame larger than u32::MAX"))?;

        let mut frame = BytesMut::with_capacity(COMPRESSED_FRAME_HEADER_BYTES + compressed.len());
        frame.put_u8(method.byte());
        frame.put_u32_le(compressed_size);
        frame.put_u32_le(decompressed_size);
        frame.put_slice(&compressed);

        let (hi, lo) = split_checksum(cityhash_rs::cityhash_102_128(&frame));
        out.put_u64_le(hi);
        out.put_u64_le(lo);
        out.put_slice(&frame);
    }
    Ok(out.freeze())
}

/// Read one frame and return its decompressed payload, validating checksum and method.
async fn read_frame<R: ClickHouseRead>(inner: &mut R, mode: CompressionMethod) -> Result<Vec<u8>> {
    let mut checksum_bytes = [0u8; CHECKSUM_BYTES];
    let _ = inner.read_exact(&mut checksum_bytes).await?;
    let mut checksum = &checksum_bytes[..];
    let expected = (u128::from(checksum.get_u64_le()) << 64) | u128::from(checksum.get_u64_le());

    let mut header = [0u8; COMPRESSED_FRAME_HEADER_BYTES];
    let _ = inner.read_exact(&mut header).await?;

    let mut fields = &header[..];
    let type_byte = fields.get_u8();
    if type_byte != mode.byte() {
        return Err(Error::protocol(format!(
            "unexpected compression method for {mode}: {type_byte:02x}"
        )));
    }

    let compressed_size = fields.get_u32_le();
    let decompressed_size = fields.get_u32_le();
    if (compressed_size as usize) < COMPRESSED_FRAME_HEADER_BYTES {
        return Err(Error::protocol(format!("compressed frame too small: {compressed_size}")));
    }
    if compressed_size > MAX_COMPRESSED_FRAME || decompressed_size > MAX_DECOMPRESSED_FRAME {
        return Err(Error::protocol("compressed frame too large"));
    }

    let mut frame = Vec::with_capacity(compressed_size as usize);
    frame.extend_from_slice(&header);
    frame.resize(compressed_size as usize, 0);
    let _ = inner.read_exact(&mut frame[COMPRESSED_FRAME_HEADER_BYTES..]).await?;

    let actual = cityhash_rs::cityhash_102_128(&frame);
    if actual != expected {
        return Err(Error::Checksum { expected, actual });
    }

    let payload = &frame[COMPRESSED_FRAME_HEADER_BYTES..];
    let decompressed = match mode {
        CompressionMethod::LZ4 => lz4_flex::decompress(payload, decompressed_size as usize)
            .map_err(|e| Error::Decompress(format!("LZ4: {e}")))?,
        CompressionMethod::ZSTD => zstd::bulk::decompress(payload, decompressed_size as usize)
            .map_err(|e| Error::Decompress(format!("ZSTD: {e}")))?,
        CompressionMethod::None => {
            return Err(Error::Decompress("attempted to decompress uncompressed data".into()));
        }
    };
    if decompressed.len() != decompressed_size as usize {
        return Err(Error::Decompress(format!(
            "expected {decompressed_size} bytes, got {}",
            decompressed.len()
        )));
    }
    Ok(decompressed)
}

type FrameReadingFuture<'a, R> =
    Pin<Box<dyn Future<Output = (Result<Vec<u8>>, &'a mut R)> + Send + Sync + 'a>>;

/// An [`AsyncRead`] over the decompressed contents of consecutive frames.
///
/// Frames are pulled from the wrapped reader only when the buffered data runs out, so the reader
/// never consumes bytes past the frames of the block being decoded.
pub(crate) struct DecompressingReader<'a, R: ClickHouseRead> {
    mode:         CompressionMethod,
    inner:        Option<&'a mut R>,
    decompressed: Vec<u8>,
    position:     usize,
    reading:      Option<FrameReadingFuture<'a, R>>,
}

impl<'a, R: ClickHouseRead> DecompressingReader<'a, R> {
    pub(crate) fn new(mode: CompressionMethod, inner: &'a mut R) -> Self {
        Self { mode, inner: Some(inner), decompressed: Vec::new(), position: 0, reading: None }
    }
}

impl<R: ClickHouseRead> AsyncRead for DecompressingReader<'_, R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        loop {
            if buf.remaining() == 0 {
                return Poll::Ready(Ok(()));
            }

            if let Some(reading) = self.reading.as_mut() {
                let (result, inner) = match reading.poll_unpin(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(done) => done,
                };
                drop(self.reading.take());
                self.inner = Some(inner);
                match result {
                    Ok(data) => {
                        self.decompressed = data;
                        self.position = 0;
                        continue;
                    }
                    Err(error) => {
                        return Poll::Ready(Err(std::io::Error::new(ErrorKind::InvalidData, error)));
                    }
                }
            }

            let available = self.decompressed.len() - self.position;
            if available > 0 {
                let to_serve = available.min(buf.remaining());
                buf.put_slice(&self.decompressed[self.position..self.position + to_serve]);
                self.position += to_serve;
                return Poll::Ready(Ok(()));
            }

            let Some(inner) = self.inner.take() else {
                return Poll::Ready(Err(std::io::Error::new(
                    ErrorKind::BrokenPipe,
                    "decompressing reader lost its source",
                )));
            };
            let mode = self.mode;
            self.reading = Some(Box::pin(async move {
                let result = read_frame(inner, mode).await;
                (result, inner)
            }));
        }
    }
}

/// Recover a crate error that crossed an [`AsyncRead`] boundary as an I/O error.
pub(crate) fn surface(error: Error) -> Error {
    let Error::Io(io) = error else { return error };
    if !io.get_ref().is_some_and(|inner| inner.is::<Error>()) {
        return Error::Io(io);
    }
    match io.into_inner().map(|inner| inner.downcast::<Error>()) {
        Some(Ok(inner)) => *inner,
        Some(Err(other)) => Error::Io(std::io::Error::new(ErrorKind::InvalidData, other)),
        None => Error::Io(std::io::Error::from(ErrorKind::InvalidData)),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    async fn read_decompressed<R: ClickHouseRead>(
        mode: CompressionMethod,
        inner: &mut R,
        len: usize,
    ) -> Result<Vec<u8>> {
        let mut reader = DecompressingReader::new(mode, inner);
        let mut out = vec![0u8; len];
        let _ = reader.read_exact(&mut out).await.map_err(|e| surface(e.into()))?;
        Ok(out)
    }

    #[tokio::test]
    async fn test_roundtrip_lz4_and_zstd() {
        let payload = b"This is a longer piece of test data that should compress well".repeat(4);
        for method in [CompressionMethod::LZ4, CompressionMethod::ZSTD] {
            let compressed = compress_block(method, &payload).unwrap();
            assert_eq!(compressed[CHECKSUM_BYTES], method.byte());

            let mut reader = Cursor::new(compressed.to_vec());
            let round_trip = read_decompressed(method, &mut reader, payload.len()).await.unwrap();
            assert_eq!(round_trip, payload, "round trip failed for {method}");
        }
    }

    #[tokio::test]
    async fn test_large_payload_spans_frames() {
        let data =
            (0..MAX_COMPRESS_CHUNK + 200_000).map(|idx| (idx % 251) as u8).collect::<Vec<_>>();
        let compressed = compress_block(CompressionMethod::LZ4, &data).unwrap();

        let mut reader = Cursor::new(compressed.to_vec());
        let output =
            read_decompressed(CompressionMethod::LZ4, &mut reader, data.len()).await.unwrap();
        assert_eq!(output, data);
        // both frames consumed, nothing more
        assert_eq!(reader.position() as usize, compressed.len());
    }

    #[tokio::test]
    async fn test_reader_stops_at_frame_boundary() {
        let first = compress_block(CompressionMethod::LZ4, b"first").unwrap();
        let second = compress_block(CompressionMethod::LZ4, b"second").unwrap();
        let mut stream = first.to_vec();
        stream.extend_from_slice(&second);

        let mut reader = Cursor::new(stream);
        let out = read_decompressed(CompressionMethod::LZ4, &mut reader, 5).await.unwrap();
        assert_eq!(out, b"first");
        assert_eq!(reader.position() as usize, first.len());
    }

    #[tokio::test]
    async fn test_checksum_validation() {
        let data = b"test data for checksum validation".to_vec();
        let mut compressed = compress_block(CompressionMethod::LZ4, &data).unwrap().to_vec();
        compressed[0] ^= 0xFF;

        let mut reader = Cursor::new(compressed);
        let err = read_decompressed(CompressionMethod::LZ4, &mut reader, data.len()).await;
        assert!(matches!(err, Err(Error::Checksum { .. })), "got {err:?}");
    }

    #[tokio::test]
    async fn test_method_mismatch_is_rejected() {
        let compressed = compress_block(CompressionMethod::ZSTD, b"zstd data").unwrap();
        let mut reader = Cursor::new(compressed.to_vec());
        let err = read_decompressed(CompressionMethod::LZ4, &mut reader, 9).await;
        assert!(matches!(err, Err(Error::Protocol(_))), "got {err:?}");
    }

    #[test]
    fn test_none_is_not_compressible() {
        assert!(compress_block(CompressionMethod::None, b"x").is_err());
    }
}
