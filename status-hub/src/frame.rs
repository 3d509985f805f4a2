//! Length-prefixed framing for the ingestion wire.
//!
//! A frame is an 8-byte big-endian unsigned length followed by exactly that
//! many payload bytes. There is no handshake, acknowledgement, or checksum;
//! producers simply write frames back to back until they hang up.

use std::io;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::FramingError;

/// An opaque payload. Cloning shares the underlying buffer, so every
/// subscriber that receives a message reads the same bytes.
pub type Message = Bytes;

pub const LENGTH_PREFIX_LEN: usize = 8;

/// Largest payload accepted unless configured otherwise.
pub const DEFAULT_MAX_FRAME_LEN: u64 = 16 * 1024 * 1024;

const PAYLOAD_CHUNK_LEN: usize = 64 * 1024;

pub struct FrameReader<R> {
    reader: R,
    max_frame_len: u64,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self::with_max_frame_len(reader, DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(reader: R, max_frame_len: u64) -> Self {
        Self {
            reader,
            max_frame_len,
        }
    }

    pub fn max_frame_len(&self) -> u64 {
        self.max_frame_len
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Reads the next complete frame.
    ///
    /// A short read is always an error, never a smaller message. Oversized
    /// lengths are rejected before any payload buffer is allocated. After an
    /// error the underlying stream is in an unknown position and the caller
    /// should drop the connection.
    pub async fn read_frame(&mut self) -> Result<Message, FramingError> {
        let len = self.read_length_prefix().await?;
        if len > self.max_frame_len {
            return Err(FramingError::FrameTooLarge {
                len,
                max: self.max_frame_len,
            });
        }
        let expected = usize::try_from(len).map_err(|_| FramingError::FrameTooLarge {
            len,
            max: self.max_frame_len,
        })?;

        let payload = read_up_to(&mut self.reader, len).await?;

        if payload.len() < expected {
            return Err(FramingError::TruncatedPayload {
                expected: len,
                received: payload.len() as u64,
            });
        }

        Ok(Bytes::from(payload))
    }

    async fn read_length_prefix(&mut self) -> Result<u64, FramingError> {
        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        let mut filled = 0;

        while filled < LENGTH_PREFIX_LEN {
            let read = self.reader.read(&mut prefix[filled..]).await?;
            if read == 0 {
                return Err(if filled == 0 {
                    FramingError::Closed
                } else {
                    FramingError::TruncatedPrefix { received: filled }
                });
            }
            filled += read;
        }

        Ok(u64::from_be_bytes(prefix))
    }
}

/// Reads at most `len` bytes, stopping early at EOF. The buffer grows one
/// chunk at a time, so a declared length costs nothing until bytes arrive.
async fn read_up_to<R>(reader: &mut R, len: u64) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut payload = Vec::new();
    let mut remaining = len;

    while remaining > 0 {
        let chunk = remaining.min(PAYLOAD_CHUNK_LEN as u64);
        payload.reserve(chunk as usize);
        let read = (&mut *reader).take(chunk).read_to_end(&mut payload).await? as u64;
        remaining -= read;
        if read < chunk {
            break;
        }
    }

    Ok(payload)
}

/// Encodes `payload` as a single frame.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u64).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_u64(payload.len() as u64).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}
