//! Exchange framing.
//!
//! ```text
//! +----------------+----------------------+-----------------+
//! | length (u32 BE)| exchange id (u64 BE) | payload ...     |
//! +----------------+----------------------+-----------------+
//!                  |<-------------- length --------------->|
//! ```
//!
//! [`ExchangeCodec`] plugs into `FramedRead` / `FramedWrite`. The framed
//! reader owns the receive buffer, so dropping a pending `next()` (for
//! example when a socket-read timeout fires) never loses bytes.

use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Bytes preceding the payload: length prefix plus exchange id.
pub const FRAME_HEADER_LEN: usize = 4 + EXCHANGE_ID_LEN;

const EXCHANGE_ID_LEN: usize = 8;

/// One frame on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: u64,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(id: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }
}

/// Length-prefixed codec for exchange frames.
///
/// `max_frame_size` bounds the whole frame, header included, in both
/// directions.
#[derive(Debug, Clone)]
pub struct ExchangeCodec {
    max_frame_size: usize,
}

impl ExchangeCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Whether a payload of `len` bytes fits in one outgoing frame.
    pub fn fits(&self, len: usize) -> bool {
        FRAME_HEADER_LEN
            .checked_add(len)
            .is_some_and(|total| total <= self.max_frame_size)
    }
}

impl Decoder for ExchangeCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        if src.len() < 4 {
            return Ok(None);
        }

        let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if length < EXCHANGE_ID_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame length {length} shorter than exchange id"),
            ));
        }

        let total = 4 + length;
        if total > self.max_frame_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame of {total} bytes exceeds limit {}", self.max_frame_size),
            ));
        }

        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(4);
        let id = src.get_u64();
        let payload = src.split_to(length - EXCHANGE_ID_LEN).freeze();

        Ok(Some(Frame { id, payload }))
    }
}

impl Encoder<Frame> for ExchangeCodec {
    type Error = io::Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), io::Error> {
        let payload_len = frame.payload.len();
        let length = EXCHANGE_ID_LEN
            .checked_add(payload_len)
            .and_then(|len| u32::try_from(len).ok())
            .filter(|_| self.fits(payload_len))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "payload of {payload_len} bytes exceeds frame limit {}",
                        self.max_frame_size
                    ),
                )
            })?;

        dst.reserve(FRAME_HEADER_LEN + payload_len);
        dst.put_u32(length);
        dst.put_u64(frame.id);
        dst.put_slice(&frame.payload);
        Ok(())
    }
}
