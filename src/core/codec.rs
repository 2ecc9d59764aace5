//! Transport envelopes.
//!
//! The stream transport wraps each frame as `[len: u32 BE][frame]` so frame
//! boundaries survive arbitrary TCP chunking. The datagram transport uses the
//! same prefix inside each datagram and checks it against what arrived.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::config::MAX_FRAME_SIZE;
use crate::error::{Result, RpcError};

const LEN_PREFIX: usize = 4;

/// Length-prefixed framing for byte streams
#[derive(Debug, Clone, Copy, Default)]
pub struct LengthPrefixCodec;

impl Decoder for LengthPrefixCodec {
    type Item = BytesMut;
    type Error = RpcError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < LEN_PREFIX {
            return Ok(None);
        }

        let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(RpcError::FrameTooLarge(len));
        }

        if src.len() < LEN_PREFIX + len {
            src.reserve(LEN_PREFIX + len - src.len());
            return Ok(None);
        }

        src.advance(LEN_PREFIX);
        Ok(Some(src.split_to(len)))
    }
}

impl Encoder<Bytes> for LengthPrefixCodec {
    type Error = RpcError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        if item.len() > MAX_FRAME_SIZE {
            return Err(RpcError::FrameTooLarge(item.len()));
        }

        dst.reserve(LEN_PREFIX + item.len());
        dst.put_u32(item.len() as u32);
        dst.extend_from_slice(&item);
        Ok(())
    }
}

/// Wrap a frame into a datagram body
pub fn encode_datagram(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(LEN_PREFIX + data.len());
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
    out
}

/// Unwrap a received datagram.
///
/// Fails with `IncompleteDatagram` when the declared length exceeds the bytes
/// that actually arrived.
pub fn decode_datagram(datagram: &[u8]) -> Result<&[u8]> {
    if datagram.len() < LEN_PREFIX {
        return Err(RpcError::IncompleteDatagram {
            declared: LEN_PREFIX,
            received: datagram.len(),
        });
    }

    let declared =
        u32::from_be_bytes([datagram[0], datagram[1], datagram[2], datagram[3]]) as usize;
    let received = datagram.len() - LEN_PREFIX;
    if declared > received {
        return Err(RpcError::IncompleteDatagram { declared, received });
    }

    Ok(&datagram[LEN_PREFIX..LEN_PREFIX + declared])
}
