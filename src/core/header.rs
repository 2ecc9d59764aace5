use crate::config::{HEADER_SIZE, MAGIC_NUMBER, PROTOCOL_VERSION};
use crate::error::{Result, RpcError};

/// Kind of frame carried by a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Request = 0,
    Response = 1,
}

impl MessageType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(MessageType::Request),
            1 => Some(MessageType::Response),
            _ => None,
        }
    }
}

/// Fixed-size frame header.
///
/// The message type is kept as its raw byte so that decoding never rejects a
/// frame for it; use [`Header::kind`] for the typed view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: u32,
    pub version: u8,
    pub message_type: u8,
    pub serialize_type: u8,
    pub service_len: u16,
    pub method_len: u16,
    pub payload_len: u32,
}

impl Header {
    /// Header for a request frame
    pub fn request(
        serialize_type: u8,
        service_len: u16,
        method_len: u16,
        payload_len: u32,
    ) -> Self {
        Self {
            magic: MAGIC_NUMBER,
            version: PROTOCOL_VERSION,
            message_type: MessageType::Request as u8,
            serialize_type,
            service_len,
            method_len,
            payload_len,
        }
    }

    /// Header for a response frame (responses carry no names)
    pub fn response(serialize_type: u8, payload_len: u32) -> Self {
        Self {
            magic: MAGIC_NUMBER,
            version: PROTOCOL_VERSION,
            message_type: MessageType::Response as u8,
            serialize_type,
            service_len: 0,
            method_len: 0,
            payload_len,
        }
    }

    pub fn kind(&self) -> Option<MessageType> {
        MessageType::from_byte(self.message_type)
    }

    /// Number of bytes that follow the header in a complete frame
    #[inline]
    pub fn body_len(&self) -> usize {
        self.service_len as usize + self.method_len as usize + self.payload_len as usize
    }

    /// Encode into the 15-byte big-endian wire form
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic.to_be_bytes());
        buf[4] = self.version;
        buf[5] = self.message_type;
        buf[6] = self.serialize_type;
        buf[7..9].copy_from_slice(&self.service_len.to_be_bytes());
        buf[9..11].copy_from_slice(&self.method_len.to_be_bytes());
        buf[11..15].copy_from_slice(&self.payload_len.to_be_bytes());
        buf
    }

    /// Decode from the first 15 bytes of `data`.
    ///
    /// Only the magic number is checked. The version byte is carried through
    /// as-is.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(RpcError::MalformedHeader(data.len()));
        }

        let header = Self {
            magic: u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
            version: data[4],
            message_type: data[5],
            serialize_type: data[6],
            service_len: u16::from_be_bytes([data[7], data[8]]),
            method_len: u16::from_be_bytes([data[9], data[10]]),
            payload_len: u32::from_be_bytes([data[11], data[12], data[13], data[14]]),
        };

        if header.magic != MAGIC_NUMBER {
            return Err(RpcError::BadMagic(header.magic));
        }

        Ok(header)
    }
}
