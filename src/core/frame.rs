use crate::config::HEADER_SIZE;
use crate::core::header::Header;
use crate::core::serialization::SerializationFormat;
use crate::error::{Result, RpcError};

/// One complete protocol message: header, service and method names, payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: Header,
    pub service: String,
    pub method: String,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Build a request frame, filling in the header lengths
    pub fn request(
        format: SerializationFormat,
        service: &str,
        method: &str,
        payload: Vec<u8>,
    ) -> Result<Self> {
        let service_len =
            u16::try_from(service.len()).map_err(|_| RpcError::FrameTooLarge(service.len()))?;
        let method_len =
            u16::try_from(method.len()).map_err(|_| RpcError::FrameTooLarge(method.len()))?;
        let payload_len =
            u32::try_from(payload.len()).map_err(|_| RpcError::FrameTooLarge(payload.len()))?;

        Ok(Self {
            header: Header::request(format.tag(), service_len, method_len, payload_len),
            service: service.to_string(),
            method: method.to_string(),
            payload,
        })
    }

    /// Build a response frame around an encoded response message
    pub fn response(serialize_type: u8, payload: Vec<u8>) -> Result<Self> {
        let payload_len =
            u32::try_from(payload.len()).map_err(|_| RpcError::FrameTooLarge(payload.len()))?;

        Ok(Self {
            header: Header::response(serialize_type, payload_len),
            service: String::new(),
            method: String::new(),
            payload,
        })
    }

    /// Total encoded size
    #[inline]
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.header.body_len()
    }

    /// Serialize the frame to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(&self.header.encode());
        out.extend_from_slice(self.service.as_bytes());
        out.extend_from_slice(self.method.as_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Parse a frame, checking every region against the header's lengths.
    ///
    /// Bytes beyond the declared payload are ignored.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = Header::decode(data)?;

        let service_end = HEADER_SIZE + header.service_len as usize;
        let method_end = service_end + header.method_len as usize;
        if data.len() < method_end {
            return Err(RpcError::TruncatedFrame(format!(
                "names need {} bytes, got {}",
                method_end,
                data.len()
            )));
        }

        let payload_end = method_end + header.payload_len as usize;
        if data.len() < payload_end {
            return Err(RpcError::TruncatedFrame(format!(
                "payload needs {} bytes, got {}",
                payload_end,
                data.len()
            )));
        }

        let service = std::str::from_utf8(&data[HEADER_SIZE..service_end])
            .map_err(|_| RpcError::InvalidName("service name is not valid UTF-8"))?;
        let method = std::str::from_utf8(&data[service_end..method_end])
            .map_err(|_| RpcError::InvalidName("method name is not valid UTF-8"))?;

        Ok(Self {
            header,
            service: service.to_string(),
            method: method.to_string(),
            payload: data[method_end..payload_end].to_vec(),
        })
    }
}

/// Split `"Service.Method"` on its last dot.
///
/// ```
/// use network_rpc::core::frame::split_service_method;
///
/// assert_eq!(split_service_method("pkg.Arith.Add").unwrap(), ("pkg.Arith", "Add"));
/// assert!(split_service_method("NoDot").is_err());
/// ```
pub fn split_service_method(service_method: &str) -> Result<(&str, &str)> {
    service_method
        .rsplit_once('.')
        .ok_or_else(|| RpcError::MalformedServiceMethod(service_method.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::header::MessageType;

    #[test]
    fn request_frame_layout() {
        let frame =
            Frame::request(SerializationFormat::Json, "Arith", "Add", b"{}".to_vec()).unwrap();
        let bytes = frame.to_bytes();

        assert_eq!(bytes.len(), HEADER_SIZE + 5 + 3 + 2);
        assert_eq!(&bytes[HEADER_SIZE..HEADER_SIZE + 5], b"Arith");
        assert_eq!(&bytes[HEADER_SIZE + 5..HEADER_SIZE + 8], b"Add");
        assert_eq!(&bytes[HEADER_SIZE + 8..], b"{}");

        let parsed = Frame::parse(&bytes).unwrap();
        assert_eq!(parsed, frame);
        assert_eq!(parsed.header.kind(), Some(MessageType::Request));
    }

    #[test]
    fn response_frame_has_no_names() {
        let frame = Frame::response(1, vec![9, 9]).unwrap();
        assert_eq!(frame.header.service_len, 0);
        assert_eq!(frame.header.method_len, 0);
        assert_eq!(frame.header.kind(), Some(MessageType::Response));
        assert_eq!(Frame::parse(&frame.to_bytes()).unwrap().payload, vec![9, 9]);
    }

    #[test]
    fn parse_rejects_truncated_regions() {
        let bytes = Frame::request(SerializationFormat::Json, "Echo", "Echo", b"abc".to_vec())
            .unwrap()
            .to_bytes();

        assert!(matches!(
            Frame::parse(&bytes[..HEADER_SIZE + 3]),
            Err(RpcError::TruncatedFrame(_))
        ));
        assert!(matches!(
            Frame::parse(&bytes[..bytes.len() - 1]),
            Err(RpcError::TruncatedFrame(_))
        ));
    }

    #[test]
    fn non_utf8_names_are_invalid_not_truncated() {
        let mut bytes = Frame::request(SerializationFormat::Json, "Echo", "Echo", b"abc".to_vec())
            .unwrap()
            .to_bytes();

        bytes[HEADER_SIZE] = 0xFF;
        let err = Frame::parse(&bytes).unwrap_err();
        assert!(matches!(err, RpcError::InvalidName(_)));
        assert!(err.to_string().contains("service name"));

        bytes[HEADER_SIZE] = b'E';
        bytes[HEADER_SIZE + 4] = 0xC3;
        assert!(matches!(
            Frame::parse(&bytes),
            Err(RpcError::InvalidName(m)) if m.contains("method name")
        ));
    }

    #[test]
    fn oversized_names_are_rejected() {
        let long = "x".repeat(u16::MAX as usize + 1);
        assert!(matches!(
            Frame::request(SerializationFormat::Json, &long, "M", vec![]),
            Err(RpcError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn split_uses_last_dot() {
        assert_eq!(split_service_method("A.B").unwrap(), ("A", "B"));
        assert_eq!(split_service_method("a.b.C").unwrap(), ("a.b", "C"));
        assert_eq!(split_service_method("A.").unwrap(), ("A", ""));
        assert!(matches!(
            split_service_method("NoDot"),
            Err(RpcError::MalformedServiceMethod(s)) if s == "NoDot"
        ));
    }
}
