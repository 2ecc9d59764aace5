//! # Core Protocol Components
//!
//! Frame header, frame layout, transport envelopes and payload serialization.
//!
//! This module is the wire protocol: what a frame contains and how its fixed
//! header is encoded. How a frame boundary is found on the wire is the
//! transport's business; the envelopes used for that live in [`codec`].
//!
//! ## Wire Format
//! ```text
//! [Magic(4)] [Version(1)] [MsgType(1)] [SerializeTag(1)]
//! [ServiceLen(2)] [MethodLen(2)] [PayloadLen(4)]
//! [Service(ServiceLen)] [Method(MethodLen)] [Payload(PayloadLen)]
//! ```
//! All integers are big-endian.
//!
//! ## Components
//! - **Header**: fixed 15-byte header encode/decode
//! - **Frame**: header plus name fields and payload
//! - **Codec**: stream length-prefix codec and datagram envelope
//! - **Serialization**: JSON and bincode payload formats

pub mod codec;
pub mod frame;
pub mod header;
pub mod serialization;
