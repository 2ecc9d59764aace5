#![no_main]

use libfuzzer_sys::fuzz_target;
use network_rpc::core::codec::decode_datagram;
use network_rpc::Frame;

fuzz_target!(|data: &[u8]| {
    // Frame parsing must reject bad input without panicking
    if let Ok(frame) = Frame::parse(data) {
        // A frame that parsed re-encodes to a prefix of the input
        let encoded = frame.to_bytes();
        assert_eq!(&data[..encoded.len()], &encoded[..]);
    }

    let _ = decode_datagram(data);
});
