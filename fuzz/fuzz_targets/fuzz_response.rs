#![no_main]

use libfuzzer_sys::fuzz_target;
use network_rpc::{ResponseMessage, SerializationFormat};

fuzz_target!(|data: &[u8]| {
    // Response bodies arrive from the network in either format
    for format in [SerializationFormat::Json, SerializationFormat::Bincode] {
        if let Ok(msg) = format.decode::<ResponseMessage<String>>(data) {
            let _ = msg.into_outcome();
        }
    }
});
