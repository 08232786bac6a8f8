#![no_main]

use libfuzzer_sys::fuzz_target;
use netwire::core::codec::WireCodec;
use netwire::core::serialization::{BinaryCodec, JsonCodec};
use netwire::protocol::FrameworkMessage;

fuzz_target!(|data: &[u8]| {
    // Discovery responders decode untrusted datagrams with either codec
    let json = JsonCodec::default();
    let _ = json.type_tag(data);
    if let Ok(msg) = json.decode::<FrameworkMessage>(data) {
        let encoded = json.encode(&msg).expect("re-encode");
        assert_eq!(json.decode::<FrameworkMessage>(&encoded).ok(), Some(msg));
    }

    let binary = BinaryCodec::default();
    let _ = binary.type_tag(data);
    if let Ok(msg) = binary.decode::<FrameworkMessage>(data) {
        let encoded = binary.encode(&msg).expect("re-encode");
        assert_eq!(binary.decode::<FrameworkMessage>(&encoded).ok(), Some(msg));
    }
});
