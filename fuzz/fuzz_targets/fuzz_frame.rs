#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use netwire::core::codec::FrameCodec;
use netwire::core::frame::Frame;
use netwire::core::serialization::BinaryCodec;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Single-frame parsing must never panic
    let _ = Frame::from_bytes(data);

    // Streaming decode with a small limit so huge length claims are rejected
    let mut codec = FrameCodec::new(BinaryCodec::default()).with_max_frame_len(64 * 1024);
    let mut buf = BytesMut::from(data);
    while let Ok(Some(_body)) = codec.decode(&mut buf) {}
    let _ = codec.decode_eof(&mut buf);
});
