//! Example: Comparing Wire Formats
//!
//! Encodes the same payload with the JSON and binary codecs and shows the
//! bytes each puts on the wire, plus the length-prefixed frame around them.
//!
//! Run with: `cargo run --example wire_formats`

use bytes::BytesMut;
use netwire::core::codec::{CodecOptions, FrameCodec, WireCodec};
use netwire::core::serialization::{AnyCodec, Payload, WireFormat};
use netwire::protocol::FrameworkMessage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct GameServer {
    id: i32,
    game_name: String,
    player_name: String,
    slots: u8,
}

impl Payload for GameServer {
    const TYPE_TAG: &'static str = "demo.GameServer";
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    netwire::utils::logging::init_logging(&netwire::config::LoggingConfig {
        log_level: tracing::Level::DEBUG,
        ..Default::default()
    })?;

    println!("=== Wire Formats Demo ===\n");

    let server = GameServer {
        id: 42,
        game_name: "gameName".to_string(),
        player_name: "playerName".to_string(),
        slots: 8,
    };
    println!("Original payload: {server:?}\n");

    for format in [WireFormat::Json, WireFormat::Binary] {
        let codec = AnyCodec::new(
            format,
            CodecOptions {
                logging: true,
                pretty: true,
            },
        );

        println!("{} (format byte 0x{:02X})", format.name(), format.format_byte());

        let body = codec.encode(&server)?;
        println!("   - Body size: {} bytes", body.len());
        match std::str::from_utf8(&body) {
            Ok(text) if format == WireFormat::Json => println!("   - Text: {text}"),
            _ => println!("   - Hex: {:02X?}", &body[..body.len().min(24)]),
        }
        println!("   - Type tag: {}", codec.type_tag(&body)?);

        let recovered: GameServer = codec.decode(&body)?;
        println!("   - Roundtrip: {}", if recovered == server { "ok" } else { "FAILED" });

        let mut frame = BytesMut::new();
        FrameCodec::new(codec).encode_payload(&server, &mut frame)?;
        println!("   - Framed size: {} bytes (prefix {:02X?})", frame.len(), &frame[..4]);

        let discover = codec.encode(&FrameworkMessage::DiscoverHost)?;
        println!("   - Discovery request datagram: {} bytes\n", discover.len());
    }

    Ok(())
}
