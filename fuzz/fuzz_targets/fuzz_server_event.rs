#![no_main]

use libfuzzer_sys::fuzz_target;
use listening_room_client::protocol::ServerEvent;

fuzz_target!(|data: &[u8]| {
    let _ = serde_json::from_slice::<ServerEvent>(data);

    // Anything that parses must re-encode to a frame that parses the same.
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(event) = ServerEvent::from_frame(text) {
            let frame = serde_json::to_string(&event).unwrap_or_default();
            assert_eq!(ServerEvent::from_frame(&frame).ok(), Some(event));
        }
    }
});
