#![no_main]

use libfuzzer_sys::fuzz_target;
use watchparty_client::protocol::ServerMessage;

fuzz_target!(|data: &[u8]| {
    // Whatever the room server sends must never panic the decoder.
    let Ok(text) = std::str::from_utf8(data) else {
        let _ = serde_json::from_slice::<ServerMessage>(data);
        return;
    };
    if let Ok(msg) = serde_json::from_str::<ServerMessage>(text) {
        // Decoded messages must re-encode.
        let _ = serde_json::to_string(&msg).expect("re-encode server message");
    }
});
