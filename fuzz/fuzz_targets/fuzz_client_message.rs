#![no_main]

use libfuzzer_sys::fuzz_target;
use watchparty_client::protocol::ClientMessage;

fuzz_target!(|data: &[u8]| {
    let Ok(msg) = serde_json::from_slice::<ClientMessage>(data) else {
        return;
    };
    // Anything that decodes must survive a re-encode and decode of its own
    // output with the same message type.
    let json = serde_json::to_string(&msg).expect("re-encode client message");
    let again: ClientMessage = serde_json::from_str(&json).expect("decode own encoding");
    assert_eq!(
        std::mem::discriminant(&msg),
        std::mem::discriminant(&again)
    );
});
