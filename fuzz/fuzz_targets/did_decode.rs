#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary text must never panic
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(key) = parley_core::did::decode(text) {
            // Anything that decodes re-encodes to the same identifier
            assert_eq!(parley_core::did::encode(&key), text);
        }
    }

    // Raw key bytes round-trip without curve validation
    if let Ok(raw) = <[u8; 32]>::try_from(data) {
        let id = parley_core::did::encode_raw(&raw);
        assert_eq!(parley_core::did::decode_raw(&id).expect("round trip"), raw);
    }
});
