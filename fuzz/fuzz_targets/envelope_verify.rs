#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Verification of attacker-controlled envelopes must never panic
    if let Ok(env) = serde_json::from_slice::<parley::MessageEnvelope>(data) {
        let _ = parley::envelope::verify(&env);
        let _ = parley::envelope::canonical_payload(&env);
    }
});
