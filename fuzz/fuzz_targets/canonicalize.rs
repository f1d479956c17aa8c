#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };

    if let Ok(canonical) = parley_core::canonicalize_json(&value) {
        // Output is valid JSON and a fixed point
        let reparsed: serde_json::Value =
            serde_json::from_str(&canonical).expect("canonical output parses");
        let again = parley_core::canonicalize_json(&reparsed).expect("still canonical");
        assert_eq!(canonical, again);
    }
});
