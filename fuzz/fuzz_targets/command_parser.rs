#![no_main]

use libfuzzer_sys::fuzz_target;
use synthtrace::registry::EventRegistry;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Definitions either register completely or not at all
        let registry = EventRegistry::default();
        for line in input.lines() {
            let before = registry.len();
            if registry.run_command(line).is_err() {
                assert_eq!(registry.len(), before);
            }
        }
        let _ = registry.list();
    }
});
