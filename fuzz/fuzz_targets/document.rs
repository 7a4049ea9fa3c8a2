#![no_main]
use libfuzzer_sys::fuzz_target;

use gl_snapshot::blob::MemoryBlobs;
use gl_snapshot::ContextSnapshot;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let blobs = MemoryBlobs::new();
        if let Ok((snapshot, _report)) = ContextSnapshot::from_json(text, &blobs) {
            // Whatever loaded must compare equal to itself and write back out.
            assert!(snapshot.compare_restorable_state(&snapshot).is_clean());
            let mut out = MemoryBlobs::new();
            snapshot.to_json(&mut out).expect("loaded snapshot failed to serialize");
        }
    }
});
