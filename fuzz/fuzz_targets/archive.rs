#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = gl_snapshot::files::read_archive_snapshot(data);
});
