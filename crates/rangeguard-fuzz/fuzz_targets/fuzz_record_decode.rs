#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary dump bytes: parsing and slot decoding must never panic.
    let Some(dump) = rangeguard_membrane::LogDump::from_le_bytes(data) else {
        return;
    };
    for (_, words) in dump.record_slots() {
        if let Ok(rec) = rangeguard_membrane::ErrorRecord::decode(words) {
            let _ = rec.encode();
        }
    }
});
