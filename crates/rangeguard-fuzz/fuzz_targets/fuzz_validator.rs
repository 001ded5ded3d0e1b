#![no_main]
use libfuzzer_sys::fuzz_target;
use rangeguard_membrane::{
    Access, AddrRange, ErrorContext, GuardConfig, GuardPipeline, LaneCache, RangeTable,
};

fn word(chunk: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[..chunk.len()].copy_from_slice(chunk);
    u64::from_le_bytes(buf)
}

fuzz_target!(|data: &[u8]| {
    // Layout: [n_ranges][n_ranges * (gap u16, len u16)][accesses: addr u64, size u16, align_shift u8]*
    let Some((&n, rest)) = data.split_first() else {
        return;
    };
    let n = usize::from(n % 32);
    if rest.len() < n * 4 {
        return;
    }
    let (range_bytes, access_bytes) = rest.split_at(n * 4);

    let mut next = 0u64;
    let ranges: Vec<AddrRange> = range_bytes
        .chunks_exact(4)
        .map(|c| {
            let begin = next + u64::from(u16::from_le_bytes([c[0], c[1]]));
            let len = u64::from(u16::from_le_bytes([c[2], c[3]]));
            next = begin + len;
            AddrRange::new(begin, next)
        })
        .collect();
    let Ok(table) = RangeTable::from_ranges(ranges.clone()) else {
        return;
    };
    let Ok(mut cache) = LaneCache::first(&table) else {
        return;
    };
    let pipeline = GuardPipeline::new(GuardConfig {
        log_capacity_words: 64,
        context_slots: 4,
        ..GuardConfig::default()
    });

    for chunk in access_bytes.chunks(11) {
        if chunk.len() < 11 {
            break;
        }
        let addr = word(&chunk[..8]) % (next + 0x100);
        let size = u32::from(u16::from_le_bytes([chunk[8], chunk[9]]));
        let alignment = 1u32 << (chunk[10] % 8);
        let access = Access::read(addr, size).aligned_to(alignment);
        let ctx = ErrorContext::for_action(u16::from(chunk[10] >> 3));

        // Must never panic, and must agree with a brute-force search.
        let verdict = pipeline.check(&mut cache, &table, &ctx, access);
        let end = addr + u64::from(size);
        let contained = ranges.iter().any(|r| addr >= r.begin && end <= r.end);
        let aligned = addr % u64::from(alignment) == 0;
        assert_eq!(verdict.is_valid(), contained && aligned);
    }

    for rec in pipeline.log().records() {
        assert!(rec.is_ok());
    }
});
