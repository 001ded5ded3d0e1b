use rangeguard_membrane::error_record::RECORD_WORDS;
use rangeguard_membrane::{
    Access, AddrRange, ErrorContext, ErrorRecord, GuardConfig, LogDump, RangeTable, ResolvedBy,
    UnitOfWork, Verdict, Violation,
};

fn two_ranges() -> RangeTable {
    RangeTable::from_ranges([AddrRange::new(100, 200), AddrRange::new(300, 400)]).unwrap()
}

#[test]
fn walkthrough_produces_three_records() {
    let mut unit = UnitOfWork::new(GuardConfig::default());
    unit.begin(two_ranges()).unwrap();
    let ctx = ErrorContext::for_action(1).with_site(7, 99).with_resource(3);

    let verdicts: Vec<Verdict> = {
        let mut lane = unit.lane().unwrap();
        [
            Access::read(150, 10),
            Access::read(350, 10),
            Access::read(250, 10),
            Access::read(196, 8),
            Access::read(104, 4).aligned_to(8),
        ]
        .into_iter()
        .map(|a| unit.check(&mut lane, &ctx, a))
        .collect()
    };

    assert_eq!(verdicts[0], Verdict::Valid(ResolvedBy::Cache));
    assert_eq!(verdicts[1], Verdict::Valid(ResolvedBy::Scan { index: 1 }));
    assert_eq!(verdicts[2], Verdict::Invalid(Violation::Unallocated));
    assert_eq!(verdicts[3], Verdict::Invalid(Violation::Unallocated));
    assert_eq!(verdicts[4], Verdict::Invalid(Violation::Misaligned));

    let dump = unit.finish();
    assert_eq!(dump.written_words() as usize, 3 * RECORD_WORDS);
    let records: Vec<ErrorRecord> = dump
        .record_slots()
        .map(|(_, words)| ErrorRecord::decode(words).unwrap())
        .collect();
    assert_eq!(records[0].address, 250);
    assert_eq!(records[1].address, 196);
    assert_eq!(records[1].detail, 8);
    assert_eq!(records[2].violation, Violation::Misaligned);
    assert_eq!(records[2].detail, 8);
    assert!(records.iter().all(|r| r.context == ctx));

    let snap = unit.metrics();
    assert_eq!(snap.validations, 5);
    assert_eq!(snap.records_written, 3);
}

#[test]
fn dump_survives_byte_round_trip() {
    let mut unit = UnitOfWork::new(GuardConfig::default());
    unit.begin(two_ranges()).unwrap();
    {
        let mut lane = unit.lane().unwrap();
        let _ = unit.check(&mut lane, &ErrorContext::for_action(0), Access::write(50, 4));
    }
    let dump = unit.finish();
    let parsed = LogDump::from_le_bytes(&dump.to_le_bytes()).unwrap();
    assert_eq!(parsed, dump);
}

#[test]
fn many_lanes_share_one_log() {
    const LANES: u16 = 16;
    let mut unit = UnitOfWork::new(GuardConfig::default());
    unit.begin(two_ranges()).unwrap();

    std::thread::scope(|s| {
        for lane_id in 0..LANES {
            let unit = &unit;
            s.spawn(move || {
                let mut lane = unit.lane().unwrap();
                let ctx = ErrorContext::for_action(lane_id);
                for i in 0..10u64 {
                    let ok = unit.check(&mut lane, &ctx, Access::read(100 + i, 1));
                    assert!(ok.is_valid());
                    let bad = unit.check(&mut lane, &ctx, Access::read(200 + i, 1));
                    assert!(!bad.is_valid());
                }
            });
        }
    });

    let snap = unit.metrics();
    assert_eq!(snap.validations, u64::from(LANES) * 20);
    assert_eq!(snap.unallocated, u64::from(LANES) * 10);
    // Six per context make it into the log, the rest hit the cap.
    assert_eq!(snap.records_written, u64::from(LANES) * 6);
    assert_eq!(snap.records_capped, u64::from(LANES) * 4);
    assert_eq!(unit.pipeline().log().stored_records(), usize::from(LANES) * 6);
}
