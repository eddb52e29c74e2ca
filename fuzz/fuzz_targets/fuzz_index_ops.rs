#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use memtier::cache::OrderedIndex;
use std::time::Duration;

#[derive(Arbitrary, Debug)]
enum Op {
    Insert { key: u8, cost: u16 },
    Upsert { key: u8, cost: u16 },
    Promote { key: u8 },
    Touch { key: u8 },
    Remove { key: u8 },
    EvictTail,
    Clear,
}

fuzz_target!(|ops: Vec<Op>| {
    if ops.len() > 4096 {
        return;
    }
    let mut index: OrderedIndex<u8, u32> = OrderedIndex::new();
    for (t, op) in ops.into_iter().enumerate() {
        let now = Duration::from_millis(t as u64);
        match op {
            Op::Insert { key, cost } => {
                let present = index.contains(&key);
                assert_eq!(index.insert_at_front(key, 0, u64::from(cost), now).is_err(), present);
            }
            Op::Upsert { key, cost } => {
                index.upsert(key, 1, u64::from(cost), now);
                assert_eq!(index.peek_head().map(|e| *e.key()), Some(key));
            }
            Op::Promote { key } => {
                if index.promote(&key) {
                    assert_eq!(index.peek_head().map(|e| *e.key()), Some(key));
                }
            }
            Op::Touch { key } => {
                let _ = index.touch(&key, now);
            }
            Op::Remove { key } => {
                index.remove(&key);
                assert!(!index.contains(&key));
            }
            Op::EvictTail => {
                let before = index.len();
                let evicted = index.evict_tail();
                assert_eq!(evicted.is_some(), before > 0);
            }
            Op::Clear => {
                index.clear();
                assert_eq!(index.total_cost(), 0);
            }
        }
        index.check_invariants().unwrap();
    }
});
