//! Property-based invariant tests for the channel registry.
//!
//! These tests drive a factory with arbitrary connect/drop/emit sequences and
//! check, after every step:
//!
//! 1. A key exists exactly while at least one connection to it is alive.
//! 2. The registry holds one channel per distinct live key, no more.
//! 3. Every live connection reads the last value emitted on its key since the
//!    key's channel was (re)created.
//! 4. A subscriber sees emitted values with consecutive duplicates removed.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use modelcast_core::Model;
use modelcast_runtime::{Connection, Local, StreamFactory};
use proptest::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct Cell {
    key: u8,
    value: u16,
}

impl Model for Cell {
    type Id = u8;

    fn id(&self) -> &u8 {
        &self.key
    }
}

#[derive(Debug, Clone)]
enum Op {
    Connect(u8),
    Drop(usize),
    Emit(usize, u16),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..4).prop_map(Op::Connect),
        any::<usize>().prop_map(Op::Drop),
        (any::<usize>(), any::<u16>()).prop_map(|(i, v)| Op::Emit(i, v)),
    ]
}

// ═════════════════════════════════════════════════════════════════════════
// 1-3. Registry mirrors live connections
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn registry_tracks_live_connections(ops in proptest::collection::vec(op_strategy(), 1..64)) {
        let factory = StreamFactory::<Cell>::new();
        let mut live: Vec<(u8, Connection<Cell, Local>)> = Vec::new();
        let mut expected: HashMap<u8, u16> = HashMap::new();

        for op in ops {
            match op {
                Op::Connect(key) => live.push((key, factory.connect(key))),
                Op::Drop(i) if !live.is_empty() => {
                    let (key, conn) = live.remove(i % live.len());
                    drop(conn);
                    if !live.iter().any(|(k, _)| *k == key) {
                        expected.remove(&key);
                    }
                }
                Op::Emit(i, value) if !live.is_empty() => {
                    let (key, conn) = &live[i % live.len()];
                    conn.emit(Cell { key: *key, value }).unwrap();
                    expected.insert(*key, value);
                }
                _ => {}
            }

            for key in 0u8..4 {
                let has_live = live.iter().any(|(k, _)| *k == key);
                prop_assert_eq!(factory.exists(&key), has_live);
            }
            let distinct: HashSet<u8> = live.iter().map(|(k, _)| *k).collect();
            prop_assert_eq!(factory.len(), distinct.len());
            for (key, conn) in &live {
                prop_assert_eq!(conn.latest().map(|c| c.value), expected.get(key).copied());
            }
        }

        drop(live);
        prop_assert!(factory.is_empty());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Duplicate suppression
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn subscriber_sees_deduplicated_sequence(values in proptest::collection::vec(0u16..4, 0..32)) {
        let factory = StreamFactory::<Cell>::new();
        let conn = factory.connect(0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = conn
            .subscribe(move |c: &Cell| sink.lock().unwrap().push(c.value))
            .unwrap();

        for &value in &values {
            conn.emit(Cell { key: 0, value }).unwrap();
        }

        let mut expected = values.clone();
        expected.dedup();
        prop_assert_eq!(&*seen.lock().unwrap(), &expected);
    }
}
