//! Property tests for channel invariants under arbitrary loads, capacities,
//! and seeds.

mod common;

use common::init_test_logging;
use proptest::prelude::*;
use taskloom::{channel, Runtime, RuntimeConfig};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn fifo_holds_for_any_capacity_and_load(
        values in prop::collection::vec(any::<u16>(), 0..64),
        capacity in 0usize..8,
    ) {
        init_test_logging();
        let mut rt = Runtime::new();
        let (tx, rx) = channel(capacity);
        let expected = values.clone();
        rt.spawn(async move {
            for value in values {
                if tx.send(value).await.is_err() {
                    break;
                }
            }
        });
        let received = rt.spawn(async move {
            let mut out = Vec::new();
            while let Ok(value) = rx.recv().await {
                out.push(value);
            }
            out
        });
        let report = rt.run();
        prop_assert!(report.is_quiescent());
        prop_assert_eq!(received.try_join().unwrap().unwrap(), expected);
    }

    #[test]
    fn buffered_count_never_exceeds_capacity(
        count in 1usize..64,
        capacity in 1usize..8,
    ) {
        init_test_logging();
        let mut rt = Runtime::new();
        let (tx, rx) = channel(capacity);
        let probe = rx.clone();
        rt.spawn(async move {
            for value in 0..count {
                if tx.send(value).await.is_err() {
                    break;
                }
                assert!(probe.len() <= capacity);
            }
        });
        let taken = rt.spawn(async move {
            let mut taken = 0usize;
            while rx.recv().await.is_ok() {
                assert!(rx.len() <= capacity);
                taken += 1;
            }
            taken
        });
        let report = rt.run();
        prop_assert!(report.is_quiescent());
        prop_assert_eq!(taken.try_join().unwrap().unwrap(), count);
    }

    #[test]
    fn per_producer_order_survives_interleaving(
        first in prop::collection::vec(any::<u8>(), 0..32),
        second in prop::collection::vec(any::<u8>(), 0..32),
        capacity in 0usize..4,
    ) {
        init_test_logging();
        let mut rt = Runtime::new();
        let (tx, rx) = channel(capacity);
        let tx2 = tx.clone();
        let expect_first = first.clone();
        let expect_second = second.clone();
        rt.spawn(async move {
            for value in first {
                if tx.send((0u8, value)).await.is_err() {
                    break;
                }
            }
        });
        rt.spawn(async move {
            for value in second {
                if tx2.send((1u8, value)).await.is_err() {
                    break;
                }
            }
        });
        let received = rt.spawn(async move {
            let mut out = Vec::new();
            while let Ok(pair) = rx.recv().await {
                out.push(pair);
            }
            out
        });
        let report = rt.run();
        prop_assert!(report.is_quiescent());
        // Merged arbitrarily, but each producer's subsequence stays in order.
        let merged = received.try_join().unwrap().unwrap();
        let from_first: Vec<u8> =
            merged.iter().filter(|(who, _)| *who == 0).map(|(_, v)| *v).collect();
        let from_second: Vec<u8> =
            merged.iter().filter(|(who, _)| *who == 1).map(|(_, v)| *v).collect();
        prop_assert_eq!(from_first, expect_first);
        prop_assert_eq!(from_second, expect_second);
    }

    #[test]
    fn fifo_holds_under_any_scheduler_seed(
        seed in any::<u64>(),
        count in 1usize..48,
    ) {
        init_test_logging();
        let mut rt = Runtime::with_config(RuntimeConfig::default().with_seed(seed));
        let (tx, rx) = channel(2);
        rt.spawn(async move {
            for value in 0..count {
                if tx.send(value).await.is_err() {
                    break;
                }
            }
        });
        let received = rt.spawn(async move {
            let mut out = Vec::new();
            while let Ok(value) = rx.recv().await {
                out.push(value);
            }
            out
        });
        let report = rt.run();
        prop_assert!(report.is_quiescent());
        prop_assert_eq!(received.try_join().unwrap().unwrap(), (0..count).collect::<Vec<_>>());
    }
}
