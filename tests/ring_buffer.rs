//! Property tests for the ring buffer.

use livetail::{RingBuffer, TailError};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Op {
    Push(u32),
    Resize(usize),
    Clear,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        8 => any::<u32>().prop_map(Op::Push),
        1 => (1usize..20).prop_map(Op::Resize),
        1 => Just(Op::Clear),
    ]
}

proptest! {
    #[test]
    fn prop_size_never_exceeds_capacity(
        capacity in 1usize..20,
        ops in prop::collection::vec(op_strategy(), 0..200),
    ) {
        let mut ring = RingBuffer::new(capacity).unwrap();
        for op in ops {
            match op {
                Op::Push(v) => { ring.push(v); }
                Op::Resize(n) => ring.set_capacity(n).unwrap(),
                Op::Clear => ring.clear(),
            }
            prop_assert!(ring.len() <= ring.capacity());
            prop_assert!(ring.start() < ring.capacity());
            prop_assert_eq!(ring.to_vec_newest_first().len(), ring.len());
        }
    }

    #[test]
    fn prop_overflow_keeps_last_capacity_items(
        capacity in 1usize..32,
        extra in 1usize..64,
    ) {
        let total = capacity + extra;
        let mut ring = RingBuffer::new(capacity).unwrap();
        for i in 0..total {
            ring.push(i);
        }

        let expected: Vec<usize> = (extra..total).rev().collect();
        prop_assert_eq!(ring.to_vec_newest_first(), expected);
    }

    #[test]
    fn prop_matches_model(
        capacity in 1usize..16,
        ops in prop::collection::vec(op_strategy(), 0..150),
    ) {
        // Model: plain Vec, oldest first, truncated from the front.
        let mut model: Vec<u32> = Vec::new();
        let mut model_capacity = capacity;
        let mut ring = RingBuffer::new(capacity).unwrap();

        for op in ops {
            match op {
                Op::Push(v) => {
                    ring.push(v);
                    model.push(v);
                }
                Op::Resize(n) => {
                    ring.set_capacity(n).unwrap();
                    model_capacity = n;
                }
                Op::Clear => {
                    ring.clear();
                    model.clear();
                }
            }
            if model.len() > model_capacity {
                model.drain(..model.len() - model_capacity);
            }

            let expected: Vec<u32> = model.iter().rev().copied().collect();
            prop_assert_eq!(ring.to_vec_newest_first(), expected);
        }
    }
}

#[test]
fn test_resize_keeps_newest_five_of_ten() {
    let mut ring = RingBuffer::new(10).unwrap();
    for i in 1..=10 {
        ring.push(format!("i{i}"));
    }

    ring.set_capacity(5).unwrap();

    assert_eq!(ring.to_vec_newest_first(), vec!["i10", "i9", "i8", "i7", "i6"]);
}

#[test]
fn test_zero_capacity_is_rejected() {
    assert!(matches!(RingBuffer::<u8>::new(0), Err(TailError::InvalidCapacity)));
}
