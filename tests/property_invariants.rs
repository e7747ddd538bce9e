use std::collections::{HashMap, HashSet};

use proptest::prelude::*;
use serde_json::json;

use mutqueue::{
    codec::{decode_queue, encode_queue},
    core::pending::{FailureDisposition, PendingQueue},
    types::MutationId,
};

#[derive(Debug, Clone)]
enum Action {
    Enqueue,
    Succeed,
    Fail,
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        3 => Just(Action::Enqueue),
        2 => Just(Action::Succeed),
        2 => Just(Action::Fail),
    ]
}

proptest! {
    #[test]
    fn head_only_processing_preserves_fifo_and_retry_accounting(
        max_retries in 1u32..5,
        actions in prop::collection::vec(action_strategy(), 1..200),
    ) {
        let mut queue = PendingQueue::new();
        let mut enqueued = Vec::<MutationId>::new();
        let mut removed = Vec::<MutationId>::new();
        let mut removed_set = HashSet::<MutationId>::new();
        let mut last_retry = HashMap::<MutationId, u32>::new();
        let mut now = 0u64;

        for action in actions {
            now += 1;
            match action {
                Action::Enqueue => {
                    let m = queue.push("op".to_string(), json!(now), now);
                    prop_assert_eq!(m.retry_count, 0);
                    enqueued.push(m.id);
                }
                Action::Succeed => {
                    let Some(id) = queue.head().map(|m| m.id) else { continue };
                    let done = queue.complete_head(id);
                    prop_assert!(done.is_some());
                    prop_assert!(removed_set.insert(id), "removed twice");
                    removed.push(id);
                }
                Action::Fail => {
                    let Some(id) = queue.head().map(|m| m.id) else { continue };
                    match queue.fail_head(id, max_retries, now) {
                        Some(FailureDisposition::Retained { retry_count, .. }) => {
                            prop_assert!(retry_count < max_retries);
                            let prev = last_retry.insert(id, retry_count).unwrap_or(0);
                            prop_assert_eq!(retry_count, prev + 1);
                        }
                        Some(FailureDisposition::Dropped(m)) => {
                            prop_assert_eq!(m.retry_count, max_retries);
                            prop_assert!(removed_set.insert(id), "removed twice");
                            removed.push(id);
                        }
                        None => prop_assert!(false, "head vanished"),
                    }
                }
            }

            // Removals happen strictly in enqueue order, and what is left is
            // exactly the unremoved suffix.
            prop_assert_eq!(&removed[..], &enqueued[..removed.len()]);
            let remaining: Vec<MutationId> = queue.iter().map(|m| m.id).collect();
            prop_assert_eq!(&remaining[..], &enqueued[removed.len()..]);
        }

        let raw = encode_queue(queue.iter()).expect("encode");
        prop_assert_eq!(decode_queue(&raw).expect("decode"), queue.to_vec());
    }
}
