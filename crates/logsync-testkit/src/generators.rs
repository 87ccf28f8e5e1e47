//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::{json, Value};

use logsync_core::{ActionId, Meta, NodeId};

/// Node ids drawn from a small pool so collisions and elision both happen.
pub fn node_id() -> impl Strategy<Value = NodeId> {
    prop_oneof![
        Just("local".to_string()),
        Just("peer".to_string()),
        Just("third".to_string()),
        "[a-z]{1,8}".prop_map(String::from),
    ]
    .prop_map(NodeId::new)
}

/// A reasonable timestamp in milliseconds.
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=1_700_000_000_000i64
}

pub fn action_id() -> impl Strategy<Value = ActionId> {
    (timestamp(), node_id(), 0u64..4).prop_map(|(time, node, seq)| ActionId::new(time, node, seq))
}

fn label() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,7}".prop_map(String::from)
}

/// Values stored in `extra`.
fn extra_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::from),
        any::<i32>().prop_map(Value::from),
        label().prop_map(Value::from),
        prop::collection::vec(label(), 0..3).prop_map(|items| json!(items)),
    ]
}

/// A stored meta with `added` left at 0.
///
/// Extra keys never shadow the typed fields.
pub fn meta() -> impl Strategy<Value = Meta> {
    (
        action_id(),
        timestamp(),
        prop::collection::vec(label(), 0..3),
        prop::collection::vec(label(), 0..3),
        prop::option::of(label()),
        prop::option::of(label()),
        prop::collection::btree_map("x[a-z]{1,6}", extra_value(), 0..3),
    )
        .prop_map(
            |(id, time, reasons, indexes, subprotocol, keep_last, extra)| {
                let mut meta = Meta::new(id);
                meta.time = time;
                meta.reasons = reasons;
                meta.indexes = indexes;
                meta.subprotocol = subprotocol;
                meta.keep_last = keep_last;
                meta.extra = extra.into_iter().collect();
                meta
            },
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use logsync_core::causal_cmp;
    use logsync_sync::MetaCodec;
    use std::cmp::Ordering;

    proptest! {
        #[test]
        fn codec_round_trips_through_the_peer(
            meta in meta(),
            base_time in timestamp(),
            time_fix in -10_000i64..10_000,
        ) {
            let codec = MetaCodec::new(NodeId::new("local"), NodeId::new("peer"))
                .with_base_time(base_time)
                .with_time_fix(time_fix);
            let wire = codec.encode(&meta);
            let decoded = codec.mirror().decode(&wire).unwrap();
            prop_assert_eq!(decoded, meta);
        }

        #[test]
        fn causal_order_is_total(a in meta(), b in meta()) {
            let ab = causal_cmp(&a, &b);
            let ba = causal_cmp(&b, &a);
            prop_assert_eq!(ab, ba.reverse());
            if ab == Ordering::Equal {
                prop_assert_eq!(
                    (a.time, &a.id.node, a.id.seq),
                    (b.time, &b.id.node, b.id.seq)
                );
            }
        }

        #[test]
        fn causal_order_is_transitive(a in meta(), b in meta(), c in meta()) {
            let mut sorted = vec![a, b, c];
            sorted.sort_by(causal_cmp);
            prop_assert_ne!(causal_cmp(&sorted[0], &sorted[1]), Ordering::Greater);
            prop_assert_ne!(causal_cmp(&sorted[1], &sorted[2]), Ordering::Greater);
            prop_assert_ne!(causal_cmp(&sorted[0], &sorted[2]), Ordering::Greater);
        }
    }
}
