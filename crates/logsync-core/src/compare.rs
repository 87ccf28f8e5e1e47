//! Causal ordering of log entries.
//!
//! Entries are ordered by `meta.time`, then by the origin node of their id,
//! then by the id sequence. Node and sequence compare as strings, so
//! sequence `10` sorts before `9`. Two metas with the same id compare equal.

use std::cmp::Ordering;

use crate::meta::Meta;

/// Total causal order over metas.
pub fn causal_cmp(a: &Meta, b: &Meta) -> Ordering {
    a.time
        .cmp(&b.time)
        .then_with(|| a.id.node.cmp(&b.id.node))
        .then_with(|| a.id.seq.to_string().cmp(&b.id.seq.to_string()))
}

/// Check whether `first` was created strictly before `second`.
///
/// A present meta is always younger than an absent one, so
/// `(Some, None)` is false and `(None, Some)` is true.
pub fn is_first_older(first: Option<&Meta>, second: Option<&Meta>) -> bool {
    match (first, second) {
        (Some(a), Some(b)) => causal_cmp(a, b) == Ordering::Less,
        (None, Some(_)) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionId;
    use proptest::prelude::*;

    fn meta(time: i64, node: &str, seq: u64) -> Meta {
        Meta::new(ActionId::new(time, node, seq))
    }

    fn older(a: &Meta, b: &Meta) -> bool {
        is_first_older(Some(a), Some(b))
    }

    #[test]
    fn test_compares_time_first() {
        let a = meta(1, "z", 9);
        let b = meta(2, "a", 0);
        assert!(older(&a, &b));
        assert!(!older(&b, &a));
    }

    #[test]
    fn test_uses_meta_time_not_id_time() {
        let mut a = meta(5, "a", 0);
        a.time = 100;
        let b = meta(50, "a", 0);
        assert!(older(&b, &a));
    }

    #[test]
    fn test_ties_broken_by_node_then_seq() {
        assert!(older(&meta(1, "a", 5), &meta(1, "b", 0)));
        assert!(older(&meta(1, "a", 1), &meta(1, "a", 2)));
    }

    #[test]
    fn test_sequence_compares_as_text() {
        assert!(older(&meta(1, "n", 10), &meta(1, "n", 9)));
        assert!(!older(&meta(1, "n", 9), &meta(1, "n", 10)));
        assert!(older(&meta(1, "n", 1), &meta(1, "n", 10)));
    }

    #[test]
    fn test_equal_is_not_older() {
        let a = meta(1, "a", 1);
        assert!(!older(&a, &a.clone()));
    }

    #[test]
    fn test_absent_metas() {
        let a = meta(1, "a", 1);
        assert!(!is_first_older(Some(&a), None));
        assert!(is_first_older(None, Some(&a)));
        assert!(!is_first_older(None, None));
    }

    fn arb_meta() -> impl Strategy<Value = Meta> {
        (0i64..4, "[ab]", 0u64..12).prop_map(|(t, n, s)| meta(t, &n, s))
    }

    proptest! {
        #[test]
        fn prop_exactly_one_relation(a in arb_meta(), b in arb_meta()) {
            let lt = older(&a, &b);
            let gt = older(&b, &a);
            let eq = causal_cmp(&a, &b) == Ordering::Equal;
            prop_assert_eq!([lt, gt, eq].iter().filter(|x| **x).count(), 1);
            prop_assert!(!older(&a, &a));
        }

        #[test]
        fn prop_transitive(a in arb_meta(), b in arb_meta(), c in arb_meta()) {
            if older(&a, &b) && older(&b, &c) {
                prop_assert!(older(&a, &c));
            }
        }
    }
}
