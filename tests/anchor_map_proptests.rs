use anchor_map::{AllocError, AnchorMap, Budget, Cursor, Error};
use proptest::prelude::*;
use std::collections::hash_map::RandomState;
use std::collections::{BTreeMap, HashSet};

fn assert_grouped<V, A: anchor_map::Allocator>(m: &AnchorMap<u16, V, RandomState, A>) -> Result<(), TestCaseError> {
    let mut seen = HashSet::new();
    let mut current = None;
    for c in m.cursors() {
        let b = c.bucket(m).expect("live cursor");
        if current != Some(b) {
            prop_assert!(seen.insert(b), "bucket {} split into two runs", b);
            current = Some(b);
        }
    }
    Ok(())
}

// Random insert/erase/lookup against a BTreeMap model through the public API.
proptest! {
    #[test]
    fn prop_matches_model(ops in proptest::collection::vec((0u8..=4u8, 0u16..64, any::<u32>()), 1..300)) {
        let mut m: AnchorMap<u16, u32> = AnchorMap::with_buckets(3);
        let mut model = BTreeMap::new();
        let mut cursors: BTreeMap<u16, Cursor> = BTreeMap::new();

        for (op, k, v) in ops {
            match op {
                // Insert keeps the first value
                0 | 1 => {
                    let (c, inserted) = m.insert(k, v).unwrap();
                    prop_assert_eq!(inserted, !model.contains_key(&k));
                    model.entry(k).or_insert(v);
                    cursors.entry(k).or_insert(c);
                    prop_assert_eq!(cursors.get(&k), Some(&c));
                }
                // Erase by cursor
                2 => {
                    if let Some(c) = cursors.remove(&k) {
                        let (kk, vv) = m.erase(c).expect("live cursor");
                        prop_assert_eq!(kk, k);
                        prop_assert_eq!(Some(vv), model.remove(&k));
                        prop_assert!(c.value(&m).is_none());
                    }
                }
                // Remove by key
                3 => {
                    prop_assert_eq!(m.remove(&k), model.remove(&k));
                    cursors.remove(&k);
                }
                // Lookup
                4 => {
                    prop_assert_eq!(m.get(&k), model.get(&k));
                    prop_assert_eq!(m.find(&k), cursors.get(&k).copied());
                }
                _ => unreachable!(),
            }
            prop_assert_eq!(m.len(), model.len());
            prop_assert!(m.load_factor() <= m.max_load_factor());
        }

        assert_grouped(&m)?;
        let got: BTreeMap<u16, u32> = m.iter().map(|(k, v)| (*k, *v)).collect();
        prop_assert_eq!(got, model);
    }

    // Under a tight byte budget every call either succeeds, fails leaving the
    // map unchanged, or reports an insert whose growth was refused.
    #[test]
    fn prop_budget_failures_are_clean(limit in 0usize..8_192, keys in proptest::collection::vec(0u16..512, 1..200)) {
        let budget = Budget::new(limit);
        let mut m = match AnchorMap::with_hasher_in(RandomState::new(), budget.clone()) {
            Ok(m) => m,
            Err(e) => {
                prop_assert!(matches!(e, AllocError::Refused(_)));
                prop_assert_eq!(budget.used(), 0);
                return Ok(());
            }
        };
        let mut model = HashSet::new();
        for k in keys {
            let before = m.len();
            match m.insert(k, u64::from(k)) {
                Ok((_, inserted)) => {
                    prop_assert_eq!(inserted, model.insert(k));
                }
                Err(Error::Alloc(_)) => {
                    prop_assert!(!model.contains(&k));
                    prop_assert_eq!(m.len(), before);
                }
                Err(Error::GrowthFailed { entry, .. }) => {
                    prop_assert!(model.insert(k));
                    prop_assert_eq!(entry.key(&m), Some(&k));
                }
                Err(e) => prop_assert!(false, "unexpected error {:?}", e),
            }
            prop_assert!(budget.used() <= budget.limit());
            prop_assert_eq!(m.len(), model.len());
        }
        assert_grouped(&m)?;
        for k in &model {
            prop_assert_eq!(m.get(k), Some(&u64::from(*k)));
        }
        drop(m);
        prop_assert_eq!(budget.used(), 0);
    }
}
