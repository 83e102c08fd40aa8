#![cfg(test)]

// Property tests for AnchorMap kept inside the crate so every step can check
// the bucket-grouping and anchor invariants directly.

use crate::allocator::Allocator;
use crate::anchor_map::AnchorMap;
use crate::cursor::Cursor;
use crate::error::Error;
use crate::test_support::{ConstBuildHasher, Gate, IdentityBuildHasher};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::collections::hash_map::RandomState;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::BuildHasher;

// Key newtype with Borrow<str> to exercise borrowed lookup.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
struct Key(String);
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
impl std::borrow::Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// Pool-indexed operations: indices shrink to earlier keys, the pool shrinks,
// and op lists shrink in length.
#[derive(Clone, Debug)]
enum OpI {
    Insert(usize, i32),
    EmplaceWith(usize, i32),
    GetOrInsertDefault(usize),
    Erase(usize),
    Remove(usize),
    Find(usize),
    Contains(String),
    Mutate(usize, i32),
    EraseRange(usize, usize),
    SetMaxLoad(u8),
    Reserve(usize),
    CloneAndSwap,
    Take,
    Clear,
    Reset,
    Iterate,
}

fn key_from(pool: &[String], i: usize) -> Key {
    Key(pool[i].clone())
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<(OpI, Option<u8>)>)> {
    proptest::collection::vec("[a-z]{0,5}", 1..=40).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let contains_pool = proptest::sample::select(pool.clone());
        let op = prop_oneof![
            6 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::Insert(i, v)),
            2 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::EmplaceWith(i, v)),
            2 => idx.clone().prop_map(OpI::GetOrInsertDefault),
            2 => idx.clone().prop_map(OpI::Erase),
            2 => idx.clone().prop_map(OpI::Remove),
            2 => idx.clone().prop_map(OpI::Find),
            1 => prop_oneof![contains_pool, "[a-z]{0,5}"].prop_map(OpI::Contains),
            1 => (idx.clone(), any::<i32>()).prop_map(|(i, d)| OpI::Mutate(i, d)),
            1 => (0usize..64, 0usize..8).prop_map(|(s, n)| OpI::EraseRange(s, n)),
            1 => any::<u8>().prop_map(OpI::SetMaxLoad),
            1 => (0usize..200).prop_map(OpI::Reserve),
            1 => Just(OpI::CloneAndSwap),
            1 => Just(OpI::Take),
            1 => Just(OpI::Clear),
            1 => Just(OpI::Reset),
            1 => Just(OpI::Iterate),
        ];
        let refuse = proptest::option::weighted(0.3, 0u8..3);
        proptest::collection::vec((op, refuse), 1..120).prop_map(move |ops| (pool.clone(), ops))
    })
}

/// Model state mirrored next to the map under test.
#[derive(Default)]
struct Harness {
    model: HashMap<Key, i32>,
    live: HashMap<Key, Cursor>,
    stale: Vec<Cursor>,
}

impl Harness {
    fn settle_insert<E: fmt::Debug>(
        &mut self,
        res: Result<(Cursor, bool), Error<E>>,
        k: Key,
        v: i32,
        gated: bool,
    ) -> Result<(), TestCaseError> {
        let already = self.model.contains_key(&k);
        match res {
            Ok((c, true)) => {
                prop_assert!(!already, "fresh insert reported for present key");
                self.live.insert(k.clone(), c);
                self.model.insert(k, v);
            }
            Ok((c, false)) => {
                prop_assert!(already, "duplicate reported for absent key");
                prop_assert_eq!(Some(&c), self.live.get(&k));
            }
            Err(Error::GrowthFailed { entry, .. }) if gated => {
                prop_assert!(!already);
                self.live.insert(k.clone(), entry);
                self.model.insert(k, v);
            }
            Err(Error::Alloc(_)) if gated => prop_assert!(!already),
            Err(e) => prop_assert!(false, "unexpected error {:?}", e),
        }
        Ok(())
    }

    fn forget(&mut self, k: &Key) {
        if let Some(c) = self.live.remove(k) {
            self.stale.push(c);
        }
        self.model.remove(k);
    }

    fn forget_all(&mut self) {
        self.stale.extend(self.live.drain().map(|(_, c)| c));
        self.model.clear();
    }
}

// State-machine equivalence against std::collections::HashMap. After every
// operation the structural invariants are re-checked, stale cursors must not
// resolve, and (when the allocator never refuses) the load bound holds.
fn run<S, A>(
    mut sut: AnchorMap<Key, i32, S, A>,
    pool: &[String],
    ops: Vec<(OpI, Option<u8>)>,
    gate: Option<&Gate>,
) -> Result<(), TestCaseError>
where
    S: BuildHasher + Clone,
    A: Allocator,
{
    let gated = gate.is_some();
    let mut h = Harness::default();

    for (op, refuse) in ops {
        if let Some(g) = gate {
            match refuse {
                Some(n) => g.refuse_after(usize::from(n)),
                None => g.open(),
            }
        }
        match op {
            OpI::Insert(i, v) => {
                let k = key_from(pool, i);
                let res = sut.insert(k.clone(), v);
                h.settle_insert(res, k, v, gated)?;
            }
            OpI::EmplaceWith(i, v) => {
                let k = key_from(pool, i);
                let res = sut.emplace_with(k.clone(), || v);
                h.settle_insert(res, k, v, gated)?;
            }
            OpI::GetOrInsertDefault(i) => {
                let k = key_from(pool, i);
                let already = h.model.get(&k).copied();
                match sut.get_or_insert_default(k.clone()) {
                    Ok(v) => {
                        prop_assert_eq!(*v, already.unwrap_or(0));
                        if already.is_none() {
                            h.model.insert(k.clone(), 0);
                            let c = sut.find(&k).expect("just inserted");
                            h.live.insert(k, c);
                        }
                    }
                    Err(Error::GrowthFailed { entry, .. }) if gated => {
                        prop_assert!(already.is_none());
                        h.model.insert(k.clone(), 0);
                        h.live.insert(k, entry);
                    }
                    Err(Error::Alloc(_)) if gated => prop_assert!(already.is_none()),
                    Err(e) => prop_assert!(false, "unexpected error {:?}", e),
                }
            }
            OpI::Erase(i) => {
                let k = key_from(pool, i);
                if let Some(&c) = h.live.get(&k) {
                    let (kk, vv) = sut.erase(c).expect("live cursor erases");
                    prop_assert!(kk == k);
                    prop_assert_eq!(Some(vv), h.model.get(&k).copied());
                    h.forget(&k);
                } else {
                    prop_assert!(sut.find(&k).is_none());
                }
            }
            OpI::Remove(i) => {
                let k = key_from(pool, i);
                let expected = h.model.get(&k).copied();
                prop_assert_eq!(sut.remove(k.0.as_str()), expected);
                h.forget(&k);
                if let Some(b) = sut.bucket_of(&k) {
                    prop_assert_eq!(sut.bucket_is_empty(b), sut.bucket_len(b) == 0);
                }
            }
            OpI::Find(i) => {
                let k = key_from(pool, i);
                let found = sut.find(&k);
                prop_assert_eq!(found, h.live.get(&k).copied());
                prop_assert_eq!(sut.at(&k).ok().copied(), h.model.get(&k).copied());
            }
            OpI::Contains(s) => {
                let has_model = h.model.keys().any(|k| k.0 == s);
                prop_assert_eq!(sut.contains_key(s.as_str()), has_model);
            }
            OpI::Mutate(i, d) => {
                let k = key_from(pool, i);
                if let Some(&c) = h.live.get(&k) {
                    let vr = c.value_mut(&mut sut).expect("live cursor resolves");
                    *vr = vr.saturating_add(d);
                    let mv = h.model.get_mut(&k).expect("model has live key");
                    *mv = mv.saturating_add(d);
                }
            }
            OpI::EraseRange(start, count) => {
                let order: Vec<Cursor> = sut.cursors().collect();
                if !order.is_empty() {
                    let s = start % order.len();
                    let e = (s + count).min(order.len());
                    let doomed: Vec<Key> = order[s..e]
                        .iter()
                        .map(|c| c.key(&sut).cloned().expect("live"))
                        .collect();
                    let removed = sut.erase_range(order[s], order.get(e).copied());
                    prop_assert_eq!(removed, e - s);
                    for k in &doomed {
                        h.forget(k);
                    }
                }
            }
            OpI::SetMaxLoad(n) => {
                let before = sut.max_load_factor();
                let factor = f32::from(n % 8 + 1) * 0.25;
                match sut.set_max_load_factor(factor) {
                    Ok(()) => prop_assert_eq!(sut.max_load_factor(), factor),
                    Err(Error::Alloc(_)) if gated => prop_assert_eq!(sut.max_load_factor(), before),
                    Err(e) => prop_assert!(false, "unexpected error {:?}", e),
                }
            }
            OpI::Reserve(n) => {
                let before = sut.capacity();
                match sut.reserve(n) {
                    Ok(()) => prop_assert!(sut.capacity() as f64 * f64::from(sut.max_load_factor()) >= n as f64),
                    Err(Error::Alloc(_)) if gated => prop_assert_eq!(sut.capacity(), before),
                    Err(e) => prop_assert!(false, "unexpected error {:?}", e),
                }
            }
            OpI::CloneAndSwap => {
                if let Ok(mut copy) = sut.try_clone() {
                    copy.assert_invariants();
                    let a: Vec<_> = sut.iter().map(|(k, v)| (k.clone(), *v)).collect();
                    let b: Vec<_> = copy.iter().map(|(k, v)| (k.clone(), *v)).collect();
                    prop_assert_eq!(a, b, "copy must preserve order");
                    // Live and stale cursors carry over to the copy unchanged.
                    sut.swap(&mut copy);
                } else {
                    prop_assert!(gated, "clone failed without refusals");
                }
            }
            OpI::Take => {
                let moved = sut.take();
                prop_assert_eq!(sut.len(), 0);
                prop_assert_eq!(sut.capacity(), 0);
                sut = moved;
            }
            OpI::Clear => {
                let cap = sut.capacity();
                sut.clear();
                prop_assert_eq!(sut.capacity(), cap);
                h.forget_all();
            }
            OpI::Reset => {
                sut.reset();
                h.forget_all();
            }
            OpI::Iterate => {
                let s_keys: BTreeSet<_> = sut.iter().map(|(k, _)| k.clone()).collect();
                let m_keys: BTreeSet<_> = h.model.keys().cloned().collect();
                prop_assert_eq!(s_keys, m_keys);
                let mut closed = BTreeSet::new();
                let mut current = None;
                for c in sut.cursors() {
                    let b = c.bucket(&sut).expect("live");
                    if current != Some(b) {
                        prop_assert!(closed.insert(b), "bucket {} appears in two runs", b);
                        current = Some(b);
                    }
                }
            }
        }

        sut.assert_invariants();
        for &c in &h.stale {
            prop_assert!(c.value(&sut).is_none(), "stale cursor resolved");
        }
        for (k, &c) in &h.live {
            prop_assert_eq!(c.key(&sut), Some(k));
        }
        prop_assert_eq!(sut.len(), h.model.len());
        prop_assert_eq!(sut.is_empty(), h.model.is_empty());
        if !gated {
            prop_assert!(sut.len() as f64 <= sut.capacity() as f64 * f64::from(sut.max_load_factor()));
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        run(AnchorMap::with_hasher(RandomState::new()), &pool, ops, None)?;
    }

    // Every key in bucket 0: one long run, so every erase case sits inside
    // or at the end of the same run.
    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario()) {
        run(AnchorMap::with_hasher(ConstBuildHasher), &pool, ops, None)?;
    }

    // Few buckets and many keys: long runs wedged between each other.
    #[test]
    fn prop_state_machine_with_one_bucket_start((pool, ops) in arb_scenario()) {
        run(AnchorMap::with_buckets_and_hasher(1, RandomState::new()), &pool, ops, None)?;
    }

    // An allocator that refuses at random points: failed operations must
    // leave the map as it was, and refused growth must keep the insert.
    #[test]
    fn prop_state_machine_with_refusing_allocator((pool, ops) in arb_scenario()) {
        let gate = Gate::default();
        let sut = AnchorMap::with_hasher_in(RandomState::new(), gate.clone()).expect("gate starts open");
        run(sut, &pool, ops, Some(&gate))?;
        prop_assert_eq!(gate.live(), 0, "every charge released after drop");
    }
}

// Exhaustive erase over small tables: every insertion order of up to five
// keys into five buckets, then every single-key erase, checked against the
// invariants. Covers mid-run, run-tail-after-anchor and wedged-run erases.
#[test]
fn exhaustive_small_table_erase() {
    fn permutations(items: &[u64]) -> Vec<Vec<u64>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut out = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let head = rest.remove(i);
            for mut p in permutations(&rest) {
                p.insert(0, head);
                out.push(p);
            }
        }
        out
    }

    // Buckets under capacity 5: 0, 5 -> 0; 1, 6 -> 1; 2 -> 2.
    let keys = [0u64, 5, 1, 6, 2];
    for order in permutations(&keys) {
        for victim in order.iter().copied() {
            let mut m: AnchorMap<u64, u64, IdentityBuildHasher> =
                AnchorMap::with_buckets_and_hasher(5, IdentityBuildHasher);
            for &k in &order {
                m.insert(k, k * 100).unwrap();
            }
            m.assert_invariants();
            let c = m.find(&victim).unwrap();
            assert_eq!(m.erase(c), Some((victim, victim * 100)));
            m.assert_invariants();
            for &k in &order {
                assert_eq!(m.contains_key(&k), k != victim, "order {order:?}, erased {victim}");
            }
        }
    }
}
