//! AnchorMap: one shared entry list plus a per-bucket anchor index.
//!
//! Every entry sits on a single singly linked list, and the entries of one
//! bucket always form one contiguous run on it. `BucketIndex[b]` holds the
//! position just before bucket `b`'s run, which gives O(1) access to the run
//! and an O(1) "bucket is empty" test without a doubly linked list.
//!
//! Insertion into an empty bucket pushes the entry at the front of the list
//! (the bucket that used to lead is re-anchored on the new entry); insertion
//! into a non-empty bucket splices right after its anchor. Erasing the last
//! entry of a run re-anchors the following run on the erased entry's
//! predecessor.

use crate::allocator::{self, AllocError, Allocator, Global};
use crate::bucket_index::BucketIndex;
use crate::cursor::{Cursor, Cursors, Iter, IterMut};
use crate::entry_list::{Entry, EntryKey, EntryList, Link};
use crate::error::Error;
use crate::reentrancy::DebugReentrancy;
use core::borrow::Borrow;
use core::convert::Infallible;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use std::collections::hash_map::RandomState;

/// Bucket count of a freshly constructed map.
pub const START_CAPACITY: usize = 15;

/// Default upper bound on `len / capacity`.
pub const DEFAULT_MAX_LOAD_FACTOR: f32 = 1.0;

/// A hash map whose entries keep stable positions and iterate grouped by
/// bucket.
///
/// ```
/// use anchor_map::AnchorMap;
///
/// let mut m = AnchorMap::new();
/// let (c, inserted) = m.insert("a", 1).unwrap();
/// assert!(inserted);
/// assert_eq!(m.get("a"), Some(&1));
/// assert_eq!(c.value(&m), Some(&1));
/// assert_eq!(m.erase(c), Some(("a", 1)));
/// assert!(m.is_empty());
/// ```
pub struct AnchorMap<K, V, S = RandomState, A: Allocator = Global> {
    hasher: S,
    max_load_factor: f32,
    index: BucketIndex<A>,
    entries: EntryList<K, V, A>,
    reentrancy: DebugReentrancy,
}

impl<K, V> AnchorMap<K, V> {
    pub fn new() -> Self {
        Self::with_hasher(RandomState::new())
    }

    /// A map starting with `buckets` buckets (at least one).
    pub fn with_buckets(buckets: usize) -> Self {
        Self::with_buckets_and_hasher(buckets, RandomState::new())
    }
}

impl<K, V, S> AnchorMap<K, V, S, Global> {
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_buckets_and_hasher(START_CAPACITY, hasher)
    }

    pub fn with_buckets_and_hasher(buckets: usize, hasher: S) -> Self {
        match Self::with_buckets_and_hasher_in(buckets, hasher, Global) {
            Ok(m) => m,
            Err(e) => allocator::handle_error(e),
        }
    }
}

impl<K, V, S, A: Allocator> AnchorMap<K, V, S, A> {
    pub fn with_hasher_in(hasher: S, alloc: A) -> Result<Self, AllocError> {
        Self::with_buckets_and_hasher_in(START_CAPACITY, hasher, alloc)
    }

    /// A map with `buckets` buckets (at least one) whose storage is admitted
    /// by `alloc`. Fails if the bucket array is refused.
    pub fn with_buckets_and_hasher_in(buckets: usize, hasher: S, alloc: A) -> Result<Self, AllocError> {
        let index = BucketIndex::try_new_in(buckets.max(1), alloc.clone())?;
        Ok(Self {
            hasher,
            max_load_factor: DEFAULT_MAX_LOAD_FACTOR,
            index,
            entries: EntryList::new_in(alloc),
            reentrancy: DebugReentrancy::new(),
        })
    }

    pub(crate) fn list(&self) -> &EntryList<K, V, A> {
        &self.entries
    }

    pub(crate) fn list_mut(&mut self) -> &mut EntryList<K, V, A> {
        &mut self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() == 0
    }

    /// Number of buckets.
    pub fn capacity(&self) -> usize {
        self.index.capacity()
    }

    pub fn load_factor(&self) -> f32 {
        if self.capacity() == 0 {
            return 0.0;
        }
        self.len() as f32 / self.capacity() as f32
    }

    pub fn max_load_factor(&self) -> f32 {
        self.max_load_factor
    }

    pub fn allocator(&self) -> &A {
        self.entries.allocator()
    }

    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    /// O(1). Buckets at or past `capacity()` are reported empty.
    pub fn bucket_is_empty(&self, bucket: usize) -> bool {
        self.index.is_empty(bucket)
    }

    /// Number of entries in `bucket`, found by walking its run.
    pub fn bucket_len(&self, bucket: usize) -> usize {
        let Some(anchor) = self.index.get(bucket) else {
            return 0;
        };
        let mut n = 0;
        let mut cur = self.entries.next_of(anchor);
        while let Some(k) = cur {
            let e = self.entries.entry(k);
            if e.bucket != bucket {
                break;
            }
            n += 1;
            cur = e.next;
        }
        n
    }

    /// Cursor on the first entry in iteration order.
    pub fn first(&self) -> Option<Cursor> {
        self.entries.head().map(Cursor::new)
    }

    /// Entries in list order; the entries of each bucket are adjacent.
    pub fn iter(&self) -> Iter<'_, K, V, A> {
        Iter::new(self.entries.keys())
    }

    /// Values by mutable reference, in unspecified order. Use
    /// [`for_each_mut`](Self::for_each_mut) when the order matters.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut::new(self.entries.arena_iter_mut())
    }

    /// Call `f` on every entry in the same order as [`iter`](Self::iter).
    pub fn for_each_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(&K, &mut V),
    {
        let mut cur = self.entries.head();
        while let Some(k) = cur {
            let e = self.entries.entry_mut(k);
            f(&e.key, &mut e.value);
            cur = e.next;
        }
    }

    pub fn cursors(&self) -> Cursors<'_, K, V, A> {
        Cursors::new(self.entries.keys())
    }

    #[inline]
    fn over_max_load(&self) -> bool {
        self.len() as f64 > self.capacity() as f64 * f64::from(self.max_load_factor)
    }

    /// Link the detached entry `k` into bucket `b`.
    fn link_into_bucket(&mut self, k: EntryKey, b: usize) {
        match self.index.get(b) {
            Some(anchor) => self.entries.link_after(anchor, k),
            None => {
                // The run that led the list now sits behind `k`.
                if let Some(first) = self.entries.head() {
                    let leading = self.entries.entry(first).bucket;
                    self.index.set(leading, Link::Entry(k));
                }
                self.entries.link_after(Link::Sentinel, k);
                self.index.set(b, Link::Sentinel);
            }
        }
    }

    /// Rebuild the index with at least `target` buckets. A no-op when
    /// `target <= capacity()`; otherwise grows to at least
    /// `capacity() * 2 + 1`. The new index is obtained before anything is
    /// touched, so a refusal leaves the map exactly as it was.
    fn grow_to(&mut self, target: usize) -> Result<(), AllocError> {
        let old = self.capacity();
        if target <= old {
            return Ok(());
        }
        let min = old
            .checked_mul(2)
            .and_then(|c| c.checked_add(1))
            .ok_or(AllocError::CapacityOverflow)?;
        let capacity = target.max(min);
        self.index = BucketIndex::try_new_in(capacity, self.entries.allocator().clone())?;

        let mut cur = self.entries.detach_all();
        while let Some(k) = cur {
            let e = self.entries.entry_mut(k);
            cur = e.next.take();
            e.bucket = (e.hash % capacity as u64) as usize;
            let b = e.bucket;
            self.link_into_bucket(k, b);
        }
        tracing::debug!(from = old, to = capacity, len = self.len(), "rebuilt bucket index");
        Ok(())
    }

    /// Grow the index to at least `target` buckets (see [`reserve`](Self::reserve)
    /// for sizing by element count). Never shrinks.
    pub fn rehash(&mut self, target: usize) -> Result<(), Error> {
        Ok(self.grow_to(target)?)
    }

    /// Make room for `entries` entries in total without exceeding the max
    /// load factor. Rehashes at most once.
    pub fn reserve(&mut self, entries: usize) -> Result<(), Error> {
        let mlf = f64::from(self.max_load_factor);
        let mut capacity = self.capacity();
        while (capacity as f64) * mlf < entries as f64 {
            capacity = capacity
                .checked_mul(2)
                .and_then(|c| c.checked_add(1))
                .ok_or(AllocError::CapacityOverflow)?;
        }
        Ok(self.grow_to(capacity)?)
    }

    /// Set the load threshold. If the current load already exceeds it, the
    /// map rehashes to `ceil(len / max_load_factor)` buckets right away; if
    /// that rehash is refused the previous threshold is restored.
    pub fn set_max_load_factor(&mut self, max_load_factor: f32) -> Result<(), Error> {
        if !(max_load_factor.is_finite() && max_load_factor > 0.0) {
            return Err(Error::InvalidLoadFactor(max_load_factor));
        }
        let previous = core::mem::replace(&mut self.max_load_factor, max_load_factor);
        if self.over_max_load() {
            let target = (self.len() as f64 / f64::from(max_load_factor)).ceil() as usize;
            if let Err(e) = self.grow_to(target) {
                self.max_load_factor = previous;
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Position just before `target` on the list, found by walking from
    /// `anchor`.
    fn predecessor(&self, anchor: Link, target: EntryKey) -> Option<Link> {
        let mut pos = anchor;
        loop {
            let k = self.entries.next_of(pos)?;
            if k == target {
                return Some(pos);
            }
            pos = Link::Entry(k);
        }
    }

    /// Remove the entry under `cursor` and return it. Returns `None` for a
    /// stale cursor.
    pub fn erase(&mut self, cursor: Cursor) -> Option<(K, V)> {
        let target = cursor.raw();
        let (bucket, next) = {
            let e = self.entries.get(target)?;
            (e.bucket, e.next)
        };
        let anchor = self.index.get(bucket);
        debug_assert!(anchor.is_some(), "live entry in empty bucket {bucket}");
        let pred = self.predecessor(anchor?, target)?;

        let next_bucket = next.map(|n| self.entries.entry(n).bucket);
        if next_bucket != Some(bucket) {
            // `target` ends its run.
            if Some(pred) == anchor {
                self.index.clear_slot(bucket);
            }
            if let Some(nb) = next_bucket {
                self.index.set(nb, pred);
            }
        }

        let e = self.entries.unlink_after(pred)?;
        Some((e.key, e.value))
    }

    /// Erase from `first` up to, not including, `last` (`None` meaning the
    /// end of the map). Returns how many entries were removed.
    ///
    /// If `last` is not reached, erasing stops at the end of the map. A
    /// stale `first` or `last` erases nothing.
    pub fn erase_range(&mut self, first: Cursor, last: Option<Cursor>) -> usize {
        if last.is_some_and(|c| self.entries.get(c.raw()).is_none()) {
            return 0;
        }
        let Some(bucket) = self.entries.get(first.raw()).map(|e| e.bucket) else {
            return 0;
        };
        let Some(pred) = self
            .index
            .get(bucket)
            .and_then(|anchor| self.predecessor(anchor, first.raw()))
        else {
            return 0;
        };
        let stop = last.map(|c| c.raw());
        let mut removed = 0;
        while let Some(k) = self.entries.next_of(pred) {
            if Some(k) == stop {
                break;
            }
            self.erase(Cursor::new(k));
            removed += 1;
        }
        removed
    }

    /// Drop every entry. Capacity is kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.reset();
    }

    /// Drop every entry and return to [`START_CAPACITY`] buckets. If the
    /// allocator refuses the new bucket array the map is left with no
    /// buckets and allocates them on the next insert.
    pub fn reset(&mut self) {
        self.entries.clear();
        let alloc = self.entries.allocator().clone();
        self.index = BucketIndex::unallocated(alloc.clone());
        match BucketIndex::try_new_in(START_CAPACITY, alloc) {
            Ok(index) => self.index = index,
            Err(e) => tracing::trace!(error = %e, "reset left the map without buckets"),
        }
    }

    /// Move the contents out in O(1), leaving `self` empty with no buckets
    /// and the same hasher, allocator and max load factor.
    pub fn take(&mut self) -> Self
    where
        S: Clone,
    {
        let alloc = self.entries.allocator().clone();
        let empty = Self {
            hasher: self.hasher.clone(),
            max_load_factor: self.max_load_factor,
            index: BucketIndex::unallocated(alloc.clone()),
            entries: EntryList::new_in(alloc),
            reentrancy: DebugReentrancy::new(),
        };
        tracing::trace!(len = self.len(), "moved map contents out");
        core::mem::replace(self, empty)
    }

    /// Exchange contents with `other` in O(1).
    pub fn swap(&mut self, other: &mut Self) {
        core::mem::swap(self, other);
    }

    /// Deep copy. Entries keep their relative order and their cursors, so a
    /// cursor taken on `self` names the same entry in the copy. The anchors
    /// are rebuilt from one pass over the copied list.
    pub fn try_clone(&self) -> Result<Self, AllocError>
    where
        K: Clone,
        V: Clone,
        S: Clone,
    {
        let entries = self.entries.try_clone()?;
        let mut index = BucketIndex::try_new_in(self.capacity(), entries.allocator().clone())?;
        let mut prev = Link::Sentinel;
        let mut prev_bucket = None;
        for k in entries.keys() {
            let b = entries.entry(k).bucket;
            if prev_bucket != Some(b) {
                index.set(b, prev);
                prev_bucket = Some(b);
            }
            prev = Link::Entry(k);
        }
        Ok(Self {
            hasher: self.hasher.clone(),
            max_load_factor: self.max_load_factor,
            index,
            entries,
            reentrancy: DebugReentrancy::new(),
        })
    }
}

impl<K, V, S, A> AnchorMap<K, V, S, A>
where
    K: Eq + Hash,
    S: BuildHasher,
    A: Allocator,
{
    fn make_hash<Q>(&self, q: &Q) -> u64
    where
        Q: ?Sized + Hash,
    {
        self.hasher.hash_one(q)
    }

    /// Scan the run of `hash`'s bucket for `q`.
    fn probe<Q>(&self, q: &Q, hash: u64) -> Option<EntryKey>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        if self.capacity() == 0 {
            return None;
        }
        let b = (hash % self.capacity() as u64) as usize;
        let anchor = self.index.get(b)?;
        let mut cur = self.entries.next_of(anchor);
        while let Some(k) = cur {
            let e = self.entries.entry(k);
            if e.bucket != b {
                break;
            }
            if e.key.borrow() == q {
                return Some(k);
            }
            cur = e.next;
        }
        None
    }

    fn locate<Q>(&self, op: &'static str, q: &Q) -> Option<EntryKey>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter(op);
        let hash = self.make_hash(q);
        self.probe(q, hash)
    }

    fn insert_entry<E, F>(&mut self, op: &'static str, key: K, make: F) -> Result<(Cursor, bool), Error<E>>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let (hash, found) = {
            let _g = self.reentrancy.enter(op);
            let hash = self.make_hash(&key);
            (hash, self.probe(&key, hash))
        };
        if let Some(k) = found {
            return Ok((Cursor::new(k), false));
        }

        let value = make().map_err(Error::Construction)?;
        if self.capacity() == 0 {
            self.grow_to(START_CAPACITY)?;
        }
        let b = (hash % self.capacity() as u64) as usize;
        let k = self.entries.allocate(Entry::new(key, value, hash, b))?;
        self.link_into_bucket(k, b);

        if self.over_max_load() {
            let target = self.capacity().saturating_mul(2).saturating_add(1);
            if let Err(source) = self.grow_to(target) {
                tracing::warn!(
                    len = self.len(),
                    capacity = self.capacity(),
                    error = %source,
                    "bucket index growth refused after insert"
                );
                return Err(Error::GrowthFailed {
                    entry: Cursor::new(k),
                    source,
                });
            }
        }
        Ok((Cursor::new(k), true))
    }

    /// Insert `key -> value` unless `key` is present. The flag is `false`
    /// when the key already existed; the stored value is then untouched and
    /// `key`/`value` are dropped.
    pub fn insert(&mut self, key: K, value: V) -> Result<(Cursor, bool), Error> {
        self.insert_entry("insert", key, || Ok::<V, Infallible>(value))
    }

    /// Like [`insert`](Self::insert), but builds the value only if `key` is
    /// absent.
    pub fn emplace_with<F>(&mut self, key: K, make: F) -> Result<(Cursor, bool), Error>
    where
        F: FnOnce() -> V,
    {
        self.insert_entry("emplace_with", key, || Ok::<V, Infallible>(make()))
    }

    /// Like [`emplace_with`](Self::emplace_with) with a fallible value
    /// constructor. A constructor error is returned as
    /// [`Error::Construction`] and leaves the map unchanged.
    pub fn try_emplace_with<E, F>(&mut self, key: K, make: F) -> Result<(Cursor, bool), Error<E>>
    where
        F: FnOnce() -> Result<V, E>,
    {
        self.insert_entry("try_emplace_with", key, make)
    }

    /// The value for `key`, inserting `V::default()` first if it is absent.
    pub fn get_or_insert_default(&mut self, key: K) -> Result<&mut V, Error>
    where
        V: Default,
    {
        let (cursor, _) = self.insert_entry("get_or_insert_default", key, || Ok::<V, Infallible>(V::default()))?;
        Ok(&mut self.entries.entry_mut(cursor.raw()).value)
    }

    pub fn find<Q>(&self, q: &Q) -> Option<Cursor>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.locate("find", q).map(Cursor::new)
    }

    pub fn contains_key<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.locate("contains_key", q).is_some()
    }

    pub fn get<Q>(&self, q: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let k = self.locate("get", q)?;
        Some(&self.entries.entry(k).value)
    }

    pub fn get_mut<Q>(&mut self, q: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let k = self.locate("get_mut", q)?;
        Some(&mut self.entries.entry_mut(k).value)
    }

    /// Like [`get`](Self::get), but a missing key is an error.
    pub fn at<Q>(&self, q: &Q) -> Result<&V, Error>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let k = self.locate("at", q).ok_or(Error::KeyNotFound)?;
        Ok(&self.entries.entry(k).value)
    }

    pub fn at_mut<Q>(&mut self, q: &Q) -> Result<&mut V, Error>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let k = self.locate("at_mut", q).ok_or(Error::KeyNotFound)?;
        Ok(&mut self.entries.entry_mut(k).value)
    }

    pub fn remove<Q>(&mut self, q: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let k = self.locate("remove", q)?;
        self.erase(Cursor::new(k)).map(|(_, v)| v)
    }

    /// Bucket `q` maps to under the current capacity, or `None` if the map
    /// has no buckets.
    pub fn bucket_of<Q>(&self, q: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash,
    {
        if self.capacity() == 0 {
            return None;
        }
        let hash = {
            let _g = self.reentrancy.enter("bucket_of");
            self.make_hash(q)
        };
        Some((hash % self.capacity() as u64) as usize)
    }
}

impl<K, V, S> Default for AnchorMap<K, V, S, Global>
where
    S: Default,
{
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S, A> Clone for AnchorMap<K, V, S, A>
where
    K: Clone,
    V: Clone,
    S: Clone,
    A: Allocator,
{
    fn clone(&self) -> Self {
        match self.try_clone() {
            Ok(m) => m,
            Err(e) => allocator::handle_error(e),
        }
    }
}

impl<K, V, S, A> fmt::Debug for AnchorMap<K, V, S, A>
where
    K: fmt::Debug,
    V: fmt::Debug,
    A: Allocator,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<'a, K, V, S, A: Allocator> IntoIterator for &'a AnchorMap<K, V, S, A> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V, A>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Keys already present keep their first value.
impl<K, V, S> Extend<(K, V)> for AnchorMap<K, V, S, Global>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            match self.insert(k, v) {
                Ok(_) => {}
                Err(Error::Alloc(e)) | Err(Error::GrowthFailed { source: e, .. }) => {
                    allocator::handle_error(e)
                }
                Err(_) => {}
            }
        }
    }
}

impl<K, V, S> FromIterator<(K, V)> for AnchorMap<K, V, S, Global>
where
    K: Eq + Hash,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut m = Self::with_hasher(S::default());
        m.extend(iter);
        m
    }
}

#[cfg(test)]
impl<K, V, S, A> AnchorMap<K, V, S, A>
where
    K: Eq + Hash,
    S: BuildHasher,
    A: Allocator,
{
    /// Panics unless grouping, anchor correctness, cached bucket ids and key
    /// uniqueness all hold.
    pub(crate) fn assert_invariants(&self) {
        let cap = self.capacity();
        let mut started = vec![false; cap];
        let mut prev = Link::Sentinel;
        let mut prev_bucket = None;
        let mut count = 0;
        for k in self.entries.keys() {
            let e = self.entries.entry(k);
            assert_eq!(e.hash, self.make_hash(&e.key), "stale cached hash");
            assert_eq!(e.bucket, (e.hash % cap as u64) as usize, "stale bucket id");
            if prev_bucket != Some(e.bucket) {
                assert!(!started[e.bucket], "bucket {} split into several runs", e.bucket);
                started[e.bucket] = true;
                assert_eq!(self.index.get(e.bucket), Some(prev), "wrong anchor for bucket {}", e.bucket);
                prev_bucket = Some(e.bucket);
            }
            prev = Link::Entry(k);
            count += 1;
        }
        assert_eq!(count, self.len(), "list length differs from arena size");
        for (b, seen) in started.iter().enumerate() {
            if !seen {
                assert!(self.index.is_empty(b), "empty bucket {b} has an anchor");
            }
        }
        let keys: Vec<_> = self.entries.keys().collect();
        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                assert!(self.entries.entry(*a).key != self.entries.entry(*b).key, "duplicate key");
            }
        }
    }

    pub(crate) fn anchor(&self, bucket: usize) -> Option<Link> {
        self.index.get(bucket)
    }
}
