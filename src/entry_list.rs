//! EntryList: the single shared list of all live entries.
//!
//! Entries are stored in a generational slot arena; links are arena keys.
//! The sentinel is the list's `head` field rather than a node, so it is
//! addressed as [`Link::Sentinel`] and never moves with the list. Moving,
//! swapping or relinking the list therefore never invalidates an anchor.

use crate::allocator::{AllocError, Allocator};
use core::alloc::Layout;
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Arena key of one entry.
    pub(crate) struct EntryKey;
}

/// A position in the list: the sentinel or a live entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Link {
    Sentinel,
    Entry(EntryKey),
}

#[derive(Clone, Debug)]
pub(crate) struct Entry<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    /// Full hash of `key`, computed once at insertion.
    pub(crate) hash: u64,
    /// `hash % capacity` for the current bucket capacity.
    pub(crate) bucket: usize,
    pub(crate) next: Option<EntryKey>,
}

impl<K, V> Entry<K, V> {
    pub(crate) fn new(key: K, value: V, hash: u64, bucket: usize) -> Self {
        Self {
            key,
            value,
            hash,
            bucket,
            next: None,
        }
    }
}

pub(crate) struct EntryList<K, V, A: Allocator> {
    head: Option<EntryKey>,
    slots: SlotMap<EntryKey, Entry<K, V>>,
    alloc: A,
}

impl<K, V, A: Allocator> EntryList<K, V, A> {
    pub(crate) fn new_in(alloc: A) -> Self {
        Self {
            head: None,
            slots: SlotMap::with_key(),
            alloc,
        }
    }

    #[inline]
    fn entry_layout() -> Layout {
        Layout::new::<Entry<K, V>>()
    }

    pub(crate) fn allocator(&self) -> &A {
        &self.alloc
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// First entry after the sentinel.
    #[inline]
    pub(crate) fn head(&self) -> Option<EntryKey> {
        self.head
    }

    #[inline]
    pub(crate) fn get(&self, k: EntryKey) -> Option<&Entry<K, V>> {
        self.slots.get(k)
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, k: EntryKey) -> Option<&mut Entry<K, V>> {
        self.slots.get_mut(k)
    }

    /// Live entry `k`. Panics if `k` is stale, which the map never allows
    /// for keys reached through links or anchors.
    #[inline]
    pub(crate) fn entry(&self, k: EntryKey) -> &Entry<K, V> {
        &self.slots[k]
    }

    #[inline]
    pub(crate) fn entry_mut(&mut self, k: EntryKey) -> &mut Entry<K, V> {
        &mut self.slots[k]
    }

    #[inline]
    pub(crate) fn next_of(&self, pos: Link) -> Option<EntryKey> {
        match pos {
            Link::Sentinel => self.head,
            Link::Entry(k) => self.slots[k].next,
        }
    }

    #[inline]
    fn set_next(&mut self, pos: Link, next: Option<EntryKey>) {
        match pos {
            Link::Sentinel => self.head = next,
            Link::Entry(k) => self.slots[k].next = next,
        }
    }

    /// Place `entry` in the arena, detached from the list. The caller must
    /// link it before returning control to user code.
    pub(crate) fn allocate(&mut self, entry: Entry<K, V>) -> Result<EntryKey, AllocError> {
        self.alloc.allocate(Self::entry_layout())?;
        Ok(self.slots.insert(entry))
    }

    /// Splice the detached entry `k` directly after `pos`.
    #[inline]
    pub(crate) fn link_after(&mut self, pos: Link, k: EntryKey) {
        let next = self.next_of(pos);
        self.slots[k].next = next;
        self.set_next(pos, Some(k));
    }

    /// Unlink the entry after `pos` and release its storage.
    pub(crate) fn unlink_after(&mut self, pos: Link) -> Option<Entry<K, V>> {
        let k = self.next_of(pos)?;
        let next = self.slots[k].next;
        self.set_next(pos, next);
        let entry = self.slots.remove(k)?;
        self.alloc.deallocate(Self::entry_layout());
        Some(entry)
    }

    /// Make the sentinel forget the chain and return its old first entry.
    /// Entries stay in the arena and keep their `next` links so the caller
    /// can walk and relink them.
    #[inline]
    pub(crate) fn detach_all(&mut self) -> Option<EntryKey> {
        self.head.take()
    }

    pub(crate) fn clear(&mut self) {
        self.release_all();
        self.head = None;
        self.slots.clear();
    }

    fn release_all(&self) {
        let layout = Self::entry_layout();
        for _ in 0..self.slots.len() {
            self.alloc.deallocate(layout);
        }
    }

    /// Keys in list order.
    pub(crate) fn keys(&self) -> Keys<'_, K, V, A> {
        Keys {
            list: self,
            cur: self.head,
            remaining: self.slots.len(),
        }
    }

    /// All entries in arena order.
    pub(crate) fn arena_iter_mut(&mut self) -> slotmap::basic::IterMut<'_, EntryKey, Entry<K, V>> {
        self.slots.iter_mut()
    }

    /// An independent copy holding equal entries under the same arena keys,
    /// so links, anchors and cursors mean the same thing in both lists.
    /// Every entry is charged to a clone of this list's allocator before the
    /// arena is copied; on refusal the charges taken so far are returned.
    pub(crate) fn try_clone(&self) -> Result<Self, AllocError>
    where
        K: Clone,
        V: Clone,
    {
        let layout = Self::entry_layout();
        let alloc = self.alloc.clone();
        for charged in 0..self.slots.len() {
            if let Err(e) = alloc.allocate(layout) {
                for _ in 0..charged {
                    alloc.deallocate(layout);
                }
                return Err(e);
            }
        }
        Ok(Self {
            head: self.head,
            slots: self.slots.clone(),
            alloc,
        })
    }
}

impl<K, V, A: Allocator> Drop for EntryList<K, V, A> {
    fn drop(&mut self) {
        self.release_all();
    }
}

/// List-order walk over entry keys.
pub(crate) struct Keys<'a, K, V, A: Allocator> {
    list: &'a EntryList<K, V, A>,
    cur: Option<EntryKey>,
    remaining: usize,
}

impl<'a, K, V, A: Allocator> Keys<'a, K, V, A> {
    pub(crate) fn list(&self) -> &'a EntryList<K, V, A> {
        self.list
    }
}

impl<'a, K, V, A: Allocator> Iterator for Keys<'a, K, V, A> {
    type Item = EntryKey;

    #[inline]
    fn next(&mut self) -> Option<EntryKey> {
        let k = self.cur?;
        self.cur = self.list.entry(k).next;
        self.remaining -= 1;
        Some(k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{Budget, Global};

    fn order<K: Copy, V, A: Allocator>(l: &EntryList<K, V, A>) -> Vec<K> {
        l.keys().map(|k| l.entry(k).key).collect()
    }

    #[test]
    fn link_after_sentinel_prepends() {
        let mut l: EntryList<u32, (), Global> = EntryList::new_in(Global);
        for i in 0..3 {
            let k = l.allocate(Entry::new(i, (), 0, 0)).unwrap();
            l.link_after(Link::Sentinel, k);
        }
        assert_eq!(order(&l), vec![2, 1, 0]);
        assert_eq!(l.len(), 3);
    }

    #[test]
    fn link_and_unlink_in_the_middle() {
        let mut l: EntryList<u32, (), Global> = EntryList::new_in(Global);
        let a = l.allocate(Entry::new(1, (), 0, 0)).unwrap();
        l.link_after(Link::Sentinel, a);
        let c = l.allocate(Entry::new(3, (), 0, 0)).unwrap();
        l.link_after(Link::Entry(a), c);
        let b = l.allocate(Entry::new(2, (), 0, 0)).unwrap();
        l.link_after(Link::Entry(a), b);
        assert_eq!(order(&l), vec![1, 2, 3]);

        let removed = l.unlink_after(Link::Entry(a)).unwrap();
        assert_eq!(removed.key, 2);
        assert_eq!(order(&l), vec![1, 3]);
        assert!(l.get(b).is_none());
        assert!(l.unlink_after(Link::Entry(c)).is_none());
    }

    #[test]
    fn detach_keeps_entries_and_links() {
        let mut l: EntryList<u32, (), Global> = EntryList::new_in(Global);
        for i in 0..3 {
            let k = l.allocate(Entry::new(i, (), 0, 0)).unwrap();
            l.link_after(Link::Sentinel, k);
        }
        let first = l.detach_all().unwrap();
        assert_eq!(l.head(), None);
        assert_eq!(l.len(), 3);
        let second = l.entry(first).next.unwrap();
        assert_eq!(l.entry(second).key, 1);
    }

    #[test]
    fn try_clone_preserves_order_and_independence() {
        let mut l: EntryList<u32, String, Global> = EntryList::new_in(Global);
        for i in 0..4 {
            let k = l.allocate(Entry::new(i, i.to_string(), u64::from(i), 0)).unwrap();
            l.link_after(Link::Sentinel, k);
        }
        let mut copy = l.try_clone().unwrap();
        assert_eq!(order(&copy), order(&l));
        assert!(l.keys().eq(copy.keys()), "arena keys carry over");
        let first = copy.head().unwrap();
        copy.entry_mut(first).value.push('!');
        assert_eq!(l.entry(l.head().unwrap()).value, "3");
        assert_eq!(copy.entry(first).value, "3!");
    }

    #[test]
    fn charges_are_released_on_unlink_clear_and_drop() {
        let budget = Budget::new(1 << 20);
        let mut l: EntryList<u64, u64, Budget> = EntryList::new_in(budget.clone());
        let one = Layout::new::<Entry<u64, u64>>().size();
        for i in 0..4 {
            let k = l.allocate(Entry::new(i, i, i, 0)).unwrap();
            l.link_after(Link::Sentinel, k);
        }
        assert_eq!(budget.used(), 4 * one);
        l.unlink_after(Link::Sentinel).unwrap();
        assert_eq!(budget.used(), 3 * one);
        let copy = l.try_clone().unwrap();
        assert_eq!(budget.used(), 6 * one);
        l.clear();
        assert_eq!(budget.used(), 3 * one);
        drop(copy);
        assert_eq!(budget.used(), 0);
    }

    #[test]
    fn refused_clone_releases_partial_copy() {
        let one = Layout::new::<Entry<u64, u64>>().size();
        let budget = Budget::new(5 * one);
        let mut l: EntryList<u64, u64, Budget> = EntryList::new_in(budget.clone());
        for i in 0..3 {
            let k = l.allocate(Entry::new(i, i, i, 0)).unwrap();
            l.link_after(Link::Sentinel, k);
        }
        assert!(matches!(l.try_clone(), Err(AllocError::Refused(_))));
        assert_eq!(budget.used(), 3 * one);
    }
}
