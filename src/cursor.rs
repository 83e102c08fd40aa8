//! Cursors and iterators over `AnchorMap` entries.

use crate::allocator::Allocator;
use crate::anchor_map::AnchorMap;
use crate::entry_list::{Entry, EntryKey, Keys};
use core::iter::FusedIterator;

/// A stable, forward-only position on one entry of an [`AnchorMap`].
///
/// Cursors stay valid across inserts and rehashes and are resolved against
/// the map they came from or a copy of it (`try_clone`/`Clone` keep every
/// entry's cursor). Once their entry is erased they resolve to `None`, even
/// if the arena later reuses the slot for another entry. Resolving a cursor
/// against an unrelated map is a logic error: it may name any entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Cursor(EntryKey);

impl Cursor {
    pub(crate) fn new(k: EntryKey) -> Self {
        Cursor(k)
    }

    pub(crate) fn raw(&self) -> EntryKey {
        self.0
    }

    fn entry<'a, K, V, S, A: Allocator>(&self, map: &'a AnchorMap<K, V, S, A>) -> Option<&'a Entry<K, V>> {
        map.list().get(self.0)
    }

    pub fn key<'a, K, V, S, A: Allocator>(&self, map: &'a AnchorMap<K, V, S, A>) -> Option<&'a K> {
        self.entry(map).map(|e| &e.key)
    }

    pub fn value<'a, K, V, S, A: Allocator>(&self, map: &'a AnchorMap<K, V, S, A>) -> Option<&'a V> {
        self.entry(map).map(|e| &e.value)
    }

    pub fn value_mut<'a, K, V, S, A: Allocator>(
        &self,
        map: &'a mut AnchorMap<K, V, S, A>,
    ) -> Option<&'a mut V> {
        map.list_mut().get_mut(self.0).map(|e| &mut e.value)
    }

    /// Bucket the entry currently belongs to. Changes when the map rehashes.
    pub fn bucket<K, V, S, A: Allocator>(&self, map: &AnchorMap<K, V, S, A>) -> Option<usize> {
        self.entry(map).map(|e| e.bucket)
    }

    /// The following entry in iteration order, or `None` at the end (or if
    /// this cursor is stale).
    pub fn next<K, V, S, A: Allocator>(&self, map: &AnchorMap<K, V, S, A>) -> Option<Cursor> {
        self.entry(map).and_then(|e| e.next).map(Cursor)
    }
}

/// Entries in list order: every bucket's entries are adjacent.
pub struct Iter<'a, K, V, A: Allocator> {
    keys: Keys<'a, K, V, A>,
}

impl<'a, K, V, A: Allocator> Iter<'a, K, V, A> {
    pub(crate) fn new(keys: Keys<'a, K, V, A>) -> Self {
        Self { keys }
    }
}

impl<'a, K, V, A: Allocator> Iterator for Iter<'a, K, V, A> {
    type Item = (&'a K, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let k = self.keys.next()?;
        let e = self.keys.list().entry(k);
        Some((&e.key, &e.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.keys.size_hint()
    }
}

impl<K, V, A: Allocator> ExactSizeIterator for Iter<'_, K, V, A> {}
impl<K, V, A: Allocator> FusedIterator for Iter<'_, K, V, A> {}

/// Cursors in list order.
pub struct Cursors<'a, K, V, A: Allocator> {
    keys: Keys<'a, K, V, A>,
}

impl<'a, K, V, A: Allocator> Cursors<'a, K, V, A> {
    pub(crate) fn new(keys: Keys<'a, K, V, A>) -> Self {
        Self { keys }
    }
}

impl<K, V, A: Allocator> Iterator for Cursors<'_, K, V, A> {
    type Item = Cursor;

    #[inline]
    fn next(&mut self) -> Option<Cursor> {
        self.keys.next().map(Cursor)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.keys.size_hint()
    }
}

impl<K, V, A: Allocator> ExactSizeIterator for Cursors<'_, K, V, A> {}
impl<K, V, A: Allocator> FusedIterator for Cursors<'_, K, V, A> {}

/// Mutable access to every value, in unspecified (arena) order.
pub struct IterMut<'a, K, V> {
    it: slotmap::basic::IterMut<'a, EntryKey, Entry<K, V>>,
}

impl<'a, K, V> IterMut<'a, K, V> {
    pub(crate) fn new(it: slotmap::basic::IterMut<'a, EntryKey, Entry<K, V>>) -> Self {
        Self { it }
    }
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it.next().map(|(_, e)| (&e.key, &mut e.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.it.size_hint()
    }
}
