//! BucketIndex: one anchor slot per bucket.
//!
//! Slot `b` is `None` when bucket `b` is empty, otherwise the list position
//! immediately before the first entry of the bucket's run. This module only
//! stores anchors; all scanning lives in the map.

use crate::allocator::{AllocError, Allocator};
use crate::entry_list::Link;
use core::alloc::Layout;

pub(crate) struct BucketIndex<A: Allocator> {
    slots: Vec<Option<Link>>,
    alloc: A,
}

impl<A: Allocator> BucketIndex<A> {
    /// An index with no buckets; allocates nothing.
    pub(crate) fn unallocated(alloc: A) -> Self {
        Self {
            slots: Vec::new(),
            alloc,
        }
    }

    /// An all-empty index of `capacity` buckets, charged to `alloc`.
    pub(crate) fn try_new_in(capacity: usize, alloc: A) -> Result<Self, AllocError> {
        if capacity == 0 {
            return Ok(Self::unallocated(alloc));
        }
        let layout = Self::array_layout(capacity)?;
        alloc.allocate(layout)?;
        let mut slots = Vec::new();
        if slots.try_reserve_exact(capacity).is_err() {
            alloc.deallocate(layout);
            return Err(AllocError::Refused(layout));
        }
        slots.resize(capacity, None);
        Ok(Self { slots, alloc })
    }

    fn array_layout(capacity: usize) -> Result<Layout, AllocError> {
        Layout::array::<Option<Link>>(capacity).map_err(|_| AllocError::CapacityOverflow)
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Anchor of `bucket`; `None` if it is empty or out of range.
    #[inline]
    pub(crate) fn get(&self, bucket: usize) -> Option<Link> {
        self.slots.get(bucket).copied().flatten()
    }

    #[inline]
    pub(crate) fn set(&mut self, bucket: usize, anchor: Link) {
        self.slots[bucket] = Some(anchor);
    }

    #[inline]
    pub(crate) fn clear_slot(&mut self, bucket: usize) {
        self.slots[bucket] = None;
    }

    /// O(1); buckets past the end count as empty.
    #[inline]
    pub(crate) fn is_empty(&self, bucket: usize) -> bool {
        self.get(bucket).is_none()
    }

    /// Mark every bucket empty, keeping the capacity.
    pub(crate) fn reset(&mut self) {
        self.slots.fill(None);
    }
}

impl<A: Allocator> Drop for BucketIndex<A> {
    fn drop(&mut self) {
        if let Ok(layout) = Self::array_layout(self.slots.len()) {
            if layout.size() != 0 {
                self.alloc.deallocate(layout);
            }
        }
    }
}
