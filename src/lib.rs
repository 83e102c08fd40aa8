//! anchor-map: a single-threaded hash map that keeps all entries on one
//! singly linked list, grouped by bucket, with O(1) access to each bucket
//! through a per-bucket anchor.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: amortized O(1) insert/find/erase, entry handles that survive
//!   growth, pluggable storage admission, and deterministic iteration in
//!   which every bucket's entries are adjacent.
//! - Layers:
//!   - EntryList<K, V, A>: slot arena holding every entry plus the
//!     sentinel-headed singly linked list threading them. Owns entry
//!     storage and charges it to the allocator.
//!   - BucketIndex<A>: flat array, one slot per bucket; a slot is empty or
//!     names the list position just before that bucket's run.
//!   - AnchorMap<K, V, S, A>: hashing, probing, the insert/erase anchor
//!     bookkeeping, the growth policy, copy/move/swap. Public surface.
//!   - Cursor: `Copy` handle on one entry, resolved against its map.
//!
//! Constraints
//! - Grouping: entries of one bucket form one contiguous run.
//! - Anchors: a non-empty bucket's anchor precedes exactly its run's first
//!   entry; an empty bucket has no anchor.
//! - Unique keys; duplicate inserts report the existing entry.
//! - After an insert returns successfully, `len / capacity <=
//!   max_load_factor`. Growth is synchronous, to at least
//!   `capacity * 2 + 1` buckets, and never shrinks (only `reset` does).
//! - Entries never move: rehash relinks arena keys, it does not copy.
//!
//! Why an arena?
//! - Links and anchors are generational arena keys, and the sentinel is a
//!   list field addressed as `Link::Sentinel`, not a node with an address.
//!   Moving or swapping a map is therefore a plain Rust move; no anchor ever
//!   needs patching, and a stale cursor resolves to `None` instead of
//!   dangling.
//!
//! Failure model
//! - Hashing and probing (the only places user `Hash`/`Eq` code runs)
//!   happen before any structural change, so a panic there leaves the map
//!   untouched.
//! - Each entry's full hash is cached at insertion; rehashing reduces it
//!   modulo the new capacity and never calls user code.
//! - A rehash obtains its new bucket array before touching anything; a
//!   refusal leaves the previous state intact. When that happens right
//!   after an insert, the insert stands and `Error::GrowthFailed` says so.
//! - Storage owners (`EntryList`, `BucketIndex`) release their allocator
//!   charges on drop, so partially built copies clean up on every path.
//!
//! Reentrancy
//! - A debug-only guard wraps each section that runs user `Hash`/`Eq`
//!   code; re-entering the same map from inside it panics in debug builds.
//!
//! Non-goals
//! - No concurrent access (the map is `!Sync`), no serialization, no open
//!   addressing, no shrink on erase.

pub mod allocator;
pub mod anchor_map;
mod anchor_map_proptest;
mod bucket_index;
pub mod cursor;
mod entry_list;
pub mod error;
mod reentrancy;
mod test_support;

// Public surface
pub use allocator::{AllocError, Allocator, Budget, Global};
pub use anchor_map::{AnchorMap, DEFAULT_MAX_LOAD_FACTOR, START_CAPACITY};
pub use cursor::{Cursor, Cursors, Iter, IterMut};
pub use error::Error;
