#![cfg(test)]

// Hashers and allocators shared by the in-crate tests.

use crate::allocator::{AllocError, Allocator};
use core::alloc::Layout;
use std::cell::Cell;
use std::hash::{BuildHasher, Hasher};
use std::rc::Rc;

/// Hashes a `u64` to itself, so `bucket == key % capacity`.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct IdentityBuildHasher;

pub(crate) struct IdentityHasher(u64);

impl BuildHasher for IdentityBuildHasher {
    type Hasher = IdentityHasher;
    fn build_hasher(&self) -> IdentityHasher {
        IdentityHasher(0)
    }
}

impl Hasher for IdentityHasher {
    fn write(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.0 = (self.0 << 8) | u64::from(*b);
        }
    }
    fn write_u64(&mut self, n: u64) {
        self.0 = n;
    }
    fn finish(&self) -> u64 {
        self.0
    }
}

/// Sends every key to bucket 0.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct ConstBuildHasher;

pub(crate) struct ConstHasher;

impl BuildHasher for ConstBuildHasher {
    type Hasher = ConstHasher;
    fn build_hasher(&self) -> ConstHasher {
        ConstHasher
    }
}

impl Hasher for ConstHasher {
    fn write(&mut self, _bytes: &[u8]) {}
    fn finish(&self) -> u64 {
        0
    }
}

#[derive(Debug, Default)]
struct GateState {
    /// Requests still admitted before refusing; `None` admits everything.
    budget: Cell<Option<usize>>,
    live: Cell<usize>,
}

/// Allocator that can be told to refuse after a number of requests.
#[derive(Clone, Debug, Default)]
pub(crate) struct Gate {
    state: Rc<GateState>,
}

impl Gate {
    /// Admit the next `n` requests, then refuse until `open`.
    pub(crate) fn refuse_after(&self, n: usize) {
        self.state.budget.set(Some(n));
    }

    pub(crate) fn open(&self) {
        self.state.budget.set(None);
    }

    /// Outstanding admitted requests.
    pub(crate) fn live(&self) -> usize {
        self.state.live.get()
    }
}

impl Allocator for Gate {
    fn allocate(&self, layout: Layout) -> Result<(), AllocError> {
        match self.state.budget.get() {
            Some(0) => return Err(AllocError::Refused(layout)),
            Some(n) => self.state.budget.set(Some(n - 1)),
            None => {}
        }
        self.state.live.set(self.state.live.get() + 1);
        Ok(())
    }

    fn deallocate(&self, _layout: Layout) {
        let live = self.state.live.get();
        assert!(live > 0, "Gate released more than admitted");
        self.state.live.set(live - 1);
    }
}
