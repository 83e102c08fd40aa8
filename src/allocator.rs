//! Allocation strategies for entries and bucket arrays.
//!
//! Entries live in a slot arena, so the map never hands raw memory to an
//! allocator. Instead every acquisition (one `Entry` at a time, or one
//! bucket array per rehash) is admitted by an [`Allocator`] before it
//! happens and released to it when the storage goes away. An allocator
//! that refuses makes the triggering operation fail with [`AllocError`]
//! and leaves the map untouched.

use core::alloc::Layout;
use core::cell::Cell;
use std::rc::Rc;
use thiserror::Error;

/// Failure to obtain storage.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum AllocError {
    /// The allocator declined a request of this layout.
    #[error("allocator refused a request of {} bytes", .0.size())]
    Refused(Layout),
    /// The requested capacity does not fit in the address space.
    #[error("requested capacity exceeds the addressable range")]
    CapacityOverflow,
}

/// Storage admission strategy shared between a map and its copies.
///
/// Clones must refer to the same underlying resource: a map and everything
/// cloned from it charge the same allocator.
pub trait Allocator: Clone {
    /// Admit storage for `layout`, or refuse it.
    fn allocate(&self, layout: Layout) -> Result<(), AllocError>;

    /// Return storage previously admitted with the same `layout`.
    fn deallocate(&self, layout: Layout);
}

/// The process allocator. Always admits.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Global;

impl Allocator for Global {
    #[inline]
    fn allocate(&self, _layout: Layout) -> Result<(), AllocError> {
        Ok(())
    }

    #[inline]
    fn deallocate(&self, _layout: Layout) {}
}

#[derive(Debug)]
struct BudgetState {
    limit: usize,
    used: Cell<usize>,
    peak: Cell<usize>,
}

/// A byte budget shared by every map holding a clone of it.
///
/// Requests that would push usage past the limit are refused.
///
/// ```
/// use anchor_map::{AnchorMap, Budget};
/// use std::collections::hash_map::RandomState;
///
/// let budget = Budget::new(64 * 1024);
/// let mut m: AnchorMap<u32, u32, RandomState, Budget> =
///     AnchorMap::with_hasher_in(RandomState::new(), budget.clone()).unwrap();
/// m.insert(1, 2).unwrap();
/// assert!(budget.used() > 0);
/// drop(m);
/// assert_eq!(budget.used(), 0);
/// ```
#[derive(Clone, Debug)]
pub struct Budget {
    state: Rc<BudgetState>,
}

impl Budget {
    pub fn new(limit: usize) -> Self {
        Self {
            state: Rc::new(BudgetState {
                limit,
                used: Cell::new(0),
                peak: Cell::new(0),
            }),
        }
    }

    pub fn limit(&self) -> usize {
        self.state.limit
    }

    /// Bytes currently admitted and not yet returned.
    pub fn used(&self) -> usize {
        self.state.used.get()
    }

    pub fn remaining(&self) -> usize {
        self.state.limit - self.state.used.get()
    }

    /// Highest value `used` has reached.
    pub fn peak(&self) -> usize {
        self.state.peak.get()
    }
}

impl Allocator for Budget {
    fn allocate(&self, layout: Layout) -> Result<(), AllocError> {
        let used = self.state.used.get();
        match used.checked_add(layout.size()) {
            Some(n) if n <= self.state.limit => {
                self.state.used.set(n);
                if n > self.state.peak.get() {
                    self.state.peak.set(n);
                }
                Ok(())
            }
            _ => Err(AllocError::Refused(layout)),
        }
    }

    fn deallocate(&self, layout: Layout) {
        let used = self.state.used.get();
        debug_assert!(used >= layout.size(), "Budget released more than admitted");
        self.state.used.set(used.saturating_sub(layout.size()));
    }
}

/// Escalate an allocation failure on a surface that cannot return it.
pub(crate) fn handle_error(e: AllocError) -> ! {
    match e {
        AllocError::Refused(layout) => std::alloc::handle_alloc_error(layout),
        AllocError::CapacityOverflow => panic!("capacity overflow"),
    }
}
