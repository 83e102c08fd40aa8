//! Error type for fallible map operations.

use crate::allocator::AllocError;
use crate::cursor::Cursor;
use core::convert::Infallible;
use thiserror::Error;

/// Errors reported by [`AnchorMap`](crate::AnchorMap).
///
/// `E` is the error type of a user-supplied value constructor
/// (see [`AnchorMap::try_emplace_with`](crate::AnchorMap::try_emplace_with));
/// every other operation uses the default `Infallible`.
#[derive(Debug, Error)]
pub enum Error<E = Infallible> {
    /// `at`/`at_mut` on a key that is not present.
    #[error("key not found")]
    KeyNotFound,

    /// The allocator refused storage; the map is unchanged.
    #[error(transparent)]
    Alloc(#[from] AllocError),

    /// The entry was inserted, but growing the bucket index afterwards was
    /// refused. The map is consistent at its previous capacity and `entry`
    /// refers to the new entry.
    #[error("entry inserted but the bucket index could not grow: {source}")]
    GrowthFailed { entry: Cursor, source: AllocError },

    /// `set_max_load_factor` was given a non-finite or non-positive value.
    #[error("invalid max load factor {0}")]
    InvalidLoadFactor(f32),

    /// The value constructor failed; nothing was allocated.
    #[error("value construction failed: {0}")]
    Construction(E),
}
