//! Dense id allocation for offload layouts
//!
//! Layout resources arrive from clients keyed by arbitrary integers or names,
//! while the offload controller addresses them with small dense integers. An
//! [`IdAllocator`] hands out those integers once per layout session and
//! remembers which key received which id.
//!
//! Some integers are fixed by the system (built-in fonts, system bitmaps) and
//! must never be handed out automatically. A reservation predicate supplied at
//! construction marks them; a client that uses a reserved integer as its key
//! gets that exact integer back.
//!
//! # Example
//!
//! ```
//! use offload_ids::IdAllocator;
//!
//! fn main() -> Result<(), offload_ids::IdError> {
//!     let ids = IdAllocator::new(|id| id >= 0x7f00_0000);
//!
//!     let clock = ids.get_id("clock_hands")?;
//!     assert_eq!(ids.get_id("clock_hands")?, clock);
//!     assert_eq!(ids.get_id(0x7f00_0001)?, 0x7f00_0001);
//!     Ok(())
//! }
//! ```

mod allocator;
mod key;

pub use allocator::IdAllocator;
pub use key::IdKey;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("Id space exhausted: no unreserved id left below i32::MAX")]
    Exhausted,
}
