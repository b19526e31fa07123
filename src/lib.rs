//! # radixvec
//!
//! A persistent (immutable) vector for Rust, implemented as a 32-way
//! bit-partitioned trie with a tail buffer.
//!
//! ## Overview
//!
//! [`PersistentVector`] is a sequence with value semantics: every mutating
//! operation returns a new version and leaves every prior version intact
//! and observable. Structural sharing keeps the cost of an edit far below
//! copying the whole sequence:
//!
//! - O(log32 N) random access (effectively O(1) for practical sizes)
//! - O(log32 N) `push_back`, amortized O(1) via the tail buffer
//! - O(log32 N) `update` and `pop_back`
//! - O(1) `len`, `is_empty` and `last`
//!
//! Because published versions are never mutated, any number of threads may
//! traverse the same version concurrently without locks, and independent
//! new versions may be derived from a shared base on different threads
//! without synchronization (enable the `arc` feature for `Send`/`Sync`
//! vectors).
//!
//! ## Feature Flags
//!
//! - `arc`: share nodes with `Arc` instead of `Rc` (thread-safe sharing)
//! - `serde`: `Serialize`/`Deserialize` as a plain sequence
//!
//! ## Example
//!
//! ```rust
//! use radixvec::PersistentVector;
//!
//! let vector: PersistentVector<i32> = (1..=3).collect();
//! let updated = vector.update(1, 42).unwrap();
//!
//! assert_eq!(updated.get(1), Some(&42));
//! assert_eq!(vector.get(1), Some(&2)); // the original is unchanged
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

// =============================================================================
// Reference Counter Type Alias
// =============================================================================

/// Reference-counted smart pointer type.
///
/// When the `arc` feature is enabled, this is `std::sync::Arc`,
/// which is thread-safe but has slightly higher overhead.
///
/// When the `arc` feature is disabled (default), this is `std::rc::Rc`,
/// which is faster but not thread-safe.
#[cfg(feature = "arc")]
pub(crate) type ReferenceCounter<T> = std::sync::Arc<T>;

#[cfg(not(feature = "arc"))]
pub(crate) type ReferenceCounter<T> = std::rc::Rc<T>;

mod vector;

pub use vector::PersistentVector;
pub use vector::PersistentVectorIntoIterator;
pub use vector::PersistentVectorIterator;

// =============================================================================
// Tests
// =============================================================================
