//! Persistent (immutable) vector based on a bit-partitioned trie.
//!
//! This module provides [`PersistentVector`], an immutable dynamic array
//! that uses structural sharing for efficient operations.
//!
//! # Overview
//!
//! `PersistentVector` is a 32-way branching trie inspired by Clojure's
//! `PersistentVector` and Scala's Vector. It provides:
//!
//! - O(log32 N) random access (effectively O(1) for practical sizes)
//! - O(log32 N) `push_back` (amortized O(1) with tail optimization)
//! - O(log32 N) `update` and `pop_back`
//! - O(1) `len` and `is_empty`
//!
//! All operations return new vectors without modifying the original,
//! and structural sharing ensures memory efficiency.
//!
//! # Internal Structure
//!
//! The vector consists of:
//! - An optional root node (32-way branching trie), absent while the
//!   vector holds at most 32 elements
//! - A tail buffer (up to 32 elements) for efficient append
//!
//! The trie is kept at minimal height for its element count: when the
//! first full tail is folded in, the resulting leaf *is* the root; the
//! root only grows a level once the current height is full, and
//! `pop_back` collapses levels again as soon as the root has a single
//! child.
//!
//! # Examples
//!
//! ```rust
//! use radixvec::PersistentVector;
//!
//! let vector = PersistentVector::new()
//!     .push_back(1)
//!     .push_back(2)
//!     .push_back(3);
//!
//! assert_eq!(vector.get(0), Some(&1));
//! assert_eq!(vector.get(1), Some(&2));
//! assert_eq!(vector.get(2), Some(&3));
//!
//! // Structural sharing: the original vector is preserved
//! let extended = vector.push_back(4);
//! assert_eq!(vector.len(), 3);     // Original unchanged
//! assert_eq!(extended.len(), 4);   // New vector
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::{FromIterator, FusedIterator};

use static_assertions::{const_assert, const_assert_eq};

use crate::ReferenceCounter;

// =============================================================================
// Constants
// =============================================================================

/// Branching factor (2^5 = 32)
const BRANCHING_FACTOR: usize = 32;

/// Bits per level in the trie
const BITS_PER_LEVEL: usize = 5;

/// Bit mask for extracting index within a node
const MASK: usize = BRANCHING_FACTOR - 1;

const_assert!(BRANCHING_FACTOR.is_power_of_two());
const_assert_eq!(1 << BITS_PER_LEVEL, BRANCHING_FACTOR);

// =============================================================================
// Node Definition
// =============================================================================

/// Internal node structure for the trie.
///
/// A leaf holds up to 32 element values; a branch holds up to 32 child
/// references. Nodes are never mutated once they become reachable from a
/// published vector: every structural change builds a fresh sibling that
/// carries the edit and reuses all untouched children by reference.
#[derive(Clone)]
enum Node<T> {
    /// Branch node containing child nodes
    Branch(ReferenceCounter<[Option<ReferenceCounter<Self>>; BRANCHING_FACTOR]>),
    /// Leaf node containing actual elements
    Leaf(ReferenceCounter<[T]>),
}

impl<T> Node<T> {
    /// Creates a leaf node by reusing an existing `ReferenceCounter<[T]>`.
    ///
    /// This avoids copying the elements and only increments the reference
    /// count, which is what makes folding a full tail into the trie O(1)
    /// in element moves.
    #[inline]
    const fn leaf(elements: ReferenceCounter<[T]>) -> Self {
        Self::Leaf(elements)
    }

    /// Creates a branch node with no children set.
    fn empty_children() -> [Option<ReferenceCounter<Self>>; BRANCHING_FACTOR] {
        std::array::from_fn(|_| None)
    }
}

// =============================================================================
// PersistentVector Definition
// =============================================================================

/// A persistent (immutable) vector based on a bit-partitioned trie.
///
/// `PersistentVector` is an immutable data structure that uses structural
/// sharing to efficiently support functional programming patterns such as
/// undo/history stacks, lock-free concurrent readers and value-semantics
/// pipelines.
///
/// # Time Complexity
///
/// | Operation   | Complexity                      |
/// |-------------|---------------------------------|
/// | `new`       | O(1)                            |
/// | `get`       | O(log32 N)                      |
/// | `push_back` | O(log32 N), amortized O(1)      |
/// | `pop_back`  | O(log32 N)                      |
/// | `update`    | O(log32 N)                      |
/// | `len`       | O(1)                            |
/// | `is_empty`  | O(1)                            |
/// | `iter`      | O(1) to create, O(N) to iterate |
///
/// # Absent results
///
/// `get` and `update` report an out-of-range index as a distinct `None`
/// result rather than a panic or an in-band sentinel, so an index error
/// can never be confused with a stored element that happens to represent
/// "no value".
///
/// # Examples
///
/// ```rust
/// use radixvec::PersistentVector;
///
/// let vector: PersistentVector<i32> = (0..100).collect();
/// assert_eq!(vector.len(), 100);
/// assert_eq!(vector.get(50), Some(&50));
/// ```
#[derive(Clone)]
pub struct PersistentVector<T> {
    /// Total number of elements
    length: usize,
    /// Trie height indicator: `BITS_PER_LEVEL` when the root is a single
    /// leaf (or absent), plus `BITS_PER_LEVEL` per additional trie level
    shift: usize,
    /// Root node of the trie; `None` exactly while `length <= 32`
    root: Option<ReferenceCounter<Node<T>>>,
    /// Tail buffer for efficient append (up to 32 elements)
    tail: ReferenceCounter<[T]>,
}

impl<T> PersistentVector<T> {
    /// Creates a new empty vector.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use radixvec::PersistentVector;
    ///
    /// let vector: PersistentVector<i32> = PersistentVector::new();
    /// assert!(vector.is_empty());
    /// ```
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            length: 0,
            shift: BITS_PER_LEVEL,
            root: None,
            tail: ReferenceCounter::from(Vec::<T>::new()),
        }
    }

    /// Creates a vector containing a single element.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use radixvec::PersistentVector;
    ///
    /// let vector = PersistentVector::singleton(42);
    /// assert_eq!(vector.len(), 1);
    /// assert_eq!(vector.get(0), Some(&42));
    /// ```
    #[inline]
    #[must_use]
    pub fn singleton(element: T) -> Self {
        Self {
            length: 1,
            shift: BITS_PER_LEVEL,
            root: None,
            tail: ReferenceCounter::from(vec![element]),
        }
    }

    /// Returns the number of elements in the vector.
    ///
    /// # Complexity
    ///
    /// O(1)
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if the vector contains no elements.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use radixvec::PersistentVector;
    ///
    /// let empty: PersistentVector<i32> = PersistentVector::new();
    /// assert!(empty.is_empty());
    ///
    /// let non_empty = empty.push_back(1);
    /// assert!(!non_empty.is_empty());
    /// ```
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Returns the starting index of the tail buffer: the largest multiple
    /// of 32 at or below the last index, 0 for a rootless vector.
    #[inline]
    const fn tail_offset(&self) -> usize {
        if self.length < BRANCHING_FACTOR {
            0
        } else {
            ((self.length - 1) >> BITS_PER_LEVEL) << BITS_PER_LEVEL
        }
    }

    /// Returns a reference to the element at the given index.
    ///
    /// Returns `None` if the index is out of bounds.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use radixvec::PersistentVector;
    ///
    /// let vector: PersistentVector<i32> = (1..=5).collect();
    /// assert_eq!(vector.get(0), Some(&1));
    /// assert_eq!(vector.get(4), Some(&5));
    /// assert_eq!(vector.get(10), None);
    /// ```
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.length {
            return None;
        }

        let tail_offset = self.tail_offset();

        if index >= tail_offset {
            // Element is in the tail
            self.tail.get(index - tail_offset)
        } else {
            // Element is in the trie
            self.get_in_trie(index)
        }
    }

    /// Walks the trie down to the leaf holding `index`, extracting a 5-bit
    /// slice of the index per level.
    fn get_in_trie(&self, index: usize) -> Option<&T> {
        let mut node = self.root.as_deref()?;
        let mut level = self.shift;

        while level > BITS_PER_LEVEL {
            let Node::Branch(children) = node else {
                unreachable!("leaf node above the base level");
            };
            let child_index = (index >> (level - BITS_PER_LEVEL)) & MASK;
            node = children[child_index].as_deref()?;
            level -= BITS_PER_LEVEL;
        }

        let Node::Leaf(elements) = node else {
            unreachable!("branch node at the base level");
        };
        elements.get(index & MASK)
    }

    /// Returns a reference to the first element, or `None` if the vector
    /// is empty.
    #[inline]
    #[must_use]
    pub fn first(&self) -> Option<&T> {
        self.get(0)
    }

    /// Returns a reference to the last element, or `None` if the vector
    /// is empty.
    ///
    /// # Complexity
    ///
    /// O(1) - the last element is always in the tail
    ///
    /// # Examples
    ///
    /// ```rust
    /// use radixvec::PersistentVector;
    ///
    /// let vector: PersistentVector<i32> = (1..=5).collect();
    /// assert_eq!(vector.last(), Some(&5));
    /// ```
    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&T> {
        if self.is_empty() { None } else { self.tail.last() }
    }

    /// Returns an iterator over references to the elements.
    ///
    /// The iterator yields elements from front to back in O(N) time via a
    /// stack-based trie walk that visits each node exactly once, rather
    /// than repeating a root descent per index. Each call produces a fresh
    /// iterator, so iteration is restartable.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use radixvec::PersistentVector;
    ///
    /// let vector: PersistentVector<i32> = (1..=5).collect();
    /// let collected: Vec<&i32> = vector.iter().collect();
    /// assert_eq!(collected, vec![&1, &2, &3, &4, &5]);
    /// ```
    #[must_use]
    pub fn iter(&self) -> PersistentVectorIterator<'_, T> {
        PersistentVectorIterator::new(self)
    }
}

impl<T: Clone> PersistentVector<T> {
    /// Appends an element to the back of the vector.
    ///
    /// Returns a new vector with the element at the end; the original is
    /// unchanged.
    ///
    /// # Complexity
    ///
    /// O(log32 N), amortized O(1): 31 of every 32 appends only copy the
    /// tail buffer, and folding a full tail into the trie rebuilds a
    /// single rightmost path.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use radixvec::PersistentVector;
    ///
    /// let vector = PersistentVector::new()
    ///     .push_back(1)
    ///     .push_back(2)
    ///     .push_back(3);
    ///
    /// assert_eq!(vector.len(), 3);
    /// assert_eq!(vector.get(2), Some(&3));
    /// ```
    #[must_use]
    pub fn push_back(&self, element: T) -> Self {
        if self.tail.len() < BRANCHING_FACTOR {
            // Tail has space, just add to tail
            let mut new_tail = self.tail.to_vec();
            new_tail.push(element);

            Self {
                length: self.length + 1,
                shift: self.shift,
                root: self.root.clone(),
                tail: ReferenceCounter::from(new_tail),
            }
        } else {
            // Tail is full, fold it into the trie and start a new tail
            self.push_tail_into_trie(element)
        }
    }

    /// Appends every element of a sequence, in order.
    ///
    /// Equivalent to repeated [`push_back`]; an empty sequence returns the
    /// vector unchanged (by value).
    ///
    /// # Complexity
    ///
    /// O(M log32 N) where M is the sequence length.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use radixvec::PersistentVector;
    ///
    /// let vector: PersistentVector<i32> = (1..=3).collect();
    /// let extended = vector.push_back_many(4..=6);
    ///
    /// assert_eq!(extended.len(), 6);
    /// let collected: Vec<i32> = extended.iter().copied().collect();
    /// assert_eq!(collected, vec![1, 2, 3, 4, 5, 6]);
    /// ```
    ///
    /// [`push_back`]: PersistentVector::push_back
    #[must_use]
    pub fn push_back_many<I>(&self, elements: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        let mut result = self.clone();
        for element in elements {
            result = result.push_back(element);
        }
        result
    }

    /// Creates a `PersistentVector` from a slice.
    ///
    /// The elements are cloned from the slice.
    ///
    /// # Complexity
    ///
    /// O(N) where N = `slice.len()`
    ///
    /// # Examples
    ///
    /// ```rust
    /// use radixvec::PersistentVector;
    ///
    /// let vector = PersistentVector::from_slice(&[1, 2, 3, 4, 5]);
    /// assert_eq!(vector.len(), 5);
    /// assert_eq!(vector.get(0), Some(&1));
    /// ```
    #[must_use]
    pub fn from_slice(slice: &[T]) -> Self {
        build_vector_from_vec(slice.to_vec())
    }

    /// Folds the full tail into the trie as a new leaf and restarts the
    /// tail with `element`.
    fn push_tail_into_trie(&self, element: T) -> Self {
        let tail_leaf = Node::leaf(self.tail.clone());
        let new_tail = ReferenceCounter::from(vec![element]);
        let tail_offset = self.tail_offset();

        let Some(root) = &self.root else {
            // First full tail: the leaf itself becomes the root.
            return Self {
                length: self.length + 1,
                shift: BITS_PER_LEVEL,
                root: Some(ReferenceCounter::new(tail_leaf)),
                tail: new_tail,
            };
        };

        // The trie already holds `tail_offset >> 5` leaves; the current
        // height has room for `1 << (shift - 5)` of them.
        let placed_leaves = tail_offset >> BITS_PER_LEVEL;
        let leaf_capacity = 1_usize << (self.shift - BITS_PER_LEVEL);

        if placed_leaves < leaf_capacity {
            // Graft the leaf at the next position, rebuilding only the
            // rightmost insertion path.
            let new_root = Self::push_leaf_into_node(root, self.shift, tail_offset, tail_leaf);

            Self {
                length: self.length + 1,
                shift: self.shift,
                root: Some(ReferenceCounter::new(new_root)),
                tail: new_tail,
            }
        } else {
            // Root is full at the current height: grow by one level.
            let mut children = Node::empty_children();
            children[0] = Some(root.clone());
            children[1] = Some(ReferenceCounter::new(Self::new_path(self.shift, tail_leaf)));

            Self {
                length: self.length + 1,
                shift: self.shift + BITS_PER_LEVEL,
                root: Some(ReferenceCounter::new(Node::Branch(ReferenceCounter::new(
                    children,
                )))),
                tail: new_tail,
            }
        }
    }

    /// Wraps `node` in single-child branches down from `level` to the base
    /// leaf level.
    fn new_path(level: usize, node: Node<T>) -> Node<T> {
        if level == BITS_PER_LEVEL {
            node
        } else {
            let mut children = Node::empty_children();
            children[0] = Some(ReferenceCounter::new(Self::new_path(
                level - BITS_PER_LEVEL,
                node,
            )));
            Node::Branch(ReferenceCounter::new(children))
        }
    }

    /// Grafts `leaf` at the position keyed by `tail_offset`, copying only
    /// the branches on the insertion path. `node` is a branch at `level`
    /// (at least two levels above the leaves).
    fn push_leaf_into_node(
        node: &ReferenceCounter<Node<T>>,
        level: usize,
        tail_offset: usize,
        leaf: Node<T>,
    ) -> Node<T> {
        let Node::Branch(children) = node.as_ref() else {
            unreachable!("leaf node above the base level");
        };

        let child_index = (tail_offset >> (level - BITS_PER_LEVEL)) & MASK;
        let new_child = if level == 2 * BITS_PER_LEVEL {
            // Children of this branch are leaves; graft here.
            leaf
        } else {
            match &children[child_index] {
                Some(child) => {
                    Self::push_leaf_into_node(child, level - BITS_PER_LEVEL, tail_offset, leaf)
                }
                None => Self::new_path(level - BITS_PER_LEVEL, leaf),
            }
        };

        let mut new_children = children.as_ref().clone();
        new_children[child_index] = Some(ReferenceCounter::new(new_child));
        Node::Branch(ReferenceCounter::new(new_children))
    }

    /// Updates the element at the given index.
    ///
    /// Returns `None` if the index is out of bounds, otherwise returns a
    /// new vector with the updated element. Exactly one node per trie
    /// level is rebuilt; every sibling subtree is reused unchanged, so
    /// reads on the original vector are unaffected.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use radixvec::PersistentVector;
    ///
    /// let vector: PersistentVector<i32> = (1..=5).collect();
    /// let updated = vector.update(2, 100).unwrap();
    ///
    /// assert_eq!(updated.get(2), Some(&100));
    /// assert_eq!(vector.get(2), Some(&3)); // Original unchanged
    /// ```
    #[must_use]
    pub fn update(&self, index: usize, element: T) -> Option<Self> {
        if index >= self.length {
            return None;
        }

        let tail_offset = self.tail_offset();

        if index >= tail_offset {
            // Element is in the tail
            let mut new_tail = self.tail.to_vec();
            new_tail[index - tail_offset] = element;

            Some(Self {
                length: self.length,
                shift: self.shift,
                root: self.root.clone(),
                tail: ReferenceCounter::from(new_tail),
            })
        } else {
            // Element is in the trie
            let Some(root) = &self.root else {
                unreachable!("index below the tail offset with no root");
            };
            let new_root = Self::update_in_node(root, self.shift, index, element);

            Some(Self {
                length: self.length,
                shift: self.shift,
                root: Some(ReferenceCounter::new(new_root)),
                tail: self.tail.clone(),
            })
        }
    }

    /// Rebuilds the path from the leaf holding `index` up to `node`,
    /// overwriting the one affected slot per level.
    fn update_in_node(
        node: &ReferenceCounter<Node<T>>,
        level: usize,
        index: usize,
        element: T,
    ) -> Node<T> {
        match node.as_ref() {
            Node::Leaf(elements) => {
                let mut new_elements = elements.to_vec();
                new_elements[index & MASK] = element;
                Node::Leaf(ReferenceCounter::from(new_elements))
            }
            Node::Branch(children) => {
                let child_index = (index >> (level - BITS_PER_LEVEL)) & MASK;
                let Some(child) = &children[child_index] else {
                    unreachable!("missing child on an in-range path");
                };

                let mut new_children = children.as_ref().clone();
                new_children[child_index] = Some(ReferenceCounter::new(Self::update_in_node(
                    child,
                    level - BITS_PER_LEVEL,
                    index,
                    element,
                )));
                Node::Branch(ReferenceCounter::new(new_children))
            }
        }
    }

    /// Removes the last element from the vector.
    ///
    /// Returns a new vector with one element fewer. Popping an empty
    /// vector is a no-op that returns the (still empty) vector.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use radixvec::PersistentVector;
    ///
    /// let vector: PersistentVector<i32> = (1..=5).collect();
    /// let remaining = vector.pop_back();
    ///
    /// assert_eq!(remaining.len(), 4);
    /// assert_eq!(remaining.last(), Some(&4));
    /// assert_eq!(vector.len(), 5); // Original unchanged
    ///
    /// let empty: PersistentVector<i32> = PersistentVector::new();
    /// assert!(empty.pop_back().is_empty());
    /// ```
    #[must_use]
    pub fn pop_back(&self) -> Self {
        if self.is_empty() {
            return self.clone();
        }

        if self.tail.len() > 1 {
            // Just drop the last tail element
            let new_tail = self.tail[..self.tail.len() - 1].to_vec();

            return Self {
                length: self.length - 1,
                shift: self.shift,
                root: self.root.clone(),
                tail: ReferenceCounter::from(new_tail),
            };
        }

        // The tail holds exactly one element; the rightmost trie leaf (if
        // any) must be extracted to become the new tail.
        let Some(root) = &self.root else {
            // Single-element vector: back to the canonical empty value.
            return Self::new();
        };

        match root.as_ref() {
            Node::Leaf(elements) => {
                // The trie is exactly one leaf: it becomes the new tail.
                Self {
                    length: self.length - 1,
                    shift: BITS_PER_LEVEL,
                    root: None,
                    tail: elements.clone(),
                }
            }
            Node::Branch(_) => {
                let leaf_offset = self.tail_offset() - BRANCHING_FACTOR;
                let new_tail = Self::leaf_for(root, self.shift, leaf_offset);

                let Some(new_root) = Self::pop_leaf_from_node(root, self.shift, leaf_offset)
                else {
                    unreachable!("branch root holds at least two leaves");
                };
                let (new_root, new_shift) =
                    Self::collapse_root(ReferenceCounter::new(new_root), self.shift);

                Self {
                    length: self.length - 1,
                    shift: new_shift,
                    root: Some(new_root),
                    tail: new_tail,
                }
            }
        }
    }

    /// Returns the leaf containing `offset`, for reuse as a tail buffer.
    fn leaf_for(
        node: &ReferenceCounter<Node<T>>,
        level: usize,
        offset: usize,
    ) -> ReferenceCounter<[T]> {
        let mut node = node;
        let mut level = level;

        loop {
            match node.as_ref() {
                Node::Leaf(elements) => return elements.clone(),
                Node::Branch(children) => {
                    let child_index = (offset >> (level - BITS_PER_LEVEL)) & MASK;
                    let Some(child) = &children[child_index] else {
                        unreachable!("missing child on the rightmost path");
                    };
                    node = child;
                    level -= BITS_PER_LEVEL;
                }
            }
        }
    }

    /// Removes the leaf keyed by `offset`, rebuilding the path from the
    /// root. Returns `None` when the subtree lost its only child and must
    /// disappear from its parent in turn.
    fn pop_leaf_from_node(
        node: &ReferenceCounter<Node<T>>,
        level: usize,
        offset: usize,
    ) -> Option<Node<T>> {
        let Node::Branch(children) = node.as_ref() else {
            unreachable!("leaf node above the base level");
        };

        let child_index = (offset >> (level - BITS_PER_LEVEL)) & MASK;
        let replacement = if level == 2 * BITS_PER_LEVEL {
            // Children of this branch are leaves; drop the rightmost one.
            None
        } else {
            let Some(child) = &children[child_index] else {
                unreachable!("missing child on the rightmost path");
            };
            Self::pop_leaf_from_node(child, level - BITS_PER_LEVEL, offset)
                .map(ReferenceCounter::new)
        };

        if replacement.is_none() && child_index == 0 {
            // The removed child was the only one: prune this branch too.
            return None;
        }

        let mut new_children = children.as_ref().clone();
        new_children[child_index] = replacement;
        Some(Node::Branch(ReferenceCounter::new(new_children)))
    }

    /// Unwraps single-child root branches until the trie is at minimal
    /// height again.
    fn collapse_root(
        root: ReferenceCounter<Node<T>>,
        shift: usize,
    ) -> (ReferenceCounter<Node<T>>, usize) {
        let mut root = root;
        let mut shift = shift;

        while shift > BITS_PER_LEVEL {
            let only_child = match root.as_ref() {
                Node::Branch(children) if children[1].is_none() => children[0].clone(),
                _ => None,
            };
            let Some(child) = only_child else { break };
            root = child;
            shift -= BITS_PER_LEVEL;
        }

        (root, shift)
    }
}

// =============================================================================
// Iterator Implementation
// =============================================================================

/// The processing state of the iterator.
///
/// Tracks whether the iterator is traversing the trie, processing the
/// tail, or has finished iterating.
#[derive(Clone, Copy, PartialEq, Eq)]
enum IteratorState {
    /// Currently traversing the trie structure
    TraversingTrie,
    /// Currently processing elements in the tail buffer
    ProcessingTail,
    /// All elements have been consumed
    Exhausted,
}

/// A stack entry for trie traversal.
///
/// Holds a reference to a branch node's children array and tracks which
/// child index to process next, enabling depth-first traversal with
/// efficient backtracking.
struct TraversalStackEntry<'a, T> {
    /// Reference to the branch node's children array
    children: &'a [Option<ReferenceCounter<Node<T>>>; BRANCHING_FACTOR],
    /// Index of the next child to process
    child_index: usize,
}

/// An iterator over references to elements of a [`PersistentVector`].
///
/// This iterator uses a stack-based trie traversal to achieve O(N)
/// iteration complexity instead of O(N log32 N). It caches the current
/// leaf node for efficient sequential access.
pub struct PersistentVectorIterator<'a, T> {
    /// Reference to the original vector (for lifetime and tail access)
    vector: &'a PersistentVector<T>,
    /// Stack for trie traversal (maximum depth is 7 for practical sizes)
    traversal_stack: Vec<TraversalStackEntry<'a, T>>,
    /// Currently cached leaf node elements
    current_leaf: Option<&'a [T]>,
    /// Current position within the cached leaf
    leaf_index: usize,
    /// Current processing state
    state: IteratorState,
    /// Current position within the tail buffer
    tail_index: usize,
    /// Number of elements already returned (for `ExactSizeIterator`)
    elements_returned: usize,
}

impl<'a, T> PersistentVectorIterator<'a, T> {
    /// Creates a new iterator for the given vector.
    fn new(vector: &'a PersistentVector<T>) -> Self {
        let state = if vector.is_empty() {
            IteratorState::Exhausted
        } else if vector.root.is_some() {
            IteratorState::TraversingTrie
        } else {
            // Every element lives in the tail
            IteratorState::ProcessingTail
        };

        let mut iterator = Self {
            vector,
            traversal_stack: Vec::with_capacity(7),
            current_leaf: None,
            leaf_index: 0,
            state,
            tail_index: 0,
            elements_returned: 0,
        };

        if state == IteratorState::TraversingTrie {
            iterator.initialize_from_root();
        }
        iterator
    }

    /// Pushes the root onto the stack and descends to the first leaf.
    fn initialize_from_root(&mut self) {
        match self.vector.root.as_deref() {
            Some(Node::Branch(children)) => {
                self.traversal_stack.push(TraversalStackEntry {
                    children: children.as_ref(),
                    child_index: 0,
                });
                self.descend_to_first_leaf();
            }
            Some(Node::Leaf(elements)) => {
                // The whole trie is a single leaf
                self.current_leaf = Some(elements.as_ref());
                self.leaf_index = 0;
            }
            None => {}
        }
    }

    /// Descends from the current stack top to the next unvisited leaf,
    /// skipping unset children and backtracking through the stack.
    fn descend_to_first_leaf(&mut self) {
        loop {
            let stack_length = self.traversal_stack.len();
            if stack_length == 0 {
                break;
            }

            let entry = &mut self.traversal_stack[stack_length - 1];

            let mut found_branch: Option<
                &'a [Option<ReferenceCounter<Node<T>>>; BRANCHING_FACTOR],
            > = None;
            let mut found_leaf: Option<&'a [T]> = None;

            while entry.child_index < BRANCHING_FACTOR {
                let index = entry.child_index;
                entry.child_index += 1;

                if let Some(child) = &entry.children[index] {
                    match child.as_ref() {
                        Node::Branch(child_children) => {
                            found_branch = Some(child_children.as_ref());
                            break;
                        }
                        Node::Leaf(elements) => {
                            found_leaf = Some(elements.as_ref());
                            break;
                        }
                    }
                }
            }

            if let Some(leaf) = found_leaf {
                self.current_leaf = Some(leaf);
                self.leaf_index = 0;
                return;
            }

            if let Some(branch) = found_branch {
                self.traversal_stack.push(TraversalStackEntry {
                    children: branch,
                    child_index: 0,
                });
                continue;
            }

            // All children processed, pop this entry
            self.traversal_stack.pop();
        }
    }

    /// Advances past an exhausted leaf, transitioning to the tail when no
    /// unvisited leaves remain.
    fn advance_to_next_leaf(&mut self) {
        self.current_leaf = None;
        self.leaf_index = 0;

        self.descend_to_first_leaf();

        if self.current_leaf.is_none() {
            self.state = IteratorState::ProcessingTail;
            self.tail_index = 0;
        }
    }
}

impl<'a, T> Iterator for PersistentVectorIterator<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.state {
                IteratorState::TraversingTrie => {
                    if let Some(leaf) = self.current_leaf {
                        if self.leaf_index < leaf.len() {
                            let element = &leaf[self.leaf_index];
                            self.leaf_index += 1;
                            self.elements_returned += 1;
                            return Some(element);
                        }
                        // Current leaf is exhausted, move to the next one
                        self.advance_to_next_leaf();
                    } else {
                        self.state = IteratorState::ProcessingTail;
                        self.tail_index = 0;
                    }
                }
                IteratorState::ProcessingTail => {
                    if self.tail_index < self.vector.tail.len() {
                        let element = &self.vector.tail[self.tail_index];
                        self.tail_index += 1;
                        self.elements_returned += 1;
                        return Some(element);
                    }
                    self.state = IteratorState::Exhausted;
                    return None;
                }
                IteratorState::Exhausted => {
                    return None;
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.vector.length.saturating_sub(self.elements_returned);
        (remaining, Some(remaining))
    }
}

impl<T> ExactSizeIterator for PersistentVectorIterator<'_, T> {
    fn len(&self) -> usize {
        self.vector.length.saturating_sub(self.elements_returned)
    }
}

impl<T> FusedIterator for PersistentVectorIterator<'_, T> {}

/// A stack entry for trie traversal in the owning iterator.
///
/// Unlike `TraversalStackEntry`, this holds a `ReferenceCounter<Node<T>>`
/// directly to avoid lifetime issues with owned data.
struct IntoIteratorStackEntry<T> {
    /// The branch node (held via reference counting)
    node: ReferenceCounter<Node<T>>,
    /// Index of the next child to process
    child_index: usize,
}

/// An owning iterator over elements of a [`PersistentVector`].
///
/// Elements are cloned out of the shared leaves as they are returned.
pub struct PersistentVectorIntoIterator<T> {
    /// The original vector (for accessing the tail)
    vector: PersistentVector<T>,
    /// Stack for trie traversal
    traversal_stack: Vec<IntoIteratorStackEntry<T>>,
    /// Currently cached leaf node (held via reference counting)
    current_leaf: Option<ReferenceCounter<[T]>>,
    /// Current position within the cached leaf
    leaf_index: usize,
    /// Current processing state
    state: IteratorState,
    /// Current position within the tail buffer
    tail_index: usize,
    /// Number of elements already returned
    elements_returned: usize,
}

impl<T: Clone> PersistentVectorIntoIterator<T> {
    /// Creates a new owning iterator for the given vector.
    fn new(vector: PersistentVector<T>) -> Self {
        let state = if vector.is_empty() {
            IteratorState::Exhausted
        } else if vector.root.is_some() {
            IteratorState::TraversingTrie
        } else {
            IteratorState::ProcessingTail
        };

        let root = vector.root.clone();
        let mut iterator = Self {
            vector,
            traversal_stack: Vec::with_capacity(7),
            current_leaf: None,
            leaf_index: 0,
            state,
            tail_index: 0,
            elements_returned: 0,
        };

        if let Some(root) = root
            && state == IteratorState::TraversingTrie
        {
            iterator.initialize_from_root(root);
        }
        iterator
    }

    /// Pushes the root onto the stack and descends to the first leaf.
    fn initialize_from_root(&mut self, root: ReferenceCounter<Node<T>>) {
        match root.as_ref() {
            Node::Branch(_) => {
                self.traversal_stack.push(IntoIteratorStackEntry {
                    node: root,
                    child_index: 0,
                });
                self.descend_to_first_leaf();
            }
            Node::Leaf(elements) => {
                self.current_leaf = Some(elements.clone());
                self.leaf_index = 0;
            }
        }
    }

    /// Descends from the current stack top to the next unvisited leaf.
    fn descend_to_first_leaf(&mut self) {
        loop {
            let stack_length = self.traversal_stack.len();
            if stack_length == 0 {
                break;
            }

            let entry = &mut self.traversal_stack[stack_length - 1];

            let Node::Branch(children) = entry.node.as_ref() else {
                self.traversal_stack.pop();
                continue;
            };

            let mut found_branch: Option<ReferenceCounter<Node<T>>> = None;
            let mut found_leaf: Option<ReferenceCounter<[T]>> = None;

            while entry.child_index < BRANCHING_FACTOR {
                let index = entry.child_index;
                entry.child_index += 1;

                if let Some(child) = &children[index] {
                    match child.as_ref() {
                        Node::Branch(_) => {
                            found_branch = Some(child.clone());
                            break;
                        }
                        Node::Leaf(elements) => {
                            found_leaf = Some(elements.clone());
                            break;
                        }
                    }
                }
            }

            if let Some(leaf) = found_leaf {
                self.current_leaf = Some(leaf);
                self.leaf_index = 0;
                return;
            }

            if let Some(branch) = found_branch {
                self.traversal_stack.push(IntoIteratorStackEntry {
                    node: branch,
                    child_index: 0,
                });
                continue;
            }

            // All children processed, pop this entry
            self.traversal_stack.pop();
        }
    }

    /// Advances past an exhausted leaf, transitioning to the tail when no
    /// unvisited leaves remain.
    fn advance_to_next_leaf(&mut self) {
        self.current_leaf = None;
        self.leaf_index = 0;

        self.descend_to_first_leaf();

        if self.current_leaf.is_none() {
            self.state = IteratorState::ProcessingTail;
            self.tail_index = 0;
        }
    }
}

impl<T: Clone> Iterator for PersistentVectorIntoIterator<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.state {
                IteratorState::TraversingTrie => {
                    if let Some(ref leaf) = self.current_leaf {
                        if self.leaf_index < leaf.len() {
                            let element = leaf[self.leaf_index].clone();
                            self.leaf_index += 1;
                            self.elements_returned += 1;
                            return Some(element);
                        }
                        self.advance_to_next_leaf();
                    } else {
                        self.state = IteratorState::ProcessingTail;
                        self.tail_index = 0;
                    }
                }
                IteratorState::ProcessingTail => {
                    if self.tail_index < self.vector.tail.len() {
                        let element = self.vector.tail[self.tail_index].clone();
                        self.tail_index += 1;
                        self.elements_returned += 1;
                        return Some(element);
                    }
                    self.state = IteratorState::Exhausted;
                    return None;
                }
                IteratorState::Exhausted => {
                    return None;
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.vector.length.saturating_sub(self.elements_returned);
        (remaining, Some(remaining))
    }
}

impl<T: Clone> ExactSizeIterator for PersistentVectorIntoIterator<T> {
    fn len(&self) -> usize {
        self.vector.length.saturating_sub(self.elements_returned)
    }
}

impl<T: Clone> FusedIterator for PersistentVectorIntoIterator<T> {}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<T> Default for PersistentVector<T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<T> for PersistentVector<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        build_vector_from_vec(iter.into_iter().collect())
    }
}

impl<T> From<Vec<T>> for PersistentVector<T> {
    fn from(elements: Vec<T>) -> Self {
        build_vector_from_vec(elements)
    }
}

impl<T: Clone> From<&[T]> for PersistentVector<T> {
    fn from(slice: &[T]) -> Self {
        Self::from_slice(slice)
    }
}

impl<T: Clone> IntoIterator for PersistentVector<T> {
    type Item = T;
    type IntoIter = PersistentVectorIntoIterator<T>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        PersistentVectorIntoIterator::new(self)
    }
}

impl<'a, T> IntoIterator for &'a PersistentVector<T> {
    type Item = &'a T;
    type IntoIter = PersistentVectorIterator<'a, T>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: PartialEq> PartialEq for PersistentVector<T> {
    fn eq(&self, other: &Self) -> bool {
        if self.length != other.length {
            return false;
        }

        // Shared-structure fast path: lineages that retained the same
        // root and tail are equal without an element walk.
        let same_root = match (&self.root, &other.root) {
            (None, None) => true,
            (Some(left), Some(right)) => ReferenceCounter::ptr_eq(left, right),
            _ => false,
        };
        if same_root && ReferenceCounter::ptr_eq(&self.tail, &other.tail) {
            return true;
        }

        self.iter().zip(other.iter()).all(|(a, b)| a == b)
    }
}

impl<T: Eq> Eq for PersistentVector<T> {}

/// Computes a hash value for this vector.
///
/// The hash is computed by first hashing the length, then hashing each
/// element in index order using the O(N) iterator. This ensures that:
///
/// - Vectors with different lengths have different hashes (with high probability)
/// - The order of elements affects the hash value
/// - Equal vectors produce equal hash values (Hash-Eq consistency)
///
/// # Examples
///
/// ```rust
/// use radixvec::PersistentVector;
/// use std::collections::HashMap;
///
/// let mut map: HashMap<PersistentVector<i32>, &str> = HashMap::new();
/// let key: PersistentVector<i32> = (1..=3).collect();
/// map.insert(key.clone(), "value");
/// assert_eq!(map.get(&key), Some(&"value"));
/// ```
impl<T: Hash> Hash for PersistentVector<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Hash the length first to distinguish vectors of different lengths
        self.length.hash(state);
        for element in self {
            element.hash(state);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for PersistentVector<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_list().entries(self.iter()).finish()
    }
}

impl<T: fmt::Display> fmt::Display for PersistentVector<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "[")?;
        let mut first = true;
        for element in self {
            if first {
                first = false;
            } else {
                write!(formatter, ", ")?;
            }
            write!(formatter, "{element}")?;
        }
        write!(formatter, "]")
    }
}

// =============================================================================
// Bulk Construction
// =============================================================================

/// Builds a `PersistentVector` from a `Vec` without requiring `Clone`.
///
/// Produces exactly the left-packed shape that repeated `push_back` would:
/// a full-leaf trie plus a 1..=32 element tail.
fn build_vector_from_vec<T>(elements: Vec<T>) -> PersistentVector<T> {
    let length = elements.len();

    // Small vectors live entirely in the tail
    if length <= BRANCHING_FACTOR {
        return PersistentVector {
            length,
            shift: BITS_PER_LEVEL,
            root: None,
            tail: ReferenceCounter::from(elements),
        };
    }

    // The tail keeps the trailing `length mod 32` elements, a full 32 on
    // exact multiples
    let tail_size = match length % BRANCHING_FACTOR {
        0 => BRANCHING_FACTOR,
        remainder => remainder,
    };

    let mut elements = elements;
    let tail_elements = elements.split_off(length - tail_size);
    let (root, shift) = build_trie_from_elements(elements);

    PersistentVector {
        length,
        shift,
        root: Some(root),
        tail: ReferenceCounter::from(tail_elements),
    }
}

/// Builds the trie bottom-up from a non-empty, 32-divisible run of
/// elements: chunk into full leaves, then stack branch levels until a
/// single root remains.
fn build_trie_from_elements<T>(elements: Vec<T>) -> (ReferenceCounter<Node<T>>, usize) {
    let mut nodes: Vec<ReferenceCounter<Node<T>>> = Vec::new();
    let mut iter = elements.into_iter();

    loop {
        let chunk: Vec<T> = iter.by_ref().take(BRANCHING_FACTOR).collect();
        if chunk.is_empty() {
            break;
        }
        nodes.push(ReferenceCounter::new(Node::Leaf(ReferenceCounter::from(
            chunk,
        ))));
    }

    let mut shift = BITS_PER_LEVEL;
    while nodes.len() > 1 {
        nodes = nodes
            .chunks(BRANCHING_FACTOR)
            .map(|chunk| {
                let mut children = Node::empty_children();
                for (index, node) in chunk.iter().enumerate() {
                    children[index] = Some(node.clone());
                }
                ReferenceCounter::new(Node::Branch(ReferenceCounter::new(children)))
            })
            .collect();
        shift += BITS_PER_LEVEL;
    }

    let Some(root) = nodes.pop() else {
        unreachable!("trie built from a non-empty element run");
    };
    (root, shift)
}

// =============================================================================
// Serde Support
// =============================================================================

#[cfg(feature = "serde")]
impl<T: serde::Serialize> serde::Serialize for PersistentVector<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeSeq;
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for element in self {
            seq.serialize_element(element)?;
        }
        seq.end()
    }
}

#[cfg(feature = "serde")]
struct PersistentVectorVisitor<T> {
    marker: std::marker::PhantomData<T>,
}

#[cfg(feature = "serde")]
impl<T> PersistentVectorVisitor<T> {
    const fn new() -> Self {
        Self {
            marker: std::marker::PhantomData,
        }
    }
}

#[cfg(feature = "serde")]
impl<'de, T> serde::de::Visitor<'de> for PersistentVectorVisitor<T>
where
    T: serde::Deserialize<'de>,
{
    type Value = PersistentVector<T>;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a sequence")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: serde::de::SeqAccess<'de>,
    {
        const MAX_PREALLOCATE: usize = 4096;
        let capacity = seq.size_hint().unwrap_or(0).min(MAX_PREALLOCATE);
        let mut elements = Vec::with_capacity(capacity);
        while let Some(element) = seq.next_element()? {
            elements.push(element);
        }
        Ok(elements.into_iter().collect())
    }
}

#[cfg(feature = "serde")]
impl<'de, T> serde::Deserialize<'de> for PersistentVector<T>
where
    T: serde::Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_seq(PersistentVectorVisitor::new())
    }
}

// =============================================================================
// Thread Safety Assertions
// =============================================================================

#[cfg(feature = "arc")]
static_assertions::assert_impl_all!(PersistentVector<i32>: Send, Sync);
#[cfg(feature = "arc")]
static_assertions::assert_impl_all!(PersistentVector<String>: Send, Sync);

#[cfg(not(feature = "arc"))]
static_assertions::assert_not_impl_any!(PersistentVector<i32>: Send, Sync);

// =============================================================================
// Tests
// =============================================================================


// =============================================================================
// Thread Safety Tests (arc feature only)
// =============================================================================

#[cfg(all(test, feature = "arc"))]
mod multithread_tests {
    use super::*;
    use rstest::rstest;
    use std::thread;

    #[rstest]
    fn test_vector_shared_across_threads() {
        let vector: PersistentVector<i32> = (0..10000).collect();

        let vector1 = vector.clone();
        let vector2 = vector;

        let handle1 = thread::spawn(move || vector1.iter().sum::<i32>());
        let handle2 = thread::spawn(move || vector2.iter().sum::<i32>());

        let sum1 = handle1.join().unwrap();
        let sum2 = handle2.join().unwrap();

        assert_eq!(sum1, sum2);
        assert_eq!(sum1, (0..10000).sum::<i32>());
    }

    #[rstest]
    fn test_vector_concurrent_derivations() {
        let base: PersistentVector<i32> = (0..100).collect();

        let base1 = base.clone();
        let base2 = base.clone();

        let handle1 = thread::spawn(move || base1.push_back(1).push_back(2).push_back(3));
        let handle2 = thread::spawn(move || base2.push_back(4).push_back(5).push_back(6));

        let result1 = handle1.join().unwrap();
        let result2 = handle2.join().unwrap();

        assert_eq!(result1.len(), 103);
        assert_eq!(result2.len(), 103);
        assert_eq!(result1.get(100), Some(&1));
        assert_eq!(result2.get(100), Some(&4));
        assert_eq!(base.len(), 100);
    }

    #[rstest]
    fn test_vector_concurrent_random_access() {
        let vector: PersistentVector<i32> = (0..10000).collect();

        let total: i32 = (0..4)
            .map(|thread_id| {
                let vector_clone = vector.clone();
                thread::spawn(move || {
                    let start = thread_id * 2500;
                    let end = start + 2500;
                    (start..end)
                        .map(|i| *vector_clone.get(i).unwrap())
                        .sum::<i32>()
                })
            })
            .map(|handle| handle.join().unwrap())
            .sum();

        assert_eq!(total, (0..10000).sum::<i32>());
    }
}
