//! Property-based tests for `PersistentVector` laws.
//!
//! This module verifies the algebraic laws and invariants of the vector
//! using proptest.

use proptest::prelude::*;
use radixvec::PersistentVector;

// =============================================================================
// Access Laws
// =============================================================================

proptest! {
    /// Get-Update Law: an updated element is observable through get
    #[test]
    fn prop_get_update_law(
        elements in prop::collection::vec(any::<i32>(), 1..200)
    ) {
        let vector: PersistentVector<i32> = elements.iter().copied().collect();
        let length = vector.len();

        // Pick a random valid index
        let index = (elements[0].unsigned_abs() as usize) % length;
        let new_value = 99999;

        let updated = vector.update(index, new_value);
        prop_assert!(updated.is_some());
        let updated = updated.unwrap();
        prop_assert_eq!(updated.get(index), Some(&new_value));
    }

    /// Get-Update-Other Law: update does not affect any other index
    #[test]
    fn prop_get_update_other_law(
        elements in prop::collection::vec(any::<i32>(), 2..200)
    ) {
        let vector: PersistentVector<i32> = elements.iter().copied().collect();
        let length = vector.len();

        // Pick two different indices
        let update_index = (elements[0].unsigned_abs() as usize) % length;
        let check_index =
            ((elements[1].unsigned_abs() as usize) % (length - 1) + update_index + 1) % length;
        let new_value = 99999;

        if update_index != check_index
            && let Some(updated) = vector.update(update_index, new_value)
        {
            prop_assert_eq!(
                updated.get(check_index),
                vector.get(check_index),
                "Update at {} should not affect index {}",
                update_index,
                check_index
            );
        }
    }

    /// Update out of range is always an absent result, never a panic
    #[test]
    fn prop_update_out_of_range_is_none(
        elements in prop::collection::vec(any::<i32>(), 0..100),
        excess in 0_usize..1000
    ) {
        let vector: PersistentVector<i32> = elements.iter().copied().collect();
        prop_assert!(vector.update(vector.len() + excess, 0).is_none());
    }

    /// Get agrees with the source sequence at every index
    #[test]
    fn prop_get_matches_source(
        elements in prop::collection::vec(any::<i32>(), 0..300)
    ) {
        let vector: PersistentVector<i32> = elements.iter().copied().collect();
        prop_assert_eq!(vector.len(), elements.len());
        for (index, expected) in elements.iter().enumerate() {
            prop_assert_eq!(vector.get(index), Some(expected));
        }
        prop_assert_eq!(vector.get(elements.len()), None);
    }
}

// =============================================================================
// Append / Remove Laws
// =============================================================================

proptest! {
    /// Push-Get Law: the pushed element appears at the old length
    #[test]
    fn prop_push_back_get_law(
        elements in prop::collection::vec(any::<i32>(), 0..200),
        new_element: i32
    ) {
        let vector: PersistentVector<i32> = elements.iter().copied().collect();
        let with_element = vector.push_back(new_element);

        prop_assert_eq!(with_element.len(), vector.len() + 1);
        prop_assert_eq!(with_element.get(vector.len()), Some(&new_element));
        prop_assert_eq!(with_element.last(), Some(&new_element));
    }

    /// Push-Pop Law: pop after push is observationally the original
    #[test]
    fn prop_push_pop_back_law(
        elements in prop::collection::vec(any::<i32>(), 0..200),
        new_element: i32
    ) {
        let vector: PersistentVector<i32> = elements.iter().copied().collect();
        let round_trip = vector.push_back(new_element).pop_back();

        prop_assert_eq!(round_trip, vector);
    }

    /// Pop removes exactly the last element
    #[test]
    fn prop_pop_back_law(
        elements in prop::collection::vec(any::<i32>(), 1..200)
    ) {
        let vector: PersistentVector<i32> = elements.iter().copied().collect();
        let popped = vector.pop_back();

        prop_assert_eq!(popped.len(), elements.len() - 1);
        let expected: PersistentVector<i32> =
            elements[..elements.len() - 1].iter().copied().collect();
        prop_assert_eq!(popped, expected);
    }

    /// Popping the empty vector is the identity
    #[test]
    fn prop_pop_back_empty_is_identity(_unused: u8) {
        let empty: PersistentVector<i32> = PersistentVector::new();
        prop_assert_eq!(empty.pop_back(), empty);
    }
}

// =============================================================================
// Concatenation Laws
// =============================================================================

proptest! {
    /// Concatenation preserves lengths and element order
    #[test]
    fn prop_push_back_many_order(
        left in prop::collection::vec(any::<i32>(), 0..100),
        right in prop::collection::vec(any::<i32>(), 0..100)
    ) {
        let left_vector: PersistentVector<i32> = left.iter().copied().collect();
        let combined = left_vector.push_back_many(right.iter().copied());

        prop_assert_eq!(combined.len(), left.len() + right.len());

        let collected: Vec<i32> = combined.iter().copied().collect();
        let expected: Vec<i32> =
            left.iter().copied().chain(right.iter().copied()).collect();
        prop_assert_eq!(collected, expected);
    }

    /// Empty vector is a left and right identity for concatenation
    #[test]
    fn prop_push_back_many_identity(
        elements in prop::collection::vec(any::<i32>(), 0..100)
    ) {
        let vector: PersistentVector<i32> = elements.iter().copied().collect();
        let empty: PersistentVector<i32> = PersistentVector::new();

        prop_assert_eq!(vector.push_back_many(std::iter::empty()), vector.clone());
        prop_assert_eq!(empty.push_back_many(elements.iter().copied()), vector);
    }

    /// Concatenation is associative
    #[test]
    fn prop_push_back_many_associative(
        a in prop::collection::vec(any::<i32>(), 0..60),
        b in prop::collection::vec(any::<i32>(), 0..60),
        c in prop::collection::vec(any::<i32>(), 0..60)
    ) {
        let va: PersistentVector<i32> = a.iter().copied().collect();

        let left_first = va
            .push_back_many(b.iter().copied())
            .push_back_many(c.iter().copied());
        let right_first =
            va.push_back_many(b.iter().copied().chain(c.iter().copied()));

        prop_assert_eq!(left_first, right_first);
    }
}

// =============================================================================
// Iteration / Equality Laws
// =============================================================================

proptest! {
    /// Iteration yields exactly the source sequence
    #[test]
    fn prop_iter_preserves_order(
        elements in prop::collection::vec(any::<i32>(), 0..300)
    ) {
        let vector: PersistentVector<i32> = elements.iter().copied().collect();
        let collected: Vec<i32> = vector.iter().copied().collect();
        prop_assert_eq!(collected, elements);
    }

    /// Borrowed and owning iteration agree
    #[test]
    fn prop_iter_into_iter_agree(
        elements in prop::collection::vec(any::<i32>(), 0..300)
    ) {
        let vector: PersistentVector<i32> = elements.iter().copied().collect();
        let borrowed: Vec<i32> = vector.iter().copied().collect();
        let owned: Vec<i32> = vector.into_iter().collect();
        prop_assert_eq!(borrowed, owned);
    }

    /// Equality is structural and independent of construction path
    #[test]
    fn prop_eq_independent_of_construction(
        elements in prop::collection::vec(any::<i32>(), 0..200)
    ) {
        let bulk: PersistentVector<i32> = elements.iter().copied().collect();
        let mut incremental = PersistentVector::new();
        for element in &elements {
            incremental = incremental.push_back(*element);
        }
        prop_assert_eq!(bulk, incremental);
    }

    /// Equal vectors hash equally
    #[test]
    fn prop_hash_consistent_with_eq(
        elements in prop::collection::vec(any::<i32>(), 0..200)
    ) {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let hash_of = |vector: &PersistentVector<i32>| {
            let mut hasher = DefaultHasher::new();
            vector.hash(&mut hasher);
            hasher.finish()
        };

        let bulk: PersistentVector<i32> = elements.iter().copied().collect();
        let incremental: PersistentVector<i32> =
            PersistentVector::new().push_back_many(elements.iter().copied());

        prop_assert_eq!(bulk.clone(), incremental.clone());
        prop_assert_eq!(hash_of(&bulk), hash_of(&incremental));
    }
}

// =============================================================================
// Persistence Laws
// =============================================================================

proptest! {
    /// Derivations never mutate the base vector
    #[test]
    fn prop_operations_preserve_original(
        elements in prop::collection::vec(any::<i32>(), 1..200),
        new_element: i32
    ) {
        let vector: PersistentVector<i32> = elements.iter().copied().collect();
        let snapshot: Vec<i32> = vector.iter().copied().collect();

        let _pushed = vector.push_back(new_element);
        let _popped = vector.pop_back();
        let _updated = vector.update(0, new_element);

        let after: Vec<i32> = vector.iter().copied().collect();
        prop_assert_eq!(after, snapshot);
    }
}
