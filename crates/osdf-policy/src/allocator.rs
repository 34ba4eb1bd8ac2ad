//! Dense policy id allocation

use osdf_common::PolicyId;

/// Hands out the smallest id not currently in use
///
/// The allocator itself is stateless. Callers that need the result to stay
/// unique must hold the store's admin lock from snapshot to insert, which
/// [`crate::PolicyStore::create_current`] does.
#[derive(Debug, Default, Clone, Copy)]
pub struct PolicyIdAllocator;

impl PolicyIdAllocator {
    /// Create allocator
    pub fn new() -> Self {
        Self
    }

    /// Smallest non-negative id absent from `existing`
    pub fn allocate<I>(&self, existing: I) -> PolicyId
    where
        I: IntoIterator<Item = PolicyId>,
    {
        let mut ids: Vec<u32> = existing.into_iter().map(|id| id.value()).collect();
        ids.sort_unstable();
        ids.dedup();

        // ids[i] >= i for sorted distinct values; find the first i where ids[i] > i
        let (mut lo, mut hi) = (0usize, ids.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if ids[mid] as usize == mid {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        PolicyId(lo as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(v: &[u32]) -> Vec<PolicyId> {
        v.iter().copied().map(PolicyId).collect()
    }

    #[test]
    fn test_fills_first_gap() {
        let alloc = PolicyIdAllocator::new();
        assert_eq!(alloc.allocate(ids(&[0, 1, 3])), PolicyId(2));
        assert_eq!(alloc.allocate(ids(&[])), PolicyId(0));
        assert_eq!(alloc.allocate(ids(&[0, 1, 2])), PolicyId(3));
        assert_eq!(alloc.allocate(ids(&[1, 2, 3])), PolicyId(0));
        assert_eq!(alloc.allocate(ids(&[5, 0, 2, 1, 2])), PolicyId(3));
    }

    proptest! {
        #[test]
        fn prop_smallest_missing(set in proptest::collection::btree_set(0u32..64, 0..40)) {
            let got = PolicyIdAllocator::new().allocate(set.iter().copied().map(PolicyId));
            prop_assert!(!set.contains(&got.value()));
            for smaller in 0..got.value() {
                prop_assert!(set.contains(&smaller));
            }
        }
    }
}
