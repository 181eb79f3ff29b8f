//! Invalidation target trait and composite implementation.
//!
//! Defines [`InvalidationTarget`] for anything that holds data under query
//! keys and must drop or refetch it after a mutation, and
//! [`CompositeInvalidation`] which fans one invalidation out to many targets.

use std::sync::Arc;

use backoffice_core::QueryKey;

/// Holder of key-addressed data that can be marked stale.
///
/// Used as `Arc<dyn InvalidationTarget>`.
pub trait InvalidationTarget: Send + Sync {
    /// Marks everything whose key starts with `prefix` as stale.
    ///
    /// Returns how many entries were affected.
    fn invalidate(&self, prefix: &QueryKey) -> usize;
}

/// Composite target that fans out to multiple targets.
///
/// Lets one mutation invalidate the query cache and every live infinite list
/// in one call.
#[derive(Default)]
pub struct CompositeInvalidation {
    targets: Vec<Arc<dyn InvalidationTarget>>,
}

impl CompositeInvalidation {
    /// Creates a composite with the given targets.
    #[must_use]
    pub fn new(targets: Vec<Arc<dyn InvalidationTarget>>) -> Self {
        Self { targets }
    }

    /// Adds a target after construction.
    pub fn add(&mut self, target: Arc<dyn InvalidationTarget>) {
        self.targets.push(target);
    }
}

impl InvalidationTarget for CompositeInvalidation {
    fn invalidate(&self, prefix: &QueryKey) -> usize {
        self.targets.iter().map(|t| t.invalidate(prefix)).sum()
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    /// Records every prefix it is asked to invalidate.
    #[derive(Default)]
    struct RecordingTarget {
        seen: Mutex<Vec<QueryKey>>,
    }

    impl InvalidationTarget for RecordingTarget {
        fn invalidate(&self, prefix: &QueryKey) -> usize {
            self.seen.lock().push(prefix.clone());
            1
        }
    }

    #[test]
    fn composite_fans_out_and_sums() {
        let a = Arc::new(RecordingTarget::default());
        let b = Arc::new(RecordingTarget::default());

        let mut composite = CompositeInvalidation::new(vec![a.clone()]);
        composite.add(b.clone());

        let prefix = QueryKey::new("deposits");
        assert_eq!(composite.invalidate(&prefix), 2);
        assert_eq!(a.seen.lock().as_slice(), [prefix.clone()]);
        assert_eq!(b.seen.lock().as_slice(), [prefix]);
    }

    #[test]
    fn empty_composite_affects_nothing() {
        let composite = CompositeInvalidation::default();
        assert_eq!(composite.invalidate(&QueryKey::new("users")), 0);
    }
}
