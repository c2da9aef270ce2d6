use arc_swap::ArcSwap;
use std::sync::Arc;

/// A lockless cell holding the latest published value.
///
/// One owner publishes immutable snapshots; any number of readers load the
/// current one without blocking the owner. Readers keep whatever snapshot
/// they loaded even if a newer one is published afterwards.
#[derive(Debug)]
pub struct Published<T> {
    value: ArcSwap<T>,
}

impl<T: Default> Default for Published<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Published<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: ArcSwap::from_pointee(value),
        }
    }

    /// Replaces the current value.
    pub fn publish(&self, value: T) {
        self.value.store(Arc::new(value));
    }

    /// Returns the most recently published value.
    pub fn load(&self) -> Arc<T> {
        self.value.load_full()
    }
}
