//! Process-wide root table
//!
//! Keeps Rust objects alive while native memory refers to them. A native block
//! stores only the pointer-sized [`RootHandle`]; the object itself lives in the
//! table until the handle is freed.

use std::any::Any;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

type Rooted = Arc<dyn Any + Send + Sync>;

/// Opaque, pointer-sized token for a rooted object. Never zero.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootHandle(NonZeroUsize);

impl RootHandle {
    pub fn as_raw(self) -> usize {
        self.0.get()
    }

    pub fn from_raw(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(RootHandle)
    }
}

/// Thread-safe map from handles to strongly held objects.
pub struct RootTable {
    roots: DashMap<usize, Rooted>,
    next_id: AtomicUsize,
}

impl RootTable {
    pub fn new() -> Self {
        Self {
            roots: DashMap::new(),
            next_id: AtomicUsize::new(0),
        }
    }

    /// Root `object` and return its handle.
    pub fn root<T: Any + Send + Sync>(&self, object: Arc<T>) -> RootHandle {
        let id = NonZeroUsize::MIN.saturating_add(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.roots.insert(id.get(), object);
        RootHandle(id)
    }

    /// Recover the object behind `handle`.
    ///
    /// `None` if the handle was freed or the object is not a `T`.
    pub fn target<T: Any + Send + Sync>(&self, handle: RootHandle) -> Option<Arc<T>> {
        let rooted = self.roots.get(&handle.as_raw())?.value().clone();
        rooted.downcast::<T>().ok()
    }

    /// Drop the table's reference. Returns `false` if the handle was not rooted.
    pub fn free(&self, handle: RootHandle) -> bool {
        // The removed Arc is dropped after the shard lock is released, so a
        // destructor that touches the table cannot deadlock.
        let removed = self.roots.remove(&handle.as_raw());
        removed.is_some()
    }

    pub fn is_rooted(&self, handle: RootHandle) -> bool {
        self.roots.contains_key(&handle.as_raw())
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

impl Default for RootTable {
    fn default() -> Self {
        Self::new()
    }
}

static ROOTS: Lazy<RootTable> = Lazy::new(RootTable::new);

/// The table used by lifetime blocks.
pub fn roots() -> &'static RootTable {
    &ROOTS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_and_target() {
        let table = RootTable::new();
        let object = Arc::new(String::from("willy"));
        let handle = table.root(object.clone());

        let target = table.target::<String>(handle).unwrap();
        assert!(Arc::ptr_eq(&target, &object));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_target_wrong_type() {
        let table = RootTable::new();
        let handle = table.root(Arc::new(42u32));
        assert!(table.target::<String>(handle).is_none());
        assert!(table.is_rooted(handle));
    }

    #[test]
    fn test_free_releases_object() {
        let table = RootTable::new();
        let object = Arc::new(7i64);
        let handle = table.root(object.clone());
        assert_eq!(Arc::strong_count(&object), 2);

        assert!(table.free(handle));
        assert_eq!(Arc::strong_count(&object), 1);
        assert!(!table.is_rooted(handle));
        assert!(table.target::<i64>(handle).is_none());

        // Second free is a no-op
        assert!(!table.free(handle));
    }

    #[test]
    fn test_handles_are_distinct_and_nonzero() {
        let table = RootTable::new();
        let a = table.root(Arc::new(1u8));
        let b = table.root(Arc::new(1u8));
        assert_ne!(a, b);
        assert_ne!(a.as_raw(), 0);
        assert_eq!(RootHandle::from_raw(0), None);
        assert_eq!(RootHandle::from_raw(a.as_raw()), Some(a));
    }
}
