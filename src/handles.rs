//! The three handle pools: interned strings, byte buffers, and arrays
//! (§4.3). Each pool is a single mutex-guarded `Vec<Entry>` keyed by a
//! monotonic handle (per the handle-pool redesign note in §9); handles are
//! never reused and the pool is only ever cleared between programs.

use std::sync::{Arc, Mutex};

use crate::ids::{ArrayHandle, BufferHandle, StringHandle};
use crate::value::{RValue, ValueKind};

/// Process-global (per-program) table of interned UTF-8 strings.
///
/// `add` de-duplicates by value (§3 invariant 5, §8 property 3): two
/// identical literals resolve to the same handle.
#[derive(Default)]
pub struct StringPool {
    inner: Mutex<StringPoolInner>,
}

#[derive(Default)]
struct StringPoolInner {
    entries: Vec<Arc<str>>,
    by_value: hashbrown::HashMap<Arc<str>, StringHandle>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `value`, returning the existing handle if this exact string
    /// has already been interned.
    pub fn intern(&self, value: &str) -> StringHandle {
        let mut inner = self.inner.lock().unwrap();
        if let Some(handle) = inner.by_value.get(value) {
            return *handle;
        }
        let owned: Arc<str> = Arc::from(value);
        inner.entries.push(owned.clone());
        let handle = StringHandle(inner.entries.len() as u32);
        inner.by_value.insert(owned, handle);
        handle
    }

    /// Returns the content behind a handle, if it is still live.
    pub fn get(&self, handle: StringHandle) -> Option<Arc<str>> {
        if handle.is_invalid() {
            return None;
        }
        self.inner
            .lock()
            .unwrap()
            .entries
            .get((handle.0 - 1) as usize)
            .cloned()
    }

    /// Empties the pool. Called only between programs (§4.5).
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
        inner.by_value.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-global (per-program) table of byte buffers.
#[derive(Default)]
pub struct BufferPool {
    entries: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies `bytes` into a fresh pool entry and returns its handle.
    pub fn add(&self, bytes: Vec<u8>) -> BufferHandle {
        let mut entries = self.entries.lock().unwrap();
        entries.push(bytes);
        BufferHandle(entries.len() as u32)
    }

    /// Replaces the content stored at an existing handle.
    pub fn set(&self, handle: BufferHandle, bytes: Vec<u8>) -> Option<()> {
        let mut entries = self.entries.lock().unwrap();
        let slot = entries.get_mut((handle.0.checked_sub(1)?) as usize)?;
        *slot = bytes;
        Some(())
    }

    /// Returns a read-only copy of the buffer's current content.
    pub fn get(&self, handle: BufferHandle) -> Option<Vec<u8>> {
        if handle.is_invalid() {
            return None;
        }
        self.entries
            .lock()
            .unwrap()
            .get((handle.0 - 1) as usize)
            .cloned()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

/// One array pool entry: the element sequence plus its immutable element
/// type (§3 invariant 6).
#[derive(Debug, Clone)]
pub struct ArrayEntry {
    pub element_type: ValueKind,
    pub elements: Vec<RValue>,
}

/// Process-global (per-program) table of array payloads.
#[derive(Default)]
pub struct ArrayPool {
    entries: Mutex<Vec<ArrayEntry>>,
}

impl ArrayPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies an array's element sequence into a fresh pool entry.
    pub fn add(&self, element_type: ValueKind, elements: Vec<RValue>) -> ArrayHandle {
        let mut entries = self.entries.lock().unwrap();
        entries.push(ArrayEntry {
            element_type,
            elements,
        });
        ArrayHandle(entries.len() as u32)
    }

    /// Replaces the elements stored at an existing handle. The element
    /// type cannot change (§3 invariant 6); callers that violate this are
    /// a VM bug, not a recoverable condition.
    pub fn set(&self, handle: ArrayHandle, elements: Vec<RValue>) -> Option<()> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.get_mut((handle.0.checked_sub(1)?) as usize)?;
        entry.elements = elements;
        Some(())
    }

    pub fn get(&self, handle: ArrayHandle) -> Option<ArrayEntry> {
        if handle.is_invalid() {
            return None;
        }
        self.entries
            .lock()
            .unwrap()
            .get((handle.0 - 1) as usize)
            .cloned()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_share_a_handle() {
        let pool = StringPool::new();
        let a = pool.intern("hello");
        let b = pool.intern("hello");
        assert_eq!(a, b);
        assert_eq!(pool.get(a).unwrap().as_ref(), "hello");
    }

    #[test]
    fn distinct_strings_get_distinct_handles() {
        let pool = StringPool::new();
        let a = pool.intern("hello");
        let b = pool.intern("world");
        assert_ne!(a, b);
    }

    #[test]
    fn clear_drops_all_entries() {
        let pool = StringPool::new();
        let handle = pool.intern("temp");
        pool.clear();
        assert!(pool.get(handle).is_none());
    }

    #[test]
    fn buffer_pool_set_replaces_content() {
        let pool = BufferPool::new();
        let handle = pool.add(vec![1, 2, 3]);
        pool.set(handle, vec![9]).unwrap();
        assert_eq!(pool.get(handle).unwrap(), vec![9]);
    }

    #[test]
    fn array_pool_tracks_element_type() {
        let pool = ArrayPool::new();
        let handle = pool.add(ValueKind::Integer, vec![RValue::Integer(1), RValue::Integer(2)]);
        let entry = pool.get(handle).unwrap();
        assert_eq!(entry.element_type, ValueKind::Integer);
        assert_eq!(entry.elements.len(), 2);
    }
}
