use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A callable registered for events of type `T`.
pub(crate) type Callback<T> = Arc<dyn Fn(&mut T) + Send + Sync>;

/// Identifies one connection inside the signal of a single event type.
///
/// Handles are only meaningful for the `(event type, bus)` pair that issued them.
/// A handle from another pair never matches and is silently ignored on disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionHandle(u64);

impl ConnectionHandle {
    /// Raw handle value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

struct Entry<T> {
    handle: ConnectionHandle,
    callback: Callback<T>,
}

impl<T> Clone for Entry<T> {
    fn clone(&self) -> Self {
        Self { handle: self.handle, callback: Arc::clone(&self.callback) }
    }
}

/// Multicast store of callables for one event type.
///
/// Connect and disconnect copy-on-write the entry list under a write lock; emit takes a
/// cheap snapshot under a read lock and runs the callables with no lock held. Callables
/// may therefore connect, disconnect or emit re-entrantly, and a disconnect is visible
/// to every emit that starts after it returns.
pub(crate) struct Signal<T> {
    entries: RwLock<Arc<Vec<Entry<T>>>>,
    next_handle: AtomicU64,
}

impl<T: 'static> Signal<T> {
    pub(crate) fn new() -> Self {
        Self { entries: RwLock::new(Arc::new(Vec::new())), next_handle: AtomicU64::new(0) }
    }

    pub(crate) fn connect(&self, callback: Callback<T>) -> ConnectionHandle {
        let handle = ConnectionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let mut entries = self.entries.write();
        Arc::make_mut(&mut *entries).push(Entry { handle, callback });
        handle
    }

    /// Returns `false` when the handle was unknown or already removed.
    pub(crate) fn disconnect(&self, handle: ConnectionHandle) -> bool {
        let mut entries = self.entries.write();
        let Some(pos) = entries.iter().position(|e| e.handle == handle) else {
            return false;
        };
        Arc::make_mut(&mut *entries).remove(pos);
        true
    }

    pub(crate) fn emit(&self, event: &mut T) {
        let snapshot = Arc::clone(&*self.entries.read());
        for entry in snapshot.iter() {
            (entry.callback)(&mut *event);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("event", &std::any::type_name::<T>())
            .field("listeners", &self.entries.read().len())
            .finish_non_exhaustive()
    }
}

/// Type-erased view of a [`Signal`] stored in a bus slot table.
pub(crate) trait ErasedSignal: Send + Sync + fmt::Debug {
    fn disconnect_erased(&self, handle: ConnectionHandle) -> bool;

    fn listener_count(&self) -> usize;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: 'static> ErasedSignal for Signal<T> {
    fn disconnect_erased(&self, handle: ConnectionHandle) -> bool {
        self.disconnect(handle)
    }

    fn listener_count(&self) -> usize {
        self.len()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
