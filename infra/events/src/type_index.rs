use fxhash::FxHashMap;
use parking_lot::RwLock;
use std::any::{TypeId, type_name};
use std::fmt;
use std::sync::LazyLock;
use tracing::trace;

static REGISTRY: LazyLock<RwLock<FxHashMap<TypeId, EventTypeIndex>>> =
    LazyLock::new(|| RwLock::new(FxHashMap::default()));

/// Stable, process-wide index of one event type.
///
/// Indices are handed out lazily on first lookup, starting at zero and growing by one
/// for every new type. They are never reused or freed, which makes them suitable for
/// addressing dense per-type tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventTypeIndex(usize);

impl EventTypeIndex {
    /// Returns the index of `T`, allocating it on first use.
    ///
    /// # Examples
    /// ```rust
    /// use tybus_events::EventTypeIndex;
    ///
    /// struct Ping;
    /// struct Pong;
    ///
    /// assert_eq!(EventTypeIndex::of::<Ping>(), EventTypeIndex::of::<Ping>());
    /// assert_ne!(EventTypeIndex::of::<Ping>(), EventTypeIndex::of::<Pong>());
    /// ```
    #[must_use]
    pub fn of<T: 'static>() -> Self {
        let id = TypeId::of::<T>();

        if let Some(index) = REGISTRY.read().get(&id) {
            return *index;
        }

        let mut registry = REGISTRY.write();
        let next = registry.len();
        *registry.entry(id).or_insert_with(|| {
            trace!(event = type_name::<T>(), index = next, "Assigned event type index");
            Self(next)
        })
    }

    /// Raw value, usable as a table offset.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for EventTypeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Shorthand for [`EventTypeIndex::of`].
#[must_use]
pub fn type_index<T: 'static>() -> EventTypeIndex {
    EventTypeIndex::of::<T>()
}

/// Number of event types that have been assigned an index so far.
#[must_use]
pub fn registered_types() -> usize {
    REGISTRY.read().len()
}
