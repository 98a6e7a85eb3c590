use crate::bus::{Bus, Event};
use crate::type_index::type_index;
use parking_lot::{Mutex, RwLock};
use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Double buffer for one event type.
///
/// Producers only touch `pending`; the consumer only reads `stable`. The two are
/// exchanged by [`AsyncQueue::sync`].
struct TypedQueue<T> {
    pending: Mutex<Vec<T>>,
    stable: Mutex<Vec<T>>,
}

impl<T> TypedQueue<T> {
    fn with_capacity(capacity: usize) -> Self {
        Self { pending: Mutex::new(Vec::with_capacity(capacity)), stable: Mutex::new(Vec::new()) }
    }
}

impl<T> fmt::Debug for TypedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedQueue")
            .field("event", &type_name::<T>())
            .field("pending", &self.pending.lock().len())
            .field("stable", &self.stable.lock().len())
            .finish()
    }
}

trait ErasedQueue: Send + Sync + fmt::Debug {
    fn sync(&self);

    fn emit(&self, bus: &Bus) -> usize;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Event> ErasedQueue for TypedQueue<T> {
    fn sync(&self) {
        let mut stable = self.stable.lock();
        let mut pending = self.pending.lock();
        std::mem::swap(&mut *stable, &mut *pending);
        pending.clear();
        pending.reserve(stable.capacity());
    }

    fn emit(&self, bus: &Bus) -> usize {
        // Deliver without holding the lock so local callables may emit upstream,
        // which pushes back into `pending` of this very queue.
        let mut batch = std::mem::take(&mut *self.stable.lock());
        let count = batch.len();
        if count > 0 {
            bus.emit_batch(&mut batch);
        }
        *self.stable.lock() = batch;
        count
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Thread-safe, double-buffered hand-off of events of any number of types.
///
/// Any thread may [`push`](Self::push). A single consumer periodically calls
/// [`sync`](Self::sync) to turn everything pushed so far into the stable batch, and
/// [`emit_events`](Self::emit_events) to deliver that batch to a [`Bus`]. Events of
/// one type keep their push order; there is no ordering across types.
///
/// `sync` must not be called from more than one thread at a time.
#[derive(Default)]
pub struct AsyncQueue {
    queues: RwLock<Vec<Option<Arc<dyn ErasedQueue>>>>,
    initial_capacity: usize,
}

impl AsyncQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a queue whose typed buffers start with room for `capacity` events.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self { queues: RwLock::new(Vec::new()), initial_capacity: capacity }
    }

    /// Appends `event` to the pending buffer of its type.
    ///
    /// # Examples
    /// ```rust
    /// use tybus_events::AsyncQueue;
    ///
    /// #[derive(Clone)]
    /// struct Job(u32);
    ///
    /// let queue = AsyncQueue::new();
    /// queue.push(Job(1));
    /// queue.push(Job(2));
    /// assert_eq!(queue.pending_len::<Job>(), 2);
    /// assert_eq!(queue.stable_len::<Job>(), 0);
    /// ```
    pub fn push<T: Event>(&self, event: T) {
        self.get_or_create_queue::<T>().pending.lock().push(event);
    }

    /// Reserves room for `additional` more pending events of type `T`.
    pub fn reserve<T: Event>(&self, additional: usize) {
        self.get_or_create_queue::<T>().pending.lock().reserve(additional);
    }

    /// Swaps the pending and stable buffers of every type.
    ///
    /// Everything pushed before the swap becomes the new stable batch; the previous
    /// stable batch is discarded and its allocation reused for new pushes.
    ///
    /// # Examples
    /// ```rust
    /// use tybus_events::AsyncQueue;
    ///
    /// #[derive(Clone, Debug, PartialEq)]
    /// struct Job(u32);
    ///
    /// let queue = AsyncQueue::new();
    /// queue.push(Job(7));
    /// queue.sync();
    /// queue.with_events::<Job, _>(|jobs| assert_eq!(jobs, [Job(7)]));
    ///
    /// // Nothing was pushed since, so the next batch is empty.
    /// queue.sync();
    /// assert_eq!(queue.stable_len::<Job>(), 0);
    /// ```
    pub fn sync(&self) {
        for queue in self.snapshot() {
            queue.sync();
        }
    }

    /// Delivers the stable batch of every type to `bus` and returns the number of
    /// events delivered.
    pub fn emit_events(&self, bus: &Bus) -> usize {
        let delivered: usize = self.snapshot().iter().map(|queue| queue.emit(bus)).sum();
        trace!(delivered, "Queued events emitted");
        delivered
    }

    /// [`sync`](Self::sync) followed by [`emit_events`](Self::emit_events).
    pub fn sync_and_emit_events(&self, bus: &Bus) -> usize {
        self.sync();
        self.emit_events(bus)
    }

    /// Runs `f` over the current stable batch of `T`.
    pub fn with_events<T: Event, R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        match self.queue::<T>() {
            Some(queue) => f(&queue.stable.lock()),
            None => f(&[]),
        }
    }

    /// Number of events of type `T` waiting for the next [`sync`](Self::sync).
    #[must_use]
    pub fn pending_len<T: Event>(&self) -> usize {
        self.queue::<T>().map_or(0, |queue| queue.pending.lock().len())
    }

    /// Number of events of type `T` in the current stable batch.
    #[must_use]
    pub fn stable_len<T: Event>(&self) -> usize {
        self.queue::<T>().map_or(0, |queue| queue.stable.lock().len())
    }

    fn snapshot(&self) -> Vec<Arc<dyn ErasedQueue>> {
        self.queues.read().iter().flatten().cloned().collect()
    }

    fn queue<T: Event>(&self) -> Option<Arc<TypedQueue<T>>> {
        let index = type_index::<T>().get();
        let erased = self.queues.read().get(index).and_then(Option::clone)?;
        erased.into_any().downcast::<TypedQueue<T>>().ok()
    }

    fn get_or_create_queue<T: Event>(&self) -> Arc<TypedQueue<T>> {
        if let Some(queue) = self.queue::<T>() {
            return queue;
        }

        let index = type_index::<T>().get();
        let mut queues = self.queues.write();
        if index >= queues.len() {
            queues.resize_with(index + 1, || None);
        }
        let erased = queues[index]
            .get_or_insert_with(|| {
                trace!(event = type_name::<T>(), index, "Initializing new event queue");
                let queue: Arc<dyn ErasedQueue> =
                    Arc::new(TypedQueue::<T>::with_capacity(self.initial_capacity));
                queue
            })
            .clone();
        drop(queues);

        erased.into_any().downcast::<TypedQueue<T>>().unwrap_or_else(|_| {
            unreachable!("queue slot {index} holds a different event type than {}", type_name::<T>())
        })
    }
}

impl fmt::Debug for AsyncQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncQueue")
            .field("queues", &self.snapshot())
            .field("initial_capacity", &self.initial_capacity)
            .finish()
    }
}
