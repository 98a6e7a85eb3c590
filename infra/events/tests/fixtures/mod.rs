use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use tybus_events::{Receive, Subscriber, Subscription};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntEvent {
    pub value: i32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextEvent(pub &'static str);

/// Stores the last received value. Multiplies it by ten when dropped, so tests can
/// observe that teardown ran exactly once.
#[derive(Debug, Default)]
pub struct CounterListener {
    pub counter: Arc<AtomicI32>,
    subscription: Subscription,
}

impl CounterListener {
    #[must_use]
    pub fn new(counter: Arc<AtomicI32>) -> Arc<Self> {
        Arc::new(Self { counter, subscription: Subscription::new() })
    }
}

impl Subscriber for CounterListener {
    fn subscription(&self) -> &Subscription {
        &self.subscription
    }
}

impl Receive<IntEvent> for CounterListener {
    fn receive(&self, event: &mut IntEvent) {
        self.counter.store(event.value, Ordering::SeqCst);
    }
}

impl Drop for CounterListener {
    fn drop(&mut self) {
        let current = self.counter.load(Ordering::SeqCst);
        self.counter.store(current * 10, Ordering::SeqCst);
    }
}

/// Listens to both fixture event types and counts deliveries per type.
#[derive(Debug, Default)]
pub struct MultiListener {
    pub ints: AtomicI32,
    pub texts: AtomicI32,
    subscription: Subscription,
}

impl Subscriber for MultiListener {
    fn subscription(&self) -> &Subscription {
        &self.subscription
    }
}

impl Receive<IntEvent> for MultiListener {
    fn receive(&self, _event: &mut IntEvent) {
        self.ints.fetch_add(1, Ordering::SeqCst);
    }
}

impl Receive<TextEvent> for MultiListener {
    fn receive(&self, _event: &mut TextEvent) {
        self.texts.fetch_add(1, Ordering::SeqCst);
    }
}

/// Routes `tracing` output of the crate under test to the test harness.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}
