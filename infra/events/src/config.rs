use serde::Deserialize;

const DEFAULT_TYPE_CAPACITY: usize = 16;
const DEFAULT_RELAY_CAPACITY: usize = 4;
const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Sizing hints for a [`Bus`](crate::Bus).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Number of event type slots allocated up front.
    pub type_capacity: usize,
    /// Number of relays the bus expects to fan out to.
    pub relay_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { type_capacity: DEFAULT_TYPE_CAPACITY, relay_capacity: DEFAULT_RELAY_CAPACITY }
    }
}

/// Sizing hints for a [`Relay`](crate::Relay).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Initial capacity of each typed buffer in the relay queue.
    pub queue_capacity: usize,
    /// Configuration of the relay's private bus.
    pub bus: BusConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { queue_capacity: DEFAULT_QUEUE_CAPACITY, bus: BusConfig::default() }
    }
}
