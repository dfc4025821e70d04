//! Local subscribers of a topic receiver

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::SubscriberError;
use crate::serializer::{Message, SerializerEntry};
use crate::stats::ReceiveMetrics;

/// Subscriber service contract
pub trait Subscriber: Send + Sync {
    /// Called before the first message is delivered
    ///
    /// An error is logged and retried on the next reconnect tick; messages
    /// are delivered regardless.
    fn init(&self) -> Result<(), SubscriberError> {
        Ok(())
    }

    /// Deliver one message; the subscriber owns `msg` from here on
    fn receive(&self, msg_fqn: &str, msg_type_id: u32, msg: Message);
}

/// State kept per subscribing component
pub(crate) struct SubscriberEntry {
    pub(crate) usage_count: usize,
    pub(crate) service: Arc<dyn Subscriber>,
    pub(crate) codecs: HashMap<u32, Arc<SerializerEntry>>,
    pub(crate) metrics: HashMap<(u32, Uuid), ReceiveMetrics>,
    pub(crate) initialized: bool,
}

impl SubscriberEntry {
    pub(crate) fn new(service: Arc<dyn Subscriber>, codecs: HashMap<u32, Arc<SerializerEntry>>) -> Self {
        Self {
            usage_count: 1,
            service,
            codecs,
            metrics: HashMap::new(),
            initialized: false,
        }
    }

    pub(crate) fn metrics_for(&mut self, msg_type_id: u32, origin: Uuid) -> &mut ReceiveMetrics {
        self.metrics
            .entry((msg_type_id, origin))
            .or_insert_with(|| ReceiveMetrics::new(msg_type_id, origin))
    }
}

/// The guarded subscriber map
#[derive(Default)]
pub(crate) struct SubscriberMap {
    pub(crate) entries: HashMap<u64, SubscriberEntry>,
    /// Cached; only recomputed while `false`
    pub(crate) all_initialized: bool,
}
