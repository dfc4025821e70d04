//! Per-component publisher handles

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use uuid::Uuid;

use crate::error::{CodecError, ServiceError};
use crate::matching::ComponentId;
use crate::protocol::{MessageHeader, WireMessage};
use crate::sender::SenderShared;
use crate::serializer::SerializerEntry;
use crate::stats::{SendMetrics, SenderMetricsSnapshot};
use crate::sync::{LockRank, RankedMutex};

/// Send state of one message type
struct SendEntry {
    msg_fqn: String,
    header: MessageHeader,
    seq_nr: AtomicU32,
    metrics: RankedMutex<SendMetrics>,
}

impl SendEntry {
    fn new(codec: &SerializerEntry, origin: Uuid) -> Self {
        Self {
            msg_fqn: codec.info.fqn.clone(),
            header: MessageHeader::template(codec.info.msg_id, codec.info.version, origin),
            seq_nr: AtomicU32::new(0),
            metrics: RankedMutex::new(LockRank::Metrics, "sender.metrics", SendMetrics::default()),
        }
    }

    /// Sequence numbers start at 1
    fn next_seq_nr(&self) -> u32 {
        self.seq_nr.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }
}

/// State bound to one publishing component
pub(crate) struct BoundState {
    component: ComponentId,
    entries: RankedMutex<HashMap<u32, Arc<SendEntry>>>,
}

impl BoundState {
    pub(crate) fn new(component: ComponentId) -> Self {
        Self {
            component,
            entries: RankedMutex::new(LockRank::EntityState, "sender.entries", HashMap::new()),
        }
    }

    fn entry(&self, codec: &SerializerEntry, origin: Uuid) -> Arc<SendEntry> {
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(codec.info.msg_id)
            .or_insert_with(|| Arc::new(SendEntry::new(codec, origin)));
        Arc::clone(entry)
    }

    pub(crate) fn snapshots(&self, shared: &SenderShared) -> Vec<SenderMetricsSnapshot> {
        let entries: Vec<Arc<SendEntry>> = self.entries.lock().values().cloned().collect();
        entries
            .iter()
            .map(|entry| SenderMetricsSnapshot {
                scope: shared.scope.clone(),
                topic: shared.topic.clone(),
                component: self.component,
                msg_type_id: entry.header.type_id,
                msg_fqn: entry.msg_fqn.clone(),
                metrics: entry.metrics.lock().clone(),
            })
            .collect()
    }
}

/// Publisher service handed to one component
///
/// Cloning shares the component's bound entry; the entry is released when the
/// last handle is dropped.
pub struct PublisherHandle {
    shared: Arc<SenderShared>,
    state: Arc<BoundState>,
}

impl PublisherHandle {
    pub(crate) fn new(shared: Arc<SenderShared>, state: Arc<BoundState>) -> Self {
        Self { shared, state }
    }

    pub fn component(&self) -> ComponentId {
        self.state.component
    }

    /// Local message type id for a fully qualified message name
    pub fn msg_type_id_for(&self, fqn: &str) -> Option<u32> {
        self.shared
            .registry
            .msg_id_for_fqn(&self.shared.serialization_type, fqn)
    }

    /// Serialize and write one message
    ///
    /// Fails if no receiver is connected; the message is then dropped.
    pub async fn send(&self, type_id: u32, msg: &(dyn Any + Sync)) -> Result<(), ServiceError> {
        let shared = &self.shared;
        if shared.closed.load(Ordering::Acquire) {
            return Err(ServiceError::Closed);
        }

        let Some(codec) = shared.registry.acquire(&shared.serialization_type, type_id) else {
            tracing::warn!(
                uri = %shared.uri,
                serialization_type = %shared.serialization_type,
                type_id,
                "No serializer for message type"
            );
            return Err(ServiceError::NoSerializer {
                serialization_type: shared.serialization_type.clone(),
                type_id,
            });
        };
        let entry = self.state.entry(&codec, shared.origin);

        let not_connected = || {
            tracing::debug!(uri = %shared.uri, type_id, "No receiver connected, dropping message");
            ServiceError::NotConnected {
                uri: shared.uri.clone(),
            }
        };
        if shared.connection.lock().is_none() {
            return Err(not_connected());
        }

        // The first-send delay is only spent once a receiver is attached
        shared.gate.wait().await;
        let connection = shared.connection.lock().clone();
        let Some(connection) = connection else {
            return Err(not_connected());
        };

        let started = Instant::now();
        let payload = match codec.codec.serialize(msg) {
            Ok(payload) => payload,
            Err(e) => {
                if shared.metrics_enabled {
                    entry.metrics.lock().record_serialization_error();
                }
                tracing::warn!(uri = %shared.uri, msg = %entry.msg_fqn, error = %e, "Serialization failed");
                return Err(e.into());
            }
        };
        let serialization_time = started.elapsed();

        let mut header = entry.header.clone();
        header.seq_nr = entry.next_seq_nr();
        header.send_time = SystemTime::now();
        let frame = WireMessage::new(header, payload)
            .encode()
            .map_err(|e| ServiceError::Serialize(CodecError::Invalid(e.to_string())))?;

        let written = connection.write_frame(&frame).await;
        let now = Instant::now();

        match written {
            Ok(()) => {
                if shared.metrics_enabled {
                    entry.metrics.lock().record_sent(serialization_time, now);
                }
                Ok(())
            }
            Err(e) => {
                if shared.metrics_enabled {
                    entry.metrics.lock().record_send_failed(serialization_time, now);
                }
                tracing::warn!(uri = %shared.uri, peer = %connection.peer(), error = %e, "Write failed");
                Err(ServiceError::Write(e))
            }
        }
    }
}

impl Clone for PublisherHandle {
    fn clone(&self) -> Self {
        let state = self.shared.get(self.state.component);
        Self {
            shared: Arc::clone(&self.shared),
            state,
        }
    }
}

impl Drop for PublisherHandle {
    fn drop(&mut self) {
        self.shared.unget(self.state.component);
    }
}

impl std::fmt::Debug for PublisherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublisherHandle")
            .field("uri", &self.shared.uri)
            .field("component", &self.state.component)
            .finish()
    }
}
