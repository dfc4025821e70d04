//! Serializer registry
//!
//! `serialization type -> (message type id -> entry)`. Entries are handed out
//! as `Arc`s, so a send or dispatch in progress keeps its codec alive even when
//! the service is withdrawn concurrently; the registry lock itself is only held
//! for the lookup.

use std::collections::HashMap;
use std::sync::Arc;

use crate::serializer::{MessageSerializer, SerializerInfo};
use crate::sync::{LockRank, RankedReadGuard, RankedRwLock, RankedWriteGuard};

/// One registered codec
pub struct SerializerEntry {
    pub info: SerializerInfo,
    pub codec: Arc<dyn MessageSerializer>,
}

impl std::fmt::Debug for SerializerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerializerEntry")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Outcome of removing one codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Removal {
    pub removed: bool,
    /// No codec of this serialization type is left
    pub type_exhausted: bool,
}

/// The guarded map
#[derive(Default)]
pub struct SerializerMap {
    types: HashMap<String, HashMap<u32, Arc<SerializerEntry>>>,
}

impl SerializerMap {
    /// Insert if absent; returns `false` when the (type, id) pair is taken
    pub fn insert(&mut self, info: SerializerInfo, codec: Arc<dyn MessageSerializer>) -> bool {
        let by_id = self.types.entry(info.serialization_type.clone()).or_default();
        if by_id.contains_key(&info.msg_id) {
            return false;
        }
        by_id.insert(info.msg_id, Arc::new(SerializerEntry { info, codec }));
        true
    }

    pub fn remove(&mut self, serialization_type: &str, msg_id: u32) -> Removal {
        let Some(by_id) = self.types.get_mut(serialization_type) else {
            return Removal {
                removed: false,
                type_exhausted: false,
            };
        };

        let removed = by_id.remove(&msg_id).is_some();
        let type_exhausted = by_id.is_empty();
        if type_exhausted {
            self.types.remove(serialization_type);
        }
        Removal {
            removed,
            type_exhausted: removed && type_exhausted,
        }
    }

    pub fn get(&self, serialization_type: &str, msg_id: u32) -> Option<Arc<SerializerEntry>> {
        self.types.get(serialization_type)?.get(&msg_id).cloned()
    }

    pub fn has_type(&self, serialization_type: &str) -> bool {
        self.types.contains_key(serialization_type)
    }

    pub fn msg_id_for_fqn(&self, serialization_type: &str, fqn: &str) -> Option<u32> {
        self.types
            .get(serialization_type)?
            .values()
            .find(|e| e.info.fqn == fqn)
            .map(|e| e.info.msg_id)
    }

    pub fn entries_for(&self, serialization_type: &str) -> HashMap<u32, Arc<SerializerEntry>> {
        self.types
            .get(serialization_type)
            .cloned()
            .unwrap_or_default()
    }

    /// Registered serialization types, sorted
    pub fn types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.types.keys().cloned().collect();
        types.sort();
        types
    }
}

/// Thread-safe registry of codecs
pub struct SerializerRegistry {
    map: RankedRwLock<SerializerMap>,
}

impl SerializerRegistry {
    pub fn new() -> Self {
        Self {
            map: RankedRwLock::new(LockRank::Serializers, "serializers", SerializerMap::default()),
        }
    }

    /// Hold the read lock across several lookups
    pub fn read(&self) -> RankedReadGuard<'_, SerializerMap> {
        self.map.read()
    }

    /// Hold the write lock, e.g. while cascading a removal
    pub fn write(&self) -> RankedWriteGuard<'_, SerializerMap> {
        self.map.write()
    }

    pub fn insert(&self, info: SerializerInfo, codec: Arc<dyn MessageSerializer>) -> bool {
        self.map.write().insert(info, codec)
    }

    pub fn remove(&self, serialization_type: &str, msg_id: u32) -> Removal {
        self.map.write().remove(serialization_type, msg_id)
    }

    pub fn acquire(&self, serialization_type: &str, msg_id: u32) -> Option<Arc<SerializerEntry>> {
        self.map.read().get(serialization_type, msg_id)
    }

    pub fn has_type(&self, serialization_type: &str) -> bool {
        self.map.read().has_type(serialization_type)
    }

    pub fn msg_id_for_fqn(&self, serialization_type: &str, fqn: &str) -> Option<u32> {
        self.map.read().msg_id_for_fqn(serialization_type, fqn)
    }

    pub fn entries_for(&self, serialization_type: &str) -> HashMap<u32, Arc<SerializerEntry>> {
        self.map.read().entries_for(serialization_type)
    }

    pub fn types(&self) -> Vec<String> {
        self.map.read().types()
    }
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::{MessageVersion, RawSerializer};

    fn info(ty: &str, id: u32, fqn: &str) -> SerializerInfo {
        SerializerInfo::new(ty, id, fqn, MessageVersion::new(1, 0))
    }

    #[test]
    fn test_insert_if_absent() {
        let registry = SerializerRegistry::new();

        assert!(registry.insert(info("raw", 1, "a.A"), Arc::new(RawSerializer)));
        assert!(!registry.insert(info("raw", 1, "a.Other"), Arc::new(RawSerializer)));

        let entry = registry.acquire("raw", 1).unwrap();
        assert_eq!(entry.info.fqn, "a.A");
        assert!(registry.acquire("raw", 2).is_none());
        assert!(registry.acquire("json", 1).is_none());
    }

    #[test]
    fn test_remove_reports_exhausted_type() {
        let registry = SerializerRegistry::new();
        registry.insert(info("raw", 1, "a.A"), Arc::new(RawSerializer));
        registry.insert(info("raw", 2, "a.B"), Arc::new(RawSerializer));

        let first = registry.remove("raw", 1);
        assert!(first.removed);
        assert!(!first.type_exhausted);
        assert!(registry.has_type("raw"));

        let last = registry.remove("raw", 2);
        assert!(last.removed);
        assert!(last.type_exhausted);
        assert!(!registry.has_type("raw"));

        let again = registry.remove("raw", 2);
        assert!(!again.removed);
        assert!(!again.type_exhausted);
    }

    #[test]
    fn test_acquired_entry_outlives_removal() {
        let registry = SerializerRegistry::new();
        registry.insert(info("raw", 1, "a.A"), Arc::new(RawSerializer));

        let entry = registry.acquire("raw", 1).unwrap();
        registry.remove("raw", 1);

        assert!(entry.codec.serialize(&vec![1u8]).is_ok());
    }

    #[test]
    fn test_lookup_by_fqn() {
        let registry = SerializerRegistry::new();
        registry.insert(info("json", 10, "a.A"), Arc::new(RawSerializer));
        registry.insert(info("json", 11, "a.B"), Arc::new(RawSerializer));
        registry.insert(info("raw", 12, "a.B"), Arc::new(RawSerializer));

        assert_eq!(registry.msg_id_for_fqn("json", "a.B"), Some(11));
        assert_eq!(registry.msg_id_for_fqn("raw", "a.B"), Some(12));
        assert_eq!(registry.msg_id_for_fqn("raw", "a.A"), None);
        assert_eq!(registry.types(), vec!["json".to_string(), "raw".to_string()]);
        assert_eq!(registry.entries_for("json").len(), 2);
    }
}
