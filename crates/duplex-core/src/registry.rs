//! Kind registry: kind name to decoder.
//!
//! Populated during start-up and then read on every event. Reads load an
//! `ArcSwap` snapshot without locking; `register`/`unregister` publish a new
//! snapshot copy-on-write.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::debug;

use crate::attrs::Attributes;
use crate::cluster::Cluster;
use crate::error::{DecodeError, Result};
use crate::object::Object;
use crate::record::Record;
use crate::security_group::SecurityGroup;

/// Reconstructs a typed record from attributes.
pub type Decoder = fn(&Attributes) -> Result<Object>;

/// Decoder for any record kind that converts into [`Object`].
pub fn decode_as<R>(attributes: &Attributes) -> Result<Object>
where
    R: Record + Into<Object>,
{
    R::decode(attributes).map(Into::into)
}

pub struct KindRegistry {
    decoders: ArcSwap<HashMap<String, Decoder>>,
}

impl KindRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            decoders: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Registry with every kind this crate defines.
    pub fn with_builtin_kinds() -> Self {
        let registry = Self::new();
        registry.register(SecurityGroup::KIND, decode_as::<SecurityGroup>);
        registry.register(Cluster::KIND, decode_as::<Cluster>);
        registry
    }

    /// Register a decoder, returning the one it replaced.
    pub fn register(&self, kind: impl Into<String>, decoder: Decoder) -> Option<Decoder> {
        let kind = kind.into();
        let previous = self.decoders.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(kind.clone(), decoder);
            next
        });
        debug!(kind = %kind, "Registered kind decoder");
        previous.get(&kind).copied()
    }

    /// Remove a decoder, returning it if it was registered.
    pub fn unregister(&self, kind: &str) -> Option<Decoder> {
        let previous = self.decoders.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.remove(kind);
            next
        });
        previous.get(kind).copied()
    }

    /// `None` means no decoder is registered for the kind.
    pub fn lookup(&self, kind: &str) -> Option<Decoder> {
        self.decoders.load().get(kind).copied()
    }

    pub fn decode(&self, kind: &str, attributes: &Attributes) -> Result<Object> {
        let decoder = self
            .lookup(kind)
            .ok_or_else(|| DecodeError::unknown_kind(kind))?;
        decoder(attributes)
    }

    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.decoders.load().keys().cloned().collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.decoders.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for KindRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KindRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

/// Shared handle injected into the pipelines.
pub type SharedRegistry = Arc<KindRegistry>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::SyncStatus;

    #[test]
    fn test_builtin_kinds() {
        let registry = KindRegistry::with_builtin_kinds();
        assert_eq!(registry.kinds(), vec!["Cluster", "SecurityGroup"]);
        assert!(registry.lookup("SecurityGroup").is_some());
    }

    #[test]
    fn test_unregistered_kind_is_absent_not_default() {
        let registry = KindRegistry::with_builtin_kinds();
        assert!(registry.lookup("Tenant").is_none());
        let err = registry.decode("Tenant", &Attributes::new()).unwrap_err();
        assert_eq!(err, DecodeError::unknown_kind("Tenant"));
    }

    #[test]
    fn test_register_and_unregister() {
        let registry = KindRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.register("SecurityGroup", decode_as::<SecurityGroup>).is_none());
        assert!(registry.register("SecurityGroup", decode_as::<SecurityGroup>).is_some());
        assert_eq!(registry.len(), 1);
        assert!(registry.unregister("SecurityGroup").is_some());
        assert!(registry.unregister("SecurityGroup").is_none());
        assert!(registry.lookup("SecurityGroup").is_none());
    }

    #[test]
    fn test_decode_dispatches_by_kind() {
        let registry = KindRegistry::with_builtin_kinds();
        let sg = SecurityGroup::new("db", "ws", "sg-1").with_status(SyncStatus::Fail);
        let object = registry.decode("SecurityGroup", &sg.to_attributes()).unwrap();
        assert_eq!(object, Object::SecurityGroup(sg));
    }

    #[test]
    fn test_concurrent_reads_during_registration() {
        let registry = Arc::new(KindRegistry::with_builtin_kinds());
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        assert!(registry.lookup("SecurityGroup").is_some());
                    }
                })
            })
            .collect();
        for i in 0..50 {
            registry.register(format!("Extra{i}"), decode_as::<Cluster>);
        }
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(registry.len(), 52);
    }
}
