use serde::Serialize;

use crate::attrs::Attributes;
use crate::cluster::Cluster;
use crate::error::Result;
use crate::record::{Metadata, Record, RecordKey};
use crate::security_group::SecurityGroup;

/// Any record kind known to this process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Object {
    SecurityGroup(SecurityGroup),
    Cluster(Cluster),
}

impl Object {
    pub fn kind(&self) -> &'static str {
        match self {
            Object::SecurityGroup(_) => SecurityGroup::KIND,
            Object::Cluster(_) => Cluster::KIND,
        }
    }

    pub fn metadata(&self) -> &Metadata {
        match self {
            Object::SecurityGroup(r) => r.metadata(),
            Object::Cluster(r) => r.metadata(),
        }
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        match self {
            Object::SecurityGroup(r) => r.metadata_mut(),
            Object::Cluster(r) => r.metadata_mut(),
        }
    }

    pub fn key(&self) -> RecordKey {
        self.metadata().key()
    }

    pub fn name(&self) -> &str {
        &self.metadata().name
    }

    pub fn version(&self) -> u64 {
        self.metadata().version
    }

    pub fn is_deleted(&self) -> bool {
        self.metadata().is_delete
    }

    pub fn generate_version(&mut self) -> &mut Self {
        self.metadata_mut().generate_version();
        self
    }

    pub fn delete(&mut self) {
        self.metadata_mut().is_delete = true;
    }

    pub fn to_attributes(&self) -> Attributes {
        match self {
            Object::SecurityGroup(r) => r.to_attributes(),
            Object::Cluster(r) => r.to_attributes(),
        }
    }

    pub fn deep_clone(&self) -> Result<Self> {
        match self {
            Object::SecurityGroup(r) => r.deep_clone().map(Object::SecurityGroup),
            Object::Cluster(r) => r.deep_clone().map(Object::Cluster),
        }
    }

    pub fn as_security_group(&self) -> Option<&SecurityGroup> {
        match self {
            Object::SecurityGroup(sg) => Some(sg),
            _ => None,
        }
    }

    pub fn into_security_group(self) -> Option<SecurityGroup> {
        match self {
            Object::SecurityGroup(sg) => Some(sg),
            _ => None,
        }
    }

    pub fn into_cluster(self) -> Option<Cluster> {
        match self {
            Object::Cluster(cluster) => Some(cluster),
            _ => None,
        }
    }
}

impl From<SecurityGroup> for Object {
    fn from(record: SecurityGroup) -> Self {
        Object::SecurityGroup(record)
    }
}

impl From<Cluster> for Object {
    fn from(record: Cluster) -> Self {
        Object::Cluster(record)
    }
}

/// A collection of records carrying the highest member version.
///
/// The version is a polling/caching hint only.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectList {
    pub version: u64,
    pub items: Vec<Object>,
}

impl ObjectList {
    pub fn new(items: Vec<Object>) -> Self {
        let version = items.iter().map(Object::version).max().unwrap_or(0);
        Self { version, items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Object> {
        self.items.iter()
    }
}

impl IntoIterator for ObjectList {
    type Item = Object;
    type IntoIter = std::vec::IntoIter<Object>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
