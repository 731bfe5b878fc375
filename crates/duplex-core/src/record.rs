use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::attrs::{self, Attributes};
use crate::error::{DecodeError, Result};

/// Label binding a record to a workspace on the external side.
pub const WORKSPACE_LABEL: &str = "workspace";
/// Label naming the external cluster a record belongs to.
pub const CLUSTER_LABEL: &str = "cluster";
/// Workspace assumed when an external object carries no workspace label.
pub const DEFAULT_WORKSPACE: &str = "default";

/// Envelope shared by every record kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub workspace: String,
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub version: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uuid: String,
    #[serde(default)]
    pub is_delete: bool,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl Metadata {
    pub fn new(
        database: impl Into<String>,
        kind: impl Into<String>,
        workspace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            kind: kind.into(),
            workspace: workspace.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Assigns a fresh version and, on first call, a permanent uuid.
    ///
    /// The version is wall-clock nanoseconds, bumped past the previous value
    /// if the clock has not advanced.
    pub fn generate_version(&mut self) -> &mut Self {
        let now = u64::try_from(OffsetDateTime::now_utc().unix_timestamp_nanos()).unwrap_or(0);
        self.version = now.max(self.version.saturating_add(1));
        if self.uuid.is_empty() {
            self.uuid = uuid::Uuid::new_v4().to_string();
        }
        self
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            database: self.database.clone(),
            kind: self.kind.clone(),
            workspace: self.workspace.clone(),
            name: self.name.clone(),
        }
    }

    /// Reads the `metadata` object of a record's attributes.
    ///
    /// `kind` is the decoder's own kind: an explicit, different kind in the
    /// attributes is rejected, an absent one is filled in.
    pub fn decode(attributes: &Attributes, kind: &str) -> Result<Self> {
        let meta = attrs::required_object(attributes, "metadata", "")?;
        let parent = "metadata";

        let found_kind = attrs::string_or_default(meta, "kind", parent)?;
        if !found_kind.is_empty() && found_kind != kind {
            return Err(DecodeError::kind_mismatch(kind, found_kind));
        }

        Ok(Self {
            database: attrs::string_or_default(meta, "database", parent)?,
            kind: kind.to_string(),
            workspace: attrs::string_or_default(meta, "workspace", parent)?,
            namespace: attrs::string_or_default(meta, "namespace", parent)?,
            name: attrs::required_string(meta, "name", parent)?,
            version: attrs::u64_or_default(meta, "version", parent)?,
            uuid: attrs::string_or_default(meta, "uuid", parent)?,
            is_delete: attrs::bool_or_default(meta, "isDelete", parent)?,
            labels: attrs::string_map(meta, "labels", parent)?,
        })
    }
}

/// Address of a record inside the authoritative store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub database: String,
    pub kind: String,
    pub workspace: String,
    pub name: String,
}

impl RecordKey {
    pub fn new(
        database: impl Into<String>,
        kind: impl Into<String>,
        workspace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            kind: kind.into(),
            workspace: workspace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.database, self.kind, self.workspace, self.name)
    }
}

/// A typed record: the shared envelope plus a kind-specific spec.
pub trait Record: Serialize + Sized {
    /// Kind discriminator used by the registry.
    const KIND: &'static str;

    fn metadata(&self) -> &Metadata;

    fn metadata_mut(&mut self) -> &mut Metadata;

    /// Reconstructs the record from an untyped attribute map.
    fn decode(attributes: &Attributes) -> Result<Self>;

    fn to_attributes(&self) -> Attributes {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Attributes::new(),
        }
    }

    fn generate_version(&mut self) -> &mut Self {
        self.metadata_mut().generate_version();
        self
    }

    /// Sets the tombstone flag. The record stays addressable.
    fn delete(&mut self) {
        self.metadata_mut().is_delete = true;
    }

    /// Independent copy produced by re-encoding through the attribute form.
    fn deep_clone(&self) -> Result<Self> {
        Self::decode(&self.to_attributes())
    }
}
