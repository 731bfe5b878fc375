use serde::{Deserialize, Serialize};

use crate::attrs::{self, Attributes};
use crate::error::Result;
use crate::record::{Metadata, Record};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub description: String,
}

/// An external cluster registered in the store.
///
/// Fan-in enumerates these to decide which clusters to watch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub metadata: Metadata,
    pub spec: ClusterSpec,
}

impl Cluster {
    pub fn new(
        database: impl Into<String>,
        workspace: impl Into<String>,
        name: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            metadata: Metadata::new(database, Self::KIND, workspace, name),
            spec: ClusterSpec {
                endpoint: endpoint.into(),
                ..ClusterSpec::default()
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

impl Record for Cluster {
    const KIND: &'static str = "Cluster";

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    fn decode(attributes: &Attributes) -> Result<Self> {
        let metadata = Metadata::decode(attributes, Self::KIND)?;
        let spec = match attrs::optional_object(attributes, "spec", "")? {
            Some(spec) => ClusterSpec {
                endpoint: attrs::string_or_default(spec, "endpoint", "spec")?,
                region: attrs::string_or_default(spec, "region", "spec")?,
                description: attrs::string_or_default(spec, "description", "spec")?,
            },
            None => ClusterSpec::default(),
        };
        Ok(Self { metadata, spec })
    }
}
