pub mod attrs;
pub mod cluster;
pub mod error;
pub mod object;
pub mod record;
pub mod registry;
pub mod security_group;
pub mod status;

pub use attrs::Attributes;
pub use cluster::{Cluster, ClusterSpec};
pub use error::{DecodeError, Result};
pub use object::{Object, ObjectList};
pub use record::{CLUSTER_LABEL, DEFAULT_WORKSPACE, Metadata, Record, RecordKey, WORKSPACE_LABEL};
pub use registry::{Decoder, KindRegistry, SharedRegistry, decode_as};
pub use security_group::{IpProtocol, Rule, SecurityGroup, SecurityGroupSpec};
pub use status::SyncStatus;
