use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::attrs::{self, Attributes};
use crate::error::{DecodeError, Result};
use crate::record::{Metadata, Record};
use crate::status::SyncStatus;

/// Protocols a security-group rule may match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IpProtocol {
    Tcp,
    Udp,
    Icmp,
    Gre,
    All,
}

impl IpProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            IpProtocol::Tcp => "TCP",
            IpProtocol::Udp => "UDP",
            IpProtocol::Icmp => "ICMP",
            IpProtocol::Gre => "GRE",
            IpProtocol::All => "ALL",
        }
    }
}

impl fmt::Display for IpProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IpProtocol {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TCP" => Ok(IpProtocol::Tcp),
            "UDP" => Ok(IpProtocol::Udp),
            "ICMP" => Ok(IpProtocol::Icmp),
            "GRE" => Ok(IpProtocol::Gre),
            "ALL" => Ok(IpProtocol::All),
            _ => Err(format!("unknown protocol '{s}'")),
        }
    }
}

/// One ingress or egress rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub port_range: String,
    pub ip_protocol: IpProtocol,
    pub source_cidr_ip: String,
}

impl Rule {
    pub fn new(
        ip_protocol: IpProtocol,
        port_range: impl Into<String>,
        source_cidr_ip: impl Into<String>,
    ) -> Self {
        Self {
            port_range: port_range.into(),
            ip_protocol,
            source_cidr_ip: source_cidr_ip.into(),
        }
    }

    fn decode(attributes: &Attributes, parent: &str) -> Result<Self> {
        let protocol = attrs::required_string(attributes, "ipProtocol", parent)?;
        let ip_protocol = protocol
            .parse()
            .map_err(|msg| DecodeError::invalid_value(format!("{parent}.ipProtocol"), msg))?;
        Ok(Self {
            port_range: attrs::string_or_default(attributes, "portRange", parent)?,
            ip_protocol,
            source_cidr_ip: attrs::string_or_default(attributes, "sourceCidrIp", parent)?,
        })
    }

    /// Decodes `spec.<field>`; null or absent yields no rules.
    pub(crate) fn decode_seq(spec: &Attributes, field: &str) -> Result<Vec<Self>> {
        attrs::object_seq(spec, field, "spec")?
            .into_iter()
            .enumerate()
            .map(|(i, rule)| Rule::decode(rule, &format!("spec.{field}[{i}]")))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupSpec {
    #[serde(default)]
    pub local_name: String,
    #[serde(default)]
    pub region_id: String,
    #[serde(default)]
    pub vpc_id: String,
    #[serde(default)]
    pub external_id: String,
    pub status: SyncStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub ingress: Vec<Rule>,
    #[serde(default)]
    pub egress: Vec<Rule>,
}

impl SecurityGroupSpec {
    fn decode(attributes: &Attributes) -> Result<Self> {
        let spec = attrs::required_object(attributes, "spec", "")?;
        let status = attrs::required_string(spec, "status", "spec")?.parse()?;
        Ok(Self {
            local_name: attrs::string_or_default(spec, "localName", "spec")?,
            region_id: attrs::string_or_default(spec, "regionId", "spec")?,
            vpc_id: attrs::string_or_default(spec, "vpcId", "spec")?,
            external_id: attrs::string_or_default(spec, "externalId", "spec")?,
            status,
            message: attrs::string_or_default(spec, "message", "spec")?,
            ingress: Rule::decode_seq(spec, "ingress")?,
            egress: Rule::decode_seq(spec, "egress")?,
        })
    }
}

/// Security group mirrored into external clusters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub metadata: Metadata,
    pub spec: SecurityGroupSpec,
}

impl SecurityGroup {
    pub fn new(
        database: impl Into<String>,
        workspace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            metadata: Metadata::new(database, Self::KIND, workspace, name),
            spec: SecurityGroupSpec::default(),
        }
    }

    pub fn with_status(mut self, status: SyncStatus) -> Self {
        self.spec.status = status;
        self
    }

    pub fn with_ingress(mut self, rule: Rule) -> Self {
        self.spec.ingress.push(rule);
        self
    }

    pub fn with_egress(mut self, rule: Rule) -> Self {
        self.spec.egress.push(rule);
        self
    }

    pub fn status(&self) -> SyncStatus {
        self.spec.status
    }
}

impl Record for SecurityGroup {
    const KIND: &'static str = "SecurityGroup";

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    fn decode(attributes: &Attributes) -> Result<Self> {
        Ok(Self {
            metadata: Metadata::decode(attributes, Self::KIND)?,
            spec: SecurityGroupSpec::decode(attributes)?,
        })
    }
}
