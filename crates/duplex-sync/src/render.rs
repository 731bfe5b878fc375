//! Mapping between store records and external cluster payloads.
//!
//! [`render`] is a pure template: it always carries `spec.status` and always
//! emits rule sequences as arrays. [`decode_external`] goes the other way and
//! produces store attributes that the kind registry can decode.

use duplex_core::attrs;
use duplex_core::{
    Attributes, DEFAULT_WORKSPACE, DecodeError, Record, SecurityGroup, SyncStatus, WORKSPACE_LABEL,
};
use serde_json::{Map, Value, json};

/// API group/version stamped on rendered payloads.
pub const API_VERSION: &str = "duplex.io/v1";
/// Annotation carrying the store version the payload was rendered from.
pub const VERSION_ANNOTATION: &str = "duplex.io/version";
/// Annotation carrying the record's permanent uuid.
pub const UUID_ANNOTATION: &str = "duplex.io/uuid";

/// Renders a security group with its own status.
pub fn render(record: &SecurityGroup) -> Value {
    render_with_status(record, record.status())
}

/// Renders a security group with `status` in place of the record's own.
pub fn render_with_status(record: &SecurityGroup, status: SyncStatus) -> Value {
    let meta = &record.metadata;
    let spec = &record.spec;

    let mut labels: Map<String, Value> = meta
        .labels
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    labels.insert(
        WORKSPACE_LABEL.to_string(),
        Value::String(meta.workspace.clone()),
    );

    let rules = |rules: &[duplex_core::Rule]| -> Value {
        Value::Array(
            rules
                .iter()
                .map(|rule| {
                    json!({
                        "portRange": rule.port_range,
                        "ipProtocol": rule.ip_protocol.as_str(),
                        "sourceCidrIp": rule.source_cidr_ip,
                    })
                })
                .collect(),
        )
    };

    json!({
        "apiVersion": API_VERSION,
        "kind": SecurityGroup::KIND,
        "metadata": {
            "name": meta.name,
            "namespace": external_namespace(record),
            "labels": labels,
            "annotations": {
                VERSION_ANNOTATION: meta.version.to_string(),
                UUID_ANNOTATION: meta.uuid,
            },
        },
        "spec": {
            "localName": spec.local_name,
            "regionId": spec.region_id,
            "vpcId": spec.vpc_id,
            "externalId": spec.external_id,
            "status": status.as_str(),
            "message": spec.message,
            "ingress": rules(&spec.ingress),
            "egress": rules(&spec.egress),
        },
    })
}

/// Namespace the record is placed in on the external side.
///
/// Falls back to the workspace when the record carries no namespace.
pub fn external_namespace(record: &SecurityGroup) -> &str {
    if record.metadata.namespace.is_empty() {
        &record.metadata.workspace
    } else {
        &record.metadata.namespace
    }
}

/// Converts an external payload into store attributes for `database`.
///
/// The workspace comes from the workspace label, defaulting to
/// [`DEFAULT_WORKSPACE`]. The store version is read back from the version
/// annotation; a payload without one decodes with version 0, which the store
/// treats as "no expectation".
///
/// # Errors
///
/// Returns `DecodeError` if the payload has no metadata or the version
/// annotation is not an unsigned integer.
pub fn decode_external(payload: &Value, database: &str) -> Result<Attributes, DecodeError> {
    let root = payload
        .as_object()
        .ok_or_else(|| DecodeError::Encoding("external payload is not an object".to_string()))?;
    let meta = attrs::required_object(root, "metadata", "")?;

    let labels = attrs::string_map(meta, "labels", "metadata")?;
    let annotations = attrs::optional_object(meta, "annotations", "metadata")?;
    let workspace = labels
        .get(WORKSPACE_LABEL)
        .filter(|ws| !ws.is_empty())
        .cloned()
        .unwrap_or_else(|| DEFAULT_WORKSPACE.to_string());

    let (version, uuid) = match annotations {
        Some(annotations) => (
            attrs::u64_or_default(annotations, VERSION_ANNOTATION, "metadata.annotations")?,
            attrs::string_or_default(annotations, UUID_ANNOTATION, "metadata.annotations")?,
        ),
        None => (0, String::new()),
    };

    let kind = root.get("kind").cloned().unwrap_or(Value::Null);
    let store_meta = json!({
        "database": database,
        "kind": kind,
        "workspace": workspace,
        "namespace": meta.get("namespace").cloned().unwrap_or(Value::Null),
        "name": meta.get("name").cloned().unwrap_or(Value::Null),
        "version": version,
        "uuid": uuid,
        "isDelete": false,
        "labels": labels,
    });

    let mut out = Attributes::new();
    out.insert("metadata".to_string(), store_meta);
    if let Some(spec) = root.get("spec") {
        out.insert("spec".to_string(), spec.clone());
    }
    Ok(out)
}
