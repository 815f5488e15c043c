//! Manifest model: what a payload contains and where it may flow.
//!
//! Manifests are published by producers and never carry wildcards. The
//! filter-side counterpart lives in `subscription.rs`.

use serde::{Deserialize, Serialize};

use super::participant::ParticipantRef;
use crate::error::GridError;

/// Wildcard token accepted on the subscription side.
pub const WILDCARD: &str = "*";

/// Separator between descriptor segments (`Order.Invoice.Draft`).
pub const SEGMENT_SEPARATOR: char = '.';

/// Direction in which a payload travels through the network.
///
/// Only `CoreDistribution` payloads take part in fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowDirection {
    CoreDistribution,
    Ingest,
    Export,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NormalisationStatus {
    Raw,
    Normalised,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    Unchecked,
    Valid,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyApproval {
    Pending,
    Approved,
    Rejected,
}

/// How the payload body is packaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParcelType {
    Single,
    Batch,
    Reference,
}

/// Describes one payload's content and provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Coarse type, e.g. `Order`.
    pub container: String,
    /// Fine type, e.g. `Invoice`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub normalisation: NormalisationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationStatus>,
    pub parcel_type: ParcelType,
    pub direction: FlowDirection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_system: Option<String>,
    pub distributable: bool,
    pub policy: PolicyApproval,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<ParticipantRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<ParticipantRef>,
}

impl Manifest {
    /// A distributable, normalised, approved single parcel in the core
    /// distribution direction.
    pub fn core(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            content: None,
            normalisation: NormalisationStatus::Normalised,
            validation: None,
            parcel_type: ParcelType::Single,
            direction: FlowDirection::CoreDistribution,
            source_system: None,
            target_system: None,
            distributable: true,
            policy: PolicyApproval::Approved,
            origin: None,
            previous: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_direction(mut self, direction: FlowDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_validation(mut self, validation: ValidationStatus) -> Self {
        self.validation = Some(validation);
        self
    }

    pub fn with_systems(mut self, source: Option<&str>, target: Option<&str>) -> Self {
        self.source_system = source.map(str::to_string);
        self.target_system = target.map(str::to_string);
        self
    }

    pub fn with_origin(mut self, origin: ParticipantRef) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn with_previous(mut self, previous: ParticipantRef) -> Self {
        self.previous = Some(previous);
        self
    }

    pub fn is_core_distribution(&self) -> bool {
        self.direction == FlowDirection::CoreDistribution
    }

    /// Check the structural contract of a published manifest.
    ///
    /// Descriptors must be non-empty dot paths without empty segments, and no
    /// published field may contain the wildcard token.
    pub fn validate(&self) -> Result<(), GridError> {
        check_descriptor("container", &self.container)?;
        if let Some(content) = &self.content {
            check_descriptor("content", content)?;
        }
        for (field, value) in [
            ("source_system", self.source_system.as_deref()),
            ("target_system", self.target_system.as_deref()),
        ] {
            if let Some(v) = value
                && (v.trim().is_empty() || v.contains(WILDCARD))
            {
                return Err(GridError::MalformedManifest(format!(
                    "{field} must be a concrete system name, got '{v}'"
                )));
            }
        }
        for (field, participant) in [("origin", &self.origin), ("previous", &self.previous)] {
            if let Some(p) = participant
                && [p.name.as_str(), p.subsystem.as_str(), p.version.as_str()]
                    .iter()
                    .any(|part| part.contains(WILDCARD) || part.trim().is_empty())
            {
                return Err(GridError::MalformedManifest(format!(
                    "{field} participant must be fully specified"
                )));
            }
        }
        Ok(())
    }
}

fn check_descriptor(field: &str, value: &str) -> Result<(), GridError> {
    if value.trim().is_empty() {
        return Err(GridError::MalformedManifest(format!("{field} descriptor is empty")));
    }
    if value.contains(WILDCARD) {
        return Err(GridError::MalformedManifest(format!(
            "{field} descriptor '{value}' contains a wildcard"
        )));
    }
    if value.split(SEGMENT_SEPARATOR).any(|segment| segment.is_empty()) {
        return Err(GridError::MalformedManifest(format!(
            "{field} descriptor '{value}' has an empty segment"
        )));
    }
    Ok(())
}

/// One unit of payload with its manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub manifest: Manifest,
    #[serde(default)]
    pub body: serde_json::Value,
}

impl Payload {
    pub fn new(manifest: Manifest, body: serde_json::Value) -> Self {
        Self { manifest, body }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_manifest_is_valid() {
        let m = Manifest::core("Order").with_content("Invoice");
        assert!(m.validate().is_ok());
        assert!(m.is_core_distribution());
    }

    #[test]
    fn published_wildcard_is_rejected() {
        let m = Manifest::core("Order").with_content("*");
        assert!(matches!(m.validate(), Err(GridError::MalformedManifest(_))));
    }

    #[test]
    fn empty_segment_is_rejected() {
        let m = Manifest::core("Order..Line");
        assert!(matches!(m.validate(), Err(GridError::MalformedManifest(_))));
    }

    #[test]
    fn partial_origin_is_rejected() {
        let m = Manifest::core("Order").with_origin(ParticipantRef::new("Intake", "", "1"));
        assert!(m.validate().is_err());
    }

    #[test]
    fn direction_serializes_screaming_snake() {
        let s = serde_json::to_string(&FlowDirection::CoreDistribution).unwrap();
        assert_eq!(s, "\"CORE_DISTRIBUTION\"");
    }
}
