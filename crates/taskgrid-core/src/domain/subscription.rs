//! Subscriptions: participant-declared filters over manifests.

use serde::{Deserialize, Serialize};

use super::manifest::{
    FlowDirection, NormalisationStatus, ParcelType, PolicyApproval, ValidationStatus, WILDCARD,
};
use super::participant::{ParticipantName, ParticipantRef};

/// Status filter: either a concrete status or `ANY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusFilter<T> {
    Any,
    Is(T),
}

impl<T: PartialEq> StatusFilter<T> {
    pub fn accepts(&self, value: &T) -> bool {
        match self {
            StatusFilter::Any => true,
            StatusFilter::Is(expected) => expected == value,
        }
    }
}

/// Filter over a participant reference; each part may be `*`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantFilter {
    pub name: String,
    pub subsystem: String,
    pub version: String,
}

impl ParticipantFilter {
    pub fn new(
        name: impl Into<String>,
        subsystem: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            subsystem: subsystem.into(),
            version: version.into(),
        }
    }

    pub fn any() -> Self {
        Self::new(WILDCARD, WILDCARD, WILDCARD)
    }

    pub fn is_any(&self) -> bool {
        self.name == WILDCARD && self.subsystem == WILDCARD && self.version == WILDCARD
    }

    pub fn accepts(&self, participant: &ParticipantRef) -> bool {
        part_matches(&self.name, participant.name.as_str())
            && part_matches(&self.subsystem, &participant.subsystem)
            && part_matches(&self.version, &participant.version)
    }
}

fn part_matches(filter: &str, value: &str) -> bool {
    filter == WILDCARD || filter == value
}

/// A participant's interest filter. Same attribute set as a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub direction: FlowDirection,
    pub container: String,
    /// `None` subscribes to the whole container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub normalisation: StatusFilter<NormalisationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<StatusFilter<ValidationStatus>>,
    pub parcel_type: ParcelType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_system: Option<String>,
    pub policy: StatusFilter<PolicyApproval>,
    pub distributable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<ParticipantFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<ParticipantFilter>,
}

impl Subscription {
    /// Subscribe to a whole container in the core distribution direction,
    /// accepting any status, system and participant provenance.
    pub fn to_container(container: impl Into<String>) -> Self {
        Self {
            direction: FlowDirection::CoreDistribution,
            container: container.into(),
            content: None,
            normalisation: StatusFilter::Any,
            validation: Some(StatusFilter::Any),
            parcel_type: ParcelType::Single,
            source_system: Some(WILDCARD.to_string()),
            target_system: Some(WILDCARD.to_string()),
            policy: StatusFilter::Any,
            distributable: true,
            origin: Some(ParticipantFilter::any()),
            previous: Some(ParticipantFilter::any()),
        }
    }

    /// Every wildcard-capable field set to its wildcard.
    pub fn wildcard() -> Self {
        let mut s = Self::to_container(WILDCARD);
        s.content = Some(WILDCARD.to_string());
        s
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_direction(mut self, direction: FlowDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_normalisation(mut self, filter: StatusFilter<NormalisationStatus>) -> Self {
        self.normalisation = filter;
        self
    }

    pub fn with_validation(mut self, filter: Option<StatusFilter<ValidationStatus>>) -> Self {
        self.validation = filter;
        self
    }

    pub fn with_policy(mut self, filter: StatusFilter<PolicyApproval>) -> Self {
        self.policy = filter;
        self
    }

    pub fn with_systems(mut self, source: Option<&str>, target: Option<&str>) -> Self {
        self.source_system = source.map(str::to_string);
        self.target_system = target.map(str::to_string);
        self
    }

    pub fn with_origin(mut self, filter: Option<ParticipantFilter>) -> Self {
        self.origin = filter;
        self
    }

    pub fn with_previous(mut self, filter: Option<ParticipantFilter>) -> Self {
        self.previous = filter;
        self
    }

    /// True when the subscription names nothing finer than its container.
    pub fn is_container_only(&self) -> bool {
        match &self.content {
            None => true,
            Some(content) => content == &self.container,
        }
    }
}

/// What the matcher consumes from the participant registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRegistration {
    pub name: ParticipantName,
    pub enabled: bool,
    pub subscriptions: Vec<Subscription>,
}

impl ParticipantRegistration {
    pub fn new(name: impl Into<String>, subscriptions: Vec<Subscription>) -> Self {
        Self {
            name: ParticipantName::new(name),
            enabled: true,
            subscriptions,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_filter_any_accepts_everything() {
        let f: StatusFilter<PolicyApproval> = StatusFilter::Any;
        assert!(f.accepts(&PolicyApproval::Rejected));
        assert!(StatusFilter::Is(PolicyApproval::Approved).accepts(&PolicyApproval::Approved));
        assert!(!StatusFilter::Is(PolicyApproval::Approved).accepts(&PolicyApproval::Pending));
    }

    #[test]
    fn participant_filter_parts_are_independent() {
        let p = ParticipantRef::new("Intake", "orders", "2");
        assert!(ParticipantFilter::new("Intake", "*", "*").accepts(&p));
        assert!(ParticipantFilter::new("*", "orders", "2").accepts(&p));
        assert!(!ParticipantFilter::new("*", "*", "1").accepts(&p));
    }

    #[test]
    fn container_only_detection() {
        assert!(Subscription::to_container("Order").is_container_only());
        assert!(Subscription::to_container("Order").with_content("Order").is_container_only());
        assert!(!Subscription::to_container("Order").with_content("Invoice").is_container_only());
    }
}
