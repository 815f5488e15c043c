//! How fulfiller identity is written onto task registrations.
//!
//! Some deployments track which component instance is working a task, others
//! only which participant. The strategy is chosen once, at construction.

use crate::config::FulfillerIdentityKind;
use crate::domain::ParticipantName;

/// Caller-side identity of whoever registers or works a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FulfillerRef {
    pub participant: ParticipantName,
    pub component: Option<String>,
}

impl FulfillerRef {
    pub fn participant(name: ParticipantName) -> Self {
        Self {
            participant: name,
            component: None,
        }
    }

    pub fn component(name: ParticipantName, component: impl Into<String>) -> Self {
        Self {
            participant: name,
            component: Some(component.into()),
        }
    }
}

pub trait FulfillerIdentity: Send + Sync {
    fn identify(&self, fulfiller: &FulfillerRef) -> String;
}

pub struct ByParticipant;

impl FulfillerIdentity for ByParticipant {
    fn identify(&self, fulfiller: &FulfillerRef) -> String {
        fulfiller.participant.to_string()
    }
}

/// Records `participant/component`; falls back to the participant name when
/// the caller has no component id.
pub struct ByComponent;

impl FulfillerIdentity for ByComponent {
    fn identify(&self, fulfiller: &FulfillerRef) -> String {
        match &fulfiller.component {
            Some(component) => format!("{}/{}", fulfiller.participant, component),
            None => fulfiller.participant.to_string(),
        }
    }
}

pub fn identity_for(kind: FulfillerIdentityKind) -> Box<dyn FulfillerIdentity> {
    match kind {
        FulfillerIdentityKind::Participant => Box::new(ByParticipant),
        FulfillerIdentityKind::Component => Box::new(ByComponent),
    }
}
