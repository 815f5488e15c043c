//! InMemoryParticipantRegistry - participant directory held in memory.

use dashmap::DashMap;

use crate::domain::{ParticipantName, ParticipantRegistration};
use crate::ports::ParticipantDirectory;

#[derive(Default)]
pub struct InMemoryParticipantRegistry {
    participants: DashMap<ParticipantName, ParticipantRegistration>,
}

impl InMemoryParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a participant's registration.
    pub fn upsert(&self, registration: ParticipantRegistration) {
        self.participants
            .insert(registration.name.clone(), registration);
    }

    pub fn set_enabled(&self, name: &ParticipantName, enabled: bool) -> bool {
        match self.participants.get_mut(name) {
            Some(mut r) => {
                r.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, name: &ParticipantName) -> Option<ParticipantRegistration> {
        self.participants.remove(name).map(|(_, r)| r)
    }
}

impl ParticipantDirectory for InMemoryParticipantRegistry {
    fn registrations(&self) -> Vec<ParticipantRegistration> {
        let mut all: Vec<_> = self
            .participants
            .iter()
            .map(|e| e.value().clone())
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    fn get(&self, name: &ParticipantName) -> Option<ParticipantRegistration> {
        self.participants.get(name).map(|r| r.value().clone())
    }
}
