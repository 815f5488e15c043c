//! ParticipantDirectory port - read side of participant registration.
//!
//! Registration bookkeeping is owned elsewhere; the grid only reads the
//! current subscriptions and enabled flags.

use crate::domain::{ParticipantName, ParticipantRegistration};

pub trait ParticipantDirectory: Send + Sync {
    /// All known registrations, enabled or not.
    fn registrations(&self) -> Vec<ParticipantRegistration>;

    fn get(&self, name: &ParticipantName) -> Option<ParticipantRegistration>;
}
