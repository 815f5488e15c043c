use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of a participant (a consumer and/or producer of tasks).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantName(String);

impl ParticipantName {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Blank names are rejected at every entry point.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ParticipantName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ParticipantName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Fully qualified reference to a participant, as carried by manifests
/// (origin participant, previous-hop participant).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantRef {
    pub name: ParticipantName,
    pub subsystem: String,
    pub version: String,
}

impl ParticipantRef {
    pub fn new(
        name: impl Into<String>,
        subsystem: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: ParticipantName::new(name),
            subsystem: subsystem.into(),
            version: version.into(),
        }
    }
}
