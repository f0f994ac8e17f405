use serde::{Deserialize, Serialize};

/// A security-policy violation found in a command string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedCommand {
    pub description: String,
    pub reason: String,
    /// Pattern that matched. Internal, never serialized into audit records.
    #[serde(skip)]
    pub pattern: String,
}

impl BlockedCommand {
    pub fn new(
        description: impl Into<String>,
        reason: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Self {
        Self {
            description: description.into(),
            reason: reason.into(),
            pattern: pattern.into(),
        }
    }
}

impl std::fmt::Display for BlockedCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.description, self.reason)
    }
}
