use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a policy check.
///
/// An explicit `Deny` from any matching rule overrides every `Allow`;
/// when no rule matches, the result is `Deny`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    #[inline]
    pub fn is_allow(&self) -> bool {
        *self == Decision::Allow
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allow => write!(f, "ALLOW"),
            Decision::Deny => write!(f, "DENY"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_serialization() {
        assert_eq!(serde_json::to_string(&Decision::Allow).unwrap(), "\"ALLOW\"");
        assert_eq!(serde_json::to_string(&Decision::Deny).unwrap(), "\"DENY\"");

        let parsed: Decision = serde_json::from_str("\"DENY\"").unwrap();
        assert_eq!(parsed, Decision::Deny);
    }

    #[test]
    fn test_decision_display() {
        assert_eq!(Decision::Allow.to_string(), "ALLOW");
        assert_eq!(Decision::Deny.to_string(), "DENY");
    }
}
