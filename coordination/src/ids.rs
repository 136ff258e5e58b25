//! Newtype identifiers threaded through every component.
//!
//! Kept as thin `String` wrappers (not `Uuid` directly) because several
//! ids are caller-supplied (session ids from the gateway, agent ids from
//! registration) rather than always generated here.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

id_type!(RunId);
id_type!(TaskId);
id_type!(PlanId);
id_type!(StepId);
id_type!(MessageId);
id_type!(AgentId);
id_type!(SessionId);
id_type!(VectorId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_json() {
        let id = TaskId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: TaskId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn ids_from_str_preserve_value() {
        let id = AgentId::from("agent-123");
        assert_eq!(id.as_str(), "agent-123");
        assert_eq!(id.to_string(), "agent-123");
    }
}
