//! Optional callbacks around every mutation.

use inventory_core::error::Result;
use inventory_core::types::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of mutating request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MutationKind {
    Put,
    Delete,
    PutRelationship,
    DeleteRelationship,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::PutRelationship => "PUT relationship",
            Self::DeleteRelationship => "DELETE relationship",
        })
    }
}

/// What a hook sees of the request being applied.
#[derive(Debug, Clone, Copy)]
pub struct MutationContext<'a> {
    pub kind: MutationKind,
    pub uri: &'a str,
    pub node_type: &'a str,
    /// Request body for puts
    pub body: Option<&'a Value>,
    /// 1-based attempt number; hooks run again on every retry
    pub attempt: u32,
}

/// Result of a successful mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationOutcome {
    pub action: MutationAction,
    pub uri: String,
    /// Token now stored on the resource; `None` once it is deleted
    pub resource_version: Option<String>,
    /// Vertices removed, including cascaded dependents
    pub removed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationAction {
    Created,
    Updated,
    Deleted,
}

/// Callbacks invoked inside the unit of work.
///
/// `before_mutation` runs before anything is written and `after_mutation`
/// after the writes but before commit. An error from either aborts the
/// attempt and rolls the transaction back.
pub trait MutationHooks: Send + Sync {
    fn before_mutation(&self, _ctx: &MutationContext<'_>) -> Result<()> {
        Ok(())
    }

    fn after_mutation(&self, _ctx: &MutationContext<'_>, _outcome: &MutationOutcome) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_wire_names() {
        let outcome = MutationOutcome {
            action: MutationAction::Created,
            uri: "/network/l3-networks/l3-network/n1".into(),
            resource_version: Some("1".into()),
            removed: 0,
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["action"], "created");
        assert_eq!(MutationKind::PutRelationship.to_string(), "PUT relationship");
    }
}
