//! Exploration error types.

use thiserror::Error;

/// Errors raised by the exploration core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExploreError {
    /// The stream collaborator refused or failed to open a filtered stream.
    #[error("Subscription to {tag} failed: {message}")]
    Subscription {
        /// Tag the subscription was requested for.
        tag: String,
        /// Collaborator-provided reason.
        message: String,
    },

    /// Insert requested under a tag that is not in the tree.
    #[error("Parent tag not found: {tag}")]
    ParentNotFound { tag: String },

    /// Every node carrying the parent tag already has its pair of children.
    #[error("Parent tag already expanded: {tag}")]
    ParentExpanded { tag: String },

    /// The tree was reset after the caller captured its epoch.
    #[error("Tree epoch changed: expected {expected}, found {actual}")]
    StaleEpoch { expected: u64, actual: u64 },

    /// The stream delivered a value that is not a text item.
    #[error("Unexpected stream item of kind {kind}")]
    UnexpectedItemShape { kind: String },

    /// Pop on an empty queue.
    #[error("Queue is empty")]
    EmptyQueue,

    /// Configuration rejected by validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ExploreError {
    /// Build a subscription error for `tag`.
    pub fn subscription(tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Subscription {
            tag: tag.into(),
            message: message.into(),
        }
    }
}

/// Result type for exploration operations.
pub type ExploreResult<T> = Result<T, ExploreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_tag() {
        let err = ExploreError::subscription("#rust", "rule rejected");
        assert_eq!(err.to_string(), "Subscription to #rust failed: rule rejected");
    }
}
