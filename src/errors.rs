//! Typed error hierarchy for Tinyissue.
//!
//! `TrackerError` is what request handlers return; it maps onto an HTTP
//! response in [`crate::tracker::api`]. Storage and startup plumbing keep
//! using `anyhow::Result` and get wrapped at the handler boundary.

use thiserror::Error;

use crate::form::rules::{RuleError, ValidationErrors};

/// Errors surfaced by the tracker's request handlers and services.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Project {id} not found")]
    ProjectNotFound { id: i64 },

    #[error("Issue {id} not found")]
    IssueNotFound { id: i64 },

    #[error("Tag {id} not found")]
    TagNotFound { id: i64 },

    #[error("User {id} not found")]
    UserNotFound { id: i64 },

    #[error("Attachment {id} not found")]
    AttachmentNotFound { id: i64 },

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Missing permission '{permission}'")]
    Forbidden { permission: &'static str },

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Invalid validation rule: {0}")]
    Rule(#[from] RuleError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Storage error at {path}: {source}")]
    Storage {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TrackerError {
    /// True for the "record does not exist" family of errors.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ProjectNotFound { .. }
                | Self::IssueNotFound { .. }
                | Self::TagNotFound { .. }
                | Self::UserNotFound { .. }
                | Self::AttachmentNotFound { .. }
        )
    }
}
