//! Revision lookup collaborator.
//!
//! The concrete implementation (the registry's GitHub client, with its
//! authentication and rate-limit handling) lives outside this crate; the
//! engine only needs these two capabilities.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub type LookupResult<T> = Result<T, LookupError>;

/// Errors surfaced by a revision lookup implementation.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// The repository or revision does not exist.
    #[error("No revision found for {author}/{repo}")]
    NotFound { author: String, repo: String },

    /// A transient service failure.
    #[error("Revision lookup service error: {0}")]
    Service(String),
}

/// Resolves repositories to immutable commit identifiers.
#[async_trait]
pub trait RevisionLookup: Send + Sync + std::fmt::Debug {
    /// The commit SHA of `author/repo` as of the given point in time.
    async fn resolve_revision(
        &self,
        author: &str,
        repo: &str,
        as_of: DateTime<Utc>,
    ) -> LookupResult<String>;

    /// The commit timestamp of an existing revision of `author/repo`.
    async fn resolve_timestamp(
        &self,
        author: &str,
        repo: &str,
        revision: &str,
    ) -> LookupResult<DateTime<Utc>>;
}
