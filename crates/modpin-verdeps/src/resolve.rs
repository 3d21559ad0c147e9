//! Revision resolution for a single dependency identity.
//!
//! One fetch task runs per distinct `(author, repo)` identity discovered in
//! the package; the orchestrator deduplicates before spawning, so a fetch
//! never races another fetch for the same identity. Results land on a shared
//! channel carrying success and failure alike, and each task holds its own
//! sender clone so the channel closes exactly when the last in-flight fetch
//! finishes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedSender;

use crate::conventions::ImportIdentity;
use crate::lookup::RevisionLookup;
use crate::Error;

/// The outcome of one revision fetch, tagged with the identity it resolves.
#[derive(Debug)]
pub struct FetchResult {
    pub identity: ImportIdentity,
    pub outcome: Result<String, Error>,
}

pub struct FetchRevisionArgs {
    pub lookup: Arc<dyn RevisionLookup>,
    /// The dependency identity to resolve.
    pub identity: ImportIdentity,
    /// Identity of the package being versioned. A package importing itself
    /// pins to the revision already being served, with no external call.
    pub target_identity: ImportIdentity,
    pub target_revision: String,
    /// Commit timestamp of the target revision; dependency revisions are
    /// resolved as of this instant.
    pub as_of: DateTime<Utc>,
    pub result_tx: UnboundedSender<FetchResult>,
}

/// Resolves one identity to a commit revision and reports the outcome.
pub async fn fetch_revision(args: FetchRevisionArgs) {
    let FetchRevisionArgs {
        lookup,
        identity,
        target_identity,
        target_revision,
        as_of,
        result_tx,
    } = args;

    let outcome = if identity == target_identity {
        Ok(target_revision)
    } else {
        match lookup
            .resolve_revision(&identity.author, &identity.repo, as_of)
            .await
        {
            Ok(revision) if revision.is_empty() => Err(Error::EmptyRevision {
                identity: identity.key(),
            }),
            Ok(revision) => {
                tracing::debug!(identity = %identity, %revision, "resolved dependency revision");
                Ok(revision)
            }
            Err(source) => Err(Error::Lookup {
                identity: identity.key(),
                source,
            }),
        }
    };

    let _ = result_tx.send(FetchResult { identity, outcome });
}
