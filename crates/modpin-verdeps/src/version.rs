//! The public entry point.

use std::path::PathBuf;
use std::sync::Arc;

use modpin_runtime::Runtime;

use crate::conventions::{generate_internal_dir_name, ImportIdentity};
use crate::lookup::RevisionLookup;
use crate::process::{process_deps, ProcessDepsArgs};
use crate::{Error, Result};

pub struct VersionDepsArgs {
    pub runtime: Arc<dyn Runtime>,
    pub lookup: Arc<dyn RevisionLookup>,
    /// Commit SHA of the package version being served.
    pub sha: String,
    /// Root of the package's source tree on disk.
    pub path: PathBuf,
    pub author: String,
    pub repo: String,
}

/// Rewrites every GitHub-hosted import under `path` to its pinned registry
/// form, resolving each dependency to its revision as of the target commit's
/// timestamp. Source files are modified in place.
pub async fn version_deps(args: VersionDepsArgs) -> Result<()> {
    if args.sha.is_empty() {
        return Err(Error::InvalidArgument("sha was empty".to_string()));
    }
    if args.path.as_os_str().is_empty() {
        return Err(Error::InvalidArgument("path was empty".to_string()));
    }
    if args.author.is_empty() {
        return Err(Error::InvalidArgument("author was empty".to_string()));
    }
    if args.repo.is_empty() {
        return Err(Error::InvalidArgument("repo was empty".to_string()));
    }

    let as_of = args
        .lookup
        .resolve_timestamp(&args.author, &args.repo, &args.sha)
        .await
        .map_err(Error::Timestamp)?;

    tracing::info!(
        author = %args.author,
        repo = %args.repo,
        sha = %args.sha,
        %as_of,
        "versioning package dependencies"
    );

    process_deps(ProcessDepsArgs {
        runtime: args.runtime,
        lookup: args.lookup,
        package_dir_path: args.path,
        target_identity: ImportIdentity::new(args.author, args.repo),
        target_revision: args.sha,
        as_of,
        generated_internal_dir_name: Arc::new(generate_internal_dir_name()),
    })
    .await
}
