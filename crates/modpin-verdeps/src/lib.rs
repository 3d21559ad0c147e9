//! # modpin-verdeps
//!
//! The modpin registry's dependency versioner. Given the path to a Go
//! package's source tree and the commit SHA it is being served at, the engine
//! rewrites every GitHub-hosted import in the tree to the registry's
//! content-addressed form, pinning each dependency to an immutable commit:
//!
//! ```text
//! "github.com/c/d/e"  ->  "modpin.io/c/d@<sha>/e"
//! ```
//!
//! The pipeline, end to end:
//!
//! 1. [`traverse`] walks the package tree concurrently, vendor-aware,
//!    renaming the reserved `internal` directory as it goes and spawning an
//!    [`analyze`] task per Go file.
//! 2. Analysis emits import and package specs on two streams. Vendor
//!    subtrees route their specs through [`buffer`] so vendored
//!    self-references can be dropped once the subtree's vendor context is
//!    final.
//! 3. [`process`] consumes the streams, deduplicates revision lookups per
//!    dependency identity via waiting lists, and turns resolved revisions
//!    into per-file edits.
//! 4. [`patch`] collects each file's full revision set and rewrites the file
//!    exactly once through [`diff::compose_byte_diffs`].
//!
//! The entry point is [`version_deps`]. Filesystem access goes through
//! `modpin_runtime::Runtime`; commit resolution goes through
//! [`RevisionLookup`]. The engine emits `tracing` events and installs no
//! subscriber.

use std::path::PathBuf;

pub mod analyze;
pub mod buffer;
pub mod conventions;
pub mod diff;
pub mod lookup;
pub mod parser;
pub mod patch;
pub mod process;
pub mod resolve;
pub mod spec;
pub mod sync;
pub mod traverse;
pub mod vendor;
mod version;

pub use conventions::ImportIdentity;
pub use lookup::{LookupError, LookupResult, RevisionLookup};
pub use spec::{ImportSpec, PackageSpec, Revision, RevisionKind};
pub use vendor::VendorContext;
pub use version::{version_deps, VersionDepsArgs};

/// Errors produced by the dependency versioner.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required entry-point argument was missing or empty.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A source file could not be scanned.
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: parser::ScanError,
    },

    /// Renaming the reserved internal directory failed.
    #[error("Failed to rename {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: modpin_runtime::RuntimeError,
    },

    /// A filesystem operation failed.
    #[error("Runtime error: {0}")]
    Runtime(#[from] modpin_runtime::RuntimeError),

    /// The external lookup failed for a dependency identity.
    #[error("Could not resolve a revision for {identity}: {source}")]
    Lookup {
        identity: String,
        #[source]
        source: LookupError,
    },

    /// The external lookup returned an empty revision.
    #[error("Revision for {identity} came back empty")]
    EmptyRevision { identity: String },

    /// Could not fetch the target revision's commit timestamp.
    #[error("Could not fetch commit timestamp: {0}")]
    Timestamp(#[source] LookupError),

    /// A spec lost the waiting-list race and the cache was still empty.
    #[error("Could not version dependency {import_path} because its revision was never resolved")]
    RevisionUnexpectedlyAbsent { import_path: String },

    /// A byte diff violated the composition contract.
    #[error("Invalid byte diff: {0}")]
    Diff(String),

    /// A file could not be patched.
    #[error("Failed to patch {path}: {reason}")]
    Patch { path: PathBuf, reason: String },

    /// Traversal of a package directory accumulated errors.
    #[error(
        "Failed to read package directory {path} due to {count} error(s): [ {summary} ]"
    )]
    Traversal {
        path: PathBuf,
        count: usize,
        summary: String,
    },

    /// The run-level summary of every non-fatal error.
    #[error("Encountered {count} problem(s) while versioning dependencies: [ {summary} ]")]
    Accumulated { count: usize, summary: String },
}

/// Result type alias for versioner operations.
pub type Result<T> = std::result::Result<T, Error>;
