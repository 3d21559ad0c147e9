//! Ecosystem conventions: reserved names, path prefixes, and import-path
//! composition.
//!
//! The versioner targets Go packages hosted on GitHub. An import such as
//! `"github.com/author/repo/subpath"` is rewritten to the registry's
//! content-addressed form `"modpin.io/author/repo@<sha>/subpath"`. The rules
//! for the reserved `internal` directory live here too: once that directory
//! is renamed on disk, every in-tree import referencing it has the `internal`
//! segment substituted with the generated name during composition.

use rand::Rng;

/// Prefix of every import eligible for versioning (unquoted form).
pub const GITHUB_PREFIX: &str = "github.com/";

/// Prefix of composed registry import paths (unquoted form).
pub const REGISTRY_PREFIX: &str = "modpin.io/";

/// File suffix of Go source files.
pub const GO_FILE_SUFFIX: &str = ".go";

/// Reserved vendoring directory name.
pub const VENDOR_DIR_NAME: &str = "vendor";

/// Optional nested vendor root. `vendor/src` is the effective vendor root
/// when it exists.
pub const VENDOR_SRC_DIR_NAME: &str = "src";

/// Reserved directory name that restricts importability to the surrounding
/// package tree. Renamed during traversal so versioned import paths keep
/// resolving.
pub const INTERNAL_DIR_NAME: &str = "internal";

const INTERNAL_SUBPATH_SUFFIX: &str = "/internal";
const INTERNAL_SUBPATH_PART: &str = "/internal/";

const GENERATED_INTERNAL_DIR_NAME_LEN: usize = 16;
const GENERATED_INTERNAL_DIR_NAME_CHARS: &[u8] = b"abcdef0123456789";

/// The (author, repository) pair identifying a dependency, ignoring sub-path
/// and revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImportIdentity {
    pub author: String,
    pub repo: String,
}

impl ImportIdentity {
    pub fn new(author: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            repo: repo.into(),
        }
    }

    /// The cache/waiting-list key for this identity.
    pub fn key(&self) -> String {
        format!("{}/{}", self.author, self.repo)
    }
}

impl std::fmt::Display for ImportIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.author, self.repo)
    }
}

/// Strips the surrounding quote characters from an import literal.
///
/// Go import paths are interpreted string literals, but raw (backquoted)
/// literals are tolerated by the scanner, so both quote kinds are stripped.
pub fn unquote_literal(literal: &str) -> &str {
    literal.trim_matches(|c| c == '"' || c == '`')
}

/// Splits an unquoted `github.com/...` import path into its identity and
/// sub-path. The sub-path keeps its leading slash; it is empty when the
/// import points at the repository root.
pub fn parse_import_path(import_path: &str) -> (ImportIdentity, String) {
    let rest = import_path.strip_prefix(GITHUB_PREFIX).unwrap_or(import_path);

    let mut segments = rest.splitn(3, '/');
    let author = segments.next().unwrap_or_default();
    let repo = segments.next().unwrap_or_default();
    let subpath = match segments.next() {
        Some(tail) if !tail.is_empty() => format!("/{tail}"),
        _ => String::new(),
    };

    (ImportIdentity::new(author, repo), subpath)
}

/// The identity key of an unquoted import path. Imports that differ only in
/// sub-path share a key, which is what deduplicates revision lookups.
pub fn import_identity_key(import_path: &str) -> String {
    parse_import_path(import_path).0.key()
}

/// Composes the replacement bytes for a versioned import literal, quotes
/// included: `"modpin.io/<author>/<repo>@<sha><subpath>"`.
///
/// If the sub-path crosses the reserved `internal` directory (as a middle or
/// trailing segment), that segment is substituted with the generated
/// directory name chosen for this package version.
pub fn compose_registry_import_path(
    identity: &ImportIdentity,
    sha: &str,
    subpath: &str,
    generated_internal_dir_name: &str,
) -> Vec<u8> {
    let mut out = String::with_capacity(
        REGISTRY_PREFIX.len() + identity.author.len() + identity.repo.len() + sha.len()
            + subpath.len()
            + 4,
    );
    out.push('"');
    out.push_str(REGISTRY_PREFIX);
    out.push_str(&identity.author);
    out.push('/');
    out.push_str(&identity.repo);
    out.push('@');
    out.push_str(sha);

    if !subpath.is_empty() {
        if subpath.contains(INTERNAL_SUBPATH_PART) {
            out.push_str(&subpath.replacen(
                INTERNAL_SUBPATH_PART,
                &format!("/{generated_internal_dir_name}/"),
                1,
            ));
        } else if let Some(head) = subpath.strip_suffix(INTERNAL_SUBPATH_SUFFIX) {
            out.push_str(head);
            out.push('/');
            out.push_str(generated_internal_dir_name);
        } else {
            out.push_str(subpath);
        }
    }

    out.push('"');
    out.into_bytes()
}

/// Generates the random lowercase-hex name that replaces an `internal`
/// directory for the lifetime of one versioning run.
pub fn generate_internal_dir_name() -> String {
    let mut rng = rand::thread_rng();
    (0..GENERATED_INTERNAL_DIR_NAME_LEN)
        .map(|_| {
            let i = rng.gen_range(0..GENERATED_INTERNAL_DIR_NAME_CHARS.len());
            GENERATED_INTERNAL_DIR_NAME_CHARS[i] as char
        })
        .collect()
}
