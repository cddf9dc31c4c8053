//! Path authorization guard
//!
//! Decides whether a repository-relative path lies strictly under an
//! exercise namespace. Paths are normalized lexically: `.` segments are
//! dropped and `..` pops a segment. Absolute paths, backslashes, NUL bytes
//! and any `..` that would climb above the repository root are refused
//! outright. The filesystem is never consulted.

use tracing::debug;

/// Prefix under which every exercise namespace lives
pub const EXERCISES_ROOT: &str = "exercises";

/// Lexically normalize a relative path
///
/// Returns `None` for paths that cannot be authorized under any namespace.
pub fn normalize(path: &str) -> Option<String> {
    if path.is_empty() || path.contains('\\') || path.contains('\0') {
        return None;
    }
    if path.starts_with('/') || std::path::Path::new(path).is_absolute() {
        return None;
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return None;
    }
    Some(segments.join("/"))
}

/// Check that `path` lies strictly under `namespace`
///
/// The namespace itself is not a writable path; at least one component
/// beyond it is required.
pub fn is_authorized(path: &str, namespace: &str) -> bool {
    let (Some(path), Some(namespace)) = (normalize(path), normalize(namespace)) else {
        return false;
    };
    path.len() > namespace.len() + 1 && path.starts_with(&namespace) && path.as_bytes()[namespace.len()] == b'/'
}

/// An exercise's writable namespace, e.g. `exercises/odd-one-out`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    root: String,
}

impl Namespace {
    /// Namespace for an exercise slug
    pub fn for_exercise(slug: &str) -> Self {
        Self {
            root: format!("{}/{}", EXERCISES_ROOT, slug),
        }
    }

    /// Namespace root without a trailing separator
    pub fn as_str(&self) -> &str {
        &self.root
    }

    pub fn is_authorized(&self, path: &str) -> bool {
        is_authorized(path, &self.root)
    }

    /// Map a repository-relative path to a namespace-relative one
    pub fn to_relative(&self, path: &str) -> Option<String> {
        if !self.is_authorized(path) {
            return None;
        }
        normalize(path).map(|p| p[self.root.len() + 1..].to_string())
    }

    /// Map a namespace-relative path to a repository-relative one
    pub fn to_repo_path(&self, relative: &str) -> String {
        format!("{}/{}", self.root, relative)
    }

    /// Authorize a whole batch, mapping every path to namespace-relative
    ///
    /// Fails with the list of offending paths if any single path is outside
    /// the namespace. Nothing is returned for the authorized ones in that
    /// case, so callers cannot act on a partial batch.
    pub fn authorize_all<'a>(&self, paths: impl IntoIterator<Item = &'a str>) -> Result<Vec<String>, Vec<String>> {
        let mut relative = Vec::new();
        let mut rejected = Vec::new();

        for path in paths {
            match self.to_relative(path) {
                Some(rel) => relative.push(rel),
                None => rejected.push(path.to_string()),
            }
        }

        if rejected.is_empty() {
            Ok(relative)
        } else {
            debug!(namespace = %self.root, ?rejected, "Namespace::authorize_all: rejected paths");
            Err(rejected)
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/", self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const NS: &str = "exercises/odd-one-out/";

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("a/./b//c").as_deref(), Some("a/b/c"));
        assert_eq!(normalize("a/b/../c").as_deref(), Some("a/c"));
        assert_eq!(normalize("a/"), Some("a".to_string()));
        assert_eq!(normalize("../a"), None);
        assert_eq!(normalize("a/../.."), None);
        assert_eq!(normalize("/etc/passwd"), None);
        assert_eq!(normalize("a\\b"), None);
        assert_eq!(normalize("."), None);
        assert_eq!(normalize(""), None);
    }

    #[test]
    fn test_authorized_paths() {
        assert!(is_authorized("exercises/odd-one-out/index.tsx", NS));
        assert!(is_authorized("exercises/odd-one-out/components/Card.tsx", NS));
        assert!(is_authorized("exercises/odd-one-out/./a/../b.ts", NS));
        assert!(is_authorized("exercises/other/../odd-one-out/x.ts", NS));
    }

    #[test]
    fn test_unauthorized_paths() {
        for path in [
            "../shared/schema.ts",
            "../../etc/passwd",
            "/etc/passwd",
            "/exercises/odd-one-out/index.tsx",
            "exercises/odd-one-out",
            "exercises/odd-one-out/",
            "exercises/odd-one-out/..",
            "exercises/odd-one-out/../other/x.ts",
            "exercises/odd-one-out-2/x.ts",
            "exercises/odd-one-outx.ts",
            "shared/schema.ts",
            "index.tsx",
            "exercises\\odd-one-out\\x.ts",
        ] {
            assert!(!is_authorized(path, NS), "authorized {path:?}");
        }
    }

    #[test]
    fn test_bad_namespace_authorizes_nothing() {
        assert!(!is_authorized("x.ts", ""));
        assert!(!is_authorized("../x.ts", ".."));
        assert!(!is_authorized("etc/passwd", "/"));
    }

    #[test]
    fn test_namespace_mapping() {
        let ns = Namespace::for_exercise("odd-one-out");

        assert_eq!(ns.as_str(), "exercises/odd-one-out");
        assert_eq!(ns.to_string(), NS);
        assert_eq!(ns.to_relative("exercises/odd-one-out/a/./b.ts").as_deref(), Some("a/b.ts"));
        assert_eq!(ns.to_relative("exercises/odd-one-out"), None);
        assert_eq!(ns.to_repo_path("a/b.ts"), "exercises/odd-one-out/a/b.ts");
    }

    #[test]
    fn test_authorize_all_rejects_whole_batch() {
        let ns = Namespace::for_exercise("odd-one-out");

        let ok = ns.authorize_all(["exercises/odd-one-out/a.ts", "exercises/odd-one-out/b.ts"]);
        assert_eq!(ok.unwrap(), vec!["a.ts", "b.ts"]);

        let err = ns.authorize_all(["exercises/odd-one-out/a.ts", "../shared/schema.ts"]);
        assert_eq!(err.unwrap_err(), vec!["../shared/schema.ts"]);
    }

    fn segment() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9_][a-zA-Z0-9_.-]{0,10}".prop_filter("not a dot segment", |s| s != "." && s != "..")
    }

    proptest! {
        #[test]
        fn prop_paths_under_namespace_are_authorized(segs in proptest::collection::vec(segment(), 1..6)) {
            let path = format!("{}{}", NS, segs.join("/"));
            prop_assert!(is_authorized(&path, NS));
        }

        #[test]
        fn prop_traversal_out_of_namespace_is_refused(
            segs in proptest::collection::vec(segment(), 0..4),
            ups in 1usize..6,
        ) {
            // Climb out of the slug directory at least once, then wander anywhere
            let mut parts = vec!["exercises".to_string(), "odd-one-out".to_string()];
            parts.extend(std::iter::repeat_n("..".to_string(), ups));
            parts.extend(segs.iter().cloned());
            let path = parts.join("/");

            let authorized = is_authorized(&path, NS);
            let re_enters = normalize(&path).is_some_and(|p| p.starts_with("exercises/odd-one-out/"));
            prop_assert_eq!(authorized, re_enters);
        }

        #[test]
        fn prop_absolute_paths_are_refused(segs in proptest::collection::vec(segment(), 0..6)) {
            let path = format!("/{}", segs.join("/"));
            prop_assert!(!is_authorized(&path, NS));
        }

        #[test]
        fn prop_leading_parent_is_refused(segs in proptest::collection::vec(segment(), 0..6)) {
            let path = format!("../{}", segs.join("/"));
            prop_assert!(!is_authorized(&path, NS));
        }
    }
}
