//! Pure path utilities shared by every backend.
//!
//! None of these functions touch a backend; they operate purely on the
//! string form of a path, the owning backend's declared protocol names and
//! its `root_marker`.

/// Strip a `<proto>://` or `<proto>::` prefix and any trailing slashes.
///
/// Never returns an empty string: an empty result collapses to
/// `root_marker`.
pub fn strip_protocol(path: &str, protocols: &[&str], root_marker: &str) -> String {
    let mut rest = path;
    for proto in protocols {
        if let Some(stripped) = rest.strip_prefix(proto) {
            if let Some(stripped) = stripped.strip_prefix("://") {
                rest = stripped;
                break;
            }
            if let Some(stripped) = stripped.strip_prefix("::") {
                rest = stripped;
                break;
            }
        }
    }
    let trimmed = rest.trim_end_matches('/');
    if trimmed.is_empty() {
        root_marker.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Vector form of [`strip_protocol`]: maps element-wise.
pub fn strip_protocol_many<S: AsRef<str>>(
    paths: &[S],
    protocols: &[&str],
    root_marker: &str,
) -> Vec<String> {
    paths
        .iter()
        .map(|p| strip_protocol(p.as_ref(), protocols, root_marker))
        .collect()
}

/// Compute the parent directory of `path`.
///
/// Strips protocol and trailing slash first. A path with no `/` has
/// `root_marker` as its parent.
pub fn parent(path: &str, protocols: &[&str], root_marker: &str) -> String {
    let stripped = strip_protocol(path.trim_end_matches('/'), protocols, root_marker);
    match stripped.rfind('/') {
        Some(idx) => {
            let candidate = &stripped[..idx];
            let candidate = if root_marker.is_empty() {
                candidate
            } else {
                candidate.trim_start_matches(|c| root_marker.contains(c))
            };
            format!("{root_marker}{candidate}")
        }
        None => root_marker.to_string(),
    }
}

/// True iff `path` contains any of the supported glob metacharacters.
pub fn has_magic(path: &str) -> bool {
    path.contains('*') || path.contains('?') || path.contains('[')
}

/// Collapse repeated `/` and drop a trailing `/`, used before glob/regex
/// matching.
pub fn normalize_for_match(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_slash = false;
    for c in path.chars() {
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(c);
    }
    out.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROTOS: &[&str] = &["mem"];

    #[test]
    fn strip_protocol_removes_scheme_and_trailing_slash() {
        assert_eq!(strip_protocol("mem://a/b/", PROTOS, ""), "a/b");
        assert_eq!(strip_protocol("mem::a/b", PROTOS, ""), "a/b");
        assert_eq!(strip_protocol("a/b", PROTOS, ""), "a/b");
    }

    #[test]
    fn strip_protocol_collapses_to_root_marker() {
        assert_eq!(strip_protocol("mem://", PROTOS, ""), "");
        assert_eq!(strip_protocol("mem://", PROTOS, "/"), "/");
        assert_eq!(strip_protocol("/", PROTOS, "/"), "/");
    }

    #[test]
    fn parent_of_top_level_is_root_marker() {
        assert_eq!(parent("a", PROTOS, ""), "");
        assert_eq!(parent("/a", PROTOS, "/"), "/");
    }

    #[test]
    fn parent_is_prefix_of_path() {
        assert_eq!(parent("/a/b/c", PROTOS, "/"), "/a/b");
        assert_eq!(parent("a/b/c/", PROTOS, ""), "a/b");
    }

    #[test]
    fn has_magic_detects_all_metacharacters() {
        assert!(has_magic("a/*.txt"));
        assert!(has_magic("a/?.txt"));
        assert!(has_magic("a/[abc].txt"));
        assert!(!has_magic("a/b.txt"));
    }

    #[test]
    fn normalize_collapses_double_slash() {
        assert_eq!(normalize_for_match("a//b///c/"), "a/b/c");
    }
}
