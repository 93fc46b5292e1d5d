//! Glob-to-regex translation, using an escaping and placeholder-swap
//! approach for `**` to keep it distinct from single-`*` expansion.

use regex::Regex;

use crate::path::normalize_for_match;

/// First position of any of `*`, `?`, `[` in `path`, or `None` if the
/// pattern is a literal path with no magic characters.
pub fn first_magic_index(path: &str) -> Option<usize> {
    let star = path.find('*');
    let ques = path.find('?');
    let brace = path.find('[');
    [star, ques, brace].into_iter().flatten().min()
}

/// The `root` and `maxdepth` a glob pattern implies: the prefix up to and
/// including the last `/` before the first metacharacter is `root`; depth is
/// unbounded when `**` appears, else one more than the count of `/` after
/// `root`.
pub fn root_and_depth(path: &str) -> (String, Option<usize>) {
    let ind = match first_magic_index(path) {
        Some(i) => i,
        None => return (path.to_string(), Some(1)),
    };

    let prefix = &path[..ind];
    if let Some(slash_idx) = prefix.rfind('/') {
        let root = path[..=slash_idx].to_string();
        let depth = if path.contains("**") {
            None
        } else {
            Some(path[slash_idx + 1..].matches('/').count() + 1)
        };
        (root, depth)
    } else {
        let depth = if path.contains("**") {
            None
        } else {
            Some(path[ind..].matches('/').count() + 1)
        };
        (String::new(), depth)
    }
}

/// Compile `pattern` into an anchored regex matching normalized candidate
/// paths. Escapes everything regex-special except the glob metacharacters
/// this module supports, then substitutes `**` (via a placeholder so it
/// doesn't get clobbered by the single-star substitution that follows) and
/// `*`/`?`.
pub fn compile(pattern: &str) -> Regex {
    let mut escaped = String::with_capacity(pattern.len() + 8);
    escaped.push('^');
    for c in pattern.trim_end_matches('/').chars() {
        match c {
            '\\' => escaped.push_str(r"\\"),
            '.' => escaped.push_str(r"\."),
            '+' => escaped.push_str(r"\+"),
            '(' => escaped.push_str(r"\("),
            ')' => escaped.push_str(r"\)"),
            '|' => escaped.push_str(r"\|"),
            '^' => escaped.push_str(r"\^"),
            '$' => escaped.push_str(r"\$"),
            '{' => escaped.push_str(r"\{"),
            '}' => escaped.push_str(r"\}"),
            '?' => escaped.push('.'),
            other => escaped.push(other),
        }
    }
    escaped.push('$');

    const PLACEHOLDER: &str = "\u{0}DOUBLESTAR\u{0}";
    let with_placeholder = escaped.replace("**", PLACEHOLDER);
    let with_single = with_placeholder.replace('*', "[^/]*");
    let final_pattern = with_single.replace(PLACEHOLDER, ".*");

    Regex::new(&final_pattern).expect("glob-derived regex must always compile")
}

/// Filter `candidates` against `pattern`, normalizing double slashes and a
/// trailing slash first.
pub fn filter_matches<'a>(pattern: &Regex, candidates: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = candidates
        .into_iter()
        .filter(|p| pattern.is_match(&normalize_for_match(p)))
        .map(|p| p.to_string())
        .collect();
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_path_has_no_magic_index() {
        assert_eq!(first_magic_index("/a/b/c.txt"), None);
    }

    #[test]
    fn root_and_depth_for_single_star() {
        let (root, depth) = root_and_depth("/a/*/*.txt");
        assert_eq!(root, "/a/");
        assert_eq!(depth, Some(2));
    }

    #[test]
    fn root_and_depth_for_double_star_is_unbounded() {
        let (root, depth) = root_and_depth("/a/**/*.txt");
        assert_eq!(root, "/a/");
        assert_eq!(depth, None);
    }

    #[test]
    fn double_star_matches_any_depth() {
        let re = compile("/a/**/*.txt");
        assert!(re.is_match("/a/b/c.txt"));
        assert!(re.is_match("/a/e.txt"));
    }

    #[test]
    fn single_star_does_not_cross_separators() {
        let re = compile("/a/*/*.txt");
        assert!(re.is_match("/a/b/c.txt"));
        assert!(!re.is_match("/a/e.txt"));
    }

    #[test]
    fn question_mark_matches_one_char() {
        let re = compile("/a/?.txt");
        assert!(re.is_match("/a/b.txt"));
        assert!(!re.is_match("/a/bb.txt"));
    }

    #[test]
    fn filter_sorts_and_dedupes() {
        let re = compile("/a/*.txt");
        let candidates = vec!["/a/b.txt", "/a/a.txt", "/a/b.txt"];
        let out = filter_matches(&re, candidates);
        assert_eq!(out, vec!["/a/a.txt", "/a/b.txt"]);
    }
}
