//! Slash-separated VFS path helpers.
//!
//! VFS paths are plain strings, not `std::path::Path`: they are the same on
//! every host and never carry drive prefixes.

/// Normalize a path: drop empty and `.` segments, resolve `..`.
///
/// Returns `None` if a `..` would climb above the root. The result has no
/// leading or trailing `/`; the root is the empty string.
pub fn normalize(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            s => parts.push(s),
        }
    }
    Some(parts.join("/"))
}

/// Like [`normalize`], but `..` above the root is clamped at the root.
pub fn normalize_lossy(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

/// Join a child name (or relative path) onto a parent.
pub fn join(parent: &str, child: &str) -> String {
    let parent = parent.trim_end_matches('/');
    let child = child.trim_start_matches('/');
    if parent.is_empty() {
        child.to_string()
    } else if child.is_empty() {
        parent.to_string()
    } else {
        format!("{parent}/{child}")
    }
}

/// Parent of a path; the root's parent is the root.
pub fn parent(path: &str) -> &str {
    let path = path.trim_end_matches('/');
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Last segment of a path.
pub fn base_name(path: &str) -> &str {
    let path = path.trim_end_matches('/');
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/a/b/").as_deref(), Some("a/b"));
        assert_eq!(normalize("a/./b//c").as_deref(), Some("a/b/c"));
        assert_eq!(normalize("a/b/../c").as_deref(), Some("a/c"));
        assert_eq!(normalize("").as_deref(), Some(""));
        assert_eq!(normalize("/").as_deref(), Some(""));
    }

    #[test]
    fn test_normalize_escape() {
        assert_eq!(normalize("../secret"), None);
        assert_eq!(normalize("a/../../b"), None);
        assert_eq!(normalize_lossy("a/../../b"), "b");
    }

    #[test]
    fn test_join_parent_base() {
        assert_eq!(join("a/b", "c"), "a/b/c");
        assert_eq!(join("", "c"), "c");
        assert_eq!(join("a/", "/c"), "a/c");
        assert_eq!(parent("a/b/c"), "a/b");
        assert_eq!(parent("a"), "");
        assert_eq!(base_name("a/b/c.txt"), "c.txt");
        assert_eq!(base_name("c.txt"), "c.txt");
    }
}
