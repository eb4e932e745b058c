//! Virtual path helpers
//!
//! Every path handed to the cache, the mount table or a driver goes through
//! [`standardize`] first, so keys compare equal regardless of how callers
//! spelled them.

/// Normalize a virtual path: leading `/`, `/` separators, no trailing slash,
/// `.` and `..` segments resolved.
pub fn standardize(path: &str) -> String {
    let path = path.replace('\\', "/");
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
    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// Compare two paths after normalization
pub fn path_equal(a: &str, b: &str) -> bool {
    standardize(a) == standardize(b)
}

/// Join a base path with a relative one
pub fn join(base: &str, path: &str) -> String {
    standardize(&format!("{}/{}", base, path))
}

/// Split a path into its parent directory and final component.
///
/// The root splits into `("/", "")`.
pub fn split(path: &str) -> (String, String) {
    let path = standardize(path);
    match path.rfind('/') {
        Some(0) => ("/".to_string(), path[1..].to_string()),
        Some(i) => (path[..i].to_string(), path[i + 1..].to_string()),
        None => ("/".to_string(), path),
    }
}

/// Whether `path` lies strictly below `dir`
pub fn is_sub_path(dir: &str, path: &str) -> bool {
    let dir = standardize(dir);
    let path = standardize(path);
    if dir == "/" {
        return path != "/";
    }
    path.starts_with(&format!("{}/", dir))
}

pub fn is_root(path: &str) -> bool {
    standardize(path) == "/"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standardize() {
        assert_eq!(standardize(""), "/");
        assert_eq!(standardize("/"), "/");
        assert_eq!(standardize("a/b/"), "/a/b");
        assert_eq!(standardize("\\a\\b"), "/a/b");
        assert_eq!(standardize("/a/./b/../c"), "/a/c");
        assert_eq!(standardize("//a//b"), "/a/b");
        assert_eq!(standardize("/.."), "/");
    }

    #[test]
    fn test_split() {
        assert_eq!(split("/"), ("/".to_string(), "".to_string()));
        assert_eq!(split("/a"), ("/".to_string(), "a".to_string()));
        assert_eq!(split("/a/b/c/"), ("/a/b".to_string(), "c".to_string()));
    }

    #[test]
    fn test_join_and_equal() {
        assert_eq!(join("/pub", "/x/y"), "/pub/x/y");
        assert_eq!(join("/", "x"), "/x");
        assert!(path_equal("/pub/", "pub"));
        assert!(!path_equal("/pub", "/pub/x"));
    }

    #[test]
    fn test_is_sub_path() {
        assert!(is_sub_path("/", "/a"));
        assert!(!is_sub_path("/", "/"));
        assert!(is_sub_path("/pub", "/pub/mirror"));
        assert!(!is_sub_path("/pub", "/public"));
        assert!(!is_sub_path("/pub", "/pub"));
    }
}
