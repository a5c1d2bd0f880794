//! Shared path handling for storage drivers.
//!
//! Canonical form: `/` for the root, `/a/b` otherwise. No trailing slash.

use storecloud_core::{StorageError, StorageResult};

pub const ROOT: &str = "/";

/// Normalize a caller-supplied path into canonical form.
///
/// `""`, `"/"` and `"\"` all mean the root. Repeated and trailing separators
/// are collapsed.
pub fn normalize(path: &str) -> StorageResult<String> {
    let mut segments = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" => continue,
            "." | ".." => {
                return Err(StorageError::InvalidArgument(format!(
                    "Path must not contain '{}' segments: {}",
                    segment, path
                )))
            }
            s => segments.push(s),
        }
    }
    if segments.is_empty() {
        Ok(ROOT.to_string())
    } else {
        Ok(format!("/{}", segments.join("/")))
    }
}

/// Validate a single node name.
pub fn validate_name(name: &str) -> StorageResult<()> {
    if name.is_empty() || name.trim().is_empty() {
        return Err(StorageError::InvalidArgument(
            "Node name must not be empty".to_string(),
        ));
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(StorageError::InvalidArgument(format!(
            "Invalid node name: {}",
            name
        )));
    }
    Ok(())
}

/// Join a canonical parent path and a node name.
pub fn join(parent: &str, name: &str) -> StorageResult<String> {
    validate_name(name)?;
    let parent = normalize(parent)?;
    if parent == ROOT {
        Ok(format!("/{}", name))
    } else {
        Ok(format!("{}/{}", parent, name))
    }
}

pub fn is_root(path: &str) -> bool {
    path == ROOT
}

/// Split a canonical path into parent path and name; `None` for the root.
pub fn split(path: &str) -> Option<(&str, &str)> {
    if is_root(path) {
        return None;
    }
    let idx = path.rfind('/')?;
    let parent = if idx == 0 { ROOT } else { &path[..idx] };
    Some((parent, &path[idx + 1..]))
}

/// Path segments below the root.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Whether `path` equals `ancestor` or lies beneath it.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    if is_root(ancestor) || path == ancestor {
        return true;
    }
    path.strip_prefix(ancestor)
        .map(|rest| rest.starts_with('/'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_aliases() {
        assert_eq!(normalize("").unwrap(), "/");
        assert_eq!(normalize("/").unwrap(), "/");
        assert_eq!(normalize("\\").unwrap(), "/");
    }

    #[test]
    fn test_normalize_collapses_separators() {
        assert_eq!(
            normalize("/Comunicazioni da ISS/000.000/Contratti/2025/CONTRATTOTEST/").unwrap(),
            "/Comunicazioni da ISS/000.000/Contratti/2025/CONTRATTOTEST"
        );
        assert_eq!(normalize("a//b").unwrap(), "/a/b");
        assert_eq!(
            normalize("\\Comunicazioni da ISS\\000.000").unwrap(),
            "/Comunicazioni da ISS/000.000"
        );
    }

    #[test]
    fn test_traversal_rejected() {
        assert!(matches!(
            normalize("/a/../../etc"),
            Err(StorageError::InvalidArgument(_))
        ));
        assert!(normalize("./a").is_err());
        assert!(join("/", "..").is_err());
        assert!(join("/", "a/b").is_err());
        assert!(join("/", "").is_err());
    }

    #[test]
    fn test_join_and_split() {
        assert_eq!(join("/", "uno").unwrap(), "/uno");
        assert_eq!(join("", "uno").unwrap(), "/uno");
        assert_eq!(join("/parent", "child").unwrap(), "/parent/child");

        assert_eq!(split("/parent/child"), Some(("/parent", "child")));
        assert_eq!(split("/uno"), Some(("/", "uno")));
        assert_eq!(split("/"), None);
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("/a/b", "/a"));
        assert!(is_within("/a", "/a"));
        assert!(is_within("/a", "/"));
        assert!(!is_within("/ab", "/a"));
        assert!(!is_within("/a", "/a/b"));
    }
}
