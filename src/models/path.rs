//! Folder convention over flat keys.
//!
//! A key ending in `/` names a folder; every other key names a file. Folders
//! have no entity of their own: they exist either as a zero-byte marker object
//! or implicitly through any key sharing their prefix.

use std::fmt;
use thiserror::Error;

const MAX_KEY_LEN: usize = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path must not be empty")]
    Empty,
    #[error("path `{0}` exceeds 1024 bytes")]
    TooLong(String),
    #[error("path `{0}` must not start with `/`")]
    LeadingSlash(String),
    #[error("path `{0}` contains an empty or relative segment")]
    BadSegment(String),
    #[error("path `{0}` contains control characters or backslashes")]
    BadCharacter(String),
}

/// Whether a key addresses a single object or a whole subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathKind {
    File,
    Folder,
}

/// A validated key tagged with its kind.
///
/// This is the only place the trailing-slash convention is interpreted;
/// everything downstream matches on [`PathKind`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectPath {
    key: String,
    kind: PathKind,
}

impl ObjectPath {
    /// Parse a raw key, deriving its kind from the trailing slash.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        validate_key(raw)?;
        let kind = if is_folder(raw) {
            PathKind::Folder
        } else {
            PathKind::File
        };
        Ok(Self {
            key: raw.to_string(),
            kind,
        })
    }

    /// Parse a raw key as a folder, appending the trailing slash if missing.
    ///
    /// An empty string is the bucket root.
    pub fn folder(raw: &str) -> Result<Self, PathError> {
        if raw.is_empty() || raw == "/" {
            return Ok(Self::root());
        }
        let key = if is_folder(raw) {
            raw.to_string()
        } else {
            format!("{raw}/")
        };
        validate_key(&key)?;
        Ok(Self {
            key,
            kind: PathKind::Folder,
        })
    }

    pub fn root() -> Self {
        Self {
            key: String::new(),
            kind: PathKind::Folder,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> PathKind {
        self.kind
    }

    pub fn is_root(&self) -> bool {
        self.key.is_empty()
    }

    /// Last path component, without any trailing slash.
    pub fn name(&self) -> &str {
        last_component(&self.key)
    }

    /// True when `other` equals this folder or lies anywhere beneath it.
    pub fn contains(&self, other: &ObjectPath) -> bool {
        self.kind == PathKind::Folder && other.key.starts_with(&self.key)
    }

    /// Key this path takes when placed inside `folder`, keeping its kind.
    pub fn relocated_into(&self, folder: &ObjectPath) -> ObjectPath {
        let key = match self.kind {
            PathKind::File => format!("{}{}", folder.key, self.name()),
            PathKind::Folder => format!("{}{}/", folder.key, self.name()),
        };
        ObjectPath {
            key,
            kind: self.kind,
        }
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

pub fn is_folder(key: &str) -> bool {
    key.ends_with('/')
}

/// Folder path enclosing `key`, with a trailing slash; `""` at the root.
pub fn parent_of(key: &str) -> &str {
    let trimmed = key.strip_suffix('/').unwrap_or(key);
    match trimmed.rfind('/') {
        Some(pos) => &key[..=pos],
        None => "",
    }
}

/// `key` relative to `prefix`, trailing slash removed.
pub fn display_name<'a>(key: &'a str, prefix: &str) -> &'a str {
    let relative = key.strip_prefix(prefix).unwrap_or(key);
    relative.strip_suffix('/').unwrap_or(relative)
}

/// Final component of `key`, ignoring a trailing slash.
pub fn last_component(key: &str) -> &str {
    display_name(key, parent_of(key))
}

/// Every ancestor folder of `key`, shallowest first, including `key` itself
/// when it is a folder marker.
pub fn ancestor_folders(key: &str) -> impl Iterator<Item = &str> {
    key.match_indices('/').map(move |(pos, _)| &key[..=pos])
}

/// Reject keys that could escape the namespace or break the folder convention.
pub fn validate_key(key: &str) -> Result<(), PathError> {
    if key.is_empty() {
        return Err(PathError::Empty);
    }
    if key.len() > MAX_KEY_LEN {
        return Err(PathError::TooLong(key.to_string()));
    }
    if key.starts_with('/') {
        return Err(PathError::LeadingSlash(key.to_string()));
    }
    let body = key.strip_suffix('/').unwrap_or(key);
    if body
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(PathError::BadSegment(key.to_string()));
    }
    if key.chars().any(|c| c.is_control() || c == '\\') {
        return Err(PathError::BadCharacter(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_trailing_slash() {
        assert_eq!(ObjectPath::parse("a/b.txt").unwrap().kind(), PathKind::File);
        assert_eq!(ObjectPath::parse("a/b/").unwrap().kind(), PathKind::Folder);
    }

    #[test]
    fn folder_normalizes_trailing_slash() {
        assert_eq!(ObjectPath::folder("docs").unwrap().key(), "docs/");
        assert_eq!(ObjectPath::folder("docs/").unwrap().key(), "docs/");
        assert!(ObjectPath::folder("").unwrap().is_root());
        assert!(ObjectPath::folder("/").unwrap().is_root());
    }

    #[test]
    fn parent_strips_last_segment() {
        assert_eq!(parent_of("a/b/c.txt"), "a/b/");
        assert_eq!(parent_of("a/b/"), "a/");
        assert_eq!(parent_of("a/"), "");
        assert_eq!(parent_of("c.txt"), "");
    }

    #[test]
    fn display_name_is_relative_component() {
        assert_eq!(display_name("a/b/", "a/"), "b");
        assert_eq!(display_name("a/f.txt", "a/"), "f.txt");
        assert_eq!(last_component("a/b/"), "b");
        assert_eq!(last_component("report.pdf"), "report.pdf");
    }

    #[test]
    fn ancestors_cover_every_prefix() {
        let found: Vec<_> = ancestor_folders("a/b/c.txt").collect();
        assert_eq!(found, vec!["a/", "a/b/"]);
        let marker: Vec<_> = ancestor_folders("x/y/").collect();
        assert_eq!(marker, vec!["x/", "x/y/"]);
        assert_eq!(ancestor_folders("top.txt").count(), 0);
    }

    #[test]
    fn rejects_malformed_keys() {
        assert_eq!(ObjectPath::parse(""), Err(PathError::Empty));
        assert!(matches!(
            ObjectPath::parse("/abs"),
            Err(PathError::LeadingSlash(_))
        ));
        assert!(matches!(
            ObjectPath::parse("a//b"),
            Err(PathError::BadSegment(_))
        ));
        assert!(matches!(
            ObjectPath::parse("a/../b"),
            Err(PathError::BadSegment(_))
        ));
        assert!(matches!(
            ObjectPath::parse("a\\b"),
            Err(PathError::BadCharacter(_))
        ));
        assert!(matches!(
            ObjectPath::parse(&"k".repeat(2000)),
            Err(PathError::TooLong(_))
        ));
    }

    #[test]
    fn relocation_keeps_kind() {
        let dest = ObjectPath::folder("b").unwrap();
        let file = ObjectPath::parse("a/f.txt").unwrap();
        let folder = ObjectPath::parse("a/sub/").unwrap();
        assert_eq!(file.relocated_into(&dest).key(), "b/f.txt");
        assert_eq!(folder.relocated_into(&dest).key(), "b/sub/");
        assert_eq!(file.relocated_into(&ObjectPath::root()).key(), "f.txt");
    }

    #[test]
    fn folder_contains_descendants() {
        let folder = ObjectPath::parse("a/").unwrap();
        assert!(folder.contains(&ObjectPath::parse("a/b/").unwrap()));
        assert!(folder.contains(&folder));
        assert!(!folder.contains(&ObjectPath::parse("ab/").unwrap()));
    }

    #[test]
    fn same_key_hashes_once() {
        let paths: std::collections::HashSet<ObjectPath> = ["a/", "a/", "a/f.txt"]
            .into_iter()
            .map(|raw| ObjectPath::parse(raw).unwrap())
            .collect();
        assert_eq!(paths.len(), 2);
    }
}
