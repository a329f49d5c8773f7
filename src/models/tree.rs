//! Nested folder tree for destination pickers.

use serde::Serialize;
use std::collections::BTreeMap;

/// Folders keyed by component name, each holding its own subtree.
///
/// Serializes as nested JSON objects: `{"a": {"b": {}}, "c": {}}`.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct FolderTree {
    children: BTreeMap<String, FolderTree>,
}

impl FolderTree {
    /// Build a tree from flat folder paths such as `a/` and `a/b/`.
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut root = FolderTree::default();
        for path in paths {
            let mut node = &mut root;
            for component in path.as_ref().split('/').filter(|c| !c.is_empty()) {
                node = node.children.entry(component.to_string()).or_default();
            }
        }
        root
    }
}

#[cfg(test)]
impl FolderTree {
    pub(crate) fn child(&self, name: &str) -> Option<&FolderTree> {
        self.children.get(name)
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nests_components() {
        let tree = FolderTree::from_paths(["a/", "a/b/", "a/b/c/", "d/"]);
        assert_eq!(tree.names().collect::<Vec<_>>(), vec!["a", "d"]);
        let b = tree.child("a").and_then(|a| a.child("b")).unwrap();
        assert!(b.child("c").unwrap().is_empty());
    }

    #[test]
    fn serializes_as_nested_objects() {
        let tree = FolderTree::from_paths(["x/y/", "x/"]);
        assert_eq!(serde_json::to_value(&tree).unwrap(), json!({"x": {"y": {}}}));
    }

    #[test]
    fn empty_input_gives_empty_tree() {
        assert!(FolderTree::from_paths(Vec::<String>::new()).is_empty());
    }
}
